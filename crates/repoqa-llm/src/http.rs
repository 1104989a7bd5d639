//! Shared HTTP client construction.

use std::time::Duration;

/// Build the HTTP client used by the OpenAI-compatible backend.
///
/// 10s connect timeout, `request_timeout` overall, rustls TLS,
/// `repoqa/{version}` user-agent, redirect limit 10. Per-call deadlines are
/// still enforced by [`crate::retry::call_with_retry`].
#[must_use]
pub fn default_client(request_timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(request_timeout)
        .user_agent(concat!("repoqa/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!("falling back to default HTTP client: {e}");
            reqwest::Client::new()
        })
}
