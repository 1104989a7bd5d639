use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },

    #[error("{provider} unavailable (status {status})")]
    Unavailable { provider: String, status: u16 },

    #[error("request timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("{provider} transport failure: {message}")]
    Transport { provider: String, message: String },

    #[error("{provider} API request failed (status {status})")]
    Api { provider: String, status: u16 },

    #[error("empty response from {provider}")]
    EmptyResponse { provider: String },

    #[error("embedding not supported by {provider}")]
    EmbedUnsupported { provider: String },

    #[error("{0}")]
    Other(String),
}

impl LlmError {
    /// Whether retrying the same request may succeed.
    ///
    /// Rate limiting, server-side unavailability, timeouts, and connection
    /// failures are transient. Everything else (bad request, parse failure,
    /// missing embedding model) fails the same way on every attempt.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited { .. }
            | Self::Unavailable { .. }
            | Self::Timeout { .. }
            | Self::Transport { .. } => true,
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Server-suggested delay before the next attempt, if any.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(LlmError::RateLimited { retry_after: None }.is_transient());
        assert!(LlmError::Timeout { seconds: 5 }.is_transient());
        assert!(
            LlmError::Unavailable {
                provider: "openai".into(),
                status: 503
            }
            .is_transient()
        );
        assert!(
            !LlmError::Api {
                provider: "openai".into(),
                status: 400
            }
            .is_transient()
        );
        assert!(
            !LlmError::EmbedUnsupported {
                provider: "mock".into()
            }
            .is_transient()
        );
        assert!(!LlmError::Other("boom".into()).is_transient());
    }

    #[test]
    fn retry_after_only_for_rate_limit() {
        let e = LlmError::RateLimited {
            retry_after: Some(Duration::from_secs(3)),
        };
        assert_eq!(e.retry_after(), Some(Duration::from_secs(3)));
        assert_eq!(LlmError::Timeout { seconds: 1 }.retry_after(), None);
    }
}
