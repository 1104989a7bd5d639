//! Chat and embedding provider abstraction and backend implementations.
//!
//! Every network-bound call made by the indexing and question-answering
//! pipelines goes through [`LlmProvider`]. Callers wrap those calls with
//! [`retry::call_with_retry`] to get per-attempt timeouts and bounded
//! exponential backoff.

pub mod any;
pub mod error;
pub mod http;
#[cfg(feature = "mock")]
pub mod mock;
pub mod ollama;
pub mod openai;
pub mod provider;
pub mod retry;

pub use error::LlmError;
pub use provider::LlmProvider;
pub use retry::RetryPolicy;
