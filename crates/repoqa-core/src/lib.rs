//! Question answering over an indexed repository.
//!
//! [`qa::QaPipeline`] classifies a question, retrieves chunks and asks the
//! model for an answer whose every `[path:start-end]` reference is checked
//! against the chunks it was shown ([`citation`]). [`verify`] inspects what
//! ingestion stored. [`config`] loads the settings shared by every command.

pub mod citation;
pub mod config;
pub mod error;
pub mod qa;
pub mod synthesizer;
pub mod verify;

pub use error::{ConfigError, QaError, VerifyError};
