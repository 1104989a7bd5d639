//! Error types for repoqa-index.

use std::path::PathBuf;

/// Fatal errors of an ingestion run.
///
/// Per-file problems never surface here; they are collected in
/// [`crate::indexer::IndexReport`].
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// Embedding provider error during the collection-sizing probe.
    #[error("LLM error: {0}")]
    Llm(#[from] repoqa_llm::LlmError),

    #[error("vector store error: {0}")]
    VectorStore(#[from] repoqa_store::VectorStoreError),

    #[error("record store error: {0}")]
    Store(#[from] repoqa_store::StoreError),

    #[error("repository root {0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("integer conversion failed: {0}")]
    IntConversion(#[from] std::num::TryFromIntError),
}

/// A file that was found but could not be used.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: {size} bytes exceeds the {limit} byte limit")]
    TooLarge { path: String, size: u64, limit: u64 },

    #[error("{path}: binary content")]
    Binary { path: String },

    #[error("{path}: not valid UTF-8")]
    NotUtf8 { path: String },

    #[error("walk error: {0}")]
    Walk(String),
}

/// Boundary detection could not produce a consistent set of spans.
///
/// Line numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SplitError {
    #[error("unexpected indentation on line {line}")]
    UnexpectedIndent { line: usize },

    #[error("unterminated string starting on line {line}")]
    UnterminatedString { line: usize },

    #[error("unterminated block comment starting on line {line}")]
    UnterminatedComment { line: usize },

    #[error("unbalanced closing brace on line {line}")]
    UnbalancedBraces { line: usize },

    #[error("block opened on line {line} is never closed")]
    UnclosedBlock { line: usize },

    #[error("inconsistent spans: {0}")]
    InconsistentSpans(String),
}

/// A query could not be served.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("query embedding failed: {0}")]
    Embedding(#[from] repoqa_llm::LlmError),

    #[error("vector search failed: {0}")]
    Store(#[from] repoqa_store::VectorStoreError),

    #[error("stored point {id} has a malformed payload: {reason}")]
    MalformedPayload { id: String, reason: String },
}

pub type Result<T> = std::result::Result<T, IndexError>;
