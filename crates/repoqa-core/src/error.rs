use std::path::PathBuf;

use crate::synthesizer::Answer;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid intent pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Why a question produced no trusted answer.
#[derive(Debug, thiserror::Error)]
pub enum QaError {
    #[error("no relevant content found in the index")]
    NoRelevantContent,

    #[error("retrieval failed: {0}")]
    Retrieval(#[from] repoqa_index::error::RetrievalError),

    #[error("answer generation failed: {0}")]
    Synthesis(#[source] repoqa_llm::LlmError),

    #[error("answer could not be verified against its citations")]
    Unverified(Box<Answer>),

    #[error("cancelled")]
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("collection `{0}` does not exist")]
    MissingCollection(String),

    #[error("vector store error: {0}")]
    VectorStore(#[from] repoqa_store::VectorStoreError),

    #[error("record store error: {0}")]
    Store(#[from] repoqa_store::StoreError),
}
