use std::fmt;

use repoqa_index::intent::{IntentRule, RetrievalProfiles, default_rules};
use repoqa_index::scanner::{DEFAULT_EXCLUDE_DIRS, DEFAULT_EXTENSIONS};
use serde::{Deserialize, Serialize};

/// Wrapper for sensitive strings with redacted Debug/Display.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalSettings,
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Credentials read from the environment, never from the file.
    #[serde(skip)]
    pub secrets: ResolvedSecrets,
}

/// LLM provider backend selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Ollama,
    OpenAi,
}

impl ProviderKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: ProviderKind,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openai: Option<OpenAiConfig>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            base_url: default_base_url(),
            model: default_model(),
            embedding_model: default_embedding_model(),
            openai: None,
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:11434".into()
}

fn default_model() -> String {
    "qwen2.5-coder:7b".into()
}

fn default_embedding_model() -> String {
    "nomic-embed-text".into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OpenAiConfig {
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_openai_model")]
    pub model: String,
    #[serde(default = "default_openai_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_openai_embedding_model")]
    pub embedding_model: Option<String>,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            model: default_openai_model(),
            max_tokens: default_openai_max_tokens(),
            embedding_model: default_openai_embedding_model(),
        }
    }
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".into()
}

fn default_openai_max_tokens() -> u32 {
    1024
}

#[allow(clippy::unnecessary_wraps)]
fn default_openai_embedding_model() -> Option<String> {
    Some("text-embedding-3-small".into())
}

#[derive(Debug, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    /// `SQLite` file for ingestion records; `:memory:` keeps them in process.
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            qdrant_url: default_qdrant_url(),
            collection: default_collection(),
            sqlite_path: default_sqlite_path(),
        }
    }
}

fn default_qdrant_url() -> String {
    "http://localhost:6334".into()
}

fn default_collection() -> String {
    "repoqa_code".into()
}

fn default_sqlite_path() -> String {
    "./data/repoqa.db".into()
}

#[derive(Debug, Deserialize, Serialize)]
pub struct IndexConfig {
    /// Repository root used when `ingest` is given no `--root`.
    #[serde(default = "default_codebase_path")]
    pub codebase_path: String,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default = "default_exclude_dirs")]
    pub exclude_dirs: Vec<String>,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    #[serde(default = "default_true")]
    pub respect_gitignore: bool,
    #[serde(default)]
    pub include_hidden: bool,
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,
    #[serde(default = "default_overlap_lines")]
    pub overlap_lines: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_embed_batch_size")]
    pub embed_batch_size: usize,
    #[serde(default = "default_store_write_retries")]
    pub store_write_retries: u32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            codebase_path: default_codebase_path(),
            extensions: default_extensions(),
            exclude_dirs: default_exclude_dirs(),
            max_file_bytes: default_max_file_bytes(),
            respect_gitignore: true,
            include_hidden: false,
            max_lines: default_max_lines(),
            overlap_lines: default_overlap_lines(),
            concurrency: default_concurrency(),
            embed_batch_size: default_embed_batch_size(),
            store_write_retries: default_store_write_retries(),
        }
    }
}

fn default_codebase_path() -> String {
    ".".into()
}

fn default_extensions() -> Vec<String> {
    DEFAULT_EXTENSIONS.iter().map(|&e| e.to_owned()).collect()
}

fn default_exclude_dirs() -> Vec<String> {
    DEFAULT_EXCLUDE_DIRS.iter().map(|&d| d.to_owned()).collect()
}

fn default_max_file_bytes() -> u64 {
    1024 * 1024
}

fn default_true() -> bool {
    true
}

fn default_max_lines() -> usize {
    200
}

fn default_overlap_lines() -> usize {
    20
}

fn default_concurrency() -> usize {
    4
}

fn default_embed_batch_size() -> usize {
    16
}

fn default_store_write_retries() -> u32 {
    1
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RetrievalSettings {
    /// Minimum cosine similarity, in `[-1, 1]`.
    #[serde(default)]
    pub score_threshold: f32,
    #[serde(default)]
    pub profiles: RetrievalProfiles,
    /// Ordered intent rules; the first matching rule wins.
    #[serde(default = "default_rules")]
    pub intent_rules: Vec<IntentRule>,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            score_threshold: 0.0,
            profiles: RetrievalProfiles::default(),
            intent_rules: default_rules(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct SynthesisConfig {
    /// Stricter re-prompts after a citation violation.
    #[serde(default = "default_regeneration_attempts")]
    pub regeneration_attempts: u32,
    /// Treat unverified answers as errors.
    #[serde(default)]
    pub require_verified: bool,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            regeneration_attempts: default_regeneration_attempts(),
            require_verified: false,
        }
    }
}

fn default_regeneration_attempts() -> u32 {
    1
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_llm_timeout")]
    pub llm_seconds: u64,
    #[serde(default = "default_embedding_timeout")]
    pub embedding_seconds: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            llm_seconds: default_llm_timeout(),
            embedding_seconds: default_embedding_timeout(),
            max_retries: default_max_retries(),
            base_backoff_ms: default_base_backoff_ms(),
        }
    }
}

fn default_llm_timeout() -> u64 {
    120
}

fn default_embedding_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_backoff_ms() -> u64 {
    500
}

#[derive(Debug, Default)]
pub struct ResolvedSecrets {
    pub openai_api_key: Option<Secret>,
    pub qdrant_api_key: Option<Secret>,
}
