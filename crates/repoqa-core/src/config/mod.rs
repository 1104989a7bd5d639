mod env;
mod types;


pub use types::*;

use std::path::Path;
use std::time::Duration;

use repoqa_index::chunker::ChunkerConfig;
use repoqa_index::indexer::IndexerConfig;
use repoqa_index::intent::IntentClassifier;
use repoqa_index::retriever::RetrievalConfig;
use repoqa_index::scanner::ScanConfig;
use repoqa_llm::RetryPolicy;

use crate::error::ConfigError;
use crate::synthesizer::SynthesizerConfig;

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            toml::from_str::<Self>(&content)?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Reject settings no component could run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending value, or
    /// [`ConfigError::Pattern`] for an intent rule that does not compile.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let index = &self.index;
        if index.max_lines == 0 {
            return Err(ConfigError::Invalid("index.max_lines must be > 0".into()));
        }
        if index.overlap_lines >= index.max_lines {
            return Err(ConfigError::Invalid(format!(
                "index.overlap_lines ({}) must be < index.max_lines ({})",
                index.overlap_lines, index.max_lines
            )));
        }
        if index.concurrency == 0 {
            return Err(ConfigError::Invalid("index.concurrency must be > 0".into()));
        }
        if index.embed_batch_size == 0 {
            return Err(ConfigError::Invalid("index.embed_batch_size must be > 0".into()));
        }
        if index.extensions.is_empty() {
            return Err(ConfigError::Invalid("index.extensions must not be empty".into()));
        }
        for (intent, profile) in self.retrieval.profiles.iter() {
            if profile.k == 0 {
                return Err(ConfigError::Invalid(format!(
                    "retrieval.profiles.{intent}.k must be > 0"
                )));
            }
        }
        let threshold = self.retrieval.score_threshold;
        if !(-1.0..=1.0).contains(&threshold) {
            return Err(ConfigError::Invalid(format!(
                "retrieval.score_threshold ({threshold}) must be within [-1, 1]"
            )));
        }
        if self.timeouts.llm_seconds == 0 || self.timeouts.embedding_seconds == 0 {
            return Err(ConfigError::Invalid("timeouts must be > 0 seconds".into()));
        }
        self.intent_classifier()?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if an intent rule pattern does not compile.
    pub fn intent_classifier(&self) -> Result<IntentClassifier, ConfigError> {
        Ok(IntentClassifier::new(&self.retrieval.intent_rules)?)
    }

    #[must_use]
    pub fn embedding_retry(&self) -> RetryPolicy {
        self.retry_policy(self.timeouts.embedding_seconds)
    }

    #[must_use]
    pub fn llm_retry(&self) -> RetryPolicy {
        self.retry_policy(self.timeouts.llm_seconds)
    }

    fn retry_policy(&self, timeout_secs: u64) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.timeouts.max_retries,
            base_backoff: Duration::from_millis(self.timeouts.base_backoff_ms),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    #[must_use]
    pub fn indexer_config(&self, force: bool) -> IndexerConfig {
        let index = &self.index;
        IndexerConfig {
            collection: self.store.collection.clone(),
            scan: ScanConfig {
                extensions: index.extensions.clone(),
                exclude_dirs: index.exclude_dirs.clone(),
                max_file_bytes: index.max_file_bytes,
                respect_gitignore: index.respect_gitignore,
                include_hidden: index.include_hidden,
            },
            chunker: ChunkerConfig {
                max_lines: index.max_lines,
                overlap_lines: index.overlap_lines,
            },
            concurrency: index.concurrency,
            embed_batch_size: index.embed_batch_size,
            retry: self.embedding_retry(),
            store_write_retries: index.store_write_retries,
            force,
        }
    }

    #[must_use]
    pub fn retrieval_config(&self) -> RetrievalConfig {
        RetrievalConfig {
            collection: self.store.collection.clone(),
            score_threshold: self.retrieval.score_threshold,
            retry: self.embedding_retry(),
        }
    }

    #[must_use]
    pub fn synthesizer_config(&self) -> SynthesizerConfig {
        SynthesizerConfig {
            regeneration_attempts: self.synthesis.regeneration_attempts,
            retry: self.llm_retry(),
        }
    }
}
