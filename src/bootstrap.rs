//! Builds providers and stores from configuration.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use repoqa_core::config::{Config, ProviderKind, Secret};
use repoqa_llm::any::AnyProvider;
use repoqa_llm::ollama::OllamaProvider;
use repoqa_llm::openai::OpenAiProvider;
use repoqa_store::{InMemoryRecordStore, QdrantOps, RecordStore, SqliteRecordStore, VectorStore};

pub fn create_provider(config: &Config) -> anyhow::Result<AnyProvider> {
    match config.llm.provider {
        ProviderKind::Ollama => Ok(AnyProvider::Ollama(OllamaProvider::new(
            &config.llm.base_url,
            config.llm.model.clone(),
            config.llm.embedding_model.clone(),
        ))),
        ProviderKind::OpenAi => {
            let openai_cfg = config
                .llm
                .openai
                .as_ref()
                .context("llm.openai config section required for OpenAI provider")?;
            let api_key = config
                .secrets
                .openai_api_key
                .as_ref()
                .context("REPOQA_OPENAI_API_KEY is not set")?
                .expose()
                .to_owned();
            Ok(AnyProvider::OpenAi(OpenAiProvider::new(
                api_key,
                openai_cfg.base_url.clone(),
                openai_cfg.model.clone(),
                openai_cfg.max_tokens,
                openai_cfg.embedding_model.clone(),
            )))
        }
    }
}

/// Log whether the configured backend answers. Never fails.
pub async fn health_check(provider: &AnyProvider) {
    if let AnyProvider::Ollama(ollama) = provider {
        match ollama.health_check().await {
            Ok(()) => tracing::info!("ollama health check passed"),
            Err(e) => tracing::warn!("ollama health check failed: {e:#}"),
        }
    }
}

pub fn create_vector_store(config: &Config) -> anyhow::Result<Arc<dyn VectorStore>> {
    let api_key = config.secrets.qdrant_api_key.as_ref().map(Secret::expose);
    let ops = QdrantOps::new(&config.store.qdrant_url, api_key)
        .with_context(|| format!("failed to create Qdrant client for {}", config.store.qdrant_url))?;
    Ok(Arc::new(ops))
}

/// Whether ingestion records outlive the process.
pub fn records_are_persistent(config: &Config) -> bool {
    config.store.sqlite_path != ":memory:"
}

/// Ingesting into Qdrant needs records that outlive the process, or the
/// cleanup of vanished files has nothing to work from.
pub fn ensure_persistent_records(config: &Config) -> anyhow::Result<()> {
    anyhow::ensure!(
        records_are_persistent(config),
        "store.sqlite_path = \":memory:\" cannot track the Qdrant collection {}; \
         set it to a database file",
        config.store.collection
    );
    Ok(())
}

pub async fn create_record_store(config: &Config) -> anyhow::Result<Arc<dyn RecordStore>> {
    if !records_are_persistent(config) {
        tracing::warn!("ingestion records are kept in memory and are lost when the process exits");
        return Ok(Arc::new(InMemoryRecordStore::new()));
    }
    let path = &config.store.sqlite_path;
    if let Some(parent) = Path::new(path).parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    let store = SqliteRecordStore::new(path)
        .await
        .with_context(|| format!("failed to open record store {path}"))?;
    Ok(Arc::new(store))
}
