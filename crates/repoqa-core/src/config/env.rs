use super::{Config, Secret};

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_llm();
        self.apply_env_overrides_index();
        self.apply_env_overrides_secrets();
    }

    fn apply_env_overrides_llm(&mut self) {
        if let Ok(v) = std::env::var("REPOQA_LLM_PROVIDER") {
            if let Ok(kind) = serde_json::from_value(serde_json::Value::String(v.clone())) {
                self.llm.provider = kind;
            } else {
                tracing::warn!("ignoring invalid REPOQA_LLM_PROVIDER value: {v}");
            }
        }
        if let Ok(v) = std::env::var("REPOQA_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("REPOQA_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("REPOQA_LLM_EMBEDDING_MODEL") {
            self.llm.embedding_model = v;
        }
        if let Ok(v) = std::env::var("REPOQA_TIMEOUT_LLM")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.timeouts.llm_seconds = secs;
        }
        if let Ok(v) = std::env::var("REPOQA_TIMEOUT_EMBEDDING")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.timeouts.embedding_seconds = secs;
        }
        if let Ok(v) = std::env::var("REPOQA_MAX_RETRIES")
            && let Ok(n) = v.parse::<u32>()
        {
            self.timeouts.max_retries = n;
        }
    }

    fn apply_env_overrides_index(&mut self) {
        if let Ok(v) = std::env::var("REPOQA_QDRANT_URL") {
            self.store.qdrant_url = v;
        }
        if let Ok(v) = std::env::var("REPOQA_COLLECTION") {
            self.store.collection = v;
        }
        if let Ok(v) = std::env::var("REPOQA_SQLITE_PATH") {
            self.store.sqlite_path = v;
        }
        if let Ok(v) = std::env::var("REPOQA_CODEBASE_PATH") {
            self.index.codebase_path = v;
        }
        if let Ok(v) = std::env::var("REPOQA_INDEX_MAX_LINES")
            && let Ok(n) = v.parse::<usize>()
        {
            self.index.max_lines = n;
        }
        if let Ok(v) = std::env::var("REPOQA_INDEX_OVERLAP_LINES")
            && let Ok(n) = v.parse::<usize>()
        {
            self.index.overlap_lines = n;
        }
        if let Ok(v) = std::env::var("REPOQA_INDEX_CONCURRENCY")
            && let Ok(n) = v.parse::<usize>()
        {
            self.index.concurrency = n;
        }
    }

    fn apply_env_overrides_secrets(&mut self) {
        if let Ok(v) = std::env::var("REPOQA_OPENAI_API_KEY")
            && !v.is_empty()
        {
            self.secrets.openai_api_key = Some(Secret::new(v));
        }
        if let Ok(v) = std::env::var("REPOQA_QDRANT_API_KEY")
            && !v.is_empty()
        {
            self.secrets.qdrant_api_key = Some(Secret::new(v));
        }
    }
}
