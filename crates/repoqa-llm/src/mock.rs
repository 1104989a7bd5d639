//! Deterministic in-process provider for tests.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::error::LlmError;
use crate::provider::{LlmProvider, Message};

/// Scripted chat replies plus bag-of-words embeddings.
///
/// Embeddings hash each lower-cased word into one of `dimensions` buckets and
/// normalize the result, so texts sharing vocabulary score higher under
/// cosine similarity. Clones share the reply queue and call counters.
#[derive(Debug, Clone)]
pub struct MockProvider {
    responses: Arc<Mutex<Vec<String>>>,
    chat_log: Arc<Mutex<Vec<Vec<Message>>>>,
    embedded_texts: Arc<AtomicUsize>,
    transient_embed_failures: Arc<AtomicUsize>,
    pub default_response: String,
    pub dimensions: usize,
    pub supports_embeddings: bool,
    pub fail_chat: bool,
    /// Any text containing this marker fails to embed with a permanent error.
    pub failing_embed_marker: Option<String>,
    /// Milliseconds to sleep before returning a response.
    pub delay_ms: u64,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            chat_log: Arc::new(Mutex::new(Vec::new())),
            embedded_texts: Arc::new(AtomicUsize::new(0)),
            transient_embed_failures: Arc::new(AtomicUsize::new(0)),
            default_response: "mock response".into(),
            dimensions: 64,
            supports_embeddings: true,
            fail_chat: false,
            failing_embed_marker: None,
            delay_ms: 0,
        }
    }
}

impl MockProvider {
    #[must_use]
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_chat: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn without_embeddings() -> Self {
        Self {
            supports_embeddings: false,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions;
        self
    }

    #[must_use]
    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    #[must_use]
    pub fn with_failing_embed_marker(mut self, marker: impl Into<String>) -> Self {
        self.failing_embed_marker = Some(marker.into());
        self
    }

    /// Make the next `n` embedding calls fail with a rate-limit error.
    pub fn fail_next_embeds(&self, n: usize) {
        self.transient_embed_failures.store(n, Ordering::SeqCst);
    }

    /// Every message list passed to `chat`, oldest first.
    #[must_use]
    pub fn chat_calls(&self) -> Vec<Vec<Message>> {
        self.chat_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of texts embedded successfully so far.
    #[must_use]
    pub fn embedded_count(&self) -> usize {
        self.embedded_texts.load(Ordering::SeqCst)
    }

    /// The vector this provider returns for `text`.
    #[must_use]
    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        bag_of_words(text, self.dimensions)
    }

    async fn pause(&self) {
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
    }

    fn check_embed(&self, texts: &[String]) -> Result<(), LlmError> {
        if !self.supports_embeddings {
            return Err(LlmError::EmbedUnsupported {
                provider: "mock".into(),
            });
        }
        let pending = self.transient_embed_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.transient_embed_failures
                .store(pending - 1, Ordering::SeqCst);
            return Err(LlmError::RateLimited {
                retry_after: Some(Duration::ZERO),
            });
        }
        if let Some(marker) = &self.failing_embed_marker
            && texts.iter().any(|t| t.contains(marker.as_str()))
        {
            return Err(LlmError::Other("mock embedding error".into()));
        }
        Ok(())
    }
}

fn bag_of_words(text: &str, dimensions: usize) -> Vec<f32> {
    let dimensions = dimensions.max(1);
    let mut vector = vec![0.0f32; dimensions];
    for word in text
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
    {
        let mut hasher = DefaultHasher::new();
        word.to_lowercase().hash(&mut hasher);
        let bucket = usize::try_from(hasher.finish() % dimensions as u64).unwrap_or(0);
        vector[bucket] += 1.0;
    }
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        vector[0] = 1.0;
    } else {
        for x in &mut vector {
            *x /= norm;
        }
    }
    vector
}

impl LlmProvider for MockProvider {
    async fn chat(&self, messages: &[Message]) -> Result<String, LlmError> {
        self.pause().await;
        self.chat_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(messages.to_vec());
        if self.fail_chat {
            return Err(LlmError::Other("mock LLM error".into()));
        }
        let mut responses = self.responses.lock().unwrap_or_else(PoisonError::into_inner);
        if responses.is_empty() {
            Ok(self.default_response.clone())
        } else {
            Ok(responses.remove(0))
        }
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        self.pause().await;
        self.check_embed(&[text.to_owned()])?;
        self.embedded_texts.fetch_add(1, Ordering::SeqCst);
        Ok(bag_of_words(text, self.dimensions))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        self.pause().await;
        self.check_embed(texts)?;
        self.embedded_texts.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|t| bag_of_words(t, self.dimensions))
            .collect())
    }

    fn supports_embeddings(&self) -> bool {
        self.supports_embeddings
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "mock"
    }
}
