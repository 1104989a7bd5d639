//! Classify, retrieve, synthesize.

use repoqa_index::intent::{Intent, IntentClassifier, RetrievalProfiles};
use repoqa_index::retriever::CodeRetriever;
use repoqa_llm::provider::LlmProvider;
use tokio_util::sync::CancellationToken;

use crate::error::QaError;
use crate::synthesizer::{Answer, Synthesizer};

/// Query entry point.
///
/// Holds only read-only state, so one pipeline can serve concurrent
/// questions while an ingestion run writes to the same stores.
pub struct QaPipeline<P: LlmProvider> {
    classifier: IntentClassifier,
    profiles: RetrievalProfiles,
    retriever: CodeRetriever<P>,
    synthesizer: Synthesizer<P>,
    require_verified: bool,
}

impl<P: LlmProvider> QaPipeline<P> {
    #[must_use]
    pub fn new(
        classifier: IntentClassifier,
        profiles: RetrievalProfiles,
        retriever: CodeRetriever<P>,
        synthesizer: Synthesizer<P>,
    ) -> Self {
        Self {
            classifier,
            profiles,
            retriever,
            synthesizer,
            require_verified: false,
        }
    }

    /// Turn answers that fail the citation check into [`QaError::Unverified`].
    #[must_use]
    pub fn with_require_verified(mut self, require: bool) -> Self {
        self.require_verified = require;
        self
    }

    #[must_use]
    pub fn classify(&self, question: &str) -> Intent {
        self.classifier.classify(question)
    }

    /// Answer `question` from the index.
    ///
    /// # Errors
    ///
    /// - [`QaError::NoRelevantContent`] when retrieval returns nothing.
    /// - [`QaError::Retrieval`] when the embedding or search call fails.
    /// - [`QaError::Synthesis`] when the model call fails after retries.
    /// - [`QaError::Unverified`] when verified answers are required and the
    ///   answer failed the citation check.
    /// - [`QaError::Cancelled`] when `cancel` fires first.
    pub async fn ask(&self, question: &str, cancel: &CancellationToken) -> Result<Answer, QaError> {
        let intent = self.classify(question);
        let profile = self.profiles.for_intent(intent);
        tracing::info!(%intent, k = profile.k, "answering question");

        let retrieval = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(QaError::Cancelled),
            result = self.retriever.retrieve(question, intent, profile) => result?,
        };
        if retrieval.is_empty() {
            return Err(QaError::NoRelevantContent);
        }

        let answer = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(QaError::Cancelled),
            result = self.synthesizer.synthesize(question, &retrieval) => {
                result.map_err(QaError::Synthesis)?
            }
        };

        tracing::info!(
            citations = answer.citations.len(),
            verified = answer.is_verified(),
            "answer ready"
        );
        if self.require_verified && !answer.is_verified() {
            return Err(QaError::Unverified(Box::new(answer)));
        }
        Ok(answer)
    }
}
