//! Intent-tuned similarity search over indexed chunks.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use repoqa_llm::provider::LlmProvider;
use repoqa_llm::retry::{RetryPolicy, call_with_retry};
use repoqa_store::{FieldCondition, ScoredVectorPoint, VectorFilter, VectorStore};

use crate::error::RetrievalError;
use crate::intent::{Intent, RetrievalProfile};
use crate::metadata::{ChunkKind, FIELD_CHUNK_TYPE, IndexedDocument};

#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub collection: String,
    /// Hits scoring below this are dropped.
    pub score_threshold: f32,
    pub retry: RetryPolicy,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            collection: "repoqa_code".into(),
            score_threshold: 0.0,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedDocument {
    pub document: IndexedDocument,
    pub score: f32,
    /// Run that wrote the point; earlier runs win score ties.
    pub ingest_run: i64,
}

/// Retrieved documents, most relevant first.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalResult {
    pub intent: Intent,
    pub documents: Vec<RetrievedDocument>,
}

impl RetrievalResult {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexedDocument> {
        self.documents.iter().map(|d| &d.document)
    }
}

/// Read-only query side of the vector store.
pub struct CodeRetriever<P: LlmProvider> {
    store: Arc<dyn VectorStore>,
    provider: Arc<P>,
    config: RetrievalConfig,
}

impl<P: LlmProvider> CodeRetriever<P> {
    #[must_use]
    pub fn new(store: Arc<dyn VectorStore>, provider: Arc<P>, config: RetrievalConfig) -> Self {
        Self {
            store,
            provider,
            config,
        }
    }

    /// Retrieve at most `profile.k` documents for `query`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query cannot be embedded, the search fails, or
    /// a stored point does not follow the document schema. No partial result
    /// is returned.
    pub async fn retrieve(
        &self,
        query: &str,
        intent: Intent,
        profile: &RetrievalProfile,
    ) -> Result<RetrievalResult, RetrievalError> {
        let k = profile.k;
        if k == 0 {
            return Ok(RetrievalResult {
                intent,
                documents: Vec::new(),
            });
        }

        let vector = call_with_retry("embed query", &self.config.retry, || {
            self.provider.embed(query)
        })
        .await?;
        let limit = u64::try_from(k.saturating_mul(2)).unwrap_or(u64::MAX);

        let mut selected = match bias_filter(&profile.preferred_kinds) {
            Some(filter) => {
                let hits = self
                    .store
                    .search(&self.config.collection, vector.clone(), limit, Some(filter))
                    .await?;
                self.rank(hits)?
            }
            None => Vec::new(),
        };
        selected.truncate(k);

        if selected.len() < k {
            let taken: HashSet<String> = selected
                .iter()
                .map(|d| d.document.fingerprint.clone())
                .collect();
            let hits = self
                .store
                .search(&self.config.collection, vector, limit, None)
                .await?;
            let fill = self
                .rank(hits)?
                .into_iter()
                .filter(|d| !taken.contains(&d.document.fingerprint))
                .take(k - selected.len());
            selected.extend(fill);
            selected.sort_by(compare);
        }

        tracing::debug!(%intent, k, returned = selected.len(), "retrieval finished");
        Ok(RetrievalResult {
            intent,
            documents: selected,
        })
    }

    /// Decode, threshold and order raw hits.
    fn rank(&self, hits: Vec<ScoredVectorPoint>) -> Result<Vec<RetrievedDocument>, RetrievalError> {
        let mut docs = Vec::with_capacity(hits.len());
        for hit in hits {
            if hit.score < self.config.score_threshold {
                continue;
            }
            let (document, ingest_run) = IndexedDocument::from_payload(&hit.payload)
                .map_err(|reason| RetrievalError::MalformedPayload { id: hit.id, reason })?;
            docs.push(RetrievedDocument {
                document,
                score: hit.score,
                ingest_run,
            });
        }
        docs.sort_by(compare);
        Ok(docs)
    }
}

/// Excludes every kind outside `preferred`. `None` when there is nothing to exclude.
fn bias_filter(preferred: &[ChunkKind]) -> Option<VectorFilter> {
    let must_not: Vec<FieldCondition> = ChunkKind::ALL
        .into_iter()
        .filter(|k| !preferred.contains(k))
        .map(|k| FieldCondition::text(FIELD_CHUNK_TYPE, k.as_str()))
        .collect();
    if preferred.is_empty() || must_not.is_empty() {
        return None;
    }
    Some(VectorFilter {
        must: Vec::new(),
        must_not,
    })
}

fn compare(a: &RetrievedDocument, b: &RetrievedDocument) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then(a.ingest_run.cmp(&b.ingest_run))
        .then_with(|| a.document.chunk.path.cmp(&b.document.chunk.path))
        .then(a.document.chunk.seq.cmp(&b.document.chunk.seq))
}
