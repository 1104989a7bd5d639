//! Ingestion orchestrator: scan → chunk → diff → embed → store.
//!
//! Each run compares the fingerprints a file produces now with the
//! [`IngestionRecord`]s stored for that path. New fingerprints are embedded
//! and upserted, vanished ones are deleted, and the rest are only stamped with
//! the current run id. Re-running on an unchanged tree therefore embeds and
//! writes nothing.
//!
//! Records are scoped to the target collection. A file with no records gets
//! every chunk embedded, after which any of its points not written by the
//! current run are swept from the collection by a `path` filter.

use std::collections::HashSet;
use std::fmt::Display;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use repoqa_llm::provider::LlmProvider;
use repoqa_llm::retry::{RetryPolicy, call_with_retry};
use repoqa_store::{
    FieldCondition, IngestionRecord, RecordStore, RunId, VectorFilter, VectorPoint, VectorStore,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::chunker::{ChunkerConfig, chunk_file};
use crate::context::contextualize_for_embedding;
use crate::error::Result;
use crate::metadata::{
    FIELD_CHUNK_TYPE, FIELD_INGEST_RUN, FIELD_LANGUAGE, FIELD_PATH, IndexedDocument, assemble,
};
use crate::scanner::{ScanConfig, read_source, scan};

#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub collection: String,
    pub scan: ScanConfig,
    pub chunker: ChunkerConfig,
    /// Files processed at the same time.
    pub concurrency: usize,
    /// Texts per embedding request.
    pub embed_batch_size: usize,
    /// Timeout and backoff for embedding calls.
    pub retry: RetryPolicy,
    /// Extra attempts for each vector or record store write.
    pub store_write_retries: u32,
    /// Re-embed every chunk, even unchanged ones.
    pub force: bool,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            collection: "repoqa_code".into(),
            scan: ScanConfig::default(),
            chunker: ChunkerConfig::default(),
            concurrency: 4,
            embed_batch_size: 16,
            retry: RetryPolicy::default(),
            store_write_retries: 1,
            force: false,
        }
    }
}

/// Summary of an ingestion run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct IndexReport {
    pub run_id: RunId,
    pub files_scanned: usize,
    pub files_indexed: usize,
    pub files_unchanged: usize,
    pub files_skipped: usize,
    pub files_failed: usize,
    pub files_removed: usize,
    /// Chunks embedded for files that had no prior records.
    pub chunks_created: usize,
    /// Chunks embedded for files that were already indexed.
    pub chunks_updated: usize,
    pub chunks_unchanged: usize,
    pub chunks_deleted: usize,
    pub chunks_failed: usize,
    pub skipped: Vec<String>,
    pub failures: Vec<String>,
    /// The run stopped scheduling files before reaching the end of the scan.
    pub cancelled: bool,
    pub duration_ms: u64,
}

impl IndexReport {
    /// Whether any file or cleanup step failed. Skipped files do not count.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.files_failed > 0 || !self.failures.is_empty()
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct FileStats {
    created: usize,
    updated: usize,
    unchanged: usize,
    deleted: usize,
    failed: usize,
}

#[derive(Debug)]
enum FileStatus {
    Indexed,
    Unchanged,
    Skipped(String),
    Failed(String),
}

#[derive(Debug)]
struct FileResult {
    path: String,
    status: FileStatus,
    stats: FileStats,
}

/// Diff of one file's current chunks against its stored records.
struct FilePlan {
    path: String,
    fresh: Vec<IndexedDocument>,
    unchanged: Vec<String>,
    stale: Vec<IngestionRecord>,
    /// Fingerprints that already had a record before this run.
    known: HashSet<String>,
    previously_indexed: bool,
}

impl FilePlan {
    /// Point ids among `embedded` that no record tracked before this run.
    fn untracked_ids(&self, embedded: &[(&IndexedDocument, Vec<f32>)]) -> Vec<String> {
        embedded
            .iter()
            .filter(|(doc, _)| !self.known.contains(&doc.fingerprint))
            .map(|(doc, _)| doc.point_id())
            .collect()
    }
}

fn plan(
    path: &str,
    docs: Vec<IndexedDocument>,
    prior: Vec<IngestionRecord>,
    force: bool,
) -> FilePlan {
    let current: HashSet<&str> = docs.iter().map(|d| d.fingerprint.as_str()).collect();
    let known: HashSet<String> = prior.iter().map(|r| r.fingerprint.clone()).collect();

    let unchanged: Vec<String> = if force {
        Vec::new()
    } else {
        docs.iter()
            .filter(|d| known.contains(&d.fingerprint))
            .map(|d| d.fingerprint.clone())
            .collect()
    };
    let stale: Vec<IngestionRecord> = prior
        .iter()
        .filter(|r| !current.contains(r.fingerprint.as_str()))
        .cloned()
        .collect();
    let fresh: Vec<IndexedDocument> = if force {
        docs
    } else {
        docs.into_iter()
            .filter(|d| !known.contains(&d.fingerprint))
            .collect()
    };

    FilePlan {
        path: path.to_owned(),
        fresh,
        unchanged,
        stale,
        known,
        previously_indexed: !prior.is_empty(),
    }
}

fn to_record(collection: &str, doc: &IndexedDocument, run: RunId) -> IngestionRecord {
    IngestionRecord {
        collection: collection.to_owned(),
        fingerprint: doc.fingerprint.clone(),
        path: doc.chunk.path.clone(),
        point_id: doc.point_id(),
        chunk_type: doc.chunk.kind.as_str().to_owned(),
        line_start: doc.chunk.line_start,
        line_end: doc.chunk.line_end,
        last_run: run,
    }
}

/// Points of `path` that were not written by `run`.
fn untracked_filter(path: &str, run: RunId) -> VectorFilter {
    VectorFilter {
        must: vec![FieldCondition::text(FIELD_PATH, path)],
        must_not: vec![FieldCondition::integer(FIELD_INGEST_RUN, run)],
    }
}

/// Keeps a vector store in sync with a repository tree.
pub struct CodeIndexer<P: LlmProvider> {
    vectors: Arc<dyn VectorStore>,
    records: Arc<dyn RecordStore>,
    provider: Arc<P>,
    config: IndexerConfig,
}

impl<P: LlmProvider> CodeIndexer<P> {
    #[must_use]
    pub fn new(
        vectors: Arc<dyn VectorStore>,
        records: Arc<dyn RecordStore>,
        provider: Arc<P>,
        config: IndexerConfig,
    ) -> Self {
        Self {
            vectors,
            records,
            provider,
            config,
        }
    }

    /// Run one ingestion pass over `root`.
    ///
    /// Per-file problems are collected in the report; they never abort the
    /// run. Cancelling `cancel` stops scheduling new files; files already
    /// being processed finish their writes.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` is not a directory, the embedding probe
    /// fails, or the collection or run id cannot be set up.
    pub async fn index(&self, root: &Path, cancel: &CancellationToken) -> Result<IndexReport> {
        let start = Instant::now();
        let mut report = IndexReport::default();

        let outcome = scan(root, &self.config.scan)?;
        report.files_scanned = outcome.files.len();
        for err in outcome.skipped {
            report.skipped.push(err.to_string());
        }

        let probe = call_with_retry("embed probe", &self.config.retry, || {
            self.provider.embed("probe")
        })
        .await?;
        let vector_size = u64::try_from(probe.len())?;
        let collection = &self.config.collection;
        self.vectors.ensure_collection(collection, vector_size).await?;
        for field in [FIELD_PATH, FIELD_CHUNK_TYPE, FIELD_LANGUAGE] {
            self.vectors.ensure_payload_index(collection, field).await?;
        }

        let run = self
            .records
            .begin_run(collection, &root.display().to_string())
            .await?;
        report.run_id = run;
        tracing::info!(
            run,
            collection = %collection,
            files = outcome.files.len(),
            provider = self.provider.name(),
            "ingestion started"
        );

        let results: Vec<FileResult> = futures::stream::iter(outcome.files.iter())
            .take_while(|_| std::future::ready(!cancel.is_cancelled()))
            .map(|rel| self.process_file(root, rel, run))
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        report.cancelled = results.len() < outcome.files.len();
        for result in results {
            report.absorb(result);
        }

        if report.cancelled {
            tracing::warn!(run, "ingestion cancelled, skipping removal of vanished files");
        } else {
            self.remove_vanished(&outcome.files, &mut report).await;
        }

        report.duration_ms = start.elapsed().as_millis().try_into().unwrap_or(u64::MAX);
        tracing::info!(
            run,
            indexed = report.files_indexed,
            unchanged = report.files_unchanged,
            skipped = report.files_skipped,
            failed = report.files_failed,
            removed = report.files_removed,
            created = report.chunks_created,
            updated = report.chunks_updated,
            deleted = report.chunks_deleted,
            duration_ms = report.duration_ms,
            "ingestion finished"
        );
        Ok(report)
    }

    async fn process_file(&self, root: &Path, rel: &str, run: RunId) -> FileResult {
        let mut stats = FileStats::default();
        let finish = |status, stats| FileResult {
            path: rel.to_owned(),
            status,
            stats,
        };

        let file = match read_source(root, rel, self.config.scan.max_file_bytes).await {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!(file = %rel, "skipping file: {e}");
                return finish(FileStatus::Skipped(e.to_string()), stats);
            }
        };

        let docs: Vec<IndexedDocument> = chunk_file(&file, &self.config.chunker)
            .into_iter()
            .map(|chunk| assemble(chunk, &file))
            .collect();

        let prior = match self
            .records
            .records_for_path(&self.config.collection, rel)
            .await
        {
            Ok(prior) => prior,
            Err(e) => return finish(FileStatus::Failed(format!("loading records: {e}")), stats),
        };
        let plan = plan(rel, docs, prior, self.config.force);
        stats.unchanged = plan.unchanged.len();

        let (embedded, embed_error) = self.embed_documents(rel, &plan.fresh).await;
        stats.failed = plan.fresh.len() - embedded.len();

        if let Err(e) = self.write(run, &embedded, &plan, embed_error.is_none()).await {
            tracing::warn!(file = %rel, "store write failed: {e}");
            stats.failed = plan.fresh.len();
            return finish(FileStatus::Failed(e), stats);
        }

        if plan.previously_indexed {
            stats.updated = embedded.len();
        } else {
            stats.created = embedded.len();
        }
        if embed_error.is_none() {
            stats.deleted = plan.stale.len();
        }

        if let Some(e) = embed_error {
            return finish(FileStatus::Failed(e), stats);
        }
        if stats.created + stats.updated + stats.deleted == 0 {
            tracing::debug!(file = %rel, unchanged = stats.unchanged, "file unchanged");
            return finish(FileStatus::Unchanged, stats);
        }
        tracing::info!(
            file = %rel,
            created = stats.created,
            updated = stats.updated,
            unchanged = stats.unchanged,
            deleted = stats.deleted,
            "file indexed"
        );
        finish(FileStatus::Indexed, stats)
    }

    /// Embed `docs` in batches. Returns the embedded documents with their
    /// vectors and the first batch error, if any.
    async fn embed_documents<'a>(
        &self,
        rel: &str,
        docs: &'a [IndexedDocument],
    ) -> (Vec<(&'a IndexedDocument, Vec<f32>)>, Option<String>) {
        let mut embedded = Vec::with_capacity(docs.len());
        let mut first_error = None;

        for batch in docs.chunks(self.config.embed_batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(contextualize_for_embedding).collect();
            let result = call_with_retry("embed batch", &self.config.retry, || {
                self.provider.embed_batch(&texts)
            })
            .await;
            match result {
                Ok(vectors) if vectors.len() == batch.len() => {
                    embedded.extend(batch.iter().zip(vectors));
                }
                Ok(vectors) => {
                    let msg = format!(
                        "embedding returned {} vectors for {} chunks",
                        vectors.len(),
                        batch.len()
                    );
                    tracing::warn!(file = %rel, "{msg}");
                    first_error.get_or_insert(msg);
                }
                Err(e) => {
                    tracing::warn!(file = %rel, chunks = batch.len(), "embedding failed: {e}");
                    first_error.get_or_insert_with(|| format!("embedding: {e}"));
                }
            }
        }
        (embedded, first_error)
    }

    /// Apply one file's changes: upsert, record, then drop stale and stamp
    /// unchanged. Stale chunks are only removed when `complete`.
    ///
    /// If the records cannot be written, the points just upserted for
    /// untracked fingerprints are deleted again so the file keeps its prior
    /// state.
    async fn write(
        &self,
        run: RunId,
        embedded: &[(&IndexedDocument, Vec<f32>)],
        plan: &FilePlan,
        complete: bool,
    ) -> std::result::Result<(), String> {
        let collection = self.config.collection.as_str();

        if !embedded.is_empty() {
            let points: Vec<VectorPoint> = embedded
                .iter()
                .map(|(doc, vector)| VectorPoint {
                    id: doc.point_id(),
                    vector: vector.clone(),
                    payload: doc.to_payload(run),
                })
                .collect();
            let records: Vec<IngestionRecord> = embedded
                .iter()
                .map(|(doc, _)| to_record(collection, doc, run))
                .collect();

            self.retry_write("upsert vectors", || {
                self.vectors.upsert(collection, points.clone())
            })
            .await?;
            if let Err(e) = self
                .retry_write("put records", || self.records.put(records.clone()))
                .await
            {
                return Err(self.roll_back(plan.untracked_ids(embedded), e).await);
            }
        }

        if complete && !plan.previously_indexed {
            self.retry_write("sweep untracked vectors", || {
                self.vectors
                    .delete_by_filter(collection, untracked_filter(&plan.path, run))
            })
            .await?;
        }

        if complete && !plan.stale.is_empty() {
            let ids: Vec<String> = plan.stale.iter().map(|r| r.point_id.clone()).collect();
            let fingerprints: Vec<String> =
                plan.stale.iter().map(|r| r.fingerprint.clone()).collect();
            self.retry_write("delete vectors", || {
                self.vectors.delete_by_ids(collection, ids.clone())
            })
            .await?;
            self.retry_write("delete records", || {
                self.records.delete(collection, fingerprints.clone())
            })
            .await?;
        }

        if !plan.unchanged.is_empty() {
            self.retry_write("touch records", || {
                self.records.touch(collection, plan.unchanged.clone(), run)
            })
            .await?;
        }
        Ok(())
    }

    /// Delete points whose records were never written. Returns `error`,
    /// extended when the rollback itself fails.
    async fn roll_back(&self, ids: Vec<String>, error: String) -> String {
        if ids.is_empty() {
            return error;
        }
        let collection = self.config.collection.as_str();
        match self
            .retry_write("roll back vectors", || {
                self.vectors.delete_by_ids(collection, ids.clone())
            })
            .await
        {
            Ok(()) => {
                tracing::debug!(points = ids.len(), "rolled back unrecorded vectors");
                error
            }
            Err(rollback) => {
                tracing::error!(points = ids.len(), "unrecorded vectors left behind: {rollback}");
                format!("{error}; {rollback}")
            }
        }
    }

    async fn retry_write<T, E, F, Fut>(&self, operation: &str, mut f: F) -> std::result::Result<T, String>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let mut attempt = 0u32;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.config.store_write_retries => {
                    attempt += 1;
                    tracing::warn!(operation, attempt, "store write failed, retrying: {e}");
                }
                Err(e) => return Err(format!("{operation}: {e}")),
            }
        }
    }

    /// Drop every indexed path that the scan no longer produced.
    async fn remove_vanished(&self, scanned: &[String], report: &mut IndexReport) {
        let indexed = match self.records.indexed_paths(&self.config.collection).await {
            Ok(paths) => paths,
            Err(e) => {
                report.failures.push(format!("listing indexed paths: {e}"));
                return;
            }
        };
        let scanned: HashSet<&str> = scanned.iter().map(String::as_str).collect();

        for path in indexed.iter().filter(|p| !scanned.contains(p.as_str())) {
            match self.remove_path(path).await {
                Ok(deleted) => {
                    tracing::info!(file = %path, deleted, "file removed from index");
                    report.files_removed += 1;
                    report.chunks_deleted += deleted;
                }
                Err(e) => {
                    tracing::warn!(file = %path, "cleanup failed: {e}");
                    report.failures.push(format!("cleanup {path}: {e}"));
                }
            }
        }
    }

    async fn remove_path(&self, path: &str) -> std::result::Result<usize, String> {
        let collection = self.config.collection.as_str();
        let records = self
            .records
            .records_for_path(collection, path)
            .await
            .map_err(|e| format!("loading records: {e}"))?;
        let ids: Vec<String> = records.iter().map(|r| r.point_id.clone()).collect();
        let fingerprints: Vec<String> = records.iter().map(|r| r.fingerprint.clone()).collect();

        self.retry_write("delete vectors", || {
            self.vectors.delete_by_ids(collection, ids.clone())
        })
        .await?;
        self.retry_write("delete records", || {
            self.records.delete(collection, fingerprints.clone())
        })
        .await?;
        Ok(records.len())
    }
}

impl IndexReport {
    fn absorb(&mut self, result: FileResult) {
        let FileResult { path, status, stats } = result;
        match status {
            FileStatus::Indexed => self.files_indexed += 1,
            FileStatus::Unchanged => self.files_unchanged += 1,
            FileStatus::Skipped(reason) => {
                self.files_skipped += 1;
                self.skipped.push(reason);
            }
            FileStatus::Failed(reason) => {
                self.files_failed += 1;
                self.failures.push(format!("{path}: {reason}"));
            }
        }
        self.chunks_created += stats.created;
        self.chunks_updated += stats.updated;
        self.chunks_unchanged += stats.unchanged;
        self.chunks_deleted += stats.deleted;
        self.chunks_failed += stats.failed;
    }
}
