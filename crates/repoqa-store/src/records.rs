use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use crate::error::{Result, StoreError};
use crate::vector_store::BoxFuture;

/// Monotonically increasing identifier of one ingestion run.
pub type RunId = i64;

/// Bookkeeping for one indexed chunk, keyed by collection and fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionRecord {
    /// Vector collection holding the chunk's point.
    pub collection: String,
    pub fingerprint: String,
    pub path: String,
    pub point_id: String,
    pub chunk_type: String,
    pub line_start: u32,
    pub line_end: u32,
    pub last_run: RunId,
}

/// Tracks which fingerprints are currently present in each vector collection.
///
/// Every query is scoped to one collection, so one store can back several
/// collections without their states leaking into each other. The ingestion
/// coordinator is the only writer. Implementations must make each call
/// atomic: `put` and `delete` either apply to every given record or to none.
pub trait RecordStore: Send + Sync {
    /// Register a new run of `root` into `collection` and return its id.
    fn begin_run(&self, collection: &str, root: &str) -> BoxFuture<'_, Result<RunId>>;

    fn get(
        &self,
        collection: &str,
        fingerprint: &str,
    ) -> BoxFuture<'_, Result<Option<IngestionRecord>>>;

    /// All records whose source is `path`, ordered by `line_start`.
    fn records_for_path(
        &self,
        collection: &str,
        path: &str,
    ) -> BoxFuture<'_, Result<Vec<IngestionRecord>>>;

    /// Insert or replace records under their own `collection`.
    fn put(&self, records: Vec<IngestionRecord>) -> BoxFuture<'_, Result<()>>;

    fn delete(&self, collection: &str, fingerprints: Vec<String>) -> BoxFuture<'_, Result<()>>;

    /// Mark existing records as seen by `run` without changing anything else.
    fn touch(
        &self,
        collection: &str,
        fingerprints: Vec<String>,
        run: RunId,
    ) -> BoxFuture<'_, Result<()>>;

    /// Distinct source paths with at least one record, sorted.
    fn indexed_paths(&self, collection: &str) -> BoxFuture<'_, Result<Vec<String>>>;
}

type RecordKey = (String, String);

fn key(collection: &str, fingerprint: &str) -> RecordKey {
    (collection.to_owned(), fingerprint.to_owned())
}

#[derive(Default)]
struct Inner {
    last_run: RunId,
    records: BTreeMap<RecordKey, IngestionRecord>,
}

/// [`RecordStore`] kept in process memory.
#[derive(Default)]
pub struct InMemoryRecordStore {
    inner: Mutex<Inner>,
}

impl InMemoryRecordStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl std::fmt::Debug for InMemoryRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryRecordStore").finish_non_exhaustive()
    }
}

impl RecordStore for InMemoryRecordStore {
    fn begin_run(&self, _collection: &str, _root: &str) -> BoxFuture<'_, Result<RunId>> {
        Box::pin(async move {
            let mut inner = self.lock()?;
            inner.last_run += 1;
            Ok(inner.last_run)
        })
    }

    fn get(
        &self,
        collection: &str,
        fingerprint: &str,
    ) -> BoxFuture<'_, Result<Option<IngestionRecord>>> {
        let key = key(collection, fingerprint);
        Box::pin(async move { Ok(self.lock()?.records.get(&key).cloned()) })
    }

    fn records_for_path(
        &self,
        collection: &str,
        path: &str,
    ) -> BoxFuture<'_, Result<Vec<IngestionRecord>>> {
        let collection = collection.to_owned();
        let path = path.to_owned();
        Box::pin(async move {
            let inner = self.lock()?;
            let mut out: Vec<IngestionRecord> = inner
                .records
                .values()
                .filter(|r| r.collection == collection && r.path == path)
                .cloned()
                .collect();
            out.sort_by_key(|r| (r.line_start, r.line_end));
            Ok(out)
        })
    }

    fn put(&self, records: Vec<IngestionRecord>) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut inner = self.lock()?;
            for record in records {
                inner
                    .records
                    .insert(key(&record.collection, &record.fingerprint), record);
            }
            Ok(())
        })
    }

    fn delete(&self, collection: &str, fingerprints: Vec<String>) -> BoxFuture<'_, Result<()>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut inner = self.lock()?;
            for fp in &fingerprints {
                inner.records.remove(&key(&collection, fp));
            }
            Ok(())
        })
    }

    fn touch(
        &self,
        collection: &str,
        fingerprints: Vec<String>,
        run: RunId,
    ) -> BoxFuture<'_, Result<()>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut inner = self.lock()?;
            for fp in &fingerprints {
                if let Some(record) = inner.records.get_mut(&key(&collection, fp)) {
                    record.last_run = run;
                }
            }
            Ok(())
        })
    }

    fn indexed_paths(&self, collection: &str) -> BoxFuture<'_, Result<Vec<String>>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let inner = self.lock()?;
            let paths: BTreeSet<&String> = inner
                .records
                .values()
                .filter(|r| r.collection == collection)
                .map(|r| &r.path)
                .collect();
            Ok(paths.into_iter().cloned().collect())
        })
    }
}
