use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::error::Result;
use crate::records::{IngestionRecord, RecordStore, RunId};
use crate::vector_store::BoxFuture;

type RecordRow = (String, String, String, String, String, i64, i64, i64);

/// [`RecordStore`] persisted in a `SQLite` database.
#[derive(Debug, Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    /// Open (or create) the database at `path` and run migrations.
    ///
    /// `":memory:"` opens a private in-memory database on a single connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub async fn new(path: &str) -> Result<Self> {
        let in_memory = path == ":memory:";
        let url = if in_memory {
            "sqlite::memory:".to_owned()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let opts = SqliteConnectOptions::from_str(&url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 4 })
            .connect_with(opts)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::debug!(path, "ingestion record store ready");

        Ok(Self { pool })
    }
}

fn row_to_record(row: RecordRow) -> Result<IngestionRecord> {
    let (collection, fingerprint, path, point_id, chunk_type, line_start, line_end, last_run) =
        row;
    Ok(IngestionRecord {
        collection,
        fingerprint,
        path,
        point_id,
        chunk_type,
        line_start: u32::try_from(line_start)?,
        line_end: u32::try_from(line_end)?,
        last_run,
    })
}

const SELECT_RECORD: &str = "SELECT collection, fingerprint, path, point_id, chunk_type, line_start, line_end, \
     last_run FROM ingestion_records";

impl RecordStore for SqliteRecordStore {
    fn begin_run(&self, collection: &str, root: &str) -> BoxFuture<'_, Result<RunId>> {
        let collection = collection.to_owned();
        let root = root.to_owned();
        Box::pin(async move {
            let row: (i64,) = sqlx::query_as(
                "INSERT INTO ingestion_runs (collection, root) VALUES (?, ?) RETURNING id",
            )
            .bind(&collection)
            .bind(&root)
            .fetch_one(&self.pool)
            .await?;
            Ok(row.0)
        })
    }

    fn get(
        &self,
        collection: &str,
        fingerprint: &str,
    ) -> BoxFuture<'_, Result<Option<IngestionRecord>>> {
        let collection = collection.to_owned();
        let fingerprint = fingerprint.to_owned();
        Box::pin(async move {
            let row: Option<RecordRow> = sqlx::query_as(&format!(
                "{SELECT_RECORD} WHERE collection = ? AND fingerprint = ?"
            ))
            .bind(&collection)
            .bind(&fingerprint)
            .fetch_optional(&self.pool)
            .await?;
            row.map(row_to_record).transpose()
        })
    }

    fn records_for_path(
        &self,
        collection: &str,
        path: &str,
    ) -> BoxFuture<'_, Result<Vec<IngestionRecord>>> {
        let collection = collection.to_owned();
        let path = path.to_owned();
        Box::pin(async move {
            let rows: Vec<RecordRow> = sqlx::query_as(&format!(
                "{SELECT_RECORD} WHERE collection = ? AND path = ? ORDER BY line_start, line_end"
            ))
            .bind(&collection)
            .bind(&path)
            .fetch_all(&self.pool)
            .await?;
            rows.into_iter().map(row_to_record).collect()
        })
    }

    fn put(&self, records: Vec<IngestionRecord>) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if records.is_empty() {
                return Ok(());
            }
            let mut tx = self.pool.begin().await?;
            for r in &records {
                sqlx::query(
                    "INSERT INTO ingestion_records \
                     (collection, fingerprint, path, point_id, chunk_type, line_start, line_end, \
                     last_run) VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
                     ON CONFLICT(collection, fingerprint) DO UPDATE SET \
                     path = excluded.path, point_id = excluded.point_id, \
                     chunk_type = excluded.chunk_type, line_start = excluded.line_start, \
                     line_end = excluded.line_end, last_run = excluded.last_run",
                )
                .bind(&r.collection)
                .bind(&r.fingerprint)
                .bind(&r.path)
                .bind(&r.point_id)
                .bind(&r.chunk_type)
                .bind(i64::from(r.line_start))
                .bind(i64::from(r.line_end))
                .bind(r.last_run)
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await?;
            Ok(())
        })
    }

    fn delete(&self, collection: &str, fingerprints: Vec<String>) -> BoxFuture<'_, Result<()>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            if fingerprints.is_empty() {
                return Ok(());
            }
            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new("DELETE FROM ingestion_records WHERE collection = ");
            qb.push_bind(collection);
            qb.push(" AND fingerprint IN (");
            let mut separated = qb.separated(", ");
            for fp in fingerprints {
                separated.push_bind(fp);
            }
            separated.push_unseparated(")");
            qb.build().execute(&self.pool).await?;
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
            if fingerprints.is_empty() {
                return Ok(());
            }
            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new("UPDATE ingestion_records SET last_run = ");
            qb.push_bind(run);
            qb.push(" WHERE collection = ");
            qb.push_bind(collection);
            qb.push(" AND fingerprint IN (");
            let mut separated = qb.separated(", ");
            for fp in fingerprints {
                separated.push_bind(fp);
            }
            separated.push_unseparated(")");
            qb.build().execute(&self.pool).await?;
            Ok(())
        })
    }

    fn indexed_paths(&self, collection: &str) -> BoxFuture<'_, Result<Vec<String>>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let rows: Vec<(String,)> = sqlx::query_as(
                "SELECT DISTINCT path FROM ingestion_records WHERE collection = ? ORDER BY path",
            )
            .bind(&collection)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows.into_iter().map(|(p,)| p).collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COL: &str = "code";

    fn record(fp: &str, path: &str, start: u32, run: RunId) -> IngestionRecord {
        IngestionRecord {
            collection: COL.into(),
            fingerprint: fp.into(),
            path: path.into(),
            point_id: format!("pt-{fp}"),
            chunk_type: "top_level".into(),
            line_start: start,
            line_end: start + 4,
            last_run: run,
        }
    }

    #[tokio::test]
    async fn in_memory_round_trip() {
        let store = SqliteRecordStore::new(":memory:").await.unwrap();
        let run = store.begin_run(COL, "/repo").await.unwrap();
        store
            .put(vec![record("a", "x.py", 6, run), record("b", "x.py", 1, run)])
            .await
            .unwrap();

        let recs = store.records_for_path(COL, "x.py").await.unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].fingerprint, "b");
        assert_eq!(store.get(COL, "a").await.unwrap().unwrap().line_end, 10);
    }

    #[tokio::test]
    async fn put_upserts_on_conflict() {
        let store = SqliteRecordStore::new(":memory:").await.unwrap();
        let run = store.begin_run(COL, "/repo").await.unwrap();
        store.put(vec![record("a", "x.py", 1, run)]).await.unwrap();
        let mut changed = record("a", "x.py", 1, run);
        changed.point_id = "new-point".into();
        store.put(vec![changed]).await.unwrap();
        assert_eq!(store.get(COL, "a").await.unwrap().unwrap().point_id, "new-point");
    }

    #[tokio::test]
    async fn delete_and_touch_batches() {
        let store = SqliteRecordStore::new(":memory:").await.unwrap();
        let first = store.begin_run(COL, "/repo").await.unwrap();
        store
            .put(vec![
                record("a", "x.py", 1, first),
                record("b", "x.py", 6, first),
                record("c", "y.py", 1, first),
            ])
            .await
            .unwrap();
        let second = store.begin_run(COL, "/repo").await.unwrap();
        assert!(second > first);

        store.touch(COL, vec!["b".into(), "c".into()], second).await.unwrap();
        store.delete(COL, vec!["a".into()]).await.unwrap();

        assert!(store.get(COL, "a").await.unwrap().is_none());
        assert_eq!(store.get(COL, "b").await.unwrap().unwrap().last_run, second);
        assert_eq!(store.indexed_paths(COL).await.unwrap(), ["x.py", "y.py"]);

        store.delete(COL, vec![]).await.unwrap();
        store.touch(COL, vec![], second).await.unwrap();
    }

    #[tokio::test]
    async fn file_database_persists_between_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.db");
        let path = path.to_str().unwrap();
        {
            let store = SqliteRecordStore::new(path).await.unwrap();
            let run = store.begin_run(COL, "/repo").await.unwrap();
            store.put(vec![record("a", "x.py", 1, run)]).await.unwrap();
        }
        let reopened = SqliteRecordStore::new(path).await.unwrap();
        assert!(reopened.get(COL, "a").await.unwrap().is_some());
        let run = reopened.begin_run(COL, "/repo").await.unwrap();
        assert_eq!(run, 2);
    }

    #[tokio::test]
    async fn same_fingerprint_is_tracked_per_collection() {
        let store = SqliteRecordStore::new(":memory:").await.unwrap();
        let run = store.begin_run(COL, "/repo").await.unwrap();
        store.put(vec![record("a", "x.py", 1, run)]).await.unwrap();

        let other_run = store.begin_run("other", "/repo").await.unwrap();
        assert!(store.records_for_path("other", "x.py").await.unwrap().is_empty());
        let mut other = record("a", "x.py", 1, other_run);
        other.collection = "other".into();
        store.put(vec![other]).await.unwrap();

        store.touch("other", vec!["a".into()], other_run).await.unwrap();
        assert_eq!(store.get(COL, "a").await.unwrap().unwrap().last_run, run);

        store.delete(COL, vec!["a".into()]).await.unwrap();
        assert!(store.indexed_paths(COL).await.unwrap().is_empty());
        assert_eq!(store.indexed_paths("other").await.unwrap(), ["x.py"]);
    }
}
