use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use crate::vector_store::{
    BoxFuture, FieldValue, PayloadPoint, ScoredVectorPoint, VectorFilter, VectorPoint,
    VectorStore, VectorStoreError,
};

struct StoredPoint {
    vector: Vec<f32>,
    payload: HashMap<String, serde_json::Value>,
}

struct InMemoryCollection {
    vector_size: u64,
    points: BTreeMap<String, StoredPoint>,
}

/// Process-local [`VectorStore`] used for tests and one-shot runs.
///
/// Points are kept ordered by id so scrolls and equal-score searches are
/// reproducible.
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, InMemoryCollection>>,
}

impl InMemoryVectorStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryVectorStore")
            .finish_non_exhaustive()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

fn matches_filter(payload: &HashMap<String, serde_json::Value>, filter: &VectorFilter) -> bool {
    let must = filter
        .must
        .iter()
        .all(|c| payload.get(&c.field).is_some_and(|v| field_matches(v, &c.value)));
    let must_not = filter
        .must_not
        .iter()
        .any(|c| payload.get(&c.field).is_some_and(|v| field_matches(v, &c.value)));
    must && !must_not
}

fn field_matches(val: &serde_json::Value, expected: &FieldValue) -> bool {
    match expected {
        FieldValue::Integer(i) => val.as_i64() == Some(*i),
        FieldValue::Text(s) => val.as_str() == Some(s.as_str()),
    }
}

fn poisoned<E: std::fmt::Display>(
    make: fn(String) -> VectorStoreError,
) -> impl Fn(E) -> VectorStoreError {
    move |e| make(e.to_string())
}

impl VectorStore for InMemoryVectorStore {
    fn ensure_collection(
        &self,
        collection: &str,
        vector_size: u64,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self
                .collections
                .write()
                .map_err(poisoned(VectorStoreError::Collection))?;
            let col = cols
                .entry(collection.clone())
                .or_insert_with(|| InMemoryCollection {
                    vector_size,
                    points: BTreeMap::new(),
                });
            if col.vector_size != vector_size {
                return Err(VectorStoreError::Collection(format!(
                    "collection {collection} has vector size {}, requested {vector_size}",
                    col.vector_size
                )));
            }
            Ok(())
        })
    }

    fn ensure_payload_index(
        &self,
        _collection: &str,
        _field: &str,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        Box::pin(async { Ok(()) })
    }

    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self
                .collections
                .read()
                .map_err(poisoned(VectorStoreError::Collection))?;
            Ok(cols.contains_key(&collection))
        })
    }

    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self
                .collections
                .write()
                .map_err(poisoned(VectorStoreError::Upsert))?;
            let col = cols.get_mut(&collection).ok_or_else(|| {
                VectorStoreError::Upsert(format!("collection {collection} not found"))
            })?;
            if let Some(bad) = points
                .iter()
                .find(|p| p.vector.len() as u64 != col.vector_size)
            {
                return Err(VectorStoreError::Upsert(format!(
                    "point {} has {} dimensions, collection expects {}",
                    bad.id,
                    bad.vector.len(),
                    col.vector_size
                )));
            }
            for p in points {
                col.points.insert(
                    p.id,
                    StoredPoint {
                        vector: p.vector,
                        payload: p.payload,
                    },
                );
            }
            Ok(())
        })
    }

    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
        filter: Option<VectorFilter>,
    ) -> BoxFuture<'_, Result<Vec<ScoredVectorPoint>, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self
                .collections
                .read()
                .map_err(poisoned(VectorStoreError::Search))?;
            let col = cols.get(&collection).ok_or_else(|| {
                VectorStoreError::Search(format!("collection {collection} not found"))
            })?;

            let mut scored: Vec<ScoredVectorPoint> = col
                .points
                .iter()
                .filter(|(_, sp)| filter.as_ref().is_none_or(|f| matches_filter(&sp.payload, f)))
                .map(|(id, sp)| ScoredVectorPoint {
                    id: id.clone(),
                    score: cosine_similarity(&vector, &sp.vector),
                    payload: sp.payload.clone(),
                })
                .collect();

            scored.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
            scored.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
            Ok(scored)
        })
    }

    fn delete_by_ids(
        &self,
        collection: &str,
        ids: Vec<String>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self
                .collections
                .write()
                .map_err(poisoned(VectorStoreError::Delete))?;
            if let Some(col) = cols.get_mut(&collection) {
                for id in &ids {
                    col.points.remove(id);
                }
            }
            Ok(())
        })
    }

    fn delete_by_filter(
        &self,
        collection: &str,
        filter: VectorFilter,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self
                .collections
                .write()
                .map_err(poisoned(VectorStoreError::Delete))?;
            if let Some(col) = cols.get_mut(&collection) {
                col.points.retain(|_, sp| !matches_filter(&sp.payload, &filter));
            }
            Ok(())
        })
    }

    fn scroll(
        &self,
        collection: &str,
        limit: u32,
    ) -> BoxFuture<'_, Result<Vec<PayloadPoint>, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self
                .collections
                .read()
                .map_err(poisoned(VectorStoreError::Scroll))?;
            let col = cols.get(&collection).ok_or_else(|| {
                VectorStoreError::Scroll(format!("collection {collection} not found"))
            })?;
            Ok(col
                .points
                .iter()
                .take(limit as usize)
                .map(|(id, sp)| PayloadPoint {
                    id: id.clone(),
                    payload: sp.payload.clone(),
                })
                .collect())
        })
    }

    fn count(&self, collection: &str) -> BoxFuture<'_, Result<u64, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self
                .collections
                .read()
                .map_err(poisoned(VectorStoreError::Collection))?;
            Ok(cols
                .get(&collection)
                .map_or(0, |col| col.points.len() as u64))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_store::FieldCondition;

    fn point(id: &str, vector: Vec<f32>, kind: &str) -> VectorPoint {
        let mut payload = HashMap::new();
        payload.insert("chunk_type".into(), serde_json::json!(kind));
        payload.insert("line_start".into(), serde_json::json!(1));
        VectorPoint {
            id: id.into(),
            vector,
            payload,
        }
    }

    #[tokio::test]
    async fn ensure_collection_is_idempotent() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", 3).await.unwrap();
        store.ensure_collection("c", 3).await.unwrap();
        assert!(store.collection_exists("c").await.unwrap());
        assert!(!store.collection_exists("other").await.unwrap());
    }

    #[tokio::test]
    async fn ensure_collection_rejects_size_change() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", 3).await.unwrap();
        assert!(store.ensure_collection("c", 4).await.is_err());
    }

    #[tokio::test]
    async fn upsert_rejects_wrong_dimensions() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", 2).await.unwrap();
        let err = store
            .upsert("c", vec![point("a", vec![1.0, 0.0, 0.0], "function")])
            .await
            .unwrap_err();
        assert!(matches!(err, VectorStoreError::Upsert(_)));
        assert_eq!(store.count("c").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn upsert_replaces_same_id() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", 2).await.unwrap();
        store
            .upsert("c", vec![point("a", vec![1.0, 0.0], "function")])
            .await
            .unwrap();
        store
            .upsert("c", vec![point("a", vec![0.0, 1.0], "class")])
            .await
            .unwrap();
        assert_eq!(store.count("c").await.unwrap(), 1);
        let hits = store.search("c", vec![0.0, 1.0], 5, None).await.unwrap();
        assert_eq!(hits[0].payload["chunk_type"], "class");
    }

    #[tokio::test]
    async fn search_orders_by_score_then_id() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", 2).await.unwrap();
        store
            .upsert(
                "c",
                vec![
                    point("b", vec![1.0, 0.0], "function"),
                    point("a", vec![1.0, 0.0], "function"),
                    point("c", vec![0.0, 1.0], "function"),
                ],
            )
            .await
            .unwrap();
        let hits = store.search("c", vec![1.0, 0.0], 2, None).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn search_applies_must_not_filter() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", 2).await.unwrap();
        store
            .upsert(
                "c",
                vec![
                    point("w", vec![1.0, 0.0], "window"),
                    point("f", vec![0.9, 0.1], "function"),
                ],
            )
            .await
            .unwrap();
        let filter = VectorFilter {
            must: vec![],
            must_not: vec![FieldCondition::text("chunk_type", "window")],
        };
        let hits = store
            .search("c", vec![1.0, 0.0], 5, Some(filter))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "f");
    }

    #[tokio::test]
    async fn search_applies_integer_must_filter() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", 2).await.unwrap();
        store
            .upsert("c", vec![point("a", vec![1.0, 0.0], "function")])
            .await
            .unwrap();
        let hit = VectorFilter {
            must: vec![FieldCondition {
                field: "line_start".into(),
                value: FieldValue::Integer(1),
            }],
            must_not: vec![],
        };
        let miss = VectorFilter {
            must: vec![FieldCondition {
                field: "line_start".into(),
                value: FieldValue::Integer(2),
            }],
            must_not: vec![],
        };
        assert_eq!(
            store.search("c", vec![1.0, 0.0], 5, Some(hit)).await.unwrap().len(),
            1
        );
        assert!(
            store
                .search("c", vec![1.0, 0.0], 5, Some(miss))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn delete_and_scroll() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", 2).await.unwrap();
        store
            .upsert(
                "c",
                vec![
                    point("a", vec![1.0, 0.0], "function"),
                    point("b", vec![0.0, 1.0], "class"),
                ],
            )
            .await
            .unwrap();
        store.delete_by_ids("c", vec!["a".into()]).await.unwrap();
        let rest = store.scroll("c", 10).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].id, "b");
        assert_eq!(store.scroll("c", 0).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn delete_by_filter_honours_must_not() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", 2).await.unwrap();
        let mut fresh = point("fresh", vec![1.0, 0.0], "function");
        fresh.payload.insert("line_start".into(), serde_json::json!(7));
        store
            .upsert(
                "c",
                vec![
                    point("old", vec![1.0, 0.0], "function"),
                    fresh,
                    point("other", vec![0.0, 1.0], "class"),
                ],
            )
            .await
            .unwrap();

        let filter = VectorFilter {
            must: vec![FieldCondition::text("chunk_type", "function")],
            must_not: vec![FieldCondition::integer("line_start", 7)],
        };
        store.delete_by_filter("c", filter.clone()).await.unwrap();
        store.delete_by_filter("missing", filter).await.unwrap();

        let ids: Vec<String> = store
            .scroll("c", 10)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, ["fresh", "other"]);
    }

    #[tokio::test]
    async fn search_missing_collection_errors() {
        let store = InMemoryVectorStore::new();
        assert!(store.search("nope", vec![1.0], 1, None).await.is_err());
        assert_eq!(store.count("nope").await.unwrap(), 0);
    }

    #[test]
    fn cosine_handles_zero_vectors() {
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).abs() < f32::EPSILON);
        assert!((cosine_similarity(&[2.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    }
}
