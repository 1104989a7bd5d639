//! Storage backends shared by the ingestion and query pipelines.
//!
//! [`VectorStore`] holds one vector plus attribute payload per indexed chunk.
//! [`RecordStore`] tracks which chunk fingerprints are currently indexed so
//! re-ingestion can skip, upsert, or delete precisely.

pub mod error;
pub mod in_memory_store;
pub mod qdrant_ops;
pub mod records;
pub mod sqlite;
pub mod vector_store;

pub use error::StoreError;
pub use in_memory_store::InMemoryVectorStore;
pub use qdrant_ops::QdrantOps;
pub use records::{InMemoryRecordStore, IngestionRecord, RecordStore, RunId};
pub use sqlite::SqliteRecordStore;
pub use vector_store::{
    BoxFuture, FieldCondition, FieldValue, PayloadPoint, ScoredVectorPoint, VectorFilter, VectorPoint,
    VectorStore, VectorStoreError,
};
