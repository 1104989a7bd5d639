//! Read-only inspection of what ingestion stored.

use std::collections::HashMap;
use std::fmt;

use repoqa_index::metadata::{FIELD_FINGERPRINT, IndexedDocument, SCHEMA_FIELDS};
use repoqa_store::{RecordStore, VectorStore};
use serde_json::Value;

use crate::error::VerifyError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPresence {
    pub field: &'static str,
    /// Sampled points carrying a non-null value for the field.
    pub present: usize,
}

/// A sampled point whose payload does not decode into a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidPoint {
    pub id: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaReport {
    pub collection: String,
    pub total_points: u64,
    pub sampled: usize,
    /// One entry per schema field, in schema order.
    pub fields: Vec<FieldPresence>,
    pub invalid: Vec<InvalidPoint>,
    /// Ids of sampled points with no ingestion record. Empty when no record
    /// store was consulted.
    pub untracked: Vec<String>,
}

impl SchemaReport {
    /// Fields absent from at least one sampled point.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        self.fields
            .iter()
            .filter(|f| f.present < self.sampled)
            .map(|f| f.field)
            .collect()
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }
}

impl fmt::Display for SchemaReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "collection {}: {} points, {} sampled",
            self.collection, self.total_points, self.sampled
        )?;
        for field in &self.fields {
            let mark = if field.present == self.sampled { "ok" } else { "MISSING" };
            writeln!(f, "  {:<12} {}/{} {mark}", field.field, field.present, self.sampled)?;
        }
        for point in &self.invalid {
            writeln!(f, "  invalid point {}: {}", point.id, point.reason)?;
        }
        if !self.untracked.is_empty() {
            writeln!(f, "  {} sampled points have no ingestion record", self.untracked.len())?;
        }
        Ok(())
    }
}

fn is_present(payload: &HashMap<String, Value>, field: &str) -> bool {
    payload.get(field).is_some_and(|v| !v.is_null())
}

/// Sample up to `sample` stored points and report which schema fields they carry.
///
/// With `records`, each sampled point's fingerprint is also looked up in the
/// ingestion record store. Nothing is written.
///
/// # Errors
///
/// Returns [`VerifyError::MissingCollection`] if nothing was ingested into
/// `collection`, or the store error if a read fails.
pub async fn verify_schema(
    store: &dyn VectorStore,
    records: Option<&dyn RecordStore>,
    collection: &str,
    sample: u32,
) -> Result<SchemaReport, VerifyError> {
    if !store.collection_exists(collection).await? {
        return Err(VerifyError::MissingCollection(collection.to_owned()));
    }
    let total_points = store.count(collection).await?;
    let points = store.scroll(collection, sample).await?;

    let mut fields: Vec<FieldPresence> = SCHEMA_FIELDS
        .iter()
        .map(|&field| FieldPresence { field, present: 0 })
        .collect();
    let mut invalid = Vec::new();
    let mut untracked = Vec::new();

    for point in &points {
        for presence in &mut fields {
            if is_present(&point.payload, presence.field) {
                presence.present += 1;
            }
        }
        if let Err(reason) = IndexedDocument::from_payload(&point.payload) {
            invalid.push(InvalidPoint {
                id: point.id.clone(),
                reason,
            });
        }
        if let Some(records) = records {
            let tracked = match point.payload.get(FIELD_FINGERPRINT).and_then(Value::as_str) {
                Some(fp) => records.get(collection, fp).await?.is_some(),
                None => false,
            };
            if !tracked {
                untracked.push(point.id.clone());
            }
        }
    }

    let report = SchemaReport {
        collection: collection.to_owned(),
        total_points,
        sampled: points.len(),
        fields,
        invalid,
        untracked,
    };
    tracing::info!(
        collection,
        sampled = report.sampled,
        missing = ?report.missing_fields(),
        "schema verification finished"
    );
    Ok(report)
}
