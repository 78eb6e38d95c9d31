//! Storage abstraction for collection-oriented document stores.
//!
//! The [`DocumentStore`] trait is the seam between the sync/retrieval
//! pipeline and a concrete backend: [`chroma::ChromaClient`] talks to a
//! remote Chroma server, [`memory::InMemoryStore`] keeps everything in
//! process for tests and dry runs.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod chroma;
pub mod filter;
pub mod memory;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashSet};
use thiserror::Error;

pub use filter::Where;

/// Failures surfaced by a [`DocumentStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// Transport, timeout or authentication failure.
    #[error("connection error: {0}")]
    Connection(String),

    /// An operation was attempted before a successful `connect`.
    #[error("not connected to the document store; call connect() first")]
    NotConnected,

    /// Create, get or delete of a collection failed.
    #[error("collection error: {0}")]
    Collection(String),

    /// The batch was rejected (schema, duplicate or length mismatch).
    #[error("insert error: {0}")]
    Insert(String),

    /// The filter was malformed or the read was rejected.
    #[error("query error: {0}")]
    Query(String),
}

/// Handle to a named collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    pub id: String,
    pub name: String,
}

/// Parallel sequences handed to [`DocumentStore::insert`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct InsertBatch {
    pub ids: Vec<String>,
    pub documents: Vec<String>,
    pub metadatas: Vec<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embeddings: Option<Vec<Vec<f32>>>,
}

impl InsertBatch {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Check the batch shape before anything is sent.
    pub fn validate(&self) -> Result<(), StoreError> {
        let n = self.ids.len();
        if self.documents.len() != n || self.metadatas.len() != n {
            return Err(StoreError::Insert(format!(
                "length mismatch: {} ids, {} documents, {} metadatas",
                n,
                self.documents.len(),
                self.metadatas.len()
            )));
        }
        if let Some(embeddings) = &self.embeddings {
            if embeddings.len() != n {
                return Err(StoreError::Insert(format!(
                    "length mismatch: {} ids, {} embeddings",
                    n,
                    embeddings.len()
                )));
            }
        }
        if self.ids.iter().any(|id| id.is_empty()) {
            return Err(StoreError::Insert("ids must not be empty".to_string()));
        }

        let mut seen = HashSet::with_capacity(n);
        let duplicates: BTreeSet<&str> = self
            .ids
            .iter()
            .filter(|id| !seen.insert(id.as_str()))
            .map(String::as_str)
            .collect();
        if !duplicates.is_empty() {
            return Err(StoreError::Insert(format!(
                "duplicate ids in batch: {}",
                duplicates.into_iter().collect::<Vec<_>>().join(", ")
            )));
        }
        Ok(())
    }
}

/// Parallel sequences returned by [`DocumentStore::query`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    pub ids: Vec<String>,
    pub documents: Vec<Option<String>>,
    pub metadatas: Vec<Option<Map<String, Value>>>,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Abstract collection store.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get_or_create_collection`](DocumentStore::get_or_create_collection) | Idempotent collection lookup |
/// | [`delete_collection`](DocumentStore::delete_collection) | Drop a collection and its contents |
/// | [`insert`](DocumentStore::insert) | Bulk insert; rejects ids already present |
/// | [`query`](DocumentStore::query) | Metadata-filtered, bounded read |
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_or_create_collection(&self, name: &str) -> Result<Collection, StoreError>;

    /// Returns `false` when the collection did not exist.
    async fn delete_collection(&self, name: &str) -> Result<bool, StoreError>;

    /// Insert the whole batch or nothing. Returns the number of records written.
    async fn insert(&self, collection: &Collection, batch: InsertBatch)
        -> Result<usize, StoreError>;

    async fn query(
        &self,
        collection: &Collection,
        filter: Option<&Where>,
        limit: Option<usize>,
    ) -> Result<QueryResult, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(ids: &[&str]) -> InsertBatch {
        InsertBatch {
            ids: ids.iter().map(|s| s.to_string()).collect(),
            documents: ids.iter().map(|_| "{}".to_string()).collect(),
            metadatas: ids.iter().map(|_| Map::new()).collect(),
            embeddings: None,
        }
    }

    #[test]
    fn valid_batch_passes() {
        assert!(batch(&["1", "2", "3"]).validate().is_ok());
    }

    #[test]
    fn length_mismatch_is_insert_error() {
        let mut b = batch(&["1", "2"]);
        b.documents.pop();
        assert!(matches!(b.validate(), Err(StoreError::Insert(m)) if m.contains("mismatch")));
    }

    #[test]
    fn embedding_count_must_match() {
        let mut b = batch(&["1", "2"]);
        b.embeddings = Some(vec![vec![0.0; 4]]);
        assert!(matches!(b.validate(), Err(StoreError::Insert(_))));
    }

    #[test]
    fn duplicate_ids_are_named() {
        let err = batch(&["1", "2", "1"]).validate().unwrap_err();
        assert_eq!(err.to_string(), "insert error: duplicate ids in batch: 1");
    }

    #[test]
    fn interleaved_duplicates_are_named_once() {
        let err = batch(&["1", "2", "1", "2", "1"]).validate().unwrap_err();
        assert_eq!(err.to_string(), "insert error: duplicate ids in batch: 1, 2");
    }

    #[test]
    fn empty_id_is_rejected() {
        assert!(batch(&["1", ""]).validate().is_err());
    }
}
