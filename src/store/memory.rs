//! In-memory [`DocumentStore`] implementation for testing and dry runs.
//!
//! Collections live in a `HashMap` behind `std::sync::RwLock`. Records keep
//! insertion order, which is the order `query` returns them in.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{Collection, DocumentStore, InsertBatch, QueryResult, StoreError, Where};

struct StoredRecord {
    id: String,
    document: String,
    metadata: Map<String, Value>,
}

struct StoredCollection {
    id: String,
    records: Vec<StoredRecord>,
}

/// In-memory store for tests.
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, StoredCollection>>,
    next_id: RwLock<u64>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            next_id: RwLock::new(1),
        }
    }

    /// Number of records in `name`, or `None` if the collection is absent.
    pub fn count(&self, name: &str) -> Option<usize> {
        self.read().ok()?.get(name).map(|c| c.records.len())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, StoredCollection>>, StoreError> {
        self.collections
            .read()
            .map_err(|_| StoreError::Collection("store lock poisoned".to_string()))
    }

    fn write(
        &self,
    ) -> Result<RwLockWriteGuard<'_, HashMap<String, StoredCollection>>, StoreError> {
        self.collections
            .write()
            .map_err(|_| StoreError::Collection("store lock poisoned".to_string()))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn get_or_create_collection(&self, name: &str) -> Result<Collection, StoreError> {
        if name.is_empty() {
            return Err(StoreError::Collection(
                "collection name must not be empty".to_string(),
            ));
        }
        let mut collections = self.write()?;
        if let Some(existing) = collections.get(name) {
            return Ok(Collection {
                id: existing.id.clone(),
                name: name.to_string(),
            });
        }

        let mut next_id = self
            .next_id
            .write()
            .map_err(|_| StoreError::Collection("store lock poisoned".to_string()))?;
        let id = format!("mem-{}", *next_id);
        *next_id += 1;

        collections.insert(
            name.to_string(),
            StoredCollection {
                id: id.clone(),
                records: Vec::new(),
            },
        );
        Ok(Collection {
            id,
            name: name.to_string(),
        })
    }

    async fn delete_collection(&self, name: &str) -> Result<bool, StoreError> {
        let removed = self.write()?.remove(name).is_some();
        if !removed {
            tracing::warn!(collection = name, "collection does not exist; nothing to delete");
        }
        Ok(removed)
    }

    async fn insert(
        &self,
        collection: &Collection,
        batch: InsertBatch,
    ) -> Result<usize, StoreError> {
        batch.validate()?;
        let mut collections = self.write()?;
        let stored = collections
            .get_mut(&collection.name)
            .filter(|c| c.id == collection.id)
            .ok_or_else(|| {
                StoreError::Collection(format!("collection '{}' does not exist", collection.name))
            })?;

        let present: HashSet<&str> = stored.records.iter().map(|r| r.id.as_str()).collect();
        let conflicts: Vec<&str> = batch
            .ids
            .iter()
            .map(String::as_str)
            .filter(|id| present.contains(id))
            .collect();
        if !conflicts.is_empty() {
            return Err(StoreError::Insert(format!(
                "{} id(s) already present in '{}': {}",
                conflicts.len(),
                collection.name,
                conflicts.join(", ")
            )));
        }

        let n = batch.len();
        let records = batch
            .ids
            .into_iter()
            .zip(batch.documents)
            .zip(batch.metadatas)
            .map(|((id, document), metadata)| StoredRecord {
                id,
                document,
                metadata,
            });
        stored.records.extend(records);
        Ok(n)
    }

    async fn query(
        &self,
        collection: &Collection,
        filter: Option<&Where>,
        limit: Option<usize>,
    ) -> Result<QueryResult, StoreError> {
        if let Some(filter) = filter {
            filter.validate()?;
        }
        let collections = self.read()?;
        let Some(stored) = collections.get(&collection.name) else {
            return Err(StoreError::Query(format!(
                "collection '{}' does not exist",
                collection.name
            )));
        };

        let mut result = QueryResult::default();
        let matching = stored
            .records
            .iter()
            .filter(|r| filter.map_or(true, |f| f.matches(&r.metadata)))
            .take(limit.unwrap_or(usize::MAX));
        for record in matching {
            result.ids.push(record.id.clone());
            result.documents.push(Some(record.document.clone()));
            result.metadatas.push(Some(record.metadata.clone()));
        }
        Ok(result)
    }
}
