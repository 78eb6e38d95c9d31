//! Sync driver: handoff file → one bulk insert into a collection.
//!
//! Each entry becomes `(id as text, document as compact JSON, metadata)`.
//! Documents are embedded, the collection is fetched or created, and the
//! whole batch goes to the store in a single `insert`. The store validates
//! the batch and rejects ids already present before writing anything, so a
//! run either inserts every record or none.
//!
//! `--replace` prepares and embeds the batch before deleting the
//! collection. It is not atomic against a failing create or add after the
//! delete: the collection is then left empty and the error says so.
//!
//! Two syncs against the same collection with overlapping ids at the same
//! time are not supported; whichever insert lands second is rejected or
//! races at the server's discretion.

use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};
use std::path::PathBuf;

use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider};
use crate::handoff;
use crate::models::StoreEntry;
use crate::store::chroma::ChromaClient;
use crate::store::{DocumentStore, InsertBatch};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub collection: String,
    pub attempted: usize,
    pub inserted: usize,
}

/// Map handoff entries to the store's insertion schema.
///
/// Metadata values that are strings, numbers or booleans pass through
/// unchanged; anything nested is stored as its JSON text.
pub fn build_batch(entries: &[StoreEntry]) -> Result<InsertBatch> {
    let mut batch = InsertBatch {
        ids: Vec::with_capacity(entries.len()),
        documents: Vec::with_capacity(entries.len()),
        metadatas: Vec::with_capacity(entries.len()),
        embeddings: None,
    };

    for entry in entries {
        let id = entry.id.to_string();
        let document = serde_json::to_string(&entry.document)
            .with_context(|| format!("Failed to serialize document {}", id))?;
        batch.ids.push(id);
        batch.documents.push(document);
        batch.metadatas.push(flatten_metadata(&entry.metadata));
    }

    Ok(batch)
}

fn flatten_metadata(metadata: &Map<String, Value>) -> Map<String, Value> {
    metadata
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| {
            let flat = match v {
                Value::String(_) | Value::Number(_) | Value::Bool(_) => v.clone(),
                _ => Value::String(v.to_string()),
            };
            (k.clone(), flat)
        })
        .collect()
}

/// Build, validate and embed the batch for `entries`. Touches no store.
pub async fn prepare_batch(
    embedder: &dyn EmbeddingProvider,
    entries: &[StoreEntry],
) -> Result<InsertBatch> {
    let mut batch = build_batch(entries)?;
    batch.validate()?;

    let vectors = embedder
        .embed(&batch.documents)
        .await
        .with_context(|| format!("Failed to embed documents with '{}'", embedder.model_name()))?;
    batch.embeddings = Some(vectors);
    batch.validate()?;
    Ok(batch)
}

/// Insert a prepared batch into `collection_name`, creating the collection
/// if needed.
pub async fn insert_batch(
    store: &dyn DocumentStore,
    collection_name: &str,
    batch: InsertBatch,
) -> Result<SyncReport> {
    let collection = store
        .get_or_create_collection(collection_name)
        .await
        .with_context(|| format!("Error creating or getting collection '{}'", collection_name))?;

    let attempted = batch.len();
    let inserted = store.insert(&collection, batch).await.with_context(|| {
        format!(
            "Insert into '{}' failed; 0 of {} records accepted",
            collection_name, attempted
        )
    })?;

    Ok(SyncReport {
        collection: collection.name,
        attempted,
        inserted,
    })
}

/// Insert `entries` into `collection_name`, creating the collection if needed.
pub async fn sync_entries(
    store: &dyn DocumentStore,
    embedder: &dyn EmbeddingProvider,
    collection_name: &str,
    entries: &[StoreEntry],
) -> Result<SyncReport> {
    let batch = prepare_batch(embedder, entries).await?;
    insert_batch(store, collection_name, batch).await
}

/// Drop `collection_name` and load `entries` into a fresh collection.
///
/// The batch is built, validated and embedded before anything is deleted,
/// so those failures leave the old collection intact. A failure after the
/// delete (create or add) leaves the collection empty and says so.
pub async fn replace_entries(
    store: &dyn DocumentStore,
    embedder: &dyn EmbeddingProvider,
    collection_name: &str,
    entries: &[StoreEntry],
) -> Result<SyncReport> {
    let batch = prepare_batch(embedder, entries).await?;

    store
        .delete_collection(collection_name)
        .await
        .with_context(|| format!("Failed to delete collection '{}'", collection_name))?;

    match insert_batch(store, collection_name, batch).await {
        Ok(report) => Ok(report),
        Err(e) => {
            tracing::error!(collection = collection_name, "replace failed after delete");
            Err(e.context(format!(
                "collection '{}' was deleted but the new records were not written; it is now empty",
                collection_name
            )))
        }
    }
}

/// CLI entry point for `psync sync`.
pub async fn run_sync(
    config: &Config,
    file: Option<PathBuf>,
    collection: Option<String>,
    dry_run: bool,
    replace: bool,
) -> Result<()> {
    let file = file.unwrap_or_else(|| config.normalize.output.clone());
    let collection = collection.unwrap_or_else(|| config.collections.user_info.clone());

    let entries = handoff::read_entries(&file)?;
    if entries.is_empty() {
        bail!("Handoff file {} contains no records", file.display());
    }

    if dry_run {
        let batch = build_batch(&entries)?;
        batch.validate()?;
        println!("sync {} (dry-run)", collection);
        println!("  file: {}", file.display());
        println!("  records: {}", batch.len());
        return Ok(());
    }

    let embedder = embedding::create_provider(&config.embedding)?;

    let client = ChromaClient::open(config.store.clone())
        .await
        .with_context(|| "Failed to connect to ChromaDB")?;

    let report = if replace {
        replace_entries(&client, embedder.as_ref(), &collection, &entries).await?
    } else {
        sync_entries(&client, embedder.as_ref(), &collection, &entries).await?
    };

    println!(
        "inserted {} records into collection '{}'",
        report.inserted, report.collection
    );
    Ok(())
}
