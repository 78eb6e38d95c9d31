//! Bounded reads for inspecting a collection.
//!
//! Used by `psync sample` and `psync find`. An empty collection or an
//! unmatched filter yields `None`, not an error.

use anyhow::{bail, Context, Result};

use crate::config::Config;
use crate::store::chroma::ChromaClient;
use crate::store::{DocumentStore, QueryResult, Where};

/// Up to `limit` records of `collection_name`, in store order.
///
/// A `limit` of 0 is an error rather than an empty sample.
pub async fn retrieve_sample(
    store: &dyn DocumentStore,
    collection_name: &str,
    limit: usize,
) -> Result<Option<QueryResult>> {
    if limit == 0 {
        bail!("limit must be at least 1");
    }
    let collection = store.get_or_create_collection(collection_name).await?;
    let result = store.query(&collection, None, Some(limit)).await?;
    Ok((!result.is_empty()).then_some(result))
}

/// Records of `collection_name` whose metadata satisfies `filter`.
pub async fn find(
    store: &dyn DocumentStore,
    collection_name: &str,
    filter: &Where,
    limit: Option<usize>,
) -> Result<Option<QueryResult>> {
    if limit == Some(0) {
        bail!("limit must be at least 1");
    }
    let collection = store.get_or_create_collection(collection_name).await?;
    let result = store.query(&collection, Some(filter), limit).await?;
    Ok((!result.is_empty()).then_some(result))
}

/// CLI entry point for `psync sample`.
pub async fn run_sample(
    config: &Config,
    collection: Option<String>,
    limit: usize,
    json: bool,
) -> Result<()> {
    let collection = collection.unwrap_or_else(|| config.collections.user_info.clone());
    let client = ChromaClient::open(config.store.clone())
        .await
        .with_context(|| "Failed to connect to ChromaDB")?;
    let result = retrieve_sample(&client, &collection, limit).await?;
    print_result(&collection, result, json)
}

/// CLI entry point for `psync find`.
pub async fn run_find(
    config: &Config,
    collection: Option<String>,
    clauses: &[String],
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let collection = collection.unwrap_or_else(|| config.collections.product_info.clone());
    let parsed = clauses
        .iter()
        .map(|c| Where::parse_clause(c))
        .collect::<Result<Vec<_>, _>>()?;
    let filter = Where::all(parsed)?;

    let client = ChromaClient::open(config.store.clone())
        .await
        .with_context(|| "Failed to connect to ChromaDB")?;
    let result = find(&client, &collection, &filter, limit).await?;
    print_result(&collection, result, json)
}

fn print_result(collection: &str, result: Option<QueryResult>, json: bool) -> Result<()> {
    let Some(result) = result else {
        if json {
            println!("[]");
        } else {
            println!("No data found in collection '{}'", collection);
        }
        return Ok(());
    };

    if json {
        let rows: Vec<serde_json::Value> = result
            .ids
            .iter()
            .enumerate()
            .map(|(i, id)| {
                serde_json::json!({
                    "id": id,
                    "document": result.documents.get(i).cloned().flatten(),
                    "metadata": result.metadatas.get(i).cloned().flatten(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!("Retrieved {} records:", result.len());
    for (i, id) in result.ids.iter().enumerate() {
        println!();
        println!("ID: {}", id);
        println!("Document:");
        println!(
            "{}",
            result
                .documents
                .get(i)
                .and_then(|d| d.as_deref())
                .unwrap_or("(none)")
        );
        println!("Metadata:");
        match result.metadatas.get(i).and_then(|m| m.as_ref()) {
            Some(meta) => println!("{}", serde_json::Value::Object(meta.clone())),
            None => println!("(none)"),
        }
    }
    Ok(())
}
