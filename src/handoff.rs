//! The handoff file between `normalize` and `sync`.
//!
//! A pretty-printed UTF-8 JSON array. Non-ASCII text is written as-is so the
//! file stays readable for the people who maintain the source sheets.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::path::Path;

use crate::models::{NormalizedRecord, StoreEntry};

pub fn write_records(path: &Path, records: &[NormalizedRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    let json = serde_json::to_string_pretty(records)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

pub fn read_records(path: &Path) -> Result<Vec<NormalizedRecord>> {
    read_json(path)
}

/// Read a handoff file without assuming the normalizer's metadata shape.
pub fn read_entries(path: &Path) -> Result<Vec<StoreEntry>> {
    read_json(path)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read handoff file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse handoff file: {}", path.display()))
}
