//! Core data models used throughout profile-sync.
//!
//! These types represent the raw spreadsheet rows, the normalized
//! per-customer documents, and the generic entries handed to the store.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One spreadsheet observation before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    pub entity_id: String,
    pub category: String,
    pub attribute_name: String,
    pub attribute_value: String,
    /// 1-based data row number (header excluded).
    pub line: u64,
}

/// A single document value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Text(s.to_string())
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

/// The value stored under one attribute key: a scalar when the attribute
/// occurred once in its group, otherwise every value in source order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocValue {
    Scalar(Scalar),
    Sequence(Vec<Scalar>),
}

impl DocValue {
    /// Collapse a group's values: one value stays scalar, more become a sequence.
    ///
    /// Returns `None` for an empty input.
    pub fn collapse(mut values: Vec<Scalar>) -> Option<Self> {
        match values.len() {
            0 => None,
            1 => values.pop().map(DocValue::Scalar),
            _ => Some(DocValue::Sequence(values)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub created_at: String,
    pub updated_at: String,
    pub category: String,
    #[serde(rename = "user_id")]
    pub entity_id: String,
}

/// The pivoted document for one (entity, category) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub id: u64,
    pub metadata: RecordMetadata,
    pub document: BTreeMap<String, DocValue>,
}

/// Identifier of a handoff entry; integer in normalizer output, free-form
/// text in hand-maintained files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntryId {
    Int(u64),
    Text(String),
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryId::Int(n) => write!(f, "{}", n),
            EntryId::Text(s) => f.write_str(s),
        }
    }
}

/// Generic handoff entry accepted by the sync driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreEntry {
    pub id: EntryId,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub document: serde_json::Value,
}
