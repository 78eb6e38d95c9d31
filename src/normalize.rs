//! Record normalization: CSV tag rows → one document per (entity, category).
//!
//! Rows are partitioned by `(entity_id, category)` in lexicographic order of
//! the composite key, then by attribute name. Each partition becomes a
//! [`NormalizedRecord`] whose ids start at 1 in partition order. Values pass
//! through a [`BooleanVocabulary`] and collapse to a scalar when an attribute
//! occurs once in its partition.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::PathBuf;

use crate::config::{BooleanTokens, ColumnMap, Config};
use crate::handoff;
use crate::models::{DocValue, NormalizedRecord, RawRow, RecordMetadata, Scalar};

/// Maps free-form tokens to booleans. Anything outside the vocabulary is
/// returned unchanged.
#[derive(Debug, Clone)]
pub struct BooleanVocabulary {
    truthy: Vec<String>,
    falsy: Vec<String>,
}

impl BooleanVocabulary {
    pub fn new(truthy: Vec<String>, falsy: Vec<String>) -> Self {
        Self { truthy, falsy }
    }

    pub fn coerce(&self, value: Scalar) -> Scalar {
        match value {
            Scalar::Text(text) => {
                if self.truthy.iter().any(|t| *t == text) {
                    Scalar::Bool(true)
                } else if self.falsy.iter().any(|t| *t == text) {
                    Scalar::Bool(false)
                } else {
                    Scalar::Text(text)
                }
            }
            other => other,
        }
    }
}

impl Default for BooleanVocabulary {
    fn default() -> Self {
        BooleanTokens::default().into()
    }
}

impl From<BooleanTokens> for BooleanVocabulary {
    fn from(tokens: BooleanTokens) -> Self {
        Self::new(tokens.true_tokens, tokens.false_tokens)
    }
}

/// A row that was left out of normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRow {
    pub line: u64,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct RowSet {
    pub rows: Vec<RawRow>,
    pub skipped: Vec<SkippedRow>,
}

/// Parse tag rows from CSV with a header line.
///
/// A missing column is an error. Rows with an empty entity, category or
/// attribute name are skipped and reported, never grouped.
pub fn read_rows<R: Read>(reader: R, columns: &ColumnMap) -> Result<RowSet> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = reader
        .headers()
        .with_context(|| "Failed to read CSV header")?
        .clone();

    let position = |name: &str| -> Result<usize> {
        headers
            .iter()
            .position(|h| h.trim_start_matches('\u{feff}').trim() == name)
            .ok_or_else(|| anyhow::anyhow!("CSV is missing required column '{}'", name))
    };
    let entity_idx = position(&columns.entity_id)?;
    let category_idx = position(&columns.category)?;
    let name_idx = position(&columns.attribute_name)?;
    let value_idx = position(&columns.attribute_value)?;

    let mut set = RowSet::default();

    for (i, result) in reader.records().enumerate() {
        let line = i as u64 + 1;
        let record = result.with_context(|| format!("CSV row {} is malformed", line))?;
        let cell = |idx: usize| record.get(idx).unwrap_or("");

        let entity_id = cell(entity_idx).trim();
        let category = cell(category_idx).trim();
        let attribute_name = cell(name_idx).trim();

        let missing = [
            (entity_id, columns.entity_id.as_str()),
            (category, columns.category.as_str()),
            (attribute_name, columns.attribute_name.as_str()),
        ]
        .iter()
        .find(|(value, _)| value.is_empty())
        .map(|(_, column)| *column);

        if let Some(column) = missing {
            let reason = format!("empty '{}'", column);
            tracing::warn!(line, %reason, "skipping CSV row");
            set.skipped.push(SkippedRow { line, reason });
            continue;
        }

        set.rows.push(RawRow {
            entity_id: entity_id.to_string(),
            category: category.to_string(),
            attribute_name: attribute_name.to_string(),
            attribute_value: cell(value_idx).to_string(),
            line,
        });
    }

    Ok(set)
}

/// Group, pivot and coerce rows into records.
pub fn normalize(
    rows: &[RawRow],
    vocabulary: &BooleanVocabulary,
    run_started: DateTime<Utc>,
) -> Vec<NormalizedRecord> {
    let mut groups: BTreeMap<(&str, &str), BTreeMap<&str, Vec<Scalar>>> = BTreeMap::new();

    for row in rows {
        groups
            .entry((row.entity_id.as_str(), row.category.as_str()))
            .or_default()
            .entry(row.attribute_name.as_str())
            .or_default()
            .push(vocabulary.coerce(Scalar::Text(row.attribute_value.clone())));
    }

    let timestamp = format_timestamp(run_started);

    groups
        .into_iter()
        .zip(1u64..)
        .map(|(((entity_id, category), attributes), id)| {
            let document = attributes
                .into_iter()
                .filter_map(|(name, values)| {
                    DocValue::collapse(values).map(|v| (name.to_string(), v))
                })
                .collect();

            NormalizedRecord {
                id,
                metadata: RecordMetadata {
                    created_at: timestamp.clone(),
                    updated_at: timestamp.clone(),
                    category: category.to_string(),
                    entity_id: entity_id.to_string(),
                },
                document,
            }
        })
        .collect()
}

/// ISO-8601, UTC, second precision, literal `Z`.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// CLI entry point for `psync normalize`.
pub fn run_normalize(
    config: &Config,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
) -> Result<()> {
    let input = input.unwrap_or_else(|| config.normalize.input.clone());
    let output = output.unwrap_or_else(|| config.normalize.output.clone());

    if !input.exists() {
        bail!("Input file does not exist: {}", input.display());
    }

    let run_started = Utc::now();
    let file = std::fs::File::open(&input)
        .with_context(|| format!("Failed to open {}", input.display()))?;
    let set = read_rows(file, &config.normalize.columns)
        .with_context(|| format!("Failed to parse {}", input.display()))?;

    let vocabulary = BooleanVocabulary::from(config.normalize.booleans.clone());
    let records = normalize(&set.rows, &vocabulary, run_started);

    handoff::write_records(&output, &records)?;
    tracing::info!(
        records = records.len(),
        output = %output.display(),
        "normalized records written"
    );

    println!("normalize {}", input.display());
    println!("  rows read: {}", set.rows.len() + set.skipped.len());
    println!("  rows skipped: {}", set.skipped.len());
    println!("  records written: {}", records.len());
    println!("  output: {}", output.display());
    println!("ok");

    Ok(())
}
