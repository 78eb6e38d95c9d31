//! Metadata filter expressions.
//!
//! A small predicate language over metadata fields. Serializes to Chroma's
//! `where` operator shape and can also be evaluated locally.

use serde_json::{json, Map, Value};

use super::StoreError;

#[derive(Debug, Clone, PartialEq)]
pub enum Where {
    Eq(String, Value),
    /// Only records that carry `field` can match, as with Chroma's `$ne`.
    Ne(String, Value),
    And(Vec<Where>),
    Or(Vec<Where>),
}

impl Where {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Where::Eq(field.into(), value.into())
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Where::Ne(field.into(), value.into())
    }

    /// Conjunction of `clauses`. A single clause is returned as-is.
    pub fn all(mut clauses: Vec<Where>) -> Result<Self, StoreError> {
        match clauses.len() {
            0 => Err(StoreError::Query("empty conjunction".to_string())),
            1 => Ok(clauses.remove(0)),
            _ => Ok(Where::And(clauses)),
        }
    }

    /// Parse `field=value` or `field!=value`. Values are matched as strings.
    pub fn parse_clause(expr: &str) -> Result<Self, StoreError> {
        let (field, value, negated) = if let Some((f, v)) = expr.split_once("!=") {
            (f, v, true)
        } else if let Some((f, v)) = expr.split_once('=') {
            (f, v, false)
        } else {
            return Err(StoreError::Query(format!(
                "invalid filter '{}': expected field=value or field!=value",
                expr
            )));
        };

        let field = field.trim();
        if field.is_empty() {
            return Err(StoreError::Query(format!(
                "invalid filter '{}': empty field name",
                expr
            )));
        }

        let value = Value::String(value.trim().to_string());
        Ok(if negated {
            Where::Ne(field.to_string(), value)
        } else {
            Where::Eq(field.to_string(), value)
        })
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        match self {
            Where::Eq(field, value) | Where::Ne(field, value) => {
                if field.is_empty() {
                    return Err(StoreError::Query("empty field name".to_string()));
                }
                if value.is_array() || value.is_object() || value.is_null() {
                    return Err(StoreError::Query(format!(
                        "field '{}' must be compared to a string, number or bool",
                        field
                    )));
                }
                Ok(())
            }
            Where::And(clauses) | Where::Or(clauses) => {
                if clauses.len() < 2 {
                    return Err(StoreError::Query(
                        "$and/$or need at least two clauses".to_string(),
                    ));
                }
                clauses.iter().try_for_each(Where::validate)
            }
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Where::Eq(field, value) => json!({ field: { "$eq": value } }),
            Where::Ne(field, value) => json!({ field: { "$ne": value } }),
            Where::And(clauses) => {
                json!({ "$and": clauses.iter().map(Where::to_json).collect::<Vec<_>>() })
            }
            Where::Or(clauses) => {
                json!({ "$or": clauses.iter().map(Where::to_json).collect::<Vec<_>>() })
            }
        }
    }

    pub fn matches(&self, metadata: &Map<String, Value>) -> bool {
        match self {
            Where::Eq(field, value) => metadata.get(field) == Some(value),
            Where::Ne(field, value) => metadata.get(field).is_some_and(|v| v != value),
            Where::And(clauses) => clauses.iter().all(|c| c.matches(metadata)),
            Where::Or(clauses) => clauses.iter().any(|c| c.matches(metadata)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(pairs: &[(&str, &str)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect()
    }

    #[test]
    fn conjunction_serializes_to_chroma_shape() {
        let filter = Where::all(vec![
            Where::eq("product_id", "A"),
            Where::eq("product_info", "main_features"),
        ])
        .unwrap();
        assert_eq!(
            filter.to_json(),
            json!({"$and": [
                {"product_id": {"$eq": "A"}},
                {"product_info": {"$eq": "main_features"}}
            ]})
        );
    }

    #[test]
    fn single_clause_conjunction_collapses() {
        let filter = Where::all(vec![Where::eq("category", "興趣")]).unwrap();
        assert_eq!(filter, Where::eq("category", "興趣"));
        assert!(filter.validate().is_ok());
    }

    #[test]
    fn empty_conjunction_is_query_error() {
        assert!(matches!(Where::all(vec![]), Err(StoreError::Query(_))));
    }

    #[test]
    fn hand_built_short_composite_fails_validation() {
        let filter = Where::Or(vec![Where::eq("a", "1")]);
        assert!(matches!(filter.validate(), Err(StoreError::Query(_))));
    }

    #[test]
    fn parse_clause_handles_both_operators() {
        assert_eq!(
            Where::parse_clause("user_id=C1").unwrap(),
            Where::eq("user_id", "C1")
        );
        assert_eq!(
            Where::parse_clause(" category != 基本資料 ").unwrap(),
            Where::ne("category", "基本資料")
        );
        assert!(Where::parse_clause("no-operator").is_err());
        assert!(Where::parse_clause("=value").is_err());
    }

    #[test]
    fn matches_evaluates_locally() {
        let m = meta(&[("user_id", "C1"), ("category", "興趣")]);
        assert!(Where::eq("user_id", "C1").matches(&m));
        assert!(!Where::eq("user_id", "C2").matches(&m));
        assert!(Where::ne("user_id", "C2").matches(&m));
        assert!(!Where::ne("user_id", "C1").matches(&m));
        assert!(Where::Or(vec![Where::eq("user_id", "C2"), Where::eq("category", "興趣")])
            .matches(&m));
        assert!(!Where::And(vec![Where::eq("user_id", "C1"), Where::eq("category", "x")])
            .matches(&m));
    }

    #[test]
    fn ne_skips_records_without_the_field() {
        let m = meta(&[("user_id", "C1")]);
        assert!(!Where::ne("category", "興趣").matches(&m));
    }

    #[test]
    fn structured_values_are_rejected() {
        let filter = Where::Eq("tags".into(), json!(["a"]));
        assert!(filter.validate().is_err());
    }
}
