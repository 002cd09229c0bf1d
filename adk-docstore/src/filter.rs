//! Metadata filters.
//!
//! A filter is a JSON object describing a conjunction of exact-match and
//! containment constraints over document metadata, with the same meaning as
//! PostgreSQL's `jsonb @> jsonb` operator:
//!
//! - `{"tag": "x"}` matches metadata whose `tag` is exactly `"x"`
//! - `{"window_ids": ["a", "b"]}` matches when both ids appear in `window_ids`
//! - `{"author": {"name": "Ada"}}` matches nested objects recursively
//! - `{}` matches every document
//!
//! Keys starting with `$` are reserved for query operators, none of which are
//! supported; they are rejected instead of being treated as field names.

use serde_json::Value;

use crate::error::{DocStoreError, Result};

/// A parsed, validated metadata filter.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataFilter {
    expr: Value,
}

impl MetadataFilter {
    /// Parse a filter from its JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`DocStoreError::FilterError`] if the text is not valid JSON,
    /// is not a JSON object, or uses an operator key.
    pub fn parse(filter: &str) -> Result<Self> {
        let expr: Value = serde_json::from_str(filter).map_err(|e| DocStoreError::FilterError {
            filter: filter.to_string(),
            reason: format!("malformed JSON: {e}"),
        })?;
        Self::checked(expr, filter)
    }

    /// Build a filter from an already parsed JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`DocStoreError::FilterError`] under the same conditions as
    /// [`parse`](Self::parse), minus the JSON syntax check.
    pub fn from_value(expr: Value) -> Result<Self> {
        let text = expr.to_string();
        Self::checked(expr, &text)
    }

    /// Parse an optional filter, passing `None` through.
    pub fn parse_optional(filter: Option<&str>) -> Result<Option<Self>> {
        filter.map(Self::parse).transpose()
    }

    fn checked(expr: Value, text: &str) -> Result<Self> {
        if !expr.is_object() {
            return Err(DocStoreError::FilterError {
                filter: text.to_string(),
                reason: "filter must be a JSON object".to_string(),
            });
        }
        if let Some(op) = find_operator(&expr) {
            return Err(DocStoreError::FilterError {
                filter: text.to_string(),
                reason: format!("unsupported operator '{op}'"),
            });
        }
        Ok(Self { expr })
    }

    /// The filter as a JSON object, suitable for binding as a `jsonb` parameter.
    pub fn as_json(&self) -> &Value {
        &self.expr
    }

    /// Returns `true` if the filter places no constraint.
    pub fn is_empty(&self) -> bool {
        self.expr.as_object().is_some_and(|obj| obj.is_empty())
    }

    /// Evaluate the filter against a metadata object.
    pub fn matches(&self, metadata: &Value) -> bool {
        json_contains(metadata, &self.expr)
    }
}

fn find_operator(value: &Value) -> Option<&str> {
    match value {
        Value::Object(obj) => obj.iter().find_map(|(key, inner)| {
            if key.starts_with('$') { Some(key.as_str()) } else { find_operator(inner) }
        }),
        Value::Array(items) => items.iter().find_map(find_operator),
        _ => None,
    }
}

/// JSONB containment: does `haystack` contain `needle`?
pub(crate) fn json_contains(haystack: &Value, needle: &Value) -> bool {
    match (haystack, needle) {
        (Value::Object(hay), Value::Object(need)) => need
            .iter()
            .all(|(key, want)| hay.get(key).is_some_and(|have| json_contains(have, want))),
        (Value::Array(hay), Value::Array(need)) => {
            need.iter().all(|want| hay.iter().any(|have| json_contains(have, want)))
        }
        (Value::Number(have), Value::Number(want)) => match (have.as_f64(), want.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => have == want,
        },
        (have, want) => have == want,
    }
}
