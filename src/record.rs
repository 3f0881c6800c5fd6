//! Row sanitization and validation.
//!
//! A raw row is a map of column name to raw text. Sanitization walks the
//! kind's schema, coerces each cell to its typed value and fills defaults
//! for empty cells; columns the schema does not know are dropped so extra
//! columns in newer export formats stay harmless.
//!
//! Validity preserves a subtle legacy rule: a field that carries both a
//! default and a pattern can only be `null` when a non-empty cell failed
//! the pattern (an empty cell would have taken the default), so such a
//! `null` marks malformed input and invalidates the record even though the
//! field is not required.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::ImportIssue;
use crate::sanitize;
use crate::schema::{FieldType, Schema};

/// One raw source row: column name to raw textual value.
pub type RawRecord = HashMap<String, String>;

/// A typed, sanitized cell value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Render the value back to text, for meta storage.
    pub fn to_text(&self) -> String {
        match self {
            Value::Text(text) => text.clone(),
            Value::Int(value) => value.to_string(),
            Value::Float(value) => value.to_string(),
            Value::Bool(value) => value.to_string(),
        }
    }
}

/// A sanitized row: every schema field present, `None` when unset.
#[derive(Debug, Clone, Default)]
pub struct SanitizedRecord {
    values: HashMap<String, Option<Value>>,
}

impl SanitizedRecord {
    /// Sanitize a raw row against a schema.
    ///
    /// Per field: an empty or missing cell takes the schema default (which
    /// may itself be absent); a non-empty cell coerces by field type, with
    /// the pattern check applying to plain text fields only. A pattern
    /// miss yields `None`, deliberately distinct from the defaulted case.
    pub fn from_raw(raw: &RawRecord, schema: &Schema) -> Self {
        let mut values = HashMap::new();

        for (name, field) in schema.iter() {
            let cell = raw.get(name).map(String::as_str).unwrap_or("");
            let value = if cell.is_empty() {
                field.default.clone()
            } else {
                match field.field_type {
                    FieldType::Int => Some(Value::Int(sanitize::parse_int_permissive(cell))),
                    FieldType::Float => {
                        Some(Value::Float(sanitize::parse_float_permissive(cell)))
                    }
                    FieldType::Bool => Some(Value::Bool(sanitize::truthy(cell))),
                    FieldType::Slug => Some(Value::Text(sanitize::slugify(cell))),
                    FieldType::Email => Some(Value::Text(sanitize::sanitize_email(cell))),
                    FieldType::Url => Some(Value::Text(sanitize::sanitize_url(cell))),
                    FieldType::Text => {
                        if let Some(pattern) = &field.pattern {
                            if !pattern.is_match(cell) {
                                None
                            } else if field.allow_html {
                                Some(Value::Text(sanitize::filter_html(cell)))
                            } else {
                                Some(Value::Text(sanitize::sanitize_text(cell)))
                            }
                        } else if field.allow_html {
                            Some(Value::Text(sanitize::filter_html(cell)))
                        } else {
                            Some(Value::Text(sanitize::sanitize_text(cell)))
                        }
                    }
                }
            };

            values.insert(name.to_string(), value);
        }

        Self { values }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field).and_then(|value| value.as_ref())
    }

    pub fn is_set(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    /// Text content of a field, `None` when unset, empty, or non-textual.
    pub fn str_value(&self, field: &str) -> Option<&str> {
        self.get(field)
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
    }

    pub fn bool_value(&self, field: &str) -> bool {
        self.get(field).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn int_value(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(Value::as_int)
    }

    pub fn float_value(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(Value::as_float)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// One field-localized issue per violated field, in schema order.
    pub fn validation_errors(&self, schema: &Schema) -> Vec<ImportIssue> {
        let mut issues = Vec::new();

        for (name, field) in schema.iter() {
            if self.get(name).is_some() || !field.rejects_empty() {
                continue;
            }

            let message = if field.required {
                "required field is missing"
            } else {
                "value does not match the expected format"
            };
            issues.push(ImportIssue::validation(name, message));
        }

        issues
    }

    /// A record is valid when no field violates its schema.
    pub fn is_valid(&self, schema: &Schema) -> bool {
        self.validation_errors(schema).is_empty()
    }
}
