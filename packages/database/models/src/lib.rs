#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Warehouse result row types.
//!
//! The analytical warehouse returns an ordered list of records with named
//! fields. These types are the backend-neutral shape of one such record, so
//! consumers never depend on a particular database driver's value types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single scalar value read from the warehouse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    /// SQL `NULL`.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Any integer type that fits in 64 bits.
    Int(i64),
    /// Any floating point (or out-of-range integer) value.
    Real(f64),
    /// Text value.
    Text(String),
}

/// A named-field record returned by the warehouse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    fields: BTreeMap<String, FieldValue>,
}

impl Row {
    /// Creates an empty row.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            fields: BTreeMap::new(),
        }
    }

    /// Adds a field, returning the row (builder style).
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.insert(name, value);
        self
    }

    /// Sets a field, replacing any previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) {
        self.fields.insert(name.into(), value);
    }

    /// Returns the raw value of a field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Returns a text field. Integers are not coerced.
    #[must_use]
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.fields.get(name) {
            Some(FieldValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// Returns an integer field.
    ///
    /// Whole-valued reals are accepted since aggregate functions often
    /// widen integer sums to floating point.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn int(&self, name: &str) -> Option<i64> {
        match self.fields.get(name) {
            Some(FieldValue::Int(v)) => Some(*v),
            Some(FieldValue::Real(v)) if v.is_finite() && v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    /// Returns a numeric field as `f64`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn real(&self, name: &str) -> Option<f64> {
        match self.fields.get(name) {
            Some(FieldValue::Real(v)) => Some(*v),
            Some(FieldValue::Int(v)) => Some(*v as f64),
            _ => None,
        }
    }

    /// Iterates over field names in sorted order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Number of fields in the row.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the row has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
