//! Records fetched from the content store.

use crate::Error;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The value held by a single field. Content fields are arbitrary JSON.
pub type FieldValue = Value;

/// A full record as returned by the backing store: field name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: Map<String, Value>,
}

impl Record {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a record from a JSON object value.
    pub fn from_json(value: Value) -> Result<Self, Error> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            _ => Err(Error::NotAnObject),
        }
    }

    /// Parses a record from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self, Error> {
        Self::from_json(serde_json::from_str(s)?)
    }

    /// Returns the value of a field, if present.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// Sets a field, returning the previous value.
    pub fn set(&mut self, field: impl Into<String>, value: FieldValue) -> Option<FieldValue> {
        self.fields.insert(field.into(), value)
    }

    /// Builder-style variant of [`Record::set`].
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: FieldValue) -> Self {
        self.set(field, value);
        self
    }

    /// Iterates over field names.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Number of fields in the record.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Converts the record back into a JSON object value.
    #[must_use]
    pub fn into_json(self) -> Value {
        Value::Object(self.fields)
    }
}
