//! Identifier types for records and fields.
//!
//! A record is addressed by `(collection, item_id)` and a field by
//! `(collection, item_id, field)`. The textual forms are
//! `collection/item_id` and `collection/item_id#field`. Collections and
//! item ids in textual form may not contain `/` or `#`; field names may
//! contain anything after the first `#`.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifies one record in the content store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    pub collection: String,
    pub item_id: String,
}

impl RecordKey {
    /// Creates a record key.
    #[must_use]
    pub fn new(collection: impl Into<String>, item_id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            item_id: item_id.into(),
        }
    }

    /// Returns the key of `field` on this record.
    #[must_use]
    pub fn field(&self, field: impl Into<String>) -> FieldKey {
        FieldKey {
            record: self.clone(),
            field: field.into(),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.item_id)
    }
}

impl FromStr for RecordKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((collection, item_id))
                if !collection.is_empty()
                    && !item_id.is_empty()
                    && !item_id.contains('/')
                    && !s.contains('#') =>
            {
                Ok(Self::new(collection, item_id))
            }
            _ => Err(Error::InvalidKey(s.to_string())),
        }
    }
}

/// Identifies one editable field: a record key plus a field name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldKey {
    pub record: RecordKey,
    pub field: String,
}

impl FieldKey {
    /// Creates a field key.
    #[must_use]
    pub fn new(
        collection: impl Into<String>,
        item_id: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        RecordKey::new(collection, item_id).field(field)
    }

    /// The collection this field belongs to.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.record.collection
    }

    /// The item id of the owning record.
    #[must_use]
    pub fn item_id(&self) -> &str {
        &self.record.item_id
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.record, self.field)
    }
}

impl FromStr for FieldKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (record, field) = s
            .split_once('#')
            .ok_or_else(|| Error::InvalidKey(s.to_string()))?;
        if field.is_empty() {
            return Err(Error::InvalidKey(s.to_string()));
        }
        Ok(record.parse::<RecordKey>()?.field(field))
    }
}
