//! Change notifications pushed by the backing store.

use crate::ids::RecordKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a [`SyncEvent`] reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SyncEventKind {
    /// A record changed. `changed_fields` is `None` when the store does not
    /// say which fields were touched.
    ItemChanged {
        key: RecordKey,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        changed_fields: Option<Vec<String>>,
    },
    /// The push channel's connectivity changed.
    ConnectionStatus { connected: bool },
}

/// A single change notification. Transient: consumed once and discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncEvent {
    #[serde(flatten)]
    pub kind: SyncEventKind,
    pub timestamp: DateTime<Utc>,
}

impl SyncEvent {
    /// An item-changed notification stamped with the current time.
    #[must_use]
    pub fn item_changed(key: RecordKey, changed_fields: Option<Vec<String>>) -> Self {
        Self {
            kind: SyncEventKind::ItemChanged {
                key,
                changed_fields,
            },
            timestamp: Utc::now(),
        }
    }

    /// A connection-status notification stamped with the current time.
    #[must_use]
    pub fn connection_status(connected: bool) -> Self {
        Self {
            kind: SyncEventKind::ConnectionStatus { connected },
            timestamp: Utc::now(),
        }
    }

    /// Whether this notification concerns `field` of the given record.
    /// An item-changed event without a field list touches every field.
    #[must_use]
    pub fn touches(&self, key: &RecordKey, field: &str) -> bool {
        match &self.kind {
            SyncEventKind::ItemChanged {
                key: changed,
                changed_fields,
            } => {
                changed == key
                    && changed_fields
                        .as_ref()
                        .is_none_or(|fields| fields.iter().any(|f| f == field))
            }
            SyncEventKind::ConnectionStatus { .. } => false,
        }
    }
}

/// Selects which records a push subscription delivers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionFilter {
    /// Collections of interest. Empty means every collection.
    #[serde(default)]
    pub collections: Vec<String>,
    /// Specific records of interest. Empty means every item in the
    /// selected collections.
    #[serde(default)]
    pub items: Vec<RecordKey>,
}

impl SubscriptionFilter {
    /// A filter matching everything.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// A filter for a set of collections.
    #[must_use]
    pub fn collections<I, S>(collections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            collections: collections.into_iter().map(Into::into).collect(),
            items: Vec::new(),
        }
    }

    /// Adds a specific record to the filter.
    #[must_use]
    pub fn with_item(mut self, key: RecordKey) -> Self {
        self.items.push(key);
        self
    }

    /// Whether a record falls within this filter.
    #[must_use]
    pub fn matches(&self, key: &RecordKey) -> bool {
        let collection_ok =
            self.collections.is_empty() || self.collections.iter().any(|c| *c == key.collection);
        let item_ok = self.items.is_empty() || self.items.contains(key);
        collection_ok && item_ok
    }
}
