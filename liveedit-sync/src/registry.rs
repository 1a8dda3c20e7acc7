//! Index of live fields by record, used by the reconciler to find the
//! fields an external change concerns.

use crate::field::FieldCore;
use liveedit_types::RecordKey;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

#[derive(Clone, Default)]
pub(crate) struct FieldRegistry {
    fields: Arc<Mutex<HashMap<RecordKey, Vec<Weak<FieldCore>>>>>,
}

impl FieldRegistry {
    fn lock(&self) -> MutexGuard<'_, HashMap<RecordKey, Vec<Weak<FieldCore>>>> {
        self.fields
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn register(&self, core: &Arc<FieldCore>) {
        self.lock()
            .entry(core.key().record.clone())
            .or_default()
            .push(Arc::downgrade(core));
    }

    pub(crate) fn unregister(&self, core: &FieldCore) {
        let mut fields = self.lock();
        let record = &core.key().record;
        if let Some(list) = fields.get_mut(record) {
            list.retain(|weak| weak.upgrade().is_some_and(|c| c.id() != core.id()));
            if list.is_empty() {
                fields.remove(record);
            }
        }
    }

    /// Live fields mounted on `record`.
    pub(crate) fn fields_of(&self, record: &RecordKey) -> Vec<Arc<FieldCore>> {
        self.lock()
            .get(record)
            .map(|list| {
                list.iter()
                    .filter_map(Weak::upgrade)
                    .filter(|core| core.is_alive())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Records with at least one mounted field.
    pub(crate) fn records(&self) -> Vec<RecordKey> {
        let mut records: Vec<_> = self.lock().keys().cloned().collect();
        records.sort();
        records
    }

    pub(crate) fn len(&self) -> usize {
        self.lock()
            .values()
            .map(|list| list.iter().filter(|w| w.strong_count() > 0).count())
            .sum()
    }
}
