//! The engine facade: one explicitly constructed instance owns the cache,
//! the save scheduler, and the registry of mounted fields.

use crate::cache::RecordCache;
use crate::config::{EngineConfig, FieldOptions};
use crate::error::EditResult;
use crate::field::{EditableField, FieldCore};
use crate::reconciler::SyncReconciler;
use crate::registry::FieldRegistry;
use crate::scheduler::SaveScheduler;
use crate::store::BackingStore;
use liveedit_types::{FieldKey, FieldValue, SubscriptionFilter};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

struct EngineInner {
    config: EngineConfig,
    store: Arc<dyn BackingStore>,
    cache: Arc<RecordCache>,
    scheduler: SaveScheduler,
    registry: FieldRegistry,
    next_field_id: AtomicU64,
}

/// Inline editing engine. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct EditEngine {
    inner: Arc<EngineInner>,
}

impl EditEngine {
    /// Creates an engine in front of `store`.
    pub fn new(store: Arc<dyn BackingStore>, config: EngineConfig) -> EditResult<Self> {
        config.validate()?;
        Ok(Self::build(store, config))
    }

    /// Creates an engine with the default configuration.
    pub fn with_defaults(store: Arc<dyn BackingStore>) -> Self {
        Self::build(store, EngineConfig::default())
    }

    fn build(store: Arc<dyn BackingStore>, config: EngineConfig) -> Self {
        let cache = Arc::new(RecordCache::new(Arc::clone(&store), config.cache_ttl()));
        let scheduler = SaveScheduler::new(Arc::clone(&store), Arc::clone(&cache));
        Self {
            inner: Arc::new(EngineInner {
                config,
                store,
                cache,
                scheduler,
                registry: FieldRegistry::default(),
                next_field_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn cache(&self) -> &Arc<RecordCache> {
        &self.inner.cache
    }

    pub fn scheduler(&self) -> &SaveScheduler {
        &self.inner.scheduler
    }

    pub(crate) fn store(&self) -> &Arc<dyn BackingStore> {
        &self.inner.store
    }

    pub(crate) fn registry(&self) -> &FieldRegistry {
        &self.inner.registry
    }

    /// Mounts a field with the engine's default options. The field shows
    /// `initial` until [`EditableField::load`] completes.
    pub fn field(&self, key: FieldKey, initial: impl Into<FieldValue>) -> EditableField {
        self.field_with(key, initial, self.inner.config.default_field)
    }

    /// Mounts a field with explicit options.
    pub fn field_with(
        &self,
        key: FieldKey,
        initial: impl Into<FieldValue>,
        options: FieldOptions,
    ) -> EditableField {
        let id = self.inner.next_field_id.fetch_add(1, Ordering::Relaxed);
        debug!("Mounting {} (field #{})", key, id);
        let core = Arc::new(FieldCore::new(
            id,
            key,
            initial.into(),
            options,
            self.inner.config.guard_window(),
        ));
        self.inner.registry.register(&core);
        EditableField::new(
            core,
            self.inner.scheduler.clone(),
            Arc::clone(&self.inner.cache),
            self.inner.registry.clone(),
            self.inner.config.load_timeout(),
        )
    }

    /// Mounts a field and loads it.
    pub async fn mount(
        &self,
        key: FieldKey,
        initial: impl Into<FieldValue>,
        options: FieldOptions,
    ) -> EditableField {
        let field = self.field_with(key, initial, options);
        field.load().await;
        field
    }

    /// Builds a reconciler for records matching `filter`.
    pub fn reconciler(&self, filter: SubscriptionFilter) -> SyncReconciler {
        SyncReconciler::new(self.clone(), filter)
    }

    /// Number of mounted fields.
    pub fn live_fields(&self) -> usize {
        self.inner.registry.len()
    }
}
