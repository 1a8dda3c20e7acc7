//! Inline content editing and synchronization engine.
//!
//! Lets a privileged viewer edit a field of a rendered page in place, shows
//! the edit immediately, persists it after a quiet period, and keeps the
//! page in step with edits made elsewhere.
//!
//! # Architecture
//!
//! - **Cache**: read-through record cache with request coalescing
//! - **Field**: per-field edit state machine (viewing → editing → saving)
//! - **Scheduler**: debounced saves, serialized per field
//! - **Reconciler**: push subscription with backoff, poll fallback
//! - **Engine**: owns one cache, scheduler, and field registry
//!
//! Permission checks live in `liveedit-auth`; callers consult them before
//! entering edit mode.
//!
//! # Example
//!
//! ```no_run
//! use liveedit_sync::store::mock::MockStore;
//! use liveedit_sync::{EditEngine, FieldOptions};
//! use liveedit_types::{FieldKey, Record, RecordKey};
//! use std::sync::Arc;
//!
//! # async fn demo() {
//! let key = RecordKey::new("products", "42");
//! let store = MockStore::new().with_record(key.clone(), Record::new().with("title", "Mug".into()));
//! let engine = EditEngine::with_defaults(Arc::new(store));
//!
//! let title = engine
//!     .mount(FieldKey::new("products", "42", "title"), "", FieldOptions::optimistic(500))
//!     .await;
//! title.start_editing();
//! title.update_value("Coffee mug");
//! title.stop_editing();
//! title.settle().await;
//! assert!(!title.has_changes());
//! # }
//! ```

pub mod backoff;
pub mod cache;
pub mod config;
mod engine;
mod error;
pub mod field;
pub mod reconciler;
mod registry;
pub mod scheduler;
pub mod store;

pub use backoff::Backoff;
pub use cache::{CacheStats, RecordCache};
pub use config::{BackoffConfig, EngineConfig, FieldOptions};
pub use engine::EditEngine;
pub use error::{EditError, EditResult, StoreError, StoreResult};
pub use field::{ApplyOutcome, EditableField, FieldPhase, FieldSnapshot, SaveStatus};
pub use reconciler::{
    ConnectionState, ReconcileCommand, ReconcilerHandle, RefreshOutcome, SyncReconciler,
};
pub use scheduler::SaveScheduler;
pub use store::{BackingStore, ChangeStream};
