//! Per-field edit state machine.
//!
//! A field moves between three phases:
//!
//! ```text
//!   Viewing --start_editing--> Editing --stop_editing--> Viewing
//!      ^                          |
//!      |                      (debounce / save)
//!      +------- settled ------ Saving
//! ```
//!
//! `has_changes` is never stored; it is always `value != original_value`.
//! Errors are captured into the field as display strings and never leave
//! it, so one failing field cannot disturb another.

use crate::cache::RecordCache;
use crate::config::FieldOptions;
use crate::error::EditError;
use crate::registry::FieldRegistry;
use crate::scheduler::SaveScheduler;
use chrono::{DateTime, Utc};
use liveedit_types::{FieldKey, FieldValue};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Coarse phase derived from a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPhase {
    Viewing,
    Editing,
    Saving,
}

/// Observable state of one field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSnapshot {
    pub value: FieldValue,
    pub original_value: FieldValue,
    pub has_changes: bool,
    pub is_editing: bool,
    pub is_saving: bool,
    pub is_loading: bool,
    pub error: Option<String>,
    pub last_saved_at: Option<DateTime<Utc>>,
}

impl FieldSnapshot {
    pub fn phase(&self) -> FieldPhase {
        if self.is_saving {
            FieldPhase::Saving
        } else if self.is_editing {
            FieldPhase::Editing
        } else {
            FieldPhase::Viewing
        }
    }
}

/// Result of a save attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStatus {
    /// The value was persisted.
    Saved,
    /// Nothing differed from the persisted value.
    NoChanges,
    /// The write failed; the error is on the field.
    Failed,
    /// A newer attempt for the same field was queued behind this one and
    /// will persist the latest value instead. Its outcome is not awaited.
    Superseded,
    /// The field was reverted while the write was in flight.
    Stale,
    /// The field was released before the write settled.
    Released,
}

/// What happened to a remotely observed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    Unchanged,
    SkippedSaving,
    SkippedGuardWindow,
    SkippedLocalEdits,
    Released,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorOrigin {
    /// Initial load or a refresh. A later successful read supersedes it.
    Read,
    /// A rejected write. Only a save or a revert clears it.
    Save,
}

#[derive(Debug)]
struct FieldError {
    origin: ErrorOrigin,
    message: String,
}

impl FieldError {
    fn new(origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            origin,
            message: message.into(),
        }
    }
}

#[derive(Debug)]
struct FieldState {
    value: FieldValue,
    original_value: FieldValue,
    is_editing: bool,
    is_saving: bool,
    is_loading: bool,
    error: Option<FieldError>,
    last_saved_at: Option<DateTime<Utc>>,
    last_saved_instant: Option<Instant>,
    /// Bumped by `revert`; saves started under an older generation are stale.
    generation: u64,
    alive: bool,
}

impl FieldState {
    fn has_changes(&self) -> bool {
        self.value != self.original_value
    }

    fn snapshot(&self) -> FieldSnapshot {
        FieldSnapshot {
            value: self.value.clone(),
            original_value: self.original_value.clone(),
            has_changes: self.has_changes(),
            is_editing: self.is_editing,
            is_saving: self.is_saving,
            is_loading: self.is_loading,
            error: self.error.as_ref().map(|e| e.message.clone()),
            last_saved_at: self.last_saved_at,
        }
    }

    fn has_read_error(&self) -> bool {
        self.error
            .as_ref()
            .is_some_and(|e| e.origin == ErrorOrigin::Read)
    }

    fn mark_saved(&mut self, persisted: FieldValue) {
        self.original_value = persisted;
        self.last_saved_at = Some(Utc::now());
        self.last_saved_instant = Some(Instant::now());
    }
}

/// A write captured when a save starts.
#[derive(Debug)]
pub(crate) struct SaveAttempt {
    pub(crate) value: FieldValue,
    generation: u64,
}

/// Shared state of one mounted field. Owned by [`EditableField`] and
/// referenced by the scheduler and the reconciler.
pub(crate) struct FieldCore {
    id: u64,
    key: FieldKey,
    options: FieldOptions,
    guard_window: Duration,
    state: Mutex<FieldState>,
    tx: watch::Sender<FieldSnapshot>,
}

impl FieldCore {
    pub(crate) fn new(
        id: u64,
        key: FieldKey,
        initial: FieldValue,
        options: FieldOptions,
        guard_window: Duration,
    ) -> Self {
        let state = FieldState {
            value: initial.clone(),
            original_value: initial,
            is_editing: false,
            is_saving: false,
            is_loading: false,
            error: None,
            last_saved_at: None,
            last_saved_instant: None,
            generation: 0,
            alive: true,
        };
        let (tx, _) = watch::channel(state.snapshot());
        Self {
            id,
            key,
            options,
            guard_window,
            state: Mutex::new(state),
            tx,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn key(&self) -> &FieldKey {
        &self.key
    }

    pub(crate) fn options(&self) -> FieldOptions {
        self.options
    }

    fn lock(&self) -> MutexGuard<'_, FieldState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, state: &FieldState) {
        self.tx.send_replace(state.snapshot());
    }

    pub(crate) fn snapshot(&self) -> FieldSnapshot {
        self.lock().snapshot()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<FieldSnapshot> {
        self.tx.subscribe()
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.lock().alive
    }

    // ── Local edits ──────────────────────────────────────────────

    /// Sets the visible value. Returns whether the field now differs from
    /// its persisted value.
    pub(crate) fn update_value(&self, value: FieldValue) -> bool {
        let mut state = self.lock();
        if !state.alive {
            return false;
        }
        state.value = value;
        self.publish(&state);
        state.has_changes()
    }

    pub(crate) fn revert(&self) {
        let mut state = self.lock();
        state.value = state.original_value.clone();
        state.error = None;
        state.generation += 1;
        self.publish(&state);
    }

    pub(crate) fn start_editing(&self) {
        let mut state = self.lock();
        if state.alive && !state.is_editing {
            state.is_editing = true;
            self.publish(&state);
        }
    }

    /// Leaves edit mode. Returns whether an immediate save is due.
    pub(crate) fn stop_editing(&self) -> bool {
        let mut state = self.lock();
        if !state.is_editing {
            return false;
        }
        state.is_editing = false;
        self.publish(&state);
        state.alive && !self.options.optimistic && state.has_changes()
    }

    pub(crate) fn release(&self) {
        let mut state = self.lock();
        state.alive = false;
        state.is_editing = false;
        self.publish(&state);
    }

    // ── Loading ──────────────────────────────────────────────────

    pub(crate) fn begin_load(&self) {
        let mut state = self.lock();
        state.is_loading = true;
        self.publish(&state);
    }

    /// Applies the outcome of the initial read. On failure the initial value
    /// stays in place and the error is recorded.
    pub(crate) fn finish_load(&self, result: Result<Option<FieldValue>, EditError>) {
        let mut state = self.lock();
        if !state.alive {
            return;
        }
        state.is_loading = false;
        match result {
            Ok(Some(value)) => {
                let keep_local = state.has_changes();
                state.original_value = value.clone();
                if !keep_local {
                    state.value = value;
                }
                state.error = None;
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Load of {} failed: {}", self.key, e);
                state.error = Some(FieldError::new(ErrorOrigin::Read, e.to_string()));
            }
        }
        self.publish(&state);
    }

    // ── Saving ───────────────────────────────────────────────────

    /// Marks the field as saving and captures the value to persist.
    /// The value is read now, at fire time, not when the save was scheduled.
    pub(crate) fn begin_save(&self) -> Result<SaveAttempt, SaveStatus> {
        let mut state = self.lock();
        if !state.alive {
            return Err(SaveStatus::Released);
        }
        if !state.has_changes() {
            return Err(SaveStatus::NoChanges);
        }
        state.is_saving = true;
        self.publish(&state);
        Ok(SaveAttempt {
            value: state.value.clone(),
            generation: state.generation,
        })
    }

    /// Applies a write result. The second element is true when the store
    /// now holds something other than the field's value and no edit will
    /// trigger another save: a stale write over a reverted value, or an
    /// optimistic edit made while the write was in flight.
    pub(crate) fn complete_save(
        &self,
        attempt: SaveAttempt,
        result: Result<(), EditError>,
    ) -> (SaveStatus, bool) {
        let mut state = self.lock();
        if !state.alive {
            debug!("Discarding save result for released field {}", self.key);
            return (SaveStatus::Released, false);
        }
        state.is_saving = false;

        let status = if attempt.generation != state.generation {
            if result.is_ok() {
                state.mark_saved(attempt.value);
            }
            debug!("Save of {} completed after revert", self.key);
            SaveStatus::Stale
        } else {
            match result {
                Ok(()) => {
                    state.mark_saved(attempt.value);
                    state.error = None;
                    SaveStatus::Saved
                }
                Err(e) => {
                    warn!("Save of {} failed: {}", self.key, e);
                    state.error = Some(FieldError::new(ErrorOrigin::Save, e.to_string()));
                    if !self.options.optimistic {
                        state.value = state.original_value.clone();
                    }
                    SaveStatus::Failed
                }
            }
        };
        let follow_up = match status {
            SaveStatus::Stale => state.has_changes(),
            SaveStatus::Saved => self.options.optimistic && state.has_changes(),
            _ => false,
        };
        self.publish(&state);
        (status, follow_up)
    }

    // ── Remote updates ───────────────────────────────────────────

    /// Applies a value observed on the backing store, unless doing so could
    /// clobber local work or a just-written value.
    pub(crate) fn apply_remote(&self, remote: Option<FieldValue>) -> ApplyOutcome {
        let mut state = self.lock();
        if !state.alive {
            return ApplyOutcome::Released;
        }
        if state.is_saving {
            return ApplyOutcome::SkippedSaving;
        }
        if state
            .last_saved_instant
            .is_some_and(|at| at.elapsed() < self.guard_window)
        {
            return ApplyOutcome::SkippedGuardWindow;
        }
        if state.is_editing || state.has_changes() {
            return ApplyOutcome::SkippedLocalEdits;
        }
        let Some(remote) = remote else {
            return ApplyOutcome::Unchanged;
        };
        let clears_error = state.has_read_error();
        if remote == state.value && !clears_error {
            return ApplyOutcome::Unchanged;
        }
        state.original_value = remote.clone();
        state.value = remote;
        if clears_error {
            state.error = None;
        }
        self.publish(&state);
        ApplyOutcome::Applied
    }

    /// Records a refresh failure on an idle field. A save error already on
    /// the field is kept.
    pub(crate) fn report_sync_error(&self, message: &str) {
        let mut state = self.lock();
        let idle = state.alive && !state.is_saving && !state.is_editing && !state.has_changes();
        if idle && (state.error.is_none() || state.has_read_error()) {
            state.error = Some(FieldError::new(ErrorOrigin::Read, message));
            self.publish(&state);
        }
    }
}

/// A mounted editable field.
///
/// Created by [`EditEngine::field`](crate::EditEngine::field). Dropping the
/// handle releases the field: its pending debounce is cancelled and any
/// write still in flight has its result discarded.
///
/// Methods that schedule saves must be called from within a Tokio runtime.
pub struct EditableField {
    core: Arc<FieldCore>,
    scheduler: SaveScheduler,
    cache: Arc<RecordCache>,
    registry: FieldRegistry,
    load_timeout: Duration,
}

impl EditableField {
    pub(crate) fn new(
        core: Arc<FieldCore>,
        scheduler: SaveScheduler,
        cache: Arc<RecordCache>,
        registry: FieldRegistry,
        load_timeout: Duration,
    ) -> Self {
        Self {
            core,
            scheduler,
            cache,
            registry,
            load_timeout,
        }
    }

    pub fn key(&self) -> &FieldKey {
        self.core.key()
    }

    pub fn options(&self) -> FieldOptions {
        self.core.options()
    }

    pub fn snapshot(&self) -> FieldSnapshot {
        self.core.snapshot()
    }

    /// Receives a snapshot after every state change.
    pub fn subscribe(&self) -> watch::Receiver<FieldSnapshot> {
        self.core.subscribe()
    }

    pub fn value(&self) -> FieldValue {
        self.snapshot().value
    }

    pub fn has_changes(&self) -> bool {
        self.snapshot().has_changes
    }

    pub fn is_editing(&self) -> bool {
        self.snapshot().is_editing
    }

    pub fn is_saving(&self) -> bool {
        self.snapshot().is_saving
    }

    pub fn error(&self) -> Option<String> {
        self.snapshot().error
    }

    /// Loads the field's current value through the cache, bounded by the
    /// engine's load timeout. On timeout or failure the initial value is kept
    /// and the error is recorded on the field.
    pub async fn load(&self) {
        let key = self.core.key().clone();
        self.core.begin_load();
        let result = match tokio::time::timeout(
            self.load_timeout,
            self.cache.get(&key.record, &key.field, false),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                self.cache.invalidate(&key.record);
                Err(EditError::Timeout)
            }
        };
        self.core.finish_load(result);
    }

    /// Sets the value immediately. In optimistic mode a changed value arms
    /// the debounce timer; returning to the persisted value disarms it.
    pub fn update_value(&self, value: impl Into<FieldValue>) {
        let has_changes = self.core.update_value(value.into());
        if !self.core.options().optimistic {
            return;
        }
        if has_changes {
            self.scheduler.schedule(&self.core);
        } else {
            self.scheduler.cancel(&self.core);
        }
    }

    /// Saves now, bypassing the debounce timer. Waits for a save already in
    /// flight for this field before writing.
    ///
    /// Returns [`SaveStatus::Superseded`] without waiting further when a
    /// newer save for the field was requested while this one was queued;
    /// that newer save persists the latest value. Await [`settle`] to learn
    /// its outcome from the field state.
    ///
    /// Dropping the returned future does not cancel the write.
    ///
    /// [`settle`]: EditableField::settle
    pub async fn save(&self) -> SaveStatus {
        self.scheduler.save_now(&self.core).await
    }

    /// Restores the persisted value and clears the error. Cancels a pending
    /// debounce; a write already in flight is allowed to finish but cannot
    /// override the reverted value.
    pub fn revert(&self) {
        self.scheduler.cancel(&self.core);
        self.core.revert();
    }

    pub fn start_editing(&self) {
        self.core.start_editing();
    }

    /// Leaves edit mode. In non-optimistic mode unsaved changes are saved
    /// immediately.
    pub fn stop_editing(&self) {
        if self.core.stop_editing() {
            self.scheduler.dispatch(&self.core);
        }
    }

    /// Waits until no debounce is armed and no save is queued or in flight
    /// for this field.
    pub async fn settle(&self) {
        self.scheduler.settle(self.core.key()).await;
    }

    /// Releases the field explicitly. Equivalent to dropping it.
    pub fn release(self) {}
}

impl Drop for EditableField {
    fn drop(&mut self) {
        self.scheduler.cancel(&self.core);
        self.core.release();
        self.registry.unregister(&self.core);
    }
}
