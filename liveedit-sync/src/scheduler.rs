//! Debounced, per-field serialized saves.
//!
//! Each field key owns a queue of depth one:
//! - a debounce timer, re-armed by every optimistic edit;
//! - a write lock, held by the single write in flight;
//! - a ticket counter. Every attempt takes a ticket before waiting on the
//!   write lock; once it gets the lock, an attempt whose ticket is no longer
//!   the newest steps aside, because the newer attempt will persist the
//!   latest value anyway.
//!
//! Writes to different keys never wait on each other.

use crate::cache::RecordCache;
use crate::error::EditError;
use crate::field::{FieldCore, SaveStatus};
use crate::store::BackingStore;
use liveedit_types::FieldKey;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

struct ArmedTimer {
    seq: u64,
    owner: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct SaveQueue {
    timer: Option<ArmedTimer>,
    timer_seq: u64,
    write_lock: Arc<tokio::sync::Mutex<()>>,
    latest_ticket: u64,
    /// Attempts holding a ticket that have not finished.
    outstanding: usize,
}

impl SaveQueue {
    fn is_idle(&self) -> bool {
        self.timer.is_none() && self.outstanding == 0
    }

    fn disarm(&mut self) -> bool {
        self.timer_seq += 1;
        match self.timer.take() {
            Some(timer) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }
}

struct Ticket {
    number: u64,
    write_lock: Arc<tokio::sync::Mutex<()>>,
}

struct SchedulerInner {
    store: Arc<dyn BackingStore>,
    cache: Arc<RecordCache>,
    queues: Mutex<HashMap<FieldKey, SaveQueue>>,
    /// Bumped on every queue change so `settle` can re-check.
    activity: watch::Sender<u64>,
}

/// Turns bursts of edits into single writes and keeps writes to the same
/// field strictly sequential.
#[derive(Clone)]
pub struct SaveScheduler {
    inner: Arc<SchedulerInner>,
}

/// Decrements the outstanding count when an attempt ends, even if its
/// future is dropped part-way.
struct TicketGuard {
    scheduler: SaveScheduler,
    key: FieldKey,
}

impl Drop for TicketGuard {
    fn drop(&mut self) {
        self.scheduler.finish_ticket(&self.key);
    }
}

impl SaveScheduler {
    pub(crate) fn new(store: Arc<dyn BackingStore>, cache: Arc<RecordCache>) -> Self {
        let (activity, _) = watch::channel(0);
        Self {
            inner: Arc::new(SchedulerInner {
                store,
                cache,
                queues: Mutex::new(HashMap::new()),
                activity,
            }),
        }
    }

    fn queues(&self) -> MutexGuard<'_, HashMap<FieldKey, SaveQueue>> {
        self.inner
            .queues
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn bump(&self) {
        self.inner.activity.send_modify(|n| *n = n.wrapping_add(1));
    }

    fn take_ticket(queue: &mut SaveQueue) -> Ticket {
        queue.latest_ticket += 1;
        queue.outstanding += 1;
        Ticket {
            number: queue.latest_ticket,
            write_lock: Arc::clone(&queue.write_lock),
        }
    }

    /// (Re)arms the debounce timer of the field's key.
    pub(crate) fn schedule(&self, core: &Arc<FieldCore>) {
        let delay = core.options().debounce();
        let key = core.key().clone();
        {
            let mut queues = self.queues();
            let queue = queues.entry(key.clone()).or_default();
            queue.disarm();
            let seq = queue.timer_seq;

            let this = self.clone();
            let task_core = Arc::clone(core);
            let handle = tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                this.fire(task_core, seq).await;
            });
            queue.timer = Some(ArmedTimer {
                seq,
                owner: core.id(),
                handle,
            });
        }
        debug!("Save of {} debounced for {:?}", key, delay);
        self.bump();
    }

    async fn fire(&self, core: Arc<FieldCore>, seq: u64) {
        let ticket = {
            let mut queues = self.queues();
            let Some(queue) = queues.get_mut(core.key()) else {
                return;
            };
            if queue.timer_seq != seq {
                return;
            }
            queue.timer = None;
            Self::take_ticket(queue)
        };
        self.run(core, ticket).await;
    }

    /// Cancels any armed timer for the key and takes the newest ticket.
    fn claim(&self, core: &FieldCore) -> Ticket {
        let ticket = {
            let mut queues = self.queues();
            let queue = queues.entry(core.key().clone()).or_default();
            queue.disarm();
            Self::take_ticket(queue)
        };
        self.bump();
        ticket
    }

    /// Saves immediately, cancelling any armed timer for the key.
    ///
    /// The attempt runs on its own task, so dropping the returned future
    /// stops the wait but not the save.
    pub(crate) async fn save_now(&self, core: &Arc<FieldCore>) -> SaveStatus {
        match self.spawn_attempt(core).await {
            Ok(status) => status,
            Err(e) => {
                warn!("Save task for {} did not complete: {}", core.key(), e);
                SaveStatus::Failed
            }
        }
    }

    /// Starts an immediate save in the background. The ticket is taken
    /// before returning, so `settle` already waits for it.
    pub(crate) fn dispatch(&self, core: &Arc<FieldCore>) {
        let _ = self.spawn_attempt(core);
    }

    fn spawn_attempt(&self, core: &Arc<FieldCore>) -> JoinHandle<SaveStatus> {
        let ticket = self.claim(core);
        let this = self.clone();
        let core = Arc::clone(core);
        tokio::spawn(async move { this.run(core, ticket).await })
    }

    /// Cancels the armed timer if it belongs to `core`.
    pub(crate) fn cancel(&self, core: &FieldCore) {
        let cancelled = {
            let mut queues = self.queues();
            let Some(queue) = queues.get_mut(core.key()) else {
                return;
            };
            let owned = queue
                .timer
                .as_ref()
                .is_some_and(|timer| timer.owner == core.id());
            let cancelled = owned && queue.disarm();
            if queue.is_idle() {
                queues.remove(core.key());
            }
            cancelled
        };
        if cancelled {
            debug!("Cancelled pending save of {}", core.key());
            self.bump();
        }
    }

    async fn run(&self, core: Arc<FieldCore>, ticket: Ticket) -> SaveStatus {
        let _guard = TicketGuard {
            scheduler: self.clone(),
            key: core.key().clone(),
        };
        let _write = ticket.write_lock.lock_owned().await;

        if self.is_superseded(core.key(), ticket.number) {
            debug!("Save of {} superseded by a newer attempt", core.key());
            return SaveStatus::Superseded;
        }

        let attempt = match core.begin_save() {
            Ok(attempt) => attempt,
            Err(status) => return status,
        };

        let key = core.key();
        debug!("Writing {}", key);
        let result = self
            .inner
            .store
            .write_field(key, attempt.value.clone())
            .await;
        if result.is_ok() {
            self.inner.cache.invalidate(&key.record);
        }

        let (status, follow_up) =
            core.complete_save(attempt, result.map(|_| ()).map_err(EditError::Save));
        if status == SaveStatus::Saved {
            info!("Saved {}", key);
        }
        if follow_up && self.is_last_pending(key, ticket.number) {
            debug!("Value of {} changed during save, writing again", key);
            self.dispatch(&core);
        }
        status
    }

    /// Whether no newer attempt or armed timer will write `key` after `ticket`.
    fn is_last_pending(&self, key: &FieldKey, ticket: u64) -> bool {
        self.queues()
            .get(key)
            .is_none_or(|queue| queue.timer.is_none() && queue.latest_ticket == ticket)
    }

    fn is_superseded(&self, key: &FieldKey, ticket: u64) -> bool {
        self.queues()
            .get(key)
            .is_some_and(|queue| queue.latest_ticket != ticket)
    }

    fn finish_ticket(&self, key: &FieldKey) {
        {
            let mut queues = self.queues();
            if let Some(queue) = queues.get_mut(key) {
                queue.outstanding = queue.outstanding.saturating_sub(1);
                if queue.is_idle() {
                    queues.remove(key);
                }
            }
        }
        self.bump();
    }

    /// Whether nothing is armed, queued, or in flight for `key`.
    pub fn is_idle(&self, key: &FieldKey) -> bool {
        self.queues().get(key).is_none_or(SaveQueue::is_idle)
    }

    /// Waits until `key` is idle.
    pub async fn settle(&self, key: &FieldKey) {
        let mut activity = self.inner.activity.subscribe();
        while !self.is_idle(key) {
            if activity.changed().await.is_err() {
                return;
            }
        }
    }
}
