//! Backing store abstraction.
//!
//! The engine reads whole records, writes single fields, and optionally
//! listens to a push channel of change notifications. Any content service
//! client can sit behind [`BackingStore`].

use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use futures::stream::BoxStream;
use liveedit_types::{FieldKey, FieldValue, Record, RecordKey, SubscriptionFilter, SyncEvent};

/// Stream of push notifications. An `Err` item means the connection dropped.
pub type ChangeStream = BoxStream<'static, StoreResult<SyncEvent>>;

/// The remote content store the engine edits.
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Reads a full record.
    async fn read_record(&self, key: &RecordKey) -> StoreResult<Record>;

    /// Persists one field and returns the updated record.
    async fn write_field(&self, key: &FieldKey, value: FieldValue) -> StoreResult<Record>;

    /// Opens a push subscription. Stores without push support keep the
    /// default, and the reconciler falls back to polling.
    async fn subscribe(&self, _filter: &SubscriptionFilter) -> StoreResult<ChangeStream> {
        Err(StoreError::Unsupported)
    }
}

/// An in-memory store for testing.
pub mod mock {
    use super::*;
    use futures::StreamExt;
    use std::collections::{HashMap, HashSet, VecDeque};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    #[derive(Default)]
    struct MockState {
        records: HashMap<RecordKey, Record>,
        reads: usize,
        writes: Vec<(FieldKey, FieldValue)>,
        read_latency: Duration,
        write_latency: Duration,
        read_failures: VecDeque<StoreError>,
        write_failures: VecDeque<StoreError>,
        hanging: HashSet<RecordKey>,
        subscribe_failures: VecDeque<StoreError>,
        subscribe_attempts: Vec<Instant>,
        push_disabled: bool,
        push: Option<mpsc::UnboundedSender<StoreResult<SyncEvent>>>,
        active_writes: HashMap<FieldKey, usize>,
        max_writes_per_field: usize,
        total_active_writes: usize,
        max_total_writes: usize,
    }

    /// In-memory [`BackingStore`] with latency and failure injection.
    /// Reads observe the record as it is when the call starts.
    #[derive(Default)]
    pub struct MockStore {
        state: Mutex<MockState>,
    }

    impl MockStore {
        /// Creates an empty mock store.
        pub fn new() -> Self {
            Self::default()
        }

        /// Builder-style record insertion.
        pub fn with_record(self, key: RecordKey, record: Record) -> Self {
            self.insert_record(key, record);
            self
        }

        /// Inserts or replaces a record.
        pub fn insert_record(&self, key: RecordKey, record: Record) {
            self.state.lock().unwrap().records.insert(key, record);
        }

        /// Changes a field as another editor would, without counting a write.
        pub fn set_remote(&self, key: &FieldKey, value: FieldValue) {
            self.state
                .lock()
                .unwrap()
                .records
                .entry(key.record.clone())
                .or_default()
                .set(key.field.clone(), value);
        }

        /// Current stored value of a field.
        pub fn stored(&self, key: &FieldKey) -> Option<FieldValue> {
            self.state
                .lock()
                .unwrap()
                .records
                .get(&key.record)
                .and_then(|r| r.get(&key.field).cloned())
        }

        pub fn set_read_latency(&self, latency: Duration) {
            self.state.lock().unwrap().read_latency = latency;
        }

        pub fn set_write_latency(&self, latency: Duration) {
            self.state.lock().unwrap().write_latency = latency;
        }

        /// The next `n` reads fail with `error`.
        pub fn fail_next_reads(&self, n: usize, error: StoreError) {
            let mut state = self.state.lock().unwrap();
            state.read_failures.extend(std::iter::repeat_n(error, n));
        }

        /// The next `n` writes fail with `error`.
        pub fn fail_next_writes(&self, n: usize, error: StoreError) {
            let mut state = self.state.lock().unwrap();
            state.write_failures.extend(std::iter::repeat_n(error, n));
        }

        /// Reads of `key` never complete.
        pub fn hang_reads(&self, key: RecordKey) {
            self.state.lock().unwrap().hanging.insert(key);
        }

        /// The next `n` subscribe calls fail.
        pub fn fail_next_subscribes(&self, n: usize) {
            let mut state = self.state.lock().unwrap();
            state.subscribe_failures.extend(std::iter::repeat_n(
                StoreError::Network("connection refused".into()),
                n,
            ));
        }

        /// Makes `subscribe` return [`StoreError::Unsupported`].
        pub fn disable_push(&self) {
            self.state.lock().unwrap().push_disabled = true;
        }

        /// Delivers a notification to the current subscriber.
        /// Returns `false` if nobody is subscribed.
        pub fn push(&self, event: SyncEvent) -> bool {
            let state = self.state.lock().unwrap();
            state
                .push
                .as_ref()
                .is_some_and(|tx| tx.send(Ok(event)).is_ok())
        }

        /// Drops the current subscription with an error item.
        pub fn drop_subscription(&self, reason: &str) {
            if let Some(tx) = self.state.lock().unwrap().push.take() {
                let _ = tx.send(Err(StoreError::Disconnected(reason.to_string())));
            }
        }

        /// Whether a subscriber is currently attached.
        pub fn has_subscriber(&self) -> bool {
            self.state
                .lock()
                .unwrap()
                .push
                .as_ref()
                .is_some_and(|tx| !tx.is_closed())
        }

        pub fn read_count(&self) -> usize {
            self.state.lock().unwrap().reads
        }

        pub fn write_count(&self) -> usize {
            self.state.lock().unwrap().writes.len()
        }

        /// Completed writes in completion order.
        pub fn writes(&self) -> Vec<(FieldKey, FieldValue)> {
            self.state.lock().unwrap().writes.clone()
        }

        /// Times at which `subscribe` was called.
        pub fn subscribe_attempts(&self) -> Vec<Instant> {
            self.state.lock().unwrap().subscribe_attempts.clone()
        }

        /// Highest number of overlapping writes observed for a single field.
        pub fn max_concurrent_writes_per_field(&self) -> usize {
            self.state.lock().unwrap().max_writes_per_field
        }

        /// Highest number of overlapping writes observed overall.
        pub fn max_concurrent_writes(&self) -> usize {
            self.state.lock().unwrap().max_total_writes
        }
    }

    #[async_trait]
    impl BackingStore for MockStore {
        async fn read_record(&self, key: &RecordKey) -> StoreResult<Record> {
            let (latency, hang, result) = {
                let mut state = self.state.lock().unwrap();
                state.reads += 1;
                let result = match state.read_failures.pop_front() {
                    Some(err) => Err(err),
                    None => state
                        .records
                        .get(key)
                        .cloned()
                        .ok_or_else(|| StoreError::NotFound(key.clone())),
                };
                (state.read_latency, state.hanging.contains(key), result)
            };
            if hang {
                std::future::pending::<()>().await;
            }
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            result
        }

        async fn write_field(&self, key: &FieldKey, value: FieldValue) -> StoreResult<Record> {
            let latency = {
                let mut state = self.state.lock().unwrap();
                let active = state.active_writes.entry(key.clone()).or_insert(0);
                *active += 1;
                let active = *active;
                state.max_writes_per_field = state.max_writes_per_field.max(active);
                state.total_active_writes += 1;
                state.max_total_writes = state.max_total_writes.max(state.total_active_writes);
                state.write_latency
            };
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            let mut state = self.state.lock().unwrap();
            if let Some(active) = state.active_writes.get_mut(key) {
                *active -= 1;
            }
            state.total_active_writes -= 1;
            if let Some(err) = state.write_failures.pop_front() {
                return Err(err);
            }
            state.writes.push((key.clone(), value.clone()));
            let record = state.records.entry(key.record.clone()).or_default();
            record.set(key.field.clone(), value);
            Ok(record.clone())
        }

        async fn subscribe(&self, filter: &SubscriptionFilter) -> StoreResult<ChangeStream> {
            let mut state = self.state.lock().unwrap();
            state.subscribe_attempts.push(Instant::now());
            if state.push_disabled {
                return Err(StoreError::Unsupported);
            }
            if let Some(err) = state.subscribe_failures.pop_front() {
                return Err(err);
            }
            let (tx, mut rx) = mpsc::unbounded_channel();
            state.push = Some(tx);
            let filter = filter.clone();
            let stream = futures::stream::poll_fn(move |cx| rx.poll_recv(cx)).filter(move |item| {
                let keep = match item {
                    Ok(event) => match &event.kind {
                        liveedit_types::SyncEventKind::ItemChanged { key, .. } => {
                            filter.matches(key)
                        }
                        liveedit_types::SyncEventKind::ConnectionStatus { .. } => true,
                    },
                    Err(_) => true,
                };
                futures::future::ready(keep)
            });
            Ok(stream.boxed())
        }
    }
}
