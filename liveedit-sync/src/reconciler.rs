//! Keeps idle fields fresh with changes made elsewhere.
//!
//! Two channels feed the reconciler:
//! - a push subscription on the backing store, reconnected with exponential
//!   backoff whenever it drops;
//! - polling of mounted records while push is unavailable, plus explicit
//!   refresh requests. Refreshes of one record are throttled to one per
//!   `refresh_min_interval`.
//!
//! Every observed change invalidates the cache entry of its record. The new
//! value reaches a field only when the field is idle and outside the guard
//! window of its last local save (see [`ApplyOutcome`]).

use crate::backoff::Backoff;
use crate::engine::EditEngine;
use crate::error::{EditError, EditResult, StoreError, StoreResult};
use crate::field::ApplyOutcome;
use crate::store::ChangeStream;
use futures::StreamExt;
use liveedit_types::{FieldKey, RecordKey, SubscriptionFilter, SyncEvent, SyncEventKind};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

const COMMAND_BUFFER: usize = 64;

/// Connectivity of the reconciler's push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    /// Waiting `delay` before reconnect attempt number `attempt`.
    Reconnecting { attempt: u32, delay: Duration },
    /// Push is unsupported or retries are exhausted; polling only.
    Polling,
    Stopped,
}

/// Commands accepted by a running reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileCommand {
    Refresh(RecordKey),
    RefreshAll,
    Shutdown,
}

/// Result of a refresh request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Another refresh of the record ran within the minimum interval.
    Throttled,
    Refreshed(Vec<(FieldKey, ApplyOutcome)>),
    Failed(EditError),
}

/// Reconciles externally observed changes into the cache and idle fields.
pub struct SyncReconciler {
    engine: EditEngine,
    filter: SubscriptionFilter,
    backoff: Backoff,
    last_refresh: HashMap<RecordKey, Instant>,
    push_connected: bool,
    state_tx: watch::Sender<ConnectionState>,
}

impl SyncReconciler {
    pub(crate) fn new(engine: EditEngine, filter: SubscriptionFilter) -> Self {
        let backoff = Backoff::new(&engine.config().backoff);
        let (state_tx, _) = watch::channel(ConnectionState::Connecting);
        Self {
            engine,
            filter,
            backoff,
            last_refresh: HashMap::new(),
            push_connected: false,
            state_tx,
        }
    }

    pub fn filter(&self) -> &SubscriptionFilter {
        &self.filter
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }

    /// Applies one push notification.
    pub async fn handle_event(&mut self, event: SyncEvent) -> Vec<(FieldKey, ApplyOutcome)> {
        let SyncEventKind::ItemChanged { key, .. } = &event.kind else {
            return Vec::new();
        };
        if !self.filter.matches(key) {
            return Vec::new();
        }

        let cache = self.engine.cache();
        cache.invalidate(key);
        let fields: Vec<_> = self
            .engine
            .registry()
            .fields_of(key)
            .into_iter()
            .filter(|core| event.touches(key, &core.key().field))
            .collect();
        if fields.is_empty() {
            debug!("Change to {} touches no mounted field", key);
            return Vec::new();
        }

        match cache.get_record(key, true).await {
            Ok(record) => fields
                .iter()
                .map(|core| {
                    let outcome = core.apply_remote(record.get(&core.key().field).cloned());
                    log_outcome(core.key(), outcome);
                    (core.key().clone(), outcome)
                })
                .collect(),
            Err(e) => {
                warn!("Failed to fetch {} after change notification: {}", key, e);
                Vec::new()
            }
        }
    }

    /// Re-reads a record and applies it to the record's idle fields.
    /// Throttled per record.
    pub async fn refresh(&mut self, key: &RecordKey) -> RefreshOutcome {
        let now = Instant::now();
        let min_interval = self.engine.config().refresh_min_interval();
        if self
            .last_refresh
            .get(key)
            .is_some_and(|last| now.duration_since(*last) < min_interval)
        {
            debug!("Refresh of {} throttled", key);
            return RefreshOutcome::Throttled;
        }
        self.last_refresh.insert(key.clone(), now);

        let cache = self.engine.cache();
        cache.invalidate(key);
        let fields = self.engine.registry().fields_of(key);
        match cache.get_record(key, true).await {
            Ok(record) => RefreshOutcome::Refreshed(
                fields
                    .iter()
                    .map(|core| {
                        let outcome = core.apply_remote(record.get(&core.key().field).cloned());
                        log_outcome(core.key(), outcome);
                        (core.key().clone(), outcome)
                    })
                    .collect(),
            ),
            Err(e) => {
                warn!("Refresh of {} failed: {}", key, e);
                if !self.push_connected {
                    let message = e.to_string();
                    for core in &fields {
                        core.report_sync_error(&message);
                    }
                }
                RefreshOutcome::Failed(e)
            }
        }
    }

    /// Refreshes every mounted record matching the filter.
    pub async fn refresh_all(&mut self) -> usize {
        self.prune_refresh_log();
        let records: Vec<_> = self
            .engine
            .registry()
            .records()
            .into_iter()
            .filter(|key| self.filter.matches(key))
            .collect();
        let mut refreshed = 0;
        for key in &records {
            if matches!(self.refresh(key).await, RefreshOutcome::Refreshed(_)) {
                refreshed += 1;
            }
        }
        refreshed
    }

    /// Forgets throttle entries of unmounted records and entries that no
    /// longer throttle anything.
    fn prune_refresh_log(&mut self) {
        let mounted: HashSet<RecordKey> = self.engine.registry().records().into_iter().collect();
        let min_interval = self.engine.config().refresh_min_interval();
        let now = Instant::now();
        self.last_refresh.retain(|key, last| {
            mounted.contains(key) && now.duration_since(*last) < min_interval
        });
    }

    /// Records currently remembered by the refresh throttle.
    pub fn throttled_records(&self) -> usize {
        self.last_refresh.len()
    }

    /// Starts the reconciler on the current Tokio runtime.
    pub fn spawn(self) -> ReconcilerHandle {
        let (commands, rx) = mpsc::channel(COMMAND_BUFFER);
        let state = self.state_tx.subscribe();
        let task = tokio::spawn(self.run(rx));
        ReconcilerHandle {
            commands,
            state,
            task,
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<ReconcileCommand>) {
        let mut stream: Option<ChangeStream> = None;
        let mut retry_at = Some(Instant::now());
        let mut poll = self.engine.config().poll_interval().map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(ReconcileCommand::Refresh(key)) => {
                        self.refresh(&key).await;
                    }
                    Some(ReconcileCommand::RefreshAll) => {
                        self.refresh_all().await;
                    }
                    Some(ReconcileCommand::Shutdown) | None => break,
                },
                item = next_change(&mut stream) => match item {
                    Some(Ok(event)) => match event.kind {
                        SyncEventKind::ConnectionStatus { connected: false } => {
                            stream = None;
                            retry_at = self.connection_lost("store reported disconnect");
                        }
                        SyncEventKind::ConnectionStatus { connected: true } => {}
                        SyncEventKind::ItemChanged { .. } => {
                            self.handle_event(event).await;
                        }
                    },
                    Some(Err(e)) => {
                        stream = None;
                        retry_at = self.connection_lost(&e.to_string());
                    }
                    None => {
                        stream = None;
                        retry_at = self.connection_lost("stream ended");
                    }
                },
                _ = wait_until(retry_at) => {
                    retry_at = None;
                    self.set_state(ConnectionState::Connecting);
                    match self.engine.store().subscribe(&self.filter).await {
                        Ok(s) => {
                            info!("Push channel connected");
                            self.backoff.reset();
                            self.push_connected = true;
                            self.set_state(ConnectionState::Connected);
                            stream = Some(s);
                        }
                        Err(StoreError::Unsupported) => {
                            info!("Store has no push channel, polling only");
                            self.set_state(ConnectionState::Polling);
                        }
                        Err(e) => {
                            retry_at = self.connection_lost(&e.to_string());
                        }
                    }
                },
                _ = tick(&mut poll) => {
                    if stream.is_none() {
                        self.refresh_all().await;
                    }
                },
            }
        }

        self.push_connected = false;
        self.set_state(ConnectionState::Stopped);
        info!("Reconciler stopped");
    }

    /// Records a push failure and returns when to reconnect.
    fn connection_lost(&mut self, reason: &str) -> Option<Instant> {
        self.push_connected = false;
        let error = EditError::Connection(reason.to_string());
        match self.backoff.next_delay() {
            Some(delay) => {
                let attempt = self.backoff.attempts();
                warn!("{}; reconnecting in {:?} (attempt {})", error, delay, attempt);
                self.set_state(ConnectionState::Reconnecting { attempt, delay });
                Some(Instant::now() + delay)
            }
            None => {
                warn!("{}; giving up on push after {} attempts", error, self.backoff.attempts());
                self.set_state(ConnectionState::Polling);
                None
            }
        }
    }
}

fn log_outcome(key: &FieldKey, outcome: ApplyOutcome) {
    match outcome {
        ApplyOutcome::Applied => info!("Applied remote value to {}", key),
        ApplyOutcome::SkippedGuardWindow => debug!("Ignored echo for {} inside guard window", key),
        ApplyOutcome::SkippedSaving | ApplyOutcome::SkippedLocalEdits => {
            debug!("Kept local state of {}: {:?}", key, outcome)
        }
        ApplyOutcome::Unchanged | ApplyOutcome::Released => {}
    }
}

async fn next_change(stream: &mut Option<ChangeStream>) -> Option<StoreResult<SyncEvent>> {
    match stream {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Handle to a spawned reconciler.
pub struct ReconcilerHandle {
    commands: mpsc::Sender<ReconcileCommand>,
    state: watch::Receiver<ConnectionState>,
    task: JoinHandle<()>,
}

impl ReconcilerHandle {
    /// Requests a (throttled) refresh of one record, e.g. from a
    /// collaborating editor surface.
    pub async fn refresh(&self, key: RecordKey) -> EditResult<()> {
        self.send(ReconcileCommand::Refresh(key)).await
    }

    pub async fn refresh_all(&self) -> EditResult<()> {
        self.send(ReconcileCommand::RefreshAll).await
    }

    async fn send(&self, command: ReconcileCommand) -> EditResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| EditError::ChannelClosed)
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receives every connection state change.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Stops the reconciler and waits for it to exit.
    pub async fn shutdown(self) -> EditResult<()> {
        let _ = self.commands.send(ReconcileCommand::Shutdown).await;
        self.task.await.map_err(|_| EditError::ChannelClosed)
    }
}
