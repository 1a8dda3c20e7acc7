//! Read-through record cache with request coalescing.
//!
//! Fields of the same record are usually mounted together, so the cache
//! always fetches and stores whole records. Concurrent misses for one record
//! share a single backend read. Each fetch is tagged with a generation; a
//! fetch that was invalidated while outstanding never populates the cache,
//! so `invalidate` followed by `get` always observes a fresh read.
//!
//! Failed fetches leave no entry behind: the next read simply retries.

use crate::error::{EditError, EditResult, StoreResult};
use crate::store::BackingStore;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use liveedit_types::{FieldValue, Record, RecordKey};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

type SharedFetch = Shared<BoxFuture<'static, StoreResult<Record>>>;

struct CacheEntry {
    record: Record,
    fetched_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        now.duration_since(self.fetched_at) < self.ttl
    }
}

struct InFlight {
    generation: u64,
    fetch: SharedFetch,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<RecordKey, CacheEntry>,
    in_flight: HashMap<RecordKey, InFlight>,
    next_generation: u64,
}

#[derive(Default)]
struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    fetches: AtomicU64,
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads answered from a fresh entry.
    pub hits: u64,
    /// Reads that found no usable entry.
    pub misses: u64,
    /// Misses that joined a fetch already in flight.
    pub coalesced: u64,
    /// Backend reads issued.
    pub fetches: u64,
}

/// Process-wide record cache. Create one per engine and share it by `Arc`.
pub struct RecordCache {
    store: Arc<dyn BackingStore>,
    ttl: Duration,
    state: Arc<Mutex<CacheState>>,
    counters: CacheCounters,
}

fn lock(state: &Mutex<CacheState>) -> MutexGuard<'_, CacheState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RecordCache {
    /// Creates an empty cache in front of `store`.
    pub fn new(store: Arc<dyn BackingStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            state: Arc::new(Mutex::new(CacheState::default())),
            counters: CacheCounters::default(),
        }
    }

    /// Time-to-live of new entries.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns one field of a record. A missing field yields `Ok(None)`.
    pub async fn get(
        &self,
        key: &RecordKey,
        field: &str,
        bypass_cache: bool,
    ) -> EditResult<Option<FieldValue>> {
        let record = self.get_record(key, bypass_cache).await?;
        Ok(record.get(field).cloned())
    }

    /// Returns a full record, fetching it on a miss.
    ///
    /// With `bypass_cache` a new backend read is always started; it replaces
    /// any fetch already in flight for the record.
    pub async fn get_record(&self, key: &RecordKey, bypass_cache: bool) -> EditResult<Record> {
        let fetch = {
            let mut state = lock(&self.state);
            let now = Instant::now();

            if !bypass_cache {
                let fresh = state
                    .entries
                    .get(key)
                    .filter(|entry| entry.is_fresh(now))
                    .map(|entry| entry.record.clone());
                if let Some(record) = fresh {
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(record);
                }
                state.entries.remove(key);
            }
            self.counters.misses.fetch_add(1, Ordering::Relaxed);

            let joined = if bypass_cache {
                None
            } else {
                state.in_flight.get(key).map(|f| f.fetch.clone())
            };
            match joined {
                Some(fetch) => {
                    self.counters.coalesced.fetch_add(1, Ordering::Relaxed);
                    debug!("Joining in-flight fetch for {}", key);
                    fetch
                }
                None => self.start_fetch(&mut state, key),
            }
        };

        fetch.await.map_err(EditError::Fetch)
    }

    fn start_fetch(&self, state: &mut CacheState, key: &RecordKey) -> SharedFetch {
        state.next_generation += 1;
        let generation = state.next_generation;
        self.counters.fetches.fetch_add(1, Ordering::Relaxed);
        debug!("Fetching {} (generation {})", key, generation);

        let store = Arc::clone(&self.store);
        let shared_state = Arc::clone(&self.state);
        let ttl = self.ttl;
        let owned_key = key.clone();

        let fetch = async move {
            let result = store.read_record(&owned_key).await;
            let mut state = lock(&shared_state);
            let current = state
                .in_flight
                .get(&owned_key)
                .is_some_and(|f| f.generation == generation);
            if current {
                state.in_flight.remove(&owned_key);
                match &result {
                    Ok(record) => {
                        state.entries.insert(
                            owned_key,
                            CacheEntry {
                                record: record.clone(),
                                fetched_at: Instant::now(),
                                ttl,
                            },
                        );
                    }
                    Err(e) => warn!("Fetch of {} failed: {}", owned_key, e),
                }
            }
            result
        }
        .boxed()
        .shared();

        state.in_flight.insert(
            key.clone(),
            InFlight {
                generation,
                fetch: fetch.clone(),
            },
        );
        fetch
    }

    /// Drops the entry for a record and detaches any fetch in flight for it.
    pub fn invalidate(&self, key: &RecordKey) {
        let mut state = lock(&self.state);
        let had_entry = state.entries.remove(key).is_some();
        let had_fetch = state.in_flight.remove(key).is_some();
        if had_entry || had_fetch {
            debug!("Invalidated {}", key);
        }
    }

    /// Whether a fresh entry exists for `key`.
    pub fn contains(&self, key: &RecordKey) -> bool {
        lock(&self.state)
            .entries
            .get(key)
            .is_some_and(|e| e.is_fresh(Instant::now()))
    }

    /// Number of stored entries, fresh or not.
    pub fn len(&self) -> usize {
        lock(&self.state).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            coalesced: self.counters.coalesced.load(Ordering::Relaxed),
            fetches: self.counters.fetches.load(Ordering::Relaxed),
        }
    }
}
