//! Cache store.
//!
//! [`CacheStore`] keeps one [`CacheEntry`] per [`CacheKey`]: the last good
//! payload, the instant it stops being fresh, and the flight currently
//! fetching it. It is the only place entries are mutated.
//!
//! The store is a cheap handle over shared state. Build one per process (or
//! per test) and hand clones to every client that should share it.
//!
//! Each operation runs under the lock of a single map shard and never
//! awaits while holding it, so the check-then-reserve sequence in
//! [`acquire`](CacheStore::acquire) cannot interleave with another caller
//! for the same key.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use fetchbox_core::CacheKey;
use serde_json::Value;
use tokio::time::Instant;

use crate::flight::{Attachment, Flight, FlightId, FlightOutcome};

/// Stored state of one key.
#[derive(Debug, Default)]
pub struct CacheEntry {
    /// `None` with a value means the value never goes stale.
    fresh_until: Option<Instant>,
    value: Option<Arc<Value>>,
    /// Flight that wrote `value`.
    written_by: FlightId,
    in_flight: Option<Flight>,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        self.value.is_some() && self.fresh_until.is_none_or(|until| now < until)
    }

    fn store(&mut self, id: FlightId, value: Arc<Value>, ttl: Duration) {
        self.value = Some(value);
        self.fresh_until = Instant::now().checked_add(ttl);
        self.written_by = id;
    }

    /// Installs `flight` unless another flight is already running.
    fn reserve(&mut self, flight: Flight) -> Reservation {
        if let Some(running) = &self.in_flight {
            return Reservation::Busy(running.clone());
        }
        self.in_flight = Some(flight);
        Reservation::Reserved
    }

    fn classify(&self, now: Instant) -> Lookup {
        match (&self.value, &self.in_flight) {
            (Some(value), _) if self.is_fresh(now) => Lookup::Fresh(value.clone()),
            (_, Some(flight)) => Lookup::Pending(flight.clone()),
            (Some(value), None) => Lookup::Stale(value.clone()),
            (None, None) => Lookup::Empty,
        }
    }
}

/// Result of [`CacheStore::lookup`].
#[derive(Debug, Clone)]
pub enum Lookup {
    /// A value that is still fresh.
    Fresh(Arc<Value>),
    /// A value past its freshness window, with no refresh running.
    Stale(Arc<Value>),
    /// Nothing cached and nothing running.
    Empty,
    /// A request for the key is running.
    Pending(Flight),
}

/// Result of reserving a flight on an entry.
#[derive(Debug)]
enum Reservation {
    /// The flight was installed.
    Reserved,
    /// Another flight already runs for the key; the offered one was not installed.
    Busy(Flight),
}

/// Result of [`CacheStore::acquire`].
pub(crate) enum Acquired {
    /// Served from cache.
    Fresh(Arc<Value>),
    /// Attached to a flight that was already running.
    Joined(Attachment),
    /// A new flight was reserved; the caller is attached to it.
    Started(Attachment),
}

#[derive(Debug)]
struct StoreInner {
    entries: DashMap<CacheKey, CacheEntry>,
    next_flight: AtomicU64,
}

/// Keyed storage of fresh results and in-flight requests.
#[derive(Debug, Clone)]
pub struct CacheStore {
    inner: Arc<StoreInner>,
}

impl CacheStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                entries: DashMap::new(),
                next_flight: AtomicU64::new(1),
            }),
        }
    }

    /// Reports what the store holds for `key` right now.
    pub fn lookup(&self, key: &CacheKey) -> Lookup {
        let now = Instant::now();
        self.inner
            .entries
            .get(key)
            .map(|entry| entry.classify(now))
            .unwrap_or(Lookup::Empty)
    }

    /// Removes the entry for `key`. Returns whether one existed.
    ///
    /// A flight already running for the key keeps running for its callers
    /// and still caches a successful outcome.
    pub fn evict(&self, key: &CacheKey) -> bool {
        self.inner.entries.remove(key).is_some()
    }

    /// Removes every entry.
    pub fn evict_all(&self) {
        let keys: Vec<CacheKey> = self.inner.entries.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            self.inner.entries.remove(&key);
        }
    }

    /// Number of entries, including those with only a running flight.
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    /// Whether the store has no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Whether two handles point at the same store.
    pub fn same_store(&self, other: &CacheStore) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn next_flight_id(&self) -> FlightId {
        self.inner.next_flight.fetch_add(1, Ordering::Relaxed)
    }

    /// Looks `key` up and, on a miss, reserves a new flight built by `start`,
    /// all under one shard lock.
    ///
    /// `start` receives the id of the new flight and must not touch the store.
    pub(crate) fn acquire<F>(&self, key: &CacheKey, start: F) -> Acquired
    where
        F: FnOnce(FlightId) -> Flight,
    {
        let now = Instant::now();
        let mut entry = self.inner.entries.entry(key.clone()).or_default();
        let flight = match entry.classify(now) {
            Lookup::Fresh(value) => return Acquired::Fresh(value),
            Lookup::Pending(flight) => {
                flight.attach();
                return Acquired::Joined(Attachment::new(self.clone(), key.clone(), flight));
            }
            Lookup::Stale(_) | Lookup::Empty => {
                let flight = start(self.next_flight_id());
                match entry.reserve(flight.clone()) {
                    Reservation::Reserved => flight,
                    Reservation::Busy(running) => running,
                }
            }
        };
        flight.attach();
        Acquired::Started(Attachment::new(self.clone(), key.clone(), flight))
    }

    /// Records the outcome of flight `id` for `key`.
    ///
    /// Success stores the value, fresh for `ttl` (forever when `ttl` does
    /// not fit in an instant). Failure removes the entry if flight `id`
    /// still owns it. A cleared entry is filled again on success.
    ///
    /// Ignored when a newer flight is running for the key or already wrote
    /// its value.
    pub(crate) fn publish(
        &self,
        key: &CacheKey,
        id: FlightId,
        outcome: &FlightOutcome,
        ttl: Duration,
    ) -> bool {
        let finished = match self.inner.entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get();
                let owned = match &entry.in_flight {
                    Some(running) if running.id() == id => true,
                    Some(_) => return false,
                    None if entry.written_by > id => return false,
                    None => false,
                };
                match outcome {
                    Ok(value) => {
                        let entry = occupied.get_mut();
                        entry.store(id, value.clone(), ttl);
                        entry.in_flight.take()
                    }
                    Err(_) if owned => occupied.remove().in_flight,
                    Err(_) => return false,
                }
            }
            Entry::Vacant(vacant) => match outcome {
                Ok(value) => {
                    let mut entry = CacheEntry::default();
                    entry.store(id, value.clone(), ttl);
                    vacant.insert(entry);
                    None
                }
                Err(_) => return false,
            },
        };
        drop(finished);
        true
    }

    /// Hands back one caller's interest in `flight`.
    ///
    /// When no caller is left and the flight still owns the entry, it is
    /// removed from the entry, which drops the underlying request. A
    /// finished flight has already handed the entry back when publishing.
    pub(crate) fn detach(&self, key: &CacheKey, flight: &Flight) {
        if flight.release() > 0 {
            return;
        }
        let abandoned = match self.inner.entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let owns = occupied
                    .get()
                    .in_flight
                    .as_ref()
                    .is_some_and(|running| running.same_as(flight));
                // A caller may have attached between the release and the lock.
                if !owns || flight.waiters() > 0 {
                    return;
                }
                if occupied.get().value.is_some() {
                    occupied.get_mut().in_flight.take()
                } else {
                    occupied.remove().in_flight
                }
            }
            Entry::Vacant(_) => return,
        };
        drop(abandoned);
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}
