//! Single-flight request sharing.
//!
//! A [`Flight`] is the shared, awaitable outcome of one logical request for
//! a key. The cache store holds at most one flight per key; every caller
//! that finds it attaches and receives the same value or the same error.
//!
//! The outcome is a [`Shared`] future driven lazily by whichever attached
//! caller polls it, so no background task is needed and dropping the last
//! handle drops the underlying request.
//!
//! Callers are counted through [`Attachment`] guards. Dropping an attachment
//! before the outcome is ready detaches that caller only; the flight is
//! abandoned once the last caller detaches.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};

use fetchbox_core::{CacheKey, CorrelationId};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;

use crate::error::FetchError;
use crate::store::CacheStore;

/// Result delivered to every caller attached to a flight.
pub type FlightOutcome = Result<Arc<Value>, FetchError>;

/// Identifier of a flight, unique within its store.
pub type FlightId = u64;

struct FlightInner {
    id: FlightId,
    correlation_id: CorrelationId,
    outcome: Shared<BoxFuture<'static, FlightOutcome>>,
    waiters: AtomicUsize,
}

/// Handle to a running request for one key.
#[derive(Clone)]
pub struct Flight {
    inner: Arc<FlightInner>,
}

impl Flight {
    pub(crate) fn new(
        id: FlightId,
        correlation_id: CorrelationId,
        future: BoxFuture<'static, FlightOutcome>,
    ) -> Self {
        Self {
            inner: Arc::new(FlightInner {
                id,
                correlation_id,
                outcome: future.shared(),
                waiters: AtomicUsize::new(0),
            }),
        }
    }

    /// Identifier of this flight.
    pub fn id(&self) -> FlightId {
        self.inner.id
    }

    /// Correlation id sent with every attempt of this flight.
    pub fn correlation_id(&self) -> CorrelationId {
        self.inner.correlation_id
    }

    /// Number of callers currently attached.
    pub fn waiters(&self) -> usize {
        self.inner.waiters.load(Ordering::Acquire)
    }

    /// Whether the outcome is already available.
    pub fn is_complete(&self) -> bool {
        self.inner.outcome.peek().is_some()
    }

    pub(crate) fn same_as(&self, other: &Flight) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn attach(&self) {
        self.inner.waiters.fetch_add(1, Ordering::AcqRel);
    }

    /// Returns the number of callers left after this one detached.
    pub(crate) fn release(&self) -> usize {
        self.inner.waiters.fetch_sub(1, Ordering::AcqRel) - 1
    }
}

impl fmt::Debug for Flight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flight")
            .field("id", &self.inner.id)
            .field("correlation_id", &self.inner.correlation_id)
            .field("waiters", &self.waiters())
            .field("complete", &self.is_complete())
            .finish()
    }
}

/// One caller's interest in a flight.
///
/// Created by the store with the waiter count already incremented; dropping
/// it hands the count back through [`CacheStore::detach`].
#[must_use = "an attachment does nothing unless awaited"]
pub struct Attachment {
    store: CacheStore,
    key: CacheKey,
    flight: Flight,
    outcome: Shared<BoxFuture<'static, FlightOutcome>>,
}

impl Attachment {
    pub(crate) fn new(store: CacheStore, key: CacheKey, flight: Flight) -> Self {
        let outcome = flight.inner.outcome.clone();
        Self {
            store,
            key,
            flight,
            outcome,
        }
    }

    /// The flight this caller is attached to.
    pub fn flight(&self) -> &Flight {
        &self.flight
    }
}

impl Future for Attachment {
    type Output = FlightOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.outcome.poll_unpin(cx)
    }
}

impl Drop for Attachment {
    fn drop(&mut self) {
        self.store.detach(&self.key, &self.flight);
    }
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("key", &self.key)
            .field("flight", &self.flight)
            .finish()
    }
}
