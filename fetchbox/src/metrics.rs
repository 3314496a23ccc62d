//! Metrics declaration and recording helpers.
//!
//! With the `metrics` feature disabled every helper is an empty inline
//! function the compiler removes.

use std::time::Duration;

use crate::error::ErrorKind;

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
lazy_static! {
    /// Track number of calls served from a fresh entry.
    pub static ref FETCH_HIT_COUNTER: &'static str = {
        metrics::describe_counter!(
            "fetchbox_cache_hit_total",
            "Total number of fetches served from a fresh cache entry."
        );
        "fetchbox_cache_hit_total"
    };
    /// Track number of calls that started a new flight.
    pub static ref FETCH_MISS_COUNTER: &'static str = {
        metrics::describe_counter!(
            "fetchbox_cache_miss_total",
            "Total number of fetches that started a new request."
        );
        "fetchbox_cache_miss_total"
    };
    /// Track number of calls that joined a running flight.
    pub static ref FETCH_COALESCED_COUNTER: &'static str = {
        metrics::describe_counter!(
            "fetchbox_coalesced_total",
            "Total number of fetches attached to a request already in flight."
        );
        "fetchbox_coalesced_total"
    };
    /// Track number of retries scheduled.
    pub static ref FETCH_RETRY_COUNTER: &'static str = {
        metrics::describe_counter!(
            "fetchbox_retry_total",
            "Total number of retries scheduled after a transient failure."
        );
        "fetchbox_retry_total"
    };
    /// Track number of flights that ended in failure.
    pub static ref FETCH_FAILURE_COUNTER: &'static str = {
        metrics::describe_counter!(
            "fetchbox_failure_total",
            "Total number of requests that failed after all attempts."
        );
        "fetchbox_failure_total"
    };
    /// Histogram of single transport call duration.
    pub static ref TRANSPORT_DURATION: &'static str = {
        metrics::describe_histogram!(
            "fetchbox_transport_duration_seconds",
            metrics::Unit::Seconds,
            "Duration of single transport calls in seconds."
        );
        "fetchbox_transport_duration_seconds"
    };
}

/// How a call was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Served {
    /// From a fresh entry.
    Hit,
    /// By a new flight.
    Miss,
    /// By joining a running flight.
    Coalesced,
}

/// Record how a call was served.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_served(served: Served) {
    let counter = match served {
        Served::Hit => *FETCH_HIT_COUNTER,
        Served::Miss => *FETCH_MISS_COUNTER,
        Served::Coalesced => *FETCH_COALESCED_COUNTER,
    };
    metrics::counter!(counter).increment(1);
}

/// No-op version when metrics feature is disabled.
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_served(_served: Served) {}

/// Record one transport call and its outcome kind (`ok` on success).
#[cfg(feature = "metrics")]
#[inline]
pub fn record_transport(transport: &str, outcome: &'static str, duration: Duration) {
    metrics::histogram!(
        *TRANSPORT_DURATION,
        "transport" => transport.to_string(),
        "outcome" => outcome
    )
    .record(duration.as_secs_f64());
}

/// No-op version when metrics feature is disabled.
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_transport(_transport: &str, _outcome: &'static str, _duration: Duration) {}

/// Record a scheduled retry.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_retry(kind: ErrorKind) {
    metrics::counter!(*FETCH_RETRY_COUNTER, "kind" => kind.as_str()).increment(1);
}

/// No-op version when metrics feature is disabled.
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_retry(_kind: ErrorKind) {}

/// Record a request that failed for good.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_failure(kind: ErrorKind) {
    metrics::counter!(*FETCH_FAILURE_COUNTER, "kind" => kind.as_str()).increment(1);
}

/// No-op version when metrics feature is disabled.
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_failure(_kind: ErrorKind) {}
