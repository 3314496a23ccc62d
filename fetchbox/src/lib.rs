#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]
//! # fetchbox
//!
//! A JSON fetch client with a TTL cache, single-flight request sharing and
//! retries with exponential backoff.
//!
//! ```no_run
//! use std::time::Duration;
//! use fetchbox::{Client, FetchOptions};
//! # use fetchbox::Transport;
//!
//! # async fn run<T: Transport + 'static>(transport: T) -> Result<(), fetchbox::FetchError> {
//! let client = Client::new(transport);
//! let options = FetchOptions::default().ttl(Duration::from_secs(60));
//!
//! // Concurrent calls for the same key share one request.
//! let (a, b) = tokio::join!(
//!     client.fetch_json("/data/users.json", &options),
//!     client.fetch_json("/data/users.json", &options),
//! );
//! assert_eq!(a?, b?);
//! # Ok(())
//! # }
//! ```
//!
//! The transport is pluggable through [`Transport`]; `fetchbox-reqwest`
//! provides one backed by `reqwest`.

/// Caller-scoped cancellation handles.
pub mod cancel;

/// [`Client`] and its builder.
pub mod client;

/// Configuration loaded from code, YAML or the environment.
pub mod config;

/// Error types.
///
/// [`FetchError`] is what callers see; it is `Clone` so one failed request
/// can be delivered to every caller sharing it.
pub mod error;

/// Shared in-flight requests.
pub mod flight;

/// Metrics collection.
///
/// When the `metrics` feature is enabled this module records counters for
/// cache hits, misses, coalesced callers, retries and failures, and a
/// histogram of transport call latency.
pub mod metrics;

/// Per-call fetch options.
pub mod options;

/// Retry classification and backoff.
pub mod retry;

/// Keyed cache storage.
pub mod store;

/// Request target construction.
pub mod target;

pub use cancel::CancelHandle;
pub use client::{Client, ClientBuilder};
pub use config::{ClientConfig, DataLocation};
pub use error::{ConfigError, ErrorKind, FetchError, RequestContext};
pub use flight::{Flight, FlightId};
pub use options::FetchOptions;
pub use retry::{RetryDecision, RetryPolicy, Verdict};
pub use store::{CacheStore, Lookup};
pub use target::TargetBuilder;

pub use fetchbox_core::{
    CacheKey, CorrelationId, KeyError, RequestAttempt, RequestTarget, Transport, TransportFailure,
};
