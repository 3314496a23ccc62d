use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cancel::CancelHandle;

/// Default freshness window.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);
/// Default per-attempt deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(8);
/// Default number of retries after the first attempt.
pub const DEFAULT_RETRIES: u32 = 2;

/// Per-call options for [`Client::fetch_json`](crate::Client::fetch_json).
///
/// Durations use humantime notation when deserialized (`"30s"`, `"500ms"`).
/// The cancellation handle is never serialized.
///
/// ```
/// use std::time::Duration;
/// use fetchbox::FetchOptions;
///
/// let options = FetchOptions::default()
///     .ttl(Duration::from_secs(60))
///     .retries(1)
///     .cache_bust(true);
/// assert_eq!(options.retries, 1);
/// assert_eq!(options.timeout, Duration::from_secs(8));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FetchOptions {
    /// How long a successful result stays fresh.
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    /// Maximum additional attempts after the first.
    pub retries: u32,
    /// Deadline of each attempt.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Force a unique request target so intermediaries cannot answer from their caches.
    pub cache_bust: bool,
    /// Caller-scoped cancellation.
    #[serde(skip)]
    pub cancel: Option<CancelHandle>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            retries: DEFAULT_RETRIES,
            timeout: DEFAULT_TIMEOUT,
            cache_bust: false,
            cancel: None,
        }
    }
}

impl FetchOptions {
    /// Set the freshness window.
    pub fn ttl(self, ttl: Duration) -> Self {
        Self { ttl, ..self }
    }

    /// Set the maximum number of retries.
    pub fn retries(self, retries: u32) -> Self {
        Self { retries, ..self }
    }

    /// Set the per-attempt deadline.
    pub fn timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }

    /// Enable or disable cache busting.
    pub fn cache_bust(self, cache_bust: bool) -> Self {
        Self { cache_bust, ..self }
    }

    /// Attach a caller-scoped cancellation handle.
    pub fn cancel(self, cancel: CancelHandle) -> Self {
        Self {
            cancel: Some(cancel),
            ..self
        }
    }
}
