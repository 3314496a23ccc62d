//! Retry classification and backoff.
//!
//! Failures are classified by exhaustive matching on [`TransportFailure`]:
//!
//! | failure | verdict |
//! |---|---|
//! | `Timeout` | retryable |
//! | `Network` | retryable |
//! | `HttpStatus(>= 500)` | retryable |
//! | `HttpStatus(< 500)` | fatal |
//! | `MalformedPayload` | fatal |
//!
//! The delay before retry `n` (the `n + 1`-th try overall) is
//! `min(cap, base * 2^(n-1) + jitter)` with jitter drawn uniformly from
//! `[100ms, 250ms]`.

use std::ops::RangeInclusive;
use std::time::Duration;

use fetchbox_core::TransportFailure;
use rand::Rng;

use crate::error::ErrorKind;

/// Base delay of the first retry.
pub const BASE_DELAY: Duration = Duration::from_millis(500);
/// Upper bound of any single delay.
pub const MAX_DELAY: Duration = Duration::from_millis(3000);
/// Jitter range added to the exponential delay, in milliseconds.
pub const JITTER_MS: RangeInclusive<u64> = 100..=250;

/// Whether a failure may be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Transient failure; try again after a backoff.
    Retryable,
    /// Permanent failure; surface it now.
    Fatal,
}

/// What the retry loop does after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for the given delay, then try again.
    RetryAfter(Duration),
    /// Stop and surface the failure.
    GiveUp,
}

/// Retry policy of one logical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
}

impl RetryPolicy {
    /// Creates a policy allowing `max_retries` attempts after the first.
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// Maximum number of retries.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Classifies a transport failure.
    pub fn classify(failure: &TransportFailure) -> Verdict {
        Self::classify_kind(ErrorKind::from(failure), failure.status())
    }

    /// Classifies an error by kind and, for HTTP errors, status.
    ///
    /// Kinds that never come out of a transport call are fatal.
    pub fn classify_kind(kind: ErrorKind, status: Option<u16>) -> Verdict {
        match kind {
            ErrorKind::Timeout | ErrorKind::Network => Verdict::Retryable,
            ErrorKind::Http if status.is_some_and(|s| s >= 500) => Verdict::Retryable,
            ErrorKind::Http
            | ErrorKind::MalformedPayload
            | ErrorKind::InvalidKey
            | ErrorKind::Decode
            | ErrorKind::Cancelled
            | ErrorKind::Panicked => Verdict::Fatal,
        }
    }

    /// Decides what to do after `failures` failed attempts, the last being `failure`.
    pub fn decide(&self, failure: &TransportFailure, failures: u32) -> RetryDecision {
        if Self::classify(failure) == Verdict::Fatal || failures > self.max_retries {
            RetryDecision::GiveUp
        } else {
            RetryDecision::RetryAfter(Self::next_delay(failures))
        }
    }

    /// Delay before retry number `attempt` (1-based), with random jitter.
    pub fn next_delay(attempt: u32) -> Duration {
        let jitter = rand::thread_rng().gen_range(JITTER_MS);
        Self::delay_with_jitter(attempt, Duration::from_millis(jitter))
    }

    /// Delay before retry number `attempt` (1-based) for a given jitter.
    pub fn delay_with_jitter(attempt: u32, jitter: Duration) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        BASE_DELAY
            .saturating_mul(factor)
            .saturating_add(jitter)
            .min(MAX_DELAY)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(crate::options::DEFAULT_RETRIES)
    }
}
