//! Transport abstraction.
//!
//! A [`Transport`] performs exactly one bounded GET for a [`RequestTarget`]
//! and reports either the parsed JSON body or a classified
//! [`TransportFailure`]. The client drives it once per attempt and never runs
//! two attempts of the same logical request at the same time.
//!
//! Keeping the network behind this trait lets the client run against a
//! deterministic stub in tests and against `reqwest` in production.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::time::Instant;
use uuid::Uuid;

/// Name of the header carrying the correlation id.
pub const CORRELATION_HEADER: &str = "X-Correlation-Id";

/// Value of the `Accept` header sent with every request.
pub const ACCEPT_JSON: &str = "application/json";

/// Maximum number of characters of an error body kept in [`TransportFailure::HttpStatus`].
pub const BODY_EXCERPT_LIMIT: usize = 200;

/// Final fetch target produced by the URL builder.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RequestTarget(String);

impl RequestTarget {
    /// Wraps an already built target.
    pub fn new(target: impl Into<String>) -> Self {
        Self(target.into())
    }

    /// Returns the target as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the target, returning the inner string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for RequestTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-logical-request token shared by all attempts of that request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generates a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying uuid.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for CorrelationId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// One try of a logical request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestAttempt {
    /// Correlation id of the logical request.
    pub correlation_id: CorrelationId,
    /// Attempt index, starting at 1.
    pub number: u32,
    /// Per-attempt timeout the deadline was derived from.
    pub timeout: Duration,
    /// Instant by which the attempt must settle.
    pub deadline: Instant,
}

/// Horizon used when `now + timeout` does not fit in an [`Instant`].
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

impl RequestAttempt {
    /// Creates attempt `number` whose deadline is `timeout` from now.
    ///
    /// A timeout too large to represent is clamped to a far-future deadline.
    pub fn new(correlation_id: CorrelationId, number: u32, timeout: Duration) -> Self {
        let now = Instant::now();
        let deadline = now
            .checked_add(timeout)
            .unwrap_or_else(|| now + FAR_FUTURE);
        Self {
            correlation_id,
            number,
            timeout,
            deadline,
        }
    }

    /// Time left until the deadline, zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

/// Classified outcome of a failed transport call.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TransportFailure {
    /// The call did not settle before its deadline.
    #[error("request timed out after {after:?}")]
    Timeout {
        /// Configured per-attempt timeout.
        after: Duration,
    },

    /// Connection-level failure (DNS, refused, reset, ...).
    #[error("network failure: {0}")]
    Network(String),

    /// The server answered with a non-2xx status.
    #[error("HTTP {status}{}", excerpt_suffix(.body_excerpt))]
    HttpStatus {
        /// Response status code.
        status: u16,
        /// Leading part of the response body.
        body_excerpt: String,
    },

    /// A 2xx response whose body is not valid JSON.
    #[error("malformed JSON payload: {0}")]
    MalformedPayload(String),
}

fn excerpt_suffix(body: &str) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!(": {body}")
    }
}

impl TransportFailure {
    /// Builds an [`HttpStatus`](Self::HttpStatus) failure, truncating the body.
    pub fn http_status(status: u16, body: &str) -> Self {
        Self::HttpStatus {
            status,
            body_excerpt: excerpt(body),
        }
    }

    /// Returns the HTTP status for [`HttpStatus`](Self::HttpStatus) failures.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Truncates `body` to at most [`BODY_EXCERPT_LIMIT`] characters.
pub fn excerpt(body: &str) -> String {
    match body.char_indices().nth(BODY_EXCERPT_LIMIT) {
        Some((end, _)) => body[..end].to_owned(),
        None => body.to_owned(),
    }
}

/// Performs one bounded network call.
///
/// Implementations must:
/// - issue a single GET to `target`, with no body,
/// - send `Accept: application/json` and [`CORRELATION_HEADER`] set to
///   `attempt.correlation_id`,
/// - give up once `attempt.deadline` has passed, reporting
///   [`TransportFailure::Timeout`],
/// - treat only a 2xx status with a valid JSON body as success.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use fetchbox_core::{RequestAttempt, RequestTarget, Transport, TransportFailure};
/// use serde_json::{Value, json};
///
/// struct Fixed(Value);
///
/// #[async_trait]
/// impl Transport for Fixed {
///     async fn send(
///         &self,
///         _target: &RequestTarget,
///         _attempt: &RequestAttempt,
///     ) -> Result<Value, TransportFailure> {
///         Ok(self.0.clone())
///     }
/// }
///
/// let _transport = Fixed(json!({"ok": true}));
/// ```
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends one request for `target`.
    async fn send(
        &self,
        target: &RequestTarget,
        attempt: &RequestAttempt,
    ) -> Result<Value, TransportFailure>;

    /// Short name used in logs and metric labels.
    fn name(&self) -> &str {
        "transport"
    }
}

#[async_trait]
impl<T> Transport for std::sync::Arc<T>
where
    T: Transport + ?Sized,
{
    async fn send(
        &self,
        target: &RequestTarget,
        attempt: &RequestAttempt,
    ) -> Result<Value, TransportFailure> {
        (**self).send(target, attempt).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excerpt_keeps_short_bodies() {
        assert_eq!(excerpt("not found"), "not found");
    }

    #[test]
    fn excerpt_truncates_on_char_boundary() {
        let body = "é".repeat(BODY_EXCERPT_LIMIT + 10);
        let cut = excerpt(&body);
        assert_eq!(cut.chars().count(), BODY_EXCERPT_LIMIT);
    }

    #[test]
    fn http_status_display_includes_excerpt() {
        let failure = TransportFailure::http_status(503, "upstream down");
        assert_eq!(failure.to_string(), "HTTP 503: upstream down");
        assert_eq!(failure.status(), Some(503));

        let bare = TransportFailure::http_status(404, "");
        assert_eq!(bare.to_string(), "HTTP 404");
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_remaining_counts_down() {
        let attempt = RequestAttempt::new(CorrelationId::new(), 1, Duration::from_millis(500));
        assert_eq!(attempt.remaining(), Duration::from_millis(500));
        tokio::time::advance(Duration::from_millis(200)).await;
        assert_eq!(attempt.remaining(), Duration::from_millis(300));
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(attempt.remaining(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_timeout_clamps_deadline() {
        let attempt = RequestAttempt::new(CorrelationId::new(), 1, Duration::MAX);
        assert_eq!(attempt.timeout, Duration::MAX);
        assert!(attempt.remaining() >= FAR_FUTURE - Duration::from_secs(1));
    }
}
