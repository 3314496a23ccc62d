//! Error types returned by the client.

use std::fmt;
use std::time::Duration;

use fetchbox_core::{CacheKey, CorrelationId, KeyError, TransportFailure};
use thiserror::Error;

use crate::retry::{RetryPolicy, Verdict};

/// Where a failed request came from.
///
/// Carried by every [`FetchError`] produced after a request started, so a
/// failure can be traced back to its key and correlation id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// Key that was being fetched.
    pub key: CacheKey,
    /// Correlation id shared by all attempts.
    pub correlation_id: CorrelationId,
    /// Number of transport calls made.
    pub attempts: u32,
}

impl fmt::Display for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "key={} correlation_id={} attempts={}",
            self.key, self.correlation_id, self.attempts
        )
    }
}

/// Error returned by [`Client::fetch_json`](crate::Client::fetch_json).
///
/// The type is `Clone` because one failed flight is delivered to every
/// caller attached to it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The key was rejected before any request was made.
    #[error("invalid cache key: {0}")]
    InvalidKey(#[from] KeyError),

    /// Every attempt ran past its deadline.
    #[error("request timed out after {after:?} ({context})")]
    Timeout {
        /// Request context.
        context: RequestContext,
        /// Per-attempt timeout that elapsed.
        after: Duration,
    },

    /// Connection-level failure.
    #[error("network error: {message} ({context})")]
    Network {
        /// Request context.
        context: RequestContext,
        /// Underlying cause.
        message: String,
    },

    /// The server answered with a non-2xx status.
    #[error("HTTP {status} ({context}){}", body_suffix(.body_excerpt))]
    Http {
        /// Request context.
        context: RequestContext,
        /// Response status code.
        status: u16,
        /// Leading part of the response body.
        body_excerpt: String,
    },

    /// A 2xx response whose body was not the expected JSON.
    #[error("malformed JSON payload: {message} ({context})")]
    MalformedPayload {
        /// Request context.
        context: RequestContext,
        /// Parser message.
        message: String,
    },

    /// The payload was valid JSON but did not match the requested type.
    #[error("payload of {key} does not decode as {type_name}: {message}")]
    Decode {
        /// Key whose payload was decoded.
        key: CacheKey,
        /// Name of the target type.
        type_name: &'static str,
        /// Decoder message.
        message: String,
    },

    /// The caller withdrew its interest before the outcome was ready.
    #[error("fetch of {key} was cancelled by the caller")]
    Cancelled {
        /// Key the caller was waiting on.
        key: CacheKey,
    },

    /// The request panicked, usually inside the transport.
    ///
    /// Delivered to every attached caller like any other failure; the
    /// entry is evicted.
    #[error("request for {key} panicked: {message}")]
    Panicked {
        /// Key that was being fetched.
        key: CacheKey,
        /// Panic payload, when it was a string.
        message: String,
    },
}

fn body_suffix(body: &str) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!(": {body}")
    }
}

/// Flat classification of [`FetchError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`FetchError::InvalidKey`].
    InvalidKey,
    /// See [`FetchError::Timeout`].
    Timeout,
    /// See [`FetchError::Network`].
    Network,
    /// See [`FetchError::Http`].
    Http,
    /// See [`FetchError::MalformedPayload`].
    MalformedPayload,
    /// See [`FetchError::Decode`].
    Decode,
    /// See [`FetchError::Cancelled`].
    Cancelled,
    /// See [`FetchError::Panicked`].
    Panicked,
}

impl ErrorKind {
    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidKey => "invalid_key",
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::Http => "http",
            Self::MalformedPayload => "malformed_payload",
            Self::Decode => "decode",
            Self::Cancelled => "cancelled",
            Self::Panicked => "panicked",
        }
    }
}

impl From<&TransportFailure> for ErrorKind {
    fn from(failure: &TransportFailure) -> Self {
        match failure {
            TransportFailure::Timeout { .. } => Self::Timeout,
            TransportFailure::Network(_) => Self::Network,
            TransportFailure::HttpStatus { .. } => Self::Http,
            TransportFailure::MalformedPayload(_) => Self::MalformedPayload,
        }
    }
}

impl FetchError {
    /// Wraps the last transport failure of a request.
    pub fn from_failure(context: RequestContext, failure: TransportFailure) -> Self {
        match failure {
            TransportFailure::Timeout { after } => Self::Timeout { context, after },
            TransportFailure::Network(message) => Self::Network { context, message },
            TransportFailure::HttpStatus {
                status,
                body_excerpt,
            } => Self::Http {
                context,
                status,
                body_excerpt,
            },
            TransportFailure::MalformedPayload(message) => {
                Self::MalformedPayload { context, message }
            }
        }
    }

    /// Returns the flat kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidKey(_) => ErrorKind::InvalidKey,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Network { .. } => ErrorKind::Network,
            Self::Http { .. } => ErrorKind::Http,
            Self::MalformedPayload { .. } => ErrorKind::MalformedPayload,
            Self::Decode { .. } => ErrorKind::Decode,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::Panicked { .. } => ErrorKind::Panicked,
        }
    }

    /// Returns the request context, if a request was started.
    pub fn context(&self) -> Option<&RequestContext> {
        match self {
            Self::Timeout { context, .. }
            | Self::Network { context, .. }
            | Self::Http { context, .. }
            | Self::MalformedPayload { context, .. } => Some(context),
            Self::InvalidKey(_)
            | Self::Decode { .. }
            | Self::Cancelled { .. }
            | Self::Panicked { .. } => None,
        }
    }

    /// Returns the HTTP status for [`FetchError::Http`].
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the retry loop treats this kind of failure as transient.
    pub fn is_retryable(&self) -> bool {
        RetryPolicy::classify_kind(self.kind(), self.status()) == Verdict::Retryable
    }
}

/// Error returned when loading a [`ClientConfig`](crate::ClientConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The YAML document could not be parsed.
    #[error("invalid configuration: {0}")]
    Yaml(String),
}
