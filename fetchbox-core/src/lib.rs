#![warn(missing_docs)]
//! # fetchbox-core
//!
//! Core types shared by the fetchbox crates.
//!
//! - [`CacheKey`] names one cached JSON resource.
//! - [`Transport`] performs one bounded GET and returns parsed JSON or a
//!   classified [`TransportFailure`].
//! - [`RequestAttempt`] and [`CorrelationId`] describe a single try of a
//!   logical request.
//!
//! The client orchestration (cache store, single-flight, retries) lives in
//! the `fetchbox` crate; transports such as `fetchbox-reqwest` only depend on
//! this crate.

pub mod key;
pub mod transport;

pub use key::{CacheKey, KeyError};
pub use transport::{
    ACCEPT_JSON, BODY_EXCERPT_LIMIT, CORRELATION_HEADER, CorrelationId, RequestAttempt,
    RequestTarget, Transport, TransportFailure, excerpt,
};
