//! Request target construction.
//!
//! [`TargetBuilder`] turns a [`CacheKey`] into the [`RequestTarget`] handed
//! to the transport. Relative keys are resolved against an optional base
//! URL, and cache busting sets a `_` query parameter that is unique for
//! every call.
//!
//! ```
//! use fetchbox::TargetBuilder;
//! use fetchbox_core::CacheKey;
//!
//! let builder = TargetBuilder::with_base("http://localhost:5050/");
//! let key = CacheKey::new("/data/users.json").unwrap();
//!
//! let target = builder.build(&key, false);
//! assert_eq!(target.as_str(), "http://localhost:5050/data/users.json");
//!
//! let first = builder.build(&key, true);
//! let second = builder.build(&key, true);
//! assert_ne!(first, second);
//! assert!(first.as_str().starts_with("http://localhost:5050/data/users.json?_="));
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use fetchbox_core::{CacheKey, RequestTarget};
use http::Uri;
use http::uri::PathAndQuery;

/// Name of the cache-busting query parameter.
pub const CACHE_BUST_PARAM: &str = "_";

static BUST_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Builds request targets from cache keys.
#[derive(Debug, Clone, Default)]
pub struct TargetBuilder {
    base: Option<String>,
}

impl TargetBuilder {
    /// Builder that uses keys as-is.
    pub fn new() -> Self {
        Self { base: None }
    }

    /// Builder that resolves relative keys against `base`.
    pub fn with_base(base: impl Into<String>) -> Self {
        Self {
            base: Some(base.into()),
        }
    }

    /// Configured base URL, if any.
    pub fn base(&self) -> Option<&str> {
        self.base.as_deref()
    }

    /// Builds the target for `key`, appending a unique `_` parameter when `cache_bust` is set.
    pub fn build(&self, key: &CacheKey, cache_bust: bool) -> RequestTarget {
        let resolved = self.resolve(key);
        if !cache_bust {
            return RequestTarget::new(resolved);
        }

        let nonce = bust_nonce();
        let busted = resolved
            .parse::<Uri>()
            .ok()
            .and_then(|uri| set_query_param(uri, CACHE_BUST_PARAM, &nonce))
            .unwrap_or_else(|| append_query_param(&resolved, CACHE_BUST_PARAM, &nonce));
        RequestTarget::new(busted)
    }

    fn resolve(&self, key: &CacheKey) -> String {
        let Some(base) = self.base.as_deref() else {
            return key.as_str().to_owned();
        };
        if key.is_absolute() {
            return key.as_str().to_owned();
        }

        match base.parse::<Uri>() {
            Ok(uri) if uri.scheme().is_some() && uri.authority().is_some() => {
                join_uri(&uri, key.as_str())
            }
            _ => join_plain(base, key.as_str()),
        }
    }
}

/// Resolves `reference` against an absolute base the way a browser resolves a relative link.
fn join_uri(base: &Uri, reference: &str) -> String {
    let scheme = base.scheme_str().unwrap_or("http");
    let authority = base.authority().map(|a| a.as_str()).unwrap_or_default();
    if reference.starts_with('/') {
        return format!("{scheme}://{authority}{reference}");
    }
    let path = base.path();
    let dir = match path.rfind('/') {
        Some(idx) => &path[..=idx],
        None => "/",
    };
    format!("{scheme}://{authority}{dir}{reference}")
}

fn join_plain(base: &str, reference: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        reference.trim_start_matches('/')
    )
}

/// Replaces every `name` pair in the query of `uri` with `name=value`.
fn set_query_param(uri: Uri, name: &str, value: &str) -> Option<String> {
    let mut parts = uri.into_parts();
    let (path, query) = match parts.path_and_query.as_ref() {
        Some(pq) => (pq.path().to_owned(), pq.query().unwrap_or_default().to_owned()),
        None => ("/".to_owned(), String::new()),
    };

    let mut pairs: Vec<String> = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| pair.split('=').next() != Some(name))
        .map(str::to_owned)
        .collect();
    pairs.push(format!("{name}={value}"));

    let path_and_query = PathAndQuery::try_from(format!("{path}?{}", pairs.join("&"))).ok()?;
    parts.path_and_query = Some(path_and_query);
    Uri::from_parts(parts).ok().map(|uri| uri.to_string())
}

fn append_query_param(target: &str, name: &str, value: &str) -> String {
    let separator = if target.contains('?') { '&' } else { '?' };
    format!("{target}{separator}{name}={value}")
}

fn bust_nonce() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();
    let sequence = BUST_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{millis}-{sequence}")
}
