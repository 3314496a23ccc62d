//! Cache key type.
//!
//! A [`CacheKey`] names one logical dataset resource. It is the string the
//! caller passes to `fetch_json` (an absolute URL or a path relative to the
//! configured base) and identifies exactly one cache entry.
//!
//! ```
//! use fetchbox_core::CacheKey;
//!
//! let key = CacheKey::new("/data/users.json").unwrap();
//! assert_eq!(key.as_str(), "/data/users.json");
//! assert_eq!(format!("{}", key), "/data/users.json");
//!
//! assert!(CacheKey::new("").is_err());
//! assert!(CacheKey::new("   ").is_err());
//! ```
//!
//! [`CacheKey`] wraps an `Arc<str>`, so cloning only bumps a reference count.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Reasons a string cannot be used as a cache key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    /// The key was empty or whitespace only.
    #[error("cache key must be a non-empty string")]
    Empty,
    /// The key contains a control character and cannot be put on a request line.
    #[error("cache key {key:?} contains a control character at byte {position}")]
    ControlCharacter {
        /// The rejected key.
        key: String,
        /// Byte offset of the offending character.
        position: usize,
    },
}

/// Identifier of a cached JSON resource.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    inner: Arc<str>,
}

impl CacheKey {
    /// Validates `key` and wraps it.
    pub fn new(key: impl AsRef<str>) -> Result<Self, KeyError> {
        let key = key.as_ref();
        if key.trim().is_empty() {
            return Err(KeyError::Empty);
        }
        if let Some((position, _)) = key.char_indices().find(|(_, c)| c.is_control()) {
            return Err(KeyError::ControlCharacter {
                key: key.to_owned(),
                position,
            });
        }
        Ok(Self { inner: key.into() })
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// Returns true when the key carries a scheme (`http://`, `https://`, ...).
    pub fn is_absolute(&self) -> bool {
        match self.inner.split_once("://") {
            Some((scheme, _)) => {
                !scheme.is_empty()
                    && scheme
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
            }
            None => false,
        }
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CacheKey").field(&&*self.inner).finish()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.inner
    }
}

impl Borrow<str> for CacheKey {
    fn borrow(&self) -> &str {
        &self.inner
    }
}

impl TryFrom<&str> for CacheKey {
    type Error = KeyError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<String> for CacheKey {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}
