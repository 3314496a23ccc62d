//! Client configuration.
//!
//! [`ClientConfig`] can be built in code, parsed from YAML, or overridden
//! from the environment:
//!
//! ```
//! use std::time::Duration;
//! use fetchbox::ClientConfig;
//!
//! let config = ClientConfig::from_yaml(
//!     r#"
//! base_url: "http://localhost:5050/"
//! data_base: "pension"
//! defaults:
//!   ttl: 60s
//!   timeout: 2s
//! "#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.defaults.ttl, Duration::from_secs(60));
//! assert_eq!(config.defaults.retries, 2);
//! assert_eq!(config.data_location().resolve("users.json"), "/pension/users.json");
//! ```

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::ConfigError;
use crate::options::FetchOptions;

/// Dataset location used when nothing else is configured.
pub const DEFAULT_DATA_BASE: &str = "/data/";

/// Environment variable overriding [`ClientConfig::base_url`].
pub const BASE_URL_ENV: &str = "FETCHBOX_BASE_URL";

/// Environment variable overriding [`ClientConfig::data_base`].
pub const DATA_BASE_URL_ENV: &str = "FETCHBOX_DATA_BASE_URL";

/// Settings used to build a [`Client`](crate::Client).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL that relative keys are resolved against.
    pub base_url: Option<String>,
    /// Where dataset files live; see [`DataLocation`].
    pub data_base: String,
    /// Options used when a call does not pass its own.
    pub defaults: FetchOptions,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            data_base: DEFAULT_DATA_BASE.to_owned(),
            defaults: FetchOptions::default(),
        }
    }
}

impl ClientConfig {
    /// Parses a YAML document. Missing fields take their defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        serde_saphyr::from_str(yaml).map_err(|err| ConfigError::Yaml(err.to_string()))
    }

    /// Default configuration with environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|name| std::env::var(name).ok())
    }

    /// Applies overrides for [`BASE_URL_ENV`] and [`DATA_BASE_URL_ENV`] from `lookup`.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base_url) = lookup(BASE_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.base_url = Some(base_url);
        }
        if let Some(data_base) = lookup(DATA_BASE_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.data_base = data_base;
        }
        self
    }

    /// Resolved dataset location.
    pub fn data_location(&self) -> DataLocation {
        DataLocation::new(&self.data_base)
    }
}

/// Normalized base for dataset files.
///
/// - absolute `http(s)` URLs are kept and given a trailing slash,
/// - Windows filesystem paths cannot be fetched and fall back to
///   [`DEFAULT_DATA_BASE`],
/// - anything else is treated as app-relative and given leading and
///   trailing slashes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLocation {
    base: String,
}

impl DataLocation {
    /// Normalizes `raw` into a dataset base.
    pub fn new(raw: &str) -> Self {
        Self {
            base: normalize_base(raw.trim()),
        }
    }

    /// The normalized base, always ending in `/`.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Joins a dataset file name onto the base.
    pub fn resolve(&self, file: &str) -> String {
        format!("{}{}", self.base, file.trim_start_matches('/'))
    }
}

impl Default for DataLocation {
    fn default() -> Self {
        Self::new(DEFAULT_DATA_BASE)
    }
}

fn normalize_base(raw: &str) -> String {
    if raw.is_empty() {
        return DEFAULT_DATA_BASE.to_owned();
    }
    if is_windows_path(raw) {
        error!(
            data_base = raw,
            fallback = DEFAULT_DATA_BASE,
            "dataset base is a Windows file path; serve the folder over HTTP and point the \
             data base at that URL"
        );
        return DEFAULT_DATA_BASE.to_owned();
    }
    if is_http_url(raw) {
        return with_trailing_slash(raw.to_owned());
    }
    let rooted = if raw.starts_with('/') {
        raw.to_owned()
    } else {
        format!("/{raw}")
    };
    with_trailing_slash(rooted)
}

fn is_windows_path(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    bytes.len() >= 3 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && bytes[2] == b'\\'
}

fn is_http_url(raw: &str) -> bool {
    let lower = raw.get(..8).unwrap_or(raw).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn with_trailing_slash(mut base: String) -> String {
    if !base.ends_with('/') {
        base.push('/');
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn normalizes_data_bases() {
        let cases = [
            ("", "/data/"),
            ("/data", "/data/"),
            ("data/", "/data/"),
            ("pension/files", "/pension/files/"),
            ("http://localhost:5050", "http://localhost:5050/"),
            ("HTTPS://cdn.example.com/data/", "HTTPS://cdn.example.com/data/"),
            ("C:\\Users\\me\\data", "/data/"),
        ];
        for (raw, expected) in cases {
            assert_eq!(DataLocation::new(raw).base(), expected, "{raw}");
        }
    }

    #[test]
    fn resolves_files() {
        let location = DataLocation::new("http://localhost:5050");
        assert_eq!(
            location.resolve("users.json"),
            "http://localhost:5050/users.json"
        );
        assert_eq!(DataLocation::default().resolve("/funds.json"), "/data/funds.json");
    }

    #[test]
    fn overrides_replace_configured_values() {
        let config = ClientConfig::default().with_overrides(|name| match name {
            BASE_URL_ENV => Some("http://example.com/".to_owned()),
            DATA_BASE_URL_ENV => Some("   ".to_owned()),
            _ => None,
        });
        assert_eq!(config.base_url.as_deref(), Some("http://example.com/"));
        assert_eq!(config.data_base, DEFAULT_DATA_BASE);
    }

    #[test]
    fn empty_yaml_yields_defaults() {
        let config = ClientConfig::from_yaml("{}").unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn rejects_invalid_yaml() {
        let err = ClientConfig::from_yaml("defaults:\n  ttl: soon\n").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }
}
