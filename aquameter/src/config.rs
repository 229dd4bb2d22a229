//! Store configuration.
//!
//! Binaries populate [`StoreConfig`] from command-line flags and the
//! `AQUAMETER_*` environment variables; every option has a default suitable
//! for local development.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Default store URL: a volatile, process-local store.
pub const DEFAULT_STORE_URL: &str = "memory://";
/// Default access token.
pub const DEFAULT_TOKEN: &str = "local-dev-token";
/// Default organization.
pub const DEFAULT_ORG: &str = "aquatic-labs";
/// Default bucket.
pub const DEFAULT_BUCKET: &str = "water-quality";
/// Default name of the raw measurement series.
pub const DEFAULT_RAW_SERIES: &str = "measurements";
/// Default bound on a single store call made on behalf of a request.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection settings for the measurement store.
#[derive(Clone)]
pub struct StoreConfig {
    /// `memory://` or `file://<path>`.
    pub url: String,
    /// Access token. The embedded engine does not authenticate.
    pub token: String,
    /// Organization; a directory level under file:// stores.
    pub org: String,
    /// Bucket (database); a directory level under file:// stores.
    pub bucket: String,
    /// Name of the raw measurement series. Aggregates are written to
    /// `{raw_series}_{width}`.
    pub raw_series: String,
    /// Upper bound on a store call made for an HTTP request.
    pub store_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_STORE_URL.to_string(),
            token: DEFAULT_TOKEN.to_string(),
            org: DEFAULT_ORG.to_string(),
            bucket: DEFAULT_BUCKET.to_string(),
            raw_series: DEFAULT_RAW_SERIES.to_string(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .field("org", &self.org)
            .field("bucket", &self.bucket)
            .field("raw_series", &self.raw_series)
            .field("store_timeout", &self.store_timeout)
            .finish()
    }
}

/// Where a store keeps its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// Process-local memory; nothing survives a restart.
    Memory,
    /// A directory holding the journal, metadata and task registry.
    Directory(PathBuf),
}

impl StoreConfig {
    /// Validates names and resolves the URL to a storage location.
    ///
    /// File stores live under `<path>/<org>/<bucket>`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for an unsupported URL scheme, a file URL
    /// without a path, or an org, bucket or raw series name that is empty or
    /// contains a path separator.
    pub fn location(&self) -> Result<StoreLocation, ConfigError> {
        check_name("org", &self.org)?;
        check_name("bucket", &self.bucket)?;
        check_name("raw_series", &self.raw_series)?;

        if self.url == "memory://" || self.url == "memory:" {
            return Ok(StoreLocation::Memory);
        }

        let path = self
            .url
            .strip_prefix("file://")
            .ok_or_else(|| ConfigError::UnsupportedScheme {
                url: self.url.clone(),
            })?;
        if path.is_empty() {
            return Err(ConfigError::EmptyPath {
                url: self.url.clone(),
            });
        }

        Ok(StoreLocation::Directory(
            PathBuf::from(path).join(&self.org).join(&self.bucket),
        ))
    }
}

fn check_name(field: &'static str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed != value || value.contains(['/', '\\']) || value == ".." {
        return Err(ConfigError::InvalidName {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_memory() {
        let config = StoreConfig::default();
        assert_eq!(config.location().unwrap(), StoreLocation::Memory);
        assert_eq!(config.raw_series, "measurements");
    }

    #[test]
    fn test_file_location_nests_org_and_bucket() {
        let config = StoreConfig {
            url: "file:///var/lib/aquameter".to_string(),
            ..StoreConfig::default()
        };
        assert_eq!(
            config.location().unwrap(),
            StoreLocation::Directory(PathBuf::from("/var/lib/aquameter/aquatic-labs/water-quality"))
        );
    }

    #[test]
    fn test_rejects_bad_urls() {
        let config = StoreConfig {
            url: "http://localhost:8086".to_string(),
            ..StoreConfig::default()
        };
        assert!(matches!(
            config.location(),
            Err(ConfigError::UnsupportedScheme { .. })
        ));

        let config = StoreConfig {
            url: "file://".to_string(),
            ..StoreConfig::default()
        };
        assert!(matches!(config.location(), Err(ConfigError::EmptyPath { .. })));
    }

    #[test]
    fn test_rejects_path_like_names() {
        let config = StoreConfig {
            bucket: "../escape".to_string(),
            ..StoreConfig::default()
        };
        assert!(matches!(
            config.location(),
            Err(ConfigError::InvalidName { field: "bucket", .. })
        ));

        let config = StoreConfig {
            raw_series: String::new(),
            ..StoreConfig::default()
        };
        assert!(config.location().is_err());
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = StoreConfig {
            token: "s3cr3t".to_string(),
            ..StoreConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("s3cr3t"));
        assert!(debug.contains("<redacted>"));
    }
}
