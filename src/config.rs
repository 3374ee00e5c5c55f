//! Server configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Number of lookup results kept in memory.
pub const CACHE_SIZE: usize = 50_000;

/// How often the remote database is checked for a newer version.
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Archive member holding the database.
pub const DEFAULT_DB_ENTRY_NAME: &str = "GeoLite2-Country.mmdb";

/// Default upper bound on how long a request waits for its lookup.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Where the database comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbLocation {
    /// Uncompressed `.mmdb` file on disk, loaded once.
    File(PathBuf),
    /// tar.gz archive served over HTTP, refreshed periodically.
    Url(String),
}

impl DbLocation {
    /// Build a location from the two optional CLI-style inputs.
    ///
    /// Exactly one of them must be set.
    pub fn from_parts(db_file: Option<PathBuf>, db_url: Option<String>) -> Result<Self> {
        let db_file = db_file.filter(|p| !p.as_os_str().is_empty());
        let db_url = db_url.filter(|u| !u.is_empty());

        match (db_file, db_url) {
            (Some(path), None) => Ok(DbLocation::File(path)),
            (None, Some(url)) => Ok(DbLocation::Url(url)),
            (Some(_), Some(_)) => Err(Error::Config(
                "specify either a database file or a database URL, not both".to_string(),
            )),
            (None, None) => Err(Error::Config(
                "a database file or a database URL is required".to_string(),
            )),
        }
    }
}

/// Configuration for [`GeoServer`](crate::GeoServer).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Database source.
    pub location: DbLocation,
    /// Name of the archive member to load when fetching from a URL.
    pub entry_name: String,
    /// Upper bound on how long a request waits for the coordinator.
    pub request_timeout: Duration,
}

impl ServerConfig {
    /// Serve from a local database file.
    pub fn from_file(path: impl AsRef<Path>) -> Self {
        Self::new(DbLocation::File(path.as_ref().to_path_buf()))
    }

    /// Serve from a remote tar.gz archive, refreshed every [`REFRESH_INTERVAL`].
    pub fn from_url(url: &str) -> Self {
        Self::new(DbLocation::Url(url.to_string()))
    }

    /// Create a configuration with default settings for `location`.
    pub fn new(location: DbLocation) -> Self {
        Self {
            location,
            entry_name: DEFAULT_DB_ENTRY_NAME.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Set the archive member to extract.
    pub fn with_entry_name(mut self, name: &str) -> Self {
        self.entry_name = name.to_string();
        self
    }

    /// Set a custom request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
