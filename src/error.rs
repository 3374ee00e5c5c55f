//! Error types for geoserve.

use thiserror::Error;

/// Error type for geoserve operations.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Database bytes could not be opened
    #[error("GeoIP database error: {0}")]
    GeoDb(String),

    /// A single address could not be resolved by the database
    #[error("unable to look up ip address {ip}: {reason}")]
    Lookup { ip: String, reason: String },

    /// A lookup record could not be serialized
    #[error("unable to encode record for ip address {ip}: {source}")]
    Encode {
        ip: String,
        #[source]
        source: serde_json::Error,
    },

    /// Download error
    #[error("download error: {0}")]
    Download(#[from] reqwest::Error),

    /// Non-success HTTP status from the database server
    #[error("unexpected HTTP status {0}")]
    UnexpectedStatus(u16),

    /// Missing or malformed Last-Modified header
    #[error("unable to parse Last-Modified header: {0:?}")]
    InvalidLastModified(String),

    /// Archive could not be decompressed or parsed
    #[error("archive error: {0}")]
    Archive(String),

    /// Archive was read to the end without finding the wanted member
    #[error("required entry {0} not found in archive")]
    EntryNotFound(String),

    /// The caller's deadline elapsed before the coordinator replied
    #[error("lookup timed out")]
    Timeout,

    /// The coordinator task has stopped
    #[error("coordinator is no longer running")]
    CoordinatorUnavailable,

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for geoserve operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether this error concerns a single lookup rather than the server.
    pub fn is_lookup(&self) -> bool {
        matches!(self, Error::Lookup { .. } | Error::Encode { .. })
    }
}
