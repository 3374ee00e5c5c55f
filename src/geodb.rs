//! The geolocation database capability consumed by the coordinator.

use serde::Serialize;

use crate::Result;

/// A memory-resident geolocation database.
///
/// Implementations are opaque to the rest of the crate: the coordinator only
/// builds them from bytes, looks addresses up, and releases them when a newer
/// instance replaces them. Record encoding is left to the implementation's
/// `Serialize` impl.
///
/// # Example
///
/// ```ignore
/// use geoserve::{GeoDb, MaxMindDb};
///
/// let db = MaxMindDb::from_bytes(std::fs::read("GeoLite2-Country.mmdb")?)?;
/// let record = db.lookup("83.25.1.1")?;
/// println!("{}", serde_json::to_string(&record)?);
/// db.release();
/// ```
pub trait GeoDb: Sized + Send + 'static {
    /// Record returned by a successful lookup, possibly borrowing from the database.
    type Record<'a>: Serialize
    where
        Self: 'a;

    /// Build a database from its raw binary form.
    fn from_bytes(data: Vec<u8>) -> Result<Self>;

    /// Look up a single address.
    ///
    /// The address is passed through as received; rejecting malformed input
    /// is the database's job.
    fn lookup(&self, ip: &str) -> Result<Self::Record<'_>>;

    /// Release the resources held by this instance.
    ///
    /// Consumes the instance, so it can be called at most once and the
    /// database cannot be used afterwards.
    fn release(self) {
        drop(self);
    }
}
