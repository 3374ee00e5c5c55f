//! MaxMind GeoLite2 database backed by an in-memory buffer.

use std::net::IpAddr;

use maxminddb::geoip2;

use crate::error::{Error, Result};
use crate::geodb::GeoDb;

/// GeoLite2 Country database.
pub struct MaxMindDb {
    reader: maxminddb::Reader<Vec<u8>>,
}

impl MaxMindDb {
    /// Database type recorded in the file's metadata (e.g. "GeoLite2-Country").
    pub fn database_type(&self) -> &str {
        &self.reader.metadata.database_type
    }

    /// Build epoch from the file's metadata.
    pub fn build_epoch(&self) -> u64 {
        self.reader.metadata.build_epoch
    }
}

impl GeoDb for MaxMindDb {
    type Record<'a> = geoip2::Country<'a>;

    fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let reader =
            maxminddb::Reader::from_source(data).map_err(|e| Error::GeoDb(e.to_string()))?;
        log::debug!(
            "Opened {} database (build epoch {})",
            reader.metadata.database_type,
            reader.metadata.build_epoch
        );
        Ok(Self { reader })
    }

    fn lookup(&self, ip: &str) -> Result<geoip2::Country<'_>> {
        let addr: IpAddr = ip.parse().map_err(|e: std::net::AddrParseError| Error::Lookup {
            ip: ip.to_string(),
            reason: e.to_string(),
        })?;

        self.reader.lookup(addr).map_err(|e| Error::Lookup {
            ip: ip.to_string(),
            reason: e.to_string(),
        })
    }

    fn release(self) {
        log::debug!(
            "Releasing {} database (build epoch {})",
            self.database_type(),
            self.build_epoch()
        );
    }
}
