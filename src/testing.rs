//! Test helpers shared by the unit test modules.

use std::collections::HashMap;
use std::io::Write;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::geodb::GeoDb;

/// In-memory database backed by a JSON object of `ip -> record`.
pub(crate) struct TableDb {
    records: HashMap<String, Value>,
    lookups: Arc<AtomicUsize>,
    released: Arc<AtomicBool>,
}

/// Observers for a [`TableDb`] that stay usable after it moves into the coordinator.
#[derive(Clone)]
pub(crate) struct Probe {
    lookups: Arc<AtomicUsize>,
    released: Arc<AtomicBool>,
}

impl Probe {
    pub(crate) fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub(crate) fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl TableDb {
    pub(crate) fn with_records(records: &[(&str, Value)]) -> (Self, Probe) {
        let db = Self {
            records: records
                .iter()
                .map(|(ip, record)| (ip.to_string(), record.clone()))
                .collect(),
            lookups: Arc::new(AtomicUsize::new(0)),
            released: Arc::new(AtomicBool::new(false)),
        };
        let probe = Probe {
            lookups: Arc::clone(&db.lookups),
            released: Arc::clone(&db.released),
        };
        (db, probe)
    }
}

impl GeoDb for TableDb {
    type Record<'a> = &'a Value;

    fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let records: HashMap<String, Value> =
            serde_json::from_slice(&data).map_err(|e| Error::GeoDb(e.to_string()))?;
        Ok(Self {
            records,
            lookups: Arc::new(AtomicUsize::new(0)),
            released: Arc::new(AtomicBool::new(false)),
        })
    }

    fn lookup(&self, ip: &str) -> Result<&Value> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.records.get(ip).ok_or_else(|| Error::Lookup {
            ip: ip.to_string(),
            reason: "address not found".to_string(),
        })
    }

    fn release(self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// Build a tar.gz archive holding `files`.
pub(crate) fn tar_gz(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_path(name).unwrap();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append(&header, *content).unwrap();
    }
    let tar_bytes = builder.into_inner().unwrap();

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&tar_bytes).unwrap();
    encoder.finish().unwrap()
}

/// Build an IPv4 MaxMind database mapping `network/prefix_len` to a GeoIP2
/// Country record `{"country": {"iso_code": iso_code}}`.
///
/// The search tree is a single chain of `prefix_len` nodes with 24-bit
/// records; every branch off the chain points at the empty record.
pub(crate) fn country_mmdb(network: Ipv4Addr, prefix_len: u32, iso_code: &str) -> Vec<u8> {
    assert!((1..=32).contains(&prefix_len));
    let bits = u32::from(network);
    let node_count = prefix_len;
    // First data section byte, past the 16-byte separator
    let data_pointer = node_count + 16;

    let mut out = Vec::new();
    for i in 0..prefix_len {
        let next = if i + 1 < prefix_len { i + 1 } else { data_pointer };
        let (left, right) = if (bits >> (31 - i)) & 1 == 0 {
            (next, node_count)
        } else {
            (node_count, next)
        };
        out.extend_from_slice(&left.to_be_bytes()[1..]);
        out.extend_from_slice(&right.to_be_bytes()[1..]);
    }
    out.extend_from_slice(&[0u8; 16]);

    out.push(0xE1);
    mmdb_string(&mut out, "country");
    out.push(0xE1);
    mmdb_string(&mut out, "iso_code");
    mmdb_string(&mut out, iso_code);

    out.extend_from_slice(b"\xab\xcd\xefMaxMind.com");
    out.push(0xE9);
    mmdb_string(&mut out, "binary_format_major_version");
    out.extend_from_slice(&[0xA1, 2]);
    mmdb_string(&mut out, "binary_format_minor_version");
    out.push(0xA0);
    mmdb_string(&mut out, "build_epoch");
    out.extend_from_slice(&[0x04, 0x02]);
    out.extend_from_slice(&1_704_067_200u32.to_be_bytes());
    mmdb_string(&mut out, "database_type");
    mmdb_string(&mut out, "GeoLite2-Country");
    mmdb_string(&mut out, "description");
    out.push(0xE0);
    mmdb_string(&mut out, "ip_version");
    out.extend_from_slice(&[0xA1, 4]);
    mmdb_string(&mut out, "languages");
    out.extend_from_slice(&[0x00, 0x04]);
    mmdb_string(&mut out, "node_count");
    out.extend_from_slice(&[0xC1, node_count as u8]);
    mmdb_string(&mut out, "record_size");
    out.extend_from_slice(&[0xA1, 24]);
    out
}

/// Short UTF-8 string in the MaxMind data format.
fn mmdb_string(out: &mut Vec<u8>, value: &str) {
    assert!(value.len() < 29);
    out.push(0x40 | value.len() as u8);
    out.extend_from_slice(value.as_bytes());
}
