//! Loading databases from disk or from a conditional HTTP download.
//!
//! Remote databases are published as tar.gz archives (the MaxMind download
//! format). Only one member of the archive is of interest; it is located by
//! its exact file name and everything else is skipped.

use std::io::Read;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use reqwest::header::{HeaderMap, IF_MODIFIED_SINCE, LAST_MODIFIED};
use reqwest::StatusCode;

use crate::error::{Error, Result};
use crate::geodb::GeoDb;

/// Timeout for a whole database download.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Largest archive member accepted; GeoLite2 databases are well below this.
pub const MAX_ENTRY_SIZE: u64 = 512 * 1024 * 1024;

/// IMF-fixdate, the preferred HTTP date format.
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Result of a conditional fetch that did not fail.
pub enum FetchOutcome<D> {
    /// The server reported no change since the given time.
    Unmodified,
    /// A new database was downloaded and opened.
    Fetched {
        db: D,
        last_modified: DateTime<Utc>,
    },
}

/// A place new database versions can be fetched from.
#[async_trait]
pub trait DbSource<D: GeoDb>: Send + Sync + 'static {
    /// Fetch the database if it changed after `if_modified_since`.
    async fn fetch(&self, if_modified_since: Option<DateTime<Utc>>) -> Result<FetchOutcome<D>>;
}

/// Database published as a tar.gz archive at a URL.
pub struct RemoteDb {
    client: reqwest::Client,
    url: String,
    entry_name: String,
}

impl RemoteDb {
    /// Create a source for `url`, extracting `entry_name` from the archive.
    pub fn new(url: &str, entry_name: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            url: url.to_string(),
            entry_name: entry_name.to_string(),
        })
    }

    /// Get the URL being used.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Get the archive member being extracted.
    pub fn entry_name(&self) -> &str {
        &self.entry_name
    }
}

#[async_trait]
impl<D: GeoDb> DbSource<D> for RemoteDb {
    async fn fetch(&self, if_modified_since: Option<DateTime<Utc>>) -> Result<FetchOutcome<D>> {
        fetch_from_network(&self.client, &self.url, &self.entry_name, if_modified_since).await
    }
}

/// Read a database and its modification time from a local file.
pub async fn fetch_from_file<D: GeoDb>(path: &Path) -> Result<(D, DateTime<Utc>)> {
    let data = tokio::fs::read(path).await?;
    let modified = tokio::fs::metadata(path).await?.modified()?;

    log::info!("Loading GeoIP database from {:?} ({} bytes)", path, data.len());

    let db = open_blocking(move || D::from_bytes(data)).await?;
    Ok((db, DateTime::<Utc>::from(modified)))
}

/// Download the database archive at `url` unless it is unchanged.
///
/// Sends `If-Modified-Since` when `if_modified_since` is known. A 304
/// response yields [`FetchOutcome::Unmodified`]; any status other than 200 or
/// 304 is an error.
pub async fn fetch_from_network<D: GeoDb>(
    client: &reqwest::Client,
    url: &str,
    entry_name: &str,
    if_modified_since: Option<DateTime<Utc>>,
) -> Result<FetchOutcome<D>> {
    let mut request = client.get(url);
    if let Some(since) = if_modified_since {
        request = request.header(IF_MODIFIED_SINCE, format_http_date(since));
    }

    let response = request.send().await?;
    let status = response.status();

    if status == StatusCode::NOT_MODIFIED {
        log::debug!("GeoIP database at {} not modified (304)", url);
        return Ok(FetchOutcome::Unmodified);
    }
    if status != StatusCode::OK {
        return Err(Error::UnexpectedStatus(status.as_u16()));
    }

    let last_modified = last_modified(response.headers())?;
    let archive = response.bytes().await?;
    let archive_len = archive.len();

    let entry_name = entry_name.to_string();
    let db = open_blocking(move || {
        let data = extract_entry(&archive, &entry_name)?;
        log::info!(
            "Downloaded {} ({} bytes, archive {} bytes)",
            entry_name,
            data.len(),
            archive_len
        );
        D::from_bytes(data)
    })
    .await?;

    Ok(FetchOutcome::Fetched { db, last_modified })
}

/// Extract the member named `entry_name` from a tar.gz archive.
///
/// Members are matched on their file name alone, so
/// `GeoLite2-Country_20240101/GeoLite2-Country.mmdb` matches
/// `GeoLite2-Country.mmdb`. Reaching the end of the archive without a match
/// is reported as [`Error::EntryNotFound`], separately from read failures.
/// A member larger than [`MAX_ENTRY_SIZE`], or shorter than its header
/// claims, is an [`Error::Archive`].
pub fn extract_entry(archive: &[u8], entry_name: &str) -> Result<Vec<u8>> {
    let mut tar = tar::Archive::new(GzDecoder::new(archive));
    let entries = tar
        .entries()
        .map_err(|e| Error::Archive(format!("unable to read tar.gz: {}", e)))?;

    for entry in entries {
        let mut entry =
            entry.map_err(|e| Error::Archive(format!("unable to read tar.gz entry: {}", e)))?;
        let is_wanted = entry
            .path()
            .map_err(|e| Error::Archive(format!("invalid tar.gz entry path: {}", e)))?
            .file_name()
            .and_then(|n| n.to_str())
            == Some(entry_name);
        if !is_wanted {
            continue;
        }

        // The header size is untrusted; never allocate from it
        let size = entry.size();
        if size > MAX_ENTRY_SIZE {
            return Err(Error::Archive(format!(
                "{} claims {} bytes, limit is {}",
                entry_name, size, MAX_ENTRY_SIZE
            )));
        }

        let mut data = Vec::new();
        entry
            .by_ref()
            .take(MAX_ENTRY_SIZE)
            .read_to_end(&mut data)
            .map_err(|e| Error::Archive(format!("unable to read {}: {}", entry_name, e)))?;
        if data.len() as u64 != size {
            return Err(Error::Archive(format!(
                "{} is truncated: {} of {} bytes",
                entry_name,
                data.len(),
                size
            )));
        }
        return Ok(data);
    }

    Err(Error::EntryNotFound(entry_name.to_string()))
}

/// Format a timestamp as an HTTP date (`Sun, 06 Nov 1994 08:49:37 GMT`).
pub fn format_http_date(time: DateTime<Utc>) -> String {
    time.format(HTTP_DATE_FORMAT).to_string()
}

/// Parse an HTTP date in IMF-fixdate form.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn last_modified(headers: &HeaderMap) -> Result<DateTime<Utc>> {
    let raw = headers
        .get(LAST_MODIFIED)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        .unwrap_or_default();
    parse_http_date(&raw).ok_or(Error::InvalidLastModified(raw))
}

/// Run CPU-heavy database construction off the async workers.
async fn open_blocking<D, F>(f: F) -> Result<D>
where
    D: GeoDb,
    F: FnOnce() -> Result<D> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::GeoDb(format!("database load task failed: {}", e)))?
}
