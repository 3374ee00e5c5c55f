//! Server assembly: initial load, coordinator and refresher wiring.

use std::time::Duration;

use bytes::Bytes;
use tokio::task::JoinHandle;

use crate::config::{DbLocation, ServerConfig, CACHE_SIZE, REFRESH_INTERVAL};
use crate::coordinator::{self, CacheStats, CoordinatorHandle};
use crate::error::{Error, Result};
use crate::fetch::{fetch_from_file, DbSource, FetchOutcome, RemoteDb};
use crate::geodb::GeoDb;
use crate::maxmind::MaxMindDb;
use crate::refresher::Refresher;
use crate::request::GeoResponse;

/// IP geolocation server.
///
/// Owns the handle to the coordinator task and, for remote databases, the
/// background refresher. Cheap to share behind an `Arc` (or actix `Data`).
///
/// # Example
///
/// ```ignore
/// use geoserve::{GeoServer, ServerConfig};
///
/// let server: GeoServer = GeoServer::new(ServerConfig::from_file("GeoLite2-Country.mmdb")).await?;
/// let json = server.lookup("83.25.1.1").await?;
/// ```
pub struct GeoServer<D: GeoDb = MaxMindDb> {
    coordinator: CoordinatorHandle<D>,
    refresher: Option<JoinHandle<()>>,
    request_timeout: Duration,
}

impl<D: GeoDb> GeoServer<D> {
    /// Load the initial database and start serving.
    ///
    /// Fails if the database cannot be loaded; the server never starts
    /// without a live database. Must be called within a tokio runtime.
    pub async fn new(config: ServerConfig) -> Result<Self> {
        match config.location {
            DbLocation::File(ref path) => {
                let (db, modified) = fetch_from_file::<D>(path).await?;
                log::info!("Loaded database from {:?} (modified {})", path, modified);

                Ok(Self {
                    coordinator: coordinator::spawn(db, CACHE_SIZE)?,
                    refresher: None,
                    request_timeout: config.request_timeout,
                })
            }
            DbLocation::Url(ref url) => {
                let source = RemoteDb::new(url, &config.entry_name)?;
                log::info!("Loading database from {}", source.url());
                Self::from_source(source, REFRESH_INTERVAL, config.request_timeout).await
            }
        }
    }

    /// Fetch the initial database from `source` and keep it current.
    ///
    /// `source` is polled every `refresh_interval` for a newer version.
    pub async fn from_source<S: DbSource<D>>(
        source: S,
        refresh_interval: Duration,
        request_timeout: Duration,
    ) -> Result<Self> {
        let (db, last_modified) = match source.fetch(None).await? {
            FetchOutcome::Fetched { db, last_modified } => (db, last_modified),
            FetchOutcome::Unmodified => {
                return Err(Error::Config(
                    "database server reported no change for an unconditional request".to_string(),
                ))
            }
        };
        log::info!("Loaded database modified at {}", last_modified);

        let coordinator = coordinator::spawn(db, CACHE_SIZE)?;
        let refresher = Refresher::new(
            source,
            coordinator.clone(),
            Some(last_modified),
            refresh_interval,
        );

        Ok(Self {
            coordinator,
            refresher: Some(tokio::spawn(refresher.run())),
            request_timeout,
        })
    }

    /// Resolve `ip` to its JSON record, waiting at most the request timeout.
    pub async fn lookup(&self, ip: &str) -> Result<Bytes> {
        self.coordinator
            .submit_lookup_within(ip, self.request_timeout)
            .await
    }

    /// Answer a request for `ip`.
    ///
    /// Any failure (lookup error, timeout, stopped coordinator) becomes a 500
    /// with an empty body. `allow_origin` is echoed on every response.
    pub async fn handle(&self, ip: &str, allow_origin: Option<&str>) -> GeoResponse {
        let response = match self.lookup(ip).await {
            Ok(body) => GeoResponse::found(ip, body),
            Err(e) => {
                if !e.is_lookup() {
                    log::error!("Lookup for {} failed: {}", ip, e);
                }
                GeoResponse::failed()
            }
        };
        response.with_allow_origin(allow_origin)
    }

    /// Get the cache counters.
    pub async fn stats(&self) -> Result<CacheStats> {
        self.coordinator.stats().await
    }

    /// Handle to the coordinator, e.g. to push a database by hand.
    pub fn coordinator(&self) -> &CoordinatorHandle<D> {
        &self.coordinator
    }

    /// Whether a background refresher is running.
    pub fn is_refreshing(&self) -> bool {
        self.refresher.is_some()
    }
}

impl<D: GeoDb> Drop for GeoServer<D> {
    fn drop(&mut self) {
        if let Some(refresher) = self.refresher.take() {
            refresher.abort();
        }
    }
}
