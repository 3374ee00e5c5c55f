//! Background task that keeps the live database current.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::coordinator::CoordinatorHandle;
use crate::fetch::{DbSource, FetchOutcome};
use crate::geodb::GeoDb;

/// What a single refresh attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The source reported no change.
    Unmodified,
    /// A new database was handed to the coordinator.
    Updated,
    /// The fetch or the hand-off to the coordinator failed; the freshness
    /// marker is unchanged.
    Failed,
}

/// Periodically re-fetches the database and submits genuine changes.
pub struct Refresher<D, S> {
    source: S,
    coordinator: CoordinatorHandle<D>,
    last_modified: Option<DateTime<Utc>>,
    interval: Duration,
}

impl<D: GeoDb, S: DbSource<D>> Refresher<D, S> {
    /// Create a refresher that starts from the version modified at `last_modified`.
    pub fn new(
        source: S,
        coordinator: CoordinatorHandle<D>,
        last_modified: Option<DateTime<Utc>>,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            coordinator,
            last_modified,
            interval,
        }
    }

    /// Modification time of the version currently live.
    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.last_modified
    }

    /// Check the source once.
    ///
    /// The freshness marker only moves forward once a downloaded database has
    /// been handed to the coordinator, so a failed attempt is retried with the same `If-Modified-Since` on
    /// the next round.
    pub async fn refresh_once(&mut self) -> RefreshOutcome {
        match self.source.fetch(self.last_modified).await {
            Ok(FetchOutcome::Unmodified) => RefreshOutcome::Unmodified,
            Ok(FetchOutcome::Fetched { db, last_modified }) => {
                log::info!("Fetched database modified at {}", last_modified);
                match self.coordinator.submit_db_update(db).await {
                    Ok(()) => {
                        self.last_modified = Some(last_modified);
                        RefreshOutcome::Updated
                    }
                    Err(e) => {
                        log::error!("Unable to apply updated database: {}", e);
                        RefreshOutcome::Failed
                    }
                }
            }
            Err(e) => {
                log::error!("Unable to update database from web: {}", e);
                RefreshOutcome::Failed
            }
        }
    }

    /// Refresh every `interval`, forever.
    pub async fn run(mut self) {
        loop {
            tokio::time::sleep(self.interval).await;
            self.refresh_once().await;
        }
    }
}
