//! The coordinator task: sole owner of the live database and the lookup cache.
//!
//! Request handlers and the refresher never touch the database or the cache
//! directly. They send messages to a single task that handles one message at
//! a time, so a database swap and the cache invalidation that goes with it
//! can never interleave with a lookup.

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use crate::cache::LookupCache;
use crate::error::{Error, Result};
use crate::geodb::GeoDb;

/// Maximum number of lookups waiting for the coordinator.
const LOOKUP_QUEUE_SIZE: usize = 10_000;

/// Snapshot of the coordinator's cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// Entries currently cached.
    pub entries: usize,
    /// Fixed cache capacity.
    pub capacity: usize,
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that went to the database.
    pub misses: u64,
    /// Number of database swaps since start.
    pub generation: u64,
}

impl CacheStats {
    /// Fraction of lookups answered from the cache.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// A pending lookup and the channel its answer goes back on.
struct LookupRequest {
    ip: String,
    reply: oneshot::Sender<Result<Bytes>>,
}

/// Receiving ends of the coordinator's channels.
struct Inbox<D> {
    lookups: mpsc::Receiver<LookupRequest>,
    updates: mpsc::Receiver<D>,
    stats: mpsc::Receiver<oneshot::Sender<CacheStats>>,
}

/// Cloneable handle for talking to a running coordinator.
pub struct CoordinatorHandle<D> {
    lookups: mpsc::Sender<LookupRequest>,
    updates: mpsc::Sender<D>,
    stats: mpsc::Sender<oneshot::Sender<CacheStats>>,
}

impl<D> Clone for CoordinatorHandle<D> {
    fn clone(&self) -> Self {
        Self {
            lookups: self.lookups.clone(),
            updates: self.updates.clone(),
            stats: self.stats.clone(),
        }
    }
}

/// Start a coordinator owning `db` with a cache of `cache_capacity` entries.
///
/// Must be called from within a tokio runtime. The task runs until every
/// handle has been dropped, then releases the database.
pub fn spawn<D: GeoDb>(db: D, cache_capacity: usize) -> Result<CoordinatorHandle<D>> {
    let cache = LookupCache::new(cache_capacity)?;
    let (handle, inbox) = channels();
    tokio::spawn(Coordinator::new(db, cache).run(inbox));
    Ok(handle)
}

fn channels<D>() -> (CoordinatorHandle<D>, Inbox<D>) {
    let (lookups_tx, lookups_rx) = mpsc::channel(LOOKUP_QUEUE_SIZE);
    let (updates_tx, updates_rx) = mpsc::channel(1);
    let (stats_tx, stats_rx) = mpsc::channel(1);
    (
        CoordinatorHandle {
            lookups: lookups_tx,
            updates: updates_tx,
            stats: stats_tx,
        },
        Inbox {
            lookups: lookups_rx,
            updates: updates_rx,
            stats: stats_rx,
        },
    )
}

/// Handle whose coordinator has already stopped.
#[cfg(test)]
pub(crate) fn closed_handle<D>() -> CoordinatorHandle<D> {
    let (handle, _inbox) = channels();
    handle
}

impl<D: GeoDb> CoordinatorHandle<D> {
    /// Resolve `ip` to its serialized record.
    ///
    /// Waits as long as the coordinator takes; see
    /// [`submit_lookup_within`](Self::submit_lookup_within) for a bounded wait.
    pub async fn submit_lookup(&self, ip: &str) -> Result<Bytes> {
        let (reply, response) = oneshot::channel();
        let request = LookupRequest {
            ip: ip.to_string(),
            reply,
        };

        self.lookups
            .send(request)
            .await
            .map_err(|_| Error::CoordinatorUnavailable)?;
        response.await.map_err(|_| Error::CoordinatorUnavailable)?
    }

    /// Resolve `ip`, giving up with [`Error::Timeout`] after `deadline`.
    ///
    /// A late answer from the coordinator is discarded.
    pub async fn submit_lookup_within(&self, ip: &str, deadline: Duration) -> Result<Bytes> {
        tokio::time::timeout(deadline, self.submit_lookup(ip))
            .await
            .map_err(|_| Error::Timeout)?
    }

    /// Hand a freshly loaded database to the coordinator.
    ///
    /// Returns once the coordinator has accepted the message, not once the
    /// swap has happened.
    pub async fn submit_db_update(&self, db: D) -> Result<()> {
        self.updates.send(db).await.map_err(|mpsc::error::SendError(db)| {
            db.release();
            Error::CoordinatorUnavailable
        })
    }

    /// Get the cache counters.
    pub async fn stats(&self) -> Result<CacheStats> {
        let (reply, response) = oneshot::channel();
        self.stats
            .send(reply)
            .await
            .map_err(|_| Error::CoordinatorUnavailable)?;
        response.await.map_err(|_| Error::CoordinatorUnavailable)
    }
}

struct Coordinator<D> {
    db: D,
    cache: LookupCache,
    hits: u64,
    misses: u64,
    generation: u64,
}

impl<D: GeoDb> Coordinator<D> {
    fn new(db: D, cache: LookupCache) -> Self {
        Self {
            db,
            cache,
            hits: 0,
            misses: 0,
            generation: 0,
        }
    }

    async fn run(mut self, mut inbox: Inbox<D>) {
        loop {
            tokio::select! {
                Some(request) = inbox.lookups.recv() => {
                    let result = self.lookup(&request.ip);
                    if let Err(ref e) = result {
                        log::warn!("{}", e);
                    }
                    // The requester may have timed out and gone away.
                    let _ = request.reply.send(result);
                }
                Some(db) = inbox.updates.recv() => self.install(db),
                Some(reply) = inbox.stats.recv() => {
                    let _ = reply.send(self.stats());
                }
                else => break,
            }
        }

        log::debug!("All coordinator handles dropped, releasing database");
        self.db.release();
    }

    fn lookup(&mut self, ip: &str) -> Result<Bytes> {
        if let Some(cached) = self.cache.get(ip) {
            log::trace!("Cache hit for {}", ip);
            self.hits += 1;
            return Ok(cached);
        }

        self.misses += 1;
        let record = self.db.lookup(ip)?;
        let encoded = serde_json::to_vec(&record).map_err(|source| Error::Encode {
            ip: ip.to_string(),
            source,
        })?;

        let encoded = Bytes::from(encoded);
        self.cache.put(ip.to_string(), encoded.clone());
        Ok(encoded)
    }

    fn install(&mut self, db: D) {
        let previous = std::mem::replace(&mut self.db, db);
        log::debug!("Applied new database, closing old database");
        previous.release();

        self.cache.clear();
        self.generation += 1;
        log::info!(
            "Database updated (generation {}), cleared cached lookups",
            self.generation
        );
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.cache.len(),
            capacity: self.cache.capacity(),
            hits: self.hits,
            misses: self.misses,
            generation: self.generation,
        }
    }
}
