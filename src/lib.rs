//! geoserve - IP geolocation over HTTP backed by a MaxMind database.
//!
//! This crate resolves IP addresses to GeoIP2 records and serves them as
//! JSON, keeping recent answers in a bounded in-memory cache and replacing
//! the database in place when a newer version is published.
//!
//! # Features
//!
//! - **Single-owner state**: one coordinator task owns the database and cache;
//!   requests and updates reach it only through channels
//! - **LRU cache**: 50,000 most recently used lookups kept as serialized JSON
//! - **Hot swap**: new databases replace the old one without a gap, and the
//!   cache is invalidated in the same step
//! - **Conditional refresh**: hourly `If-Modified-Since` downloads of the
//!   MaxMind tar.gz archive (304 Not Modified is a no-op)
//! - **Bounded waits**: every HTTP lookup carries a deadline
//!
//! # Quick Start
//!
//! ```ignore
//! use geoserve::{GeoServer, ServerConfig};
//!
//! // Serve from a local .mmdb file
//! let server: GeoServer = GeoServer::new(ServerConfig::from_file("GeoLite2-Country.mmdb")).await?;
//!
//! // Or from a remote archive, refreshed every hour
//! let server: GeoServer = GeoServer::new(ServerConfig::from_url(
//!     "https://download.example.com/GeoLite2-Country.tar.gz",
//! ))
//! .await?;
//!
//! let json = server.lookup("83.25.1.1").await?;
//! ```
//!
//! # HTTP
//!
//! [`http::configure`] mounts `GET {base_path}{ip}` on an actix-web app.
//! An empty `{ip}` looks up the caller: the first `X-Forwarded-For` entry,
//! or the peer address without its port. Successful responses carry
//! `X-Reflected-Ip`; failures are a bare 500.
//!
//! # Custom databases
//!
//! Anything implementing [`GeoDb`] can stand in for the MaxMind reader, and
//! anything implementing [`DbSource`] can feed the refresher.

mod error;

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod fetch;
pub mod geodb;
pub mod http;
pub mod maxmind;
pub mod refresher;
pub mod request;
pub mod server;

#[cfg(test)]
mod testing;

// Re-export core types
pub use error::{Error, Result};
pub use geodb::GeoDb;
pub use maxmind::MaxMindDb;

// Re-export server assembly
pub use config::{DbLocation, ServerConfig};
pub use server::GeoServer;

// Re-export coordinator and refresh types
pub use coordinator::{CacheStats, CoordinatorHandle};
pub use fetch::{DbSource, FetchOutcome, RemoteDb};
pub use refresher::{RefreshOutcome, Refresher};

// Re-export request helpers
pub use request::{client_ip_for, resolve_ip, GeoResponse};
