//! geoserve: HTTP server for IP geolocation lookups.

use std::path::PathBuf;
use std::time::Duration;

use actix_web::{web, App, HttpServer};
use clap::Parser;
use geoserve::config::{DEFAULT_DB_ENTRY_NAME, DEFAULT_REQUEST_TIMEOUT};
use geoserve::http::{self, HandlerOptions};
use geoserve::{DbLocation, GeoServer, ServerConfig};

#[derive(Parser)]
#[command(name = "geoserve")]
#[command(author = "Kaitu.io")]
#[command(version = "0.1.0")]
#[command(about = "Serve IP geolocation lookups from a MaxMind database", long_about = None)]
struct Cli {
    /// Uncompressed .mmdb file to serve
    #[arg(long, conflicts_with = "db_url")]
    db_file: Option<PathBuf>,

    /// URL of a tar.gz archive containing the database, checked hourly for updates
    #[arg(long)]
    db_url: Option<String>,

    /// Archive member holding the database
    #[arg(long, default_value = DEFAULT_DB_ENTRY_NAME)]
    entry_name: String,

    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    bind: String,

    /// Path the lookup endpoint is mounted at
    #[arg(long, default_value = "/")]
    base_path: String,

    /// Access-Control-Allow-Origin value for responses
    #[arg(long)]
    allow_origin: Option<String>,

    /// Seconds a request waits for its lookup before failing
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT.as_secs())]
    request_timeout_secs: u64,
}

#[actix_web::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    if let Err(e) = serve(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn serve(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let location = DbLocation::from_parts(cli.db_file, cli.db_url)?;
    let config = ServerConfig::new(location)
        .with_entry_name(&cli.entry_name)
        .with_request_timeout(Duration::from_secs(cli.request_timeout_secs));

    let server: GeoServer = GeoServer::new(config).await?;
    let server = web::Data::new(server);
    let options = HandlerOptions {
        base_path: cli.base_path,
        allow_origin: cli.allow_origin,
    };

    log::info!(
        "Listening on {} (lookups under {})",
        cli.bind,
        options.base_path
    );

    HttpServer::new(move || {
        let server = server.clone();
        let options = options.clone();
        App::new().configure(|cfg| http::configure(cfg, server, options))
    })
    .bind(&cli.bind)?
    .run()
    .await?;

    Ok(())
}
