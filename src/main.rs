//! Stakeduel API server binary.

use clap::Parser;
use stakeduel::{
    api::server::ApiServer,
    config::{StakeduelConfig, StorageBackend},
    storage::{KeyValueStore, MemoryStore, RocksStore},
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "stakeduel-api")]
#[command(about = "Stakeduel matchmaking and settlement API server", long_about = None)]
struct Args {
    /// Path to a TOML config file
    #[arg(long)]
    config: Option<String>,

    /// API server host
    #[arg(long)]
    host: Option<String>,

    /// API server port
    #[arg(long)]
    port: Option<u16>,

    /// Database directory
    #[arg(long)]
    db_path: Option<String>,

    /// Allowed CORS origins (comma-separated, use * for all)
    #[arg(long)]
    cors_origins: Option<String>,

    /// Request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Run against the in-memory store instead of RocksDB
    #[arg(long)]
    memory: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => StakeduelConfig::load(path)?,
        None => StakeduelConfig::default(),
    };

    // CLI flags win over the config file.
    if let Some(host) = args.host {
        config.api.host = host;
    }
    if let Some(port) = args.port {
        config.api.port = port;
    }
    if let Some(db_path) = args.db_path {
        config.storage.data_directory = db_path;
    }
    if let Some(origins) = args.cors_origins {
        config.api.allowed_origins = origins.split(',').map(|s| s.trim().to_string()).collect();
    }
    if let Some(timeout) = args.timeout {
        config.api.request_timeout_secs = timeout;
    }
    if args.memory {
        config.storage.backend = StorageBackend::Memory;
    }

    let store: Arc<dyn KeyValueStore> = match config.storage.backend {
        StorageBackend::Rocks => {
            info!("opening RocksDB store at {}", config.storage.data_directory);
            Arc::new(RocksStore::open(&config.storage.data_directory)?)
        }
        StorageBackend::Memory => {
            info!("using in-memory store, data will not persist");
            Arc::new(MemoryStore::new())
        }
    };

    let server = ApiServer::new(config.api, store);
    server.run().await?;

    Ok(())
}
