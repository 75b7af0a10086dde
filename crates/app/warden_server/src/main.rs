//! Warden authorization server binary.
//!
//! Serves the OAuth endpoints and the management API. Most settings come
//! from the environment (see `warden_api::config::ApiConfig::from_env`);
//! the flags below override the ones that matter at startup.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::info;
use warden_api::config::ApiConfig;
use warden_core::storage::{MemoryStorage, PgStorage, Storage};

/// Where grants and client registrations are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StorageKind {
    /// PostgreSQL (migrated on startup).
    Postgres,
    /// Process memory; everything is lost on exit.
    Memory,
}

/// CLI arguments for the server.
#[derive(Parser, Debug)]
#[command(name = "warden_server", about = "Warden OAuth 2.0 authorization server")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:8080")]
    bind: String,

    /// Storage backend.
    #[arg(long, env = "WARDEN_STORAGE", value_enum, default_value_t = StorageKind::Postgres)]
    storage: StorageKind,

    /// PostgreSQL connection URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost:5432/warden"
    )]
    database_url: String,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 5)]
    max_connections: u32,

    /// Seconds between purges of expired tokens and codes (0 disables).
    #[arg(long, env = "PURGE_INTERVAL_SECS", default_value_t = 3600)]
    purge_interval_secs: u64,
}

async fn open_storage(args: &Args) -> Result<Arc<dyn Storage>, Box<dyn std::error::Error>> {
    match args.storage {
        StorageKind::Memory => {
            info!("using in-memory storage");
            Ok(Arc::new(MemoryStorage::new()))
        }
        StorageKind::Postgres => {
            info!(max_connections = args.max_connections, "configuring connection pool");
            let pool = PgPoolOptions::new()
                .max_connections(args.max_connections)
                .acquire_timeout(Duration::from_secs(30))
                .connect(&args.database_url)
                .await?;

            info!("running database migrations");
            warden_api::migrate(&pool).await?;
            Ok(Arc::new(PgStorage::new(pool)))
        }
    }
}

async fn shutdown_signal(cancel: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for ctrl-c");
        return;
    }
    info!("shutdown requested");
    cancel.cancel();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,warden_api=debug,warden_core=debug".into()),
        )
        .init();

    let args = Args::parse();

    info!(bind = %args.bind, storage = ?args.storage, "starting warden_server");

    let storage = open_storage(&args).await?;

    let config = ApiConfig {
        bind_addr: args.bind.clone(),
        pg_connection_url: args.database_url.clone(),
        ..ApiConfig::from_env()?
    };
    if config.static_owner.is_some() {
        tracing::warn!("STATIC_OWNER is set: every request is authenticated as that owner");
    }

    let state = warden_api::AppState::new(Arc::clone(&storage), config.owner_provider(), config);
    let app = warden_api::router(state);

    let cancel = CancellationToken::new();
    let purge = (args.purge_interval_secs > 0).then(|| {
        warden_core::maintenance::spawn_purge_task(
            Arc::clone(&storage),
            Duration::from_secs(args.purge_interval_secs),
            cancel.clone(),
        )
    });

    let listener = tokio::net::TcpListener::bind(&args.bind).await?;
    info!(addr = %listener.local_addr()?, "authorization server listening");

    tokio::spawn(shutdown_signal(cancel.clone()));

    let served = axum::serve(listener, app)
        .with_graceful_shutdown({
            let cancel = cancel.clone();
            async move { cancel.cancelled().await }
        })
        .await;

    // Stop the purge task whichever way the server ended.
    cancel.cancel();
    if let Some(purge) = purge {
        let _ = purge.await;
    }

    served?;

    Ok(())
}
