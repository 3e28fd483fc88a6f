//! QueueUp - Main Entry Point
//! Office-hours queue daemon: SQLite store + JSON-RPC server

mod config;

use anyhow::{Context, Result};
use config::{DaemonConfig, LogFormat};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Import workspace crates
use queueup_api_rpc::{RpcHandler, RpcServer, RpcServerConfig};
use queueup_core::application::{AvailabilityTracker, ChangeFeed, FeedConfig, QueueCoordinator};
use queueup_core::port::id_provider::UuidProvider;
use queueup_core::port::time_provider::SystemTimeProvider;
use queueup_core::port::{LedgerStore, ProfessorRepository};
use queueup_infra_sqlite::{
    create_pool, run_migrations, SqliteLedgerStore, SqliteProfessorRepository,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load configuration
    let config = DaemonConfig::from_env().context("Invalid configuration")?;

    // 2. Initialize logging
    init_logging(config.log_format)?;

    info!("QueueUp v{} starting...", VERSION);
    info!(db_path = %config.db_path.display(), "Initializing database...");

    // 3. Initialize database
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create {}", parent.display()))?;
    }
    let pool = create_pool(&config.database_url(), config.db_max_connections)
        .await
        .context("DB pool creation failed")?;
    run_migrations(&pool).await.context("Migration failed")?;

    // 4. Setup dependencies (DI wiring)
    let time_provider = Arc::new(SystemTimeProvider);
    let id_provider = Arc::new(UuidProvider);
    let ledger_store: Arc<dyn LedgerStore> = Arc::new(SqliteLedgerStore::new(pool.clone()));
    let professors: Arc<dyn ProfessorRepository> =
        Arc::new(SqliteProfessorRepository::new(pool.clone()));

    let feed = Arc::new(ChangeFeed::with_config(
        Arc::clone(&ledger_store),
        FeedConfig {
            poll_interval: config.feed_poll_interval,
            ..FeedConfig::default()
        },
    ));
    let coordinator = Arc::new(QueueCoordinator::new(
        Arc::clone(&ledger_store),
        feed,
        id_provider.clone(),
        time_provider.clone(),
    ));
    let tracker = Arc::new(AvailabilityTracker::new(
        professors,
        id_provider,
        time_provider,
    ));

    // 5. Start JSON-RPC server
    let rpc_config = RpcServerConfig {
        host: config.rpc_host.clone(),
        port: config.rpc_port,
    };
    let rpc_server = RpcServer::new(
        rpc_config,
        RpcHandler::new(coordinator, tracker, ledger_store),
    );
    let (addr, rpc_handle) = rpc_server
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("RPC server start failed: {}", e))?;

    info!(addr = %addr, "System ready. Accepting queue requests");
    info!("Press Ctrl+C to shutdown");

    // 6. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received. Exiting gracefully...");

    // 7. Graceful shutdown: stop accepting requests, let in-flight ones finish
    rpc_handle
        .stop()
        .map_err(|e| anyhow::anyhow!("RPC server stop failed: {}", e))?;
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), rpc_handle.stopped()).await;
    pool.close().await;

    info!("Shutdown complete.");

    Ok(())
}

fn init_logging(format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("queueup=info"))
        .context("Failed to create env filter")?;

    match format {
        LogFormat::Json => {
            // Production: JSON structured logging
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        LogFormat::Pretty => {
            // Development: Pretty formatting with colors
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }
    Ok(())
}
