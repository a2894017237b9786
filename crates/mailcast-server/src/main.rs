//! Mailcast - API server and campaign scheduler entry point

use anyhow::{Context, Result};
use mailcast_api::{create_router, AppState};
use mailcast_common::config::{Config, LoggingConfig};
use mailcast_core::{CampaignScheduler, PgCampaignStore};
use mailcast_storage::DatabasePool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    init_logging(&config.logging);

    info!("Starting Mailcast...");
    warn_on_default_secrets(&config);

    // Initialize database
    let db_pool = DatabasePool::new(&config.database).await?;

    if config.database.run_migrations {
        db_pool.migrate().await?;
    }

    let state = Arc::new(AppState::new(&config, db_pool.clone())?);
    let shutdown = CancellationToken::new();

    // Start the scheduled campaign poller
    let scheduler_handle = if config.scheduler.enabled {
        let scheduler = Arc::new(CampaignScheduler::new(
            Arc::new(PgCampaignStore::new(&db_pool)),
            state.dispatcher.clone(),
            state.metrics.clone(),
            config.scheduler.clone(),
        ));
        let shutdown = shutdown.clone();
        Some(tokio::spawn(scheduler.run(shutdown)))
    } else {
        info!("Campaign scheduler disabled");
        None
    };

    // Start API server
    let app = create_router(state, &config.server.cors_origins);
    let listener = tokio::net::TcpListener::bind(&config.server.bind_address)
        .await
        .with_context(|| format!("Failed to bind API server on {}", config.server.bind_address))?;

    info!("API server listening on {}", config.server.bind_address);

    let server_shutdown = shutdown.clone();
    let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
        server_shutdown.cancelled().await;
    });

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Shutdown signal received"),
                Err(e) => error!("Failed to listen for shutdown signal: {}", e),
            }
            shutdown.cancel();
        }
    });

    if let Err(e) = serve.await {
        error!("API server error: {}", e);
        shutdown.cancel();
    }

    // In-flight campaign sends are not awaited; a restart leaves them in
    // `sending` for the stuck-campaign sweep to report.
    if let Some(handle) = scheduler_handle {
        if let Err(e) = handle.await {
            error!("Scheduler task failed: {}", e);
        }
    }

    info!("Mailcast shutdown complete");

    Ok(())
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},mailcast=debug", config.level)));

    let registry = tracing_subscriber::registry().with(filter);

    if config.format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}

fn warn_on_default_secrets(config: &Config) {
    if config.auth.jwt_secret.starts_with("change-me") {
        warn!("auth.jwt_secret is the built-in default; set MAILCAST_AUTH__JWT_SECRET");
    }
    if config.tracking.secret.starts_with("change-me") {
        warn!("tracking.secret is the built-in default; set MAILCAST_TRACKING__SECRET");
    }
}
