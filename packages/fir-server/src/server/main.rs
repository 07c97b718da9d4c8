// Main entry point for the FIR crawl service

use std::sync::Arc;

use anyhow::{Context, Result};
use fir_core::kernel::artifact::{ArtifactConfig, ArtifactFetcher};
use fir_core::kernel::jobs::{CrawlStore, PostgresCrawlStore};
use fir_core::kernel::{CrawlDeps, SessionManager};
use fir_core::server::build_app;
use fir_core::Config;
use portal_automation::HttpDriver;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,fir_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting FIR crawl service");

    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connected");

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Migrations complete");

    let store: Arc<dyn CrawlStore> = Arc::new(PostgresCrawlStore::new(pool.clone()));

    // Jobs left `processing` by a crash or kill are resumable, not lost.
    let orphaned = store
        .reset_processing_jobs()
        .await
        .context("Failed to reset orphaned jobs")?;
    if orphaned > 0 {
        tracing::warn!(count = orphaned, "reset orphaned processing jobs to stopped");
    }

    let sessions = Arc::new(SessionManager::new(Arc::new(HttpDriver::new(
        config.driver_url.clone(),
    ))));

    // Warm the session in the background; the status endpoint reports
    // progress and callers retry while it initializes.
    tokio::spawn({
        let sessions = sessions.clone();
        async move {
            if let Err(err) = sessions.ensure_ready().await {
                tracing::error!(error = %err, "initial session bootstrap failed");
            }
        }
    });

    let deps = Arc::new(CrawlDeps {
        store: store.clone(),
        sessions,
        fetcher: ArtifactFetcher::new(
            config.download_root.clone(),
            ArtifactConfig {
                timeout: config.artifact_timeout,
                ..ArtifactConfig::default()
            },
        ),
    });

    let app = build_app(deps);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await
        .context("Server error")?;

    // Make anything still running resumable instead of abandoned.
    let stopped = store
        .reset_processing_jobs()
        .await
        .context("Failed to stop in-flight jobs on shutdown")?;
    if stopped > 0 {
        tracing::info!(count = stopped, "stopped in-flight jobs for later resume");
    }

    Ok(())
}
