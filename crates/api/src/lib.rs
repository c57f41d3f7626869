//! Driver Mileage Service
//!
//! HTTP front end for the mileage engine: shift totals, delivery breakdowns,
//! ad-hoc driver windows, health and Prometheus metrics.

use std::str::FromStr;
use std::sync::Arc;

use alerting::{spawn_drain, ChannelSink, DiagnosticSink, ThrottledSink, TracingSink};
use anyhow::Context;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use mileage::MileageOrchestrator;
use storage::{MileageStore, Repository, SqliteRepository, StorageError};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

pub mod error;
pub mod routes;
pub mod settings;

pub use error::{ApiError, ErrorBody};
pub use settings::{DatabaseSettings, LogSettings, ServerSettings, Settings};

/// Application state shared across handlers
pub struct AppState {
    pub orchestrator: MileageOrchestrator,
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: std::time::Instant,
    /// Which storage backend is serving requests
    pub storage_backend: &'static str,
    pub metrics: PrometheusHandle,
}

impl AppState {
    pub fn new(
        orchestrator: MileageOrchestrator,
        storage_backend: &'static str,
        metrics: PrometheusHandle,
    ) -> Self {
        Self {
            orchestrator,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: std::time::Instant::now(),
            storage_backend,
            metrics,
        }
    }
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(routes::telemetry::health))
        .route(
            "/api/v1/shifts/:shift_id/mileage",
            post(routes::mileage::compute_shift),
        )
        .route(
            "/api/v1/shifts/:shift_id/mileage/breakdown",
            post(routes::mileage::compute_shift_breakdown),
        )
        .route(
            "/api/v1/drivers/:driver_id/distance",
            get(routes::mileage::driver_distance),
        )
        .route("/metrics", get(routes::telemetry::metrics))
        .with_state(state)
}

/// Initialize logging
pub fn init_logging(settings: &LogSettings) -> anyhow::Result<()> {
    let level = Level::from_str(&settings.level)
        .with_context(|| format!("Invalid log level {:?}", settings.level))?;
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(settings.with_target);

    if settings.json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

/// Open the configured store: SQLite when a URL is set, memory otherwise
pub async fn build_store(
    settings: &DatabaseSettings,
) -> Result<(Arc<dyn MileageStore>, &'static str), StorageError> {
    match &settings.url {
        Some(url) => {
            let store: Arc<dyn MileageStore> = Arc::new(SqliteRepository::connect(url).await?);
            Ok((store, "sqlite"))
        }
        None => {
            warn!("No database URL configured, using in-memory storage");
            let store: Arc<dyn MileageStore> = Arc::new(Repository::new());
            Ok((store, "memory"))
        }
    }
}

/// Run the server until Ctrl+C
pub async fn run_server(settings: Settings) -> anyhow::Result<()> {
    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    let (store, backend) = build_store(&settings.database)
        .await
        .context("Failed to open storage")?;

    // Advisories leave the request path through a channel and are throttled
    // before they reach the log.
    let (channel, rx) = ChannelSink::new();
    let alerts: Arc<dyn DiagnosticSink> =
        Arc::new(ThrottledSink::new(settings.alerts.clone(), TracingSink));
    let drain = spawn_drain(rx, alerts);

    let orchestrator = MileageOrchestrator::new(store, settings.mileage.clone(), Arc::new(channel));
    let state = Arc::new(AppState::new(orchestrator, backend, metrics));
    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = settings.server.addr();
    info!("Starting API server on {} ({} storage)", addr, backend);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Router and its senders are gone; let the drain flush what is queued
    if let Err(e) = drain.await {
        warn!("Diagnostic drain ended abnormally: {}", e);
    }
    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
