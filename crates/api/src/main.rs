//! Driver Mileage Service - Main Entry Point

use anyhow::Context;
use api::{init_logging, run_server, Settings};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("Failed to load settings")?;
    init_logging(&settings.log)?;

    info!("=== Driver Mileage Service v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        "Filter: accuracy <= {} m, motion >= {} m/s, implausible total > {} km",
        settings.mileage.filter.max_accuracy_m,
        settings.mileage.filter.min_speed_mps,
        settings.mileage.monitor.implausible_total_km
    );

    run_server(settings).await
}
