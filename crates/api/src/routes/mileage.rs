//! Mileage Routes

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use mileage::{MileageBreakdown, MileageResult};
use serde::Deserialize;
use tracing::debug;

use crate::error::ApiError;
use crate::AppState;

/// Query parameters for the driver distance endpoint (RFC 3339 instants)
#[derive(Debug, Deserialize)]
pub struct DistanceQuery {
    pub start: Option<String>,
    pub end: Option<String>,
}

fn parse_instant(name: &str, value: Option<&str>) -> Result<DateTime<Utc>, ApiError> {
    let raw = value.ok_or_else(|| ApiError::BadRequest(format!("Missing query parameter `{}`", name)))?;
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ApiError::BadRequest(format!("Invalid `{}` timestamp {:?}: {}", name, raw, e)))
}

/// Recompute and persist a shift total
pub async fn compute_shift(
    State(state): State<Arc<AppState>>,
    Path(shift_id): Path<String>,
) -> Result<Json<MileageResult>, ApiError> {
    debug!("Computing mileage for shift {}", shift_id);
    let result = state.orchestrator.compute_shift_mileage(&shift_id).await?;
    Ok(Json(result))
}

/// Recompute a shift total along with per-delivery distances
pub async fn compute_shift_breakdown(
    State(state): State<Arc<AppState>>,
    Path(shift_id): Path<String>,
) -> Result<Json<MileageBreakdown>, ApiError> {
    debug!("Computing mileage breakdown for shift {}", shift_id);
    let breakdown = state
        .orchestrator
        .compute_shift_mileage_with_breakdown(&shift_id)
        .await?;
    Ok(Json(breakdown))
}

/// Read-only distance for a driver over an arbitrary window
pub async fn driver_distance(
    State(state): State<Arc<AppState>>,
    Path(driver_id): Path<String>,
    Query(params): Query<DistanceQuery>,
) -> Result<Json<MileageResult>, ApiError> {
    let start = parse_instant("start", params.start.as_deref())?;
    let end = parse_instant("end", params.end.as_deref())?;

    let result = state
        .orchestrator
        .compute_window_mileage(&driver_id, start, end)
        .await?;
    Ok(Json(result))
}
