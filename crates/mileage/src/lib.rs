//! Driver Mileage Engine
//!
//! Computes trustworthy shift distances from noisy GPS trails:
//! - Window distance aggregation over filtered segments
//! - Shift and delivery window resolution
//! - Shift total write-back and per-delivery breakdown
//! - Advisory consistency checks through the alerting sinks

pub mod aggregator;
pub mod clock;
pub mod config;
pub mod orchestrator;
pub mod resolver;
pub mod window;

pub use aggregator::{guard_distance_km, summarize, WindowDistance, WindowDistanceAggregator};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::MileageConfig;
pub use orchestrator::MileageOrchestrator;
pub use resolver::{DeliveryWindow, DeliveryWindowResolver, ShiftWindow, ShiftWindowResolver};
pub use window::TimeWindow;

use serde::{Deserialize, Serialize};
use storage::StorageError;
use thiserror::Error;
use trail_validator::{DeliveryId, ShiftId, ValidationError};

/// Mileage engine errors
#[derive(Error, Debug)]
pub enum MileageError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Shift {0} not found")]
    ShiftNotFound(ShiftId),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Delivery distance task failed: {0}")]
    Task(String),
}

impl MileageError {
    pub fn is_validation(&self) -> bool {
        matches!(self, MileageError::Validation(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, MileageError::ShiftNotFound(_))
    }
}

/// Total distance for a shift or window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MileageResult {
    /// Always finite and non-negative
    pub total_km: f64,
}

/// Distance attributed to one delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryDistance {
    pub delivery_id: DeliveryId,
    pub distance_km: f64,
}

/// Shift total plus per-delivery distances.
///
/// The delivery sum is expected to track `total_km` but is never forced to:
/// delivery windows may overlap or leave gaps in the shift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MileageBreakdown {
    pub total_km: f64,
    pub deliveries: Vec<DeliveryDistance>,
}

impl MileageBreakdown {
    pub fn delivery_sum_km(&self) -> f64 {
        self.deliveries.iter().map(|d| d.distance_km).sum()
    }
}
