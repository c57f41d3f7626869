//! Mileage engine configuration

use alerting::MonitorConfig;
use serde::{Deserialize, Serialize};
use trail_validator::FilterConfig;

/// Mileage engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MileageConfig {
    /// Segment quality thresholds
    pub filter: FilterConfig,

    /// Advisory check thresholds
    pub monitor: MonitorConfig,
}
