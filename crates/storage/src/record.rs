//! Persisted Record Types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use trail_validator::{DeliveryId, DriverId, GpsSample, ShiftId};

/// A stored GPS fix, owned by one driver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleRecord {
    pub driver_id: DriverId,
    pub sample: GpsSample,
    /// Soft-delete marker; deleted rows are never read back
    pub deleted_at: Option<DateTime<Utc>>,
}

impl SampleRecord {
    pub fn new(driver_id: DriverId, sample: GpsSample) -> Self {
        Self {
            driver_id,
            sample,
            deleted_at: None,
        }
    }
}

/// A driver's work session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftRecord {
    pub id: ShiftId,
    pub driver_id: DriverId,
    pub start_time: DateTime<Utc>,
    /// `None` while the shift is still open
    pub end_time: Option<DateTime<Utc>>,
    pub total_distance_km: Option<f64>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ShiftRecord {
    pub fn new(
        id: ShiftId,
        driver_id: DriverId,
        start_time: DateTime<Utc>,
        end_time: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            driver_id,
            start_time,
            end_time,
            total_distance_km: None,
            updated_at: None,
        }
    }
}

/// A delivery handled by a driver, with its lifecycle timestamps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub id: DeliveryId,
    pub driver_id: Option<DriverId>,
    pub shift_id: Option<ShiftId>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub estimated_delivery_time: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl DeliveryRecord {
    /// A delivery attached to a shift with no lifecycle timestamps yet
    pub fn for_shift(id: DeliveryId, shift_id: ShiftId) -> Self {
        Self {
            id,
            driver_id: None,
            shift_id: Some(shift_id),
            assigned_at: None,
            picked_up_at: None,
            delivered_at: None,
            estimated_delivery_time: None,
            deleted_at: None,
        }
    }
}
