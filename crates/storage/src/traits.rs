use async_trait::async_trait;
use chrono::{DateTime, Utc};
use trail_validator::{DriverId, GpsSample, ShiftId};

use crate::record::{DeliveryRecord, ShiftRecord};
use crate::StorageError;

/// Persistence seam consumed by the mileage engine.
///
/// Everything except [`update_shift_distance`](MileageStore::update_shift_distance)
/// is read-only. Soft-deleted samples and deliveries are never returned.
///
/// Implementations must be `Send + Sync + 'static` so they can be shared
/// across concurrently running per-delivery tasks.
#[async_trait]
pub trait MileageStore: Send + Sync + 'static {
    /// Samples for one driver with `start <= recorded_at <= end`, ordered by
    /// `recorded_at` ascending.
    async fn samples_in_window(
        &self,
        driver_id: DriverId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<GpsSample>, StorageError>;

    /// Look up a shift; `Ok(None)` when no such shift exists.
    async fn find_shift(&self, shift_id: ShiftId) -> Result<Option<ShiftRecord>, StorageError>;

    /// Deliveries attached to a shift, ordered by `assigned_at` (missing last)
    /// then id.
    async fn deliveries_for_shift(
        &self,
        shift_id: ShiftId,
    ) -> Result<Vec<DeliveryRecord>, StorageError>;

    /// Overwrite the shift's total distance. Last writer wins.
    ///
    /// Returns `Err(StorageError::NotFound)` if the shift does not exist.
    async fn update_shift_distance(
        &self,
        shift_id: ShiftId,
        total_km: f64,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StorageError>;
}
