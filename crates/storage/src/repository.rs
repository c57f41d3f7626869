//! In-memory Repository Implementation

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};
use trail_validator::{DeliveryId, DriverId, GpsSample, ShiftId};

use crate::record::{DeliveryRecord, SampleRecord, ShiftRecord};
use crate::traits::MileageStore;
use crate::StorageError;

fn lock_error<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::DatabaseError(format!("Lock error: {}", e))
}

/// Repository for data access (in-memory implementation)
pub struct Repository {
    /// GPS samples, in insertion order
    samples: Mutex<Vec<SampleRecord>>,
    /// Shifts by id
    shifts: Mutex<HashMap<ShiftId, ShiftRecord>>,
    /// Deliveries, in insertion order
    deliveries: Mutex<Vec<DeliveryRecord>>,
    /// Number of sample window queries served
    window_queries: AtomicUsize,
    /// Number of shift distance write-backs applied
    distance_writes: AtomicUsize,
}

impl Repository {
    /// Create a new in-memory repository
    pub fn new() -> Self {
        info!("Creating in-memory repository");
        Self {
            samples: Mutex::new(Vec::with_capacity(10_000)),
            shifts: Mutex::new(HashMap::new()),
            deliveries: Mutex::new(Vec::new()),
            window_queries: AtomicUsize::new(0),
            distance_writes: AtomicUsize::new(0),
        }
    }

    /// Insert a GPS sample for a driver
    pub fn insert_sample(&self, driver_id: DriverId, sample: GpsSample) -> Result<(), StorageError> {
        self.insert_sample_record(SampleRecord::new(driver_id, sample))
    }

    /// Insert a sample record as-is, including any soft-delete marker
    pub fn insert_sample_record(&self, record: SampleRecord) -> Result<(), StorageError> {
        let mut samples = self.samples.lock().map_err(lock_error)?;
        samples.push(record);
        Ok(())
    }

    /// Insert or replace a shift
    pub fn insert_shift(&self, shift: ShiftRecord) -> Result<(), StorageError> {
        let mut shifts = self.shifts.lock().map_err(lock_error)?;
        debug!("Stored shift {}", shift.id);
        shifts.insert(shift.id, shift);
        Ok(())
    }

    /// Insert a delivery
    pub fn insert_delivery(&self, delivery: DeliveryRecord) -> Result<(), StorageError> {
        let mut deliveries = self.deliveries.lock().map_err(lock_error)?;
        deliveries.push(delivery);
        Ok(())
    }

    /// Mark a delivery as deleted
    pub fn soft_delete_delivery(
        &self,
        delivery_id: DeliveryId,
        deleted_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut deliveries = self.deliveries.lock().map_err(lock_error)?;
        let delivery = deliveries
            .iter_mut()
            .find(|d| d.id == delivery_id)
            .ok_or(StorageError::NotFound)?;
        delivery.deleted_at = Some(deleted_at);
        Ok(())
    }

    /// Get a shift by id
    pub fn shift(&self, shift_id: ShiftId) -> Result<Option<ShiftRecord>, StorageError> {
        let shifts = self.shifts.lock().map_err(lock_error)?;
        Ok(shifts.get(&shift_id).cloned())
    }

    /// Number of window queries served so far
    pub fn window_query_count(&self) -> usize {
        self.window_queries.load(Ordering::Relaxed)
    }

    /// Number of distance write-backs applied so far
    pub fn distance_write_count(&self) -> usize {
        self.distance_writes.load(Ordering::Relaxed)
    }
}

impl Default for Repository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MileageStore for Repository {
    async fn samples_in_window(
        &self,
        driver_id: DriverId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<GpsSample>, StorageError> {
        self.window_queries.fetch_add(1, Ordering::Relaxed);
        let samples = self.samples.lock().map_err(lock_error)?;

        let mut found: Vec<GpsSample> = samples
            .iter()
            .filter(|r| r.driver_id == driver_id && r.deleted_at.is_none())
            .filter(|r| r.sample.recorded_at >= start && r.sample.recorded_at <= end)
            .map(|r| r.sample.clone())
            .collect();
        found.sort_by_key(|s| s.recorded_at);

        debug!("Window query for driver {} returned {} samples", driver_id, found.len());
        Ok(found)
    }

    async fn find_shift(&self, shift_id: ShiftId) -> Result<Option<ShiftRecord>, StorageError> {
        self.shift(shift_id)
    }

    async fn deliveries_for_shift(
        &self,
        shift_id: ShiftId,
    ) -> Result<Vec<DeliveryRecord>, StorageError> {
        let deliveries = self.deliveries.lock().map_err(lock_error)?;

        let mut found: Vec<DeliveryRecord> = deliveries
            .iter()
            .filter(|d| d.shift_id == Some(shift_id) && d.deleted_at.is_none())
            .cloned()
            .collect();
        found.sort_by_key(|d| (d.assigned_at.is_none(), d.assigned_at, d.id));

        Ok(found)
    }

    async fn update_shift_distance(
        &self,
        shift_id: ShiftId,
        total_km: f64,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut shifts = self.shifts.lock().map_err(lock_error)?;
        let shift = shifts.get_mut(&shift_id).ok_or(StorageError::NotFound)?;

        shift.total_distance_km = Some(total_km);
        shift.updated_at = Some(updated_at);
        self.distance_writes.fetch_add(1, Ordering::Relaxed);

        debug!("Shift {} total distance set to {:.3} km", shift_id, total_km);
        Ok(())
    }
}
