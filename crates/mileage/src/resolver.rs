//! Shift and Delivery Window Resolution

use std::sync::Arc;

use chrono::{DateTime, Utc};
use storage::{DeliveryRecord, MileageStore, ShiftRecord};
use tracing::debug;
use trail_validator::{DeliveryId, DriverId, ShiftId};

use crate::window::TimeWindow;
use crate::MileageError;

/// Outer bounds of a shift, with an open end resolved to "now"
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShiftWindow {
    pub shift_id: ShiftId,
    pub driver_id: DriverId,
    pub start: DateTime<Utc>,
    /// Recorded end time, or the resolution instant for open shifts
    pub end: DateTime<Utc>,
    pub open: bool,
}

impl ShiftWindow {
    pub fn from_record(record: &ShiftRecord, now: DateTime<Utc>) -> Self {
        Self {
            shift_id: record.id,
            driver_id: record.driver_id,
            start: record.start_time,
            end: record.end_time.unwrap_or(now),
            open: record.end_time.is_none(),
        }
    }

    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.start, self.end)
    }

    pub fn is_inverted(&self) -> bool {
        self.window().is_inverted()
    }
}

pub struct ShiftWindowResolver {
    store: Arc<dyn MileageStore>,
}

impl ShiftWindowResolver {
    pub fn new(store: Arc<dyn MileageStore>) -> Self {
        Self { store }
    }

    /// Load a shift and resolve its effective window
    pub async fn resolve(
        &self,
        shift_id: ShiftId,
        now: DateTime<Utc>,
    ) -> Result<ShiftWindow, MileageError> {
        let record = self
            .store
            .find_shift(shift_id)
            .await?
            .ok_or(MileageError::ShiftNotFound(shift_id))?;

        let window = ShiftWindow::from_record(&record, now);
        debug!(
            "Shift {} for driver {}: {} .. {}{}",
            shift_id,
            window.driver_id,
            window.start,
            window.end,
            if window.open { " (open)" } else { "" }
        );
        Ok(window)
    }
}

/// Best-effort sub-window of a shift attributed to one delivery
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeliveryWindow {
    pub delivery_id: DeliveryId,
    pub window: TimeWindow,
}

impl DeliveryWindow {
    /// Derive the window from whichever lifecycle timestamps are present:
    /// start is pickup, else assignment, else shift start; end is drop-off,
    /// else the estimate, else the shift's effective end.
    pub fn derive(delivery: &DeliveryRecord, shift: &ShiftWindow) -> Self {
        let start = delivery
            .picked_up_at
            .or(delivery.assigned_at)
            .unwrap_or(shift.start);
        let end = delivery
            .delivered_at
            .or(delivery.estimated_delivery_time)
            .unwrap_or(shift.end);

        Self {
            delivery_id: delivery.id,
            window: TimeWindow::new(start, end),
        }
    }

    /// A window whose end is not after its start cannot be trusted
    pub fn is_measurable(&self) -> bool {
        !self.window.is_empty()
    }
}

pub struct DeliveryWindowResolver {
    store: Arc<dyn MileageStore>,
}

impl DeliveryWindowResolver {
    pub fn new(store: Arc<dyn MileageStore>) -> Self {
        Self { store }
    }

    /// Non-deleted deliveries attached to the shift
    pub async fn fetch(&self, shift_id: ShiftId) -> Result<Vec<DeliveryRecord>, MileageError> {
        Ok(self.store.deliveries_for_shift(shift_id).await?)
    }

    /// Derive windows for fetched deliveries, preserving their order
    pub fn derive_all(deliveries: &[DeliveryRecord], shift: &ShiftWindow) -> Vec<DeliveryWindow> {
        deliveries
            .iter()
            .map(|d| DeliveryWindow::derive(d, shift))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use storage::Repository;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(secs)
    }

    fn shift_window() -> ShiftWindow {
        ShiftWindow {
            shift_id: ShiftId::new_v4(),
            driver_id: DriverId::new_v4(),
            start: at(0),
            end: at(3600),
            open: false,
        }
    }

    #[tokio::test]
    async fn test_resolve_closed_shift() {
        let repo = Arc::new(Repository::new());
        let record = ShiftRecord::new(ShiftId::new_v4(), DriverId::new_v4(), at(0), Some(at(1800)));
        repo.insert_shift(record.clone()).unwrap();

        let resolver = ShiftWindowResolver::new(repo);
        let window = resolver.resolve(record.id, at(9999)).await.unwrap();
        assert_eq!(window.end, at(1800));
        assert!(!window.open);
        assert_eq!(window.driver_id, record.driver_id);
    }

    #[tokio::test]
    async fn test_resolve_open_shift_uses_now() {
        let repo = Arc::new(Repository::new());
        let record = ShiftRecord::new(ShiftId::new_v4(), DriverId::new_v4(), at(0), None);
        repo.insert_shift(record.clone()).unwrap();

        let window = ShiftWindowResolver::new(repo).resolve(record.id, at(4200)).await.unwrap();
        assert_eq!(window.end, at(4200));
        assert!(window.open);
    }

    #[tokio::test]
    async fn test_resolve_missing_shift() {
        let resolver = ShiftWindowResolver::new(Arc::new(Repository::new()));
        let missing = ShiftId::new_v4();
        let err = resolver.resolve(missing, at(0)).await.unwrap_err();
        assert!(matches!(err, MileageError::ShiftNotFound(id) if id == missing));
    }

    #[test]
    fn test_derive_prefers_pickup_and_dropoff() {
        let shift = shift_window();
        let delivery = DeliveryRecord {
            assigned_at: Some(at(100)),
            picked_up_at: Some(at(200)),
            delivered_at: Some(at(900)),
            estimated_delivery_time: Some(at(1200)),
            ..DeliveryRecord::for_shift(DeliveryId::new_v4(), shift.shift_id)
        };

        let derived = DeliveryWindow::derive(&delivery, &shift);
        assert_eq!(derived.window, TimeWindow::new(at(200), at(900)));
        assert!(derived.is_measurable());
    }

    #[test]
    fn test_derive_fallbacks() {
        let shift = shift_window();

        let assigned_and_estimated = DeliveryRecord {
            assigned_at: Some(at(100)),
            estimated_delivery_time: Some(at(1200)),
            ..DeliveryRecord::for_shift(DeliveryId::new_v4(), shift.shift_id)
        };
        assert_eq!(
            DeliveryWindow::derive(&assigned_and_estimated, &shift).window,
            TimeWindow::new(at(100), at(1200))
        );

        let bare = DeliveryRecord::for_shift(DeliveryId::new_v4(), shift.shift_id);
        assert_eq!(
            DeliveryWindow::derive(&bare, &shift).window,
            TimeWindow::new(shift.start, shift.end)
        );
    }

    #[test]
    fn test_dropoff_before_pickup_is_not_measurable() {
        let shift = shift_window();
        for delivered in [at(500), at(400)] {
            let delivery = DeliveryRecord {
                picked_up_at: Some(at(500)),
                delivered_at: Some(delivered),
                ..DeliveryRecord::for_shift(DeliveryId::new_v4(), shift.shift_id)
            };
            assert!(!DeliveryWindow::derive(&delivery, &shift).is_measurable());
        }
    }

    #[tokio::test]
    async fn test_resolve_deliveries_in_store_order() {
        let repo = Arc::new(Repository::new());
        let shift = shift_window();
        let later = DeliveryRecord {
            assigned_at: Some(at(900)),
            ..DeliveryRecord::for_shift(DeliveryId::new_v4(), shift.shift_id)
        };
        let earlier = DeliveryRecord {
            assigned_at: Some(at(100)),
            ..DeliveryRecord::for_shift(DeliveryId::new_v4(), shift.shift_id)
        };
        repo.insert_delivery(later.clone()).unwrap();
        repo.insert_delivery(earlier.clone()).unwrap();

        let records = DeliveryWindowResolver::new(repo).fetch(shift.shift_id).await.unwrap();
        let windows = DeliveryWindowResolver::derive_all(&records, &shift);
        let ids: Vec<_> = windows.iter().map(|w| w.delivery_id).collect();
        assert_eq!(ids, vec![earlier.id, later.id]);
        assert_eq!(windows[0].window.end, shift.end);
    }
}
