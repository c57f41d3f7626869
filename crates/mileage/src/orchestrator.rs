//! Mileage Orchestrator
//!
//! Entry points for shift totals, per-delivery breakdowns and ad-hoc
//! windows. Identifiers are validated before the store is touched, and the
//! shift total is the only value ever written back.

use std::sync::Arc;

use alerting::{ConsistencyMonitor, DiagnosticSink, WindowScope};
use chrono::{DateTime, Utc};
use storage::{MileageStore, StorageError};
use tokio::task::JoinSet;
use tracing::{debug, info};
use trail_validator::{DriverId, QualityFilter, ShiftId, ValidationError};

use crate::aggregator::WindowDistanceAggregator;
use crate::clock::{Clock, SystemClock};
use crate::config::MileageConfig;
use crate::resolver::{DeliveryWindowResolver, ShiftWindow, ShiftWindowResolver};
use crate::window::TimeWindow;
use crate::{DeliveryDistance, MileageBreakdown, MileageError, MileageResult};

pub struct MileageOrchestrator {
    store: Arc<dyn MileageStore>,
    shifts: ShiftWindowResolver,
    deliveries: DeliveryWindowResolver,
    aggregator: WindowDistanceAggregator,
    monitor: ConsistencyMonitor,
    clock: Arc<dyn Clock>,
}

impl MileageOrchestrator {
    pub fn new(
        store: Arc<dyn MileageStore>,
        config: MileageConfig,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Self {
        Self::with_clock(store, config, sink, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn MileageStore>,
        config: MileageConfig,
        sink: Arc<dyn DiagnosticSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        info!(
            "Mileage orchestrator ready (accuracy <= {} m, speed cap {:.1} m/s)",
            config.filter.max_accuracy_m, config.filter.max_speed_mps
        );

        Self {
            shifts: ShiftWindowResolver::new(store.clone()),
            deliveries: DeliveryWindowResolver::new(store.clone()),
            aggregator: WindowDistanceAggregator::new(
                store.clone(),
                QualityFilter::new(config.filter),
            ),
            monitor: ConsistencyMonitor::new(config.monitor, sink),
            store,
            clock,
        }
    }

    /// Compute, persist and return the total distance of a shift
    pub async fn compute_shift_mileage(&self, shift_id: &str) -> Result<MileageResult, MileageError> {
        let shift_id = ShiftId::parse(shift_id)?;
        let shift = self.shifts.resolve(shift_id, self.clock.now()).await?;

        let total_km = self.shift_total(&shift).await?;
        self.persist(shift_id, total_km).await?;

        metrics::counter!("mileage_computations_total", "operation" => "shift").increment(1);
        Ok(MileageResult { total_km })
    }

    /// Compute the shift total together with one distance per delivery.
    ///
    /// Only the shift total is persisted. The delivery distances are
    /// returned as computed, even when they do not add up to the total.
    pub async fn compute_shift_mileage_with_breakdown(
        &self,
        shift_id: &str,
    ) -> Result<MileageBreakdown, MileageError> {
        let shift_id = ShiftId::parse(shift_id)?;
        let shift = self.shifts.resolve(shift_id, self.clock.now()).await?;

        let (total_km, records) =
            tokio::try_join!(self.shift_total(&shift), self.deliveries.fetch(shift_id))?;
        let windows = DeliveryWindowResolver::derive_all(&records, &shift);

        let mut tasks = JoinSet::new();
        for (index, delivery) in windows.iter().enumerate() {
            if shift.is_inverted() || !delivery.is_measurable() {
                debug!(
                    "Delivery {} has no measurable window, counting 0 km",
                    delivery.delivery_id
                );
                continue;
            }
            let aggregator = self.aggregator.clone();
            let driver_id = shift.driver_id;
            let window = delivery.window;
            tasks.spawn(async move { (index, aggregator.distance(driver_id, window).await) });
        }

        let mut distances = vec![0.0; windows.len()];
        while let Some(joined) = tasks.join_next().await {
            let (index, distance) = joined.map_err(|e| MileageError::Task(e.to_string()))?;
            distances[index] = distance?.km();
        }

        self.persist(shift_id, total_km).await?;
        self.monitor.check_breakdown(shift_id, total_km, &distances);

        metrics::counter!("mileage_computations_total", "operation" => "breakdown").increment(1);
        Ok(MileageBreakdown {
            total_km,
            deliveries: windows
                .iter()
                .zip(distances)
                .map(|(w, distance_km)| DeliveryDistance {
                    delivery_id: w.delivery_id,
                    distance_km,
                })
                .collect(),
        })
    }

    /// Read-only distance for an arbitrary driver window
    pub async fn compute_window_mileage(
        &self,
        driver_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<MileageResult, MileageError> {
        let driver_id = DriverId::parse(driver_id)?;
        let window = TimeWindow::new(start, end);
        if window.is_empty() {
            return Err(ValidationError::InvalidWindow {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            }
            .into());
        }

        let distance = self.aggregator.distance(driver_id, window).await?;

        metrics::counter!("mileage_computations_total", "operation" => "window").increment(1);
        Ok(MileageResult {
            total_km: distance.km(),
        })
    }

    async fn shift_total(&self, shift: &ShiftWindow) -> Result<f64, MileageError> {
        if shift.is_inverted() {
            self.monitor
                .report_inverted_window(shift.shift_id, shift.driver_id, shift.start, shift.end);
            return Ok(0.0);
        }

        let distance = self.aggregator.distance(shift.driver_id, shift.window()).await?;
        let scope = WindowScope {
            shift_id: Some(shift.shift_id),
            driver_id: shift.driver_id,
            start: shift.start,
            end: shift.end,
        };
        self.monitor.check_window(&scope, &distance.stats);

        let total_km = distance.km();
        self.monitor.check_total(shift.shift_id, shift.driver_id, total_km);
        Ok(total_km)
    }

    async fn persist(&self, shift_id: ShiftId, total_km: f64) -> Result<(), MileageError> {
        match self
            .store
            .update_shift_distance(shift_id, total_km, self.clock.now())
            .await
        {
            Ok(()) => {
                metrics::histogram!("mileage_shift_total_km").record(total_km);
                info!("Shift {} total distance: {:.3} km", shift_id, total_km);
                Ok(())
            }
            Err(StorageError::NotFound) => Err(MileageError::ShiftNotFound(shift_id)),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use alerting::{DiagnosticEvent, DiagnosticKind, MemorySink};
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use storage::{DeliveryRecord, Repository, SampleRecord, ShiftRecord, SqliteRepository};
    use trail_validator::{DeliveryId, GeoPoint, GpsSample};

    use crate::clock::FixedClock;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(secs)
    }

    struct Fixture {
        repo: Arc<Repository>,
        sink: Arc<MemorySink>,
        orchestrator: MileageOrchestrator,
        driver: DriverId,
    }

    fn fixture() -> Fixture {
        fixture_at(at(100_000))
    }

    fn fixture_at(now: DateTime<Utc>) -> Fixture {
        let repo = Arc::new(Repository::new());
        let sink = Arc::new(MemorySink::new());
        let orchestrator = MileageOrchestrator::with_clock(
            repo.clone(),
            MileageConfig::default(),
            sink.clone(),
            Arc::new(FixedClock(now)),
        );
        Fixture {
            repo,
            sink,
            orchestrator,
            driver: DriverId::new_v4(),
        }
    }

    impl Fixture {
        fn shift(&self, start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> ShiftId {
            let id = ShiftId::new_v4();
            self.repo
                .insert_shift(ShiftRecord::new(id, self.driver, start, end))
                .unwrap();
            id
        }

        /// One fix per minute heading north, 1 km apart
        fn steady_trail(&self, minutes: i64) {
            let origin = GeoPoint::new(48.0, 11.0);
            for i in 0..=minutes {
                let sample = GpsSample::new(origin.offset(1000.0 * i as f64, 0.0), at(60 * i))
                    .with_accuracy(8.0)
                    .with_speed(1000.0 / 60.0);
                self.repo.insert_sample(self.driver, sample).unwrap();
            }
        }

        fn delivery(&self, shift_id: ShiftId, picked_up: i64, delivered: i64) -> DeliveryId {
            let id = DeliveryId::new_v4();
            self.repo
                .insert_delivery(DeliveryRecord {
                    picked_up_at: Some(at(picked_up)),
                    delivered_at: Some(at(delivered)),
                    assigned_at: Some(at(picked_up)),
                    ..DeliveryRecord::for_shift(id, shift_id)
                })
                .unwrap();
            id
        }

        fn persisted(&self, shift_id: ShiftId) -> Option<f64> {
            self.repo.shift(shift_id).unwrap().and_then(|s| s.total_distance_km)
        }
    }

    #[tokio::test]
    async fn test_accuracy_gate_and_filter_rate_warning() {
        let f = fixture();
        let shift = f.shift(at(0), Some(at(120)));
        let origin = GeoPoint::new(48.0, 11.0);
        let trail = [
            (0, 0.0, 10.0),
            (60, 500.0, 10.0),
            (120, 1000.0, 200.0),
        ];
        for (secs, meters, accuracy) in trail {
            let sample = GpsSample::new(origin.offset(meters, 90.0), at(secs))
                .with_accuracy(accuracy)
                .with_speed(5.0);
            f.repo.insert_sample(f.driver, sample).unwrap();
        }

        let result = f.orchestrator.compute_shift_mileage(&shift.to_string()).await.unwrap();
        assert!((result.total_km - 0.5).abs() < 1e-3);
        assert_eq!(f.persisted(shift), Some(result.total_km));

        assert_eq!(f.sink.kinds(), vec![DiagnosticKind::HighFilterRate]);
        match &f.sink.events()[0] {
            DiagnosticEvent::HighFilterRate {
                inaccurate_segments,
                candidate_segments,
                rate,
                ..
            } => {
                assert_eq!(*inaccurate_segments, 1);
                assert_eq!(*candidate_segments, 2);
                assert_eq!(*rate, 0.5);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_shift_without_samples() {
        let f = fixture();
        let shift = f.shift(at(0), Some(at(3600)));

        let result = f.orchestrator.compute_shift_mileage(&shift.to_string()).await.unwrap();
        assert_eq!(result.total_km, 0.0);
        assert_eq!(f.persisted(shift), Some(0.0));
        assert_eq!(f.sink.kinds(), vec![DiagnosticKind::NoData]);
    }

    #[tokio::test]
    async fn test_breakdown_divergence_is_advisory() {
        let f = fixture();
        f.steady_trail(40);
        let shift = f.shift(at(0), Some(at(2400)));
        let first = f.delivery(shift, 0, 900);
        let second = f.delivery(shift, 900, 1800);

        let breakdown = f
            .orchestrator
            .compute_shift_mileage_with_breakdown(&shift.to_string())
            .await
            .unwrap();

        assert!((breakdown.total_km - 40.0).abs() < 0.01);
        let ids: Vec<_> = breakdown.deliveries.iter().map(|d| d.delivery_id).collect();
        assert_eq!(ids, vec![first, second]);
        assert!((breakdown.deliveries[0].distance_km - 15.0).abs() < 0.01);
        assert!((breakdown.deliveries[1].distance_km - 15.0).abs() < 0.01);
        assert!((breakdown.delivery_sum_km() - 30.0).abs() < 0.01);

        assert_eq!(f.sink.kinds(), vec![DiagnosticKind::BreakdownDivergence]);
        assert_eq!(f.persisted(shift), Some(breakdown.total_km));
        assert_eq!(f.repo.distance_write_count(), 1);
    }

    #[tokio::test]
    async fn test_partitioning_deliveries_sum_to_total() {
        let f = fixture();
        f.steady_trail(40);
        let shift = f.shift(at(0), Some(at(2400)));
        f.delivery(shift, 0, 1200);
        f.delivery(shift, 1200, 2400);

        let breakdown = f
            .orchestrator
            .compute_shift_mileage_with_breakdown(&shift.to_string())
            .await
            .unwrap();

        assert!((breakdown.delivery_sum_km() - breakdown.total_km).abs() < 1e-6);
        assert!(f.sink.is_empty());
    }

    #[tokio::test]
    async fn test_unmeasurable_delivery_counts_zero_without_query() {
        let f = fixture();
        f.steady_trail(20);
        let shift = f.shift(at(0), Some(at(1200)));
        f.delivery(shift, 0, 600);
        let backwards = f.delivery(shift, 900, 300);

        let breakdown = f
            .orchestrator
            .compute_shift_mileage_with_breakdown(&shift.to_string())
            .await
            .unwrap();

        let zero = breakdown
            .deliveries
            .iter()
            .find(|d| d.delivery_id == backwards)
            .unwrap();
        assert_eq!(zero.distance_km, 0.0);
        // Shift window plus the one measurable delivery
        assert_eq!(f.repo.window_query_count(), 2);
    }

    #[tokio::test]
    async fn test_recompute_is_idempotent() {
        let f = fixture();
        f.steady_trail(30);
        let shift = f.shift(at(0), Some(at(1800)));

        let first = f.orchestrator.compute_shift_mileage(&shift.to_string()).await.unwrap();
        let persisted = f.persisted(shift);
        let second = f.orchestrator.compute_shift_mileage(&shift.to_string()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(f.persisted(shift), persisted);
        assert_eq!(f.repo.distance_write_count(), 2);
    }

    #[tokio::test]
    async fn test_open_shift_ends_at_clock() {
        let f = fixture_at(at(600));
        f.steady_trail(40);
        let shift = f.shift(at(0), None);

        let result = f.orchestrator.compute_shift_mileage(&shift.to_string()).await.unwrap();
        assert!((result.total_km - 10.0).abs() < 0.01);
        let record = f.repo.shift(shift).unwrap().unwrap();
        assert_eq!(record.updated_at, Some(at(600)));
        assert_eq!(record.end_time, None);
    }

    #[tokio::test]
    async fn test_inverted_shift_counts_nothing() {
        let f = fixture();
        f.steady_trail(20);
        let shift = f.shift(at(1200), Some(at(0)));
        f.delivery(shift, 0, 600);

        let breakdown = f
            .orchestrator
            .compute_shift_mileage_with_breakdown(&shift.to_string())
            .await
            .unwrap();

        assert_eq!(breakdown.total_km, 0.0);
        assert_eq!(breakdown.deliveries.len(), 1);
        assert_eq!(breakdown.deliveries[0].distance_km, 0.0);
        assert_eq!(f.persisted(shift), Some(0.0));
        assert_eq!(f.repo.window_query_count(), 0);
        assert_eq!(f.sink.kinds(), vec![DiagnosticKind::InvertedShiftWindow]);
    }

    #[tokio::test]
    async fn test_unknown_shift() {
        let f = fixture();
        let err = f
            .orchestrator
            .compute_shift_mileage(&ShiftId::new_v4().to_string())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(f.repo.distance_write_count(), 0);

        let err = f
            .orchestrator
            .compute_shift_mileage_with_breakdown(&ShiftId::new_v4().to_string())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_window_mileage() {
        let f = fixture();
        f.steady_trail(20);

        let result = f
            .orchestrator
            .compute_window_mileage(&f.driver.to_string(), at(0), at(600))
            .await
            .unwrap();
        assert!((result.total_km - 10.0).abs() < 0.01);
        assert_eq!(f.repo.distance_write_count(), 0);

        let err = f
            .orchestrator
            .compute_window_mileage(&f.driver.to_string(), at(600), at(600))
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_implausible_total_is_reported_and_persisted() {
        let f = fixture();
        let shift = f.shift(at(0), Some(at(60 * 300)));
        let origin = GeoPoint::new(10.0, 20.0);
        // 2 km per minute for five hours
        for i in 0..=300 {
            let sample = GpsSample::new(origin.offset(2000.0 * i as f64, 90.0), at(60 * i))
                .with_accuracy(8.0)
                .with_speed(2000.0 / 60.0);
            f.repo.insert_sample(f.driver, sample).unwrap();
        }

        let result = f.orchestrator.compute_shift_mileage(&shift.to_string()).await.unwrap();
        assert!((result.total_km - 600.0).abs() < 0.5);
        assert_eq!(f.persisted(shift), Some(result.total_km));
        assert_eq!(f.sink.kinds(), vec![DiagnosticKind::ImplausibleTotal]);
    }

    #[tokio::test]
    async fn test_partitioning_breakdown_on_sqlite() {
        let repo = Arc::new(SqliteRepository::connect("sqlite::memory:").await.unwrap());
        let sink = Arc::new(MemorySink::new());
        let orchestrator = MileageOrchestrator::with_clock(
            repo.clone(),
            MileageConfig::default(),
            sink.clone(),
            Arc::new(FixedClock(at(100_000))),
        );

        let driver = DriverId::new_v4();
        let origin = GeoPoint::new(48.0, 11.0);
        for i in 0..=40 {
            let sample = GpsSample::new(origin.offset(1000.0 * i as f64, 0.0), at(60 * i))
                .with_accuracy(8.0)
                .with_speed(1000.0 / 60.0);
            repo.insert_sample(&SampleRecord::new(driver, sample)).await.unwrap();
        }
        let shift = ShiftId::new_v4();
        repo.upsert_shift(&ShiftRecord::new(shift, driver, at(0), Some(at(2400))))
            .await
            .unwrap();
        for (picked_up, delivered) in [(0, 1200), (1200, 2400)] {
            repo.upsert_delivery(&DeliveryRecord {
                picked_up_at: Some(at(picked_up)),
                delivered_at: Some(at(delivered)),
                ..DeliveryRecord::for_shift(DeliveryId::new_v4(), shift)
            })
            .await
            .unwrap();
        }

        let breakdown = orchestrator
            .compute_shift_mileage_with_breakdown(&shift.to_string())
            .await
            .unwrap();

        assert!((breakdown.total_km - 40.0).abs() < 0.01);
        assert_eq!(breakdown.deliveries.len(), 2);
        assert!((breakdown.delivery_sum_km() - breakdown.total_km).abs() < 1e-6);
        assert!(sink.is_empty());

        let stored = repo.find_shift(shift).await.unwrap().unwrap();
        assert_eq!(stored.total_distance_km, Some(breakdown.total_km));
    }

    /// Reads from the in-memory repository but refuses every distance write
    struct ReadOnlyStore(Arc<Repository>);

    #[async_trait]
    impl MileageStore for ReadOnlyStore {
        async fn samples_in_window(
            &self,
            driver_id: DriverId,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<Vec<GpsSample>, StorageError> {
            self.0.samples_in_window(driver_id, start, end).await
        }

        async fn find_shift(&self, shift_id: ShiftId) -> Result<Option<ShiftRecord>, StorageError> {
            self.0.find_shift(shift_id).await
        }

        async fn deliveries_for_shift(
            &self,
            shift_id: ShiftId,
        ) -> Result<Vec<DeliveryRecord>, StorageError> {
            self.0.deliveries_for_shift(shift_id).await
        }

        async fn update_shift_distance(
            &self,
            _shift_id: ShiftId,
            _total_km: f64,
            _updated_at: DateTime<Utc>,
        ) -> Result<(), StorageError> {
            Err(StorageError::DatabaseError("database is locked".to_string()))
        }
    }

    #[tokio::test]
    async fn test_failed_persist_reports_no_divergence() {
        let f = fixture();
        f.steady_trail(40);
        let shift = f.shift(at(0), Some(at(2400)));
        f.delivery(shift, 0, 900);
        f.delivery(shift, 900, 1800);

        let sink = Arc::new(MemorySink::new());
        let orchestrator = MileageOrchestrator::with_clock(
            Arc::new(ReadOnlyStore(f.repo.clone())),
            MileageConfig::default(),
            sink.clone(),
            Arc::new(FixedClock(at(100_000))),
        );

        let err = orchestrator
            .compute_shift_mileage_with_breakdown(&shift.to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, MileageError::Storage(StorageError::DatabaseError(_))));
        assert_eq!(sink.count(DiagnosticKind::BreakdownDivergence), 0);
        assert_eq!(f.persisted(shift), None);
    }

    /// Store that fails every call and counts how often it was asked
    #[derive(Default)]
    struct FailingStore {
        calls: AtomicUsize,
    }

    impl FailingStore {
        fn fail(&self) -> StorageError {
            self.calls.fetch_add(1, Ordering::SeqCst);
            StorageError::DatabaseError("connection refused".to_string())
        }
    }

    #[async_trait]
    impl MileageStore for FailingStore {
        async fn samples_in_window(
            &self,
            _driver_id: DriverId,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
        ) -> Result<Vec<GpsSample>, StorageError> {
            Err(self.fail())
        }

        async fn find_shift(&self, _shift_id: ShiftId) -> Result<Option<ShiftRecord>, StorageError> {
            Err(self.fail())
        }

        async fn deliveries_for_shift(
            &self,
            _shift_id: ShiftId,
        ) -> Result<Vec<DeliveryRecord>, StorageError> {
            Err(self.fail())
        }

        async fn update_shift_distance(
            &self,
            _shift_id: ShiftId,
            _total_km: f64,
            _updated_at: DateTime<Utc>,
        ) -> Result<(), StorageError> {
            Err(self.fail())
        }
    }

    fn failing() -> (MileageOrchestrator, Arc<FailingStore>) {
        let store = Arc::new(FailingStore::default());
        let orchestrator = MileageOrchestrator::new(
            store.clone(),
            MileageConfig::default(),
            Arc::new(MemorySink::new()),
        );
        (orchestrator, store)
    }

    #[tokio::test]
    async fn test_validation_precedes_store_access() {
        let (orchestrator, store) = failing();

        for raw in ["", "not-a-uuid", "00000000-0000-0000-0000-000000000000"] {
            assert!(orchestrator.compute_shift_mileage(raw).await.unwrap_err().is_validation());
            assert!(orchestrator
                .compute_shift_mileage_with_breakdown(raw)
                .await
                .unwrap_err()
                .is_validation());
            assert!(orchestrator
                .compute_window_mileage(raw, at(0), at(60))
                .await
                .unwrap_err()
                .is_validation());
        }
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_storage_failure_propagates() {
        let (orchestrator, store) = failing();
        let err = orchestrator
            .compute_shift_mileage(&ShiftId::new_v4().to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, MileageError::Storage(StorageError::DatabaseError(_))));
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }
}
