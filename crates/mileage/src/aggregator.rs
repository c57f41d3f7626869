//! Window Distance Aggregator
//!
//! The one place geodesic distance is summed. Every caller (shift totals,
//! delivery breakdowns, ad-hoc windows) goes through
//! [`WindowDistanceAggregator::distance`] with a different window.

use std::sync::Arc;

use storage::{MileageStore, StorageError};
use tracing::debug;
use trail_validator::{DriverId, FilterStats, GpsSample, QualityFilter};

use crate::window::TimeWindow;

/// Coerce anything non-finite or negative to zero
pub fn guard_distance_km(km: f64) -> f64 {
    if km.is_finite() && km > 0.0 {
        km
    } else {
        0.0
    }
}

/// Filtered distance over one window, with what the filter saw
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowDistance {
    pub meters: f64,
    pub stats: FilterStats,
}

impl WindowDistance {
    /// Distance in kilometers; always finite and non-negative
    pub fn km(&self) -> f64 {
        guard_distance_km(self.meters / 1000.0)
    }
}

/// Sort, gate, pair, filter and sum one window of raw samples
pub fn summarize(samples: Vec<GpsSample>, filter: &QualityFilter) -> WindowDistance {
    let trail = filter.apply(samples);
    WindowDistance {
        meters: trail.distance_m(),
        stats: trail.stats,
    }
}

#[derive(Clone)]
pub struct WindowDistanceAggregator {
    store: Arc<dyn MileageStore>,
    filter: QualityFilter,
}

impl WindowDistanceAggregator {
    pub fn new(store: Arc<dyn MileageStore>, filter: QualityFilter) -> Self {
        Self { store, filter }
    }

    /// Filtered distance travelled by `driver_id` during `window`.
    ///
    /// An empty or inverted window is answered without touching the store.
    pub async fn distance(
        &self,
        driver_id: DriverId,
        window: TimeWindow,
    ) -> Result<WindowDistance, StorageError> {
        if window.is_empty() {
            return Ok(WindowDistance::default());
        }

        let samples = self
            .store
            .samples_in_window(driver_id, window.start, window.end)
            .await?;
        let result = summarize(samples, &self.filter);

        for (reason, count) in &result.stats.rejected {
            metrics::counter!("mileage_segments_rejected_total", "reason" => reason.as_str())
                .increment(*count as u64);
        }
        debug!(
            "Driver {} window {} .. {}: {:.3} km over {} segments",
            driver_id,
            window.start,
            window.end,
            result.km(),
            result.stats.counted_segments
        );

        Ok(result)
    }
}
