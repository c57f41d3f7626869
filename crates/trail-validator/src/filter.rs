//! Quality Filter for GPS Segments
//!
//! A segment only counts towards distance when it looks like genuine directed
//! travel. Samples with a poor accuracy radius are removed before pairing;
//! every remaining segment must then pass each rule in turn.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::sample::GpsSample;
use crate::segment::{build_segments, Segment};
use crate::validator::validate_point;

/// Quality thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Samples with a larger accuracy radius are dropped (meters, default: 100)
    pub max_accuracy_m: f64,
    /// Reported endpoint speed below this means stationary jitter (m/s, default: 0.5)
    pub min_speed_mps: f64,
    /// Jumps longer than this are suspicious when too fast (meters, default: 5000)
    pub outlier_distance_m: f64,
    /// A long jump inside this many seconds is an outlier (seconds, default: 30)
    pub outlier_window_s: f64,
    /// Ceiling on implied segment speed (m/s, default: 150 km/h)
    pub max_speed_mps: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            max_accuracy_m: 100.0,
            min_speed_mps: 0.5,
            outlier_distance_m: 5000.0,
            outlier_window_s: 30.0,
            max_speed_mps: 150.0 / 3.6,
        }
    }
}

impl FilterConfig {
    /// Tighter gates for dense urban trails
    pub fn strict() -> Self {
        Self {
            max_accuracy_m: 50.0,
            min_speed_mps: 1.0,
            outlier_distance_m: 2000.0,
            outlier_window_s: 60.0,
            max_speed_mps: 130.0 / 3.6,
        }
    }

    /// Looser gates for sparse rural reporting
    pub fn lenient() -> Self {
        Self {
            max_accuracy_m: 200.0,
            min_speed_mps: 0.2,
            outlier_distance_m: 10_000.0,
            outlier_window_s: 20.0,
            max_speed_mps: 180.0 / 3.6,
        }
    }
}

/// Why a segment was not counted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Distance is NaN, infinite or negative
    NonFiniteDistance,
    /// Endpoint reported a speed below the motion threshold
    Stationary,
    /// Duplicate or out-of-order timestamps
    NonPositiveElapsed,
    /// Large jump over too short a time
    ShortTimeJump,
    /// Implied speed above the ceiling
    SpeedCapExceeded,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::NonFiniteDistance => "non_finite_distance",
            RejectReason::Stationary => "stationary",
            RejectReason::NonPositiveElapsed => "non_positive_elapsed",
            RejectReason::ShortTimeJump => "short_time_jump",
            RejectReason::SpeedCapExceeded => "speed_cap_exceeded",
        }
    }
}

/// Decision for a single segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject(RejectReason),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accept)
    }
}

/// Counters describing what the filter saw in one window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterStats {
    /// Samples returned by the store
    pub raw_samples: usize,
    /// Samples dropped for out-of-range coordinates
    pub invalid_samples: usize,
    /// Samples dropped by the accuracy gate
    pub inaccurate_samples: usize,
    /// Time-adjacent pairs over all raw samples
    pub candidate_segments: usize,
    /// Candidate pairs with at least one endpoint failing the accuracy gate
    pub inaccurate_segments: usize,
    /// Segments that contributed distance
    pub counted_segments: usize,
    /// Segments formed after gating but rejected, by reason
    pub rejected: BTreeMap<RejectReason, usize>,
}

impl FilterStats {
    /// Fraction of candidate segments spoiled by inaccurate fixes.
    ///
    /// `None` when the window holds fewer than two samples.
    pub fn inaccurate_segment_rate(&self) -> Option<f64> {
        if self.candidate_segments == 0 {
            return None;
        }
        Some(self.inaccurate_segments as f64 / self.candidate_segments as f64)
    }

    pub fn rejected_count(&self, reason: RejectReason) -> usize {
        self.rejected.get(&reason).copied().unwrap_or(0)
    }

    pub fn total_rejected(&self) -> usize {
        self.rejected.values().sum()
    }
}

/// Segments that survived the filter, plus what happened along the way
#[derive(Debug, Clone, Default)]
pub struct FilteredTrail {
    pub segments: Vec<Segment>,
    pub stats: FilterStats,
}

impl FilteredTrail {
    /// Sum of counted segment distances in meters
    pub fn distance_m(&self) -> f64 {
        self.segments.iter().map(|s| s.distance_m).sum()
    }
}

/// Pure per-sample and per-segment decision function
#[derive(Debug, Clone)]
pub struct QualityFilter {
    config: FilterConfig,
}

impl QualityFilter {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Accuracy gate; a sample without an accuracy reading passes
    pub fn accepts_sample(&self, sample: &GpsSample) -> bool {
        match sample.accuracy_m {
            Some(accuracy) => accuracy <= self.config.max_accuracy_m,
            None => true,
        }
    }

    /// Apply the segment rules in order; the first failure is reported
    pub fn evaluate(&self, segment: &Segment) -> Verdict {
        if !segment.distance_m.is_finite() || segment.distance_m < 0.0 {
            return Verdict::Reject(RejectReason::NonFiniteDistance);
        }

        if let Some(speed) = segment.source_speed_mps {
            if !(speed >= self.config.min_speed_mps) {
                return Verdict::Reject(RejectReason::Stationary);
            }
        }

        if !(segment.elapsed_s > 0.0) {
            return Verdict::Reject(RejectReason::NonPositiveElapsed);
        }

        // Keep-rule: distance <= jump threshold OR elapsed >= short window
        if segment.distance_m > self.config.outlier_distance_m
            && segment.elapsed_s < self.config.outlier_window_s
        {
            return Verdict::Reject(RejectReason::ShortTimeJump);
        }

        if segment.implied_speed_mps() > self.config.max_speed_mps {
            return Verdict::Reject(RejectReason::SpeedCapExceeded);
        }

        Verdict::Accept
    }

    /// Run the full pipeline over one window of raw samples:
    /// sort by time, gate samples, pair, then filter segments.
    pub fn apply(&self, mut samples: Vec<GpsSample>) -> FilteredTrail {
        // Stable sort keeps store order for identical timestamps
        samples.sort_by_key(|s| s.recorded_at);

        let mut stats = FilterStats {
            raw_samples: samples.len(),
            candidate_segments: samples.len().saturating_sub(1),
            ..Default::default()
        };

        let accurate: Vec<bool> = samples.iter().map(|s| self.accepts_sample(s)).collect();
        stats.inaccurate_samples = accurate.iter().filter(|ok| !**ok).count();
        stats.inaccurate_segments = accurate.windows(2).filter(|w| !(w[0] && w[1])).count();

        let kept: Vec<GpsSample> = samples
            .into_iter()
            .zip(accurate)
            .filter_map(|(sample, accurate)| {
                if !accurate {
                    return None;
                }
                if validate_point(&sample.location).is_err() {
                    stats.invalid_samples += 1;
                    return None;
                }
                Some(sample)
            })
            .collect();

        let mut segments = Vec::with_capacity(kept.len().saturating_sub(1));
        for segment in build_segments(&kept) {
            match self.evaluate(&segment) {
                Verdict::Accept => segments.push(segment),
                Verdict::Reject(reason) => {
                    *stats.rejected.entry(reason).or_insert(0) += 1;
                }
            }
        }
        stats.counted_segments = segments.len();

        debug!(
            raw = stats.raw_samples,
            inaccurate = stats.inaccurate_samples,
            counted = stats.counted_segments,
            rejected = stats.total_rejected(),
            "Filtered GPS trail"
        );

        FilteredTrail { segments, stats }
    }
}

impl Default for QualityFilter {
    fn default() -> Self {
        Self::new(FilterConfig::default())
    }
}
