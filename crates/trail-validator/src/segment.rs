//! Segment Building from Time-Adjacent Samples

use chrono::{DateTime, Utc};

use crate::sample::{GeoPoint, GpsSample};

/// Mean Earth radius used for haversine distances (meters)
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two points in meters
pub fn haversine_meters(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();
    let h = (dlat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    // Clamp guards against h drifting a hair above 1.0 for antipodal points
    let c = 2.0 * h.clamp(0.0, 1.0).sqrt().atan2((1.0 - h).max(0.0).sqrt());
    EARTH_RADIUS_M * c
}

/// Directed pair of two time-adjacent samples
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub distance_m: f64,
    pub elapsed_s: f64,
    /// Speed reported at the segment's endpoint
    pub source_speed_mps: Option<f64>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl Segment {
    /// Build the segment travelled from `prev` to `next`
    pub fn between(prev: &GpsSample, next: &GpsSample) -> Self {
        let elapsed = next.recorded_at - prev.recorded_at;
        Self {
            distance_m: haversine_meters(&prev.location, &next.location),
            elapsed_s: elapsed.num_milliseconds() as f64 / 1000.0,
            source_speed_mps: next.speed_mps,
            started_at: prev.recorded_at,
            ended_at: next.recorded_at,
        }
    }

    /// Average speed implied by the segment, with elapsed time floored at 1 s
    pub fn implied_speed_mps(&self) -> f64 {
        self.distance_m / self.elapsed_s.max(1.0)
    }
}

/// Pair every sample with its predecessor.
///
/// Samples must already be in non-decreasing `recorded_at` order. The first
/// sample has no predecessor and produces no segment.
pub fn build_segments(samples: &[GpsSample]) -> Vec<Segment> {
    samples
        .windows(2)
        .map(|pair| Segment::between(&pair[0], &pair[1]))
        .collect()
}
