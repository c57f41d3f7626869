//! Consistency Monitor
//!
//! Advisory checks run after aggregation. Every check only observes numbers
//! that were already computed and reports through a [`DiagnosticSink`]; none
//! of them can fail the caller or alter a result.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use trail_validator::{DriverId, FilterStats, ShiftId};

use crate::event::DiagnosticEvent;
use crate::sink::DiagnosticSink;

/// Monitor thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Shift totals above this are implausible (km, default: 500)
    pub implausible_total_km: f64,
    /// Fraction of candidate segments spoiled by inaccurate fixes that
    /// triggers a warning (default: 0.5, inclusive)
    pub filter_rate_threshold: f64,
    /// Relative breakdown deviation from the total that triggers a warning
    /// (default: 0.2, exclusive)
    pub divergence_threshold: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            implausible_total_km: 500.0,
            filter_rate_threshold: 0.5,
            divergence_threshold: 0.2,
        }
    }
}

/// Which window a set of filter statistics came from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowScope {
    pub shift_id: Option<ShiftId>,
    pub driver_id: DriverId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

pub struct ConsistencyMonitor {
    config: MonitorConfig,
    sink: Arc<dyn DiagnosticSink>,
}

impl ConsistencyMonitor {
    pub fn new(config: MonitorConfig, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self { config, sink }
    }

    fn emit(&self, event: DiagnosticEvent) {
        metrics::counter!("mileage_diagnostics_total", "kind" => event.kind().as_str()).increment(1);
        self.sink.report(event);
    }

    /// No-data and high-filter-rate checks over one window.
    ///
    /// Returns the number of events emitted.
    pub fn check_window(&self, scope: &WindowScope, stats: &FilterStats) -> usize {
        if stats.raw_samples == 0 {
            self.emit(DiagnosticEvent::NoData {
                shift_id: scope.shift_id,
                driver_id: scope.driver_id,
                start: scope.start,
                end: scope.end,
            });
            return 1;
        }

        match stats.inaccurate_segment_rate() {
            Some(rate) if rate >= self.config.filter_rate_threshold => {
                self.emit(DiagnosticEvent::HighFilterRate {
                    shift_id: scope.shift_id,
                    driver_id: scope.driver_id,
                    inaccurate_segments: stats.inaccurate_segments,
                    candidate_segments: stats.candidate_segments,
                    inaccurate_samples: stats.inaccurate_samples,
                    raw_samples: stats.raw_samples,
                    rate,
                    threshold: self.config.filter_rate_threshold,
                });
                1
            }
            _ => 0,
        }
    }

    /// Implausible-total check; returns whether an event was emitted
    pub fn check_total(&self, shift_id: ShiftId, driver_id: DriverId, total_km: f64) -> bool {
        if total_km > self.config.implausible_total_km {
            self.emit(DiagnosticEvent::ImplausibleTotal {
                shift_id,
                driver_id,
                total_km,
                ceiling_km: self.config.implausible_total_km,
            });
            return true;
        }
        false
    }

    /// Breakdown-divergence check; skipped when the total is zero
    pub fn check_breakdown(&self, shift_id: ShiftId, total_km: f64, delivery_km: &[f64]) -> bool {
        if !(total_km > 0.0) {
            return false;
        }

        let breakdown_km: f64 = delivery_km.iter().sum();
        let deviation = (breakdown_km - total_km).abs() / total_km;
        debug!(
            "Shift {} breakdown {:.3} km vs total {:.3} km (deviation {:.3})",
            shift_id, breakdown_km, total_km, deviation
        );

        if deviation > self.config.divergence_threshold {
            self.emit(DiagnosticEvent::BreakdownDivergence {
                shift_id,
                total_km,
                breakdown_km,
                deviation,
                threshold: self.config.divergence_threshold,
            });
            return true;
        }
        false
    }

    /// Report a shift whose end precedes its start
    pub fn report_inverted_window(
        &self,
        shift_id: ShiftId,
        driver_id: DriverId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) {
        self.emit(DiagnosticEvent::InvertedShiftWindow {
            shift_id,
            driver_id,
            start,
            end,
        });
    }
}
