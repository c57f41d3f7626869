//! Diagnostic Event Types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use trail_validator::{DriverId, ShiftId};
use uuid::Uuid;

/// Event severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Discriminant of a [`DiagnosticEvent`], used for labels and deduplication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    HighFilterRate,
    NoData,
    ImplausibleTotal,
    BreakdownDivergence,
    InvertedShiftWindow,
}

impl DiagnosticKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticKind::HighFilterRate => "high_filter_rate",
            DiagnosticKind::NoData => "no_data",
            DiagnosticKind::ImplausibleTotal => "implausible_total",
            DiagnosticKind::BreakdownDivergence => "breakdown_divergence",
            DiagnosticKind::InvertedShiftWindow => "inverted_shift_window",
        }
    }
}

/// Advisory signal about data quality or plausibility.
///
/// Never an error: emitting one does not change any computed or persisted value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiagnosticEvent {
    /// Too many candidate segments touched a low-accuracy fix
    HighFilterRate {
        shift_id: Option<ShiftId>,
        driver_id: DriverId,
        inaccurate_segments: usize,
        candidate_segments: usize,
        inaccurate_samples: usize,
        raw_samples: usize,
        rate: f64,
        threshold: f64,
    },

    /// The window contained no samples at all (tracking outage)
    NoData {
        shift_id: Option<ShiftId>,
        driver_id: DriverId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    /// Shift total above the plausibility ceiling
    ImplausibleTotal {
        shift_id: ShiftId,
        driver_id: DriverId,
        total_km: f64,
        ceiling_km: f64,
    },

    /// Per-delivery sum drifted from the independently computed total
    BreakdownDivergence {
        shift_id: ShiftId,
        total_km: f64,
        breakdown_km: f64,
        deviation: f64,
        threshold: f64,
    },

    /// Shift ends before it starts; treated as an empty window
    InvertedShiftWindow {
        shift_id: ShiftId,
        driver_id: DriverId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl DiagnosticEvent {
    pub fn kind(&self) -> DiagnosticKind {
        match self {
            DiagnosticEvent::HighFilterRate { .. } => DiagnosticKind::HighFilterRate,
            DiagnosticEvent::NoData { .. } => DiagnosticKind::NoData,
            DiagnosticEvent::ImplausibleTotal { .. } => DiagnosticKind::ImplausibleTotal,
            DiagnosticEvent::BreakdownDivergence { .. } => DiagnosticKind::BreakdownDivergence,
            DiagnosticEvent::InvertedShiftWindow { .. } => DiagnosticKind::InvertedShiftWindow,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            DiagnosticEvent::BreakdownDivergence { .. } => Severity::Low,
            DiagnosticEvent::HighFilterRate { .. } | DiagnosticEvent::NoData { .. } => {
                Severity::Medium
            }
            DiagnosticEvent::ImplausibleTotal { .. }
            | DiagnosticEvent::InvertedShiftWindow { .. } => Severity::High,
        }
    }

    /// Record the event is about: the shift when known, else the driver
    pub fn subject(&self) -> Uuid {
        match self {
            DiagnosticEvent::HighFilterRate { shift_id, driver_id, .. }
            | DiagnosticEvent::NoData { shift_id, driver_id, .. } => {
                shift_id.map(|s| s.0).unwrap_or(driver_id.0)
            }
            DiagnosticEvent::ImplausibleTotal { shift_id, .. }
            | DiagnosticEvent::BreakdownDivergence { shift_id, .. }
            | DiagnosticEvent::InvertedShiftWindow { shift_id, .. } => shift_id.0,
        }
    }
}
