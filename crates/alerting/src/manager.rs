//! Alert Throttling for Diagnostic Sinks

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::event::{DiagnosticEvent, DiagnosticKind, Severity};
use crate::sink::DiagnosticSink;

/// Alert configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Events below this severity are dropped (default: low)
    pub min_severity: Severity,
    /// Cooldown between duplicate events for the same subject (seconds)
    pub cooldown_seconds: u64,
    /// Maximum events forwarded per hour before throttling
    pub max_alerts_per_hour: usize,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            min_severity: Severity::Low,
            cooldown_seconds: 1800, // 30 minutes
            max_alerts_per_hour: 120,
        }
    }
}

/// Throttle bookkeeping for one (kind, subject) pair
#[derive(Debug, Clone)]
struct AlertState {
    /// Last time this alert was fired
    last_fired: Instant,
    /// Number of times fired
    fire_count: usize,
}

type AlertKey = (DiagnosticKind, Uuid);

#[derive(Debug)]
struct ThrottleState {
    /// Alert states by kind and subject, only while in cooldown
    states: HashMap<AlertKey, AlertState>,
    /// Alerts fired in current hour
    hourly_count: usize,
    /// Hour start time
    hour_start: Instant,
}

/// Sink wrapper that deduplicates and rate-limits diagnostics.
///
/// A recomputation loop over the same broken shift would otherwise report the
/// same condition on every call. High severity events bypass the hourly cap
/// but are still deduplicated.
pub struct ThrottledSink<S> {
    config: AlertConfig,
    inner: S,
    state: Mutex<ThrottleState>,
}

impl<S: DiagnosticSink> ThrottledSink<S> {
    pub fn new(config: AlertConfig, inner: S) -> Self {
        info!("Creating throttled diagnostic sink with config: {:?}", config);
        Self {
            config,
            inner,
            state: Mutex::new(ThrottleState {
                states: HashMap::new(),
                hourly_count: 0,
                hour_start: Instant::now(),
            }),
        }
    }

    fn cooldown(&self) -> Duration {
        Duration::from_secs(self.config.cooldown_seconds)
    }

    /// Check if an event should be forwarded, and record it if so
    fn admit(&self, event: &DiagnosticEvent) -> bool {
        let severity = event.severity();
        if severity < self.config.min_severity {
            debug!(
                "Diagnostic suppressed: severity {:?} < minimum {:?}",
                severity, self.config.min_severity
            );
            return false;
        }

        let Ok(mut state) = self.state.lock() else {
            return false;
        };

        // Reset hourly counter if needed
        if state.hour_start.elapsed() > Duration::from_secs(3600) {
            state.hourly_count = 0;
            state.hour_start = Instant::now();
        }

        let capped = severity < Severity::High;
        if capped && state.hourly_count >= self.config.max_alerts_per_hour {
            warn!(
                "Diagnostic throttled: max alerts per hour reached, dropping {}",
                event.kind().as_str()
            );
            return false;
        }

        let cooldown = self.cooldown();
        let key = (event.kind(), event.subject());
        if let Some(existing) = state.states.get(&key) {
            if existing.last_fired.elapsed() < cooldown {
                debug!(
                    "Diagnostic suppressed: {} in cooldown period (fired {} times)",
                    key.0.as_str(),
                    existing.fire_count
                );
                return false;
            }
        }

        // Entries past their cooldown no longer suppress anything
        state.states.retain(|_, alert| alert.last_fired.elapsed() < cooldown);

        if capped {
            state.hourly_count += 1;
        }
        let entry = state.states.entry(key).or_insert(AlertState {
            last_fired: Instant::now(),
            fire_count: 0,
        });
        entry.last_fired = Instant::now();
        entry.fire_count += 1;

        true
    }
}
