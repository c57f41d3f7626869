use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Time interval used to scope a distance query.
///
/// Samples are loaded with both ends inclusive so that two windows sharing a
/// boundary split the trail's segments between them exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// No distance can be measured: end is not after start
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// End strictly before start
    pub fn is_inverted(&self) -> bool {
        self.end < self.start
    }
}
