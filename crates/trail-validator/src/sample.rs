//! GPS Sample and Identifier Types

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::validator::{parse_identifier, IdentifierKind};

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident, $kind:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Parse and validate a raw identifier string
            pub fn parse(raw: &str) -> Result<Self, ValidationError> {
                parse_identifier($kind, raw).map(Self)
            }

            /// Generate a fresh random identifier
            pub fn new_v4() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

record_id!(
    /// Shift identifier
    ShiftId,
    IdentifierKind::Shift
);
record_id!(
    /// Driver identifier
    DriverId,
    IdentifierKind::Driver
);
record_id!(
    /// Delivery identifier
    DeliveryId,
    IdentifierKind::Delivery
);

/// Geographic point in decimal degrees (WGS84)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Point displaced by a distance along a bearing, on the haversine sphere.
    ///
    /// Used to lay out synthetic trails with known segment lengths.
    pub fn offset(&self, meters: f64, bearing_deg: f64) -> Self {
        let angular = meters / crate::segment::EARTH_RADIUS_M;
        let bearing = bearing_deg.to_radians();
        let lat1 = self.lat.to_radians();
        let lon1 = self.lon.to_radians();

        let lat2 = (lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * bearing.cos()).asin();
        let lon2 = lon1
            + (bearing.sin() * angular.sin() * lat1.cos()).atan2(angular.cos() - lat1.sin() * lat2.sin());

        Self {
            lat: lat2.to_degrees(),
            lon: lon2.to_degrees(),
        }
    }
}

/// One timestamped location fix reported by a driver's device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpsSample {
    pub location: GeoPoint,
    /// Reported error radius in meters
    pub accuracy_m: Option<f64>,
    /// Reported ground speed in meters per second
    pub speed_mps: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

impl GpsSample {
    pub fn new(location: GeoPoint, recorded_at: DateTime<Utc>) -> Self {
        Self {
            location,
            accuracy_m: None,
            speed_mps: None,
            recorded_at,
        }
    }

    pub fn with_accuracy(mut self, accuracy_m: f64) -> Self {
        self.accuracy_m = Some(accuracy_m);
        self
    }

    pub fn with_speed(mut self, speed_mps: f64) -> Self {
        self.speed_mps = Some(speed_mps);
        self
    }
}
