//! GPS Trail Validation
//!
//! Turns raw GPS fixes into trustworthy travel segments:
//! - Identifier parsing for shifts, drivers and deliveries
//! - Accuracy gating of individual samples
//! - Segment building from time-adjacent samples
//! - Per-segment quality rules (motion, time, outliers, speed cap)

mod error;
mod filter;
mod sample;
mod segment;
mod validator;

pub use error::ValidationError;
pub use filter::{FilterConfig, FilterStats, FilteredTrail, QualityFilter, RejectReason, Verdict};
pub use sample::{DeliveryId, DriverId, GeoPoint, GpsSample, ShiftId};
pub use segment::{build_segments, haversine_meters, Segment, EARTH_RADIUS_M};
pub use validator::{parse_identifier, validate_point, IdentifierKind};
