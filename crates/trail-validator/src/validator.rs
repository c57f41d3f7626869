//! Identifier and Coordinate Validation

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::sample::GeoPoint;

/// Which kind of record an identifier refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierKind {
    Shift,
    Driver,
    Delivery,
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IdentifierKind::Shift => "shift",
            IdentifierKind::Driver => "driver",
            IdentifierKind::Delivery => "delivery",
        };
        f.write_str(name)
    }
}

/// Parse a raw identifier string into a UUID.
///
/// Leading and trailing whitespace is tolerated; anything else that is not a
/// hyphenated or simple UUID is rejected. The nil UUID is rejected as well,
/// since no record is ever stored under it.
pub fn parse_identifier(kind: IdentifierKind, raw: &str) -> Result<Uuid, ValidationError> {
    let invalid = || ValidationError::InvalidIdentifier {
        kind,
        value: raw.to_string(),
    };

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(invalid());
    }

    let id = Uuid::try_parse(trimmed).map_err(|_| invalid())?;
    if id.is_nil() {
        return Err(invalid());
    }
    Ok(id)
}

fn validate_range(field: &'static str, value: f64, range: (f64, f64)) -> Result<(), ValidationError> {
    // NaN fails both comparisons, so check it explicitly
    if !value.is_finite() || value < range.0 || value > range.1 {
        Err(ValidationError::OutOfRange {
            field,
            value,
            min: range.0,
            max: range.1,
        })
    } else {
        Ok(())
    }
}

/// Validate that a point lies on the globe
pub fn validate_point(point: &GeoPoint) -> Result<(), ValidationError> {
    validate_range("latitude", point.lat, (-90.0, 90.0))?;
    validate_range("longitude", point.lon, (-180.0, 180.0))
}
