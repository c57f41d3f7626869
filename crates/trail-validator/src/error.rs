//! Validation Error Types

use thiserror::Error;

use crate::validator::IdentifierKind;

/// Errors raised before any store access is attempted
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// Identifier is not a well-formed UUID
    #[error("Invalid {kind} identifier: {value:?}")]
    InvalidIdentifier { kind: IdentifierKind, value: String },

    /// Window end does not come after its start
    #[error("Invalid window: end {end} is not after start {start}")]
    InvalidWindow { start: String, end: String },

    /// Coordinate outside the valid geographic range
    #[error("{field} value {value} is out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}
