//! HTTP Routes

pub mod mileage;
pub mod telemetry;
