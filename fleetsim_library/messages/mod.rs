//! Standard wire message types.

pub mod geometry;
pub mod telemetry;
