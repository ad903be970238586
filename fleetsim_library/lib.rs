//! # FLEETSIM Standard Library
//!
//! Shared message types for the FLEETSIM messaging fabric.
//!
//! ```text
//! fleetsim_library/
//! ── messages/       # Wire message types with descriptors
//! ```
//!
//! Every type here implements [`fleetsim_core::comms::WireMessage`], so it
//! can be advertised, published, subscribed to and passed through services
//! with full type introspection on the wire.

pub mod messages;

pub use messages::geometry::{Pose2D, Twist2D};
pub use messages::telemetry::VehicleTelemetry;
