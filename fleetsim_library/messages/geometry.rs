//! Geometric wire messages.
//!
//! These are the planar types external processes exchange with simulated
//! vehicles: a twist command matching the controller setpoint surface, and
//! the world-frame pose carried by telemetry.

use fleetsim_core::comms::{FieldKind, MessageDescriptor, WireMessage};
use serde::{Deserialize, Serialize};

/// Planar twist command: longitudinal speed and yaw rate.
///
/// Field-for-field the twist setpoint the vehicle controllers accept, so a
/// message received on the fabric feeds `set_twist_command(vx, omega)`
/// unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Twist2D {
    /// Longitudinal velocity (m/s)
    pub vx: f64,
    /// Yaw rate (rad/s)
    pub omega: f64,
}

impl WireMessage for Twist2D {
    fn descriptor() -> MessageDescriptor {
        MessageDescriptor::new("fleetsim.Twist2D")
            .field("vx", FieldKind::F64)
            .field("omega", FieldKind::F64)
    }
}

/// Planar pose of a vehicle in the world frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Pose2D {
    /// X position (m)
    pub x: f64,
    /// Y position (m)
    pub y: f64,
    /// Heading (rad)
    pub theta: f64,
}

impl WireMessage for Pose2D {
    fn descriptor() -> MessageDescriptor {
        MessageDescriptor::new("fleetsim.Pose2D")
            .field("x", FieldKind::F64)
            .field("y", FieldKind::F64)
            .field("theta", FieldKind::F64)
    }
}
