//! Vehicle dynamics: wheels, motor controllers and the four-wheel
//! Ackermann-steered vehicle model.
//!
//! The rigid-body integrator that consumes the per-wheel torques lives
//! outside this crate; this module produces the torque vector and keeps the
//! wheel steering angles consistent with the Ackermann constraint each step.

pub mod ackermann;
pub mod config;
pub mod controllers;
pub mod pid;
pub mod wheel;

pub use ackermann::{AckermannDynamics, WHEEL_FL, WHEEL_FR, WHEEL_RL, WHEEL_RR};
pub use config::{AckermannConfig, ChassisConfig, ControllerConfig};
pub use controllers::{
    AckermannController, ControllerInput, ControllerOutput, TwistCommandHandle,
};
pub use pid::PidController;
pub use wheel::{Wheel, WheelConfig};

/// Simulation step context, passed by value into controllers each step.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimContext {
    /// Current simulation time (s)
    pub t: f64,
    /// Step size (s)
    pub dt: f64,
}

/// Planar twist in the vehicle local frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LocalTwist {
    /// Longitudinal velocity (m/s)
    pub vx: f64,
    /// Lateral velocity (m/s)
    pub vy: f64,
    /// Yaw rate (rad/s)
    pub omega: f64,
}
