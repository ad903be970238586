//! # FLEETSIM Core
//!
//! Core runtime of the FLEETSIM multi-vehicle 2D simulator:
//!
//! - **Vehicle dynamics**: four-wheel Ackermann vehicles with pluggable
//!   motor controllers, stepped by an external rigid-body integrator
//! - **Messaging fabric**: node registration, topic publishing and service
//!   invocation over TCP, plus the directory server clients register with
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fleetsim_core::vehicle::{AckermannConfig, AckermannDynamics, SimContext};
//!
//! let mut vehicle = AckermannDynamics::from_config(&AckermannConfig::default()).unwrap();
//! let ctx = SimContext { t: 0.0, dt: 0.01 };
//! let torques = vehicle.invoke_motor_controllers(&ctx).unwrap();
//! ```

pub mod comms;
pub mod error;
pub mod vehicle;

// Re-export commonly used types for easy access
pub use comms::{Client, ClientState, DirectoryServer, MessageDescriptor, WireMessage};
pub use error::{FleetError, FleetResult};
pub use vehicle::{AckermannConfig, AckermannDynamics, SimContext};
