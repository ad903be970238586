//! # FLEETSIM - Fleet Simulator
//!
//! FLEETSIM simulates fleets of planar vehicles and connects them to
//! external processes through a lightweight pub/sub + service messaging
//! fabric.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fleetsim::prelude::*;
//! use fleetsim::library::messages::telemetry::VehicleTelemetry;
//!
//! let mut vehicle = AckermannDynamics::from_config(&AckermannConfig::default()).unwrap();
//! let mut client = Client::new("vehicle_1").unwrap();
//! client.connect().unwrap();
//! client.advertise_topic::<VehicleTelemetry>("vehicle_1/telemetry").unwrap();
//!
//! let ctx = SimContext { t: 0.0, dt: 0.01 };
//! let torques = vehicle.invoke_motor_controllers(&ctx).unwrap();
//! # let _ = torques;
//! ```

// Re-export core components
pub use fleetsim_core::{self, *};

// Re-export the standard message library with an alias
pub use fleetsim_library as library;

// Re-export serde at crate root for downstream message definitions
pub use serde;

/// The FLEETSIM prelude: everything needed to drive a vehicle over the
/// fabric. Just add `use fleetsim::prelude::*;` to get started.
pub mod prelude {
    // Vehicle dynamics
    pub use fleetsim_core::vehicle::{
        AckermannConfig, AckermannController, AckermannDynamics, ControllerConfig, LocalTwist,
        SimContext, Wheel, WHEEL_FL, WHEEL_FR, WHEEL_RL, WHEEL_RR,
    };

    // Messaging fabric
    pub use fleetsim_core::comms::{
        Client, ClientState, DirectoryServer, MessageDescriptor, Subscription, WireMessage,
    };

    // Errors
    pub use fleetsim_core::error::{FleetError, FleetResult};

    // Standard messages
    pub use fleetsim_library::{Pose2D, Twist2D, VehicleTelemetry};
}
