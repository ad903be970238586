//! Vehicle telemetry published by the simulator each step.

use fleetsim_core::comms::{FieldKind, MessageDescriptor, WireMessage};
use serde::{Deserialize, Serialize};

use crate::messages::geometry::Pose2D;

/// Per-step state of one simulated vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct VehicleTelemetry {
    /// Simulation time of this sample (s)
    pub sim_time: f64,
    /// Vehicle pose in the world frame
    pub pose: Pose2D,
    /// Steering angle of each wheel, indexed RL, RR, FL, FR (rad)
    pub wheel_yaws: [f64; 4],
    /// Axle torque applied to each wheel this step (Nm)
    pub wheel_torques: [f64; 4],
}

impl WireMessage for VehicleTelemetry {
    fn descriptor() -> MessageDescriptor {
        MessageDescriptor::new("fleetsim.VehicleTelemetry")
            .field("sim_time", FieldKind::F64)
            .field("pose", FieldKind::Message("fleetsim.Pose2D".to_string()))
            .field("wheel_yaws", FieldKind::Repeated(Box::new(FieldKind::F64)))
            .field(
                "wheel_torques",
                FieldKind::Repeated(Box::new(FieldKind::F64)),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_roundtrip_preserves_fields() {
        let sample = VehicleTelemetry {
            sim_time: 12.34,
            pose: Pose2D {
                x: 1.0,
                y: 2.0,
                theta: 0.3,
            },
            wheel_yaws: [0.0, 0.0, 0.394, 0.241],
            wheel_torques: [5.0, 5.0, 0.0, 0.0],
        };
        let back = VehicleTelemetry::decode(&sample.encode().unwrap()).unwrap();
        assert_eq!(sample, back);
    }

    #[test]
    fn descriptor_nests_the_pose_type() {
        let desc = VehicleTelemetry::descriptor();
        assert_eq!(desc.full_name, "fleetsim.VehicleTelemetry");
        assert!(desc
            .fields
            .iter()
            .any(|f| f.kind == FieldKind::Message("fleetsim.Pose2D".to_string())));
    }
}
