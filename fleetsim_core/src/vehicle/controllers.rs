//! Motor controllers for the Ackermann vehicle.
//!
//! A controller maps high-level setpoints (raw torques, a twist command, or a
//! steer+speed command) to per-wheel torques plus one equivalent centerline
//! steering angle. Controllers are selected by the `class` field of the
//! vehicle configuration and owned exclusively by the vehicle; geometry
//! constants are captured at construction so no back-reference to the vehicle
//! is needed at step time.
//!
//! Setpoints sit behind a mutex so external command threads (teleop, fabric
//! service handlers) and the simulation step thread see consistent snapshots.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::vehicle::config::ControllerConfig;
use crate::vehicle::pid::PidController;
use crate::vehicle::{SimContext, LocalTwist};

/// Smallest linear speed used when recovering the equivalent steering angle
/// from a twist command, to keep the arctan argument bounded.
const MIN_LIN_SPEED: f64 = 1e-3;

/// Per-step input handed to a controller by the vehicle.
#[derive(Debug, Clone, Copy)]
pub struct ControllerInput {
    pub context: SimContext,
    /// Local twist estimate reconstructed from wheel odometry.
    pub odometry: LocalTwist,
}

/// Per-step controller output: four wheel torques (Nm) and the equivalent
/// centerline steering angle (rad).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControllerOutput {
    pub fl_torque: f64,
    pub fr_torque: f64,
    pub rl_torque: f64,
    pub rr_torque: f64,
    pub steer_ang: f64,
}

/// Geometry constants a controller captures from its vehicle at construction.
#[derive(Debug, Clone, Copy)]
pub struct SteeringGeometry {
    /// Longitudinal position of the front axle in the vehicle frame (m)
    pub front_x: f64,
    /// Distance between the two front wheels (m), > 0
    pub front_track: f64,
    /// Longitudinal distance between front and rear axles (m), > 0
    pub wheelbase: f64,
}

/// Raw torque/steer setpoints for [`RawForcesController`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RawSetpoint {
    /// Torque applied to both left wheels (Nm)
    pub torque_left: f64,
    /// Torque applied to both right wheels (Nm)
    pub torque_right: f64,
    /// Steering angle passed through unchanged (rad)
    pub steer_ang: f64,
}

/// Twist setpoints for [`TwistFrontSteerPidController`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TwistSetpoint {
    /// Desired longitudinal speed (m/s)
    pub lin_speed: f64,
    /// Desired yaw rate (rad/s)
    pub ang_speed: f64,
}

/// Steer+speed setpoints for [`FrontSteerPidController`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SteerSetpoint {
    /// Desired longitudinal speed (m/s)
    pub lin_speed: f64,
    /// Desired centerline steering angle (rad)
    pub steer_ang: f64,
}

/// Cloneable handle for installing twist commands from other threads
/// (teleop, fabric service handlers). The step thread reads one consistent
/// snapshot per step.
#[derive(Debug, Clone)]
pub struct TwistCommandHandle {
    setpoint: Arc<Mutex<TwistSetpoint>>,
}

impl TwistCommandHandle {
    pub fn set(&self, lin_speed: f64, ang_speed: f64) {
        *self.setpoint.lock() = TwistSetpoint {
            lin_speed,
            ang_speed,
        };
    }

    pub fn get(&self) -> TwistSetpoint {
        *self.setpoint.lock()
    }
}

/// Stateless pass-through of raw per-side torques and a steering angle.
#[derive(Debug, Clone)]
pub struct RawForcesController {
    setpoint: Arc<Mutex<RawSetpoint>>,
}

impl RawForcesController {
    pub fn new(initial: RawSetpoint) -> Self {
        Self {
            setpoint: Arc::new(Mutex::new(initial)),
        }
    }

    pub fn set_command(&self, torque_left: f64, torque_right: f64, steer_ang: f64) {
        *self.setpoint.lock() = RawSetpoint {
            torque_left,
            torque_right,
            steer_ang,
        };
    }

    fn step(&mut self, _input: &ControllerInput) -> ControllerOutput {
        let sp = *self.setpoint.lock();
        ControllerOutput {
            fl_torque: sp.torque_left,
            fr_torque: sp.torque_right,
            rl_torque: sp.torque_left,
            rr_torque: sp.torque_right,
            steer_ang: sp.steer_ang,
        }
    }
}

/// PID controller driving the two front wheels from a twist command.
///
/// The per-wheel speed target comes from rigid-body kinematics of the
/// commanded twist at the wheel position; the measurement comes from the
/// vehicle's odometry estimate. One PID per front wheel, outputs clamped to
/// the configured maximum torque. Rear torques are zero.
#[derive(Debug, Clone)]
pub struct TwistFrontSteerPidController {
    setpoint: Arc<Mutex<TwistSetpoint>>,
    geom: SteeringGeometry,
    // [0]: front-left, [1]: front-right
    pid: [PidController; 2],
}

impl TwistFrontSteerPidController {
    pub fn new(kp: f64, ki: f64, kd: f64, max_torque: f64, geom: SteeringGeometry) -> Self {
        Self {
            setpoint: Arc::new(Mutex::new(TwistSetpoint::default())),
            geom,
            pid: [
                PidController::new(kp, ki, kd, max_torque),
                PidController::new(kp, ki, kd, max_torque),
            ],
        }
    }

    pub fn set_twist(&self, lin_speed: f64, ang_speed: f64) {
        *self.setpoint.lock() = TwistSetpoint {
            lin_speed,
            ang_speed,
        };
    }

    pub fn geometry(&self) -> SteeringGeometry {
        self.geom
    }

    /// Handle for installing twist commands from other threads.
    pub fn command_handle(&self) -> TwistCommandHandle {
        TwistCommandHandle {
            setpoint: Arc::clone(&self.setpoint),
        }
    }

    /// Longitudinal speed of a wheel at `(x, y)` with heading `yaw`, under
    /// the given body twist.
    fn wheel_long_speed(twist: LocalTwist, x: f64, y: f64, yaw: f64) -> f64 {
        let vx_p = twist.vx - twist.omega * y;
        let vy_p = twist.vy + twist.omega * x;
        yaw.cos() * vx_p + yaw.sin() * vy_p
    }

    fn step(&mut self, input: &ControllerInput) -> ControllerOutput {
        let sp = *self.setpoint.lock();
        let dt = input.context.dt;

        let steer = (sp.ang_speed * self.geom.wheelbase / sp.lin_speed.abs().max(MIN_LIN_SPEED))
            .atan();

        let desired = LocalTwist {
            vx: sp.lin_speed,
            vy: 0.0,
            omega: sp.ang_speed,
        };

        let half_track = 0.5 * self.geom.front_track;
        let mut torques = [0.0; 2];
        for (i, y) in [-half_track, half_track].into_iter().enumerate() {
            let target = Self::wheel_long_speed(desired, self.geom.front_x, y, steer);
            let measured = Self::wheel_long_speed(input.odometry, self.geom.front_x, y, steer);
            torques[i] = self.pid[i].compute(target - measured, dt);
        }

        ControllerOutput {
            fl_torque: torques[0],
            fr_torque: torques[1],
            rl_torque: 0.0,
            rr_torque: 0.0,
            steer_ang: steer,
        }
    }
}

/// PID controller driven by a (speed, steering angle) command pair.
///
/// Converts the command into a twist with the bicycle model and delegates to
/// [`TwistFrontSteerPidController`].
#[derive(Debug, Clone)]
pub struct FrontSteerPidController {
    setpoint: Arc<Mutex<SteerSetpoint>>,
    inner: TwistFrontSteerPidController,
}

impl FrontSteerPidController {
    pub fn new(kp: f64, ki: f64, kd: f64, max_torque: f64, geom: SteeringGeometry) -> Self {
        Self {
            setpoint: Arc::new(Mutex::new(SteerSetpoint::default())),
            inner: TwistFrontSteerPidController::new(kp, ki, kd, max_torque, geom),
        }
    }

    pub fn set_command(&self, lin_speed: f64, steer_ang: f64) {
        *self.setpoint.lock() = SteerSetpoint {
            lin_speed,
            steer_ang,
        };
    }

    fn step(&mut self, input: &ControllerInput) -> ControllerOutput {
        let sp = *self.setpoint.lock();
        // Bicycle model: w_z = v_x * tan(delta) / l
        let ang_speed = sp.lin_speed * sp.steer_ang.tan() / self.inner.geometry().wheelbase;
        self.inner.set_twist(sp.lin_speed, ang_speed);
        self.inner.step(input)
    }
}

/// The controller installed on an Ackermann vehicle, selected by the config
/// `class` field.
#[derive(Debug, Clone)]
pub enum AckermannController {
    RawForces(RawForcesController),
    FrontSteerPid(FrontSteerPidController),
    TwistFrontSteerPid(TwistFrontSteerPidController),
}

impl AckermannController {
    /// Build the controller named by the configuration.
    pub fn from_config(cfg: &ControllerConfig, geom: SteeringGeometry) -> Self {
        match *cfg {
            ControllerConfig::Raw {
                torque_left,
                torque_right,
                steer_ang,
            } => AckermannController::RawForces(RawForcesController::new(RawSetpoint {
                torque_left,
                torque_right,
                steer_ang,
            })),
            ControllerConfig::FrontSteerPid {
                kp,
                ki,
                kd,
                max_torque,
            } => AckermannController::FrontSteerPid(FrontSteerPidController::new(
                kp, ki, kd, max_torque, geom,
            )),
            ControllerConfig::TwistFrontSteerPid {
                kp,
                ki,
                kd,
                max_torque,
            } => AckermannController::TwistFrontSteerPid(TwistFrontSteerPidController::new(
                kp, ki, kd, max_torque, geom,
            )),
        }
    }

    /// The config-facing class name of this controller.
    pub fn class_name(&self) -> &'static str {
        match self {
            AckermannController::RawForces(_) => "raw",
            AckermannController::FrontSteerPid(_) => "front_steer_pid",
            AckermannController::TwistFrontSteerPid(_) => "twist_front_steer_pid",
        }
    }

    /// Advance one control step.
    pub fn step(&mut self, input: &ControllerInput) -> ControllerOutput {
        match self {
            AckermannController::RawForces(c) => c.step(input),
            AckermannController::FrontSteerPid(c) => c.step(input),
            AckermannController::TwistFrontSteerPid(c) => c.step(input),
        }
    }

    /// Handle for installing twist commands from other threads, when this
    /// controller class accepts them.
    pub fn twist_command_handle(&self) -> Option<TwistCommandHandle> {
        match self {
            AckermannController::TwistFrontSteerPid(c) => Some(c.command_handle()),
            _ => None,
        }
    }

    /// Install a live twist command. Returns true iff this controller class
    /// accepts twist commands.
    pub fn set_twist_command(&self, vx: f64, wz: f64) -> bool {
        match self {
            AckermannController::TwistFrontSteerPid(c) => {
                c.set_twist(vx, wz);
                true
            }
            _ => false,
        }
    }

    /// Install raw per-side torques and a steering angle. Returns true iff
    /// this controller class accepts raw commands.
    pub fn set_raw_command(&self, torque_left: f64, torque_right: f64, steer_ang: f64) -> bool {
        match self {
            AckermannController::RawForces(c) => {
                c.set_command(torque_left, torque_right, steer_ang);
                true
            }
            _ => false,
        }
    }

    /// Install a (speed, steering angle) command. Returns true iff this
    /// controller class accepts steer+speed commands.
    pub fn set_steer_speed_command(&self, lin_speed: f64, steer_ang: f64) -> bool {
        match self {
            AckermannController::FrontSteerPid(c) => {
                c.set_command(lin_speed, steer_ang);
                true
            }
            _ => false,
        }
    }
}
