//! Four-wheel Ackermann-steered vehicle dynamics.
//!
//! Owns the chassis description, the four wheels and the installed motor
//! controller. Each step the controller produces per-wheel torques and an
//! equivalent centerline steering angle; the Ackermann resolver turns that
//! angle into the exact yaw of each front wheel so both rotation axes meet
//! the rear-axle line at a single point.

use std::f64::consts::FRAC_PI_2;

use log::debug;

use crate::error::{FleetError, FleetResult};
use crate::vehicle::config::AckermannConfig;
use crate::vehicle::controllers::{
    AckermannController, ControllerInput, SteeringGeometry,
};
use crate::vehicle::wheel::Wheel;
use crate::vehicle::{SimContext, LocalTwist};

/// Wheel indices: rear-left, rear-right, front-left, front-right.
pub const WHEEL_RL: usize = 0;
pub const WHEEL_RR: usize = 1;
pub const WHEEL_FL: usize = 2;
pub const WHEEL_FR: usize = 3;

/// Margin below pi/2 that the clamped steering angle must respect so the
/// cotangent stays bounded.
const STEER_EPS: f64 = 0.01;

/// A four-wheel Ackermann vehicle.
#[derive(Debug)]
pub struct AckermannDynamics {
    wheels: [Wheel; 4],
    chassis_poly: Vec<[f64; 2]>,
    chassis_mass: f64,
    chassis_z_min: f64,
    chassis_z_max: f64,
    chassis_color: String,
    max_steer_ang: f64,
    controller: Option<AckermannController>,
}

impl AckermannDynamics {
    /// Build a vehicle from its parsed configuration, validating all
    /// geometry invariants.
    pub fn from_config(cfg: &AckermannConfig) -> FleetResult<Self> {
        let mut wheels = [
            Wheel::from_config(&cfg.rl_wheel)?,
            Wheel::from_config(&cfg.rr_wheel)?,
            Wheel::from_config(&cfg.fl_wheel)?,
            Wheel::from_config(&cfg.fr_wheel)?,
        ];

        if let Some(front_x) = cfg.f_wheels_x {
            wheels[WHEEL_FL].x = front_x;
            wheels[WHEEL_FR].x = front_x;
        }
        if let Some(front_d) = cfg.f_wheels_d {
            wheels[WHEEL_FL].y = -0.5 * front_d;
            wheels[WHEEL_FR].y = 0.5 * front_d;
        }

        let max_steer_ang = cfg.max_steer_ang_deg.to_radians();
        if !(0.0..FRAC_PI_2).contains(&max_steer_ang) || max_steer_ang == 0.0 {
            return Err(FleetError::geometry(format!(
                "max steering angle must lie in (0, 90) deg (got {} deg)",
                cfg.max_steer_ang_deg
            )));
        }

        if wheels[WHEEL_FL].x != wheels[WHEEL_FR].x || wheels[WHEEL_RL].x != wheels[WHEEL_RR].x {
            return Err(FleetError::geometry(
                "front wheels and rear wheels must each share an axle x position",
            ));
        }
        if wheels[WHEEL_FL].x - wheels[WHEEL_RL].x <= 0.0 {
            return Err(FleetError::geometry(format!(
                "wheelbase must be positive (front x = {}, rear x = {})",
                wheels[WHEEL_FL].x, wheels[WHEEL_RL].x
            )));
        }
        if !(wheels[WHEEL_FL].y < 0.0 && wheels[WHEEL_FR].y > 0.0) {
            return Err(FleetError::geometry(
                "front wheels must straddle the centerline (FL left, FR right)",
            ));
        }

        let chassis_poly = cfg.chassis.polygon();
        if chassis_poly.len() < 3 {
            return Err(FleetError::geometry(
                "chassis polygon needs at least 3 vertices",
            ));
        }

        let geom = SteeringGeometry {
            front_x: wheels[WHEEL_FL].x,
            front_track: wheels[WHEEL_FR].y - wheels[WHEEL_FL].y,
            wheelbase: wheels[WHEEL_FL].x - wheels[WHEEL_RL].x,
        };
        let controller = AckermannController::from_config(&cfg.controller, geom);
        debug!(
            "ackermann vehicle: wheelbase={:.3} m, track={:.3} m, controller={}",
            geom.wheelbase,
            geom.front_track,
            controller.class_name()
        );

        Ok(Self {
            wheels,
            chassis_poly,
            chassis_mass: cfg.chassis.mass,
            chassis_z_min: cfg.chassis.zmin,
            chassis_z_max: cfg.chassis.zmax,
            chassis_color: cfg.chassis.color.clone(),
            max_steer_ang,
            controller: Some(controller),
        })
    }

    /// Longitudinal wheelbase `l` (m).
    pub fn wheelbase(&self) -> f64 {
        self.wheels[WHEEL_FL].x - self.wheels[WHEEL_RL].x
    }

    /// Front track width `w` (m).
    pub fn front_track(&self) -> f64 {
        self.wheels[WHEEL_FR].y - self.wheels[WHEEL_FL].y
    }

    pub fn max_steer_angle(&self) -> f64 {
        self.max_steer_ang
    }

    pub fn set_max_steer_angle(&mut self, val: f64) {
        self.max_steer_ang = val;
    }

    pub fn wheels(&self) -> &[Wheel; 4] {
        &self.wheels
    }

    pub fn wheels_mut(&mut self) -> &mut [Wheel; 4] {
        &mut self.wheels
    }

    pub fn chassis_mass(&self) -> f64 {
        self.chassis_mass
    }

    pub fn chassis_polygon(&self) -> &[[f64; 2]] {
        &self.chassis_poly
    }

    pub fn chassis_z_extents(&self) -> (f64, f64) {
        (self.chassis_z_min, self.chassis_z_max)
    }

    pub fn chassis_color(&self) -> &str {
        &self.chassis_color
    }

    pub fn controller(&self) -> Option<&AckermannController> {
        self.controller.as_ref()
    }

    pub fn controller_mut(&mut self) -> Option<&mut AckermannController> {
        self.controller.as_mut()
    }

    pub fn set_controller(&mut self, controller: Option<AckermannController>) {
        self.controller = controller;
    }

    /// Exact front wheel yaw angles for an equivalent centerline steering
    /// angle, honoring the steering limit.
    ///
    /// Returns `(fl, fr)`. Both share the sign of `desired`, the inner wheel
    /// turns at least as much as the outer, and both magnitudes stay within
    /// the maximum steering angle.
    pub fn front_wheel_angles(&self, desired: f64) -> FleetResult<(f64, f64)> {
        let l = self.wheelbase();
        let w = self.front_track();
        if l <= 0.0 {
            return Err(FleetError::geometry(format!(
                "wheelbase must be positive (got {l})"
            )));
        }

        let delta = desired.abs().min(self.max_steer_ang);
        if delta >= FRAC_PI_2 - STEER_EPS {
            return Err(FleetError::geometry(format!(
                "clamped steering angle {delta} rad too close to pi/2"
            )));
        }
        if delta == 0.0 {
            return Ok((0.0, 0.0));
        }

        let w_l = w / l;
        let cot_delta = 1.0 / delta.tan();
        let outer = (1.0 / (cot_delta + 0.5 * w_l)).atan().min(self.max_steer_ang);
        let inner_denom = cot_delta - 0.5 * w_l;
        let inner = if inner_denom > 0.0 {
            (1.0 / inner_denom).atan().min(self.max_steer_ang)
        } else {
            // Turn center inside the front track; the inner wheel saturates.
            self.max_steer_ang
        };

        // desired > 0 turns left: FL is the inner wheel. Negative angles
        // swap the roles and flip both signs.
        Ok(if desired > 0.0 {
            (inner, outer)
        } else {
            (-outer, -inner)
        })
    }

    /// Local twist estimate reconstructed from the rear wheel odometry.
    pub fn velocity_local_odo_estimate(&self) -> LocalTwist {
        let v_l = self.wheels[WHEEL_RL].ground_speed();
        let v_r = self.wheels[WHEEL_RR].ground_speed();
        let track = self.wheels[WHEEL_RR].y - self.wheels[WHEEL_RL].y;
        LocalTwist {
            vx: 0.5 * (v_l + v_r),
            vy: 0.0,
            omega: if track > 0.0 { (v_r - v_l) / track } else { 0.0 },
        }
    }

    /// Run the installed motor controller for one step and solve the
    /// steering geometry.
    ///
    /// Returns the per-wheel torque vector (indexed RL, RR, FL, FR) for the
    /// rigid-body integrator; the front wheel yaws are written in place. A
    /// missing controller yields all-zero torques; a resolver failure aborts
    /// the step.
    pub fn invoke_motor_controllers(&mut self, ctx: &SimContext) -> FleetResult<[f64; 4]> {
        let odometry = self.velocity_local_odo_estimate();
        let input = ControllerInput {
            context: *ctx,
            odometry,
        };

        let co = match self.controller.as_mut() {
            Some(controller) => controller.step(&input),
            None => return Ok([0.0; 4]),
        };

        let torques = [co.rl_torque, co.rr_torque, co.fl_torque, co.fr_torque];

        let (fl_yaw, fr_yaw) = self.front_wheel_angles(co.steer_ang)?;
        self.wheels[WHEEL_FL].yaw = fl_yaw;
        self.wheels[WHEEL_FR].yaw = fr_yaw;

        Ok(torques)
    }

    /// One full vehicle step: controller + steering resolution + wheel spin
    /// integration. Returns the torque vector handed to the rigid-body
    /// integrator.
    pub fn tick(&mut self, ctx: &SimContext) -> FleetResult<[f64; 4]> {
        let torques = self.invoke_motor_controllers(ctx)?;
        for (wheel, torque) in self.wheels.iter_mut().zip(torques) {
            wheel.integrate_spin(torque, ctx.dt);
        }
        Ok(torques)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vehicle::config::ControllerConfig;
    use crate::vehicle::controllers::RawSetpoint;

    /// l = 1.3, w = 1.0, max steer 0.52 rad: the geometry used across the
    /// resolver tests.
    fn test_vehicle() -> AckermannDynamics {
        let cfg = AckermannConfig {
            f_wheels_x: Some(1.3),
            f_wheels_d: Some(1.0),
            max_steer_ang_deg: 0.52_f64.to_degrees(),
            ..AckermannConfig::default()
        };
        AckermannDynamics::from_config(&cfg).unwrap()
    }

    #[test]
    fn resolver_matches_reference_angles() {
        let veh = test_vehicle();
        let (fl, fr) = veh.front_wheel_angles(0.3).unwrap();

        let w_l = 1.0 / 1.3;
        let cot = 1.0 / 0.3_f64.tan();
        let inner = (1.0 / (cot - 0.5 * w_l)).atan();
        let outer = (1.0 / (cot + 0.5 * w_l)).atan();

        // Positive angle turns left: FL is inner.
        assert!((fl - inner).abs() < 1e-4, "fl = {fl}, expected {inner}");
        assert!((fr - outer).abs() < 1e-4, "fr = {fr}, expected {outer}");
        assert!(fl > fr);
    }

    #[test]
    fn resolver_mirrors_for_right_turns() {
        let veh = test_vehicle();
        let (fl_l, fr_l) = veh.front_wheel_angles(0.3).unwrap();
        let (fl_r, fr_r) = veh.front_wheel_angles(-0.3).unwrap();
        // Roles swap and signs flip.
        assert!((fl_r + fr_l).abs() < 1e-12);
        assert!((fr_r + fl_l).abs() < 1e-12);
    }

    #[test]
    fn resolver_clamps_to_max_steer() {
        let veh = test_vehicle();
        let (fl, fr) = veh.front_wheel_angles(1.5).unwrap();
        assert!(fl.abs() <= 0.52 + 1e-12);
        assert!(fr.abs() <= 0.52 + 1e-12);
        assert!(fl > 0.0 && fr > 0.0);
    }

    #[test]
    fn resolver_degenerate_zero() {
        let veh = test_vehicle();
        assert_eq!(veh.front_wheel_angles(0.0).unwrap(), (0.0, 0.0));
    }

    #[test]
    fn inner_wheel_turns_strictly_more() {
        let veh = test_vehicle();
        for delta in [0.05, 0.15, 0.3, 0.5, 1.0, -0.05, -0.3, -1.0] {
            let (fl, fr) = veh.front_wheel_angles(delta).unwrap();
            assert_eq!(fl.signum(), delta.signum());
            assert_eq!(fr.signum(), delta.signum());
            let (inner, outer) = if delta > 0.0 { (fl, fr) } else { (fr, fl) };
            assert!(
                inner.abs() > outer.abs(),
                "delta={delta}: inner={inner}, outer={outer}"
            );
        }
    }

    #[test]
    fn zero_wheelbase_is_rejected_at_construction() {
        let cfg = AckermannConfig {
            f_wheels_x: Some(0.0),
            ..AckermannConfig::default()
        };
        let err = AckermannDynamics::from_config(&cfg).unwrap_err();
        assert!(matches!(err, FleetError::Geometry(_)));
    }

    #[test]
    fn step_writes_front_yaws_and_returns_torques() {
        let mut veh = test_vehicle();
        if let Some(c) = veh.controller() {
            assert!(c.set_raw_command(2.0, 3.0, 0.3));
        }
        let ctx = SimContext { t: 0.0, dt: 0.01 };
        let torques = veh.invoke_motor_controllers(&ctx).unwrap();
        assert_eq!(torques, [2.0, 3.0, 2.0, 3.0]);
        let (fl_exp, fr_exp) = veh.front_wheel_angles(0.3).unwrap();
        assert_eq!(veh.wheels()[WHEEL_FL].yaw, fl_exp);
        assert_eq!(veh.wheels()[WHEEL_FR].yaw, fr_exp);
        assert_eq!(veh.wheels()[WHEEL_RL].yaw, 0.0);
        assert_eq!(veh.wheels()[WHEEL_RR].yaw, 0.0);
    }

    #[test]
    fn missing_controller_yields_zero_torques() {
        let mut veh = test_vehicle();
        veh.set_controller(None);
        let ctx = SimContext { t: 0.0, dt: 0.01 };
        let torques = veh.invoke_motor_controllers(&ctx).unwrap();
        assert_eq!(torques, [0.0; 4]);
    }

    #[test]
    fn odometry_estimate_from_rear_wheels() {
        let mut veh = test_vehicle();
        let r = veh.wheels()[WHEEL_RL].radius();
        veh.wheels_mut()[WHEEL_RL].spin_vel = 2.0 / r;
        veh.wheels_mut()[WHEEL_RR].spin_vel = 2.0 / r;
        let odo = veh.velocity_local_odo_estimate();
        assert!((odo.vx - 2.0).abs() < 1e-12);
        assert!(odo.omega.abs() < 1e-12);

        // Differential spin produces a yaw rate.
        veh.wheels_mut()[WHEEL_RR].spin_vel = 3.0 / r;
        let odo = veh.velocity_local_odo_estimate();
        assert!(odo.omega > 0.0);
    }

    #[test]
    fn tick_integrates_wheel_spin() {
        let cfg = AckermannConfig {
            controller: ControllerConfig::Raw {
                torque_left: 5.0,
                torque_right: 5.0,
                steer_ang: 0.0,
            },
            ..AckermannConfig::default()
        };
        let mut veh = AckermannDynamics::from_config(&cfg).unwrap();
        let ctx = SimContext { t: 0.0, dt: 0.01 };
        veh.tick(&ctx).unwrap();
        assert!(veh.wheels()[WHEEL_RL].spin_vel > 0.0);
        assert!(veh.wheels()[WHEEL_FL].spin_vel > 0.0);
    }

    #[test]
    fn raw_setpoint_default_is_zero() {
        let sp = RawSetpoint::default();
        assert_eq!(sp.torque_left, 0.0);
        assert_eq!(sp.steer_ang, 0.0);
    }
}
