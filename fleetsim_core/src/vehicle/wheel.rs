//! Kinematic and inertial state of a single wheel.

use crate::error::{FleetError, FleetResult};
use serde::{Deserialize, Serialize};

/// One wheel of a simulated vehicle.
///
/// Position is expressed in the vehicle frame (x forward, y left-negative /
/// right-positive per the Ackermann convention). The yaw is the steering
/// angle of the wheel about the vertical axis; `spin_vel` is the angular
/// velocity about the axle.
#[derive(Debug, Clone, PartialEq)]
pub struct Wheel {
    /// Longitudinal position on the chassis (m)
    pub x: f64,
    /// Lateral position on the chassis (m)
    pub y: f64,
    /// Wheel mass (kg)
    pub mass: f64,
    /// Wheel width (m), display and contact-patch use only
    pub width: f64,
    /// Wheel diameter (m)
    pub diameter: f64,
    /// Steering angle (rad); mutated by the dynamics step only
    pub yaw: f64,
    /// Angular velocity about the axle (rad/s)
    pub spin_vel: f64,
}

/// Serde-facing wheel parameters, one-to-one with the `<xx_wheel>` XML
/// attributes of the vehicle description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WheelConfig {
    #[serde(default)]
    pub pos: [f64; 2],
    #[serde(default = "defaults::mass")]
    pub mass: f64,
    #[serde(default = "defaults::width")]
    pub width: f64,
    #[serde(default = "defaults::diameter")]
    pub diameter: f64,
}

mod defaults {
    pub fn mass() -> f64 {
        6.0
    }
    pub fn width() -> f64 {
        0.30
    }
    pub fn diameter() -> f64 {
        0.62
    }
}

impl Default for WheelConfig {
    fn default() -> Self {
        Self {
            pos: [0.0, 0.0],
            mass: defaults::mass(),
            width: defaults::width(),
            diameter: defaults::diameter(),
        }
    }
}

impl Wheel {
    /// Build a wheel, validating the physical invariants.
    pub fn new(x: f64, y: f64, mass: f64, width: f64, diameter: f64) -> FleetResult<Self> {
        if diameter <= 0.0 {
            return Err(FleetError::geometry(format!(
                "wheel diameter must be positive (got {diameter})"
            )));
        }
        if mass < 0.0 {
            return Err(FleetError::geometry(format!(
                "wheel mass must be non-negative (got {mass})"
            )));
        }
        Ok(Self {
            x,
            y,
            mass,
            width,
            diameter,
            yaw: 0.0,
            spin_vel: 0.0,
        })
    }

    pub fn from_config(cfg: &WheelConfig) -> FleetResult<Self> {
        Self::new(cfg.pos[0], cfg.pos[1], cfg.mass, cfg.width, cfg.diameter)
    }

    /// Rolling radius (m).
    pub fn radius(&self) -> f64 {
        0.5 * self.diameter
    }

    /// Linear speed of the contact patch implied by the current spin (m/s).
    pub fn ground_speed(&self) -> f64 {
        self.spin_vel * self.radius()
    }

    /// Longitudinal contact force produced by an axle torque (N).
    pub fn contact_force(&self, torque: f64) -> f64 {
        torque / self.radius()
    }

    /// Rotational inertia about the axle, modelling the wheel as a solid
    /// cylinder (kg m^2).
    pub fn spin_inertia(&self) -> f64 {
        0.5 * self.mass * self.radius() * self.radius()
    }

    /// Integrate the wheel spin one step under the given axle torque.
    pub fn integrate_spin(&mut self, torque: f64, dt: f64) {
        let inertia = self.spin_inertia();
        if inertia > 0.0 {
            self.spin_vel += torque / inertia * dt;
        }
    }
}
