//! Parsed vehicle configuration.
//!
//! The scene description is consumed by an external loader; this module
//! defines the configuration structs the core accepts, with a field set
//! matching the vehicle description schema one-to-one. Files in TOML form
//! deserialize straight into [`AckermannConfig`].

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::FleetResult;
use crate::vehicle::wheel::WheelConfig;

/// Chassis parameters and display properties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChassisConfig {
    #[serde(default = "defaults::chassis_mass")]
    pub mass: f64,
    #[serde(default = "defaults::z_min")]
    pub zmin: f64,
    #[serde(default = "defaults::z_max")]
    pub zmax: f64,
    /// Display color, `#rrggbb`
    #[serde(default = "defaults::color")]
    pub color: String,
    /// Chassis polygon in the vehicle frame, implicitly closed. Falls back
    /// to the default shape when absent.
    #[serde(default)]
    pub shape: Option<Vec<[f64; 2]>>,
}

impl ChassisConfig {
    /// The chassis polygon, defaulted when the config carries none.
    pub fn polygon(&self) -> Vec<[f64; 2]> {
        self.shape.clone().unwrap_or_else(defaults::chassis_poly)
    }
}

impl Default for ChassisConfig {
    fn default() -> Self {
        Self {
            mass: defaults::chassis_mass(),
            zmin: defaults::z_min(),
            zmax: defaults::z_max(),
            color: defaults::color(),
            shape: None,
        }
    }
}

/// Controller selection and class-specific parameters, tagged by `class`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "class")]
pub enum ControllerConfig {
    /// Direct per-side torques and a steering angle.
    #[serde(rename = "raw")]
    Raw {
        #[serde(default)]
        torque_left: f64,
        #[serde(default)]
        torque_right: f64,
        #[serde(default)]
        steer_ang: f64,
    },
    /// PID on front wheel speeds, commanded by (speed, steering angle).
    #[serde(rename = "front_steer_pid")]
    FrontSteerPid {
        #[serde(alias = "KP")]
        kp: f64,
        #[serde(alias = "KI")]
        ki: f64,
        #[serde(alias = "KD")]
        kd: f64,
        max_torque: f64,
    },
    /// PID on front wheel speeds, commanded by a twist.
    #[serde(rename = "twist_front_steer_pid")]
    TwistFrontSteerPid {
        #[serde(alias = "KP")]
        kp: f64,
        #[serde(alias = "KI")]
        ki: f64,
        #[serde(alias = "KD")]
        kd: f64,
        max_torque: f64,
    },
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig::Raw {
            torque_left: 0.0,
            torque_right: 0.0,
            steer_ang: 0.0,
        }
    }
}

/// Complete configuration of a four-wheel Ackermann vehicle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckermannConfig {
    #[serde(default)]
    pub chassis: ChassisConfig,
    #[serde(default = "defaults::rl_wheel")]
    pub rl_wheel: WheelConfig,
    #[serde(default = "defaults::rr_wheel")]
    pub rr_wheel: WheelConfig,
    #[serde(default = "defaults::fl_wheel")]
    pub fl_wheel: WheelConfig,
    #[serde(default = "defaults::fr_wheel")]
    pub fr_wheel: WheelConfig,
    /// Optional override of the front axle longitudinal position.
    #[serde(default)]
    pub f_wheels_x: Option<f64>,
    /// Optional override of the front track width.
    #[serde(default)]
    pub f_wheels_d: Option<f64>,
    /// Maximum steering angle (degrees); determines the minimum turn radius.
    #[serde(default = "defaults::max_steer_ang_deg")]
    pub max_steer_ang_deg: f64,
    #[serde(default)]
    pub controller: ControllerConfig,
}

impl Default for AckermannConfig {
    fn default() -> Self {
        Self {
            chassis: ChassisConfig::default(),
            rl_wheel: defaults::rl_wheel(),
            rr_wheel: defaults::rr_wheel(),
            fl_wheel: defaults::fl_wheel(),
            fr_wheel: defaults::fr_wheel(),
            f_wheels_x: None,
            f_wheels_d: None,
            max_steer_ang_deg: defaults::max_steer_ang_deg(),
            controller: ControllerConfig::default(),
        }
    }
}

impl AckermannConfig {
    pub fn from_toml_str(s: &str) -> FleetResult<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> FleetResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

mod defaults {
    use crate::vehicle::wheel::WheelConfig;

    pub fn chassis_mass() -> f64 {
        500.0
    }
    pub fn z_min() -> f64 {
        0.20
    }
    pub fn z_max() -> f64 {
        1.40
    }
    pub fn color() -> String {
        "#e83000".to_string()
    }
    pub fn max_steer_ang_deg() -> f64 {
        30.0
    }

    pub fn chassis_poly() -> Vec<[f64; 2]> {
        vec![
            [-0.8, -1.0],
            [-0.8, 1.0],
            [1.5, 0.9],
            [1.8, 0.8],
            [1.8, -0.8],
            [1.5, -0.9],
        ]
    }

    fn wheel(x: f64, y: f64) -> WheelConfig {
        WheelConfig {
            pos: [x, y],
            ..WheelConfig::default()
        }
    }

    pub fn rl_wheel() -> WheelConfig {
        wheel(0.0, -0.9)
    }
    pub fn rr_wheel() -> WheelConfig {
        wheel(0.0, 0.9)
    }
    pub fn fl_wheel() -> WheelConfig {
        wheel(1.3, -0.9)
    }
    pub fn fr_wheel() -> WheelConfig {
        wheel(1.3, 0.9)
    }
}
