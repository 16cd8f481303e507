//! # Vehicle model
//!
//! Shared vehicle types and the kinematic bicycle model used both for latency compensation and
//! as the prediction model inside the optimiser.
//!
//! Sign convention: positive steering reduces the heading, so a left turn needs a negative
//! steering demand.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use nalgebra::{Isometry2, Vector2, Vector6};
use serde::{Deserialize, Serialize};
use util::maths::{clamp, lin_map, wrap_to_pi};

use crate::config::{require, require_positive, ConfigError};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of elements in the full vehicle state.
pub const STATE_DIM: usize = 6;

/// Number of actuators (steering and throttle).
pub const ACTUATOR_DIM: usize = 2;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Planar pose of the vehicle.
///
/// The heading is always wrapped into (-pi, pi].
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub x_m: f64,
    pub y_m: f64,
    pub heading_rad: f64,
}

/// Position, heading and speed of the vehicle, the part of the state the bicycle model acts on.
///
/// Heading is not wrapped, so repeated steps stay continuous.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct Kinematics {
    pub x_m: f64,
    pub y_m: f64,
    pub heading_rad: f64,
    pub speed_ms: f64,
}

/// Full state used by the optimiser.
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VehicleState {
    pub x_m: f64,
    pub y_m: f64,
    pub heading_rad: f64,
    pub speed_ms: f64,

    /// Cross track error
    pub cte_m: f64,

    /// Heading error
    pub epsi_rad: f64,
}

/// Actuator demand in model units.
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Actuation {
    /// Units: radians
    pub steer_rad: f64,

    /// Units: acceleration per unit time, in [-1, 1]
    pub throttle: f64,
}

/// Actuator command at the external interface, both members normalised to [-1, 1].
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActuatorCommand {
    pub steering: f64,
    pub throttle: f64,
}

/// Physical constants and actuator limits of the vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleParams {
    /// Distance between the centre of gravity and the front axle.
    ///
    /// Units: meters
    pub lf_m: f64,

    /// Maximum steering angle magnitude. The normalised steering command of 1 maps onto this.
    ///
    /// Units: radians
    pub max_steer_rad: f64,

    /// Lowest allowed throttle, must be inside [-1, 1].
    pub min_throttle: f64,

    /// Highest allowed throttle, must be inside [-1, 1].
    pub max_throttle: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// ------------------------------------------------------------------------------------------------

impl Pose {
    /// Create a new pose, wrapping the heading.
    pub fn new(x_m: f64, y_m: f64, heading_rad: f64) -> Self {
        Self {
            x_m,
            y_m,
            heading_rad: wrap_to_pi(heading_rad),
        }
    }

    /// The body-to-map isometry of this pose.
    pub fn isometry(&self) -> Isometry2<f64> {
        Isometry2::new(Vector2::new(self.x_m, self.y_m), self.heading_rad)
    }

    pub fn is_finite(&self) -> bool {
        self.x_m.is_finite() && self.y_m.is_finite() && self.heading_rad.is_finite()
    }
}

impl Kinematics {
    pub fn from_pose(pose: &Pose, speed_ms: f64) -> Self {
        Self {
            x_m: pose.x_m,
            y_m: pose.y_m,
            heading_rad: pose.heading_rad,
            speed_ms,
        }
    }

    /// Pose of this state, with the heading wrapped.
    pub fn pose(&self) -> Pose {
        Pose::new(self.x_m, self.y_m, self.heading_rad)
    }
}

impl VehicleState {
    /// Build the state in the order used by the optimiser, `[x, y, psi, v, cte, epsi]`.
    pub fn to_vector(&self) -> Vector6<f64> {
        Vector6::new(
            self.x_m,
            self.y_m,
            self.heading_rad,
            self.speed_ms,
            self.cte_m,
            self.epsi_rad,
        )
    }

    pub fn from_vector(v: &Vector6<f64>) -> Self {
        Self {
            x_m: v[0],
            y_m: v[1],
            heading_rad: v[2],
            speed_ms: v[3],
            cte_m: v[4],
            epsi_rad: v[5],
        }
    }

    pub fn kinematics(&self) -> Kinematics {
        Kinematics {
            x_m: self.x_m,
            y_m: self.y_m,
            heading_rad: self.heading_rad,
            speed_ms: self.speed_ms,
        }
    }
}

impl Actuation {
    pub fn new(steer_rad: f64, throttle: f64) -> Self {
        Self {
            steer_rad,
            throttle,
        }
    }

    pub fn to_vector(&self) -> Vector2<f64> {
        Vector2::new(self.steer_rad, self.throttle)
    }

    /// Clamp both demands into the vehicle's limits.
    pub fn clamped(&self, params: &VehicleParams) -> Self {
        Self {
            steer_rad: clamp(
                self.steer_rad,
                -params.max_steer_rad,
                params.max_steer_rad,
            ),
            throttle: clamp(self.throttle, params.min_throttle, params.max_throttle),
        }
    }
}

impl ActuatorCommand {
    pub fn new(steering: f64, throttle: f64) -> Self {
        Self { steering, throttle }
    }

    pub fn is_finite(&self) -> bool {
        self.steering.is_finite() && self.throttle.is_finite()
    }

    /// Convert the normalised command into model units.
    pub fn to_actuation(&self, params: &VehicleParams) -> Actuation {
        Actuation {
            steer_rad: lin_map(
                (-1.0, 1.0),
                (-params.max_steer_rad, params.max_steer_rad),
                self.steering,
            ),
            throttle: self.throttle,
        }
    }

    /// Convert a demand in model units into a normalised command, saturating at +/-1.
    pub fn from_actuation(act: &Actuation, params: &VehicleParams) -> Self {
        let steering = lin_map(
            (-params.max_steer_rad, params.max_steer_rad),
            (-1.0, 1.0),
            act.steer_rad,
        );

        Self {
            steering: clamp(steering, -1.0, 1.0),
            throttle: clamp(act.throttle, -1.0, 1.0),
        }
    }
}

impl Default for VehicleParams {
    fn default() -> Self {
        Self {
            lf_m: 2.67,
            max_steer_rad: 25f64.to_radians(),
            min_throttle: -1.0,
            max_throttle: 1.0,
        }
    }
}

impl VehicleParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("vehicle.lf_m", self.lf_m)?;
        require(
            self.max_steer_rad.is_finite()
                && self.max_steer_rad > 0.0
                && self.max_steer_rad < std::f64::consts::FRAC_PI_2,
            "vehicle.max_steer_rad",
            "inside (0, pi/2)",
            self.max_steer_rad,
        )?;

        let throttle_ok = self.min_throttle.is_finite()
            && self.max_throttle.is_finite()
            && self.min_throttle >= -1.0
            && self.max_throttle <= 1.0
            && self.min_throttle <= self.max_throttle;

        if !throttle_ok {
            return Err(ConfigError::InvalidThrottleRange {
                min: self.min_throttle,
                max: self.max_throttle,
            });
        }

        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Advance the kinematic bicycle model by one step of `dt_s`.
///
/// ```text
/// x' = x + v cos(psi) dt
/// y' = y + v sin(psi) dt
/// psi' = psi - v steer / Lf dt
/// v' = v + throttle dt
/// ```
pub fn bicycle_step(state: &Kinematics, act: &Actuation, lf_m: f64, dt_s: f64) -> Kinematics {
    let v = state.speed_ms;

    Kinematics {
        x_m: state.x_m + v * state.heading_rad.cos() * dt_s,
        y_m: state.y_m + v * state.heading_rad.sin() * dt_s,
        heading_rad: state.heading_rad - v * act.steer_rad / lf_m * dt_s,
        speed_ms: v + act.throttle * dt_s,
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_pose_wraps_heading() {
        let p = Pose::new(1.0, 2.0, 2.0 + std::f64::consts::TAU);
        assert!((p.heading_rad - 2.0).abs() < 1e-12);
        assert_eq!(p.x_m, 1.0);
        assert!(Pose::new(0.0, 0.0, -std::f64::consts::PI).heading_rad > 0.0);
    }

    #[test]
    fn test_bicycle_step() {
        let s = Kinematics {
            x_m: 0.0,
            y_m: 0.0,
            heading_rad: 0.0,
            speed_ms: 10.0,
        };

        // Straight ahead, accelerating
        let next = bicycle_step(&s, &Actuation::new(0.0, 1.0), 2.67, 0.1);
        assert!((next.x_m - 1.0).abs() < 1e-12);
        assert_eq!(next.y_m, 0.0);
        assert_eq!(next.heading_rad, 0.0);
        assert!((next.speed_ms - 10.1).abs() < 1e-12);

        // Positive steering reduces heading
        let next = bicycle_step(&s, &Actuation::new(0.1, 0.0), 2.67, 0.1);
        assert!(next.heading_rad < 0.0);
        assert!((next.heading_rad + 10.0 * 0.1 / 2.67 * 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_command_conversion() {
        let params = VehicleParams::default();

        let act = ActuatorCommand::new(0.5, -0.2).to_actuation(&params);
        assert!((act.steer_rad - 0.5 * params.max_steer_rad).abs() < 1e-12);
        assert_eq!(act.throttle, -0.2);

        let cmd = ActuatorCommand::from_actuation(&act, &params);
        assert!((cmd.steering - 0.5).abs() < 1e-12);

        // Saturation
        let cmd = ActuatorCommand::from_actuation(&Actuation::new(1.0, 3.0), &params);
        assert_eq!(cmd, ActuatorCommand::new(1.0, 1.0));
        let cmd = ActuatorCommand::from_actuation(&Actuation::new(-1.0, -3.0), &params);
        assert_eq!(cmd, ActuatorCommand::new(-1.0, -1.0));
    }

    #[test]
    fn test_vehicle_params_validation() {
        assert!(VehicleParams::default().validate().is_ok());

        let mut p = VehicleParams::default();
        p.lf_m = 0.0;
        assert!(p.validate().is_err());

        let mut p = VehicleParams::default();
        p.max_steer_rad = 1.6;
        assert!(p.validate().is_err());

        let mut p = VehicleParams::default();
        p.min_throttle = 0.5;
        p.max_throttle = 0.2;
        assert_eq!(
            p.validate(),
            Err(ConfigError::InvalidThrottleRange { min: 0.5, max: 0.2 })
        );

        let mut p = VehicleParams::default();
        p.max_throttle = 1.5;
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_state_vector() {
        let s = VehicleState {
            x_m: 1.0,
            y_m: 2.0,
            heading_rad: 3.0,
            speed_ms: 4.0,
            cte_m: 5.0,
            epsi_rad: 6.0,
        };
        assert_eq!(VehicleState::from_vector(&s.to_vector()), s);
        assert_eq!(s.to_vector()[3], 4.0);
    }
}
