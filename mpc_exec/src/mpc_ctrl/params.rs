//! Parameters structure for MpcCtrl

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use super::FallbackPolicy;
use crate::{
    config::{require_non_negative, ConfigError},
    mpc::MpcParams,
    output::OutputParams,
    vehicle::VehicleParams,
};

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// Parameters for path tracking control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Params {
    // ---- PIPELINE ----
    /// Delay between a command being issued and it acting on the vehicle.
    ///
    /// Units: seconds
    pub latency_s: f64,

    /// Order of the reference polynomial.
    pub fit_order: usize,

    /// Fewest waypoints a tick may carry.
    pub min_num_waypoints: usize,

    /// Seed each solve with the previous solution's actuator trajectory.
    pub warm_start: bool,

    /// Command issued when the solver fails.
    pub fallback_policy: FallbackPolicy,

    // ---- COMPONENTS ----
    pub vehicle: VehicleParams,

    pub mpc: MpcParams,

    pub output: OutputParams,
}

// ------------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// ------------------------------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            latency_s: 0.1,
            fit_order: 3,
            min_num_waypoints: 4,
            warm_start: true,
            fallback_policy: FallbackPolicy::default(),
            vehicle: VehicleParams::default(),
            mpc: MpcParams::default(),
            output: OutputParams::default(),
        }
    }
}

impl Params {
    /// Check every parameter, returning the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_non_negative("latency_s", self.latency_s)?;

        if self.fit_order < 1 || self.fit_order + 1 > self.min_num_waypoints {
            return Err(ConfigError::FitOrderTooHigh {
                order: self.fit_order,
                needed: self.fit_order + 1,
                min_num_waypoints: self.min_num_waypoints,
            });
        }

        self.vehicle.validate()?;
        self.mpc.validate()?;
        self.output.validate()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(Params::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_params() {
        let mut p = Params::default();
        p.latency_s = -0.1;
        assert!(p.validate().is_err());

        let mut p = Params::default();
        p.fit_order = 4;
        assert_eq!(
            p.validate(),
            Err(ConfigError::FitOrderTooHigh {
                order: 4,
                needed: 5,
                min_num_waypoints: 4
            })
        );

        let mut p = Params::default();
        p.fit_order = 0;
        assert!(p.validate().is_err());

        let mut p = Params::default();
        p.mpc.horizon_len = 1;
        assert!(p.validate().is_err());

        let mut p = Params::default();
        p.vehicle.min_throttle = -2.0;
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_params_file() {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("params")
            .join("mpc_ctrl.toml");

        let mut p: Params = util::params::load_from(&path).unwrap();
        assert!(p.validate().is_ok());

        // The file holds the defaults, steering limit to the precision written there
        let defaults = Params::default();
        assert!((p.vehicle.max_steer_rad - defaults.vehicle.max_steer_rad).abs() < 1e-9);
        p.vehicle.max_steer_rad = defaults.vehicle.max_steer_rad;
        assert_eq!(p, defaults);
    }
}
