//! # Output packaging
//!
//! Turns a solution into the normalised command and the body frame overlays shown by the
//! simulator.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::{
    config::{require, require_positive, ConfigError},
    mpc::Solution,
    ref_curve::ReferenceCurve,
    vehicle::{ActuatorCommand, VehicleParams},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Everything published for one tick.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CommandOutput {
    pub cmd: ActuatorCommand,

    /// Predicted positions, body frame
    pub predicted: Vec<Point2<f64>>,

    /// Samples of the reference curve, body frame
    pub reference: Vec<Point2<f64>>,
}

/// Parameters of the reference overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputParams {
    /// Units: meters
    pub ref_sample_spacing_m: f64,

    pub num_ref_samples: usize,
}

// ------------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// ------------------------------------------------------------------------------------------------

impl Default for OutputParams {
    fn default() -> Self {
        Self {
            ref_sample_spacing_m: 2.5,
            num_ref_samples: 24,
        }
    }
}

impl OutputParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("output.ref_sample_spacing_m", self.ref_sample_spacing_m)?;
        require(
            self.num_ref_samples <= 1000,
            "output.num_ref_samples",
            "at most 1000",
            self.num_ref_samples as f64,
        )
    }
}

impl CommandOutput {
    /// A bare command with no overlays.
    pub fn from_cmd(cmd: ActuatorCommand) -> Self {
        Self {
            cmd,
            ..Default::default()
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Package the first command of a solution along with its overlays.
pub fn package(
    solution: &Solution,
    curve: &ReferenceCurve,
    vehicle: &VehicleParams,
    params: &OutputParams,
) -> CommandOutput {
    CommandOutput {
        cmd: ActuatorCommand::from_actuation(&solution.first_actuation(), vehicle),
        predicted: solution.predicted_path(),
        reference: reference_samples(curve, params),
    }
}

/// Sample the curve at `i * spacing` for `i` in `1..=num_samples`.
pub fn reference_samples(curve: &ReferenceCurve, params: &OutputParams) -> Vec<Point2<f64>> {
    (1..=params.num_ref_samples)
        .map(|i| {
            let x = i as f64 * params.ref_sample_spacing_m;
            Point2::new(x, curve.eval(x))
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        mpc::{ActuatorTrajectory, SolveStats},
        vehicle::{Actuation, VehicleState},
    };

    fn solution(steer_rad: f64, throttle: f64) -> Solution {
        Solution {
            states: (0..4)
                .map(|t| VehicleState {
                    x_m: t as f64,
                    ..Default::default()
                })
                .collect(),
            actuators: ActuatorTrajectory {
                steps: vec![Actuation::new(steer_rad, throttle); 3],
            },
            stats: SolveStats::default(),
        }
    }

    #[test]
    fn test_package() {
        let vehicle = VehicleParams::default();
        let curve = ReferenceCurve::from_coeffs(vec![1.0, 0.5]);
        let out = package(
            &solution(-0.5 * vehicle.max_steer_rad, 0.3),
            &curve,
            &vehicle,
            &OutputParams::default(),
        );

        assert!((out.cmd.steering + 0.5).abs() < 1e-12);
        assert_eq!(out.cmd.throttle, 0.3);
        assert_eq!(out.predicted.len(), 3);
        assert_eq!(out.predicted[0], Point2::new(1.0, 0.0));
        assert_eq!(out.reference.len(), 24);
        assert_eq!(out.reference[0], Point2::new(2.5, 2.25));
        assert_eq!(out.reference[23].x, 60.0);
    }

    #[test]
    fn test_output_is_bounded() {
        let vehicle = VehicleParams::default();
        let curve = ReferenceCurve::from_coeffs(vec![0.0]);

        for &(steer, throttle) in &[(10.0, 10.0), (-10.0, -10.0), (0.2, 0.99), (-0.1, -2.0)] {
            let out = package(
                &solution(steer, throttle),
                &curve,
                &vehicle,
                &OutputParams::default(),
            );
            assert!(out.cmd.steering >= -1.0 && out.cmd.steering <= 1.0);
            assert!(out.cmd.throttle >= -1.0 && out.cmd.throttle <= 1.0);
        }
    }

    #[test]
    fn test_validate() {
        assert!(OutputParams::default().validate().is_ok());
        let p = OutputParams {
            ref_sample_spacing_m: 0.0,
            num_ref_samples: 24,
        };
        assert!(p.validate().is_err());
    }
}
