//! # Path tracking control module
//!
//! Runs the full control pipeline once per telemetry tick:
//!
//!     - Latency compensation of the measured pose
//!     - Map to body frame transform of the waypoints
//!     - Reference curve fit and tracking error extraction
//!     - MPC solve
//!     - Output packaging
//!
//! Recoverable failures are answered with a fallback command, see [`FallbackPolicy`].

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod params;
mod state;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::{config::ConfigError, mpc::MpcError, ref_curve::FitError, vehicle::ActuatorCommand};

pub use params::*;
pub use state::*;

// ------------------------------------------------------------------------------------------------
// ENUMERATIONS
// ------------------------------------------------------------------------------------------------

/// Possible errors that can occur during MpcCtrl operation.
#[derive(Debug, thiserror::Error)]
pub enum MpcCtrlError {
    #[error("Cannot fit a reference curve to the waypoints: {0}")]
    DegenerateFit(FitError),

    #[error("Expected at least {min} waypoints, found {found}")]
    TooFewWaypoints { min: usize, found: usize },

    #[error("Telemetry contains a non-finite value: {0}")]
    InvalidTelemetry(&'static str),

    #[error("{0}")]
    SolverDivergence(MpcError),

    #[error("{0}")]
    InfeasibleProblem(MpcError),

    #[error("{0}")]
    QpFailure(MpcError),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(ConfigError),

    #[error("Cannot load MpcCtrl parameters: {0}")]
    ParamLoadError(util::params::LoadError),

    #[error("Cannot initialise the MpcCtrl archives: {0}")]
    ArchiveInitError(String),
}

/// The reason a fallback command was issued instead of a solution.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FallbackCause {
    DegenerateFit,
    InvalidTelemetry,
    SolverDivergence,
    QpFailure,
}

/// What to command when the solver fails to produce an acceptable solution.
///
/// Degenerate fits and invalid telemetry always reuse the previous command, this policy only
/// applies to solver failures.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FallbackPolicy {
    /// Keep the previous steering and command zero throttle.
    HoldSteerZeroThrottle,

    /// Reuse the previous command unchanged.
    ReusePrevious,

    /// Zero steering and zero throttle.
    FullStop,
}

// ------------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// ------------------------------------------------------------------------------------------------

impl From<MpcError> for MpcCtrlError {
    fn from(e: MpcError) -> Self {
        match e {
            MpcError::SolverDivergence { .. } => MpcCtrlError::SolverDivergence(e),
            MpcError::InfeasibleProblem(_) => MpcCtrlError::InfeasibleProblem(e),
            MpcError::QpFailure(_) => MpcCtrlError::QpFailure(e),
        }
    }
}

impl MpcCtrlError {
    /// The fallback cause if this error can be recovered from within a tick, `None` otherwise.
    pub fn fallback_cause(&self) -> Option<FallbackCause> {
        match self {
            MpcCtrlError::DegenerateFit(_) | MpcCtrlError::TooFewWaypoints { .. } => {
                Some(FallbackCause::DegenerateFit)
            }
            MpcCtrlError::InvalidTelemetry(_) => Some(FallbackCause::InvalidTelemetry),
            MpcCtrlError::SolverDivergence(_) => Some(FallbackCause::SolverDivergence),
            MpcCtrlError::QpFailure(_) => Some(FallbackCause::QpFailure),
            _ => None,
        }
    }
}

impl FallbackPolicy {
    /// Apply the policy to the previous command.
    pub fn apply(&self, last_cmd: &ActuatorCommand) -> ActuatorCommand {
        match self {
            FallbackPolicy::HoldSteerZeroThrottle => ActuatorCommand::new(last_cmd.steering, 0.0),
            FallbackPolicy::ReusePrevious => *last_cmd,
            FallbackPolicy::FullStop => ActuatorCommand::new(0.0, 0.0),
        }
    }
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        FallbackPolicy::HoldSteerZeroThrottle
    }
}

impl FallbackCause {
    /// The command to issue for this cause.
    pub fn fallback_cmd(&self, policy: FallbackPolicy, last_cmd: &ActuatorCommand) -> ActuatorCommand {
        match self {
            FallbackCause::DegenerateFit | FallbackCause::InvalidTelemetry => {
                FallbackPolicy::ReusePrevious.apply(last_cmd)
            }
            FallbackCause::SolverDivergence | FallbackCause::QpFailure => policy.apply(last_cmd),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_fallback_policies() {
        let last = ActuatorCommand::new(-0.4, 0.8);

        assert_eq!(
            FallbackPolicy::HoldSteerZeroThrottle.apply(&last),
            ActuatorCommand::new(-0.4, 0.0)
        );
        assert_eq!(FallbackPolicy::ReusePrevious.apply(&last), last);
        assert_eq!(FallbackPolicy::FullStop.apply(&last), ActuatorCommand::new(0.0, 0.0));

        // Fit failures ignore the policy
        assert_eq!(
            FallbackCause::DegenerateFit.fallback_cmd(FallbackPolicy::FullStop, &last),
            last
        );
        assert_eq!(
            FallbackCause::SolverDivergence.fallback_cmd(FallbackPolicy::FullStop, &last),
            ActuatorCommand::new(0.0, 0.0)
        );
    }

    #[test]
    fn test_error_classification() {
        let div: MpcCtrlError = MpcError::SolverDivergence {
            iterations: 1,
            defect: 1.0,
            tolerance: 1e-5,
        }
        .into();
        assert_eq!(div.fallback_cause(), Some(FallbackCause::SolverDivergence));

        let inf: MpcCtrlError =
            MpcError::InfeasibleProblem(crate::mpc::QpError::PrimalInfeasible).into();
        assert_eq!(inf.fallback_cause(), None);

        let cfg = MpcCtrlError::InvalidConfiguration(ConfigError::InvalidThrottleRange {
            min: 1.0,
            max: 0.0,
        });
        assert_eq!(cfg.fallback_cause(), None);
    }
}
