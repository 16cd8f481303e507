//! # Model Predictive Control
//!
//! Finite horizon optimisation of the steering and throttle demands. The nonlinear programme is
//! solved by sequential quadratic programming: the dynamics are linearised about the current
//! iterate, the resulting QP is solved with OSQP and the process repeats until the iterate stops
//! moving and satisfies the nonlinear dynamics.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod layout;
mod model;
mod params;
mod qp;
mod solver;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

pub use layout::Layout;
pub use model::*;
pub use params::*;
pub use qp::*;
pub use solver::*;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Possible errors that can occur during an MPC solve.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MpcError {
    #[error(
        "Solver diverged, dynamics defect {defect:e} after {iterations} iterations exceeds the \
        tolerance of {tolerance:e}"
    )]
    SolverDivergence {
        iterations: usize,
        defect: f64,
        tolerance: f64,
    },

    #[error("The optimisation problem is infeasible: {0}")]
    InfeasibleProblem(QpError),

    #[error("The QP backend failed: {0}")]
    QpFailure(QpError),
}

impl From<QpError> for MpcError {
    fn from(e: QpError) -> Self {
        match e {
            QpError::PrimalInfeasible | QpError::InvertedBounds { .. } => {
                MpcError::InfeasibleProblem(e)
            }
            _ => MpcError::QpFailure(e),
        }
    }
}
