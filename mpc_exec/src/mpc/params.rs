//! Parameters for the MPC solver

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::config::{require, require_non_negative, require_positive, ConfigError};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters of the receding horizon problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MpcParams {
    /// Number of states in the horizon, there is one fewer actuation.
    pub horizon_len: usize,

    /// Duration of each step.
    ///
    /// Units: seconds
    pub dt_s: f64,

    /// Speed the vehicle should track.
    ///
    /// Units: same as the telemetry speed
    pub ref_speed_ms: f64,

    pub weights: CostWeights,

    pub solver: SolverParams,
}

/// Weights of each cost term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostWeights {
    pub cte: f64,
    pub epsi: f64,
    pub speed: f64,
    pub steer: f64,
    pub throttle: f64,

    /// Weight on the change in steering between consecutive steps
    pub steer_rate: f64,

    /// Weight on the change in throttle between consecutive steps
    pub throttle_rate: f64,
}

/// Budgets and tolerances of the SQP solver and its QP backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverParams {
    /// Maximum number of SQP iterations.
    pub max_iters: usize,

    /// Wall time budget of the whole solve.
    ///
    /// Units: seconds
    pub max_solve_time_s: f64,

    /// Largest dynamics constraint violation an accepted solution may have.
    pub feasibility_tol: f64,

    /// Iterate change (infinity norm) below which the solver is considered converged.
    pub step_tol: f64,

    /// Weight of the proximal term keeping each step near the linearisation point.
    pub prox_weight: f64,

    pub qp_eps_abs: f64,
    pub qp_eps_rel: f64,
    pub qp_max_iter: u32,
    pub qp_polish: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// ------------------------------------------------------------------------------------------------

impl Default for MpcParams {
    fn default() -> Self {
        Self {
            horizon_len: 10,
            dt_s: 0.1,
            ref_speed_ms: 40.0,
            weights: CostWeights::default(),
            solver: SolverParams::default(),
        }
    }
}

impl Default for CostWeights {
    fn default() -> Self {
        Self {
            cte: 2000.0,
            epsi: 2000.0,
            speed: 1.0,
            steer: 5.0,
            throttle: 5.0,
            steer_rate: 200.0,
            throttle_rate: 10.0,
        }
    }
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            max_iters: 30,
            max_solve_time_s: 0.05,
            feasibility_tol: 1e-5,
            step_tol: 1e-4,
            prox_weight: 1e-4,
            qp_eps_abs: 1e-7,
            qp_eps_rel: 1e-7,
            qp_max_iter: 4000,
            qp_polish: true,
        }
    }
}

impl MpcParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require(
            self.horizon_len >= 2,
            "mpc.horizon_len",
            "at least 2",
            self.horizon_len as f64,
        )?;
        require_positive("mpc.dt_s", self.dt_s)?;
        require(
            self.ref_speed_ms.is_finite(),
            "mpc.ref_speed_ms",
            "finite",
            self.ref_speed_ms,
        )?;

        self.weights.validate()?;
        self.solver.validate()
    }
}

impl CostWeights {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_non_negative("mpc.weights.cte", self.cte)?;
        require_non_negative("mpc.weights.epsi", self.epsi)?;
        require_non_negative("mpc.weights.speed", self.speed)?;
        require_non_negative("mpc.weights.steer", self.steer)?;
        require_non_negative("mpc.weights.throttle", self.throttle)?;
        require_non_negative("mpc.weights.steer_rate", self.steer_rate)?;
        require_non_negative("mpc.weights.throttle_rate", self.throttle_rate)
    }
}

impl SolverParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require(
            self.max_iters >= 1,
            "mpc.solver.max_iters",
            "at least 1",
            self.max_iters as f64,
        )?;
        require_positive("mpc.solver.max_solve_time_s", self.max_solve_time_s)?;
        require_positive("mpc.solver.feasibility_tol", self.feasibility_tol)?;
        require_positive("mpc.solver.step_tol", self.step_tol)?;
        require_positive("mpc.solver.prox_weight", self.prox_weight)?;
        require_positive("mpc.solver.qp_eps_abs", self.qp_eps_abs)?;
        require_non_negative("mpc.solver.qp_eps_rel", self.qp_eps_rel)?;
        require(
            self.qp_max_iter >= 1,
            "mpc.solver.qp_max_iter",
            "at least 1",
            self.qp_max_iter as f64,
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(MpcParams::default().validate().is_ok());

        let mut p = MpcParams::default();
        p.horizon_len = 1;
        assert!(p.validate().is_err());

        let mut p = MpcParams::default();
        p.dt_s = -0.1;
        assert!(p.validate().is_err());

        let mut p = MpcParams::default();
        p.weights.steer_rate = -1.0;
        match p.validate() {
            Err(ConfigError::OutOfRange { name, .. }) => assert_eq!(name, "mpc.weights.steer_rate"),
            r => panic!("Expected an out of range error, got {:?}", r),
        }

        let mut p = MpcParams::default();
        p.weights.cte = std::f64::NAN;
        assert!(p.validate().is_err());

        let mut p = MpcParams::default();
        p.solver.max_iters = 0;
        assert!(p.validate().is_err());

        let mut p = MpcParams::default();
        p.solver.prox_weight = 0.0;
        assert!(p.validate().is_err());
    }
}
