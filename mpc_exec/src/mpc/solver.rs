//! # SQP solver
//!
//! Solves
//!
//! ```text
//! min  sum_t  w_cte cte[t]^2 + w_epsi epsi[t]^2 + w_v (v[t] - v_ref)^2
//!    + sum_t  w_steer steer[t]^2 + w_throttle throttle[t]^2
//!    + sum_t  w_dsteer (steer[t+1] - steer[t])^2 + w_dthrottle (throttle[t+1] - throttle[t])^2
//! ```
//!
//! subject to the model dynamics, the fixed initial state and the actuator limits.
//!
//! The cost is exactly quadratic so only the dynamics need linearising. The first iterate is a
//! rollout of the model, which satisfies the dynamics, and each QP is damped by a small proximal
//! term around the previous iterate.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::time::{Duration, Instant};

use log::{debug, trace, warn};
use nalgebra::{Point2, Vector6};
use serde::Serialize;
use util::maths::max_abs_diff;

use super::{
    actuation_at, max_defect, rollout, state_at, Dynamics, Layout, MpcError, MpcParams,
    QpProblem, SparseBuilder,
};
use crate::{
    ref_curve::ReferenceCurve,
    vehicle::{Actuation, VehicleParams, VehicleState, ACTUATOR_DIM, STATE_DIM},
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Shortest time limit given to a QP, used once the solve budget is spent.
const MIN_QP_TIME_LIMIT: Duration = Duration::from_millis(1);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The MPC solver.
///
/// Holds configuration only, every call to [`Mpc::solve`] is independent.
#[derive(Debug, Clone)]
pub struct Mpc {
    params: MpcParams,
    vehicle: VehicleParams,
    layout: Layout,
}

/// The actuator demands over the horizon.
///
/// Also used as the warm start for the next solve.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ActuatorTrajectory {
    pub steps: Vec<Actuation>,
}

/// Statistics of a single solve.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SolveStats {
    /// Number of SQP iterations performed
    pub iterations: usize,

    /// Wall time of the solve
    pub solve_time_s: f64,

    /// Final largest violation of the nonlinear dynamics
    pub defect: f64,

    /// Infinity norm of the final step
    pub step: f64,

    /// True if both the feasibility and step tolerances were met. A solution can be accepted
    /// without converging if the budget ran out on a feasible iterate.
    pub converged: bool,

    /// True if the first iterate came from a warm start
    pub warm_started: bool,
}

/// Result of a successful solve.
#[derive(Debug, Clone, Serialize)]
pub struct Solution {
    /// Predicted states, `states[0]` is the initial state.
    pub states: Vec<VehicleState>,

    pub actuators: ActuatorTrajectory,

    pub stats: SolveStats,
}

// ------------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// ------------------------------------------------------------------------------------------------

impl ActuatorTrajectory {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Advance the trajectory by one step, repeating the final demand to keep the length.
    pub fn shifted(&self) -> Self {
        let mut steps: Vec<Actuation> = self.steps.iter().skip(1).copied().collect();

        if let Some(last) = self.steps.last() {
            steps.push(*last);
        }

        Self { steps }
    }
}

impl Solution {
    /// The demand to apply now.
    pub fn first_actuation(&self) -> Actuation {
        self.actuators.steps.first().copied().unwrap_or_default()
    }

    /// Predicted positions for steps `1..N`.
    pub fn predicted_path(&self) -> Vec<Point2<f64>> {
        self.states
            .iter()
            .skip(1)
            .map(|s| Point2::new(s.x_m, s.y_m))
            .collect()
    }
}

impl Mpc {
    /// Create a new solver. The parameters should already have been validated.
    pub fn new(params: MpcParams, vehicle: VehicleParams) -> Self {
        let layout = Layout::new(params.horizon_len);

        Self {
            params,
            vehicle,
            layout,
        }
    }

    /// Solve the horizon problem from `state` along `curve`.
    ///
    /// `state` is expected to be expressed in the body frame, so its position and heading are
    /// zero. A `warm_start` of the wrong length is ignored.
    pub fn solve(
        &self,
        state: &VehicleState,
        curve: &ReferenceCurve,
        warm_start: Option<&ActuatorTrajectory>,
    ) -> Result<Solution, MpcError> {
        let start = Instant::now();
        let solver = &self.params.solver;
        let budget = Duration::from_secs_f64(solver.max_solve_time_s);
        let layout = &self.layout;
        let dynamics = Dynamics::new(curve, self.vehicle.lf_m, self.params.dt_s);

        // ---- INITIAL GUESS ----

        let warm_start = match warm_start {
            Some(w) if w.len() == layout.num_steps() => Some(w),
            Some(w) => {
                debug!(
                    "Ignoring warm start of length {}, expected {}",
                    w.len(),
                    layout.num_steps()
                );
                None
            }
            None => None,
        };

        let guess: Vec<Actuation> = match warm_start {
            Some(w) => w.steps.iter().map(|a| a.clamped(&self.vehicle)).collect(),
            None => vec![Actuation::default().clamped(&self.vehicle); layout.num_steps()],
        };

        let init = state.to_vector();
        let mut z = rollout(&dynamics, layout, &init, &guess);

        // ---- ITERATE ----

        let (cost_p, cost_q) = self.build_cost();

        let mut iterations = 0;
        let mut defect;
        let mut step;
        let mut converged = false;

        loop {
            let mut qp = self.build_constraints(&dynamics, &init, &z);
            qp.p = cost_p.clone();
            qp.q = cost_q
                .iter()
                .zip(z.iter())
                .map(|(q, z_bar)| q - 2.0 * solver.prox_weight * z_bar)
                .collect();

            let time_limit = qp_time_limit(budget, start.elapsed());
            let sol = qp.solve(solver, Some(time_limit))?;

            step = max_abs_diff(&sol.x, &z).unwrap_or(std::f64::INFINITY);
            z = sol.x;
            defect = max_defect(&dynamics, layout, &z);
            iterations += 1;

            trace!(
                "SQP iteration {}: defect = {:e}, step = {:e}, accurate QP = {}",
                iterations,
                defect,
                step,
                sol.accurate
            );

            if defect <= solver.feasibility_tol && step <= solver.step_tol {
                converged = true;
                break;
            }

            if iterations >= solver.max_iters || start.elapsed() >= budget {
                break;
            }
        }

        // ---- TERMINATION ----

        if !converged {
            if defect <= solver.feasibility_tol {
                warn!(
                    "MPC budget exhausted after {} iterations, accepting feasible iterate \
                    (defect {:e}, step {:e})",
                    iterations, defect, step
                );
            } else {
                return Err(MpcError::SolverDivergence {
                    iterations,
                    defect,
                    tolerance: solver.feasibility_tol,
                });
            }
        }

        let stats = SolveStats {
            iterations,
            solve_time_s: start.elapsed().as_secs_f64(),
            defect,
            step,
            converged,
            warm_started: warm_start.is_some(),
        };

        debug!("MPC solve stats: {:?}", stats);

        Ok(self.extract_solution(&z, stats))
    }

    /// Build the quadratic cost, including the diagonal of the proximal term.
    ///
    /// Only the upper triangle of P is populated.
    fn build_cost(&self) -> (SparseBuilder, Vec<f64>) {
        let l = &self.layout;
        let w = &self.params.weights;
        let n = l.num_vars();

        let mut p = SparseBuilder::new(n, n);
        let mut q = vec![0.0; n];

        // w (z_i - r)^2 = w z_i^2 - 2 w r z_i + const
        let mut add_tracking = |p: &mut SparseBuilder, i: usize, weight: f64, target: f64| {
            p.add(i, i, 2.0 * weight);
            q[i] -= 2.0 * weight * target;
        };

        for t in 0..l.horizon_len() {
            add_tracking(&mut p, l.cte(t), w.cte, 0.0);
            add_tracking(&mut p, l.epsi(t), w.epsi, 0.0);
            add_tracking(&mut p, l.v(t), w.speed, self.params.ref_speed_ms);
        }

        for t in 0..l.num_steps() {
            add_tracking(&mut p, l.steer(t), w.steer, 0.0);
            add_tracking(&mut p, l.throttle(t), w.throttle, 0.0);
        }

        // w (z_j - z_i)^2, i < j
        for t in 0..l.num_steps().saturating_sub(1) {
            for &(i, j, weight) in &[
                (l.steer(t), l.steer(t + 1), w.steer_rate),
                (l.throttle(t), l.throttle(t + 1), w.throttle_rate),
            ] {
                p.add(i, i, 2.0 * weight);
                p.add(j, j, 2.0 * weight);
                p.add(i, j, -2.0 * weight);
            }
        }

        for i in 0..n {
            p.add(i, i, 2.0 * self.params.solver.prox_weight);
        }

        (p, q)
    }

    /// Build the constraint rows linearised about `z_bar`.
    ///
    /// The cost terms of the returned problem are left empty.
    fn build_constraints(
        &self,
        dynamics: &Dynamics,
        init: &Vector6<f64>,
        z_bar: &[f64],
    ) -> QpProblem {
        let l = &self.layout;
        let mut qp = QpProblem::new(l.num_vars(), l.num_constraints());

        // Initial state
        for k in 0..STATE_DIM {
            qp.a.add(k, l.state(k, 0), 1.0);
            qp.l[k] = init[k];
            qp.u[k] = init[k];
        }

        // Dynamics, s[t+1] - A s[t] - B u[t] = f(s_bar, u_bar) - A s_bar - B u_bar
        for t in 0..l.num_steps() {
            let s_bar = state_at(l, z_bar, t);
            let u_bar = actuation_at(l, z_bar, t);
            let (a, b) = dynamics.jacobians(&s_bar, &u_bar);
            let rhs = dynamics.step(&s_bar, &u_bar) - a * s_bar - b * u_bar;

            for k in 0..STATE_DIM {
                let row = l.dynamics_row(k, t);

                qp.a.add(row, l.state(k, t + 1), 1.0);

                for j in 0..STATE_DIM {
                    if a[(k, j)] != 0.0 {
                        qp.a.add(row, l.state(j, t), -a[(k, j)]);
                    }
                }

                for j in 0..ACTUATOR_DIM {
                    if b[(k, j)] != 0.0 {
                        qp.a.add(row, l.actuator(j, t), -b[(k, j)]);
                    }
                }

                qp.l[row] = rhs[k];
                qp.u[row] = rhs[k];
            }
        }

        // Actuator limits
        for t in 0..l.num_steps() {
            let steer_row = l.bound_row(0, t);
            qp.a.add(steer_row, l.steer(t), 1.0);
            qp.l[steer_row] = -self.vehicle.max_steer_rad;
            qp.u[steer_row] = self.vehicle.max_steer_rad;

            let throttle_row = l.bound_row(1, t);
            qp.a.add(throttle_row, l.throttle(t), 1.0);
            qp.l[throttle_row] = self.vehicle.min_throttle;
            qp.u[throttle_row] = self.vehicle.max_throttle;
        }

        qp
    }

    fn extract_solution(&self, z: &[f64], stats: SolveStats) -> Solution {
        let l = &self.layout;

        let states = (0..l.horizon_len())
            .map(|t| VehicleState::from_vector(&state_at(l, z, t)))
            .collect();

        let steps = (0..l.num_steps())
            .map(|t| {
                let u = actuation_at(l, z, t);
                Actuation::new(u[0], u[1]).clamped(&self.vehicle)
            })
            .collect();

        Solution {
            states,
            actuators: ActuatorTrajectory { steps },
            stats,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Time left for the next QP. Never unbounded, even once the budget has been used up.
fn qp_time_limit(budget: Duration, elapsed: Duration) -> Duration {
    budget
        .checked_sub(elapsed)
        .map_or(MIN_QP_TIME_LIMIT, |left| left.max(MIN_QP_TIME_LIMIT))
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
