//! # Prediction model
//!
//! The bicycle model extended with the cross track and heading error states:
//!
//! ```text
//! cte'  = (f(x) - y) + v sin(epsi) dt
//! epsi' = (psi - atan(f'(x))) - v steer / Lf dt
//! ```

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use nalgebra::{Matrix6, Matrix6x2, Vector2, Vector6};

use super::Layout;
use crate::{
    ref_curve::ReferenceCurve,
    vehicle::{bicycle_step, Actuation, Kinematics, STATE_DIM},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Discrete time dynamics about a given reference curve.
#[derive(Debug, Clone, Copy)]
pub struct Dynamics<'a> {
    pub curve: &'a ReferenceCurve,
    pub lf_m: f64,
    pub dt_s: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// ------------------------------------------------------------------------------------------------

impl<'a> Dynamics<'a> {
    pub fn new(curve: &'a ReferenceCurve, lf_m: f64, dt_s: f64) -> Self {
        Self { curve, lf_m, dt_s }
    }

    /// Advance the state `s` (`[x, y, psi, v, cte, epsi]`) by one step under actuation `u`.
    pub fn step(&self, s: &Vector6<f64>, u: &Vector2<f64>) -> Vector6<f64> {
        let act = Actuation::new(u[0], u[1]);
        let kin = Kinematics {
            x_m: s[0],
            y_m: s[1],
            heading_rad: s[2],
            speed_ms: s[3],
        };
        let next = bicycle_step(&kin, &act, self.lf_m, self.dt_s);

        let (x, y, psi, v, epsi) = (s[0], s[1], s[2], s[3], s[5]);

        let cte = (self.curve.eval(x) - y) + v * epsi.sin() * self.dt_s;
        let epsi =
            (psi - self.curve.tangent_heading(x)) - v * act.steer_rad / self.lf_m * self.dt_s;

        Vector6::new(next.x_m, next.y_m, next.heading_rad, next.speed_ms, cte, epsi)
    }

    /// Jacobians of [`Dynamics::step`] with respect to the state and the actuation.
    pub fn jacobians(
        &self,
        s: &Vector6<f64>,
        u: &Vector2<f64>,
    ) -> (Matrix6<f64>, Matrix6x2<f64>) {
        let (x, psi, v, epsi) = (s[0], s[2], s[3], s[5]);
        let steer = u[0];
        let dt = self.dt_s;
        let lf = self.lf_m;

        let df = self.curve.deriv(x);
        let d2f = self.curve.second_deriv(x);

        let mut a = Matrix6::zeros();
        let mut b = Matrix6x2::zeros();

        // x
        a[(0, 0)] = 1.0;
        a[(0, 2)] = -v * psi.sin() * dt;
        a[(0, 3)] = psi.cos() * dt;

        // y
        a[(1, 1)] = 1.0;
        a[(1, 2)] = v * psi.cos() * dt;
        a[(1, 3)] = psi.sin() * dt;

        // psi
        a[(2, 2)] = 1.0;
        a[(2, 3)] = -steer / lf * dt;
        b[(2, 0)] = -v / lf * dt;

        // v
        a[(3, 3)] = 1.0;
        b[(3, 1)] = dt;

        // cte
        a[(4, 0)] = df;
        a[(4, 1)] = -1.0;
        a[(4, 3)] = epsi.sin() * dt;
        a[(4, 5)] = v * epsi.cos() * dt;

        // epsi
        a[(5, 0)] = -d2f / (1.0 + df * df);
        a[(5, 2)] = 1.0;
        a[(5, 3)] = -steer / lf * dt;
        b[(5, 0)] = -v / lf * dt;

        (a, b)
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Gather the state at step `t` out of a decision vector.
pub fn state_at(layout: &Layout, z: &[f64], t: usize) -> Vector6<f64> {
    Vector6::from_fn(|k, _| z[layout.state(k, t)])
}

/// Gather the actuation at step `t` out of a decision vector.
pub fn actuation_at(layout: &Layout, z: &[f64], t: usize) -> Vector2<f64> {
    Vector2::new(z[layout.steer(t)], z[layout.throttle(t)])
}

/// Simulate the model from `init` under the given actuations and pack the result into a decision
/// vector. The result satisfies the dynamics exactly.
pub fn rollout(
    dynamics: &Dynamics,
    layout: &Layout,
    init: &Vector6<f64>,
    actuations: &[Actuation],
) -> Vec<f64> {
    let mut z = vec![0.0; layout.num_vars()];
    let mut s = *init;

    for t in 0..layout.horizon_len() {
        for k in 0..STATE_DIM {
            z[layout.state(k, t)] = s[k];
        }

        if t < layout.num_steps() {
            let act = actuations.get(t).copied().unwrap_or_default();
            z[layout.steer(t)] = act.steer_rad;
            z[layout.throttle(t)] = act.throttle;

            s = dynamics.step(&s, &act.to_vector());
        }
    }

    z
}

/// Largest violation of the nonlinear dynamics across the horizon.
///
/// The initial state is not included, it is held by its own equality rows.
pub fn max_defect(dynamics: &Dynamics, layout: &Layout, z: &[f64]) -> f64 {
    (0..layout.num_steps())
        .map(|t| {
            let predicted = dynamics.step(&state_at(layout, z, t), &actuation_at(layout, z, t));
            (state_at(layout, z, t + 1) - predicted).amax()
        })
        .fold(0.0, f64::max)
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn curve() -> ReferenceCurve {
        ReferenceCurve::from_coeffs(vec![0.4, -0.1, 0.02, -0.0005])
    }

    #[test]
    fn test_jacobians_match_finite_differences() {
        let c = curve();
        let dynamics = Dynamics::new(&c, 2.67, 0.1);

        let s = Vector6::new(1.5, -0.3, 0.2, 12.0, 0.4, -0.05);
        let u = Vector2::new(-0.1, 0.6);
        let (a, b) = dynamics.jacobians(&s, &u);

        let h = 1e-6;
        for j in 0..6 {
            let mut sp = s;
            let mut sm = s;
            sp[j] += h;
            sm[j] -= h;
            let col = (dynamics.step(&sp, &u) - dynamics.step(&sm, &u)) / (2.0 * h);
            for i in 0..6 {
                assert!(
                    (a[(i, j)] - col[i]).abs() < 1e-6,
                    "A[{}, {}] = {}, fd = {}",
                    i,
                    j,
                    a[(i, j)],
                    col[i]
                );
            }
        }
        for j in 0..2 {
            let mut up = u;
            let mut um = u;
            up[j] += h;
            um[j] -= h;
            let col = (dynamics.step(&s, &up) - dynamics.step(&s, &um)) / (2.0 * h);
            for i in 0..6 {
                assert!((b[(i, j)] - col[i]).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_rollout_is_feasible() {
        let c = curve();
        let dynamics = Dynamics::new(&c, 2.67, 0.1);
        let layout = Layout::new(8);

        let init = Vector6::new(0.0, 0.0, 0.0, 10.0, 0.4, 0.1);
        let acts = vec![Actuation::new(-0.05, 0.5); layout.num_steps()];

        let z = rollout(&dynamics, &layout, &init, &acts);

        assert_eq!(z.len(), layout.num_vars());
        assert_eq!(state_at(&layout, &z, 0), init);
        assert!(max_defect(&dynamics, &layout, &z) < 1e-12);
        assert_eq!(z[layout.steer(3)], -0.05);

        // Perturbing a state shows up in the defect
        let mut z = z;
        z[layout.y(4)] += 0.5;
        assert!((max_defect(&dynamics, &layout, &z) - 0.5).abs() < 1e-9);
    }
}
