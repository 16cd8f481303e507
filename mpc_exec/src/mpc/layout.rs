//! Decision variable layout
//!
//! The decision vector holds each state component for the whole horizon in turn, followed by the
//! steering and then the throttle demands:
//!
//! ```text
//! [x0..xN-1, y.., psi.., v.., cte.., epsi.., steer0..steerN-2, throttle0..throttleN-2]
//! ```

use crate::vehicle::{ACTUATOR_DIM, STATE_DIM};

/// Index arithmetic for a horizon of a given length.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Layout {
    n: usize,
}

impl Layout {
    /// `horizon_len` must be at least 2.
    pub fn new(horizon_len: usize) -> Self {
        Self { n: horizon_len }
    }

    pub fn horizon_len(&self) -> usize {
        self.n
    }

    /// Number of actuation steps.
    pub fn num_steps(&self) -> usize {
        self.n - 1
    }

    /// Index of state component `k` (in `[x, y, psi, v, cte, epsi]` order) at step `t`.
    pub fn state(&self, k: usize, t: usize) -> usize {
        k * self.n + t
    }

    pub fn x(&self, t: usize) -> usize {
        self.state(0, t)
    }

    pub fn y(&self, t: usize) -> usize {
        self.state(1, t)
    }

    pub fn psi(&self, t: usize) -> usize {
        self.state(2, t)
    }

    pub fn v(&self, t: usize) -> usize {
        self.state(3, t)
    }

    pub fn cte(&self, t: usize) -> usize {
        self.state(4, t)
    }

    pub fn epsi(&self, t: usize) -> usize {
        self.state(5, t)
    }

    /// Index of actuator `j` (0 steer, 1 throttle) at step `t`.
    pub fn actuator(&self, j: usize, t: usize) -> usize {
        STATE_DIM * self.n + j * self.num_steps() + t
    }

    pub fn steer(&self, t: usize) -> usize {
        self.actuator(0, t)
    }

    pub fn throttle(&self, t: usize) -> usize {
        self.actuator(1, t)
    }

    /// Length of the decision vector, `6N + 2(N - 1)`.
    pub fn num_vars(&self) -> usize {
        STATE_DIM * self.n + ACTUATOR_DIM * self.num_steps()
    }

    /// Initial state rows, then dynamics rows, then actuator bound rows.
    pub fn num_constraints(&self) -> usize {
        STATE_DIM + self.num_dynamics_rows() + ACTUATOR_DIM * self.num_steps()
    }

    pub fn num_dynamics_rows(&self) -> usize {
        STATE_DIM * self.num_steps()
    }

    /// Row of the dynamics constraint on state component `k` between steps `t` and `t+1`.
    pub fn dynamics_row(&self, k: usize, t: usize) -> usize {
        STATE_DIM + t * STATE_DIM + k
    }

    /// Row of the bound on actuator `j` at step `t`.
    pub fn bound_row(&self, j: usize, t: usize) -> usize {
        STATE_DIM + self.num_dynamics_rows() + j * self.num_steps() + t
    }
}
