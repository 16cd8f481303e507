//! # Quadratic programme backend
//!
//! Each SQP iteration solves a convex QP of the form
//!
//! ```text
//! minimise    1/2 z' P z + q' z
//! subject to  l <= A z <= u
//! ```
//!
//! using OSQP. Matrices are assembled from triplets and handed over in compressed sparse column
//! form.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::time::Duration;

use log::debug;
use osqp::{CscMatrix, Problem, Settings, Status};

use super::SolverParams;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Sparse matrix under construction, duplicate entries are summed.
#[derive(Debug, Clone)]
pub struct SparseBuilder {
    nrows: usize,
    ncols: usize,
    triplets: Vec<(usize, usize, f64)>,
}

/// A QP ready to be solved.
#[derive(Debug, Clone)]
pub struct QpProblem {
    /// Quadratic cost, only the upper triangle is used.
    pub p: SparseBuilder,
    pub q: Vec<f64>,
    pub a: SparseBuilder,
    pub l: Vec<f64>,
    pub u: Vec<f64>,
}

/// Solution of a QP.
#[derive(Debug, Clone)]
pub struct QpSolution {
    pub x: Vec<f64>,

    /// False if the backend stopped on a budget rather than its tolerances.
    pub accurate: bool,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QpError {
    #[error("Lower bound exceeds upper bound on constraint row {row} ({lower} > {upper})")]
    InvertedBounds { row: usize, lower: f64, upper: f64 },

    #[error("The QP is primal infeasible")]
    PrimalInfeasible,

    #[error("The QP is dual infeasible")]
    DualInfeasible,

    #[error("The QP is non-convex")]
    NonConvex,

    #[error("Could not set up the QP: {0}")]
    SetupFailed(String),

    #[error("The QP solver stopped without a solution: {0}")]
    Unsolved(String),
}

// ------------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// ------------------------------------------------------------------------------------------------

impl SparseBuilder {
    pub fn new(nrows: usize, ncols: usize) -> Self {
        Self {
            nrows,
            ncols,
            triplets: Vec::new(),
        }
    }

    /// Add `value` onto the entry at (`row`, `col`).
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        debug_assert!(row < self.nrows && col < self.ncols);
        self.triplets.push((row, col, value));
    }

    /// Compress into CSC form.
    pub fn build_csc(&self) -> CscMatrix<'static> {
        self.compress(|_, _| true)
    }

    /// Compress the upper triangle (including the diagonal) into CSC form.
    pub fn build_upper_csc(&self) -> CscMatrix<'static> {
        self.compress(|row, col| row <= col)
    }

    fn compress<F: Fn(usize, usize) -> bool>(&self, keep: F) -> CscMatrix<'static> {
        let mut entries: Vec<(usize, usize, f64)> = self
            .triplets
            .iter()
            .copied()
            .filter(|&(r, c, _)| keep(r, c))
            .collect();

        // Column major, rows ascending within each column
        entries.sort_by(|a, b| (a.1, a.0).cmp(&(b.1, b.0)));

        let mut indptr = vec![0usize; self.ncols + 1];
        let mut indices = Vec::with_capacity(entries.len());
        let mut data: Vec<f64> = Vec::with_capacity(entries.len());
        let mut last: Option<(usize, usize)> = None;

        for (r, c, v) in entries {
            if last == Some((r, c)) {
                if let Some(d) = data.last_mut() {
                    *d += v;
                }
                continue;
            }

            indices.push(r);
            data.push(v);
            indptr[c + 1] += 1;
            last = Some((r, c));
        }

        // Counts to offsets
        for c in 0..self.ncols {
            indptr[c + 1] += indptr[c];
        }

        CscMatrix {
            nrows: self.nrows,
            ncols: self.ncols,
            indptr: indptr.into(),
            indices: indices.into(),
            data: data.into(),
        }
    }
}

impl QpProblem {
    /// Create an empty problem with `num_vars` variables and `num_constraints` rows.
    pub fn new(num_vars: usize, num_constraints: usize) -> Self {
        Self {
            p: SparseBuilder::new(num_vars, num_vars),
            q: vec![0.0; num_vars],
            a: SparseBuilder::new(num_constraints, num_vars),
            l: vec![0.0; num_constraints],
            u: vec![0.0; num_constraints],
        }
    }

    /// Solve the problem with the given settings and remaining wall time.
    pub fn solve(
        &self,
        params: &SolverParams,
        time_limit: Option<Duration>,
    ) -> Result<QpSolution, QpError> {
        if let Some(row) = self
            .l
            .iter()
            .zip(self.u.iter())
            .position(|(l, u)| l > u)
        {
            return Err(QpError::InvertedBounds {
                row,
                lower: self.l[row],
                upper: self.u[row],
            });
        }

        let settings = Settings::default()
            .verbose(false)
            .eps_abs(params.qp_eps_abs)
            .eps_rel(params.qp_eps_rel)
            .max_iter(params.qp_max_iter)
            .polish(params.qp_polish)
            .time_limit(time_limit);

        let mut prob = Problem::new(
            self.p.build_upper_csc(),
            &self.q,
            self.a.build_csc(),
            &self.l,
            &self.u,
            &settings,
        )
        .map_err(|e| QpError::SetupFailed(format!("{:?}", e)))?;

        match prob.solve() {
            Status::Solved(s) => Ok(QpSolution {
                x: s.x().to_vec(),
                accurate: true,
            }),
            Status::SolvedInaccurate(s) => {
                debug!("QP solved inaccurately");
                Ok(QpSolution {
                    x: s.x().to_vec(),
                    accurate: false,
                })
            }
            Status::MaxIterationsReached(s) => {
                debug!("QP reached its iteration limit");
                Ok(QpSolution {
                    x: s.x().to_vec(),
                    accurate: false,
                })
            }
            Status::TimeLimitReached(s) => {
                debug!("QP reached its time limit");
                Ok(QpSolution {
                    x: s.x().to_vec(),
                    accurate: false,
                })
            }
            Status::PrimalInfeasible(_) | Status::PrimalInfeasibleInaccurate(_) => {
                Err(QpError::PrimalInfeasible)
            }
            Status::DualInfeasible(_) | Status::DualInfeasibleInaccurate(_) => {
                Err(QpError::DualInfeasible)
            }
            Status::NonConvex(_) => Err(QpError::NonConvex),
            _ => Err(QpError::Unsolved(String::from("unrecognised solver status"))),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_csc_assembly() {
        let mut b = SparseBuilder::new(3, 3);
        b.add(2, 0, 4.0);
        b.add(0, 0, 1.0);
        b.add(0, 0, 1.0);
        b.add(1, 2, -3.0);
        b.add(0, 2, 5.0);

        let csc = b.build_csc();
        assert_eq!(&csc.indptr[..], &[0, 2, 2, 4]);
        assert_eq!(&csc.indices[..], &[0, 2, 0, 1]);
        assert_eq!(&csc.data[..], &[2.0, 4.0, 5.0, -3.0]);

        // The strictly lower entry (2, 0) is dropped
        let upper = b.build_upper_csc();
        assert_eq!(&upper.indptr[..], &[0, 1, 1, 3]);
        assert_eq!(&upper.indices[..], &[0, 0, 1]);
    }

    #[test]
    fn test_solve_box_qp() {
        // min (x0 - 1)^2 + (x1 + 2)^2 with x1 >= -1
        let mut qp = QpProblem::new(2, 2);
        qp.p.add(0, 0, 2.0);
        qp.p.add(1, 1, 2.0);
        qp.q = vec![-2.0, 4.0];
        qp.a.add(0, 0, 1.0);
        qp.a.add(1, 1, 1.0);
        qp.l = vec![-10.0, -1.0];
        qp.u = vec![10.0, 10.0];

        let sol = qp.solve(&SolverParams::default(), None).unwrap();
        assert!((sol.x[0] - 1.0).abs() < 1e-5);
        assert!((sol.x[1] + 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_infeasible_qp() {
        // x in [0, 1] and x in [2, 3]
        let mut qp = QpProblem::new(1, 2);
        qp.p.add(0, 0, 1.0);
        qp.a.add(0, 0, 1.0);
        qp.a.add(1, 0, 1.0);
        qp.l = vec![0.0, 2.0];
        qp.u = vec![1.0, 3.0];

        assert_eq!(
            qp.solve(&SolverParams::default(), None).unwrap_err(),
            QpError::PrimalInfeasible
        );
    }

    #[test]
    fn test_inverted_bounds() {
        let mut qp = QpProblem::new(1, 1);
        qp.p.add(0, 0, 1.0);
        qp.a.add(0, 0, 1.0);
        qp.l = vec![1.0];
        qp.u = vec![-1.0];

        match qp.solve(&SolverParams::default(), None) {
            Err(QpError::InvertedBounds { row, .. }) => assert_eq!(row, 0),
            r => panic!("Expected inverted bounds, got {:?}", r),
        }
    }
}
