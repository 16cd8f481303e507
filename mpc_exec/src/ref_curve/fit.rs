//! # Least squares polynomial fit
//!
//! The fit solves the Vandermonde system with a Householder QR factorisation, never the normal
//! equations. Columns are scaled to unit norm first, the higher powers of x are otherwise many
//! orders of magnitude larger than the constant column.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::trace;
use nalgebra::{DMatrix, DVector, Point2};

use super::ReferenceCurve;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Diagonal entries of R smaller than this fraction of the largest are treated as zero.
const RANK_TOLERANCE: f64 = 1e-10;

/// X coordinates closer than this (relative to their magnitude) are not distinct.
const DISTINCT_TOLERANCE: f64 = 1e-9;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Reasons a set of waypoints cannot support a fit, all of which are degenerate fits.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FitError {
    #[error("Fit order must be at least 1")]
    ZeroOrder,

    #[error("Waypoint {0} has a non-finite coordinate")]
    NonFinite(usize),

    #[error("An order {order} fit needs more than {order} distinct waypoints, found {found}")]
    TooFewPoints { order: usize, found: usize },

    #[error("The design matrix is rank deficient (rank {rank}, needed {needed})")]
    RankDeficient { rank: usize, needed: usize },
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Fit a polynomial of the given order through the points in a least squares sense.
pub fn fit_polynomial(points: &[Point2<f64>], order: usize) -> Result<ReferenceCurve, FitError> {
    if order == 0 {
        return Err(FitError::ZeroOrder);
    }

    if let Some(i) = points
        .iter()
        .position(|p| !(p.x.is_finite() && p.y.is_finite()))
    {
        return Err(FitError::NonFinite(i));
    }

    let num_distinct = count_distinct_x(points);
    if num_distinct <= order {
        return Err(FitError::TooFewPoints {
            order,
            found: num_distinct,
        });
    }

    let num_coeffs = order + 1;

    // Vandermonde matrix in ascending powers
    let mut a = DMatrix::from_fn(points.len(), num_coeffs, |i, j| points[i].x.powi(j as i32));
    let y = DVector::from_iterator(points.len(), points.iter().map(|p| p.y));

    // Scale the columns, keeping the scales to recover the true coefficients
    let mut scales = vec![1.0; num_coeffs];
    for (j, scale) in scales.iter_mut().enumerate() {
        let norm = a.column(j).norm();
        if norm > 0.0 {
            *scale = norm;
            a.column_mut(j).unscale_mut(norm);
        }
    }

    let qr = a.qr();
    let q = qr.q();
    let r = qr.r();

    // Rank check on the diagonal of R
    let max_diag = r.diagonal().iter().fold(0.0f64, |m, d| m.max(d.abs()));
    let rank = r
        .diagonal()
        .iter()
        .filter(|d| d.abs() > RANK_TOLERANCE * max_diag)
        .count();

    if rank < num_coeffs {
        return Err(FitError::RankDeficient {
            rank,
            needed: num_coeffs,
        });
    }

    let scaled = match r.solve_upper_triangular(&(q.transpose() * y)) {
        Some(c) => c,
        None => {
            return Err(FitError::RankDeficient {
                rank,
                needed: num_coeffs,
            })
        }
    };

    let coeffs: Vec<f64> = scaled
        .iter()
        .zip(scales.iter())
        .map(|(c, s)| c / s)
        .collect();

    trace!("Fitted reference coefficients: {:?}", coeffs);

    Ok(ReferenceCurve::from_coeffs(coeffs))
}

/// Number of distinct x coordinates in the set.
fn count_distinct_x(points: &[Point2<f64>]) -> usize {
    let mut xs: Vec<f64> = points.iter().map(|p| p.x).collect();
    xs.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    xs.dedup_by(|a, b| (*a - *b).abs() <= DISTINCT_TOLERANCE * a.abs().max(b.abs()).max(1.0));
    xs.len()
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn sample(coeffs: &[f64], xs: &[f64]) -> Vec<Point2<f64>> {
        let c = ReferenceCurve::from_coeffs(coeffs.to_vec());
        xs.iter().map(|&x| Point2::new(x, c.eval(x))).collect()
    }

    #[test]
    fn test_exact_fit() {
        let truth = [0.5, -0.2, 0.03, -0.001];

        // k + 1 points reproduce the polynomial
        let curve = fit_polynomial(&sample(&truth, &[2.0, 10.0, 25.0, 40.0]), 3).unwrap();
        for (c, t) in curve.coeffs().iter().zip(truth.iter()) {
            assert!((c - t).abs() < 1e-8, "{:?} != {:?}", curve.coeffs(), truth);
        }

        // As do more points lying on it
        let curve = fit_polynomial(
            &sample(&truth, &[-5.0, 0.0, 5.0, 12.0, 20.0, 33.0, 60.0]),
            3,
        )
        .unwrap();
        for (c, t) in curve.coeffs().iter().zip(truth.iter()) {
            assert!((c - t).abs() < 1e-8);
        }
    }

    #[test]
    fn test_least_squares() {
        // Noisy line, the fit is the regression line
        let pts = vec![
            Point2::new(0.0, 0.1),
            Point2::new(1.0, 0.9),
            Point2::new(2.0, 2.1),
            Point2::new(3.0, 2.9),
        ];
        let curve = fit_polynomial(&pts, 1).unwrap();
        assert!((curve.coeffs()[0] - 0.06).abs() < 1e-10);
        assert!((curve.coeffs()[1] - 0.96).abs() < 1e-10);
    }

    #[test]
    fn test_too_few_points() {
        let pts = vec![
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(2.0, 2.0),
        ];
        assert_eq!(
            fit_polynomial(&pts, 3),
            Err(FitError::TooFewPoints { order: 3, found: 3 })
        );

        // Repeated points don't count
        let pts = vec![
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(1.0, 1.0),
            Point2::new(2.0, 2.0),
        ];
        assert_eq!(
            fit_polynomial(&pts, 3),
            Err(FitError::TooFewPoints { order: 3, found: 3 })
        );
    }

    #[test]
    fn test_invalid_inputs() {
        let pts = vec![
            Point2::new(0.0, 0.0),
            Point2::new(1.0, std::f64::NAN),
            Point2::new(2.0, 2.0),
            Point2::new(3.0, 2.0),
        ];
        assert_eq!(fit_polynomial(&pts, 3), Err(FitError::NonFinite(1)));
        assert_eq!(fit_polynomial(&pts, 0), Err(FitError::ZeroOrder));
    }
}
