//! # Reference curve
//!
//! The local reference path is a polynomial `y = c0 + c1 x + ... + ck x^k` fitted to the
//! waypoints once they have been expressed in the vehicle body frame.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod errors;
mod fit;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Serialize;

pub use errors::*;
pub use fit::*;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A polynomial reference curve, coefficients stored in ascending powers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceCurve {
    coeffs: Vec<f64>,
}

// ------------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// ------------------------------------------------------------------------------------------------

impl ReferenceCurve {
    /// Build a curve directly from its coefficients, lowest power first.
    pub fn from_coeffs(coeffs: Vec<f64>) -> Self {
        Self { coeffs }
    }

    pub fn coeffs(&self) -> &[f64] {
        &self.coeffs
    }

    /// Evaluate `f(x)`.
    pub fn eval(&self, x: f64) -> f64 {
        self.coeffs.iter().rev().fold(0.0, |acc, c| acc * x + c)
    }

    /// Evaluate `f'(x)`.
    pub fn deriv(&self, x: f64) -> f64 {
        self.coeffs
            .iter()
            .enumerate()
            .skip(1)
            .rev()
            .fold(0.0, |acc, (i, c)| acc * x + (i as f64) * c)
    }

    /// Evaluate `f''(x)`.
    pub fn second_deriv(&self, x: f64) -> f64 {
        self.coeffs
            .iter()
            .enumerate()
            .skip(2)
            .rev()
            .fold(0.0, |acc, (i, c)| acc * x + (i * (i - 1)) as f64 * c)
    }

    /// Heading of the curve's tangent at `x`.
    pub fn tangent_heading(&self, x: f64) -> f64 {
        self.deriv(x).atan()
    }
}
