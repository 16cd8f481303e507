//! Tracking errors relative to the reference curve

use serde::Serialize;

use super::ReferenceCurve;

/// Tracking errors of a vehicle sitting at the body frame origin with zero heading.
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize)]
pub struct TrackingErrors {
    /// Cross track error, positive when the path is to the left.
    ///
    /// Units: meters
    pub cte_m: f64,

    /// Heading error, vehicle heading minus path heading.
    ///
    /// Units: radians
    pub epsi_rad: f64,
}

/// Evaluate the tracking errors at the origin.
///
/// The cross track error is approximated by the curve's offset along body Y, `f(0)`, and the
/// heading error by `-atan(c1)` since the vehicle's own heading is zero.
pub fn extract_errors(curve: &ReferenceCurve) -> TrackingErrors {
    TrackingErrors {
        cte_m: curve.eval(0.0),
        epsi_rad: -curve.tangent_heading(0.0),
    }
}
