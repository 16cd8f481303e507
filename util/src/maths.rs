//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::{Float, FloatConst};

/// Map a value from one range into another.
pub fn lin_map<T>(source_range: (T, T), target_range: (T, T), value: T) -> T
where 
    T: Float 
{
    target_range.0 
        + ((value - source_range.0) 
        * (target_range.1 - target_range.0) 
        / (source_range.1 - source_range.0))
}

/// Clamp a value into `[min, max]`.
///
/// Never panics. Inverted bounds resolve to `min` and a NaN value saturates to `max`.
pub fn clamp<T>(value: T, min: T, max: T) -> T
where
    T: Float
{
    value.min(max).max(min)
}

/// Calculates the least nonnegative remainder of `lhs (mod rhs)`.
/// 
/// This function is taken from the std library as num is missing it.
///
/// In particular, the return value `r` satisfies `0.0 <= r < rhs.abs()` in
/// most cases. However, due to a floating point round-off error it can
/// result in `r == rhs.abs()`, violating the mathematical definition, if
/// `self` is much smaller than `rhs.abs()` in magnitude and `self < 0.0`.
pub fn rem_euclid<T>(lhs: T, rhs: T) -> T
where
    T: Float
{
    let r = lhs % rhs;
    if r < T::zero() { r + rhs.abs() } else { r }
}

/// Wrap an angle into the range (-pi, pi].
///
/// Angles already inside the range are returned unchanged (bit for bit).
pub fn wrap_to_pi<T>(angle: T) -> T
where
    T: Float + FloatConst
{
    let pi_t = T::PI();
    let tau_t = pi_t + pi_t;

    if angle > -pi_t && angle <= pi_t {
        return angle;
    }

    let wrapped = rem_euclid(angle + pi_t, tau_t) - pi_t;

    // rem_euclid gives [-pi, pi), flip the lower edge onto the upper one
    if wrapped <= -pi_t {
        wrapped + tau_t
    }
    else {
        wrapped
    }
}

/// Return the largest absolute element-wise difference between two slices.
///
/// If the slices do not have the same length `None` is returned.
pub fn max_abs_diff<T>(a: &[T], b: &[T]) -> Option<T>
where
    T: Float
{
    if a.len() != b.len() {
        return None;
    }

    Some(
        a.iter()
            .zip(b.iter())
            .fold(T::zero(), |acc, (&x, &y)| acc.max((x - y).abs()))
    )
}
