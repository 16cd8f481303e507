//! # Configuration checks
//!
//! Parameters are loaded once at startup and must be validated before the control loop is
//! allowed to start. Any failure here is fatal.

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Reasons a configuration can be rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Parameter `{name}` must be {requirement}, found {value}")]
    OutOfRange {
        name: &'static str,
        requirement: &'static str,
        value: f64,
    },

    #[error("Throttle range [{min}, {max}] must be ordered and inside [-1, 1]")]
    InvalidThrottleRange { min: f64, max: f64 },

    #[error(
        "A fit of order {order} needs at least {needed} waypoints, but the minimum waypoint count \
        is {min_num_waypoints}"
    )]
    FitOrderTooHigh {
        order: usize,
        needed: usize,
        min_num_waypoints: usize,
    },
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Reject `value` unless `ok` holds.
pub fn require(
    ok: bool,
    name: &'static str,
    requirement: &'static str,
    value: f64,
) -> Result<(), ConfigError> {
    if ok {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name,
            requirement,
            value,
        })
    }
}

/// Require a finite, strictly positive value.
pub fn require_positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    require(value.is_finite() && value > 0.0, name, "finite and positive", value)
}

/// Require a finite, non-negative value.
pub fn require_non_negative(name: &'static str, value: f64) -> Result<(), ConfigError> {
    require(
        value.is_finite() && value >= 0.0,
        name,
        "finite and non-negative",
        value,
    )
}
