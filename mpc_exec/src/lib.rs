//! # MPC controller library.
//!
//! This library allows other crates in the workspace (and the benchmarks) to access items defined
//! inside the controller crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Configuration validation errors shared by all parameter structures
pub mod config;

/// Executable data store
pub mod data_store;

/// Transforms between the map frame and the vehicle body frame
pub mod frame_tf;

/// Projects the vehicle state forward over the actuation latency
pub mod latency_comp;

/// Receding horizon optimisation of the actuator demands
pub mod mpc;

/// Path tracking control module - runs the full pipeline once per tick
pub mod mpc_ctrl;

/// Packages solver results for the outside world
pub mod output;

/// Executable parameters
pub mod params;

/// Reference curve fitting and tracking error extraction
pub mod ref_curve;

/// Conversions between simulator messages and the pipeline's data types
pub mod sim_adapter;

/// Vehicle model and shared vehicle types
pub mod vehicle;
