//! # MPC Executable Parameters
//!
//! This module provides parameters for the controller executable.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MpcExecParams {
    /// Sleep for the actuation latency before publishing each command, mimicking actuators that
    /// don't respond instantly.
    pub simulate_actuation_delay: bool,

    /// Where the previously applied command is taken from.
    pub last_cmd_source: LastCmdSource,

    /// Write the per-tick status reports to the session archive.
    pub archive: bool,

    /// Directory, relative to the software root, in which sessions are created.
    pub sessions_dir: String,

    /// Number of consecutive fallback ticks after which an error is logged.
    pub max_consec_fallbacks: u64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub enum LastCmdSource {
    /// The steering and throttle reported in the telemetry
    Telemetry,

    /// The command this executable last published
    LastPublished,
}
