//! # Data Store

use log::{error, info};

use crate::{mpc_ctrl, vehicle::ActuatorCommand};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Global data store for the executable.
#[derive(Default)]
pub struct DataStore {
    // Cycle management
    /// Number of telemetry ticks already executed
    pub num_ticks: u64,

    /// Session elapsed time at the start of the tick
    pub tick_time_s: f64,

    // MpcCtrl
    pub mpc_ctrl: mpc_ctrl::MpcCtrl,
    pub mpc_ctrl_input: mpc_ctrl::InputData,
    pub mpc_ctrl_output: mpc_ctrl::OutputData,
    pub mpc_ctrl_status_rpt: mpc_ctrl::StatusReport,

    /// The command most recently published
    pub last_published_cmd: ActuatorCommand,

    // Monitoring Counters
    /// Number of consecutive ticks answered with a fallback command
    pub num_consec_fallbacks: u64,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl DataStore {
    /// Perform actions required at the start of a tick.
    ///
    /// Clears those items that need clearing at the start of a tick.
    pub fn tick_start(&mut self, elapsed_s: f64) {
        self.mpc_ctrl_input = mpc_ctrl::InputData::default();
        self.mpc_ctrl_output = mpc_ctrl::OutputData::default();
        self.mpc_ctrl_status_rpt = mpc_ctrl::StatusReport::default();

        self.tick_time_s = elapsed_s;
    }

    /// Perform actions required at the end of a tick.
    ///
    /// Records the published command and tracks consecutive fallbacks, logging an error once the
    /// limit is exceeded.
    pub fn tick_end(&mut self, max_consec_fallbacks: u64) {
        self.last_published_cmd = self.mpc_ctrl_output.cmd;

        match self.mpc_ctrl_status_rpt.fallback {
            Some(_) => {
                self.num_consec_fallbacks += 1;

                if self.num_consec_fallbacks == max_consec_fallbacks + 1 {
                    error!(
                        "More than {} consecutive fallback commands issued",
                        max_consec_fallbacks
                    );
                }
            }
            None => {
                if self.num_consec_fallbacks > max_consec_fallbacks {
                    info!(
                        "Nominal control restored after {} fallback ticks",
                        self.num_consec_fallbacks
                    );
                }
                self.num_consec_fallbacks = 0;
            }
        }

        self.num_ticks += 1;
    }
}
