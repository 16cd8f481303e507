//! Main controller executable entry point.
//!
//! # Architecture
//!
//! The executable is driven by the simulator. Each line read from stdin (or from a replay file)
//! is one simulator frame:
//!
//!     - Manual frames are answered with a manual frame
//!     - Telemetry frames run one control tick:
//!         - Telemetry conversion into the pipeline input
//!         - MpcCtrl processing
//!         - Optional simulated actuation delay
//!         - Reply with the steering command on stdout
//!         - Archiving and fallback monitoring
//!
//! Logs are written to stderr and the session log file so that stdout only carries replies.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Report};
use log::{debug, error, info, warn};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use structopt::StructOpt;

// Internal
use comms_if::sim::{self, SimEvent};
use mpc_lib::{
    data_store::DataStore,
    mpc_ctrl::{FallbackPolicy, OutputData},
    params::{LastCmdSource, MpcExecParams},
    sim_adapter,
};
use util::{
    archive::Archived,
    host,
    logger::{logger_init, LevelFilter},
    module::State,
    session::{self, Session},
};

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "mpc_exec", about = "Model predictive path tracking controller")]
struct Opt {
    /// Replay simulator frames from this file rather than reading stdin
    #[structopt(parse(from_os_str))]
    replay: Option<PathBuf>,

    /// Executable parameter file, relative to the params directory
    #[structopt(long, default_value = "mpc_exec.toml")]
    exec_params: String,

    /// MpcCtrl parameter file, relative to the params directory
    #[structopt(long, default_value = "mpc_ctrl.toml")]
    ctrl_params: String,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let opt = Opt::from_args();

    // ---- EARLY INITIALISATION ----

    // Exec params are needed first since they locate the sessions directory
    let exec_params: MpcExecParams = util::params::load(&opt.exec_params)
        .wrap_err("Could not load exec params")?;

    // Initialise session
    let session = Session::new("mpc_exec", &exec_params.sessions_dir)
        .wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Debug, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("MPC Controller Executable\n");
    info!(
        "Running on: {:#?}",
        host::get_uname().wrap_err("Failed to get host information")?
    );
    info!("Session directory: {:?}\n", session.session_root);
    debug!("CLI options: {:?}", opt);
    info!("Exec parameters loaded");

    // ---- INITIALISE MODULES ----

    info!("Initialising modules...");

    let mut ds = DataStore::default();

    ds.mpc_ctrl
        .init(opt.ctrl_params.clone(), &session)
        .wrap_err("Failed to initialise MpcCtrl")?;
    info!("MpcCtrl init complete");

    info!("Module initialisation complete\n");

    let actuation_delay = Duration::from_secs_f64(ds.mpc_ctrl.params().latency_s);

    // ---- FRAME SOURCE ----

    let reader: Box<dyn BufRead> = match opt.replay {
        Some(ref path) => {
            info!("Replaying frames from {:?}", path);
            Box::new(BufReader::new(
                File::open(path).wrap_err_with(|| format!("Could not open {:?}", path))?,
            ))
        }
        None => {
            info!("Reading frames from stdin");
            Box::new(BufReader::new(io::stdin()))
        }
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();

    // ---- MAIN LOOP ----

    info!("Begining main loop\n");

    for line in reader.lines() {
        let line = line.wrap_err("Failed to read frame")?;

        // ---- FRAME PARSING ----

        let telem = match sim::parse_frame(&line) {
            Ok(Some(SimEvent::Telemetry(t))) => t,
            Ok(Some(SimEvent::Manual)) => {
                publish(&mut out, sim::MANUAL_FRAME)?;
                continue;
            }
            Ok(None) => continue,
            Err(e) => {
                warn!("Discarding frame: {}", e);
                continue;
            }
        };

        let tick_start_instant = Instant::now();

        ds.tick_start(session::get_elapsed_seconds());

        // ---- DATA INPUT ----

        let last_cmd = match exec_params.last_cmd_source {
            LastCmdSource::Telemetry => {
                sim_adapter::applied_cmd(&telem, &ds.mpc_ctrl.params().vehicle)
            }
            LastCmdSource::LastPublished => ds.last_published_cmd,
        };

        // ---- CONTROL PROCESSING ----

        let result = match sim_adapter::input_from_telemetry(&telem, last_cmd) {
            Ok(input) => {
                ds.mpc_ctrl_input = input;
                ds.mpc_ctrl.proc(&ds.mpc_ctrl_input)
            }
            Err(e) => {
                warn!("Rejecting telemetry: {}", e);

                ds.mpc_ctrl_input = sim_adapter::partial_input(&telem, last_cmd);
                ds.mpc_ctrl
                    .reject_telemetry(&ds.mpc_ctrl_input, "mismatched waypoint coordinates")
            }
        };

        match result {
            Ok((output, report)) => {
                ds.mpc_ctrl_output = output;
                ds.mpc_ctrl_status_rpt = report;
            }
            Err(e) => {
                // Leave the vehicle in a safe state before stopping
                error!("Unrecoverable MpcCtrl error, stopping the vehicle: {}", e);

                let safe_cmd = FallbackPolicy::HoldSteerZeroThrottle.apply(&last_cmd);
                reply(&mut out, &OutputData::from_cmd(safe_cmd))?;

                session.exit();
                return Err(e).wrap_err("MpcCtrl processing failed");
            }
        }

        // ---- OUTPUT ----

        if exec_params.simulate_actuation_delay {
            thread::sleep(actuation_delay);
        }

        reply(&mut out, &ds.mpc_ctrl_output)?;

        // ---- ARCHIVING ----

        if exec_params.archive {
            if let Err(e) = ds.mpc_ctrl.write() {
                warn!("Could not write MpcCtrl archive: {}", e);
            }
        }

        // ---- MONITORING ----

        ds.tick_end(exec_params.max_consec_fallbacks);

        debug!(
            "Tick {} complete in {:.03} s",
            ds.num_ticks,
            tick_start_instant.elapsed().as_secs_f64()
        );
    }

    info!("End of input reached after {} ticks", ds.num_ticks);

    session.exit();

    Ok(())
}

/// Send the steering reply for the given output to the simulator.
fn reply<W: Write>(out: &mut W, output: &OutputData) -> Result<(), Report> {
    let frame = sim::steer_frame(&sim_adapter::steer_cmd_from_output(output))
        .wrap_err("Failed to serialise steering reply")?;

    publish(out, &frame)
}

/// Write a single frame to the output and flush it.
fn publish<W: Write>(out: &mut W, frame: &str) -> Result<(), Report> {
    writeln!(out, "{}", frame).wrap_err("Failed to write frame")?;
    out.flush().wrap_err("Failed to flush output")
}
