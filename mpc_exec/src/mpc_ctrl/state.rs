//! Implementations for the MpcCtrl state structure

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::{debug, error, warn};
use nalgebra::Point2;
use serde::Serialize;

// Internal
use super::{FallbackCause, MpcCtrlError, Params};
use crate::{
    frame_tf, latency_comp,
    mpc::{ActuatorTrajectory, Mpc},
    output::{self, CommandOutput},
    ref_curve::{extract_errors, fit_polynomial},
    vehicle::{ActuatorCommand, Pose, VehicleState},
};
use util::{
    archive::{Archived, Archiver},
    module::State,
    params,
    session::{self, Session},
};

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// Path tracking control module state
pub struct MpcCtrl {
    pub(crate) params: Params,

    mpc: Mpc,

    pub(crate) report: StatusReport,
    arch_report: Archiver,

    /// Shifted actuator trajectory of the last accepted solution
    warm_start: Option<ActuatorTrajectory>,

    num_ticks: u64,
}

/// Input data to MpcCtrl, all in the map frame.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InputData {
    pub waypoints_map: Vec<Point2<f64>>,

    pub pose_map: Pose,

    pub speed_ms: f64,

    /// The command currently acting on the vehicle
    pub last_cmd: ActuatorCommand,
}

/// Output of MpcCtrl, the command to publish and its overlays.
pub type OutputData = CommandOutput;

/// Status report for MpcCtrl processing.
///
/// Kept flat so it can be archived as a CSV row.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StatusReport {
    pub tick: u64,
    pub num_waypoints: usize,

    /// Speed after latency compensation
    pub speed_ms: f64,

    pub cte_m: f64,
    pub epsi_rad: f64,

    /// Published steering, normalised
    pub steering: f64,

    /// Published throttle
    pub throttle: f64,

    pub sqp_iterations: usize,
    pub solve_time_s: f64,
    pub defect: f64,
    pub converged: bool,
    pub warm_started: bool,

    /// Set if a fallback command was published instead of a solution
    pub fallback: Option<FallbackCause>,
}

/// Everything needed to reproduce a failed tick offline.
#[derive(Serialize)]
struct FailureDump {
    tick: u64,
    error: String,
    input: InputData,
    params: Params,
}

// ------------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// ------------------------------------------------------------------------------------------------

impl Default for MpcCtrl {
    fn default() -> Self {
        let params = Params::default();

        Self {
            mpc: Mpc::new(params.mpc.clone(), params.vehicle.clone()),
            params,
            report: StatusReport::default(),
            arch_report: Archiver::default(),
            warm_start: None,
            num_ticks: 0,
        }
    }
}

impl State for MpcCtrl {
    type InitData = String;
    type InitError = MpcCtrlError;

    type InputData = InputData;
    type OutputData = OutputData;
    type StatusReport = StatusReport;
    type ProcError = MpcCtrlError;

    /// Initialise the MpcCtrl module.
    ///
    /// Expected init data is the path to the parameter file, relative to the params directory.
    fn init(&mut self, init_data: Self::InitData, session: &Session) -> Result<(), Self::InitError> {
        // Load and check the parameters
        let params: Params =
            params::load(&init_data).map_err(MpcCtrlError::ParamLoadError)?;

        *self = MpcCtrl::new(params)?;

        // Initialise the archivers
        self.arch_report = Archiver::from_path(session, "mpc_ctrl/status_report.csv")
            .map_err(|e| MpcCtrlError::ArchiveInitError(e.to_string()))?;

        Ok(())
    }

    /// Perform one tick of path tracking control.
    ///
    /// Recoverable failures produce a fallback command and are flagged in the status report. Only
    /// an infeasible problem is returned as an error.
    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        self.start_tick(input_data);

        let output = match self.run_pipeline(input_data) {
            Ok(o) => o,
            Err(e) => self.fall_back(input_data, e)?,
        };

        Ok(self.end_tick(output))
    }
}

impl Archived for MpcCtrl {
    fn write(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.arch_report.serialise(self.report)
    }
}

impl MpcCtrl {
    /// Create a new controller from already loaded parameters.
    ///
    /// The parameters are validated, an invalid set is an `InvalidConfiguration` error.
    pub fn new(params: Params) -> Result<Self, MpcCtrlError> {
        params
            .validate()
            .map_err(MpcCtrlError::InvalidConfiguration)?;

        Ok(Self {
            mpc: Mpc::new(params.mpc.clone(), params.vehicle.clone()),
            params,
            ..Default::default()
        })
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// The warm start that will seed the next solve, if any.
    pub fn warm_start(&self) -> Option<&ActuatorTrajectory> {
        self.warm_start.as_ref()
    }

    /// Record a tick whose telemetry could not be turned into a usable input.
    ///
    /// The tick is counted, reported and dumped like any other `InvalidTelemetry` fallback, so
    /// `input_data` should carry at least the last applied command.
    pub fn reject_telemetry(
        &mut self,
        input_data: &InputData,
        reason: &'static str,
    ) -> Result<(OutputData, StatusReport), MpcCtrlError> {
        self.start_tick(input_data);

        let output = self.fall_back(input_data, MpcCtrlError::InvalidTelemetry(reason))?;

        Ok(self.end_tick(output))
    }

    /// Clear the status report for a new tick.
    fn start_tick(&mut self, input_data: &InputData) {
        self.report = StatusReport {
            tick: self.num_ticks,
            num_waypoints: input_data.waypoints_map.len(),
            ..Default::default()
        };
        self.num_ticks += 1;
    }

    fn end_tick(&mut self, output: CommandOutput) -> (OutputData, StatusReport) {
        self.report.steering = output.cmd.steering;
        self.report.throttle = output.cmd.throttle;

        (output, self.report)
    }

    /// Handle a failed tick, giving the fallback command or passing on unrecoverable errors.
    fn fall_back(
        &mut self,
        input_data: &InputData,
        err: MpcCtrlError,
    ) -> Result<CommandOutput, MpcCtrlError> {
        // Any failure invalidates the warm start
        self.warm_start = None;
        self.dump_failure(input_data, &err);

        let cause = match err.fallback_cause() {
            Some(c) => c,
            None => {
                error!("MpcCtrl tick {} failed: {}", self.report.tick, err);
                return Err(err);
            }
        };

        warn!("MpcCtrl fallback ({:?}): {}", cause, err);

        // A non-finite previous command can't be reused
        let last_cmd = match input_data.last_cmd.is_finite() {
            true => input_data.last_cmd,
            false => ActuatorCommand::default(),
        };

        self.report.fallback = Some(cause);

        Ok(CommandOutput::from_cmd(
            cause.fallback_cmd(self.params.fallback_policy, &last_cmd),
        ))
    }

    /// Run the pipeline, updating the status report as each stage completes.
    fn run_pipeline(&mut self, input: &InputData) -> Result<CommandOutput, MpcCtrlError> {
        check_telemetry(input)?;

        if input.waypoints_map.len() < self.params.min_num_waypoints {
            return Err(MpcCtrlError::TooFewWaypoints {
                min: self.params.min_num_waypoints,
                found: input.waypoints_map.len(),
            });
        }

        // ---- STATE ESTIMATION ----

        let (pose, speed_ms) = latency_comp::compensate(
            &input.pose_map,
            input.speed_ms,
            &input.last_cmd,
            &self.params.vehicle,
            self.params.latency_s,
        );
        self.report.speed_ms = speed_ms;

        // ---- REFERENCE ----

        let waypoints_body = frame_tf::map_to_body(&pose, &input.waypoints_map);

        let curve = fit_polynomial(&waypoints_body, self.params.fit_order)
            .map_err(MpcCtrlError::DegenerateFit)?;

        let errors = extract_errors(&curve);
        self.report.cte_m = errors.cte_m;
        self.report.epsi_rad = errors.epsi_rad;

        debug!(
            "MpcCtrl tick {}: v = {:.3}, cte = {:.4}, epsi = {:.4}",
            self.report.tick, speed_ms, errors.cte_m, errors.epsi_rad
        );

        // ---- SOLVE ----

        let state = VehicleState {
            speed_ms,
            cte_m: errors.cte_m,
            epsi_rad: errors.epsi_rad,
            ..Default::default()
        };

        let warm_start = match self.params.warm_start {
            true => self.warm_start.as_ref(),
            false => None,
        };

        let solution = self.mpc.solve(&state, &curve, warm_start)?;

        self.report.sqp_iterations = solution.stats.iterations;
        self.report.solve_time_s = solution.stats.solve_time_s;
        self.report.defect = solution.stats.defect;
        self.report.converged = solution.stats.converged;
        self.report.warm_started = solution.stats.warm_started;

        self.warm_start = match self.params.warm_start {
            true => Some(solution.actuators.shifted()),
            false => None,
        };

        // ---- OUTPUT ----

        Ok(output::package(
            &solution,
            &curve,
            &self.params.vehicle,
            &self.params.output,
        ))
    }

    /// Save the failed tick into the session directory.
    fn dump_failure(&self, input: &InputData, err: &MpcCtrlError) {
        session::save(
            format!("mpc_ctrl/failures/tick_{:06}.json", self.report.tick),
            FailureDump {
                tick: self.report.tick,
                error: err.to_string(),
                input: input.clone(),
                params: self.params.clone(),
            },
        );
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn check_telemetry(input: &InputData) -> Result<(), MpcCtrlError> {
    if !input.pose_map.is_finite() {
        return Err(MpcCtrlError::InvalidTelemetry("pose"));
    }
    if !input.speed_ms.is_finite() {
        return Err(MpcCtrlError::InvalidTelemetry("speed"));
    }
    if !input.last_cmd.is_finite() {
        return Err(MpcCtrlError::InvalidTelemetry("last command"));
    }
    if input
        .waypoints_map
        .iter()
        .any(|p| !(p.x.is_finite() && p.y.is_finite()))
    {
        return Err(MpcCtrlError::InvalidTelemetry("waypoints"));
    }

    Ok(())
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn test_params() -> Params {
        let mut p = Params::default();
        p.mpc.solver.max_solve_time_s = 5.0;
        p.mpc.solver.max_iters = 50;
        p
    }

    /// Waypoints along `y = f(x)` in a frame rotated and shifted from the map.
    fn waypoints(pose: &Pose, f: impl Fn(f64) -> f64) -> Vec<Point2<f64>> {
        let body: Vec<Point2<f64>> = [-5.0, 5.0, 15.0, 25.0, 40.0, 60.0]
            .iter()
            .map(|&x| Point2::new(x, f(x)))
            .collect();
        frame_tf::body_to_map(pose, &body)
    }

    #[test]
    fn test_straight_road() {
        let mut ctrl = MpcCtrl::new(test_params()).unwrap();
        let pose = Pose::new(120.0, -35.0, 2.4);

        let input = InputData {
            waypoints_map: waypoints(&pose, |_| 0.0),
            pose_map: pose,
            speed_ms: 15.0,
            last_cmd: ActuatorCommand::new(0.0, 0.5),
        };

        let (out, report) = ctrl.proc(&input).unwrap();

        assert_eq!(report.fallback, None);
        assert!(report.cte_m.abs() < 1e-6);
        assert!(report.epsi_rad.abs() < 1e-6);
        assert!((report.speed_ms - 15.05).abs() < 1e-9);
        assert!(out.cmd.steering.abs() < 1e-3);
        assert!(out.cmd.throttle > 0.0);
        assert_eq!(out.predicted.len(), 9);
        assert_eq!(out.reference.len(), 24);
        assert!(ctrl.warm_start().is_some());
    }

    #[test]
    fn test_offset_straight_road() {
        let mut params = test_params();
        params.latency_s = 0.0;
        let mut ctrl = MpcCtrl::new(params).unwrap();
        let pose = Pose::new(-12.0, 4.0, -0.7);

        // Straight road 0.3 m to the left of the vehicle
        let input = InputData {
            waypoints_map: waypoints(&pose, |_| 0.3),
            pose_map: pose,
            speed_ms: 10.0,
            last_cmd: ActuatorCommand::default(),
        };

        let (out, report) = ctrl.proc(&input).unwrap();

        assert_eq!(report.fallback, None);
        assert!((report.cte_m - 0.3).abs() < 1e-6);
        assert!(report.epsi_rad.abs() < 1e-6);
        assert!((report.speed_ms - 10.0).abs() < 1e-9);

        // Steers towards the road without leaving the steering limit
        assert!(out.cmd.steering < 0.0);
        assert!(out.cmd.steering >= -1.0);
        assert!(out.cmd.throttle > 0.0);

        // and the predicted path closes on the road rather than overshooting it
        let end = out.predicted[out.predicted.len() - 1];
        assert!(end.y > 0.0);
        assert!((end.y - 0.3).abs() < 0.3);
    }

    #[test]
    fn test_left_curve() {
        let mut ctrl = MpcCtrl::new(test_params()).unwrap();
        let pose = Pose::new(0.0, 0.0, 0.0);

        let input = InputData {
            waypoints_map: waypoints(&pose, |x| 0.01 * x * x),
            pose_map: pose,
            speed_ms: 10.0,
            last_cmd: ActuatorCommand::default(),
        };

        let (out, report) = ctrl.proc(&input).unwrap();

        assert_eq!(report.fallback, None);
        assert!(out.cmd.steering < 0.0);
        assert!(out.cmd.steering >= -1.0);
        assert!(out.predicted[out.predicted.len() - 1].y > 0.0);
    }

    #[test]
    fn test_degenerate_fallback() {
        let mut ctrl = MpcCtrl::new(test_params()).unwrap();
        let pose = Pose::new(0.0, 0.0, 0.0);
        let last_cmd = ActuatorCommand::new(0.3, 0.6);

        // Three collinear points
        let input = InputData {
            waypoints_map: vec![
                Point2::new(0.0, 0.0),
                Point2::new(10.0, 1.0),
                Point2::new(20.0, 2.0),
            ],
            pose_map: pose,
            speed_ms: 10.0,
            last_cmd,
        };

        let (out, report) = ctrl.proc(&input).unwrap();
        assert_eq!(report.fallback, Some(FallbackCause::DegenerateFit));
        assert_eq!(out.cmd, last_cmd);
        assert!(out.predicted.is_empty());

        // Enough points but only three distinct
        let mut input = input;
        input.waypoints_map.push(Point2::new(20.0, 2.0));
        let (out, report) = ctrl.proc(&input).unwrap();
        assert_eq!(report.fallback, Some(FallbackCause::DegenerateFit));
        assert_eq!(out.cmd, last_cmd);
        assert_eq!(report.tick, 1);
    }

    #[test]
    fn test_invalid_telemetry() {
        let mut ctrl = MpcCtrl::new(test_params()).unwrap();
        let pose = Pose::new(0.0, 0.0, 0.0);
        let last_cmd = ActuatorCommand::new(-0.2, 0.1);

        let input = InputData {
            waypoints_map: waypoints(&pose, |_| 0.0),
            pose_map: pose,
            speed_ms: std::f64::NAN,
            last_cmd,
        };

        let (out, report) = ctrl.proc(&input).unwrap();
        assert_eq!(report.fallback, Some(FallbackCause::InvalidTelemetry));
        assert_eq!(out.cmd, last_cmd);

        // A non-finite last command can't be reused
        let input = InputData {
            last_cmd: ActuatorCommand::new(std::f64::NAN, 0.0),
            speed_ms: 10.0,
            ..input
        };
        let (out, _) = ctrl.proc(&input).unwrap();
        assert_eq!(out.cmd, ActuatorCommand::default());
    }

    #[test]
    fn test_divergence_fallback_clears_warm_start() {
        let pose = Pose::new(0.0, 0.0, 0.0);
        let last_cmd = ActuatorCommand::new(-0.25, 0.7);
        let input = InputData {
            waypoints_map: waypoints(&pose, |x| 1.0 + 0.1 * x + 0.005 * x * x),
            pose_map: pose,
            speed_ms: 20.0,
            last_cmd,
        };

        // A healthy tick to build up the warm start
        let mut ctrl = MpcCtrl::new(test_params()).unwrap();
        ctrl.proc(&input).unwrap();
        let warm_len = ctrl.warm_start().map(|w| w.len());
        assert_eq!(warm_len, Some(ctrl.params().mpc.horizon_len - 1));

        // Starve the solver
        ctrl.params.mpc.solver.max_iters = 1;
        ctrl.params.mpc.solver.feasibility_tol = 1e-14;
        ctrl.mpc = Mpc::new(ctrl.params.mpc.clone(), ctrl.params.vehicle.clone());

        let (out, report) = ctrl.proc(&input).unwrap();
        assert_eq!(report.fallback, Some(FallbackCause::SolverDivergence));
        assert_eq!(out.cmd, ActuatorCommand::new(-0.25, 0.0));
        assert!(ctrl.warm_start().is_none());
    }

    #[test]
    fn test_invalid_configuration() {
        let mut params = Params::default();
        params.mpc.dt_s = 0.0;

        match MpcCtrl::new(params) {
            Err(MpcCtrlError::InvalidConfiguration(_)) => (),
            Err(e) => panic!("Expected an invalid configuration error, got {}", e),
            Ok(_) => panic!("Expected an invalid configuration error"),
        }
    }

    #[test]
    fn test_archive_report() {
        let path = std::env::temp_dir()
            .join(format!("mpc_ctrl_arch_test_{}", std::process::id()))
            .join("status_report.csv");

        let mut ctrl = MpcCtrl::new(test_params()).unwrap();
        ctrl.arch_report = Archiver::from_file_path(&path).unwrap();

        let input = InputData {
            waypoints_map: vec![Point2::new(0.0, 0.0); 4],
            pose_map: Pose::default(),
            speed_ms: 5.0,
            last_cmd: ActuatorCommand::default(),
        };
        ctrl.proc(&input).unwrap();
        ctrl.write().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("tick,num_waypoints,"));
        assert!(lines[0].ends_with(",fallback"));
        assert!(lines[1].ends_with(",DegenerateFit"));

        std::fs::remove_dir_all(path.parent().unwrap()).unwrap();
    }

    #[test]
    fn test_rejected_telemetry_archived() {
        let path = std::env::temp_dir()
            .join(format!("mpc_ctrl_reject_test_{}", std::process::id()))
            .join("status_report.csv");

        let mut ctrl = MpcCtrl::new(test_params()).unwrap();
        ctrl.arch_report = Archiver::from_file_path(&path).unwrap();

        let pose = Pose::new(3.0, -1.0, 0.2);
        let last_cmd = ActuatorCommand::new(0.15, 0.4);

        // A nominal tick first
        let input = InputData {
            waypoints_map: waypoints(&pose, |_| 0.0),
            pose_map: pose,
            speed_ms: 10.0,
            last_cmd,
        };
        ctrl.proc(&input).unwrap();
        ctrl.write().unwrap();
        assert!(ctrl.warm_start().is_some());

        // Then one whose waypoints couldn't be read
        let input = InputData {
            waypoints_map: Vec::new(),
            ..input
        };
        let (out, report) = ctrl.reject_telemetry(&input, "waypoints").unwrap();
        ctrl.write().unwrap();

        assert_eq!(out.cmd, last_cmd);
        assert_eq!(report.tick, 1);
        assert_eq!(report.fallback, Some(FallbackCause::InvalidTelemetry));
        assert!(ctrl.warm_start().is_none());

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("0,"));
        assert!(lines[1].ends_with(","));
        assert!(lines[2].starts_with("1,0,"));
        assert!(lines[2].ends_with(",InvalidTelemetry"));

        std::fs::remove_dir_all(path.parent().unwrap()).unwrap();
    }
}
