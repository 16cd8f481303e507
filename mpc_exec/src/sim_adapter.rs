//! # Simulator adapter
//!
//! Converts between the simulator's messages and the control pipeline's types. Nothing in the
//! pipeline depends on this module.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::sim::{SteerCmd, Telemetry};
use nalgebra::Point2;

use crate::{
    mpc_ctrl::{InputData, OutputData},
    vehicle::{Actuation, ActuatorCommand, Pose, VehicleParams},
};

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AdapterError {
    #[error("Telemetry has {x} waypoint X coordinates but {y} Y coordinates")]
    WaypointLengthMismatch { x: usize, y: usize },
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// The command reported by the simulator as currently applied.
///
/// The simulator reports its steering angle in radians, this is normalised against the vehicle's
/// steering limit.
pub fn applied_cmd(telem: &Telemetry, vehicle: &VehicleParams) -> ActuatorCommand {
    ActuatorCommand::from_actuation(
        &Actuation::new(telem.steering_angle, telem.throttle),
        vehicle,
    )
}

/// Build the pipeline input from telemetry and the command last acting on the vehicle.
pub fn input_from_telemetry(
    telem: &Telemetry,
    last_cmd: ActuatorCommand,
) -> Result<InputData, AdapterError> {
    if telem.ptsx.len() != telem.ptsy.len() {
        return Err(AdapterError::WaypointLengthMismatch {
            x: telem.ptsx.len(),
            y: telem.ptsy.len(),
        });
    }

    Ok(InputData {
        waypoints_map: telem
            .ptsx
            .iter()
            .zip(telem.ptsy.iter())
            .map(|(&x, &y)| Point2::new(x, y))
            .collect(),
        pose_map: Pose::new(telem.x, telem.y, telem.psi),
        speed_ms: telem.speed,
        last_cmd,
    })
}

/// The input left once the telemetry's waypoints have been rejected, with no waypoints.
pub fn partial_input(telem: &Telemetry, last_cmd: ActuatorCommand) -> InputData {
    InputData {
        waypoints_map: Vec::new(),
        pose_map: Pose::new(telem.x, telem.y, telem.psi),
        speed_ms: telem.speed,
        last_cmd,
    }
}

/// Build the reply to the simulator from the pipeline's output.
pub fn steer_cmd_from_output(output: &OutputData) -> SteerCmd {
    let (mpc_x, mpc_y) = output.predicted.iter().map(|p| (p.x, p.y)).unzip();
    let (next_x, next_y) = output.reference.iter().map(|p| (p.x, p.y)).unzip();

    SteerCmd {
        steering_angle: output.cmd.steering,
        throttle: output.cmd.throttle,
        mpc_x,
        mpc_y,
        next_x,
        next_y,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn telemetry() -> Telemetry {
        Telemetry {
            ptsx: vec![-32.16173, -43.49173, -61.09, -78.29172],
            ptsy: vec![113.361, 105.941, 92.88499, 78.73102],
            x: -40.62,
            y: 108.73,
            psi: 3.733651,
            speed: 0.4380091,
            steering_angle: -0.2181662,
            throttle: 0.5,
        }
    }

    #[test]
    fn test_input_from_telemetry() {
        let telem = telemetry();
        let vehicle = VehicleParams::default();
        let last = applied_cmd(&telem, &vehicle);

        assert!((last.steering + 0.5).abs() < 1e-6);
        assert_eq!(last.throttle, 0.5);

        let input = input_from_telemetry(&telem, last).unwrap();
        assert_eq!(input.waypoints_map.len(), 4);
        assert_eq!(input.waypoints_map[2], Point2::new(-61.09, 92.88499));
        assert!((input.pose_map.heading_rad - (3.733651 - std::f64::consts::TAU)).abs() < 1e-12);
        assert_eq!(input.speed_ms, 0.4380091);
        assert_eq!(input.last_cmd, last);
    }

    #[test]
    fn test_mismatched_waypoints() {
        let mut telem = telemetry();
        telem.ptsy.pop();

        assert_eq!(
            input_from_telemetry(&telem, ActuatorCommand::default()).unwrap_err(),
            AdapterError::WaypointLengthMismatch { x: 4, y: 3 }
        );

        let last = ActuatorCommand::new(0.2, 0.4);
        let input = partial_input(&telem, last);
        assert!(input.waypoints_map.is_empty());
        assert_eq!(input.speed_ms, 0.4380091);
        assert_eq!(input.last_cmd, last);
    }

    #[test]
    fn test_steer_cmd_from_output() {
        let output = OutputData {
            cmd: ActuatorCommand::new(-0.3, 0.9),
            predicted: vec![Point2::new(1.0, 0.1), Point2::new(2.0, 0.3)],
            reference: vec![Point2::new(2.5, 0.2)],
        };

        let cmd = steer_cmd_from_output(&output);
        assert_eq!(cmd.steering_angle, -0.3);
        assert_eq!(cmd.throttle, 0.9);
        assert_eq!(cmd.mpc_x, vec![1.0, 2.0]);
        assert_eq!(cmd.mpc_y, vec![0.1, 0.3]);
        assert_eq!(cmd.next_x, vec![2.5]);
        assert_eq!(cmd.next_y, vec![0.2]);
    }
}
