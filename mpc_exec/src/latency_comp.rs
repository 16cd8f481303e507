//! # Latency compensation
//!
//! Commands only reach the actuators after a fixed delay. The measured pose is projected forwards
//! over that delay with the last applied command so the optimiser starts from where the vehicle
//! will actually be once its output takes effect.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::trace;

use crate::vehicle::{bicycle_step, ActuatorCommand, Kinematics, Pose, VehicleParams};

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Project the pose and speed forwards by `latency_s` using the last command.
///
/// A zero latency returns the inputs unchanged. The output heading is wrapped into (-pi, pi].
pub fn compensate(
    pose: &Pose,
    speed_ms: f64,
    last_cmd: &ActuatorCommand,
    vehicle: &VehicleParams,
    latency_s: f64,
) -> (Pose, f64) {
    let act = last_cmd.to_actuation(vehicle);

    let next = bicycle_step(
        &Kinematics::from_pose(pose, speed_ms),
        &act,
        vehicle.lf_m,
        latency_s,
    );

    trace!(
        "Latency compensation over {} s: ({:.3}, {:.3}, {:.4}) -> ({:.3}, {:.3}, {:.4})",
        latency_s,
        pose.x_m,
        pose.y_m,
        pose.heading_rad,
        next.x_m,
        next.y_m,
        next.heading_rad
    );

    (next.pose(), next.speed_ms)
}
