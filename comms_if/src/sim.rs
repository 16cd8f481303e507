//! # Simulator messages
//!
//! The driving simulator talks a SocketIO-style text protocol. Every event is
//! a single frame of the form
//!
//! ```text
//! 42["<event>",{...}]
//! ```
//!
//! where `4` marks a websocket message and `2` an event. Telemetry arrives as
//! a `telemetry` event, and the controller answers with either a `steer` event
//! carrying the actuator command and diagnostic overlays, or a `manual` event
//! if there was no data to act on.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::trace;
use serde::{Deserialize, Serialize};
use serde_json::{self, Value};
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Prefix marking a websocket event frame.
const EVENT_PREFIX: &str = "42";

/// Reply sent when the simulator has no data for us (manual driving).
pub const MANUAL_FRAME: &str = "42[\"manual\",{}]";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Telemetry sent by the simulator each tick.
///
/// All positions are in the map frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    /// Waypoint X coordinates
    pub ptsx: Vec<f64>,

    /// Waypoint Y coordinates
    pub ptsy: Vec<f64>,

    /// Vehicle X position
    pub x: f64,

    /// Vehicle Y position
    pub y: f64,

    /// Vehicle heading in radians
    pub psi: f64,

    /// Vehicle speed
    pub speed: f64,

    /// Steering angle currently applied by the vehicle, in radians
    pub steering_angle: f64,

    /// Throttle currently applied by the vehicle, in [-1, 1]
    pub throttle: f64,
}

/// Command sent back to the simulator.
///
/// All overlay points are in the vehicle body frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SteerCmd {
    /// Normalised steering demand in [-1, 1]
    pub steering_angle: f64,

    /// Throttle demand in [-1, 1]
    pub throttle: f64,

    /// Predicted trajectory X coordinates
    pub mpc_x: Vec<f64>,

    /// Predicted trajectory Y coordinates
    pub mpc_y: Vec<f64>,

    /// Reference path X coordinates
    pub next_x: Vec<f64>,

    /// Reference path Y coordinates
    pub next_y: Vec<f64>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// An event received from the simulator.
#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    /// New telemetry to act on
    Telemetry(Telemetry),

    /// The simulator had no data, it is being driven manually
    Manual,
}

/// Possible frame parsing and formatting errors.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Frame contains invalid JSON: {0}")]
    InvalidJson(serde_json::Error),

    #[error("Frame payload is not an [event, data] array")]
    InvalidEnvelope,

    #[error("Unrecognised event \"{0}\"")]
    UnknownEvent(String),

    #[error("Telemetry data is malformed: {0}")]
    InvalidTelemetry(serde_json::Error),

    #[error("Could not serialise the command: {0}")]
    SerialiseError(serde_json::Error),
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Parse a single frame received from the simulator.
///
/// Returns `Ok(None)` for frames which are not event frames (for example
/// connection handshakes), which should be ignored.
pub fn parse_frame(frame: &str) -> Result<Option<SimEvent>, FrameError> {
    let frame = frame.trim();

    if frame.len() <= EVENT_PREFIX.len() || !frame.starts_with(EVENT_PREFIX) {
        trace!("Ignoring non-event frame: {}", frame);
        return Ok(None);
    }

    let payload = match event_payload(frame) {
        Some(p) => p,
        None => return Ok(Some(SimEvent::Manual)),
    };

    // Parse the string into a value
    let val: Value = serde_json::from_str(payload).map_err(FrameError::InvalidJson)?;

    let event = match val.get(0).and_then(Value::as_str) {
        Some(e) => e,
        None => return Err(FrameError::InvalidEnvelope),
    };

    match event {
        "telemetry" => {
            let data = val.get(1).cloned().ok_or(FrameError::InvalidEnvelope)?;
            let telem: Telemetry =
                serde_json::from_value(data).map_err(FrameError::InvalidTelemetry)?;
            Ok(Some(SimEvent::Telemetry(telem)))
        }
        e => Err(FrameError::UnknownEvent(String::from(e))),
    }
}

/// Format a steer command into a frame ready to send to the simulator.
pub fn steer_frame(cmd: &SteerCmd) -> Result<String, FrameError> {
    let data = serde_json::to_string(cmd).map_err(FrameError::SerialiseError)?;

    Ok(format!("{}[\"steer\",{}]", EVENT_PREFIX, data))
}

/// Extract the JSON event array from a frame.
///
/// Returns `None` if the frame carries no data, which is signalled by the
/// simulator with a `null` payload.
fn event_payload(frame: &str) -> Option<&str> {
    if frame.contains("null") {
        return None;
    }

    let start = frame.find('[')?;
    let end = frame.rfind("}]")?;

    if end < start {
        return None;
    }

    Some(&frame[start..end + 2])
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    const TELEMETRY_FRAME: &str = "42[\"telemetry\",{\"ptsx\":[-32.16173,-43.49173,-61.09,-78.29172,-93.05002,-107.7717],\"ptsy\":[113.361,105.941,92.88499,78.73102,65.34102,50.57938],\"psi\":3.733651,\"x\":-40.62,\"y\":108.73,\"speed\":0.4380091,\"steering_angle\":0.0,\"throttle\":0.0}]";

    #[test]
    fn test_parse_telemetry() {
        let event = parse_frame(TELEMETRY_FRAME).unwrap();

        let telem = match event {
            Some(SimEvent::Telemetry(t)) => t,
            e => panic!("Expected telemetry, got {:?}", e),
        };

        assert_eq!(telem.ptsx.len(), 6);
        assert_eq!(telem.ptsy.len(), 6);
        assert_eq!(telem.ptsx[0], -32.16173);
        assert_eq!(telem.x, -40.62);
        assert_eq!(telem.psi, 3.733651);
        assert_eq!(telem.speed, 0.4380091);
    }

    #[test]
    fn test_parse_manual() {
        assert_eq!(parse_frame("42[\"telemetry\",null]").unwrap(), Some(SimEvent::Manual));
    }

    #[test]
    fn test_parse_ignores_non_events() {
        assert_eq!(parse_frame("2").unwrap(), None);
        assert_eq!(parse_frame("0{\"sid\":\"abc\"}").unwrap(), None);
        assert_eq!(parse_frame("").unwrap(), None);
    }

    #[test]
    fn test_parse_errors() {
        match parse_frame("42[\"reset\",{}]") {
            Err(FrameError::UnknownEvent(e)) => assert_eq!(e, "reset"),
            r => panic!("Expected unknown event, got {:?}", r),
        }

        match parse_frame("42[\"telemetry\",{\"x\":1.0}]") {
            Err(FrameError::InvalidTelemetry(_)) => (),
            r => panic!("Expected invalid telemetry, got {:?}", r),
        }

        match parse_frame("42[\"telemetry\",{\"x\":}]") {
            Err(FrameError::InvalidJson(_)) => (),
            r => panic!("Expected invalid json, got {:?}", r),
        }
    }

    #[test]
    fn test_steer_frame() {
        let cmd = SteerCmd {
            steering_angle: -0.25,
            throttle: 1.0,
            mpc_x: vec![1.0],
            mpc_y: vec![0.5],
            next_x: vec![2.5],
            next_y: vec![0.0],
        };

        let frame = steer_frame(&cmd).unwrap();
        assert_eq!(
            frame,
            "42[\"steer\",{\"steering_angle\":-0.25,\"throttle\":1.0,\"mpc_x\":[1.0],\"mpc_y\":[0.5],\"next_x\":[2.5],\"next_y\":[0.0]}]"
        );
    }
}
