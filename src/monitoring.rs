//! JSON-based pose and mode monitoring
//!
//! When publishing is enabled, the update loop hands every post-tick state to
//! [`MonitorOutput`], which prints a JSON line whenever the dead-reckoned pose
//! or the active mode has changed since the last line.

use crate::state::{Mode, RobotState};
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

/// Current time as seconds since UNIX epoch, rounded to microseconds
pub fn current_timestamp() -> f64 {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64();
    (timestamp * 1_000_000.0).round() / 1_000_000.0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoseData {
    pub stime: f64,
    #[serde(rename = "type")]
    pub event_type: String,
    /// Dead-reckoned (x, y) in steps
    pub position: [f64; 2],
    /// Heading in degrees
    pub direction: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModeData {
    pub stime: f64,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(flatten)]
    pub mode: Mode,
    pub mode_name: String,
}

impl PoseData {
    pub fn new_rounded(
        position: (f64, f64),
        direction: f64,
        stime: f64,
        decimal_places: u32,
    ) -> Self {
        let round_value = |value: f64| -> f64 {
            let multiplier = 10.0_f64.powi(decimal_places as i32);
            (value * multiplier).round() / multiplier
        };

        Self {
            stime,
            event_type: "pose".to_string(),
            position: [round_value(position.0), round_value(position.1)],
            direction: round_value(direction),
        }
    }
}

impl ModeData {
    pub fn new(mode: Mode, stime: f64) -> Self {
        Self {
            stime,
            event_type: "mode".to_string(),
            mode,
            mode_name: mode.to_string(),
        }
    }
}

/// Change detector for monitor events
pub struct MonitorOutput {
    last_pose: Option<((f64, f64), f64)>,
    last_mode: Option<Mode>,
    pub decimal_places: u32,
}

impl MonitorOutput {
    pub fn new(decimal_places: u32) -> Self {
        Self {
            last_pose: None,
            last_mode: None,
            decimal_places,
        }
    }

    pub fn should_output_pose(&mut self, position: (f64, f64), direction: f64) -> bool {
        if self.last_pose == Some((position, direction)) {
            return false;
        }
        self.last_pose = Some((position, direction));
        true
    }

    pub fn should_output_mode(&mut self, mode: Mode) -> bool {
        if self.last_mode == Some(mode) {
            return false;
        }
        self.last_mode = Some(mode);
        true
    }

    /// Events due for this state, already serialized, pose first
    pub fn events_for(&mut self, state: &RobotState) -> Vec<String> {
        let stime = current_timestamp();
        let mut events = Vec::new();

        if self.should_output_pose(state.position, state.direction) {
            let pose = PoseData::new_rounded(
                state.position,
                state.direction,
                stime,
                self.decimal_places,
            );
            push_json(&mut events, &pose);
        }
        if self.should_output_mode(state.mode) {
            push_json(&mut events, &ModeData::new(state.mode, stime));
        }
        events
    }

    pub fn output(&mut self, state: &RobotState) {
        for event in self.events_for(state) {
            println!("{}", event);
        }
    }
}

fn push_json<T: Serialize>(events: &mut Vec<String>, event: &T) {
    match serde_json::to_string(event) {
        Ok(json) => events.push(json),
        Err(e) => warn!("Failed to serialize monitor event: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pose_rounding() {
        let pose = PoseData::new_rounded((1.23456, -0.0049), 89.999, 0.0, 2);
        assert_eq!(pose.position, [1.23, -0.0]);
        assert_eq!(pose.direction, 90.0);
    }

    #[test]
    fn test_only_changes_are_emitted() {
        let mut monitor = MonitorOutput::new(2);
        let mut state = RobotState::new(30000);

        let first = monitor.events_for(&state);
        assert_eq!(first.len(), 2);
        assert!(first[0].contains("\"type\":\"pose\""));
        assert!(first[1].contains("\"type\":\"mode\""));

        assert!(monitor.events_for(&state).is_empty());

        state.position = (0.0, 1.0);
        let moved = monitor.events_for(&state);
        assert_eq!(moved.len(), 1);
        assert!(moved[0].contains("\"position\":[0.0,1.0]"));

        state.mode = Mode::Goto { x: 3.0, y: 4.0 };
        let mode = monitor.events_for(&state);
        assert_eq!(mode.len(), 1);
        assert!(mode[0].contains("\"mode\":\"goto\""));
        assert!(mode[0].contains("\"x\":3.0"));
    }
}
