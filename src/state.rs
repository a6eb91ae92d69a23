//! Robot state aggregate and the small enums shared across modules

use serde::Serialize;
use std::fmt;

/// Which distance sensor / travel direction is meant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    Forward,
    Rear,
}

impl fmt::Display for Facing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Facing::Forward => write!(f, "ahead"),
            Facing::Rear => write!(f, "behind"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn index(self) -> usize {
        match self {
            Side::Left => 0,
            Side::Right => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MotorDirection {
    Forward,
    Reverse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Colour {
    Red,
    Yellow,
    Green,
    Blue,
    Purple,
    White,
}

impl Colour {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "red" => Some(Colour::Red),
            "yellow" => Some(Colour::Yellow),
            "green" => Some(Colour::Green),
            "blue" => Some(Colour::Blue),
            "purple" => Some(Colour::Purple),
            "white" => Some(Colour::White),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LineColour {
    Black,
    White,
}

impl fmt::Display for LineColour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineColour::Black => write!(f, "black"),
            LineColour::White => write!(f, "white"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PenPosition {
    Up,
    Down,
}

impl fmt::Display for PenPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PenPosition::Up => write!(f, "up"),
            PenPosition::Down => write!(f, "down"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Circle,
    Triangle,
    Square,
}

/// The single autonomous behaviour that `update()` advances each tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Mode {
    Manual,
    Wander,
    Follow,
    Home,
    Goto { x: f64, y: f64 },
    LineFollow { colour: LineColour },
    Avoid,
    Art { size: f64 },
    Play,
}

impl Mode {
    pub fn name(&self) -> &'static str {
        match self {
            Mode::Manual => "Manual",
            Mode::Wander => "Wander",
            Mode::Follow => "Follow",
            Mode::Home => "Home",
            Mode::Goto { .. } => "Goto",
            Mode::LineFollow { .. } => "Line follow",
            Mode::Avoid => "Avoid",
            Mode::Art { .. } => "Art",
            Mode::Play => "Play",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Goto { x, y } => write!(f, "Goto ({}, {})", x, y),
            Mode::LineFollow { colour } => write!(f, "Line follow ({})", colour),
            Mode::Art { size } => write!(f, "Art (size {})", size),
            other => write!(f, "{}", other.name()),
        }
    }
}

/// How much room there is in one direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clearance {
    Clear,
    Caution,
    Blocked,
}

impl Clearance {
    /// Negative readings are the sensor's "nothing in range" sentinel.
    pub fn classify(distance: f64, too_close: f64, middle_distance: f64) -> Self {
        if distance < 0.0 || distance > middle_distance {
            Clearance::Clear
        } else if distance <= too_close {
            Clearance::Blocked
        } else {
            Clearance::Caution
        }
    }
}

/// Everything the buggy knows about itself
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RobotState {
    /// Dead-reckoned position in steps (about 30 cm each)
    pub position: (f64, f64),
    /// Heading in degrees, always within [0, 360)
    pub direction: f64,
    /// Motor power percent; 0 means the default is applied on next use
    pub speed: u8,
    /// Sign of the last command per side: -1 reverse, 0 stopped, 1 forward
    pub left_motor: i8,
    pub right_motor: i8,
    pub mode: Mode,
    pub forward_distance: f64,
    pub reverse_distance: f64,
    pub light_barrier: u32,
    pub lights_auto: bool,
    pub pen_position: PenPosition,
    pub goto_target: (f64, f64),
}

impl RobotState {
    pub fn new(light_barrier: u32) -> Self {
        Self {
            position: (0.0, 0.0),
            direction: 0.0,
            speed: 0,
            left_motor: 0,
            right_motor: 0,
            mode: Mode::Manual,
            forward_distance: -1.0,
            reverse_distance: -1.0,
            light_barrier,
            lights_auto: true,
            pen_position: PenPosition::Up,
            goto_target: (0.0, 0.0),
        }
    }

    pub fn is_moving_forward(&self) -> bool {
        self.left_motor > 0 && self.right_motor > 0
    }

    pub fn is_reversing(&self) -> bool {
        self.left_motor < 0 && self.right_motor < 0
    }

    pub fn is_stopped(&self) -> bool {
        self.left_motor == 0 && self.right_motor == 0
    }
}

/// Wrap any angle in degrees into [0, 360)
pub fn normalize_degrees(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Round to hundredths; adding zero folds `-0.0` into `0.0`
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0 + 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clearance_bands() {
        assert_eq!(Clearance::classify(-1.0, 30.0, 60.0), Clearance::Clear);
        assert_eq!(Clearance::classify(10.0, 30.0, 60.0), Clearance::Blocked);
        assert_eq!(Clearance::classify(30.0, 30.0, 60.0), Clearance::Blocked);
        assert_eq!(Clearance::classify(45.0, 30.0, 60.0), Clearance::Caution);
        assert_eq!(Clearance::classify(60.0, 30.0, 60.0), Clearance::Caution);
        assert_eq!(Clearance::classify(60.5, 30.0, 60.0), Clearance::Clear);
        assert_eq!(Clearance::classify(250.0, 30.0, 60.0), Clearance::Clear);
    }

    #[test]
    fn test_normalize_degrees() {
        assert_eq!(normalize_degrees(0.0), 0.0);
        assert_eq!(normalize_degrees(360.0), 0.0);
        assert_eq!(normalize_degrees(-90.0), 270.0);
        assert_eq!(normalize_degrees(719.0), 359.0);
        assert!(normalize_degrees(-1e-15) < 360.0);
    }

    #[test]
    fn test_mode_display() {
        assert_eq!(Mode::Manual.to_string(), "Manual");
        assert_eq!(Mode::Goto { x: 3.0, y: -4.5 }.to_string(), "Goto (3, -4.5)");
        assert_eq!(
            Mode::LineFollow { colour: LineColour::White }.to_string(),
            "Line follow (white)"
        );
    }

    #[test]
    fn test_fresh_state() {
        let state = RobotState::new(30000);
        assert_eq!(state.mode, Mode::Manual);
        assert!(state.is_stopped());
        assert!(state.lights_auto);
        assert_eq!(state.pen_position, PenPosition::Up);
    }
}
