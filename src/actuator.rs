//! Hardware boundary of the buggy
//!
//! The control core only ever talks to [`Actuator`]; the board driver (motor
//! H-bridge, ultrasonic rangers, LED strip, horn, pen servo, line sensors)
//! lives behind it. [`SimBuggy`] is an in-process stand-in that records every
//! command so the daemon and its tests can run without the board attached.

use crate::state::{Colour, Facing, MotorDirection, Side};
use crate::{BuggyError, Result};
use std::sync::{Arc, Mutex, MutexGuard};

/// Number of addressable LEDs on the buggy
pub const LED_COUNT: usize = 4;

/// Capability surface of the buggy hardware.
pub trait Actuator: Send {
    fn motor_on(&mut self, side: Side, direction: MotorDirection, power: u8);

    fn motor_off(&mut self, side: Side);

    /// Distance in cm to the nearest object; negative when nothing is in range.
    ///
    /// # Errors
    ///
    /// Returns [`BuggyError::SensorFault`] when the ranger does not answer.
    fn get_distance(&mut self, facing: Facing) -> Result<f64>;

    /// Stage a colour for one LED; takes effect on [`Actuator::show`].
    fn set_led(&mut self, index: usize, colour: Colour);

    fn clear_led(&mut self, index: usize);

    fn show(&mut self);

    fn set_brightness(&mut self, level: u8);

    fn beep(&mut self);

    fn set_pen_angle(&mut self, angle: u16);

    /// Raw (left, centre, right) line-sensor readings.
    fn read_line_sensors(&mut self) -> Result<(f64, f64, f64)>;

    /// Board temperature in degrees Celsius. Only a rough figure.
    fn read_temperature(&mut self) -> Result<f64>;
}

/// Everything the simulated board has been told, plus its sensor inputs
#[derive(Debug, Clone, PartialEq)]
pub struct SimState {
    pub motors: [Option<(MotorDirection, u8)>; 2],
    pub forward_distance: f64,
    pub rear_distance: f64,
    pub distance_fault: bool,
    pub line: (f64, f64, f64),
    pub line_fault: bool,
    pub temperature: f64,
    pub temperature_fault: bool,
    /// Staged colours
    pub leds: [Option<Colour>; LED_COUNT],
    /// Colours as of the last `show`
    pub shown: [Option<Colour>; LED_COUNT],
    pub brightness: u8,
    pub beeps: u32,
    pub pen_angle: Option<u16>,
    /// Number of motor_on calls, used to check that nothing moved
    pub motor_commands: u32,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            motors: [None, None],
            forward_distance: -1.0,
            rear_distance: -1.0,
            distance_fault: false,
            line: (0.0, 0.0, 0.0),
            line_fault: false,
            temperature: 20.0,
            temperature_fault: false,
            leds: [None; LED_COUNT],
            shown: [None; LED_COUNT],
            brightness: 0,
            beeps: 0,
            pen_angle: None,
            motor_commands: 0,
        }
    }
}

/// Simulated buggy. Clones share the same board, so a test can keep a handle
/// while the robot owns another.
#[derive(Debug, Clone, Default)]
pub struct SimBuggy {
    inner: Arc<Mutex<SimState>>,
}

impl SimBuggy {
    pub fn new() -> Self {
        Self::default()
    }

    fn board(&self) -> MutexGuard<'_, SimState> {
        // A panicking test thread must not take the whole board with it
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> SimState {
        self.board().clone()
    }

    pub fn set_distances(&self, forward: f64, rear: f64) {
        let mut board = self.board();
        board.forward_distance = forward;
        board.rear_distance = rear;
    }

    pub fn set_distance_fault(&self, fault: bool) {
        self.board().distance_fault = fault;
    }

    pub fn set_line(&self, left: f64, centre: f64, right: f64) {
        self.board().line = (left, centre, right);
    }

    pub fn set_temperature(&self, celsius: f64) {
        self.board().temperature = celsius;
    }

    pub fn set_temperature_fault(&self, fault: bool) {
        self.board().temperature_fault = fault;
    }

    pub fn motor(&self, side: Side) -> Option<(MotorDirection, u8)> {
        self.board().motors[side.index()]
    }

    pub fn motors_off(&self) -> bool {
        self.board().motors.iter().all(Option::is_none)
    }

    pub fn motor_commands(&self) -> u32 {
        self.board().motor_commands
    }

    pub fn shown_leds(&self) -> [Option<Colour>; LED_COUNT] {
        self.board().shown
    }

    pub fn beeps(&self) -> u32 {
        self.board().beeps
    }

    pub fn pen_angle(&self) -> Option<u16> {
        self.board().pen_angle
    }
}

impl Actuator for SimBuggy {
    fn motor_on(&mut self, side: Side, direction: MotorDirection, power: u8) {
        let mut board = self.board();
        board.motors[side.index()] = Some((direction, power));
        board.motor_commands += 1;
    }

    fn motor_off(&mut self, side: Side) {
        self.board().motors[side.index()] = None;
    }

    fn get_distance(&mut self, facing: Facing) -> Result<f64> {
        let board = self.board();
        if board.distance_fault {
            return Err(BuggyError::SensorFault(format!("no echo from the {} ranger", facing)));
        }
        Ok(match facing {
            Facing::Forward => board.forward_distance,
            Facing::Rear => board.rear_distance,
        })
    }

    fn set_led(&mut self, index: usize, colour: Colour) {
        if let Some(led) = self.board().leds.get_mut(index) {
            *led = Some(colour);
        }
    }

    fn clear_led(&mut self, index: usize) {
        if let Some(led) = self.board().leds.get_mut(index) {
            *led = None;
        }
    }

    fn show(&mut self) {
        let mut board = self.board();
        board.shown = board.leds;
    }

    fn set_brightness(&mut self, level: u8) {
        self.board().brightness = level;
    }

    fn beep(&mut self) {
        self.board().beeps += 1;
    }

    fn set_pen_angle(&mut self, angle: u16) {
        self.board().pen_angle = Some(angle);
    }

    fn read_line_sensors(&mut self) -> Result<(f64, f64, f64)> {
        let board = self.board();
        if board.line_fault {
            return Err(BuggyError::SensorFault("line sensors not responding".to_string()));
        }
        Ok(board.line)
    }

    fn read_temperature(&mut self) -> Result<f64> {
        let board = self.board();
        if board.temperature_fault {
            return Err(BuggyError::SensorFault("temperature sensor not responding".to_string()));
        }
        Ok(board.temperature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_board() {
        let handle = SimBuggy::new();
        let mut owned = handle.clone();

        owned.motor_on(Side::Left, MotorDirection::Forward, 50);
        assert_eq!(handle.motor(Side::Left), Some((MotorDirection::Forward, 50)));
        assert_eq!(handle.motor(Side::Right), None);

        owned.motor_off(Side::Left);
        assert!(handle.motors_off());
        assert_eq!(handle.motor_commands(), 1);
    }

    #[test]
    fn test_leds_take_effect_on_show() {
        let mut sim = SimBuggy::new();
        sim.set_led(0, Colour::Red);
        sim.set_led(LED_COUNT, Colour::Red); // out of range, ignored
        assert_eq!(sim.shown_leds()[0], None);

        sim.show();
        assert_eq!(sim.shown_leds()[0], Some(Colour::Red));
    }

    #[test]
    fn test_distance_fault() {
        let mut sim = SimBuggy::new();
        sim.set_distances(42.0, -1.0);
        assert_eq!(sim.get_distance(Facing::Forward).unwrap(), 42.0);

        sim.set_distance_fault(true);
        assert!(matches!(
            sim.get_distance(Facing::Rear),
            Err(BuggyError::SensorFault(_))
        ));
    }
}
