//! Buggy controller: motion primitives, mode transitions and the per-tick update
//!
//! Position and heading are dead-reckoned. A step is a motor pulse whose
//! length is derived from the commanded power, and a turn is a one-sided spin
//! timed from a calibrated rotation rate. The estimate is updated from the
//! *intended* motion and drifts over time; the buggy has no encoders to
//! correct it.
//!
//! The controller is shared between the update loop and the command session
//! as a [`SharedRobot`]. Each primitive runs halt, act, halt while the caller
//! holds the lock, so a tick never interleaves with a command-issued motion.

use crate::actuator::{Actuator, LED_COUNT};
use crate::clock::Clock;
use crate::config::DaemonConfig;
use crate::state::{
    normalize_degrees, round2, Clearance, Colour, Facing, LineColour, Mode, MotorDirection,
    PenPosition, RobotState, Side,
};
use crate::{BuggyError, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Robot handle shared by the update loop and the command session
pub type SharedRobot = Arc<Mutex<Robot>>;

/// Smallest accepted size for shapes, art and explicit step requests
pub const MIN_SHAPE_SIZE: f64 = 0.1;
pub const MAX_SHAPE_SIZE: f64 = 10.0;

pub struct Robot {
    pub(crate) state: RobotState,
    pub(crate) actuator: Box<dyn Actuator>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: DaemonConfig,
    pub(crate) rng: StdRng,
}

impl Robot {
    /// Create a controller with the motors stopped, the lights parked and
    /// all dead-reckoning state at its origin.
    pub fn new(actuator: Box<dyn Actuator>, clock: Arc<dyn Clock>, config: DaemonConfig) -> Self {
        let mut robot = Self {
            state: RobotState::new(config.robot.light_barrier),
            actuator,
            clock,
            config,
            rng: StdRng::from_entropy(),
        };
        robot.halt();
        robot.reset();
        robot
    }

    /// Replace the random source, used to make wandering reproducible
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn into_shared(self) -> SharedRobot {
        Arc::new(Mutex::new(self))
    }

    pub fn state(&self) -> &RobotState {
        &self.state
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    pub fn mode(&self) -> Mode {
        self.state.mode
    }

    pub fn position(&self) -> (f64, f64) {
        self.state.position
    }

    pub fn direction(&self) -> f64 {
        self.state.direction
    }

    pub fn speed(&self) -> u8 {
        self.state.speed
    }

    /// Back to the power-on state: origin, heading 0, manual mode, green lights
    pub fn reset(&mut self) {
        self.halt();
        self.state = RobotState::new(self.config.robot.light_barrier);
        self.set_pen(PenPosition::Up);
        self.actuator.set_brightness(self.config.robot.light_level);
        self.set_lights(Colour::Green);
        if let Err(e) = self.read_distance(Facing::Forward) {
            warn!("Forward ranger unavailable during reset: {}", e);
        }
        debug!("Robot state reset");
    }

    /// Stop both motors
    pub fn halt(&mut self) {
        self.actuator.motor_off(Side::Left);
        self.actuator.motor_off(Side::Right);
        self.state.left_motor = 0;
        self.state.right_motor = 0;
    }

    // ------------------------------------------------------------------
    // Lights, horn, pen
    // ------------------------------------------------------------------

    pub fn set_lights(&mut self, colour: Colour) {
        for led in 0..LED_COUNT {
            self.actuator.set_led(led, colour);
        }
        self.actuator.show();
    }

    pub fn lights_off(&mut self) {
        for led in 0..LED_COUNT {
            self.actuator.clear_led(led);
        }
        self.actuator.show();
    }

    pub fn lights_auto(&self) -> bool {
        self.state.lights_auto
    }

    pub fn set_lights_auto(&mut self, auto: bool) {
        self.state.lights_auto = auto;
    }

    pub fn honk(&mut self) {
        self.actuator.beep();
    }

    pub fn set_pen(&mut self, position: PenPosition) {
        let angle = match position {
            PenPosition::Up => self.config.calibration.pen_up_angle,
            PenPosition::Down => self.config.calibration.pen_down_angle,
        };
        self.actuator.set_pen_angle(angle);
        self.state.pen_position = position;
    }

    // ------------------------------------------------------------------
    // Setters
    // ------------------------------------------------------------------

    /// Set motor power (0-100). Running motors pick up the new power at once.
    pub fn set_speed(&mut self, speed: i64) -> Result<()> {
        let speed = u8::try_from(speed)
            .ok()
            .filter(|s| *s <= 100)
            .ok_or_else(|| BuggyError::invalid("Speed needs to be in the range of 0-100"))?;
        self.state.speed = speed;

        for (side, sign) in [
            (Side::Left, self.state.left_motor),
            (Side::Right, self.state.right_motor),
        ] {
            match sign {
                s if s > 0 => self.actuator.motor_on(side, MotorDirection::Forward, speed),
                s if s < 0 => self.actuator.motor_on(side, MotorDirection::Reverse, speed),
                _ => self.actuator.motor_off(side),
            }
        }
        Ok(())
    }

    pub fn set_direction(&mut self, direction: f64) -> Result<()> {
        if !(0.0..360.0).contains(&direction) {
            return Err(BuggyError::invalid("Direction needs to be in the range of 0-359"));
        }
        self.state.direction = direction;
        Ok(())
    }

    pub fn set_position(&mut self, x: f64, y: f64) -> Result<()> {
        if !x.is_finite() || !y.is_finite() {
            return Err(BuggyError::invalid("Coordinates need to be finite numbers"));
        }
        self.state.position = (x, y);
        Ok(())
    }

    pub fn set_light_barrier(&mut self, barrier: i64) -> Result<()> {
        let barrier = u32::try_from(barrier)
            .ok()
            .filter(|b| *b <= 65000)
            .ok_or_else(|| {
                BuggyError::invalid("Light barrier needs to be in the range of 0-65000")
            })?;
        self.state.light_barrier = barrier;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Sensing
    // ------------------------------------------------------------------

    /// Read one ranger and remember the value
    pub fn read_distance(&mut self, facing: Facing) -> Result<f64> {
        let distance = self.actuator.get_distance(facing)?;
        match facing {
            Facing::Forward => self.state.forward_distance = distance,
            Facing::Rear => self.state.reverse_distance = distance,
        }
        Ok(distance)
    }

    pub fn read_line_sensors(&mut self) -> Result<(f64, f64, f64)> {
        self.actuator.read_line_sensors()
    }

    /// Board temperature in Celsius, rounded to hundredths
    pub fn read_temperature(&mut self) -> Result<f64> {
        self.actuator.read_temperature().map(round2)
    }

    pub(crate) fn clearance_of(&self, distance: f64) -> Clearance {
        Clearance::classify(
            distance,
            self.config.robot.too_close,
            self.config.robot.middle_distance,
        )
    }

    /// Cached clearance from the last reading in that direction
    pub fn clearance(&self, facing: Facing) -> Clearance {
        match facing {
            Facing::Forward => self.clearance_of(self.state.forward_distance),
            Facing::Rear => self.clearance_of(self.state.reverse_distance),
        }
    }

    /// Fresh reading; anything short of clear refuses the move
    fn check_clearance(&mut self, facing: Facing) -> Result<()> {
        let distance = self.read_distance(facing)?;
        if self.clearance_of(distance) != Clearance::Clear {
            debug!("Refusing to move {}: object at {}cm", facing, distance);
            return Err(BuggyError::Blocked(facing));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Motion primitives
    // ------------------------------------------------------------------

    fn ensure_speed(&mut self) {
        if self.state.speed == 0 {
            self.state.speed = self.config.robot.default_speed;
        }
    }

    fn engage(&mut self, facing: Facing) {
        let (sign, direction) = match facing {
            Facing::Forward => (1, MotorDirection::Forward),
            Facing::Rear => (-1, MotorDirection::Reverse),
        };
        self.state.left_motor = sign;
        self.state.right_motor = sign;
        self.actuator.motor_on(Side::Right, direction, self.state.speed);
        self.actuator.motor_on(Side::Left, direction, self.state.speed);
    }

    /// Drive forward until halted. Refuses if anything is nearer than the
    /// middle distance.
    pub fn forward(&mut self) -> Result<()> {
        self.drive(Facing::Forward)
    }

    /// Drive backwards until halted, subject to the rear ranger.
    pub fn reverse(&mut self) -> Result<()> {
        self.drive(Facing::Rear)
    }

    fn drive(&mut self, facing: Facing) -> Result<()> {
        self.check_clearance(facing)?;
        self.ensure_speed();
        self.engage(facing);
        Ok(())
    }

    /// Rotate in place by running one motor. No timing of its own.
    pub fn spin(&mut self, side: Side) {
        self.ensure_speed();
        // Turning right means driving the left track, and vice versa
        let (driven, flags) = match side {
            Side::Right => (Side::Left, (1, 0)),
            Side::Left => (Side::Right, (0, 1)),
        };
        self.actuator
            .motor_on(driven, MotorDirection::Forward, self.state.speed);
        self.state.left_motor = flags.0;
        self.state.right_motor = flags.1;
    }

    /// Turn by a signed number of degrees; negative is to the left.
    pub async fn turn(&mut self, degrees: i32) -> Result<()> {
        if !(-359..=359).contains(&degrees) {
            return Err(BuggyError::invalid(
                "Turns need to be between -359 and 359 degrees",
            ));
        }
        let calibration = &self.config.calibration;
        let (side, correction) = if degrees < 0 {
            (Side::Left, calibration.left_turn_correction)
        } else {
            (Side::Right, calibration.right_turn_correction)
        };
        let seconds =
            f64::from(degrees.unsigned_abs()) / calibration.degrees_per_second * correction;
        let duration = motion_time(seconds)?;

        self.halt();
        self.state.direction = normalize_degrees(self.state.direction + f64::from(degrees));
        if degrees == 0 {
            return Ok(());
        }

        debug!("Turning {} degrees ({:.3}s)", degrees, seconds);
        self.spin(side);
        self.clock.sleep(duration).await;
        self.halt();
        Ok(())
    }

    pub async fn forward_steps(&mut self, steps: f64) -> Result<()> {
        self.step(Facing::Forward, steps).await
    }

    pub async fn reverse_steps(&mut self, steps: f64) -> Result<()> {
        self.step(Facing::Rear, steps).await
    }

    /// Values under the minimum step become the minimum; above the maximum
    /// is an error.
    fn normalize_steps(&self, steps: f64) -> Result<f64> {
        let behavior = &self.config.behavior;
        if !steps.is_finite() || steps > behavior.max_step {
            return Err(BuggyError::invalid(format!(
                "Steps need to be at most {}",
                behavior.max_step
            )));
        }
        Ok(steps.max(behavior.min_step))
    }

    async fn step(&mut self, facing: Facing, steps: f64) -> Result<()> {
        self.halt();
        let steps = self.normalize_steps(steps)?;
        self.check_clearance(facing)?;
        self.ensure_speed();

        let seconds = (100.0 / f64::from(self.state.speed)) * steps / 2.0;
        let duration = motion_time(seconds)?;
        debug!("Stepping {} {} ({:.2}s)", facing, steps, seconds);
        self.engage(facing);
        self.clock.sleep(duration).await;
        self.halt();

        let sign = match facing {
            Facing::Forward => 1.0,
            Facing::Rear => -1.0,
        };
        let heading = self.state.direction.to_radians();
        let (x, y) = self.state.position;
        self.state.position = (
            round2(x + sign * steps * heading.sin()),
            round2(y + sign * steps * heading.cos()),
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Mode transitions
    // ------------------------------------------------------------------

    fn enter_mode(&mut self, mode: Mode) {
        self.halt();
        if self.state.mode != mode {
            info!("Mode {} -> {}", self.state.mode, mode);
        }
        self.state.mode = mode;
    }

    pub fn enter_manual(&mut self) {
        self.enter_mode(Mode::Manual);
        self.set_pen(PenPosition::Up);
    }

    pub fn enter_wander(&mut self) {
        self.enter_mode(Mode::Wander);
    }

    pub fn enter_follow(&mut self) {
        self.enter_mode(Mode::Follow);
    }

    pub fn enter_avoid(&mut self) {
        self.enter_mode(Mode::Avoid);
    }

    pub fn enter_play(&mut self) {
        self.enter_mode(Mode::Play);
    }

    pub fn enter_home(&mut self) {
        self.state.goto_target = (0.0, 0.0);
        self.enter_mode(Mode::Home);
    }

    pub fn enter_goto(&mut self, x: f64, y: f64) -> Result<()> {
        if !x.is_finite() || !y.is_finite() {
            return Err(BuggyError::invalid("Coordinates need to be finite numbers"));
        }
        self.state.goto_target = (x, y);
        self.enter_mode(Mode::Goto { x, y });
        Ok(())
    }

    pub fn enter_line_follow(&mut self, colour: LineColour) {
        self.enter_mode(Mode::LineFollow { colour });
    }

    pub fn enter_art(&mut self, size: f64) -> Result<()> {
        validate_size(size)?;
        self.enter_mode(Mode::Art { size });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// One tick: refresh the rangers, apply the safety stop and status
    /// lighting, then advance the active mode by one step.
    pub async fn update(&mut self) {
        self.sense_surroundings();

        match self.run_mode().await {
            Ok(_) => {}
            Err(e @ BuggyError::Blocked(_)) => debug!("{} step skipped: {}", self.state.mode, e),
            Err(e) => warn!("{} step failed: {}", self.state.mode, e),
        }
    }

    fn sense_surroundings(&mut self) {
        for facing in [Facing::Forward, Facing::Rear] {
            if let Err(e) = self.read_distance(facing) {
                warn!("Unable to read {} distance: {}", facing, e);
            }
        }

        let front = self.clearance(Facing::Forward);
        let rear = self.clearance(Facing::Rear);

        let colour = if front == Clearance::Blocked || rear == Clearance::Blocked {
            let heading_into_it = (front == Clearance::Blocked && self.state.is_moving_forward())
                || (rear == Clearance::Blocked && self.state.is_reversing());
            if heading_into_it {
                warn!(
                    "Obstacle too close (front {}cm, rear {}cm), halting",
                    self.state.forward_distance, self.state.reverse_distance
                );
                self.halt();
            }
            Colour::Red
        } else if front == Clearance::Caution || rear == Clearance::Caution {
            Colour::Blue
        } else {
            Colour::Green
        };

        if self.state.lights_auto {
            self.set_lights(colour);
        }
    }

    /// Advance the active mode. `Ok(true)` when the buggy actually moved.
    pub(crate) async fn run_mode(&mut self) -> Result<bool> {
        match self.state.mode {
            Mode::Manual => Ok(false),
            Mode::Wander => self.wander().await,
            Mode::Follow => self.follow().await,
            Mode::Avoid => self.avoid().await,
            Mode::Home | Mode::Goto { .. } => self.seek_target().await,
            Mode::LineFollow { colour } => self.follow_line(colour).await,
            Mode::Art { size } => self.make_art(size).await,
            Mode::Play => self.play().await,
        }
    }
}

/// Motor-on time for a computed duration; refuses anything a `Duration`
/// cannot hold instead of driving blind.
fn motion_time(seconds: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(seconds)
        .map_err(|_| BuggyError::invalid(format!("Cannot run the motors for {} seconds", seconds)))
}

pub(crate) fn validate_size(size: f64) -> Result<()> {
    if !(MIN_SHAPE_SIZE..=MAX_SHAPE_SIZE).contains(&size) {
        return Err(BuggyError::invalid(format!(
            "Size needs to be between {} and {}",
            MIN_SHAPE_SIZE, MAX_SHAPE_SIZE
        )));
    }
    Ok(())
}
