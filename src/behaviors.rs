//! One-tick handlers for the autonomous modes
//!
//! Each handler returns `Ok(true)` when it moved the buggy and `Ok(false)`
//! when it chose to stay put. A refused step counts as staying put, which is
//! what lets [`Robot::play`] fall through to the next behaviour.

use crate::robot::Robot;
use crate::state::{normalize_degrees, Clearance, Facing, LineColour, PenPosition, Shape};
use crate::{BuggyError, Result};
use rand::Rng;
use std::time::Duration;
use tracing::{debug, info};

/// Signed difference from `heading` to `bearing`, in [-180, 180)
pub fn bearing_error(bearing: f64, heading: f64) -> f64 {
    (bearing - heading + 540.0).rem_euclid(360.0) - 180.0
}

/// Map a refused step to "did nothing", keep every other outcome
fn moved(result: Result<()>) -> Result<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(BuggyError::Blocked(facing)) => {
            debug!("Step refused, path blocked {}", facing);
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

impl Robot {
    async fn random_turn(&mut self, min: i32, max: i32) -> Result<()> {
        let degrees = self.rng.gen_range(min..=max);
        let degrees = if self.rng.gen_bool(0.5) { -degrees } else { degrees };
        self.turn(degrees).await
    }

    /// Random walk: turn left, turn right, or try a step forward (two chances
    /// in four). A blocked front falls back to backing off when the buggy is
    /// boxed in ahead but free behind, and to a random turn otherwise.
    pub(crate) async fn wander(&mut self) -> Result<bool> {
        let behavior = &self.config.behavior;
        let (min, max, step) = (
            behavior.wander_turn_min,
            behavior.wander_turn_max,
            behavior.wander_step,
        );

        match self.rng.gen_range(0..4) {
            0 => {
                let degrees = self.rng.gen_range(min..=max);
                self.turn(-degrees).await?;
            }
            1 => {
                let degrees = self.rng.gen_range(min..=max);
                self.turn(degrees).await?;
            }
            _ => {
                let front = self.clearance(Facing::Forward);
                let rear = self.clearance(Facing::Rear);
                if front == Clearance::Clear {
                    if !moved(self.forward_steps(step).await)? {
                        self.random_turn(min, max).await?;
                    }
                } else if front == Clearance::Blocked && rear == Clearance::Clear {
                    if !moved(self.reverse_steps(step).await)? {
                        self.random_turn(min, max).await?;
                    }
                } else {
                    self.random_turn(min, max).await?;
                }
            }
        }
        Ok(true)
    }

    /// Creep after an object that is moving away
    pub(crate) async fn follow(&mut self) -> Result<bool> {
        let behavior = &self.config.behavior;
        let sample = Duration::from_millis(behavior.follow_sample_ms);
        let step = behavior.follow_step;
        let significant = behavior.follow_min_delta.min(self.config.robot.middle_distance);

        let first = self.read_distance(Facing::Forward)?;
        self.clock.sleep(sample).await;
        let second = self.read_distance(Facing::Forward)?;

        if first < 0.0 || second < 0.0 {
            return Ok(false);
        }
        let receded = second - first;
        if receded <= significant || self.clearance_of(second) == Clearance::Blocked {
            return Ok(false);
        }

        debug!("Object receded {:.1}cm, following", receded);
        moved(self.forward_steps(step).await)
    }

    /// Move away from whatever is too close. Boxed in on both ends means
    /// turning to find a way out.
    pub(crate) async fn avoid(&mut self) -> Result<bool> {
        let behavior = &self.config.behavior;
        let (turn, step) = (behavior.avoid_turn, behavior.avoid_step);
        let front = self.clearance(Facing::Forward) == Clearance::Blocked;
        let rear = self.clearance(Facing::Rear) == Clearance::Blocked;

        match (front, rear) {
            (true, true) => {
                let degrees = if self.rng.gen_bool(0.5) { turn } else { -turn };
                self.turn(degrees).await?;
                Ok(true)
            }
            (false, true) => moved(self.forward_steps(step).await),
            (true, false) => moved(self.reverse_steps(step).await),
            (false, false) => Ok(false),
        }
    }

    /// Home and Goto: turn towards the target a bounded amount per tick and
    /// step only once roughly lined up. Arriving drops back to manual.
    pub(crate) async fn seek_target(&mut self) -> Result<bool> {
        let behavior = &self.config.behavior;
        let (tolerance, heading_tolerance) =
            (behavior.arrival_tolerance, behavior.heading_tolerance);
        let (max_turn, max_step) = (behavior.max_turn_per_tick, behavior.goto_max_step);

        let (tx, ty) = self.state.goto_target;
        let (x, y) = self.state.position;
        let (dx, dy) = (tx - x, ty - y);
        let distance = dx.hypot(dy);

        if distance < tolerance {
            info!("Arrived at ({}, {}), now at ({}, {})", tx, ty, x, y);
            self.enter_manual();
            return Ok(false);
        }

        // Heading 0 points along +y and grows clockwise
        let bearing = normalize_degrees(dx.atan2(dy).to_degrees());
        let error = bearing_error(bearing, self.state.direction);
        if error.abs() > heading_tolerance {
            let correction = (error.round() as i32).clamp(-max_turn, max_turn);
            self.turn(correction).await?;
            return Ok(true);
        }

        match self.forward_steps(distance.min(max_step)).await {
            Ok(()) => Ok(true),
            Err(BuggyError::Blocked(_)) => {
                debug!("Route to ({}, {}) blocked, wandering instead", tx, ty);
                self.wander().await
            }
            Err(e) => Err(e),
        }
    }

    pub(crate) async fn follow_line(&mut self, colour: LineColour) -> Result<bool> {
        let (step, turn) = (self.config.behavior.line_step, self.config.behavior.line_turn);
        let barrier = f64::from(self.state.light_barrier);
        let on_line = |reading: f64| match colour {
            LineColour::Black => reading > barrier,
            LineColour::White => reading <= barrier,
        };

        let (left, centre, right) = self.read_line_sensors()?;
        if on_line(centre) {
            return moved(self.forward_steps(step).await);
        }

        // Right is the default when both or neither side sees the line
        let degrees = if on_line(left) && !on_line(right) { -turn } else { turn };
        self.turn(degrees).await?;
        Ok(true)
    }

    /// Wander with the pen up, then put it down and draw a random shape.
    pub(crate) async fn make_art(&mut self, size: f64) -> Result<bool> {
        self.set_pen(PenPosition::Up);
        self.wander().await?;
        self.set_pen(PenPosition::Down);

        let shape = match self.rng.gen_range(0..3) {
            0 => Shape::Circle,
            1 => Shape::Triangle,
            _ => Shape::Square,
        };
        moved(self.draw_shape(shape, size).await)
    }

    /// Avoid first, follow if there was nothing to avoid, wander if there was
    /// nothing to follow either.
    pub(crate) async fn play(&mut self) -> Result<bool> {
        if self.avoid().await? {
            return Ok(true);
        }
        if self.follow().await? {
            return Ok(true);
        }
        self.wander().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::{Actuator, SimBuggy};
    use crate::clock::FakeClock;
    use crate::config::DaemonConfig;
    use crate::robot::tests::test_robot;
    use crate::state::Mode;
    use std::sync::Arc;

    #[test]
    fn test_bearing_error_wraps() {
        assert_eq!(bearing_error(10.0, 350.0), 20.0);
        assert_eq!(bearing_error(350.0, 10.0), -20.0);
        assert_eq!(bearing_error(90.0, 90.0), 0.0);
        assert_eq!(bearing_error(180.0, 0.0), -180.0);
    }

    #[tokio::test]
    async fn test_goto_arrives_and_returns_to_manual() {
        let (mut robot, sim, _clock) = test_robot();
        robot.enter_goto(3.0, 4.0).unwrap();

        let mut ticks = 0;
        while robot.mode() != Mode::Manual {
            robot.update().await;
            ticks += 1;
            assert!(ticks < 50, "never arrived, at {:?}", robot.position());
        }

        let (x, y) = robot.position();
        assert!((x - 3.0).hypot(y - 4.0) < 0.45);
        assert!(sim.motors_off());
    }

    #[tokio::test]
    async fn test_home_returns_to_origin() {
        let (mut robot, _sim, _clock) = test_robot();
        robot.set_position(-2.0, 1.5).unwrap();
        robot.set_direction(200.0).unwrap();
        robot.enter_home();

        for _ in 0..50 {
            robot.update().await;
        }

        assert_eq!(robot.mode(), Mode::Manual);
        let (x, y) = robot.position();
        assert!(x.hypot(y) < 0.45);
    }

    #[tokio::test]
    async fn test_goto_turn_is_bounded_per_tick() {
        let (mut robot, _sim, _clock) = test_robot();
        robot.enter_goto(0.0, -5.0).unwrap();
        robot.update().await;
        // Target is straight behind; one tick may only turn 45 degrees
        assert!(robot.direction() == 315.0 || robot.direction() == 45.0);
        assert_eq!(robot.position(), (0.0, 0.0));
    }

    #[tokio::test]
    async fn test_goto_blocked_falls_back_to_wander() {
        let (mut robot, sim, _clock) = test_robot();
        robot.enter_goto(0.0, 3.0).unwrap();
        sim.set_distances(45.0, -1.0);

        robot.update().await;

        // Wander either turned or backed off; it never stepped into the object
        let (_, y) = robot.position();
        assert!(y <= 0.0);
        assert!(matches!(robot.mode(), Mode::Goto { .. }));
    }

    #[tokio::test]
    async fn test_avoid_steps_back_from_front_obstacle() {
        let (mut robot, sim, _clock) = test_robot();
        robot.enter_avoid();
        sim.set_distances(15.0, -1.0);

        robot.update().await;

        assert_eq!(robot.position(), (0.0, -0.5));
    }

    #[tokio::test]
    async fn test_avoid_steps_forward_from_rear_obstacle() {
        let (mut robot, sim, _clock) = test_robot();
        robot.enter_avoid();
        sim.set_distances(-1.0, 15.0);

        robot.update().await;

        assert_eq!(robot.position(), (0.0, 0.5));
    }

    #[tokio::test]
    async fn test_avoid_turns_when_boxed_in() {
        let (mut robot, sim, _clock) = test_robot();
        robot.enter_avoid();
        sim.set_distances(15.0, 15.0);

        robot.update().await;

        assert_eq!(robot.position(), (0.0, 0.0));
        assert!(robot.direction() == 45.0 || robot.direction() == 315.0);
    }

    #[tokio::test]
    async fn test_avoid_stays_put_when_clear() {
        let (mut robot, sim, clock) = test_robot();
        robot.enter_avoid();

        robot.update().await;

        assert_eq!(robot.position(), (0.0, 0.0));
        assert_eq!(robot.direction(), 0.0);
        assert_eq!(sim.motor_commands(), 0);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_follow_ignores_still_object() {
        let (mut robot, sim, _clock) = test_robot();
        robot.enter_follow();
        sim.set_distances(100.0, -1.0);

        robot.update().await;

        assert_eq!(robot.position(), (0.0, 0.0));
    }

    /// A board whose forward ranger reports a receding object on each read
    #[derive(Clone)]
    struct RecedingTarget {
        sim: SimBuggy,
        reads: Arc<std::sync::Mutex<Vec<f64>>>,
    }

    impl Actuator for RecedingTarget {
        fn motor_on(
            &mut self,
            side: crate::state::Side,
            direction: crate::state::MotorDirection,
            power: u8,
        ) {
            self.sim.motor_on(side, direction, power)
        }
        fn motor_off(&mut self, side: crate::state::Side) {
            self.sim.motor_off(side)
        }
        fn get_distance(&mut self, facing: Facing) -> Result<f64> {
            if facing == Facing::Rear {
                return Ok(-1.0);
            }
            let mut reads = self.reads.lock().unwrap();
            Ok(if reads.len() > 1 { reads.remove(0) } else { reads[0] })
        }
        fn set_led(&mut self, index: usize, colour: crate::state::Colour) {
            self.sim.set_led(index, colour)
        }
        fn clear_led(&mut self, index: usize) {
            self.sim.clear_led(index)
        }
        fn show(&mut self) {
            self.sim.show()
        }
        fn set_brightness(&mut self, level: u8) {
            self.sim.set_brightness(level)
        }
        fn beep(&mut self) {
            self.sim.beep()
        }
        fn set_pen_angle(&mut self, angle: u16) {
            self.sim.set_pen_angle(angle)
        }
        fn read_line_sensors(&mut self) -> Result<(f64, f64, f64)> {
            self.sim.read_line_sensors()
        }
        fn read_temperature(&mut self) -> Result<f64> {
            self.sim.read_temperature()
        }
    }

    #[tokio::test]
    async fn test_follow_steps_after_receding_object() {
        // reset read, tick read, two follow samples, then the step's own check
        let target = RecedingTarget {
            sim: SimBuggy::new(),
            reads: Arc::new(std::sync::Mutex::new(vec![70.0, 70.0, 70.0, 90.0, 90.0])),
        };
        let clock = FakeClock::new();
        let mut robot = Robot::new(
            Box::new(target),
            Arc::new(clock.clone()),
            DaemonConfig::default(),
        )
        .with_seed(3);
        robot.enter_follow();

        robot.update().await;

        assert_eq!(robot.position(), (0.0, 0.3));
        assert_eq!(clock.sleeps()[0], Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_line_follow_black_on_line_steps() {
        let (mut robot, sim, _clock) = test_robot();
        robot.enter_line_follow(LineColour::Black);
        sim.set_line(100.0, 40000.0, 100.0);

        robot.update().await;

        assert_eq!(robot.position(), (0.0, 0.3));
    }

    #[tokio::test]
    async fn test_line_follow_turns_towards_line() {
        let (mut robot, sim, _clock) = test_robot();
        robot.enter_line_follow(LineColour::Black);
        sim.set_line(40000.0, 100.0, 100.0);
        robot.update().await;
        assert_eq!(robot.direction(), 345.0);

        robot.set_direction(0.0).unwrap();
        sim.set_line(100.0, 100.0, 40000.0);
        robot.update().await;
        assert_eq!(robot.direction(), 15.0);
    }

    #[tokio::test]
    async fn test_line_follow_white_inverts_threshold() {
        let (mut robot, sim, _clock) = test_robot();
        robot.enter_line_follow(LineColour::White);
        sim.set_line(40000.0, 30000.0, 40000.0);

        robot.update().await;

        // Exactly at the barrier counts as white
        assert_eq!(robot.position(), (0.0, 0.3));
    }

    #[tokio::test]
    async fn test_line_follow_ambiguous_defaults_right() {
        let (mut robot, sim, _clock) = test_robot();
        robot.enter_line_follow(LineColour::Black);
        sim.set_line(40000.0, 100.0, 40000.0);

        robot.update().await;

        assert_eq!(robot.direction(), 15.0);
    }

    #[tokio::test]
    async fn test_wander_always_acts_when_clear() {
        let (mut robot, _sim, _clock) = test_robot();
        robot.enter_wander();
        for _ in 0..20 {
            let before = (robot.position(), robot.direction());
            robot.update().await;
            assert_ne!(before, (robot.position(), robot.direction()));
            assert!(robot.state().is_stopped());
        }
    }

    #[tokio::test]
    async fn test_wander_never_steps_forward_into_obstacle() {
        let (mut robot, sim, _clock) = test_robot();
        robot.enter_wander();
        sim.set_distances(20.0, 20.0);
        for _ in 0..20 {
            robot.update().await;
            assert_eq!(robot.position(), (0.0, 0.0));
        }
    }

    #[tokio::test]
    async fn test_play_prefers_avoid() {
        let (mut robot, sim, _clock) = test_robot();
        robot.enter_play();
        sim.set_distances(15.0, -1.0);

        robot.update().await;

        assert_eq!(robot.position(), (0.0, -0.5));
    }

    #[tokio::test]
    async fn test_play_wanders_when_nothing_to_react_to() {
        let (mut robot, _sim, clock) = test_robot();
        robot.enter_play();

        robot.update().await;

        // follow sampled once, then wander moved
        assert_eq!(clock.sleeps()[0], Duration::from_millis(500));
        assert!(clock.sleeps().len() >= 2);
    }

    #[tokio::test]
    async fn test_art_draws_with_pen_down() {
        let (mut robot, sim, _clock) = test_robot();
        robot.enter_art(1.0).unwrap();

        robot.update().await;

        assert_eq!(robot.state().pen_position, PenPosition::Down);
        assert_eq!(sim.pen_angle(), Some(0));
        assert!(sim.motors_off());
    }
}
