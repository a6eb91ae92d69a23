//! Shape drawing as fixed sequences of steps and turns

use crate::robot::{validate_size, Robot};
use crate::state::Shape;
use crate::Result;
use std::time::Duration;
use tracing::info;

impl Robot {
    async fn pause(&mut self) {
        let pause = Duration::from_millis(self.config.behavior.shape_pause_ms);
        self.clock.sleep(pause).await;
    }

    pub async fn draw_shape(&mut self, shape: Shape, size: f64) -> Result<()> {
        match shape {
            Shape::Circle => self.draw_circle(size).await,
            Shape::Triangle => self.draw_triangle(size).await,
            Shape::Square => self.draw_square(size).await,
        }
    }

    /// A hexagon whose corners lie on the circle
    pub async fn draw_circle(&mut self, radius: f64) -> Result<()> {
        validate_size(radius)?;
        info!("Drawing circle of radius {}", radius);
        for _ in 0..6 {
            self.forward_steps(radius).await?;
            self.pause().await;
            self.turn(60).await?;
            self.pause().await;
        }
        Ok(())
    }

    pub async fn draw_square(&mut self, side: f64) -> Result<()> {
        validate_size(side)?;
        info!("Drawing square with side {}", side);
        for _ in 0..4 {
            self.forward_steps(side).await?;
            self.pause().await;
            self.turn(90).await?;
            self.pause().await;
        }
        Ok(())
    }

    /// Equilateral triangle, finishing on the starting heading
    pub async fn draw_triangle(&mut self, side: f64) -> Result<()> {
        validate_size(side)?;
        info!("Drawing triangle with side {}", side);
        self.turn(-30).await?;
        self.pause().await;
        for corner in 0..3 {
            self.forward_steps(side).await?;
            self.pause().await;
            self.turn(60).await?;
            // Two 60s make the 120 degree corner; the last corner also undoes the opening -30
            self.turn(if corner < 2 { 60 } else { 90 }).await?;
            self.pause().await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::robot::tests::test_robot;
    use crate::state::Shape;
    use crate::BuggyError;

    fn assert_closed(position: (f64, f64), heading: f64) {
        let (x, y) = position;
        assert!(x.hypot(y) < 0.05, "ended at {:?}", position);
        assert_eq!(heading, 0.0);
    }

    #[tokio::test]
    async fn test_shapes_close_on_start() {
        for shape in [Shape::Circle, Shape::Triangle, Shape::Square] {
            let (mut robot, sim, _clock) = test_robot();
            robot.draw_shape(shape, 1.5).await.unwrap();
            assert_closed(robot.position(), robot.direction());
            assert!(sim.motors_off());
        }
    }

    #[tokio::test]
    async fn test_square_sequence_timing() {
        let (mut robot, _sim, clock) = test_robot();
        robot.draw_square(1.0).await.unwrap();
        // step, pause, turn, pause for each side
        assert_eq!(clock.sleeps().len(), 16);
    }

    #[tokio::test]
    async fn test_size_out_of_range() {
        let (mut robot, sim, _clock) = test_robot();
        for size in [0.0, 0.09, 10.01] {
            assert!(matches!(
                robot.draw_circle(size).await,
                Err(BuggyError::InvalidArgument(_))
            ));
        }
        assert_eq!(sim.motor_commands(), 0);
    }

    #[tokio::test]
    async fn test_blocked_shape_stops_early() {
        let (mut robot, sim, _clock) = test_robot();
        sim.set_distances(40.0, -1.0);
        assert!(robot.draw_triangle(1.0).await.unwrap_err().is_blocked());
        assert_eq!(robot.position(), (0.0, 0.0));
    }
}
