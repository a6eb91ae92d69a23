//! Periodic tick driving the active autonomous mode

use crate::monitoring::MonitorOutput;
use crate::robot::SharedRobot;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Tick the robot every `interval` until `shutdown` is raised.
///
/// Each tick holds the robot lock for the whole `update()`, so a command
/// issued meanwhile waits for the tick to finish and vice versa. A tick that
/// overruns pushes the schedule back instead of bursting to catch up.
pub async fn run_update_loop(
    robot: SharedRobot,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
    mut monitor: Option<MonitorOutput>,
) -> u64 {
    info!("Starting update loop ({}ms tick)", interval.as_millis());
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut ticks = 0u64;

    while !shutdown.load(Ordering::Relaxed) {
        ticker.tick().await;
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        let mut guard = robot.lock().await;
        guard.update().await;
        if let Some(monitor) = monitor.as_mut() {
            monitor.output(guard.state());
        }
        drop(guard);

        ticks += 1;
        if ticks % 60 == 0 {
            debug!("Update loop alive, {} ticks", ticks);
        }
    }

    info!("Update loop stopped after {} ticks", ticks);
    ticks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::SimBuggy;
    use crate::clock::FakeClock;
    use crate::commands::CommandHandler;
    use crate::config::DaemonConfig;
    use crate::robot::Robot;
    use crate::state::Mode;

    fn shared_robot() -> (SharedRobot, FakeClock) {
        let clock = FakeClock::new();
        let robot = Robot::new(
            Box::new(SimBuggy::new()),
            Arc::new(clock.clone()),
            DaemonConfig::default(),
        )
        .with_seed(3)
        .into_shared();
        (robot, clock)
    }

    async fn wait_for_mode(robot: &SharedRobot, mode: Mode) -> bool {
        for _ in 0..500 {
            if robot.lock().await.mode() == mode {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_goto_converges_while_loop_runs() {
        let (robot, _clock) = shared_robot();
        robot.lock().await.enter_goto(3.0, 4.0).unwrap();

        let shutdown = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn(run_update_loop(
            robot.clone(),
            Duration::from_millis(1),
            shutdown.clone(),
            None,
        ));

        assert!(wait_for_mode(&robot, Mode::Manual).await);
        shutdown.store(true, Ordering::Relaxed);
        let ticks = handle.await.unwrap();
        assert!(ticks > 0);

        let robot = robot.lock().await;
        let (x, y) = robot.position();
        assert!((x - 3.0).hypot(y - 4.0) < 0.45, "stopped at ({}, {})", x, y);
        assert!(robot.state().is_stopped());
    }

    #[tokio::test]
    async fn test_commands_interleave_with_ticks() {
        let (robot, clock) = shared_robot();
        robot.lock().await.enter_wander();

        let shutdown = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn(run_update_loop(
            robot.clone(),
            Duration::from_millis(1),
            shutdown.clone(),
            None,
        ));

        let handler = CommandHandler::new(robot.clone(), Arc::new(clock));
        for _ in 0..20 {
            let mut out = Vec::new();
            handler.handle_line("turn 30", &mut out).await.unwrap();
            assert_eq!(out, b"Turning buggy 30.\n");
            tokio::task::yield_now().await;
        }
        let mut out = Vec::new();
        handler.handle_line("manual", &mut out).await.unwrap();

        shutdown.store(true, Ordering::Relaxed);
        handle.await.unwrap();

        let robot = robot.lock().await;
        assert_eq!(robot.mode(), Mode::Manual);
        assert!(robot.state().is_stopped());
        assert!((0.0..360.0).contains(&robot.direction()));
    }

    #[tokio::test]
    async fn test_shutdown_before_first_tick() {
        let (robot, _clock) = shared_robot();
        let shutdown = Arc::new(AtomicBool::new(true));
        let ticks = run_update_loop(robot, Duration::from_millis(1), shutdown, None).await;
        assert_eq!(ticks, 0);
    }
}
