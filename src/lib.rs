//! Buggy - autonomous navigation core for a small two-wheeled robot
//!
//! The buggy dead-reckons its pose from timed motor pulses, keeps one
//! autonomous mode active at a time and advances it on every tick of the
//! update loop. A line-oriented TCP command session shares the same robot,
//! so a client can drive it by hand or switch modes while it runs.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use buggyd::{CommandHandler, DaemonConfig, Robot, SimBuggy, TokioClock};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let clock = Arc::new(TokioClock);
//!     let robot = Robot::new(Box::new(SimBuggy::new()), clock.clone(), DaemonConfig::default())
//!         .into_shared();
//!
//!     let handler = CommandHandler::new(robot, clock);
//!     let mut reply = Vec::new();
//!     handler.handle_line("forward 2", &mut reply).await?;
//!     print!("{}", String::from_utf8_lossy(&reply));
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Robot**: motion primitives, mode transitions and the per-tick update
//! - **Actuator**: motors, rangers, lights, horn, pen and line sensors
//! - **Clock**: the delay source behind every timed motion
//! - **CommandHandler / CommandSession**: text command parsing and replies
//! - **run_update_loop**: periodic tick over the shared robot
//! - **CommandServer**: TCP listener serving one session at a time

pub mod actuator;
pub mod behaviors;
pub mod clock;
pub mod commands;
pub mod config;
pub mod error;
pub mod monitoring;
pub mod robot;
pub mod server;
pub mod session;
pub mod shapes;
pub mod state;
pub mod update_loop;

pub use actuator::{Actuator, SimBuggy, SimState, LED_COUNT};
pub use behaviors::bearing_error;
pub use clock::{Clock, FakeClock, TokioClock};
pub use commands::{CommandHandler, Flow};
pub use config::{
    BehaviorConfig, CalibrationConfig, DaemonConfig, PublishingConfig, RobotConfig, ServerConfig,
};
pub use error::{BuggyError, Result};
pub use monitoring::{ModeData, MonitorOutput, PoseData};
pub use robot::{Robot, SharedRobot};
pub use server::CommandServer;
pub use session::CommandSession;
pub use state::{
    Clearance, Colour, Facing, LineColour, Mode, MotorDirection, PenPosition, RobotState, Shape,
    Side,
};
pub use update_loop::run_update_loop;
