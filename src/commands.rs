//! Text command handling
//!
//! One line in, one newline-terminated reply out. The first whitespace
//! token (case-insensitive) picks the handler; every handler validates its
//! own arguments and answers with a short human-readable line. Handlers that
//! move the buggy hold the robot lock for the whole primitive, so a tick of
//! the update loop can never interleave with them.

use crate::clock::Clock;
use crate::robot::{Robot, SharedRobot};
use crate::state::{Colour, Facing, LineColour, PenPosition, Shape, Side};
use crate::{BuggyError, Result};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

pub const NOT_RECOGNIZED: &str = "Command not recognized.\n";
pub const WELCOME: &str = "Type 'help' to get a list of recognized commands.\n";

/// Whether the session should keep reading after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Parse one argument, keeping the offending token on failure
pub fn parse_arg<T: FromStr>(token: &str) -> Result<T> {
    token
        .parse()
        .map_err(|_| BuggyError::Unparsable(token.to_string()))
}

/// Parse a finite decimal number
pub fn parse_number(token: &str) -> Result<f64> {
    let value = parse_arg::<f64>(token)?;
    if !value.is_finite() {
        return Err(BuggyError::Unparsable(token.to_string()));
    }
    Ok(value)
}

fn line(text: impl std::fmt::Display) -> String {
    format!("{}\n", text)
}

/// Reply for a failed command; `blocked` is the wording for a refused move
fn failure(e: BuggyError, blocked: &str) -> String {
    match e {
        BuggyError::Blocked(_) => line(blocked),
        BuggyError::SensorFault(_) => line("Unable to read the distance sensor."),
        other => line(other),
    }
}

pub fn help_text() -> String {
    let mut text = String::from("Tasks the buggy knows how to do:\n\n");
    for (usage, description) in [
        ("art [size]", "wander about drawing shapes of the given size"),
        ("avoid", "move away from anything that gets too close"),
        ("circle <radius>", "draw a circle"),
        ("direction [degrees]", "get or set the current heading"),
        ("distance", "distance to the nearest object in front, in cm"),
        ("echo <text>", "repeat text back"),
        ("exit", "disconnect"),
        ("follow", "follow an object that moves away"),
        ("forward [steps]", "move forward until stopped, or a number of steps"),
        ("goto <x> <y>", "drive to a position"),
        ("halt", "come to a complete stop"),
        ("hello", "say hello"),
        ("help", "show this list of commands"),
        ("home", "return to where we started"),
        ("honk", "beep the horn"),
        ("lights <colour|on|auto|off>", "change the lights or return them to automatic"),
        ("line [black|white]", "follow a line on the floor"),
        ("manual", "stop any autonomous behaviour"),
        ("pen <up|down>", "raise or lower the pen"),
        ("play", "avoid, follow or wander, whichever applies"),
        ("position [x y]", "get or set the current position"),
        ("reset", "reset position, heading, speed and lights"),
        ("reverse [steps]", "move backwards until stopped, or a number of steps"),
        ("sensors [barrier]", "show line sensors or set the light barrier"),
        ("sleep [seconds]", "wait"),
        ("speed [0-100]", "get or set motor power"),
        ("spin [left|right]", "spin in place"),
        ("square <side>", "draw a square"),
        ("status", "status report"),
        ("temp", "board temperature, roughly"),
        ("triangle <side>", "draw a triangle"),
        ("turn <degrees>", "turn; negative degrees turn left"),
        ("wander", "move about at random"),
        ("where", "position and heading"),
    ] {
        text.push_str(&format!("{} - {}\n", usage, description));
    }
    text.push('\n');
    text
}

fn engine(sign: i8) -> &'static str {
    match sign {
        0 => "off",
        s if s < 0 => "reverse",
        _ => "forward",
    }
}

fn distance_text(distance: f64) -> String {
    if distance < 0.0 {
        "nothing in range".to_string()
    } else {
        format!("{}cm", distance)
    }
}

/// Multi-line status block
pub fn status_report(robot: &mut Robot) -> String {
    let line_sensors = match robot.read_line_sensors() {
        Ok((left, centre, right)) => format!("left {}, centre {}, right {}", left, centre, right),
        Err(_) => "unavailable".to_string(),
    };
    let state = robot.state();
    let (x, y) = state.position;

    let mut report = String::from("Status report from buggy...\n");
    report.push_str(&format!("Speed: {}\n", state.speed));
    report.push_str(&format!("Left engine: {}\n", engine(state.left_motor)));
    report.push_str(&format!("Right engine: {}\n", engine(state.right_motor)));
    report.push_str(&format!("Distance ahead: {}\n", distance_text(state.forward_distance)));
    report.push_str(&format!("Distance behind: {}\n", distance_text(state.reverse_distance)));
    report.push_str(&format!(
        "Line sensors: {} (barrier {})\n",
        line_sensors, state.light_barrier
    ));
    report.push_str(if state.lights_auto {
        "Lights: managed automatically\n"
    } else {
        "Lights: managed manually\n"
    });
    report.push_str(&format!("Mode: {}\n", state.mode));
    report.push_str(&format!(
        "Position: ({}, {}) facing {} degrees\n",
        x, y, state.direction
    ));
    report.push_str(&format!("Pen: {}\n", state.pen_position));
    report
}

/// Dispatches command lines against the shared robot
#[derive(Clone)]
pub struct CommandHandler {
    robot: SharedRobot,
    clock: Arc<dyn Clock>,
}

impl CommandHandler {
    pub fn new(robot: SharedRobot, clock: Arc<dyn Clock>) -> Self {
        Self { robot, clock }
    }

    pub fn robot(&self) -> &SharedRobot {
        &self.robot
    }

    /// Handle one command line, writing every reply to `out`.
    pub async fn handle_line<W>(&self, command: &str, out: &mut W) -> Result<Flow>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let tokens: Vec<&str> = command.split_whitespace().collect();
        let Some((first, args)) = tokens.split_first() else {
            out.write_all(b"Nothing received\n").await?;
            out.flush().await?;
            return Ok(Flow::Continue);
        };
        let verb = first.to_lowercase();
        debug!("Command {} {:?}", verb, args);

        let (reply, flow) = match verb.as_str() {
            "exit" => ("Good-bye\n".to_string(), Flow::Exit),
            "sleep" => (self.sleep(args, out).await?, Flow::Continue),
            _ => (self.respond(&verb, args).await, Flow::Continue),
        };
        out.write_all(reply.as_bytes()).await?;
        out.flush().await?;
        Ok(flow)
    }

    /// Reply for every verb that answers with a single block of text
    pub async fn respond(&self, verb: &str, args: &[&str]) -> String {
        match verb {
            "halt" => {
                self.robot.lock().await.halt();
                line("Coming to a stop.")
            }
            "forward" => self.drive(Facing::Forward, args).await,
            "reverse" => self.drive(Facing::Rear, args).await,
            "turn" => self.turn(args).await,
            "spin" => self.spin(args).await,
            "speed" => self.speed(args).await,
            "lights" => self.lights(args).await,
            "pen" => self.pen(args).await,
            "position" => self.position(args).await,
            "direction" => self.direction(args).await,
            "goto" => self.goto(args).await,
            "home" => {
                self.robot.lock().await.enter_home();
                line("Heading home.")
            }
            "wander" => {
                self.robot.lock().await.enter_wander();
                line("Wandering about.")
            }
            "follow" => {
                self.robot.lock().await.enter_follow();
                line("Following objects in front.")
            }
            "avoid" => {
                self.robot.lock().await.enter_avoid();
                line("Avoiding objects.")
            }
            "play" => {
                self.robot.lock().await.enter_play();
                line("Playing.")
            }
            "manual" => {
                self.robot.lock().await.enter_manual();
                line("Manual mode.")
            }
            "line" => self.line_follow(args).await,
            "art" => self.art(args).await,
            "circle" => self.draw(Shape::Circle, args).await,
            "square" => self.draw(Shape::Square, args).await,
            "triangle" => self.draw(Shape::Triangle, args).await,
            "sensors" => self.sensors(args).await,
            "distance" => {
                match self.robot.lock().await.read_distance(Facing::Forward) {
                    Ok(distance) => format!("Distance to nearest object is {}.\n", distance),
                    Err(_) => line("Unable to read the distance sensor."),
                }
            }
            "status" => status_report(&mut *self.robot.lock().await),
            "where" => {
                let robot = self.robot.lock().await;
                let (x, y) = robot.position();
                format!("Position: ({}, {}), facing {} degrees.\n", x, y, robot.direction())
            }
            "honk" => {
                self.robot.lock().await.honk();
                line("Beep beep")
            }
            "temp" => match self.robot.lock().await.read_temperature() {
                Ok(celsius) => format!("Current temperature: {}C\n", celsius),
                Err(_) => line("Unable to read temperature sensor."),
            },
            "reset" => {
                self.robot.lock().await.reset();
                line("Position, heading, speed and lights reset.")
            }
            "echo" => line(args.join(" ")),
            "hello" => line("Hello"),
            "help" => help_text(),
            _ => NOT_RECOGNIZED.to_string(),
        }
    }

    /// Acknowledge before the wait so the client sees it while we sleep
    async fn sleep<W>(&self, args: &[&str], out: &mut W) -> Result<String>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let seconds = match args.first().map(|token| parse_number(token)) {
            None => 1.0,
            Some(Ok(seconds)) if seconds >= 0.0 => seconds,
            Some(Ok(_)) => return Ok(line("Sleep time cannot be negative.")),
            Some(Err(e)) => return Ok(line(e)),
        };
        let Ok(duration) = Duration::try_from_secs_f64(seconds) else {
            return Ok(line(BuggyError::invalid(format!(
                "Cannot sleep for {} seconds",
                seconds
            ))));
        };

        out.write_all(format!("Sleeping for {} seconds.\n", seconds).as_bytes())
            .await?;
        out.flush().await?;
        self.clock.sleep(duration).await;
        Ok(line("Waking."))
    }

    async fn drive(&self, facing: Facing, args: &[&str]) -> String {
        let (moving, stepped, refused, refused_steps, way) = match facing {
            Facing::Forward => (
                "Moving forward.",
                "Moved forward",
                "Cannot move forward, something is in the way.",
                "Something is in the way, cannot move forward.",
                "forward",
            ),
            Facing::Rear => (
                "Moving in reverse.",
                "Moved back",
                "Cannot move in reverse, something is in the way.",
                "Something is in the way, cannot move back.",
                "back",
            ),
        };

        let Some(token) = args.first() else {
            let mut robot = self.robot.lock().await;
            let result = match facing {
                Facing::Forward => robot.forward(),
                Facing::Rear => robot.reverse(),
            };
            return match result {
                Ok(()) => line(moving),
                Err(e) => failure(e, refused),
            };
        };

        let steps = match parse_number(token) {
            Ok(steps) => steps,
            Err(_) => return format!("I did not understand {} steps.\n", token),
        };
        debug!("Stepping {} {} steps", way, steps);
        let mut robot = self.robot.lock().await;
        let result = match facing {
            Facing::Forward => robot.forward_steps(steps).await,
            Facing::Rear => robot.reverse_steps(steps).await,
        };
        match result {
            Ok(()) => format!("{} {} steps.\n", stepped, token),
            Err(e) => failure(e, refused_steps),
        }
    }

    async fn turn(&self, args: &[&str]) -> String {
        let Some(token) = args.first() else {
            return line("Please specify how many degrees to turn. Negative degrees for left.");
        };
        let degrees = match parse_arg::<i32>(token) {
            Ok(degrees) => degrees,
            Err(e) => return line(e),
        };
        match self.robot.lock().await.turn(degrees).await {
            Ok(()) => format!("Turning buggy {}.\n", degrees),
            Err(e) => failure(e, "The buggy ran into a problem trying to turn."),
        }
    }

    async fn spin(&self, args: &[&str]) -> String {
        let side = match args.first().map(|s| s.to_lowercase()).as_deref() {
            None | Some("right") | Some("r") => Side::Right,
            Some("left") | Some("l") => Side::Left,
            Some(other) => return line(BuggyError::Unparsable(other.to_string())),
        };
        let mut robot = self.robot.lock().await;
        robot.halt();
        robot.spin(side);
        match side {
            Side::Left => line("Spinning buggy to the left."),
            Side::Right => line("Spinning buggy to the right."),
        }
    }

    async fn speed(&self, args: &[&str]) -> String {
        let Some(token) = args.first() else {
            return format!("Current speed: {}\n", self.robot.lock().await.speed());
        };
        let speed = match parse_arg::<i64>(token) {
            Ok(speed) => speed,
            Err(e) => return line(e),
        };
        match self.robot.lock().await.set_speed(speed) {
            Ok(()) => format!("Set new speed to {}\n", speed),
            Err(e) => line(e),
        }
    }

    async fn lights(&self, args: &[&str]) -> String {
        let Some(choice) = args.first().map(|s| s.to_lowercase()) else {
            return "Please provide the light colour, such as red, yellow, green, blue, or purple.\n\
                    You can use on or auto to enable automatic lighting or off to disable lights.\n"
                .to_string();
        };
        let mut robot = self.robot.lock().await;
        match choice.as_str() {
            "off" => {
                robot.set_lights_auto(false);
                robot.lights_off();
                line("Turning off buggy lights.")
            }
            "on" | "auto" => {
                robot.set_lights_auto(true);
                line("Turning on buggy lights and setting them to automatic.")
            }
            name => match Colour::parse(name) {
                Some(colour) => {
                    robot.set_lights_auto(false);
                    robot.set_lights(colour);
                    format!("Setting the lights to {}\n", name)
                }
                None => format!("I did not understand the colour {}\n", name),
            },
        }
    }

    async fn pen(&self, args: &[&str]) -> String {
        let position = match args.first().map(|s| s.to_lowercase()).as_deref() {
            Some("up") => PenPosition::Up,
            Some("down") => PenPosition::Down,
            Some(other) => return line(BuggyError::Unparsable(other.to_string())),
            None => return line("Should the pen go up or down?"),
        };
        self.robot.lock().await.set_pen(position);
        format!("Pen is now {}.\n", position)
    }

    async fn position(&self, args: &[&str]) -> String {
        match args {
            [] => {
                let (x, y) = self.robot.lock().await.position();
                format!("Current position: ({}, {})\n", x, y)
            }
            [x, y, ..] => {
                let (x, y) = match (parse_number(x), parse_number(y)) {
                    (Ok(x), Ok(y)) => (x, y),
                    (Err(e), _) | (_, Err(e)) => return line(e),
                };
                match self.robot.lock().await.set_position(x, y) {
                    Ok(()) => format!("Position set to ({}, {})\n", x, y),
                    Err(e) => line(e),
                }
            }
            [_] => line("Please provide both x and y coordinates."),
        }
    }

    async fn direction(&self, args: &[&str]) -> String {
        let Some(token) = args.first() else {
            return format!("Current direction: {} degrees\n", self.robot.lock().await.direction());
        };
        let direction = match parse_number(token) {
            Ok(direction) => direction,
            Err(e) => return line(e),
        };
        match self.robot.lock().await.set_direction(direction) {
            Ok(()) => format!("Direction set to {} degrees\n", direction),
            Err(e) => line(e),
        }
    }

    async fn goto(&self, args: &[&str]) -> String {
        let [x, y, ..] = args else {
            return line("Please provide the x and y coordinates to go to.");
        };
        let (x, y) = match (parse_number(x), parse_number(y)) {
            (Ok(x), Ok(y)) => (x, y),
            (Err(e), _) | (_, Err(e)) => return line(e),
        };
        match self.robot.lock().await.enter_goto(x, y) {
            Ok(()) => format!("Heading to ({}, {}).\n", x, y),
            Err(e) => line(e),
        }
    }

    async fn line_follow(&self, args: &[&str]) -> String {
        let colour = match args.first().map(|s| s.to_lowercase()).as_deref() {
            None | Some("black") => LineColour::Black,
            Some("white") => LineColour::White,
            Some(other) => return format!("I did not understand the colour {}\n", other),
        };
        self.robot.lock().await.enter_line_follow(colour);
        format!("Following a {} line.\n", colour)
    }

    async fn art(&self, args: &[&str]) -> String {
        let mut robot = self.robot.lock().await;
        let size = match args.first().map(|token| parse_number(token)) {
            None => robot.config().behavior.art_size,
            Some(Ok(size)) => size,
            Some(Err(e)) => return line(e),
        };
        match robot.enter_art(size) {
            Ok(()) => format!("Making art with size {}.\n", size),
            Err(e) => line(e),
        }
    }

    async fn draw(&self, shape: Shape, args: &[&str]) -> String {
        let name = match shape {
            Shape::Circle => "circle",
            Shape::Square => "square",
            Shape::Triangle => "triangle",
        };
        let Some(token) = args.first() else {
            return format!("Please specify the size of the {}.\n", name);
        };
        let size = match parse_number(token) {
            Ok(size) => size,
            Err(e) => return line(e),
        };
        match self.robot.lock().await.draw_shape(shape, size).await {
            Ok(()) => format!("Drew a {}.\n", name),
            Err(e) => failure(e, "Something is in the way, stopped drawing."),
        }
    }

    async fn sensors(&self, args: &[&str]) -> String {
        let mut robot = self.robot.lock().await;
        let Some(token) = args.first() else {
            let barrier = robot.state().light_barrier;
            return match robot.read_line_sensors() {
                Ok((left, centre, right)) => format!(
                    "Line sensors: left {}, centre {}, right {}. Light barrier: {}\n",
                    left, centre, right, barrier
                ),
                Err(_) => line("Unable to read the line sensors."),
            };
        };
        let barrier = match parse_arg::<i64>(token) {
            Ok(barrier) => barrier,
            Err(e) => return line(e),
        };
        match robot.set_light_barrier(barrier) {
            Ok(()) => format!("Light barrier set to {}\n", barrier),
            Err(e) => line(e),
        }
    }
}
