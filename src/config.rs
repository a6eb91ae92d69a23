//! Configuration loading for the buggy daemon
//!
//! Every section is optional; anything left out of the YAML file falls back
//! to the values the buggy was calibrated with on the bench.

use crate::{BuggyError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub server: ServerConfig,
    pub robot: RobotConfig,
    pub calibration: CalibrationConfig,
    pub behavior: BehaviorConfig,
    pub publishing: PublishingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Sent before every read from the client
    pub prompt: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RobotConfig {
    /// Motor power used when no speed has been set yet
    pub default_speed: u8,
    /// Distance in cm at or below which a direction is obstructed
    pub too_close: f64,
    /// Distance in cm below which a direction needs caution
    pub middle_distance: f64,
    pub light_level: u8,
    /// Line-sensor value separating light from dark
    pub light_barrier: u32,
    pub tick_interval_ms: u64,
}

/// Hardware-specific values measured on one particular buggy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Rotation rate while spinning in place at default power
    pub degrees_per_second: f64,
    /// Multiplier applied to the spin time of left turns
    pub left_turn_correction: f64,
    /// Multiplier applied to the spin time of right turns
    pub right_turn_correction: f64,
    pub pen_up_angle: u16,
    pub pen_down_angle: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BehaviorConfig {
    pub min_step: f64,
    pub max_step: f64,
    pub wander_step: f64,
    pub wander_turn_min: i32,
    pub wander_turn_max: i32,
    pub avoid_turn: i32,
    pub avoid_step: f64,
    pub follow_step: f64,
    /// Smallest recession in cm worth following
    pub follow_min_delta: f64,
    pub follow_sample_ms: u64,
    pub arrival_tolerance: f64,
    pub heading_tolerance: f64,
    pub max_turn_per_tick: i32,
    pub goto_max_step: f64,
    pub line_step: f64,
    pub line_turn: i32,
    pub art_size: f64,
    pub shape_pause_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PublishingConfig {
    pub enabled: bool,
    pub decimal_places: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 40801,
            prompt: "Ready> ".to_string(),
        }
    }
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            default_speed: 50,
            too_close: 30.0,
            middle_distance: 60.0,
            light_level: 15,
            light_barrier: 30000,
            tick_interval_ms: 1000,
        }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            // Slightly faster than one revolution per second at default power
            degrees_per_second: 432.0,
            left_turn_correction: 1.0,
            right_turn_correction: 1.0,
            pen_up_angle: 90,
            pen_down_angle: 0,
        }
    }
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            min_step: 0.3,
            max_step: 10.0,
            wander_step: 0.5,
            wander_turn_min: 60,
            wander_turn_max: 90,
            avoid_turn: 45,
            avoid_step: 0.5,
            follow_step: 0.3,
            follow_min_delta: 5.0,
            follow_sample_ms: 500,
            arrival_tolerance: 0.45,
            heading_tolerance: 10.0,
            max_turn_per_tick: 45,
            goto_max_step: 1.0,
            line_step: 0.3,
            line_turn: 15,
            art_size: 1.0,
            shape_pause_ms: 500,
        }
    }
}

impl Default for PublishingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            decimal_places: 2,
        }
    }
}

impl DaemonConfig {
    /// Load configuration from a YAML file
    pub fn load_from_path(config_path: impl AsRef<Path>) -> Result<Self> {
        let path = config_path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| BuggyError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::load_from_str(&contents)
    }

    /// Parse configuration from a YAML string
    pub fn load_from_str(contents: &str) -> Result<Self> {
        let config: DaemonConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject thresholds that would make the behaviours contradict each other
    pub fn validate(&self) -> Result<()> {
        if self.robot.too_close >= self.robot.middle_distance {
            return Err(BuggyError::Config(format!(
                "too_close ({}) must be below middle_distance ({})",
                self.robot.too_close, self.robot.middle_distance
            )));
        }
        if self.robot.default_speed == 0 || self.robot.default_speed > 100 {
            return Err(BuggyError::Config("default_speed must be in 1-100".to_string()));
        }
        if self.robot.light_barrier > 65000 {
            return Err(BuggyError::Config("light_barrier must be in 0-65000".to_string()));
        }
        if self.robot.tick_interval_ms == 0 {
            return Err(BuggyError::Config("tick_interval_ms must be at least 1".to_string()));
        }
        if self.calibration.degrees_per_second <= 0.0 {
            return Err(BuggyError::Config("degrees_per_second must be positive".to_string()));
        }
        for (name, correction) in [
            ("left_turn_correction", self.calibration.left_turn_correction),
            ("right_turn_correction", self.calibration.right_turn_correction),
        ] {
            if !(correction.is_finite() && correction > 0.0) {
                return Err(BuggyError::Config(format!("{} must be positive", name)));
            }
        }
        if self.behavior.min_step <= 0.0 || self.behavior.min_step > self.behavior.max_step {
            return Err(BuggyError::Config(format!(
                "min_step ({}) must be positive and not exceed max_step ({})",
                self.behavior.min_step, self.behavior.max_step
            )));
        }
        // Goto can only land on points a minimum step away
        if self.behavior.arrival_tolerance < self.behavior.min_step / 2.0 {
            return Err(BuggyError::Config(format!(
                "arrival_tolerance ({}) must be at least half of min_step ({})",
                self.behavior.arrival_tolerance, self.behavior.min_step
            )));
        }
        if self.behavior.wander_turn_min > self.behavior.wander_turn_max {
            return Err(BuggyError::Config("wander_turn_min exceeds wander_turn_max".to_string()));
        }
        Ok(())
    }
}
