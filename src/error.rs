//! Error types for buggy control

use crate::state::Facing;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BuggyError>;

#[derive(Error, Debug)]
pub enum BuggyError {
    /// Out-of-range or otherwise unacceptable input. The message is user facing.
    #[error("{0}")]
    InvalidArgument(String),

    /// A token that could not be parsed as the expected number.
    #[error("I did not understand {0}")]
    Unparsable(String),

    #[error("Path blocked {0}")]
    Blocked(Facing),

    #[error("Sensor fault: {0}")]
    SensorFault(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl BuggyError {
    pub fn invalid(message: impl Into<String>) -> Self {
        BuggyError::InvalidArgument(message.into())
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, BuggyError::Blocked(_))
    }
}
