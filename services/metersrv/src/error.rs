//! Error handling for the meter service
//!
//! Decoding never fails; errors come from configuration, the transport and
//! the device control channel.

use thiserror::Error;

use crate::transport::TransportError;

/// Meter service error type
#[derive(Error, Debug, Clone)]
pub enum MeterSrvError {
    /// Configuration load, save or validation errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Input/Output operation errors
    #[error("IO error: {0}")]
    IoError(String),

    /// Serial link errors
    #[error("Transport error: {0}")]
    TransportError(#[from] TransportError),

    /// Device protocol errors (unknown device kind)
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Device loop state errors (loop gone, command rejected)
    #[error("State error: {0}")]
    StateError(String),
}

/// Result type alias for the meter service
pub type Result<T> = std::result::Result<T, MeterSrvError>;

impl MeterSrvError {
    pub fn config(msg: impl Into<String>) -> Self {
        MeterSrvError::ConfigError(msg.into())
    }

    pub fn state(msg: impl Into<String>) -> Self {
        MeterSrvError::StateError(msg.into())
    }
}

impl From<std::io::Error> for MeterSrvError {
    fn from(err: std::io::Error) -> Self {
        MeterSrvError::IoError(err.to_string())
    }
}

impl From<figment::Error> for MeterSrvError {
    fn from(err: figment::Error) -> Self {
        MeterSrvError::ConfigError(err.to_string())
    }
}

impl From<serde_yaml::Error> for MeterSrvError {
    fn from(err: serde_yaml::Error) -> Self {
        MeterSrvError::ConfigError(format!("YAML: {err}"))
    }
}

impl From<meter_protocols::ProtocolError> for MeterSrvError {
    fn from(err: meter_protocols::ProtocolError) -> Self {
        MeterSrvError::ProtocolError(err.to_string())
    }
}

/// Extension trait for adding context to errors
pub trait ErrorExt<T> {
    fn config_error(self, msg: &str) -> Result<T>;
    fn io_error(self, msg: &str) -> Result<T>;
}

impl<T, E> ErrorExt<T> for std::result::Result<T, E>
where
    E: std::fmt::Display,
{
    fn config_error(self, msg: &str) -> Result<T> {
        self.map_err(|e| MeterSrvError::ConfigError(format!("{msg}: {e}")))
    }

    fn io_error(self, msg: &str) -> Result<T> {
        self.map_err(|e| MeterSrvError::IoError(format!("{msg}: {e}")))
    }
}
