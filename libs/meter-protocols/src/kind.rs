//! Device kind selection
//!
//! The kind is persisted as an integer tag (0 = Holdpeak, 1 = Mason) and
//! carries every kind-specific constant the device layer needs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::constants;

/// Protocol-level errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Unrecognized device kind tag or name
    #[error("Unknown device kind: {0}")]
    UnknownDeviceKind(String),
}

/// Supported instrument families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DeviceKind {
    /// Holdpeak HP-90EPC multimeter, binary nibble-framed protocol
    #[default]
    Holdpeak = 0,
    /// Mason HCS-3302 USB power supply, ASCII poll/response protocol
    Mason = 1,
}

impl DeviceKind {
    pub fn name(&self) -> &'static str {
        match self {
            DeviceKind::Holdpeak => "holdpeak",
            DeviceKind::Mason => "mason",
        }
    }

    /// Serial speed; both kinds use 8 data bits, no parity, 1 stop bit
    pub fn baud_rate(&self) -> u32 {
        match self {
            DeviceKind::Holdpeak => constants::HOLDPEAK_BAUD_RATE,
            DeviceKind::Mason => constants::MASON_BAUD_RATE,
        }
    }

    /// Poll command written on every scheduler tick, if the kind is polled
    pub fn poll_command(&self) -> Option<&'static [u8]> {
        match self {
            DeviceKind::Holdpeak => None,
            DeviceKind::Mason => Some(constants::CMD_GET_DATA),
        }
    }

    pub fn power_on_command(&self) -> Option<&'static [u8]> {
        match self {
            DeviceKind::Holdpeak => None,
            DeviceKind::Mason => Some(constants::CMD_OUTPUT_ON),
        }
    }

    pub fn power_off_command(&self) -> Option<&'static [u8]> {
        match self {
            DeviceKind::Holdpeak => None,
            DeviceKind::Mason => Some(constants::CMD_OUTPUT_OFF),
        }
    }
}

impl TryFrom<u8> for DeviceKind {
    type Error = ProtocolError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(DeviceKind::Holdpeak),
            1 => Ok(DeviceKind::Mason),
            other => Err(ProtocolError::UnknownDeviceKind(other.to_string())),
        }
    }
}

impl From<DeviceKind> for u8 {
    fn from(kind: DeviceKind) -> Self {
        kind as u8
    }
}

impl FromStr for DeviceKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "0" | "holdpeak" => Ok(DeviceKind::Holdpeak),
            "1" | "mason" => Ok(DeviceKind::Mason),
            other => Err(ProtocolError::UnknownDeviceKind(other.to_string())),
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
