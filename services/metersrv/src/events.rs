//! Outbound device events

use serde::Serialize;
use std::fmt;

use meter_protocols::Measurement;

/// Device lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ConnectionState {
    #[default]
    Stopped,
    Started,
    Reconnecting,
    Error,
}

/// Status notifications emitted by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Started,
    Stopped,
    Error,
    Reconnect,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Started => "started",
            DeviceStatus::Stopped => "stopped",
            DeviceStatus::Error => "error",
            DeviceStatus::Reconnect => "reconnect",
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event delivered to the device's consumer
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    Status(DeviceStatus),
    Measurement(Measurement),
}

impl DeviceEvent {
    pub fn status(&self) -> Option<DeviceStatus> {
        match self {
            DeviceEvent::Status(status) => Some(*status),
            DeviceEvent::Measurement(_) => None,
        }
    }

    pub fn measurement(&self) -> Option<&Measurement> {
        match self {
            DeviceEvent::Status(_) => None,
            DeviceEvent::Measurement(m) => Some(m),
        }
    }
}
