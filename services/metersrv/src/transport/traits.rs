//! Transport layer traits
//!
//! The device owns exactly one transport and drives it through this trait;
//! the serial port and the in-memory test transport both implement it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime};
use thiserror::Error;

use meter_protocols::DeviceKind;

use crate::config::DeviceConfig;

/// Transport layer error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Port could not be opened
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Operation requires an open port
    #[error("Transport not open")]
    NotOpen,

    /// Send operation failed
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Receive operation failed
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// Peer closed the stream
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Timeout occurred
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Invalid port settings
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Serial line settings applied on every open
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialSettings {
    /// Serial port path (e.g., "/dev/ttyUSB0", "COM1")
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits (5, 6, 7, 8)
    pub data_bits: u8,
    /// Stop bits (1, 2)
    pub stop_bits: u8,
    /// Parity ("None", "Even", "Odd")
    pub parity: String,
    /// Flow control ("None", "Software", "Hardware")
    pub flow_control: String,
    /// Timeout for a single write
    pub write_timeout: Duration,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: DeviceKind::default().baud_rate(),
            data_bits: 8,
            stop_bits: 1,
            parity: "None".to_string(),
            flow_control: "None".to_string(),
            write_timeout: Duration::from_millis(1000),
        }
    }
}

impl SerialSettings {
    /// Line settings for a configured device: kind-specific baud, 8N1
    pub fn for_device(config: &DeviceConfig) -> Self {
        Self {
            port: config.port.clone(),
            baud_rate: config.kind.baud_rate(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), TransportError> {
        if self.port.is_empty() {
            return Err(TransportError::ConfigError(
                "Port path cannot be empty".to_string(),
            ));
        }

        if self.baud_rate == 0 {
            return Err(TransportError::ConfigError(
                "Baud rate must be greater than zero".to_string(),
            ));
        }

        if ![5, 6, 7, 8].contains(&self.data_bits) {
            return Err(TransportError::ConfigError(
                "Data bits must be 5, 6, 7, or 8".to_string(),
            ));
        }

        if ![1, 2].contains(&self.stop_bits) {
            return Err(TransportError::ConfigError(
                "Stop bits must be 1 or 2".to_string(),
            ));
        }

        if !["None", "Even", "Odd"].contains(&self.parity.as_str()) {
            return Err(TransportError::ConfigError(
                "Parity must be None, Even, or Odd".to_string(),
            ));
        }

        if !["None", "Software", "Hardware"].contains(&self.flow_control.as_str()) {
            return Err(TransportError::ConfigError(
                "Flow control must be None, Software, or Hardware".to_string(),
            ));
        }

        Ok(())
    }
}

/// Transport statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransportStats {
    /// Total bytes sent
    pub bytes_sent: u64,
    /// Total bytes received
    pub bytes_received: u64,
    /// Number of open attempts
    pub open_attempts: u64,
    /// Number of failed open attempts
    pub open_failures: u64,
    /// Number of closes of an open port
    pub closes: u64,
    /// Last successful open
    pub last_open: Option<SystemTime>,
}

impl TransportStats {
    pub fn record_open_attempt(&mut self) {
        self.open_attempts += 1;
    }

    pub fn record_open_success(&mut self) {
        self.last_open = Some(SystemTime::now());
    }

    pub fn record_open_failure(&mut self) {
        self.open_failures += 1;
    }

    pub fn record_close(&mut self) {
        self.closes += 1;
    }

    pub fn record_bytes_sent(&mut self, bytes: usize) {
        self.bytes_sent += bytes as u64;
    }

    pub fn record_bytes_received(&mut self, bytes: usize) {
        self.bytes_received += bytes as u64;
    }
}

impl fmt::Display for TransportStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sent={}B received={}B opens={} failures={} closes={}",
            self.bytes_sent, self.bytes_received, self.open_attempts, self.open_failures, self.closes
        )
    }
}

/// Byte-stream transport owned by a device
#[async_trait]
pub trait Transport: Send + fmt::Debug {
    /// Human-readable transport name
    fn name(&self) -> &str;

    /// Open the port with the given settings
    ///
    /// Opening an already open transport closes it first.
    async fn open(&mut self, settings: &SerialSettings) -> Result<(), TransportError>;

    /// Close the port; closing a closed transport is a no-op
    async fn close(&mut self) -> Result<(), TransportError>;

    fn is_open(&self) -> bool;

    /// Write all of `data`
    async fn write(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Wait for the next inbound chunk
    ///
    /// `Ok(0)` means end of stream. Must be cancel-safe: the device loop
    /// drops a pending read whenever a timer or command is ready first.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    fn stats(&self) -> TransportStats;
}

#[async_trait]
impl Transport for Box<dyn Transport> {
    fn name(&self) -> &str {
        self.as_ref().name()
    }

    async fn open(&mut self, settings: &SerialSettings) -> Result<(), TransportError> {
        self.as_mut().open(settings).await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.as_mut().close().await
    }

    fn is_open(&self) -> bool {
        self.as_ref().is_open()
    }

    async fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        self.as_mut().write(data).await
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        self.as_mut().read(buf).await
    }

    fn stats(&self) -> TransportStats {
        self.as_ref().stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_for_device() {
        let holdpeak = DeviceConfig {
            kind: DeviceKind::Holdpeak,
            port: "/dev/ttyUSB0".to_string(),
            name: "Meter".to_string(),
        };
        let settings = SerialSettings::for_device(&holdpeak);
        assert_eq!(settings.port, "/dev/ttyUSB0");
        assert_eq!(settings.baud_rate, 2400);
        assert_eq!(settings.data_bits, 8);
        assert_eq!(settings.stop_bits, 1);
        assert_eq!(settings.parity, "None");

        let mason = DeviceConfig {
            kind: DeviceKind::Mason,
            ..holdpeak
        };
        assert_eq!(SerialSettings::for_device(&mason).baud_rate, 9600);
    }

    #[test]
    fn test_settings_validation() {
        let mut settings = SerialSettings {
            port: "COM3".to_string(),
            ..Default::default()
        };
        assert!(settings.validate().is_ok());

        settings.parity = "Mark".to_string();
        assert!(settings.validate().is_err());

        settings.parity = "None".to_string();
        settings.data_bits = 9;
        assert!(settings.validate().is_err());

        let empty = SerialSettings::default();
        assert!(matches!(
            empty.validate(),
            Err(TransportError::ConfigError(_))
        ));
    }

    #[test]
    fn test_transport_stats() {
        let mut stats = TransportStats::default();
        stats.record_open_attempt();
        stats.record_open_success();
        stats.record_bytes_sent(5);
        stats.record_bytes_received(14);
        stats.record_close();

        assert_eq!(stats.open_attempts, 1);
        assert!(stats.last_open.is_some());
        assert_eq!(stats.to_string(), "sent=5B received=14B opens=1 failures=0 closes=1");
    }

    #[test]
    fn test_transport_error() {
        let error = TransportError::ConnectionFailed("no such device".to_string());
        assert!(error.to_string().contains("Connection failed"));
        assert_eq!(TransportError::NotOpen.to_string(), "Transport not open");
    }
}
