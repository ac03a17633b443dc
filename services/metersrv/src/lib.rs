//! Meter Service (metersrv)
//!
//! Connects to a single serial instrument, a Holdpeak multimeter or a Mason
//! bench power supply, decodes its readings and keeps the link alive with a
//! liveness watchdog.
//!
//! # Architecture
//!
//! - **Transport**: serial port behind the [`transport::Transport`] trait
//! - **Device**: single-task loop owning transport, decoder and timers
//! - **Events**: status transitions and measurements on an unbounded channel
//! - **Config**: figment-loaded YAML/TOML/JSON with `METERSRV_` env overrides

pub mod bootstrap;
pub mod config;
pub mod device;
pub mod error;
pub mod events;
pub mod scheduler;
pub mod ticker;
pub mod transport;
pub mod watchdog;

pub use config::{AppConfig, ConfigManager, DeviceConfig, LoggingConfig};
pub use device::{Device, DeviceCommand, DeviceHandle, DeviceSnapshot};
pub use error::{MeterSrvError, Result};
pub use events::{ConnectionState, DeviceEvent, DeviceStatus};
pub use meter_protocols::{DeviceKind, Measurement, Unit};
