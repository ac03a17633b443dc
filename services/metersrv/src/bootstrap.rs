//! Command line and startup sequence

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::warn;

use common::service_bootstrap::{self, LoggingOptions, ServiceInfo};
use meter_protocols::DeviceKind;

use crate::config::{ConfigManager, LoggingConfig};
use crate::error::{MeterSrvError, Result};

/// Default configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/metersrv.yaml";

/// Supply output switch requested on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PowerSwitch {
    On,
    Off,
}

/// Command-line arguments for metersrv
#[derive(Parser, Debug, Clone)]
#[command(
    name = "metersrv",
    version = env!("CARGO_PKG_VERSION"),
    about = "Serial multimeter and power-supply link service",
    long_about = None
)]
pub struct Args {
    /// Configuration file (yaml, toml or json)
    #[arg(short = 'c', long, env = "METERSRV_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short = 'l', long)]
    pub log_level: Option<String>,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Validation mode - only validate configuration without opening the port
    #[arg(long)]
    pub validate: bool,

    /// Serial port, overrides device.port
    #[arg(short = 'p', long)]
    pub port: Option<String>,

    /// Device kind (0/holdpeak, 1/mason), overrides device.kind
    #[arg(short = 'k', long)]
    pub kind: Option<DeviceKind>,

    /// Switch the supply output once the port is open
    #[arg(long, value_enum)]
    pub power: Option<PowerSwitch>,

    /// Write the effective configuration to this file and exit
    #[arg(long)]
    pub save_config: Option<PathBuf>,
}

/// Load the configuration file and apply command-line overrides
///
/// A missing file is tolerated when the port is given on the command line.
pub fn load_config(args: &Args) -> Result<ConfigManager> {
    let mut manager = if args.config.exists() {
        ConfigManager::from_file(&args.config)?
    } else if args.port.is_some() {
        warn!(
            "Configuration file {} not found, using defaults",
            args.config.display()
        );
        ConfigManager::from_env()?
    } else {
        return Err(MeterSrvError::config(format!(
            "Configuration file not found: {} (use --config or --port)",
            args.config.display()
        )));
    };

    let config = manager.config_mut();
    if let Some(port) = &args.port {
        config.device.port = port.clone();
    }
    if let Some(kind) = args.kind {
        config.device.kind = kind;
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }

    Ok(manager)
}

/// Library crates whose debug output follows the service's own level
pub const LOG_TARGETS: &[&str] = &["meter_protocols"];

/// Initialize logging from the merged configuration
pub fn initialize_logging(
    args: &Args,
    service_info: &ServiceInfo,
    logging: &LoggingConfig,
) -> anyhow::Result<()> {
    service_bootstrap::init_logging(
        service_info,
        LoggingOptions {
            level: service_bootstrap::parse_log_level(&logging.level),
            dir: logging.dir.as_deref(),
            file: logging.file,
            json: logging.json,
            ansi: !args.no_color,
            targets: LOG_TARGETS,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["metersrv"]).unwrap();
        assert!(!args.validate);
        assert!(args.port.is_none());
        assert!(args.power.is_none());
    }

    #[test]
    fn test_args_overrides() {
        let args = Args::try_parse_from([
            "metersrv",
            "--port",
            "/dev/ttyUSB3",
            "--kind",
            "mason",
            "--power",
            "on",
            "-l",
            "debug",
        ])
        .unwrap();
        assert_eq!(args.port.as_deref(), Some("/dev/ttyUSB3"));
        assert_eq!(args.kind, Some(DeviceKind::Mason));
        assert_eq!(args.power, Some(PowerSwitch::On));
        assert_eq!(args.log_level.as_deref(), Some("debug"));

        let args = Args::try_parse_from(["metersrv", "-k", "0"]).unwrap();
        assert_eq!(args.kind, Some(DeviceKind::Holdpeak));
    }

    #[test]
    fn test_args_reject_unknown_kind() {
        assert!(Args::try_parse_from(["metersrv", "--kind", "fluke"]).is_err());
    }

    #[test]
    fn test_missing_config_without_port() {
        let args = Args::try_parse_from(["metersrv", "-c", "/nonexistent/metersrv.yaml"]).unwrap();
        assert!(matches!(load_config(&args), Err(MeterSrvError::ConfigError(_))));
    }

    #[test]
    fn test_missing_config_with_port() {
        let args = Args::try_parse_from([
            "metersrv",
            "-c",
            "/nonexistent/metersrv.yaml",
            "--port",
            "COM4",
            "--kind",
            "1",
        ])
        .unwrap();
        let manager = load_config(&args).unwrap();
        assert_eq!(manager.config().device.port, "COM4");
        assert_eq!(manager.config().device.kind, DeviceKind::Mason);
        assert_eq!(manager.config().device.name, "Power");
    }
}
