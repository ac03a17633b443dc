//! Service configuration
//!
//! Loaded from a YAML/TOML/JSON file through figment, then overridden by
//! `METERSRV_`-prefixed environment variables (`__` separates nesting levels,
//! e.g. `METERSRV_DEVICE__PORT=/dev/ttyUSB1`).

use figment::{
    providers::{Env, Format, Json, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use meter_protocols::DeviceKind;

use crate::error::{ErrorExt, MeterSrvError, Result};

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "METERSRV_";

/// Display name used when none is configured
pub const DEFAULT_DEVICE_NAME: &str = "Power";

fn default_device_name() -> String {
    DEFAULT_DEVICE_NAME.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

/// Instrument connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Protocol family, persisted as 0 (Holdpeak) or 1 (Mason)
    #[serde(default)]
    pub kind: DeviceKind,
    /// Serial port path (e.g., "/dev/ttyUSB0", "COM3")
    #[serde(default)]
    pub port: String,
    /// Display name shown in logs
    #[serde(default = "default_device_name")]
    pub name: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            kind: DeviceKind::default(),
            port: String::new(),
            name: default_device_name(),
        }
    }
}

impl DeviceConfig {
    /// Reset to the cleared settings
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn validate(&self) -> Result<()> {
        if self.port.trim().is_empty() {
            return Err(MeterSrvError::config("device.port cannot be empty"));
        }
        if self.name.trim().is_empty() {
            return Err(MeterSrvError::config("device.name cannot be empty"));
        }
        Ok(())
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Console level when neither `--log-level` nor `RUST_LOG` is given
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log root directory; `METERSRV_LOG_DIR` takes precedence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
    /// Write a daily-rolling log file
    #[serde(default = "default_true")]
    pub file: bool,
    /// Write the log file as JSON lines
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
            file: true,
            json: false,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        self.device.validate()?;
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "warning" | "error" => Ok(()),
            other => Err(MeterSrvError::config(format!(
                "logging.level '{other}' is not a log level"
            ))),
        }
    }
}

/// Configuration loader and writer
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: AppConfig,
    source: Option<PathBuf>,
}

impl ConfigManager {
    /// Load from a file, then apply environment overrides
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(MeterSrvError::config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| MeterSrvError::config("Invalid file extension"))?;

        let figment = match extension {
            "json" => Figment::new().merge(Json::file(path)),
            "toml" => Figment::new().merge(Toml::file(path)),
            "yaml" | "yml" => Figment::new().merge(Yaml::file(path)),
            other => {
                return Err(MeterSrvError::config(format!(
                    "Unsupported config file format: {other}"
                )))
            },
        };

        let mut manager = Self::from_figment(figment.merge(Self::env_provider()))?;
        manager.source = Some(path.to_path_buf());
        info!("Loaded configuration from: {}", path.display());
        Ok(manager)
    }

    /// Defaults plus environment overrides, for running without a file
    pub fn from_env() -> Result<Self> {
        Self::from_figment(Figment::new().merge(Self::env_provider()))
    }

    /// Extract from an already assembled figment
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: AppConfig = figment
            .extract()
            .config_error("Failed to parse config")?;
        debug!("Configuration: {:?}", config);

        Ok(Self {
            config,
            source: None,
        })
    }

    fn env_provider() -> Env {
        Env::prefixed(ENV_PREFIX).split("__")
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut AppConfig {
        &mut self.config
    }

    pub fn into_config(self) -> AppConfig {
        self.config
    }

    /// File the configuration was loaded from, if any
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Write the configuration as YAML, creating parent directories
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .io_error(&format!("Failed to create {}", parent.display()))?;
        }

        let yaml = serde_yaml::to_string(&self.config)?;
        std::fs::write(path, yaml).io_error(&format!("Failed to write {}", path.display()))?;
        info!("Saved configuration to: {}", path.display());
        Ok(())
    }
}
