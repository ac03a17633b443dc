//! Service bootstrap helpers
//!
//! Startup banner, logging initialization and level parsing shared by the
//! service binary.

use crate::logging::{self, LogConfig};
use tracing::{info, Level};

/// Service metadata for startup
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    /// Service name (e.g., "metersrv")
    pub name: String,
    /// Version of the calling binary
    pub version: String,
    /// Service description
    pub description: String,
}

impl ServiceInfo {
    /// Create new service info
    ///
    /// Pass `env!("CARGO_PKG_VERSION")` from the binary crate as `version`.
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: description.into(),
        }
    }
}

/// Print the startup banner
pub fn print_startup_banner(service: &ServiceInfo) {
    info!("");
    info!(" {} v{}", service.name.to_uppercase(), service.version);
    info!(" {}", service.description);
    info!("");
}

/// Parse a log level name, falling back to INFO for unknown input
pub fn parse_log_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Options collected from the command line and the config file
#[derive(Debug, Clone)]
pub struct LoggingOptions<'a> {
    /// Console level; `RUST_LOG` still takes precedence
    pub level: Level,
    /// Log root from the config file
    pub dir: Option<&'a str>,
    /// Write the log file
    pub file: bool,
    /// Write the log file as JSON lines
    pub json: bool,
    /// Colored console output
    pub ansi: bool,
    /// Further crate targets logged at the service's own level
    pub targets: &'a [&'a str],
}

impl Default for LoggingOptions<'_> {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            dir: None,
            file: true,
            json: false,
            ansi: true,
            targets: &[],
        }
    }
}

/// Initialize logging for a service
///
/// Log root directory priority:
/// 1. `METERSRV_LOG_DIR` environment variable
/// 2. `options.dir` from the config file
/// 3. Default "logs"
///
/// Files are written to `<root>/<service name>/`.
pub fn init_logging(service: &ServiceInfo, options: LoggingOptions<'_>) -> anyhow::Result<()> {
    logging::init_log_root(options.dir);

    let log_config = LogConfig {
        service_name: service.name.clone(),
        log_dir: logging::get_log_root().join(&service.name),
        console_level: options.level,
        file_level: Level::DEBUG,
        enable_json: options.json,
        enable_file: options.file,
        ansi: options.ansi,
        extra_targets: options.targets.iter().map(|t| (*t).to_string()).collect(),
    };

    logging::init_with_config(log_config).map_err(|e| anyhow::anyhow!("{}", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("trace"), Level::TRACE);
        assert_eq!(parse_log_level("DEBUG"), Level::DEBUG);
        assert_eq!(parse_log_level("warning"), Level::WARN);
        assert_eq!(parse_log_level("error"), Level::ERROR);
        assert_eq!(parse_log_level("verbose"), Level::INFO);
    }

    #[test]
    fn test_service_info() {
        let info = ServiceInfo::new("metersrv", "1.2.3", "Meter service");
        assert_eq!(info.name, "metersrv");
        assert_eq!(info.version, "1.2.3");
    }

    #[test]
    fn test_default_options() {
        let options = LoggingOptions::default();
        assert_eq!(options.level, Level::INFO);
        assert!(options.file);
        assert!(!options.json);
        assert!(options.dir.is_none());
        assert!(options.targets.is_empty());
    }
}
