//! Unified logging module for metersrv
//!
//! Console output plus an optional daily-rolling log file, both filtered by
//! one `EnvFilter` built from `RUST_LOG` or [`LogConfig::default_filter`].

use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{
        self,
        format::Writer,
        FmtContext, FormatEvent, FormatFields,
    },
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Environment variable overriding the log root directory
pub const LOG_DIR_ENV: &str = "METERSRV_LOG_DIR";

fn format_level(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "[TRACE]",
        Level::DEBUG => "[DEBUG]",
        Level::INFO => "[INFO]",
        Level::WARN => "[WARN]",
        Level::ERROR => "[ERROR]",
    }
}

fn level_color(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "\x1b[35m",
        Level::DEBUG => "\x1b[34m",
        Level::INFO => "\x1b[32m",
        Level::WARN => "\x1b[33m",
        Level::ERROR => "\x1b[31m",
    }
}

/// Event formatter producing `timestamp [LEVEL] message`
///
/// Example output: `2026-10-18T09:12:44.809113Z [INFO] Device started`
struct BracketedLevelFormat;

impl<S, N> FormatEvent<S, N> for BracketedLevelFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = chrono::Utc::now();
        write!(writer, "{} ", now.format("%Y-%m-%dT%H:%M:%S%.6fZ"))?;

        let level = event.metadata().level();
        if writer.has_ansi_escapes() {
            write!(writer, "{}{}\x1b[0m ", level_color(level), format_level(level))?;
        } else {
            write!(writer, "{} ", format_level(level))?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

// File writer guards must live as long as the process
static GUARDS: OnceLock<Mutex<Vec<WorkerGuard>>> = OnceLock::new();

static LOG_ROOT: OnceLock<PathBuf> = OnceLock::new();

/// Initialize the log root directory
///
/// Priority: `METERSRV_LOG_DIR` env > `config_dir` > `logs`.
/// Only the first call has an effect.
pub fn init_log_root(config_dir: Option<&str>) {
    LOG_ROOT.get_or_init(|| resolve_log_root(config_dir));
}

/// Get the log root directory
pub fn get_log_root() -> PathBuf {
    LOG_ROOT
        .get()
        .cloned()
        .unwrap_or_else(|| resolve_log_root(None))
}

fn resolve_log_root(config_dir: Option<&str>) -> PathBuf {
    std::env::var(LOG_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            config_dir
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("logs"))
        })
}

/// Logger configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Service name, used as log file prefix and filter target
    pub service_name: String,
    /// Directory for log files
    pub log_dir: PathBuf,
    /// Level applied when `RUST_LOG` is not set
    pub console_level: Level,
    /// Level for the service's own targets
    pub file_level: Level,
    /// Write the log file as JSON lines
    pub enable_json: bool,
    /// Write a daily-rolling log file in addition to the console
    pub enable_file: bool,
    /// Colored console output
    pub ansi: bool,
    /// Further crate targets raised to the service's own level
    pub extra_targets: Vec<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "metersrv".to_string(),
            log_dir: get_log_root(),
            console_level: Level::INFO,
            file_level: Level::DEBUG,
            enable_json: false,
            enable_file: true,
            ansi: true,
            extra_targets: Vec::new(),
        }
    }
}

impl LogConfig {
    /// Default filter directive used when `RUST_LOG` is not set
    ///
    /// Example: `info,metersrv=debug,meter_protocols=debug`
    pub fn default_filter(&self) -> String {
        let own = if self.file_level > self.console_level {
            self.file_level
        } else {
            self.console_level
        };
        let own = own.as_str().to_lowercase();

        let mut filter = self.console_level.as_str().to_lowercase();
        for target in std::iter::once(&self.service_name).chain(&self.extra_targets) {
            filter.push_str(&format!(",{}={}", target.replace('-', "_"), own));
        }
        filter
    }
}

/// Initialize the logging system
///
/// Fails if a global subscriber is already installed.
pub fn init_with_config(config: LogConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter_str = std::env::var("RUST_LOG").unwrap_or_else(|_| config.default_filter());
    let env_filter = EnvFilter::try_new(&filter_str)?;

    let registry = tracing_subscriber::registry().with(env_filter);

    let console_layer = fmt::layer()
        .with_ansi(config.ansi)
        .event_format(BracketedLevelFormat)
        .boxed();

    let file_layer = if config.enable_file {
        std::fs::create_dir_all(&config.log_dir)?;
        let appender = tracing_appender::rolling::daily(
            &config.log_dir,
            format!("{}.log", config.service_name),
        );
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        let guards = GUARDS.get_or_init(|| Mutex::new(Vec::new()));
        match guards.lock() {
            Ok(mut guards) => guards.push(guard),
            Err(poisoned) => poisoned.into_inner().push(guard),
        }

        let layer = if config.enable_json {
            fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_target(true)
                .boxed()
        } else {
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .event_format(BracketedLevelFormat)
                .boxed()
        };
        Some(layer)
    } else {
        None
    };

    registry.with(console_layer).with(file_layer).try_init()?;

    if config.enable_file {
        tracing::info!("Logging: {} @ {:?} ({})", config.service_name, config.log_dir, filter_str);
    }

    Ok(())
}
