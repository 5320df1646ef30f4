//! Subscriber setup for applications embedding the core.
//!
//! The library itself only emits `tracing` events. An application installs a
//! subscriber once at startup with [`init`], usually from the `logging`
//! section of [`AppConfig`](crate::config::AppConfig), and keeps the returned
//! [`LoggingGuard`] until it exits.
//!
//! Console output is human readable; `RUST_LOG`, when set, replaces the
//! configured console filter. File output is JSON, one event per line, in
//! files rotated by [`LogRotation`].
//!
//! ```rust,ignore
//! let config = AppConfig::load()?;
//! let _guard = cloudtape_core::logging::init(&config.logging)?;
//! ```

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

/// Targets logged at the configured level. Other crates are held to `warn`
/// on the console and `info` in files.
const OWN_TARGETS: &[&str] = &["cloudtape", "cloudtape_core"];

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// How the global subscriber is assembled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Console level for our own crates, `error` through `trace`.
    pub console_level: String,
    /// Colour console output.
    pub console_ansi: bool,
    /// Show targets, source locations and span open/close events.
    pub verbose: bool,
    /// JSON file output. `None` logs to the console only.
    pub file: Option<FileLogConfig>,
}

/// Rotating JSON log files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLogConfig {
    /// Directory holding the log files; created on [`init`].
    pub directory: PathBuf,
    /// File name prefix, as in `<prefix>.<date>.log`.
    pub prefix: String,
    /// File level for our own crates.
    pub level: String,
    /// How often a new file is started.
    pub rotation: LogRotation,
    /// Rotated files to keep. `0` keeps all of them.
    pub max_files: usize,
}

/// Log file rotation period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogRotation {
    /// A file per hour.
    Hourly,
    /// A file per day.
    #[default]
    Daily,
    /// A single file.
    Never,
}

impl LogRotation {
    const fn period(self) -> Rotation {
        match self {
            Self::Hourly => Rotation::HOURLY,
            Self::Daily => Rotation::DAILY,
            Self::Never => Rotation::NEVER,
        }
    }
}

impl Default for FileLogConfig {
    fn default() -> Self {
        Self {
            directory: default_log_directory(),
            prefix: "cloudtape".to_string(),
            level: "debug".to_string(),
            rotation: LogRotation::Daily,
            max_files: 7,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::release_build()
    }
}

impl LoggingConfig {
    /// Quiet console, daily files at `debug`.
    #[must_use]
    pub fn release_build() -> Self {
        Self {
            console_level: "info".to_string(),
            console_ansi: true,
            verbose: false,
            file: Some(FileLogConfig::default()),
        }
    }

    /// Verbose console, hourly files at `trace`.
    #[must_use]
    pub fn debug_build() -> Self {
        Self {
            console_level: "debug".to_string(),
            console_ansi: true,
            verbose: true,
            file: Some(FileLogConfig {
                level: "trace".to_string(),
                rotation: LogRotation::Hourly,
                max_files: 24,
                ..FileLogConfig::default()
            }),
        }
    }

    /// [`Self::debug_build`] or [`Self::release_build`], matching this build.
    #[must_use]
    pub fn for_build() -> Self {
        if cfg!(debug_assertions) {
            Self::debug_build()
        } else {
            Self::release_build()
        }
    }

    /// Console output at `info` and no files.
    #[must_use]
    pub fn console_only() -> Self {
        Self {
            file: None,
            ..Self::release_build()
        }
    }

    /// Set the console level for our own crates.
    #[must_use]
    pub fn with_console_level(mut self, level: Level) -> Self {
        self.console_level = level.as_str().to_ascii_lowercase();
        self
    }

    /// Write log files into `directory`, enabling file output if it was off.
    #[must_use]
    pub fn with_log_directory(mut self, directory: PathBuf) -> Self {
        self.file.get_or_insert_with(FileLogConfig::default).directory = directory;
        self
    }

    /// Replace the file output settings.
    #[must_use]
    pub fn with_file(mut self, file: Option<FileLogConfig>) -> Self {
        self.file = file;
        self
    }
}

/// Keeps the background file writer alive. Dropping it flushes pending
/// events.
pub struct LoggingGuard {
    file_guard: Option<WorkerGuard>,
}

impl LoggingGuard {
    /// Whether events are also written to files.
    #[must_use]
    pub const fn writes_files(&self) -> bool {
        self.file_guard.is_some()
    }
}

/// Install the global subscriber described by `config`.
///
/// # Errors
///
/// Fails on an unknown level name, when the log directory or file appender
/// cannot be created, or when a global subscriber is already installed.
/// Nothing is installed on failure.
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard, LoggingError> {
    let console_level = parse_level(&config.console_level)?;
    let console_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => env_filter("warn", console_level)?,
    };

    let (file_layer, file_guard) = match &config.file {
        Some(file) => {
            let (layer, guard) = file_layer(file)?;
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let span_events = if config.verbose {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    let console_layer = fmt::layer()
        .with_ansi(config.console_ansi)
        .with_target(config.verbose)
        .with_file(config.verbose)
        .with_line_number(config.verbose)
        .with_span_events(span_events)
        .with_filter(console_filter);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    Ok(LoggingGuard { file_guard })
}

/// [`init`] with [`LoggingConfig::for_build`].
///
/// # Errors
///
/// See [`init`].
pub fn init_auto() -> Result<LoggingGuard, LoggingError> {
    init(&LoggingConfig::for_build())
}

/// Platform log directory, e.g. `~/.local/share/cloudtape/logs` on Linux.
#[must_use]
pub fn default_log_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cloudtape")
        .join("logs")
}

fn file_layer(config: &FileLogConfig) -> Result<(BoxedLayer, WorkerGuard), LoggingError> {
    let level = parse_level(&config.level)?;
    std::fs::create_dir_all(&config.directory).map_err(|e| {
        LoggingError::DirectoryCreationFailed {
            path: config.directory.clone(),
            reason: e.to_string(),
        }
    })?;

    let mut appender = RollingFileAppender::builder()
        .rotation(config.rotation.period())
        .filename_prefix(config.prefix.as_str())
        .filename_suffix("log");
    if config.max_files > 0 {
        appender = appender.max_log_files(config.max_files);
    }
    let appender = appender
        .build(&config.directory)
        .map_err(|e| LoggingError::AppenderFailed(e.to_string()))?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let layer = fmt::layer()
        .json()
        .with_writer(writer)
        .with_ansi(false)
        .with_file(true)
        .with_line_number(true)
        .with_filter(env_filter("info", level)?)
        .boxed();
    Ok((layer, guard))
}

fn parse_level(name: &str) -> Result<Level, LoggingError> {
    Level::from_str(name.trim()).map_err(|_| LoggingError::InvalidLevel(name.to_string()))
}

/// `others` for every target, `own` for ours.
fn directives(others: &str, own: Level) -> String {
    let own = own.as_str().to_ascii_lowercase();
    let mut directives = others.to_string();
    for target in OWN_TARGETS {
        directives.push_str(&format!(",{target}={own}"));
    }
    directives
}

fn env_filter(others: &str, own: Level) -> Result<EnvFilter, LoggingError> {
    EnvFilter::try_new(directives(others, own))
        .map_err(|e| LoggingError::InvalidFilter(e.to_string()))
}

/// Errors from [`init`].
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// The log directory could not be created.
    #[error("Failed to create log directory {path}: {reason}")]
    DirectoryCreationFailed {
        /// Directory that was requested.
        path: PathBuf,
        /// Underlying I/O error.
        reason: String,
    },

    /// The rolling file appender could not be built.
    #[error("Failed to create log file appender: {0}")]
    AppenderFailed(String),

    /// A level name is not one of `error`, `warn`, `info`, `debug`, `trace`.
    #[error("Unknown log level: {0:?}")]
    InvalidLevel(String),

    /// A filter directive did not parse.
    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),

    /// A global subscriber was installed earlier.
    #[error("Logging already initialized: {0}")]
    AlreadyInitialized(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_is_release_build() {
        let config = LoggingConfig::default();
        assert_eq!(config.console_level, "info");
        assert!(!config.verbose);
        let file = config.file.expect("file output");
        assert_eq!(file.level, "debug");
        assert_eq!(file.rotation, LogRotation::Daily);
        assert_eq!(file.max_files, 7);
    }

    #[test]
    fn test_debug_build_is_verbose() {
        let config = LoggingConfig::debug_build();
        assert_eq!(config.console_level, "debug");
        assert!(config.verbose);
        let file = config.file.expect("file output");
        assert_eq!(file.level, "trace");
        assert_eq!(file.rotation, LogRotation::Hourly);
        assert_eq!(file.prefix, "cloudtape");
    }

    #[test]
    fn test_console_only_and_builders() {
        let config = LoggingConfig::console_only().with_console_level(Level::WARN);
        assert_eq!(config.file, None);
        assert_eq!(config.console_level, "warn");

        let dir = PathBuf::from("/var/log/cloudtape");
        let config = config.with_log_directory(dir.clone());
        assert_eq!(config.file.map(|f| f.directory), Some(dir));
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let config: LoggingConfig =
            serde_json::from_str(r#"{"console_level":"trace","file":null}"#).expect("parse");
        assert_eq!(config.console_level, "trace");
        assert!(config.console_ansi);
        assert_eq!(config.file, None);

        let file: FileLogConfig =
            serde_json::from_str(r#"{"rotation":"hourly"}"#).expect("parse");
        assert_eq!(file.rotation, LogRotation::Hourly);
        assert_eq!(file.prefix, "cloudtape");
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("WARN").expect("level"), Level::WARN);
        assert_eq!(parse_level(" debug ").expect("level"), Level::DEBUG);
        assert!(matches!(
            parse_level("loud"),
            Err(LoggingError::InvalidLevel(name)) if name == "loud"
        ));
    }

    #[test]
    fn test_directives_cover_own_crates() {
        assert_eq!(
            directives("warn", Level::INFO),
            "warn,cloudtape=info,cloudtape_core=info"
        );
        assert!(env_filter("info", Level::TRACE).is_ok());
    }

    #[test]
    fn test_file_layer_creates_directory() {
        let temp = TempDir::new().expect("temp dir");
        let config = FileLogConfig {
            directory: temp.path().join("nested").join("logs"),
            rotation: LogRotation::Never,
            ..FileLogConfig::default()
        };

        let (_layer, _guard) = file_layer(&config).expect("file layer");
        assert!(config.directory.is_dir());
    }

    #[test]
    fn test_init_rejects_unknown_level() {
        let config = LoggingConfig {
            console_level: "chatty".to_string(),
            ..LoggingConfig::console_only()
        };
        assert!(matches!(init(&config), Err(LoggingError::InvalidLevel(_))));
    }

    #[test]
    fn test_default_log_directory() {
        let dir = default_log_directory();
        assert!(dir.ends_with("cloudtape/logs"));
    }
}
