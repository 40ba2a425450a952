//! TaskLens Logging System
//!
//! Structured logging on top of `tracing`. Each way of running the binary
//! (API server, standalone worker, one-shot CLI) gets its own preset.

use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

/// Days rotated log files are kept
pub const DEFAULT_RETENTION_DAYS: u32 = 7;

/// Logging configuration options
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Minimum log level to output
    pub level: Level,
    /// Enable colored output
    pub color: bool,
    /// Show timestamps
    pub show_timestamps: bool,
    /// Show target/module name
    pub show_target: bool,
    /// Enable JSON format for machine parsing
    pub json_format: bool,
    /// Enable span events for tracing
    pub enable_spans: bool,
    /// Write to a daily-rotated file instead of stderr
    pub file_output: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            color: true,
            show_timestamps: false,
            show_target: false,
            json_format: false,
            enable_spans: false,
            file_output: None,
        }
    }
}

impl LoggingConfig {
    /// Create config for different application modes
    pub fn for_mode(mode: ApplicationMode) -> Self {
        match mode {
            ApplicationMode::Server => Self {
                level: Level::INFO,
                color: false,
                show_timestamps: true,
                show_target: true,
                json_format: false,
                enable_spans: true, // request and job spans
                file_output: None,
            },
            ApplicationMode::Worker => Self {
                level: Level::INFO,
                color: false,
                show_timestamps: true,
                show_target: true,
                json_format: false,
                enable_spans: true,
                file_output: None,
            },
            ApplicationMode::Cli => Self {
                level: Level::WARN,
                color: io::stderr().is_terminal(),
                show_timestamps: false,
                show_target: false,
                json_format: false,
                enable_spans: false,
                file_output: None,
            },
            ApplicationMode::Test => Self {
                level: Level::DEBUG,
                color: false,
                show_timestamps: true,
                show_target: true,
                json_format: false,
                enable_spans: true,
                file_output: None,
            },
        }
    }

    /// Apply the global `--verbose/--quiet/--json` flags on top of a preset
    pub fn with_args(mut self, quiet: bool, verbose: bool, json: bool) -> Self {
        if verbose {
            self.level = Level::DEBUG;
            self.show_target = true;
            self.enable_spans = true;
        } else if quiet {
            self.level = Level::ERROR;
        }

        if json {
            self.json_format = true;
            self.color = false;
            self.show_timestamps = true;
        }
        if quiet {
            self.color = false;
        }
        self
    }

    pub fn with_file_output(mut self, path: PathBuf) -> Self {
        self.color = false;
        self.file_output = Some(path);
        self
    }
}

/// Application modes with different logging requirements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationMode {
    /// HTTP API, usually with an embedded worker
    Server,
    /// Standalone analysis worker
    Worker,
    /// One-shot commands; stdout is reserved for command output
    Cli,
    /// Test mode - maximum detail for testing
    Test,
}

impl ApplicationMode {
    fn log_file_name(&self) -> &'static str {
        match self {
            ApplicationMode::Server => "server.log",
            ApplicationMode::Worker => "worker.log",
            ApplicationMode::Cli => "cli.log",
            ApplicationMode::Test => "test.log",
        }
    }
}

/// Initialize the logging system. Console output goes to stderr.
pub fn init_logging(config: LoggingConfig) -> io::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tasklens={}", config.level)));

    let registry = Registry::default().with(env_filter);

    if let Some(log_file) = config.file_output {
        let file_appender = tracing_appender::rolling::daily(
            log_file.parent().ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "Invalid log file path")
            })?,
            log_file.file_name().ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "Invalid log file name")
            })?,
        );

        if config.json_format {
            let json_layer = fmt::layer()
                .json()
                .with_current_span(config.enable_spans)
                .with_span_events(FmtSpan::CLOSE)
                .with_writer(file_appender);
            json_layer.with_subscriber(registry).init();
        } else {
            fmt::layer()
                .with_target(config.show_target)
                .with_level(true)
                .with_ansi(false)
                .with_timer(fmt::time::ChronoUtc::rfc_3339())
                .with_writer(file_appender)
                .with_subscriber(registry)
                .init();
        }
    } else if config.json_format {
        let json_layer = fmt::layer()
            .json()
            .with_current_span(config.enable_spans)
            .with_span_events(FmtSpan::CLOSE)
            .with_writer(io::stderr);
        json_layer.with_subscriber(registry).init();
    } else {
        let fmt_layer = fmt::layer()
            .with_target(config.show_target)
            .with_level(true)
            .with_ansi(config.color)
            .with_writer(io::stderr);

        if config.show_timestamps {
            fmt_layer
                .with_timer(fmt::time::ChronoUtc::rfc_3339())
                .with_subscriber(registry)
                .init();
        } else {
            fmt_layer.without_time().with_subscriber(registry).init();
        }
    }

    Ok(())
}

/// Clean up old log files based on retention policy
///
/// Only rotated files (`<name>.log.YYYY-MM-DD`) older than `retention_days`
/// are removed; the active file is never touched.
pub fn cleanup_old_logs(log_dir: &Path, retention_days: u32) -> io::Result<()> {
    use std::fs;
    use std::time::SystemTime;

    if !log_dir.exists() {
        return Ok(());
    }

    let now = SystemTime::now();
    let retention = std::time::Duration::from_secs(retention_days as u64 * 24 * 60 * 60);

    let mut cleaned_count = 0;
    let mut cleaned_size: u64 = 0;

    for entry in fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();

        let is_rotated = path
            .file_name()
            .map(|n| n.to_string_lossy().contains(".log."))
            .unwrap_or(false);
        if !is_rotated || !path.is_file() {
            continue;
        }

        let metadata = entry.metadata()?;
        let Ok(age) = now.duration_since(metadata.modified()?) else {
            continue;
        };

        if age > retention {
            let size = metadata.len();
            match fs::remove_file(&path) {
                Ok(_) => {
                    cleaned_count += 1;
                    cleaned_size += size;
                },
                Err(e) => {
                    tracing::warn!("Failed to remove old log file {}: {}", path.display(), e);
                },
            }
        }
    }

    if cleaned_count > 0 {
        tracing::info!(
            files = cleaned_count,
            bytes = cleaned_size,
            "Log cleanup completed"
        );
    }

    Ok(())
}

/// Directory holding log files, `<data dir>/tasklens/logs`
pub fn log_dir() -> io::Result<PathBuf> {
    let base = dirs::data_dir()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "No data directory available"))?;
    Ok(base.join("tasklens").join("logs"))
}

/// Log file path for a given application mode. Creates the directory.
pub fn log_file_path(mode: ApplicationMode) -> io::Result<PathBuf> {
    let dir = log_dir()?;
    std::fs::create_dir_all(&dir)?;
    Ok(dir.join(mode.log_file_name()))
}

#[macro_export]
macro_rules! log_task_operation {
    ($operation:expr, $task_id:expr) => {
        tracing::info!(operation = $operation, task_id = $task_id, "Task operation");
    };
    ($operation:expr, $task_id:expr, $details:expr) => {
        tracing::info!(
            operation = $operation,
            task_id = $task_id,
            details = $details,
            "Task operation"
        );
    };
}

#[macro_export]
macro_rules! log_job_operation {
    ($operation:expr, $job_id:expr, $name:expr) => {
        tracing::debug!(
            operation = $operation,
            job_id = $job_id,
            queue = $name,
            "Job operation"
        );
    };
}

/// Utility macro for structured error logging
#[macro_export]
macro_rules! log_error {
    ($error:expr, $context:expr) => {{
        tracing::error!(
            error = %$error,
            context = $context,
            "Operation failed"
        );
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    #[test]
    fn test_mode_presets() {
        let server = LoggingConfig::for_mode(ApplicationMode::Server);
        assert!(server.show_timestamps);
        assert!(!server.color);

        let cli = LoggingConfig::for_mode(ApplicationMode::Cli);
        assert_eq!(cli.level, Level::WARN);

        let test = LoggingConfig::for_mode(ApplicationMode::Test);
        assert_eq!(test.level, Level::DEBUG);
    }

    #[test]
    fn test_log_error_usable_as_match_arm() {
        let outcomes: [std::result::Result<(), &str>; 2] = [Ok(()), Err("disk full")];
        for outcome in outcomes {
            match outcome {
                Ok(()) => {},
                Err(e) => crate::log_error!(e, "recording outcome"),
            }
        }
    }

    #[test]
    fn test_with_args_overrides_preset() {
        let config = LoggingConfig::for_mode(ApplicationMode::Cli).with_args(false, true, false);
        assert_eq!(config.level, Level::DEBUG);
        assert!(config.enable_spans);

        let config = LoggingConfig::for_mode(ApplicationMode::Server).with_args(true, false, true);
        assert_eq!(config.level, Level::ERROR);
        assert!(config.json_format);
        assert!(!config.color);
    }

    #[test]
    fn test_cleanup_removes_only_old_rotated_files() {
        let dir = TempDir::new().unwrap();
        let active = dir.path().join("server.log");
        let fresh = dir.path().join("server.log.2026-10-18");
        let stale = dir.path().join("server.log.2026-01-01");
        for path in [&active, &fresh, &stale] {
            fs::write(path, "line\n").unwrap();
        }

        let old = SystemTime::now() - Duration::from_secs(30 * 24 * 60 * 60);
        fs::File::options()
            .write(true)
            .open(&stale)
            .unwrap()
            .set_modified(old)
            .unwrap();
        fs::File::options()
            .write(true)
            .open(&active)
            .unwrap()
            .set_modified(old)
            .unwrap();

        cleanup_old_logs(dir.path(), DEFAULT_RETENTION_DAYS).unwrap();

        assert!(active.exists());
        assert!(fresh.exists());
        assert!(!stale.exists());
    }

    #[test]
    fn test_cleanup_missing_dir_is_ok() {
        let dir = TempDir::new().unwrap();
        assert!(cleanup_old_logs(&dir.path().join("nope"), 1).is_ok());
    }
}
