//! Logging
//!
//! Thin, explicit layer over `tracing`. Every message carries a
//! [`Severity`] and the prefix of the section it belongs to
//! (`[cam front]: ...`). Nothing is resolved by name at runtime.
//!
//! `Quiet` messages are the daemon's progress narration. They are emitted
//! under their own target so the `quiet` verbosity can keep them while
//! dropping ordinary info output.

use crate::error::{CamError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::OpenOptions;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Target used for [`Severity::Quiet`] events
pub const QUIET_TARGET: &str = "camwarden::quiet";

/// Configured verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Progress narration, warnings and errors only
    Quiet,
    #[default]
    Info,
    Debug,
    /// Everything, including per-ioctl tracing
    Dev,
}

impl LogLevel {
    /// `EnvFilter` directive for this verbosity
    pub fn filter_directive(&self) -> String {
        match self {
            LogLevel::Quiet => format!("warn,{}=info", QUIET_TARGET),
            LogLevel::Info => "info".to_string(),
            LogLevel::Debug => "debug".to_string(),
            LogLevel::Dev => "trace".to_string(),
        }
    }
}

impl FromStr for LogLevel {
    type Err = CamError;

    /// Unknown values fall back to `info`, like the config file always has
    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "quiet" => LogLevel::Quiet,
            "debug" => LogLevel::Debug,
            "dev" => LogLevel::Dev,
            _ => LogLevel::Info,
        })
    }
}

/// Severity of a single message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Quiet,
    Info,
    Warn,
    Error,
    Debug,
    Dev,
}

/// Emit one message with an explicit severity and prefix
pub fn log(severity: Severity, prefix: &str, msg: impl fmt::Display) {
    match severity {
        Severity::Quiet => tracing::info!(target: QUIET_TARGET, "{}{}", prefix, msg),
        Severity::Info => tracing::info!("{}{}", prefix, msg),
        Severity::Warn => tracing::warn!("{}{}", prefix, msg),
        Severity::Error => tracing::error!("{}{}", prefix, msg),
        Severity::Debug => tracing::debug!("{}{}", prefix, msg),
        Severity::Dev => tracing::trace!("{}{}", prefix, msg),
    }
}

/// Emit each line of `text` as its own message
pub fn log_multiline(severity: Severity, prefix: &str, text: &str) {
    for line in text.lines() {
        log(severity, prefix, line);
    }
}

/// Logger bound to one config section
#[derive(Debug, Clone)]
pub struct SectionLogger {
    prefix: String,
}

impl SectionLogger {
    /// `[cam front]` becomes the prefix `[cam front]: `
    pub fn new(section: impl fmt::Display) -> Self {
        Self {
            prefix: format!("{}: ", section),
        }
    }

    /// Same section with a postfix, e.g. `[cam front] V4L2 Control: `
    pub fn with_postfix(&self, postfix: &str) -> Self {
        let base = self.prefix.trim_end_matches(": ");
        Self {
            prefix: format!("{}{}: ", base, postfix),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn log(&self, severity: Severity, msg: impl fmt::Display) {
        log(severity, &self.prefix, msg);
    }

    pub fn quiet(&self, msg: impl fmt::Display) {
        self.log(Severity::Quiet, msg);
    }

    pub fn info(&self, msg: impl fmt::Display) {
        self.log(Severity::Info, msg);
    }

    pub fn warn(&self, msg: impl fmt::Display) {
        self.log(Severity::Warn, msg);
    }

    pub fn error(&self, msg: impl fmt::Display) {
        self.log(Severity::Error, msg);
    }

    pub fn debug(&self, msg: impl fmt::Display) {
        self.log(Severity::Debug, msg);
    }

    pub fn multiline(&self, severity: Severity, text: &str) {
        log_multiline(severity, &self.prefix, text);
    }
}

/// Install the global subscriber: stdout plus the log file
///
/// `RUST_LOG`, when set, overrides the configured verbosity.
pub fn init(log_path: &Path, truncate: bool, level: LogLevel) -> Result<()> {
    if let Some(parent) = log_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(!truncate)
        .truncate(truncate)
        .open(log_path)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.filter_directive()));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Arc::new(file)),
        )
        .try_init()
        .map_err(|e| CamError::other(format!("Failed to install logger: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parse() {
        assert_eq!("quiet".parse::<LogLevel>().unwrap(), LogLevel::Quiet);
        assert_eq!("DEBUG".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("verbose".parse::<LogLevel>().unwrap(), LogLevel::Info);
    }

    #[test]
    fn test_quiet_filter_keeps_quiet_target() {
        assert_eq!(
            LogLevel::Quiet.filter_directive(),
            "warn,camwarden::quiet=info"
        );
    }

    #[test]
    fn test_section_logger_prefix() {
        let logger = SectionLogger::new("[cam front]");
        assert_eq!(logger.prefix(), "[cam front]: ");
        assert_eq!(
            logger.with_postfix(" V4L2 Control").prefix(),
            "[cam front] V4L2 Control: "
        );
    }
}
