//! Error types for camwarden

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias using CamError
pub type Result<T> = std::result::Result<T, CamError>;

/// Camwarden error types
///
/// End-of-enumeration during V4L2 introspection is never represented here;
/// it is a normal loop exit inside the engine. Everything in this enum is
/// something a caller should be able to report.
#[derive(Debug, Error)]
pub enum CamError {
    /// I/O error not tied to a specific device
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Real I/O failure while talking to a device node
    #[error("Device error on {}: {source}", path.display())]
    Device {
        /// Device node the failing call was issued against
        path: PathBuf,
        /// Underlying OS error
        #[source]
        source: io::Error,
    },

    /// Control name not present in the introspected control set
    #[error("Unknown control '{control}' on {}", path.display())]
    UnknownControl { path: PathBuf, control: String },

    /// Camera variant does not support the requested operation
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Streamer executable or command line error
    #[error("Streamer error: {0}")]
    Streamer(String),

    /// Session supervision error
    #[error("Supervisor error: {0}")]
    Supervisor(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl CamError {
    /// Wrap an OS error raised by a device node
    pub fn device(path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Device {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Create an UnknownControl error
    pub fn unknown_control(path: impl AsRef<Path>, control: impl Into<String>) -> Self {
        Self::UnknownControl {
            path: path.as_ref().to_path_buf(),
            control: control.into(),
        }
    }

    /// Create an Unsupported error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Create a Config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a Streamer error
    pub fn streamer(msg: impl Into<String>) -> Self {
        Self::Streamer(msg.into())
    }

    /// Create a Supervisor error
    pub fn supervisor(msg: impl Into<String>) -> Self {
        Self::Supervisor(msg.into())
    }

    /// Create an Other error
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// True when the error means the device node is gone or inaccessible
    pub fn is_device_error(&self) -> bool {
        matches!(self, Self::Device { .. })
    }
}
