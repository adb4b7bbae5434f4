//! Streamer Adapters
//!
//! A streamer adapter turns a validated camera section into a concrete
//! process invocation for one external streaming server. The set of
//! adapters is closed: [`StreamerKind`] names every supported server and
//! [`adapter`] maps each kind to its implementation.
//!
//! ## Adapter lifecycle
//!
//! 1. **Resolve**: [`StreamerEnv::locate`] finds the server binary, first in
//!    the bundled `bin/<kind>` tree, then on `PATH`
//! 2. **Prepare**: [`Streamer::prepare`] builds the [`Launch`] (and may touch
//!    the camera, e.g. apply V4L2 controls)
//! 3. **Spawn**: the supervisor starts the process through
//!    [`process::StreamerProcess`]
//! 4. **After launch**: [`Streamer::after_launch`] runs once the start-lock
//!    has been released
//!
//! Caller supplied `custom_flags` are always appended last so they can
//! override anything the adapter computed.

mod camera_streamer;
pub mod process;
mod spyglass;
mod ustreamer;

pub use camera_streamer::CameraStreamer;
pub use process::{keep_line, LineFilter, StreamerProcess};
pub use spyglass::Spyglass;
pub use ustreamer::{strip_ustreamer_decoration, Ustreamer, FOCUS_RECHECK_DELAY};

use crate::camera::CameraDevice;
use crate::config::{CamSettings, Resolution};
use crate::error::{CamError, Result};
use crate::host;
use crate::logging::SectionLogger;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// Log postfix for control handling messages
pub const CONTROL_POSTFIX: &str = " V4L2 Control";

/// Supported streaming servers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StreamerKind {
    Ustreamer,
    CameraStreamer,
    Spyglass,
}

impl StreamerKind {
    pub const ALL: [StreamerKind; 3] = [
        StreamerKind::Ustreamer,
        StreamerKind::CameraStreamer,
        StreamerKind::Spyglass,
    ];

    /// The `mode` keyword selecting this streamer
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamerKind::Ustreamer => "ustreamer",
            StreamerKind::CameraStreamer => "camera-streamer",
            StreamerKind::Spyglass => "spyglass",
        }
    }

    /// Executable names, preferred first
    pub fn binary_names(&self) -> &'static [&'static str] {
        match self {
            StreamerKind::Ustreamer => &["ustreamer.bin", "ustreamer"],
            StreamerKind::CameraStreamer => &["camera-streamer"],
            StreamerKind::Spyglass => &["run.py", "spyglass"],
        }
    }

    /// Bundled install directory, relative to the bundle root
    pub fn bundled_dir(&self) -> &'static str {
        match self {
            StreamerKind::Ustreamer => "bin/ustreamer",
            StreamerKind::CameraStreamer => "bin/camera-streamer",
            StreamerKind::Spyglass => "bin/spyglass",
        }
    }
}

impl fmt::Display for StreamerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamerKind {
    type Err = CamError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        StreamerKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| CamError::config(format!("Unknown streamer mode '{}'", s)))
    }
}

/// Host address the streamer binds to
pub fn bind_host(no_proxy: bool) -> &'static str {
    if no_proxy {
        "0.0.0.0"
    } else {
        "127.0.0.1"
    }
}

/// One `name=value` entry of `v4l2ctl`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlOverride {
    /// The entry as written, trimmed
    pub raw: String,
    /// Lower-cased control name
    pub name: String,
    /// Value text, absent if the entry has no `=`
    pub value: Option<String>,
}

impl ControlOverride {
    pub fn parse(entry: &str) -> Self {
        let raw = entry.trim().to_string();
        let (name, value) = match raw.split_once('=') {
            Some((name, value)) => (name, Some(value.trim().to_string())),
            None => (raw.as_str(), None),
        };
        Self {
            name: name.trim().to_ascii_lowercase(),
            value,
            raw: raw.clone(),
        }
    }

    /// Value as a V4L2 integer
    pub fn int_value(&self) -> Option<i32> {
        self.value.as_deref()?.parse().ok()
    }
}

/// Split a comma-separated override list, dropping empty entries
pub fn parse_control_overrides(text: &str) -> Vec<ControlOverride> {
    text.split(',')
        .filter(|entry| !entry.trim().is_empty())
        .map(ControlOverride::parse)
        .collect()
}

/// Validated parameters for one streaming session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamParams {
    pub host: String,
    pub port: u16,
    pub resolution: Resolution,
    pub max_fps: u32,
    pub device: String,
    pub controls: Vec<ControlOverride>,
    pub custom_flags: Vec<String>,
}

impl StreamParams {
    pub fn from_settings(settings: &CamSettings) -> Self {
        Self {
            host: bind_host(settings.no_proxy).to_string(),
            port: settings.port,
            resolution: settings.resolution,
            max_fps: settings.max_fps,
            device: settings.device.clone(),
            controls: parse_control_overrides(&settings.v4l2ctl),
            custom_flags: settings
                .custom_flags
                .split_whitespace()
                .map(str::to_string)
                .collect(),
        }
    }

    /// The raw `v4l2ctl` entries, comma-joined
    pub fn controls_text(&self) -> String {
        self.controls
            .iter()
            .map(|c| c.raw.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// A ready-to-spawn invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launch {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Controls the daemon applied to the device before launch
    pub applied_controls: Vec<String>,
}

impl Launch {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            applied_controls: Vec::new(),
        }
    }

    /// Program and arguments joined for logging
    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// One streaming server integration
///
/// Adapters are stateless; everything a launch needs is passed in.
#[async_trait]
pub trait Streamer: Send + Sync {
    fn kind(&self) -> StreamerKind;

    /// Build the invocation for `params`
    ///
    /// `camera` is the registry entry for `params.device`, if any.
    ///
    /// # Errors
    ///
    /// - `CamError::Streamer` - the device or host cannot be served by this streamer
    fn prepare(
        &self,
        params: &StreamParams,
        executable: &Path,
        camera: Option<&CameraDevice>,
        log: &SectionLogger,
    ) -> Result<Launch>;

    /// Runs after the process was spawned and the start-lock released
    async fn after_launch(
        &self,
        _params: &StreamParams,
        _camera: Option<&CameraDevice>,
        _log: &SectionLogger,
    ) {
    }

    /// Filter applied to each stderr line before logging
    fn stderr_filter(&self) -> LineFilter {
        keep_line
    }
}

/// Where adapters look for binaries and which host they run on
#[derive(Debug, Clone)]
pub struct StreamerEnv {
    /// Root of the bundled `bin/` tree
    pub bundled_root: PathBuf,
    /// Search path for installed binaries; `None` uses `$PATH`
    pub search_path: Option<OsString>,
    pub is_pi5: bool,
}

impl StreamerEnv {
    /// Environment of the running host
    pub fn detect(bundled_root: impl Into<PathBuf>) -> Self {
        Self {
            bundled_root: bundled_root.into(),
            search_path: None,
            is_pi5: host::is_pi5(),
        }
    }

    /// Find the binary for `kind`
    ///
    /// Bundled binaries win over installed packages.
    pub fn locate(&self, kind: StreamerKind) -> Option<PathBuf> {
        let bundled = self.bundled_root.join(kind.bundled_dir());
        for name in kind.binary_names() {
            if let Some(found) = find_file(&bundled, name) {
                return Some(found);
            }
        }
        let search_path = self
            .search_path
            .clone()
            .or_else(|| std::env::var_os("PATH"))?;
        kind.binary_names()
            .iter()
            .find_map(|name| which(&search_path, name))
    }

    /// Python interpreter of the bundled spyglass virtualenv
    pub fn spyglass_python(&self) -> PathBuf {
        self.bundled_root
            .join(StreamerKind::Spyglass.bundled_dir())
            .join(".venv/bin/python3")
    }
}

/// Adapter table
pub fn adapter(kind: StreamerKind, env: &StreamerEnv) -> Arc<dyn Streamer> {
    match kind {
        StreamerKind::Ustreamer => Arc::new(Ustreamer),
        StreamerKind::CameraStreamer => Arc::new(CameraStreamer::new(env.is_pi5)),
        StreamerKind::Spyglass => Arc::new(Spyglass::new(env.spyglass_python())),
    }
}

/// Depth-first search for a runnable file called `name` below `dir`
///
/// Symlinked directories are not descended into. Python scripts run through
/// an interpreter and need no executable bit.
fn find_file(dir: &Path, name: &str) -> Option<PathBuf> {
    let mut entries: Vec<_> = std::fs::read_dir(dir).ok()?.flatten().collect();
    entries.sort_by_key(|e| e.file_name());
    let mut subdirs = Vec::new();
    for entry in entries {
        let Ok(file_type) = entry.file_type() else { continue };
        let path = entry.path();
        if file_type.is_dir() {
            subdirs.push(path);
        } else if entry.file_name() == name
            && ((name.ends_with(".py") && path.is_file()) || is_executable(&path))
        {
            return Some(path);
        }
    }
    subdirs.iter().find_map(|d| find_file(d, name))
}

fn which(search_path: &OsString, name: &str) -> Option<PathBuf> {
    std::env::split_paths(search_path)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

/// Regular file (after following links) with any executable bit set
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
