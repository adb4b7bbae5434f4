//! Camera Abstraction
//!
//! A [`CameraDevice`] is one capture device known to the daemon. All
//! variants expose the same capability surface; V4L2-backed variants (UVC
//! and Legacy) answer it from eager introspection, the libcamera variant
//! answers with empty data and leaves device control to the streamer.
//!
//! ## Variants
//!
//! | Kind | Found by | Backed by |
//! |------|----------|-----------|
//! | [`CameraKind::Uvc`] | `/dev/v4l/by-path` USB symlinks | V4L2 ioctls |
//! | [`CameraKind::Legacy`] | card name probe over `/dev/video*` | V4L2 ioctls |
//! | [`CameraKind::Libcamera`] | `rpicam-hello --list-cameras` | nothing (streamer side) |
//!
//! Identity is always the canonical path. Alias symlinks are kept for
//! display only.

mod legacy;
mod libcamera;
mod registry;
mod uvc;

pub use legacy::LEGACY_CARD_MARKER;
pub use libcamera::parse_camera_list;
pub use registry::CameraRegistry;

use crate::error::{CamError, Result};
use crate::v4l2::{self, ControlMap, FormatList, KernelDevice, V4l2Device};
use serde::Serialize;
use std::fmt;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Indentation used by the human-readable dumps
pub const INDENT: &str = "      ";

/// Camera variant tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CameraKind {
    Uvc,
    Legacy,
    Libcamera,
}

impl CameraKind {
    /// Discovery order at startup
    pub const ALL: [CameraKind; 3] = [CameraKind::Uvc, CameraKind::Legacy, CameraKind::Libcamera];

    /// Run this variant's discovery
    pub fn discover(&self, discovery: &Discovery) -> Vec<CameraDevice> {
        match self {
            CameraKind::Uvc => uvc::discover(discovery),
            CameraKind::Legacy => legacy::discover(discovery).into_iter().collect(),
            CameraKind::Libcamera => libcamera::discover(discovery),
        }
    }

    pub fn is_v4l2(&self) -> bool {
        matches!(self, CameraKind::Uvc | CameraKind::Legacy)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CameraKind::Uvc => "uvc",
            CameraKind::Legacy => "legacy",
            CameraKind::Libcamera => "libcamera",
        }
    }
}

impl fmt::Display for CameraKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opens a V4L2 handle for a canonical device path
pub type DeviceOpener = Arc<dyn Fn(&Path) -> Arc<dyn V4l2Device> + Send + Sync>;

/// Lists libcamera sensor paths
pub type LibcameraLister = Arc<dyn Fn() -> Vec<PathBuf> + Send + Sync>;

/// Filesystem roots and device access used by discovery
///
/// [`Discovery::system`] points at the real `/dev` tree. Tests swap in a
/// temporary directory and scripted devices.
#[derive(Clone)]
pub struct Discovery {
    /// `/dev/v4l/by-id`
    pub by_id_dir: PathBuf,
    /// `/dev/v4l/by-path`
    pub by_path_dir: PathBuf,
    /// `/dev`, scanned for `videoN` nodes
    pub dev_dir: PathBuf,
    pub opener: DeviceOpener,
    pub libcamera_lister: LibcameraLister,
}

impl Discovery {
    /// Discovery over the running system
    pub fn system() -> Self {
        Self {
            by_id_dir: PathBuf::from("/dev/v4l/by-id"),
            by_path_dir: PathBuf::from("/dev/v4l/by-path"),
            dev_dir: PathBuf::from("/dev"),
            opener: Arc::new(|path: &Path| -> Arc<dyn V4l2Device> {
                Arc::new(KernelDevice::new(path))
            }),
            libcamera_lister: Arc::new(libcamera::list_system_cameras),
        }
    }
}

/// A discovered capture device
pub struct CameraDevice {
    path: PathBuf,
    kind: CameraKind,
    aliases: Vec<PathBuf>,
    controls: ControlMap,
    formats: FormatList,
    device: Option<Arc<dyn V4l2Device>>,
}

impl CameraDevice {
    /// Build a V4L2-backed camera, introspecting controls and formats now
    pub fn v4l2(kind: CameraKind, device: Arc<dyn V4l2Device>, aliases: Vec<PathBuf>) -> Result<Self> {
        let path = device.path().to_path_buf();
        let controls = v4l2::query_controls(device.as_ref())?;
        let formats = v4l2::get_formats(device.as_ref())?;

        info!(
            "Registered {} camera {} ({} controls, {} formats)",
            kind,
            path.display(),
            controls.len(),
            formats.formats.len()
        );

        Ok(Self {
            path,
            kind,
            aliases,
            controls,
            formats,
            device: Some(device),
        })
    }

    /// A libcamera sensor; no ioctl access
    pub fn libcamera(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: CameraKind::Libcamera,
            aliases: Vec::new(),
            controls: ControlMap::default(),
            formats: FormatList::default(),
            device: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> CameraKind {
        self.kind
    }

    /// Stable by-id / by-path symlinks pointing at this device
    pub fn aliases(&self) -> &[PathBuf] {
        &self.aliases
    }

    pub fn controls(&self) -> &ControlMap {
        &self.controls
    }

    pub fn formats(&self) -> &FormatList {
        &self.formats
    }

    /// True if `candidate` resolves to this camera's canonical path
    pub fn path_equals(&self, candidate: impl AsRef<Path>) -> bool {
        canonicalize_or_keep(candidate.as_ref()) == self.path
    }

    pub fn has_hardware_mjpeg_encoder(&self) -> bool {
        self.formats.iter().any(|f| f.is_motion_jpeg())
    }

    pub fn has_control(&self, name: &str) -> bool {
        self.controls.contains(name)
    }

    /// Read a control's live value
    pub fn get_control_value(&self, name: &str) -> Result<i32> {
        let device = self.v4l2_device()?;
        v4l2::get_control_value(device.as_ref(), &self.controls, name)
    }

    /// Write a control; false if unknown, rejected, or not a V4L2 camera
    pub fn set_control(&self, name: &str, value: i32) -> bool {
        match &self.device {
            Some(device) => v4l2::set_control(device.as_ref(), &self.controls, name, value),
            None => false,
        }
    }

    fn v4l2_device(&self) -> Result<&Arc<dyn V4l2Device>> {
        self.device.as_ref().ok_or_else(|| {
            CamError::unsupported(format!(
                "{} camera {} has no V4L2 controls",
                self.kind,
                self.path.display()
            ))
        })
    }

    /// Formats in `v4l2-ctl --list-formats-ext` layout
    pub fn get_formats_string(&self) -> String {
        let indent = " ".repeat(8);
        let mut out = String::new();
        for fmt in self.formats.iter() {
            let _ = writeln!(out, "{}:", fmt.label());
            for size in &fmt.sizes {
                let _ = writeln!(out, "{}{}", indent, size.label);
                for interval in &size.intervals {
                    let _ = writeln!(out, "{}{}{}", indent, indent, interval);
                }
            }
        }
        trim_trailing_newline(out)
    }

    /// Controls grouped by section, with live values
    pub fn get_controls_string(&self) -> String {
        let mut out = String::new();
        for section in &self.controls.sections {
            let _ = writeln!(out, "{}:", section.name);
            for control in &section.controls {
                let mut line = format!("{} ({})", control.name, control.kind);
                let pad = 35usize.saturating_sub(line.len());
                line.push_str(&" ".repeat(pad));
                line.push(':');
                if let (v4l2::ControlType::Integer, Some(b)) = (control.kind, control.bounds) {
                    let _ = write!(line, " min={} max={} step={}", b.min, b.max, b.step);
                }
                if let Some(default) = control.default {
                    let _ = write!(line, " default={}", default);
                }
                match self.get_control_value(&control.name) {
                    Ok(value) => {
                        let _ = write!(line, " value={}", value);
                    }
                    Err(_) => line.push_str(" value=n/a"),
                }
                if !control.flags.is_empty() {
                    let _ = write!(line, " flags={}", control.flags);
                }
                let _ = writeln!(out, "{}{}", INDENT, line);
                for (index, item) in &control.menu {
                    let _ = writeln!(out, "{}{}{}: {}", INDENT, INDENT, index, item);
                }
            }
            out.push('\n');
        }
        trim_trailing_newline(out)
    }

    /// Summary for `--list-devices`
    pub fn summary(&self) -> CameraSummary {
        CameraSummary {
            path: self.path.clone(),
            kind: self.kind,
            aliases: self.aliases.clone(),
            controls: self.controls.clone(),
            formats: self.formats.clone(),
        }
    }
}

impl fmt::Debug for CameraDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CameraDevice")
            .field("path", &self.path)
            .field("kind", &self.kind)
            .field("aliases", &self.aliases)
            .finish()
    }
}

impl PartialEq for CameraDevice {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for CameraDevice {}

/// Serializable view of a camera
#[derive(Debug, Clone, Serialize)]
pub struct CameraSummary {
    pub path: PathBuf,
    pub kind: CameraKind,
    pub aliases: Vec<PathBuf>,
    pub controls: ControlMap,
    pub formats: FormatList,
}

/// Resolve symlinks; paths that do not exist on disk (libcamera's
/// device-tree paths) are compared as given
pub fn canonicalize_or_keep(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn trim_trailing_newline(mut s: String) -> String {
    while s.ends_with('\n') {
        s.pop();
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_libcamera_has_no_controls() {
        let cam = CameraDevice::libcamera("/base/soc/i2c0mux/i2c@1/imx708@1a");
        assert_eq!(cam.kind(), CameraKind::Libcamera);
        assert!(!cam.has_hardware_mjpeg_encoder());
        assert!(cam.get_controls_string().is_empty());
        assert!(cam.get_formats_string().is_empty());
        assert!(!cam.set_control("brightness", 10));
        assert!(matches!(
            cam.get_control_value("brightness"),
            Err(CamError::Unsupported(_))
        ));
    }

    #[test]
    fn test_path_equals_non_existing_path() {
        let cam = CameraDevice::libcamera("/base/soc/i2c0mux/i2c@1/imx708@1a");
        assert!(cam.path_equals("/base/soc/i2c0mux/i2c@1/imx708@1a"));
        assert!(!cam.path_equals("/dev/video0"));
    }

    #[test]
    fn test_path_equals_resolves_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("video0");
        std::fs::write(&target, b"").unwrap();
        let link = dir.path().join("usb-cam-index0");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let cam = CameraDevice::libcamera(std::fs::canonicalize(&target).unwrap());
        assert!(cam.path_equals(&link));
    }

    #[test]
    fn test_kind_table() {
        assert_eq!(CameraKind::ALL.len(), 3);
        assert!(CameraKind::Uvc.is_v4l2());
        assert!(CameraKind::Legacy.is_v4l2());
        assert!(!CameraKind::Libcamera.is_v4l2());
    }
}
