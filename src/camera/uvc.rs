//! UVC discovery
//!
//! USB cameras are found through udev's stable symlinks. Every entry of
//! `by-path` whose name carries a USB bus marker is a UVC candidate; the
//! matching `by-id` link, if any, is attached as a display alias. Onboard
//! sensors also appear as V4L2 nodes but their `by-path` names start with
//! `platform-` and carry no USB marker, so they are left out here.

use super::{canonicalize_or_keep, CameraDevice, CameraKind, Discovery};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const USB_MARKER: &str = "usb";

/// Whether a udev link name points at a primary capture node
///
/// UVC devices expose `...-index0` for capture and `...-index1` for
/// metadata. Links without an index suffix are accepted as-is.
fn is_capture_link(name: &str) -> bool {
    match name.rfind("-index") {
        Some(pos) => &name[pos + "-index".len()..] == "0",
        None => true,
    }
}

/// Scan a symlink directory, returning (canonical target, link) pairs in
/// name order
pub(crate) fn scan_links(dir: &Path) -> Vec<(PathBuf, PathBuf)> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        debug!("{} not present, skipping", dir.display());
        return Vec::new();
    };

    let mut links: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_symlink())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(is_capture_link)
                .unwrap_or(false)
        })
        .collect();
    links.sort();

    links
        .into_iter()
        .map(|link| (canonicalize_or_keep(&link), link))
        .collect()
}

pub(super) fn discover(discovery: &Discovery) -> Vec<CameraDevice> {
    let by_id: HashMap<PathBuf, PathBuf> = scan_links(&discovery.by_id_dir).into_iter().collect();

    let mut seen = Vec::new();
    let mut cameras = Vec::new();
    for (target, by_path) in scan_links(&discovery.by_path_dir) {
        let is_usb = by_path
            .file_name()
            .map(|n| n.to_string_lossy().contains(USB_MARKER))
            .unwrap_or(false);
        if !is_usb || seen.contains(&target) {
            continue;
        }
        seen.push(target.clone());

        let mut aliases = vec![by_path.clone()];
        if let Some(id_link) = by_id.get(&target) {
            aliases.push(id_link.clone());
        }

        let device = (discovery.opener)(&target);
        match CameraDevice::v4l2(CameraKind::Uvc, device, aliases) {
            Ok(camera) => cameras.push(camera),
            Err(e) => warn!("Skipping UVC device {}: {}", target.display(), e),
        }
    }
    cameras
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_capture_link() {
        assert!(is_capture_link("pci-0000:01:00.0-usb-0:1.2:1.0-video-index0"));
        assert!(!is_capture_link("pci-0000:01:00.0-usb-0:1.2:1.0-video-index1"));
        assert!(is_capture_link("platform-csi0"));
    }

    #[test]
    fn test_scan_links_missing_dir() {
        assert!(scan_links(Path::new("/nonexistent/by-path")).is_empty());
    }

    #[test]
    fn test_scan_links_resolves_targets() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("video0");
        std::fs::write(&target, b"").unwrap();
        let links = dir.path().join("by-path");
        std::fs::create_dir(&links).unwrap();
        std::os::unix::fs::symlink(&target, links.join("usb-cam-index0")).unwrap();
        std::os::unix::fs::symlink(&target, links.join("usb-cam-index1")).unwrap();

        let found = scan_links(&links);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, std::fs::canonicalize(&target).unwrap());
    }
}
