//! Legacy camera shim discovery
//!
//! The legacy Raspberry Pi camera stack exposes its sensor through a V4L2
//! shim that udev does not link under `by-path` as a USB device. It is
//! found by asking every `/dev/videoN` node for its card name instead.

use super::{CameraDevice, CameraKind, Discovery};
use crate::v4l2::get_capabilities;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Substring of the card name reported by the legacy shim
pub const LEGACY_CARD_MARKER: &str = "mmal";

/// `/dev/videoN` nodes sorted by N
fn video_nodes(discovery: &Discovery) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(&discovery.dev_dir) else {
        return Vec::new();
    };

    let mut nodes: Vec<(u32, PathBuf)> = entries
        .flatten()
        .filter_map(|e| {
            let name = e.file_name();
            let number = name.to_str()?.strip_prefix("video")?.parse::<u32>().ok()?;
            Some((number, e.path()))
        })
        .collect();
    nodes.sort_by_key(|(n, _)| *n);
    nodes.into_iter().map(|(_, p)| p).collect()
}

/// Find the (at most one) legacy shim node
pub(super) fn discover(discovery: &Discovery) -> Option<CameraDevice> {
    for node in video_nodes(discovery) {
        let device = (discovery.opener)(&node);
        let caps = match get_capabilities(device.as_ref()) {
            Ok(caps) => caps,
            Err(e) => {
                debug!("Capability query failed on {}: {}", node.display(), e);
                continue;
            }
        };
        if !caps.card.contains(LEGACY_CARD_MARKER) {
            continue;
        }

        return match CameraDevice::v4l2(CameraKind::Legacy, device, Vec::new()) {
            Ok(camera) => Some(camera),
            Err(e) => {
                warn!("Skipping legacy camera {}: {}", node.display(), e);
                None
            }
        };
    }
    None
}
