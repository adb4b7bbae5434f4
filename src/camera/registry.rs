//! Camera Registry
//!
//! Ordered, append-only list of discovered cameras. Each variant is
//! populated once at startup; after that the registry is shared read-only
//! (behind an `Arc` in the daemon context) and never shrinks.

use super::{canonicalize_or_keep, CameraDevice, CameraKind, CameraSummary, Discovery};
use crate::error::{CamError, Result};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Default)]
pub struct CameraRegistry {
    cameras: Vec<Arc<CameraDevice>>,
    populated: HashSet<CameraKind>,
}

impl CameraRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run discovery for every variant, in [`CameraKind::ALL`] order
    pub fn discover(discovery: &Discovery) -> Self {
        let mut registry = Self::new();
        for kind in CameraKind::ALL {
            let cameras = kind.discover(discovery);
            // Each kind appears once in ALL, so this cannot fail
            let _ = registry.populate(kind, cameras);
        }
        info!("Discovered {} camera(s)", registry.len());
        registry
    }

    /// Append the cameras of one variant
    ///
    /// # Errors
    ///
    /// - `CamError::Other` - this variant was already populated
    pub fn populate(&mut self, kind: CameraKind, cameras: Vec<CameraDevice>) -> Result<usize> {
        if !self.populated.insert(kind) {
            return Err(CamError::other(format!(
                "Camera kind '{}' already populated",
                kind
            )));
        }
        let count = cameras.len();
        self.cameras.extend(cameras.into_iter().map(Arc::new));
        Ok(count)
    }

    /// First camera whose canonical path matches `path` after resolution
    pub fn lookup_by_path(&self, path: impl AsRef<Path>) -> Option<Arc<CameraDevice>> {
        let wanted = canonicalize_or_keep(path.as_ref());
        self.cameras.iter().find(|c| c.path() == wanted).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<CameraDevice>> {
        self.cameras.iter()
    }

    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }

    pub fn summaries(&self) -> Vec<CameraSummary> {
        self.cameras.iter().map(|c| c.summary()).collect()
    }

    /// Pretty-printed JSON of [`Self::summaries`]
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.summaries())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_populate_once_per_kind() {
        let mut registry = CameraRegistry::new();
        let cam = CameraDevice::libcamera("/base/soc/i2c0mux/i2c@1/imx708@1a");
        assert_eq!(registry.populate(CameraKind::Libcamera, vec![cam]).unwrap(), 1);
        assert!(registry
            .populate(CameraKind::Libcamera, Vec::new())
            .is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_lookup_by_path() {
        let mut registry = CameraRegistry::new();
        registry
            .populate(
                CameraKind::Libcamera,
                vec![CameraDevice::libcamera("/base/soc/i2c0mux/i2c@1/imx708@1a")],
            )
            .unwrap();

        let found = registry.lookup_by_path("/base/soc/i2c0mux/i2c@1/imx708@1a");
        assert_eq!(found.map(|c| c.kind()), Some(CameraKind::Libcamera));
        assert!(registry.lookup_by_path("/dev/video7").is_none());
    }

    #[test]
    fn test_to_json() {
        let mut registry = CameraRegistry::new();
        registry
            .populate(
                CameraKind::Libcamera,
                vec![CameraDevice::libcamera("/base/soc/i2c0mux/i2c@1/imx708@1a")],
            )
            .unwrap();
        let json = registry.to_json().unwrap();
        assert!(json.contains("\"kind\": \"Libcamera\""));
        assert!(json.contains("imx708@1a"));
    }
}
