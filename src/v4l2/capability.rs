//! Device identity via `VIDIOC_QUERYCAP`

use super::raw::{self, v4l2_capability, V4l2Device};
use crate::error::{CamError, Result};
use serde::Serialize;

/// Capability query result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub driver: String,
    pub card: String,
    pub bus: String,
    /// Kernel version packed as `(major << 16) | (minor << 8) | patch`
    pub version: u32,
    pub capabilities: u32,
    pub device_caps: u32,
}

impl Capabilities {
    /// `major.minor.patch`
    pub fn version_string(&self) -> String {
        format!(
            "{}.{}.{}",
            (self.version >> 16) & 0xff,
            (self.version >> 8) & 0xff,
            self.version & 0xff
        )
    }
}

/// Query driver, card and bus strings plus capability bits
pub fn get_capabilities(dev: &dyn V4l2Device) -> Result<Capabilities> {
    let mut cap = v4l2_capability::default();
    dev.query_cap(&mut cap)
        .map_err(|e| CamError::device(dev.path(), e))?;

    Ok(Capabilities {
        driver: raw::cstr_to_string(&cap.driver),
        card: raw::cstr_to_string(&cap.card),
        bus: raw::cstr_to_string(&cap.bus_info),
        version: cap.version,
        capabilities: cap.capabilities,
        device_caps: cap.device_caps,
    })
}
