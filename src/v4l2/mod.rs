//! V4L2 Introspection Engine
//!
//! Enumerates and mutates device controls and formats through the raw
//! ioctl layer in [`raw`].
//!
//! ## Enumeration
//!
//! Every V4L2 enumeration (controls, menus, formats, frame sizes, frame
//! intervals) ends the same way: the driver answers `EINVAL` once the index
//! or id runs past the last entry. That answer is the loop's only exit and
//! is mapped to [`Step::End`]. Any other error (device unplugged, permission
//! denied) becomes [`CamError::Device`] and propagates to the caller.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use camwarden::v4l2::{query_controls, get_formats, KernelDevice};
//!
//! let dev = KernelDevice::new("/dev/video0");
//! let controls = query_controls(&dev)?;
//! let formats = get_formats(&dev)?;
//! ```

pub mod capability;
pub mod controls;
pub mod formats;
pub mod raw;

pub use capability::{get_capabilities, Capabilities};
pub use controls::{
    get_control_value, normalize_control_name, query_controls, set_control, ControlDescriptor,
    ControlFlags, ControlMap, ControlSection, ControlType, MenuItem,
};
pub use formats::{get_formats, FormatDescriptor, FormatList, FrameSize};
pub use raw::{KernelDevice, V4l2Device};

use crate::error::{CamError, Result};
use std::io;
use std::path::Path;

/// Outcome of one enumeration ioctl
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Step {
    /// The driver filled in the next entry
    Item,
    /// The driver reported there are no more entries
    End,
}

/// Classify the result of an enumeration ioctl
pub(crate) fn step(path: &Path, result: io::Result<()>) -> Result<Step> {
    match result {
        Ok(()) => Ok(Step::Item),
        Err(e) if is_end_of_enumeration(&e) => Ok(Step::End),
        Err(e) => Err(CamError::device(path, e)),
    }
}

/// `EINVAL` is how V4L2 says "no entry at this index"
pub fn is_end_of_enumeration(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::InvalidInput
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_einval_ends_enumeration() {
        let res = step(
            Path::new("/dev/video0"),
            Err(io::Error::from(io::ErrorKind::InvalidInput)),
        );
        assert_eq!(res.unwrap(), Step::End);
    }

    #[test]
    fn test_other_errors_propagate() {
        let res = step(
            Path::new("/dev/video0"),
            Err(io::Error::from(io::ErrorKind::PermissionDenied)),
        );
        assert!(res.unwrap_err().is_device_error());
    }
}
