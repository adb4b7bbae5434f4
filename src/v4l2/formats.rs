//! Capture formats
//!
//! Three nested enumerations: pixel formats, then frame sizes per format,
//! then frame intervals per size. Each level stops at its own `EINVAL`
//! without ending the outer levels.

use super::raw::{self, v4l2_fmtdesc, v4l2_frmivalenum, v4l2_frmsizeenum, V4l2Device};
use super::{step, Step};
use crate::error::Result;
use serde::Serialize;

/// One frame size and its supported frame intervals
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameSize {
    /// `Size: Discrete 1280x720`
    pub label: String,
    /// `Interval: Discrete 0.033s (30.000 fps)`, in enumeration order
    pub intervals: Vec<String>,
}

/// One pixel format
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormatDescriptor {
    pub index: u32,
    pub fourcc: u32,
    pub description: String,
    pub flags: u32,
    pub sizes: Vec<FrameSize>,
}

impl FormatDescriptor {
    /// `[0]: 'MJPG' (Motion-JPEG, compressed)`
    pub fn label(&self) -> String {
        let mut label = format!(
            "[{}]: '{}' ({}",
            self.index,
            fourcc_to_string(self.fourcc),
            self.description
        );
        let flags = format_flag_names(self.flags);
        if !flags.is_empty() {
            label.push_str(", ");
            label.push_str(&flags.join(", "));
        }
        label.push(')');
        label
    }

    pub fn is_motion_jpeg(&self) -> bool {
        self.description.contains("Motion-JPEG") || fourcc_to_string(self.fourcc) == "MJPG"
    }
}

/// All capture formats of a device, in enumeration order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FormatList {
    pub formats: Vec<FormatDescriptor>,
}

impl FormatList {
    pub fn iter(&self) -> impl Iterator<Item = &FormatDescriptor> {
        self.formats.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }
}

/// Render a fourcc code, `-BE` suffixed when the big-endian bit is set
pub fn fourcc_to_string(fourcc: u32) -> String {
    let bytes = (fourcc & 0x7fff_ffff).to_le_bytes();
    let mut out: String = bytes.iter().map(|&b| b as char).collect();
    if fourcc & 0x8000_0000 != 0 {
        out.push_str("-BE");
    }
    out
}

fn format_flag_names(flags: u32) -> Vec<&'static str> {
    const NAMES: [(u32, &str); 9] = [
        (raw::V4L2_FMT_FLAG_COMPRESSED, "compressed"),
        (raw::V4L2_FMT_FLAG_EMULATED, "emulated"),
        (raw::V4L2_FMT_FLAG_CONTINUOUS_BYTESTREAM, "continuous-bytestream"),
        (raw::V4L2_FMT_FLAG_DYN_RESOLUTION, "dyn-resolution"),
        (raw::V4L2_FMT_FLAG_ENC_CAP_FRAME_INTERVAL, "enc-cap-frame-interval"),
        (raw::V4L2_FMT_FLAG_CSC_COLORSPACE, "csc-colorspace"),
        (raw::V4L2_FMT_FLAG_CSC_XFER_FUNC, "csc-xfer-func"),
        (raw::V4L2_FMT_FLAG_CSC_YCBCR_ENC, "csc-ycbcr-enc"),
        (raw::V4L2_FMT_FLAG_CSC_QUANTIZATION, "csc-quantization"),
    ];
    NAMES
        .iter()
        .filter(|(bit, _)| flags & bit != 0)
        .map(|(_, name)| *name)
        .collect()
}

fn frame_size_label(size: &v4l2_frmsizeenum) -> String {
    let u = size.union;
    match size.type_ {
        raw::V4L2_FRMSIZE_TYPE_DISCRETE => format!("Size: Discrete {}x{}", u[0], u[1]),
        raw::V4L2_FRMSIZE_TYPE_CONTINUOUS => {
            format!("Size: Continuous {}x{} - {}x{}", u[0], u[3], u[1], u[4])
        }
        _ => format!(
            "Size: Stepwise {}x{} - {}x{} with step {}/{}",
            u[0], u[3], u[1], u[4], u[2], u[5]
        ),
    }
}

/// Dimensions used to enumerate intervals: the discrete size, or the
/// minimum of a stepwise/continuous range
fn frame_size_dims(size: &v4l2_frmsizeenum) -> (u32, u32) {
    let u = size.union;
    match size.type_ {
        raw::V4L2_FRMSIZE_TYPE_DISCRETE => (u[0], u[1]),
        _ => (u[0], u[3]),
    }
}

fn fract_seconds(numerator: u32, denominator: u32) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

fn fps(seconds: f64) -> f64 {
    if seconds == 0.0 {
        0.0
    } else {
        1.0 / seconds
    }
}

fn frame_interval_label(ival: &v4l2_frmivalenum) -> String {
    let u = ival.union;
    match ival.type_ {
        raw::V4L2_FRMIVAL_TYPE_DISCRETE => {
            let secs = fract_seconds(u[0], u[1]);
            format!("Interval: Discrete {:.3}s ({:.3} fps)", secs, fps(secs))
        }
        kind => {
            let min = fract_seconds(u[0], u[1]);
            let max = fract_seconds(u[2], u[3]);
            let step = fract_seconds(u[4], u[5]);
            let name = if kind == raw::V4L2_FRMIVAL_TYPE_CONTINUOUS {
                "Continuous"
            } else {
                "Stepwise"
            };
            format!(
                "Interval: {} {:.3}s - {:.3}s with step {:.3}s ({:.3}-{:.3} fps)",
                name,
                min,
                max,
                step,
                fps(max),
                fps(min)
            )
        }
    }
}

/// Enumerate every capture format with its frame sizes and intervals
pub fn get_formats(dev: &dyn V4l2Device) -> Result<FormatList> {
    let mut list = FormatList::default();

    for index in 0u32.. {
        let mut fmt = v4l2_fmtdesc {
            index,
            type_: raw::V4L2_BUF_TYPE_VIDEO_CAPTURE,
            ..Default::default()
        };
        if step(dev.path(), dev.enum_fmt(&mut fmt))? == Step::End {
            break;
        }
        list.formats.push(FormatDescriptor {
            index,
            fourcc: fmt.pixelformat,
            description: raw::cstr_to_string(&fmt.description),
            flags: fmt.flags,
            sizes: frame_sizes(dev, fmt.pixelformat)?,
        });
    }

    Ok(list)
}

fn frame_sizes(dev: &dyn V4l2Device, fourcc: u32) -> Result<Vec<FrameSize>> {
    let mut sizes = Vec::new();

    for index in 0u32.. {
        let mut size = v4l2_frmsizeenum {
            index,
            pixel_format: fourcc,
            ..Default::default()
        };
        if step(dev.path(), dev.enum_framesizes(&mut size))? == Step::End {
            break;
        }
        let (width, height) = frame_size_dims(&size);
        sizes.push(FrameSize {
            label: frame_size_label(&size),
            intervals: frame_intervals(dev, fourcc, width, height)?,
        });
        if size.type_ != raw::V4L2_FRMSIZE_TYPE_DISCRETE {
            // Stepwise and continuous ranges are reported once at index 0
            break;
        }
    }

    Ok(sizes)
}

fn frame_intervals(
    dev: &dyn V4l2Device,
    fourcc: u32,
    width: u32,
    height: u32,
) -> Result<Vec<String>> {
    let mut intervals = Vec::new();

    for index in 0u32.. {
        let mut ival = v4l2_frmivalenum {
            index,
            pixel_format: fourcc,
            width,
            height,
            ..Default::default()
        };
        if step(dev.path(), dev.enum_frameintervals(&mut ival))? == Step::End {
            break;
        }
        intervals.push(frame_interval_label(&ival));
        if ival.type_ != raw::V4L2_FRMIVAL_TYPE_DISCRETE {
            break;
        }
    }

    Ok(intervals)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourcc_to_string() {
        assert_eq!(fourcc_to_string(u32::from_le_bytes(*b"MJPG")), "MJPG");
        assert_eq!(fourcc_to_string(u32::from_le_bytes(*b"YUYV")), "YUYV");
        assert_eq!(
            fourcc_to_string(u32::from_le_bytes(*b"Y16 ") | 0x8000_0000),
            "Y16 -BE"
        );
    }

    #[test]
    fn test_format_label() {
        let fmt = FormatDescriptor {
            index: 1,
            fourcc: u32::from_le_bytes(*b"MJPG"),
            description: "Motion-JPEG".to_string(),
            flags: raw::V4L2_FMT_FLAG_COMPRESSED,
            sizes: Vec::new(),
        };
        assert_eq!(fmt.label(), "[1]: 'MJPG' (Motion-JPEG, compressed)");
        assert!(fmt.is_motion_jpeg());
    }

    #[test]
    fn test_discrete_labels() {
        let size = v4l2_frmsizeenum {
            type_: raw::V4L2_FRMSIZE_TYPE_DISCRETE,
            union: [1280, 720, 0, 0, 0, 0],
            ..Default::default()
        };
        assert_eq!(frame_size_label(&size), "Size: Discrete 1280x720");

        let ival = v4l2_frmivalenum {
            type_: raw::V4L2_FRMIVAL_TYPE_DISCRETE,
            union: [1, 30, 0, 0, 0, 0],
            ..Default::default()
        };
        assert_eq!(
            frame_interval_label(&ival),
            "Interval: Discrete 0.033s (30.000 fps)"
        );
    }

    #[test]
    fn test_stepwise_size_label() {
        let size = v4l2_frmsizeenum {
            type_: raw::V4L2_FRMSIZE_TYPE_STEPWISE,
            union: [32, 1920, 2, 32, 1080, 2],
            ..Default::default()
        };
        assert_eq!(
            frame_size_label(&size),
            "Size: Stepwise 32x32 - 1920x1080 with step 2/2"
        );
        assert_eq!(frame_size_dims(&size), (32, 32));
    }
}
