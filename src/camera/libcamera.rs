//! Libcamera sensor discovery
//!
//! libcamera sensors have no `/dev/video*` node of their own. They are
//! identified by the device-tree path the camera apps print:
//!
//! ```text
//! Available cameras
//! -----------------
//! 0 : imx708 [4608x2592 10-bit RGGB] (/base/soc/i2c0mux/i2c@1/imx708@1a)
//! ```

use super::{CameraDevice, Discovery};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;
use std::process::Command;
use tracing::debug;

/// Camera listing tools, newest name first
const LIST_TOOLS: [&str; 2] = ["rpicam-hello", "libcamera-hello"];

/// Device-tree path in parentheses at the end of a camera line
static SENSOR_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\((/base[^)]*)\)\s*$").expect("sensor path pattern is valid"));

/// Extract sensor paths from `--list-cameras` output
pub fn parse_camera_list(output: &str) -> Vec<PathBuf> {
    output
        .lines()
        .filter_map(|line| SENSOR_PATH.captures(line))
        .filter_map(|caps| caps.get(1))
        .map(|m| PathBuf::from(m.as_str()))
        .collect()
}

/// Run the first available listing tool
pub(super) fn list_system_cameras() -> Vec<PathBuf> {
    for tool in LIST_TOOLS {
        match Command::new(tool).arg("--list-cameras").output() {
            Ok(output) => {
                // The tools print the list on stderr on some releases
                let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
                text.push_str(&String::from_utf8_lossy(&output.stderr));
                return parse_camera_list(&text);
            }
            Err(e) => debug!("{} not usable: {}", tool, e),
        }
    }
    Vec::new()
}

pub(super) fn discover(discovery: &Discovery) -> Vec<CameraDevice> {
    (discovery.libcamera_lister)()
        .into_iter()
        .map(CameraDevice::libcamera)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_camera_list() {
        let output = "Available cameras\n\
                      -----------------\n\
                      0 : imx708 [4608x2592 10-bit RGGB] (/base/soc/i2c0mux/i2c@1/imx708@1a)\n\
                      \x20   Modes: 'SRGGB10_CSI2P' : 1536x864 [120.13 fps - (768, 432)/3072x1728 crop]\n\
                      1 : ov5647 [2592x1944 10-bit GBRG] (/base/soc/i2c0mux/i2c@0/ov5647@36)\n";
        let cams = parse_camera_list(output);
        assert_eq!(
            cams,
            vec![
                PathBuf::from("/base/soc/i2c0mux/i2c@1/imx708@1a"),
                PathBuf::from("/base/soc/i2c0mux/i2c@0/ov5647@36"),
            ]
        );
    }

    #[test]
    fn test_parse_ignores_mode_lines() {
        let output = "    Modes: 'SRGGB10_CSI2P' : 1536x864 [120.13 fps - (768, 432)/3072x1728 crop]\n\
                      0 : imx219 [3280x2464 10-bit RGGB] (/base/soc/i2c0mux/i2c@1/imx219@10)  \n";
        assert_eq!(
            parse_camera_list(output),
            vec![PathBuf::from("/base/soc/i2c0mux/i2c@1/imx219@10")]
        );
    }

    #[test]
    fn test_parse_no_cameras() {
        assert!(parse_camera_list("No cameras available!").is_empty());
    }
}
