//! ustreamer adapter
//!
//! ustreamer only talks V4L2, so the session must point at a UVC or legacy
//! camera from the registry. Requested controls are applied by the daemon
//! itself before launch.

use super::{Launch, StreamParams, Streamer, StreamerKind, CONTROL_POSTFIX};
use crate::camera::{CameraDevice, CameraKind};
use crate::error::{CamError, Result};
use crate::logging::{SectionLogger, Severity};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use std::time::Duration;

/// Control some cameras reset when streaming starts
pub const FOCUS_CONTROL: &str = "focus_absolute";

/// Delay before the focus check after launch
pub const FOCUS_RECHECK_DELAY: Duration = Duration::from_millis(500);

/// Bitrate applied to legacy cameras to avoid blocky MJPEG output
pub const LEGACY_BITRATE: i32 = 15_000_000;

#[derive(Debug, Clone, Copy, Default)]
pub struct Ustreamer;

impl Ustreamer {
    fn apply_controls(
        &self,
        params: &StreamParams,
        camera: &CameraDevice,
        log: &SectionLogger,
    ) -> Vec<String> {
        let ctl_log = log.with_postfix(CONTROL_POSTFIX);
        if params.controls.is_empty() {
            ctl_log.quiet("No parameters set. Skipped.");
            return Vec::new();
        }
        ctl_log.quiet(format!("Options: {}", params.controls_text()));

        let mut applied = Vec::new();
        for ctrl in &params.controls {
            if !camera.has_control(&ctrl.name) {
                ctl_log.quiet(format!(
                    "Parameter '{}' not available for '{}'. Skipped.",
                    ctrl.raw, params.device
                ));
                continue;
            }
            match ctrl.int_value() {
                Some(value) if camera.set_control(&ctrl.name, value) => {
                    applied.push(ctrl.name.clone());
                }
                _ => ctl_log.quiet(format!("Failed to set parameter: '{}'", ctrl.raw)),
            }
        }

        log.with_postfix(" v4l2ctl")
            .multiline(Severity::Debug, &camera.get_controls_string());
        applied
    }

    fn fix_legacy_bitrate(&self, camera: &CameraDevice, log: &SectionLogger) {
        if camera.has_control("video_bitrate") && !camera.set_control("video_bitrate", LEGACY_BITRATE) {
            log.warn("Failed to set video_bitrate on legacy camera");
        }
    }
}

#[async_trait]
impl Streamer for Ustreamer {
    fn kind(&self) -> StreamerKind {
        StreamerKind::Ustreamer
    }

    fn prepare(
        &self,
        params: &StreamParams,
        executable: &Path,
        camera: Option<&CameraDevice>,
        log: &SectionLogger,
    ) -> Result<Launch> {
        let camera = camera.filter(|c| c.kind().is_v4l2()).ok_or_else(|| {
            CamError::streamer(
                "Wrong camera type or device not found. Make sure the device path \
                 is correct and points to a camera supported by ustreamer!",
            )
        })?;

        let mut args: Vec<String> = vec![
            "--host".into(),
            params.host.clone(),
            "--port".into(),
            params.port.to_string(),
            "--resolution".into(),
            params.resolution.to_string(),
            "--desired-fps".into(),
            params.max_fps.to_string(),
            "--allow-origin".into(),
            "*".into(),
            "--static".into(),
            "resources/ustreamer-www".into(),
        ];

        if camera.kind() == CameraKind::Legacy {
            args.extend(
                ["--format", "MJPEG", "--device-timeout", "5", "--buffers", "3"]
                    .map(String::from),
            );
            self.fix_legacy_bitrate(camera, log);
        } else {
            args.extend([
                "--device".to_string(),
                params.device.clone(),
                "--device-timeout".to_string(),
                "2".to_string(),
            ]);
            if camera.has_hardware_mjpeg_encoder() {
                args.extend(["--format", "MJPEG", "--encoder", "HW"].map(String::from));
            }
        }

        let applied = self.apply_controls(params, camera, log);
        args.extend(params.custom_flags.iter().cloned());

        let mut launch = Launch::new(executable, args);
        launch.applied_controls = applied;
        Ok(launch)
    }

    /// Re-apply `focus_absolute` if the camera dropped it on stream start
    async fn after_launch(
        &self,
        params: &StreamParams,
        camera: Option<&CameraDevice>,
        log: &SectionLogger,
    ) {
        let Some(camera) = camera else { return };
        let Some(wanted) = params
            .controls
            .iter()
            .find(|c| c.name == FOCUS_CONTROL)
            .and_then(|c| c.int_value())
        else {
            return;
        };

        tokio::time::sleep(FOCUS_RECHECK_DELAY).await;

        let Ok(current) = camera.get_control_value(FOCUS_CONTROL) else {
            return;
        };
        if current == wanted {
            return;
        }
        log.warn("Detected 'brokenfocus' device.");
        log.info("Try to set to configured Value.");
        if !camera.set_control(FOCUS_CONTROL, wanted) {
            log.with_postfix(CONTROL_POSTFIX)
                .quiet(format!("Failed to set parameter: '{}={}'", FOCUS_CONTROL, wanted));
        }
        match camera.get_control_value(FOCUS_CONTROL) {
            Ok(value) => log.debug(format!("Value is now: {}", value)),
            Err(e) => log.debug(format!("Value is now unknown: {}", e)),
        }
    }

    fn stderr_filter(&self) -> super::LineFilter {
        strip_ustreamer_decoration
    }
}

/// `-- LEVEL [uptime thread] --` prefix of a ustreamer log message
static DECORATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-- (.*?) \[.*?\] --").expect("decoration pattern is valid"));

/// Drop ustreamer's log decoration
///
/// `-- INFO  [1234.567 main] -- Using device` becomes `INFO  Using device`;
/// separator lines ending in `===` lose their 28 character ruler.
pub fn strip_ustreamer_decoration(line: &str) -> Option<String> {
    if line.ends_with("===") {
        let keep = line.len().saturating_sub(28);
        return Some(line.get(..keep).unwrap_or("").to_string());
    }
    Some(DECORATION.replace_all(line, "${1}").into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_decoration() {
        assert_eq!(
            strip_ustreamer_decoration("-- INFO  [4473.581      main] -- Using device: /dev/video0").as_deref(),
            Some("INFO  Using device: /dev/video0")
        );
        assert_eq!(
            strip_ustreamer_decoration("plain line").as_deref(),
            Some("plain line")
        );
    }

    #[test]
    fn test_strip_every_decoration_on_a_line() {
        assert_eq!(
            strip_ustreamer_decoration("-- INFO  [1.0 main] -- x -- HTTP  [2.0 http] -- y").as_deref(),
            Some("INFO  x HTTP  y")
        );
    }

    #[test]
    fn test_strip_ruler() {
        let line = format!("Starting{}", "=".repeat(28));
        assert_eq!(strip_ustreamer_decoration(&line).as_deref(), Some("Starting"));
    }

    #[test]
    fn test_refuses_missing_camera() {
        let params = StreamParams {
            host: "127.0.0.1".into(),
            port: 8080,
            resolution: "640x480".parse().unwrap(),
            max_fps: 15,
            device: "/dev/video9".into(),
            controls: Vec::new(),
            custom_flags: Vec::new(),
        };
        let log = SectionLogger::new("[cam test]");
        let err = Ustreamer
            .prepare(&params, Path::new("/usr/bin/ustreamer"), None, &log)
            .unwrap_err();
        assert!(matches!(err, CamError::Streamer(_)));

        let libcamera = CameraDevice::libcamera("/base/soc/i2c0mux/i2c@1/imx708@1a");
        assert!(Ustreamer
            .prepare(&params, Path::new("/usr/bin/ustreamer"), Some(&libcamera), &log)
            .is_err());
    }
}
