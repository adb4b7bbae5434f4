//! camera-streamer adapter
//!
//! camera-streamer drives both V4L2 and libcamera sensors itself; controls
//! are forwarded as `--camera-options` instead of being set by the daemon.

use super::{Launch, StreamParams, Streamer, StreamerKind, CONTROL_POSTFIX};
use crate::camera::{CameraDevice, CameraKind};
use crate::error::{CamError, Result};
use crate::logging::SectionLogger;
use async_trait::async_trait;
use std::path::Path;

#[derive(Debug, Clone, Copy)]
pub struct CameraStreamer {
    is_pi5: bool,
}

impl CameraStreamer {
    pub fn new(is_pi5: bool) -> Self {
        Self { is_pi5 }
    }
}

#[async_trait]
impl Streamer for CameraStreamer {
    fn kind(&self) -> StreamerKind {
        StreamerKind::CameraStreamer
    }

    fn prepare(
        &self,
        params: &StreamParams,
        executable: &Path,
        camera: Option<&CameraDevice>,
        log: &SectionLogger,
    ) -> Result<Launch> {
        if self.is_pi5 {
            log.warn("Please change the mode of this section.");
            return Err(CamError::streamer(
                "Mode 'camera-streamer' is not supported on Pi5 and CM5!",
            ));
        }

        let height = params.resolution.height;
        let mut args = vec![
            format!("--camera-path={}", params.device),
            format!("--http-listen={}", params.host),
            format!("--http-port={}", params.port),
            format!("--camera-fps={}", params.max_fps),
            format!("--camera-width={}", params.resolution.width),
            format!("--camera-height={}", height),
            format!("--camera-snapshot.height={}", height),
            format!("--camera-video.height={}", height),
            format!("--camera-stream.height={}", height),
            "--camera-auto_reconnect=1".to_string(),
        ];

        if !params.controls.is_empty() {
            let ctl_log = log.with_postfix(CONTROL_POSTFIX);
            ctl_log.quiet(format!("Handling done by {}", self.kind()));
            ctl_log.quiet(format!("Trying to set: {}", params.controls_text()));
            args.extend(
                params
                    .controls
                    .iter()
                    .map(|c| format!("--camera-options={}", c.raw)),
            );
        }

        match camera.map(|c| c.kind()) {
            Some(CameraKind::Libcamera) => {
                args.push("--camera-type=libcamera".to_string());
                args.push("--camera-format=YUYV".to_string());
            }
            Some(CameraKind::Uvc | CameraKind::Legacy) => {
                args.push("--camera-type=v4l2".to_string());
                if camera.is_some_and(|c| c.has_hardware_mjpeg_encoder()) {
                    args.push("--camera-format=MJPEG".to_string());
                }
            }
            None => {}
        }

        args.extend(params.custom_flags.iter().cloned());
        Ok(Launch::new(executable, args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streamer::parse_control_overrides;

    fn params(device: &str) -> StreamParams {
        StreamParams {
            host: "0.0.0.0".into(),
            port: 8080,
            resolution: "1920x1080".parse().unwrap(),
            max_fps: 30,
            device: device.into(),
            controls: parse_control_overrides("AfMode=2,LensPosition=1.5"),
            custom_flags: vec!["--camera-fps=15".into()],
        }
    }

    #[test]
    fn test_refused_on_pi5() {
        let log = SectionLogger::new("[cam test]");
        let err = CameraStreamer::new(true)
            .prepare(&params("/dev/video0"), Path::new("camera-streamer"), None, &log)
            .unwrap_err();
        assert!(err.to_string().contains("Pi5"));
    }

    #[test]
    fn test_libcamera_arguments() {
        let log = SectionLogger::new("[cam test]");
        let device = "/base/soc/i2c0mux/i2c@1/imx708@1a";
        let cam = CameraDevice::libcamera(device);
        let launch = CameraStreamer::new(false)
            .prepare(&params(device), Path::new("camera-streamer"), Some(&cam), &log)
            .unwrap();

        assert_eq!(launch.args[0], format!("--camera-path={}", device));
        assert!(launch.args.contains(&"--http-listen=0.0.0.0".to_string()));
        assert!(launch.args.contains(&"--camera-height=1080".to_string()));
        assert!(launch.args.contains(&"--camera-options=AfMode=2".to_string()));
        assert!(launch.args.contains(&"--camera-type=libcamera".to_string()));
        assert!(launch.args.contains(&"--camera-format=YUYV".to_string()));
        // custom flags come last so they win
        assert_eq!(launch.args.last().map(String::as_str), Some("--camera-fps=15"));
        assert!(launch.applied_controls.is_empty());
    }

    #[test]
    fn test_unknown_device_gets_no_camera_type() {
        let log = SectionLogger::new("[cam test]");
        let launch = CameraStreamer::new(false)
            .prepare(&params("/dev/video7"), Path::new("camera-streamer"), None, &log)
            .unwrap();
        assert!(!launch.args.iter().any(|a| a.starts_with("--camera-type")));
    }
}
