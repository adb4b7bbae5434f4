//! spyglass adapter

use super::{Launch, StreamParams, Streamer, StreamerKind, CONTROL_POSTFIX};
use crate::camera::CameraDevice;
use crate::error::Result;
use crate::logging::SectionLogger;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Script name of a source checkout of spyglass
const RUN_SCRIPT: &str = "run.py";

#[derive(Debug, Clone)]
pub struct Spyglass {
    /// Interpreter used when the binary is the `run.py` script
    venv_python: PathBuf,
}

impl Spyglass {
    pub fn new(venv_python: impl Into<PathBuf>) -> Self {
        Self {
            venv_python: venv_python.into(),
        }
    }
}

#[async_trait]
impl Streamer for Spyglass {
    fn kind(&self) -> StreamerKind {
        StreamerKind::Spyglass
    }

    fn prepare(
        &self,
        params: &StreamParams,
        executable: &Path,
        _camera: Option<&CameraDevice>,
        log: &SectionLogger,
    ) -> Result<Launch> {
        // A bare number selects a libcamera sensor by index
        let device_option = if params.device.trim().parse::<i64>().is_ok() {
            "--camera_num"
        } else {
            "--device"
        };

        let mut args = vec![
            format!("{}={}", device_option, params.device),
            format!("--bindaddress={}", params.host),
            format!("--port={}", params.port),
            format!("--fps={}", params.max_fps),
            format!("--resolution={}", params.resolution),
            "--stream_url=/?action=stream".to_string(),
            "--snapshot_url=/?action=snapshot".to_string(),
        ];

        if !params.controls.is_empty() {
            let ctl_log = log.with_postfix(CONTROL_POSTFIX);
            ctl_log.quiet(format!("Handling done by {}", self.kind()));
            ctl_log.quiet(format!("Trying to set: {}", params.controls_text()));
            args.extend(
                params
                    .controls
                    .iter()
                    .map(|c| format!("--controls={}", c.raw)),
            );
        }

        args.extend(params.custom_flags.iter().cloned());

        if executable.file_name().is_some_and(|n| n == RUN_SCRIPT) {
            args.insert(0, executable.display().to_string());
            return Ok(Launch::new(&self.venv_python, args));
        }
        Ok(Launch::new(executable, args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(device: &str) -> StreamParams {
        StreamParams {
            host: "127.0.0.1".into(),
            port: 8081,
            resolution: "1280x720".parse().unwrap(),
            max_fps: 20,
            device: device.into(),
            controls: crate::streamer::parse_control_overrides("brightness=10"),
            custom_flags: Vec::new(),
        }
    }

    #[test]
    fn test_numeric_device_selects_camera_num() {
        let log = SectionLogger::new("[cam test]");
        let spyglass = Spyglass::new("/opt/venv/bin/python3");
        let launch = spyglass
            .prepare(&params("0"), Path::new("/usr/bin/spyglass"), None, &log)
            .unwrap();
        assert_eq!(launch.program, PathBuf::from("/usr/bin/spyglass"));
        assert_eq!(launch.args[0], "--camera_num=0");
        assert!(launch.args.contains(&"--resolution=1280x720".to_string()));
        assert!(launch.args.contains(&"--controls=brightness=10".to_string()));
    }

    #[test]
    fn test_run_script_uses_venv_python() {
        let log = SectionLogger::new("[cam test]");
        let spyglass = Spyglass::new("/opt/spyglass/.venv/bin/python3");
        let launch = spyglass
            .prepare(&params("/dev/video0"), Path::new("/opt/spyglass/run.py"), None, &log)
            .unwrap();
        assert_eq!(launch.program, PathBuf::from("/opt/spyglass/.venv/bin/python3"));
        assert_eq!(launch.args[0], "/opt/spyglass/run.py");
        assert_eq!(launch.args[1], "--device=/dev/video0");
    }
}
