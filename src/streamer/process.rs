//! Streamer process handling
//!
//! Spawns a [`Launch`] with both output pipes captured. Each pipe gets its
//! own drain task reading line by line, so a process blocked on one pipe
//! never stalls the other.

use super::Launch;
use crate::error::{CamError, Result};
use crate::logging::SectionLogger;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::debug;

/// How long to keep draining after exit. A background child that inherited
/// the pipes keeps them open past the streamer's own exit.
pub const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Rewrites one output line; `None` drops it
pub type LineFilter = fn(&str) -> Option<String>;

/// Filter that passes every line through
pub fn keep_line(line: &str) -> Option<String> {
    Some(line.to_string())
}

/// A running streamer with its two drain tasks
#[derive(Debug)]
pub struct StreamerProcess {
    child: Child,
    stdout_task: JoinHandle<()>,
    stderr_task: JoinHandle<()>,
}

impl StreamerProcess {
    /// Spawn `launch`, forwarding output lines to `log` prefixed by `tag`
    ///
    /// With `kill_on_drop` the process is killed when this handle is
    /// dropped, e.g. because the owning session task was cancelled.
    pub fn spawn(
        launch: &Launch,
        log: &SectionLogger,
        tag: &str,
        stderr_filter: LineFilter,
        kill_on_drop: bool,
    ) -> Result<Self> {
        let mut child = Command::new(&launch.program)
            .args(&launch.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(kill_on_drop)
            .spawn()
            .map_err(|e| {
                CamError::streamer(format!(
                    "Failed to spawn {}: {}",
                    launch.program.display(),
                    e
                ))
            })?;

        debug!("Spawned {} (pid {:?})", launch.program.display(), child.id());

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CamError::streamer("stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| CamError::streamer("stderr was not captured"))?;

        let stdout_task = tokio::spawn(drain(stdout, log.clone(), tag.to_string(), keep_line));
        let stderr_task = tokio::spawn(drain(stderr, log.clone(), tag.to_string(), stderr_filter));

        Ok(Self {
            child,
            stdout_task,
            stderr_task,
        })
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Wait for the process to exit, then drain what is left of its output
    /// for at most [`DRAIN_GRACE`]
    pub async fn wait(mut self) -> Result<ExitStatus> {
        let status = self.child.wait().await?;
        let drained = tokio::time::timeout(DRAIN_GRACE, async {
            let _ = (&mut self.stdout_task).await;
            let _ = (&mut self.stderr_task).await;
        })
        .await;
        if drained.is_err() {
            debug!("Output pipes still open after exit, detaching drain tasks");
            self.stdout_task.abort();
            self.stderr_task.abort();
        }
        Ok(status)
    }
}

async fn drain<R>(reader: R, log: SectionLogger, tag: String, filter: LineFilter)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if let Some(line) = filter(&line) {
                    log.debug(format!("{}{}", tag, line));
                }
            }
            Ok(None) => break,
            Err(e) => {
                log.debug(format!("{}output stream closed: {}", tag, e));
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell(script: &str) -> Launch {
        Launch::new("/bin/sh", vec!["-c".to_string(), script.to_string()])
    }

    #[tokio::test]
    async fn test_exit_code_is_reported() {
        let log = SectionLogger::new("[cam test]");
        let proc = StreamerProcess::spawn(&shell("exit 3"), &log, "sh ", keep_line, false).unwrap();
        let status = proc.wait().await.unwrap();
        assert_eq!(status.code(), Some(3));
    }

    #[tokio::test]
    async fn test_large_output_on_both_pipes_does_not_block() {
        let log = SectionLogger::new("[cam test]");
        // Well beyond a pipe buffer on each stream
        let script = "i=0; while [ $i -lt 5000 ]; do echo out $i; echo err $i >&2; i=$((i+1)); done";
        let proc = StreamerProcess::spawn(&shell(script), &log, "sh ", keep_line, false).unwrap();
        let status = tokio::time::timeout(std::time::Duration::from_secs(30), proc.wait())
            .await
            .expect("process stalled")
            .unwrap();
        assert!(status.success());
    }

    #[tokio::test]
    async fn test_wait_returns_when_background_child_holds_pipes() {
        let log = SectionLogger::new("[cam test]");
        let proc = StreamerProcess::spawn(&shell("sleep 5 & echo started; exit 0"), &log, "sh ", keep_line, false).unwrap();
        let status = tokio::time::timeout(std::time::Duration::from_secs(3), proc.wait())
            .await
            .expect("wait blocked on inherited pipes")
            .unwrap();
        assert!(status.success());
    }

    #[test]
    fn test_spawn_missing_binary_fails() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let _guard = rt.enter();
        let log = SectionLogger::new("[cam test]");
        let launch = Launch::new("/nonexistent/streamer", Vec::new());
        let err = StreamerProcess::spawn(&launch, &log, "", keep_line, false).unwrap_err();
        assert!(matches!(err, CamError::Streamer(_)));
    }
}
