//! Process Supervisor
//!
//! Runs one task per configured camera section. Each session walks through
//!
//! ```text
//! Pending -> Validated -> Starting -> Running -> Exited(code)
//!                            |           |
//!                            +-----------+----> Failed(reason)
//! ```
//!
//! ## Start-lock
//!
//! Sessions start one at a time: a session holds the shared start-lock from
//! `Starting` until its streamer has been spawned (or failed to spawn),
//! then releases it and waits for the process on its own. Sessions take the
//! lock in the order they were created, so startup is serialized while the
//! running processes are not.
//!
//! ## Cleanup
//!
//! A session's device is added to the configured-device set before the lock
//! is released and removed when the session ends, whichever way it ends.
//! A failing session is logged and marked `Failed`; its siblings and the
//! watchdog keep running.

pub mod watchdog;

use crate::camera::CameraDevice;
use crate::config::{CamSettings, Config, DaemonSettings, OrphanPolicy, RawSection, CAM_KEYWORD};
use crate::context::DaemonContext;
use crate::error::{CamError, Result};
use crate::logging::{self, SectionLogger, Severity};
use crate::streamer::{self, StreamParams, Streamer, StreamerEnv, StreamerProcess};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::error;

/// Lifecycle state of one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Pending,
    Validated,
    Starting,
    Running,
    /// The process ended; `None` if it was killed by a signal
    Exited(Option<i32>),
    Failed(String),
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Exited(_) | SessionState::Failed(_))
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Pending => f.write_str("pending"),
            SessionState::Validated => f.write_str("validated"),
            SessionState::Starting => f.write_str("starting"),
            SessionState::Running => f.write_str("running"),
            SessionState::Exited(Some(code)) => write!(f, "exited ({})", code),
            SessionState::Exited(None) => f.write_str("exited (signal)"),
            SessionState::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Timestamped state transitions of one session
#[derive(Debug, Clone, Default)]
pub struct SessionHistory(Arc<Mutex<Vec<(SessionState, Instant)>>>);

impl SessionHistory {
    pub fn record(&self, state: SessionState) {
        self.entries_mut().push((state, Instant::now()));
    }

    pub fn entries(&self) -> Vec<(SessionState, Instant)> {
        self.entries_mut().clone()
    }

    pub fn current(&self) -> Option<SessionState> {
        self.entries_mut().last().map(|(state, _)| state.clone())
    }

    /// When the session first entered a state matching `pred`
    pub fn entered(&self, pred: impl Fn(&SessionState) -> bool) -> Option<Instant> {
        self.entries_mut()
            .iter()
            .find(|(state, _)| pred(state))
            .map(|(_, at)| *at)
    }

    fn entries_mut(&self) -> std::sync::MutexGuard<'_, Vec<(SessionState, Instant)>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Everything a validated session needs to start
#[derive(Clone)]
pub struct SessionPlan {
    pub params: StreamParams,
    pub executable: PathBuf,
    pub adapter: Arc<dyn Streamer>,
}

impl fmt::Debug for SessionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionPlan")
            .field("params", &self.params)
            .field("executable", &self.executable)
            .field("adapter", &self.adapter.kind())
            .finish()
    }
}

/// One configured camera-plus-streamer pairing
#[derive(Debug)]
pub struct Session {
    label: String,
    log: SectionLogger,
    history: SessionHistory,
    plan: Option<SessionPlan>,
}

impl Session {
    /// A session for section `label` (e.g. `[cam front]`), not yet validated
    pub fn pending(label: impl Into<String>) -> Self {
        let label = label.into();
        let history = SessionHistory::default();
        history.record(SessionState::Pending);
        Self {
            log: SectionLogger::new(&label),
            label,
            history,
            plan: None,
        }
    }

    /// A session that is ready to start
    pub fn validated(label: impl Into<String>, plan: SessionPlan) -> Self {
        let mut session = Self::pending(label);
        session.plan = Some(plan);
        session.history.record(SessionState::Validated);
        session
    }

    /// Pending -> Validated: check the section and resolve the streamer binary
    ///
    /// On error the session is marked `Failed`.
    pub fn validate(
        &mut self,
        section: &RawSection,
        daemon: &DaemonSettings,
        env: &StreamerEnv,
    ) -> Result<()> {
        match Self::plan_for(section, daemon, env) {
            Ok(plan) => {
                self.plan = Some(plan);
                self.history.record(SessionState::Validated);
                Ok(())
            }
            Err(e) => {
                self.history.record(SessionState::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    fn plan_for(section: &RawSection, daemon: &DaemonSettings, env: &StreamerEnv) -> Result<SessionPlan> {
        let settings = CamSettings::from_section(section, daemon)?;
        let executable = env.locate(settings.mode).ok_or_else(|| {
            CamError::config(format!(
                "'{}' executable not found!\n\
                 Please make sure everything is installed correctly and up to date!",
                settings.mode
            ))
        })?;
        Ok(SessionPlan {
            params: StreamParams::from_settings(&settings),
            executable,
            adapter: streamer::adapter(settings.mode, env),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn history(&self) -> &SessionHistory {
        &self.history
    }

    pub fn is_validated(&self) -> bool {
        self.plan.is_some()
    }
}

/// Final record of one session after [`Supervisor::run`]
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub label: String,
    pub history: SessionHistory,
}

impl SessionReport {
    pub fn state(&self) -> Option<SessionState> {
        self.history.current()
    }
}

/// Starts sessions under the start-lock and waits for them
pub struct Supervisor {
    ctx: Arc<DaemonContext>,
    policy: OrphanPolicy,
    watchdog_period: Duration,
}

impl Supervisor {
    pub fn new(ctx: Arc<DaemonContext>, policy: OrphanPolicy) -> Self {
        Self {
            ctx,
            policy,
            watchdog_period: watchdog::DEFAULT_PERIOD,
        }
    }

    pub fn with_watchdog_period(mut self, period: Duration) -> Self {
        self.watchdog_period = period;
        self
    }

    /// Build one session per `[cam ...]` section, validating each
    ///
    /// Sections that fail validation are returned too, already `Failed`.
    pub fn sessions_from_config(config: &Config, env: &StreamerEnv) -> Vec<Session> {
        let mut sessions = Vec::new();
        if config.sections.is_empty() {
            quiet("No Cams / Services to start! Exiting ...");
            return sessions;
        }
        quiet("Try to parse configured Cams / Services...");
        for section in &config.sections {
            let label = format!("[{}]", section.header);
            let log = SectionLogger::new(&label);
            if section.keyword() != CAM_KEYWORD {
                log.error(format!("Unknown section type '{}'! Skipping ...", section.keyword()));
                continue;
            }
            log.quiet("Parse configuration ...");
            let mut session = Session::pending(label);
            match session.validate(section, &config.daemon, env) {
                Ok(()) => log.quiet("Configuration looks good. Continue ..."),
                Err(e) => {
                    log.multiline(Severity::Error, &e.to_string());
                    log.error("Failed to parse config! Skipping ...");
                }
            }
            sessions.push(session);
        }
        sessions
    }

    /// Start every validated session and wait until all have ended or
    /// shutdown is requested
    pub async fn run(&self, sessions: Vec<Session>) -> Vec<SessionReport> {
        let watchdog = tokio::spawn(watchdog::run(Arc::clone(&self.ctx), self.watchdog_period));
        let lock = Arc::new(AsyncMutex::new(()));
        let kill_on_drop = self.policy == OrphanPolicy::Terminate;

        quiet("Try to start configured Cams / Services ...");
        let mut reports = Vec::new();
        let mut tasks: Vec<(SessionHistory, Option<JoinHandle<()>>)> = Vec::new();
        let mut previous: Option<oneshot::Receiver<()>> = None;

        for session in sessions {
            reports.push(SessionReport {
                label: session.label.clone(),
                history: session.history.clone(),
            });
            let Some(plan) = session.plan else { continue };
            let (acquired_tx, acquired_rx) = oneshot::channel();
            let turn = previous.replace(acquired_rx);
            let task = SessionTask {
                ctx: Arc::clone(&self.ctx),
                log: session.log,
                history: session.history.clone(),
                plan,
                kill_on_drop,
            };
            let handle = tokio::spawn(task.execute(Arc::clone(&lock), turn, acquired_tx));
            tasks.push((session.history, Some(handle)));
        }

        if tasks.is_empty() {
            quiet("No Service started! Exiting ...");
        } else {
            tokio::select! {
                _ = async {
                    if let Some(last) = previous {
                        let _ = last.await;
                    }
                    let _guard = lock.lock().await;
                } => quiet("... Done!"),
                _ = self.ctx.stopped() => {}
            }
        }

        tokio::select! {
            _ = wait_all(&mut tasks) => {}
            _ = self.ctx.stopped() => {}
        }

        for (history, slot) in tasks.iter_mut() {
            if let Some(handle) = slot.take() {
                handle.abort();
                let _ = handle.await;
            }
            if !history.current().is_some_and(|s| s.is_terminal()) {
                history.record(SessionState::Failed("cancelled".to_string()));
            }
        }

        self.ctx.request_shutdown();
        if let Err(e) = watchdog.await {
            error!("Watchdog task failed: {}", e);
        }
        quiet("Shutdown or Killed by User!");
        quiet("Goodbye...");
        reports
    }
}

async fn wait_all(tasks: &mut [(SessionHistory, Option<JoinHandle<()>>)]) {
    for (history, slot) in tasks.iter_mut() {
        let Some(handle) = slot.as_mut() else { continue };
        let result = handle.await;
        *slot = None;
        if let Err(e) = result {
            if e.is_panic() {
                let err = CamError::supervisor(format!("session task panicked: {}", e));
                error!("{}", err);
                history.record(SessionState::Failed(err.to_string()));
            }
        }
    }
}

/// The per-session task body
struct SessionTask {
    ctx: Arc<DaemonContext>,
    log: SectionLogger,
    history: SessionHistory,
    plan: SessionPlan,
    kill_on_drop: bool,
}

impl SessionTask {
    async fn execute(
        self,
        lock: Arc<AsyncMutex<()>>,
        turn: Option<oneshot::Receiver<()>>,
        acquired: oneshot::Sender<()>,
    ) {
        // Wait until the session created before us holds the lock
        if let Some(turn) = turn {
            let _ = turn.await;
        }
        let guard = lock.lock_owned().await;
        let _ = acquired.send(());

        self.history.record(SessionState::Starting);
        let kind = self.plan.adapter.kind();
        let device = self.plan.params.device.clone();
        self.log
            .quiet(format!("Start {} with device {} ...", kind, device));
        let _registration = self.ctx.register_device(&device);
        let camera = self.ctx.registry().lookup_by_path(&device);

        let started = self.start(camera.as_deref());
        let process = match started {
            Ok(process) => {
                self.history.record(SessionState::Running);
                drop(guard);
                process
            }
            Err(e) => {
                self.fail(&e);
                drop(guard);
                return;
            }
        };

        self.plan
            .adapter
            .after_launch(&self.plan.params, camera.as_deref(), &self.log)
            .await;

        match process.wait().await {
            Ok(status) => {
                self.log.info(format!("{} exited with {}", kind, status));
                self.history.record(SessionState::Exited(status.code()));
            }
            Err(e) => self.fail(&e),
        }
    }

    fn start(&self, camera: Option<&CameraDevice>) -> Result<StreamerProcess> {
        let plan = &self.plan;
        if plan.params.host == streamer::bind_host(true) {
            self.log.info("Set to 'no_proxy' mode! Using 0.0.0.0!");
        }
        let launch = plan
            .adapter
            .prepare(&plan.params, &plan.executable, camera, &self.log)?;
        let tag = format!("{} ", plan.adapter.kind());
        self.log
            .debug(format!("{}Parameters: {}", tag, launch.args.join(" ")));
        StreamerProcess::spawn(
            &launch,
            &self.log,
            &tag,
            plan.adapter.stderr_filter(),
            self.kill_on_drop,
        )
    }

    fn fail(&self, err: &CamError) {
        self.log.multiline(Severity::Error, &err.to_string());
        self.log
            .error(format!("Start of {} failed!", self.plan.adapter.kind()));
        self.history.record(SessionState::Failed(err.to_string()));
    }
}

fn quiet(msg: &str) {
    logging::log(Severity::Quiet, "", msg);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_ini;

    fn env_in(dir: &std::path::Path) -> StreamerEnv {
        StreamerEnv {
            bundled_root: dir.to_path_buf(),
            search_path: Some(dir.join("path").into_os_string()),
            is_pi5: false,
        }
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SessionState::Exited(Some(0)).to_string(), "exited (0)");
        assert_eq!(SessionState::Exited(None).to_string(), "exited (signal)");
        assert!(SessionState::Failed("x".into()).is_terminal());
        assert!(!SessionState::Running.is_terminal());
    }

    #[test]
    fn test_validate_missing_binary_fails() {
        let dir = tempfile::tempdir().unwrap();
        let sections = parse_ini(
            "[cam front]\nmode: spyglass\nport: 8080\ndevice: 0\nresolution: 640x480\nmax_fps: 15\n",
        )
        .unwrap();
        let mut session = Session::pending("[cam front]");
        let err = session
            .validate(&sections[0], &DaemonSettings::default(), &env_in(dir.path()))
            .unwrap_err();
        assert!(err.to_string().contains("executable not found"));
        assert!(!session.is_validated());
        assert!(matches!(session.history().current(), Some(SessionState::Failed(_))));
    }

    #[test]
    fn test_validate_records_transition() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("path/spyglass");
        std::fs::create_dir_all(bin.parent().unwrap()).unwrap();
        std::fs::write(&bin, b"").unwrap();
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();

        let sections = parse_ini(
            "[cam front]\nmode: spyglass\nport: 8080\ndevice: 0\nresolution: 640x480\nmax_fps: 15\n",
        )
        .unwrap();
        let mut session = Session::pending("[cam front]");
        session
            .validate(&sections[0], &DaemonSettings::default(), &env_in(dir.path()))
            .unwrap();
        let states: Vec<_> = session.history().entries().into_iter().map(|(s, _)| s).collect();
        assert_eq!(states, vec![SessionState::Pending, SessionState::Validated]);
    }

    #[test]
    fn test_sessions_from_config_skips_unknown_sections() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::parse("[camwarden]\n\n[timelapse x]\nfoo: bar\n\n[cam a]\nmode: ustreamer\n").unwrap();
        let sessions = Supervisor::sessions_from_config(&config, &env_in(dir.path()));
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].label(), "[cam a]");
        assert!(!sessions[0].is_validated());
    }
}
