//! Device Watchdog
//!
//! Periodically checks that every configured device node still exists and
//! logs when one disappears or comes back. It only observes; sessions are
//! never restarted or killed from here.

use crate::context::DaemonContext;
use crate::logging::SectionLogger;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Default time between sweeps
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(120);

/// Device-tree paths (libcamera sensors) are not filesystem nodes
pub const EXEMPT_PREFIX: &str = "/base";

/// A liveness transition seen during a sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchdogEvent {
    Lost(String),
    Returned(String),
}

/// Check every configured device once
pub fn sweep(ctx: &DaemonContext) -> Vec<WatchdogEvent> {
    let log = SectionLogger::new("Watchdog");
    let mut events = Vec::new();

    for device in ctx.configured_devices() {
        if device.starts_with(EXEMPT_PREFIX) {
            continue;
        }
        let exists = Path::new(&device).exists();
        if !exists && ctx.mark_lost(&device) {
            log.quiet(format!("Lost Device: '{}'", device));
            events.push(WatchdogEvent::Lost(device));
        } else if exists && ctx.mark_returned(&device) {
            log.quiet(format!("Device '{}' returned.", device));
            events.push(WatchdogEvent::Returned(device));
        }
    }
    events
}

/// Sweep every `period` until shutdown is requested
pub async fn run(ctx: Arc<DaemonContext>, period: Duration) {
    debug!("Watchdog started, period {}s", period.as_secs());
    while ctx.is_running() {
        sweep(&ctx);
        tokio::select! {
            _ = tokio::time::sleep(period) => {}
            _ = ctx.stopped() => break,
        }
    }
    debug!("Watchdog stopped");
}
