//! Host detection helpers

use std::path::Path;
use std::time::Duration;
use tracing::{error, info};

/// Device-tree model string
pub const MODEL_PATH: &str = "/proc/device-tree/model";

/// Seconds since boot
pub const UPTIME_PATH: &str = "/proc/uptime";

/// Uptime below which the boot delay applies
pub const RECENT_BOOT: Duration = Duration::from_secs(120);

/// True for Raspberry Pi 5 and Compute Module 5 model strings
pub fn model_is_pi5(model: &str) -> bool {
    model.contains("Raspberry Pi 5") || model.contains("Raspberry Pi Compute Module 5")
}

/// Whether the running board is a Pi 5 / CM5
pub fn is_pi5() -> bool {
    read_model(Path::new(MODEL_PATH))
        .map(|m| model_is_pi5(&m))
        .unwrap_or(false)
}

/// Model string with the device-tree NUL terminator removed
pub fn read_model(path: &Path) -> Option<String> {
    std::fs::read(path)
        .ok()
        .map(|bytes| String::from_utf8_lossy(&bytes).trim_end_matches('\0').trim().to_string())
}

/// First field of `/proc/uptime`
pub fn parse_uptime(text: &str) -> Option<Duration> {
    let secs: f64 = text.split_whitespace().next()?.parse().ok()?;
    (secs.is_finite() && secs >= 0.0).then(|| Duration::from_secs_f64(secs))
}

/// Delay startup by `delay` if the system booted less than two minutes ago
///
/// Gives USB cameras time to enumerate after a cold boot.
pub async fn sleep_if_recent_boot(delay: Duration) {
    if delay.is_zero() {
        return;
    }
    let uptime = std::fs::read_to_string(UPTIME_PATH)
        .ok()
        .and_then(|t| parse_uptime(&t));
    match uptime {
        Some(uptime) if uptime < RECENT_BOOT => {
            info!("Recent boot detected, sleeping {}s", delay.as_secs());
            tokio::time::sleep(delay).await;
        }
        Some(_) => {}
        None => error!("Couldn't properly read {}! Skipping sleep!", UPTIME_PATH),
    }
}
