//! Daemon Context
//!
//! All state shared between the supervisor, the watchdog and the session
//! tasks lives in one [`DaemonContext`], built once at startup and handed
//! around as `Arc<DaemonContext>`.

use crate::camera::CameraRegistry;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

pub struct DaemonContext {
    registry: CameraRegistry,
    /// Devices of sessions that are currently starting or running.
    /// A multiset: two sessions may name the same device.
    configured: Mutex<Vec<String>>,
    lost: Mutex<HashSet<String>>,
    running: watch::Sender<bool>,
}

impl DaemonContext {
    pub fn new(registry: CameraRegistry) -> Self {
        let (running, _) = watch::channel(true);
        Self {
            registry,
            configured: Mutex::new(Vec::new()),
            lost: Mutex::new(HashSet::new()),
            running,
        }
    }

    pub fn registry(&self) -> &CameraRegistry {
        &self.registry
    }

    /// Track `device` until the returned registration is dropped
    pub fn register_device(self: &Arc<Self>, device: impl Into<String>) -> DeviceRegistration {
        let device = device.into();
        lock(&self.configured).push(device.clone());
        DeviceRegistration {
            ctx: Arc::clone(self),
            device,
        }
    }

    /// Snapshot of the configured devices, in registration order
    pub fn configured_devices(&self) -> Vec<String> {
        lock(&self.configured).clone()
    }

    pub fn is_lost(&self, device: &str) -> bool {
        lock(&self.lost).contains(device)
    }

    /// Mark `device` lost; false if it already was
    pub(crate) fn mark_lost(&self, device: &str) -> bool {
        lock(&self.lost).insert(device.to_string())
    }

    /// Clear the lost mark; false if it was not set
    pub(crate) fn mark_returned(&self, device: &str) -> bool {
        lock(&self.lost).remove(device)
    }

    pub fn lost_devices(&self) -> Vec<String> {
        let mut lost: Vec<_> = lock(&self.lost).iter().cloned().collect();
        lost.sort();
        lost
    }

    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    /// Flip the running flag; idempotent
    pub fn request_shutdown(&self) {
        self.running.send_replace(false);
    }

    /// Resolves once shutdown has been requested
    pub async fn stopped(&self) {
        let mut rx = self.running.subscribe();
        let _ = rx.wait_for(|running| !*running).await;
    }
}

/// Removes its device from the configured set when dropped
///
/// Dropping happens on every exit path of a session, including task
/// cancellation. The last registration of a device also clears its lost
/// mark.
#[derive(Debug)]
pub struct DeviceRegistration {
    ctx: Arc<DaemonContext>,
    device: String,
}

impl DeviceRegistration {
    pub fn device(&self) -> &str {
        &self.device
    }
}

impl Drop for DeviceRegistration {
    fn drop(&mut self) {
        let mut configured = lock(&self.ctx.configured);
        if let Some(pos) = configured.iter().position(|d| *d == self.device) {
            configured.remove(pos);
        }
        if !configured.contains(&self.device) {
            lock(&self.ctx.lost).remove(&self.device);
        }
    }
}

impl std::fmt::Debug for DaemonContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonContext")
            .field("cameras", &self.registry.len())
            .field("configured", &self.configured_devices())
            .field("running", &self.is_running())
            .finish()
    }
}

/// A panicking session must not wedge the shared sets
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
