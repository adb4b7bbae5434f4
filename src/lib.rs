//! camwarden
//!
//! Camera device daemon for single-board computers.
//!
//! ## Architecture
//!
//! The daemon discovers local capture devices, introspects them through raw
//! V4L2 ioctls, and supervises one external streaming server per configured
//! camera section.
//!
//! ### Modules
//!
//! - `v4l2`: Kernel ABI structs and the control/format introspection engine
//! - `camera`: Camera variants (UVC, Legacy, Libcamera) and the registry
//! - `streamer`: Streaming server adapters and process handling
//! - `supervisor`: Session lifecycle, start-lock and the device watchdog
//! - `context`: State shared by the supervisor and watchdog
//! - `config`: Config file reader and typed section settings
//! - `logging`: Leveled, section-prefixed logging on top of `tracing`
//! - `host`: Board and uptime detection
//!
//! ## Example
//!
//! ```rust,no_run
//! use camwarden::{CameraRegistry, Discovery};
//!
//! let registry = CameraRegistry::discover(&Discovery::system());
//! for cam in registry.iter() {
//!     println!("{} ({})", cam.path().display(), cam.kind());
//!     println!("{}", cam.get_controls_string());
//! }
//! ```

// Re-export commonly used types
pub use camera::{CameraDevice, CameraKind, CameraRegistry, Discovery};
pub use context::DaemonContext;
pub use error::{CamError, Result};
pub use streamer::{StreamerEnv, StreamerKind};
pub use supervisor::{Session, SessionState, Supervisor};

// Public modules
pub mod camera;
pub mod config;
pub mod context;
pub mod error;
pub mod host;
pub mod logging;
pub mod streamer;
pub mod supervisor;
pub mod v4l2;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
