//! camwarden daemon entrypoint.
//!
//! ```bash
//! camwarden -c /etc/camwarden.conf -l /var/log/camwarden.log
//! camwarden -c camwarden.conf -l camwarden.log --sleep-boot 5
//! camwarden --list-devices
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use camwarden::config::Config;
use camwarden::{host, logging, CameraRegistry, DaemonContext, Discovery, StreamerEnv, Supervisor};

#[derive(Parser, Debug)]
#[command(
    name = "camwarden",
    version,
    about = "Webcam daemon: discovers cameras and supervises streaming servers"
)]
struct Cli {
    /// Path to config file
    #[arg(short = 'c', long = "config", required_unless_present = "list_devices")]
    config: Option<PathBuf>,

    /// Path to log file
    #[arg(short = 'l', long = "log-path", required_unless_present = "list_devices")]
    log_path: Option<PathBuf>,

    /// Seconds to sleep when started shortly after boot
    #[arg(short = 's', long = "sleep-boot", default_value_t = 0)]
    sleep_boot: u64,

    /// Root of the bundled streamer binaries (`bin/<streamer>`)
    #[arg(short = 'b', long = "bin-root", default_value = ".")]
    bin_root: PathBuf,

    /// Print discovered cameras as JSON and exit
    #[arg(long = "list-devices")]
    list_devices: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.list_devices {
        let registry = CameraRegistry::discover(&Discovery::system());
        println!("{}", registry.to_json()?);
        return Ok(());
    }

    let (Some(config_path), Some(log_path)) = (cli.config, cli.log_path) else {
        anyhow::bail!("--config and --log-path are required");
    };

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;
    logging::init(&log_path, config.daemon.delete_log, config.daemon.log_level)
        .context("Failed to set up logging")?;

    info!("camwarden {} starting", camwarden::VERSION);
    info!("Log level: {:?}", config.daemon.log_level);

    host::sleep_if_recent_boot(Duration::from_secs(cli.sleep_boot)).await;

    let registry = CameraRegistry::discover(&Discovery::system());
    for cam in registry.iter() {
        let log = logging::SectionLogger::new(format!("[{}] {}", cam.kind(), cam.path().display()));
        log.multiline(logging::Severity::Debug, &cam.get_formats_string());
        log.multiline(logging::Severity::Debug, &cam.get_controls_string());
    }

    let ctx = Arc::new(DaemonContext::new(registry));
    let env = StreamerEnv::detect(cli.bin_root);
    let sessions = Supervisor::sessions_from_config(&config, &env);

    let signals = tokio::spawn(shutdown_on_signal(Arc::clone(&ctx)));
    let reports = Supervisor::new(Arc::clone(&ctx), config.daemon.on_shutdown)
        .run(sessions)
        .await;
    signals.abort();

    for report in reports {
        if let Some(state) = report.state() {
            info!("{}: {}", report.label, state);
        }
    }
    Ok(())
}

/// Flip the running flag on SIGINT or SIGTERM
async fn shutdown_on_signal(ctx: Arc<DaemonContext>) {
    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(sig) => sig,
        Err(e) => {
            error!("Failed to install SIGTERM handler: {}", e);
            if tokio::signal::ctrl_c().await.is_ok() {
                ctx.request_shutdown();
            }
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
        _ = sigterm.recv() => info!("Received SIGTERM"),
    }
    ctx.request_shutdown();
}
