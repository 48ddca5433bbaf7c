//! Workspace visualizer daemon
//!
//! Loads a scene configuration, subscribes to telemetry and emits frames:
//! - `--surface json` writes one JSON line per frame on stdout
//! - `--surface null` draws nothing (useful to exercise routing and logging)
//!
//! Send SIGHUP to reload the configuration without restarting.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use wsviz::{DrawSurface, JsonSurface, NullSurface, Visualizer};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SurfaceKind {
    Json,
    Null,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "wsviz")]
#[command(about = "Live 2D visualization of robot workspaces from pub/sub telemetry")]
#[command(version)]
struct Args {
    /// Path to the scene configuration file
    #[arg(short, long, env = "WSVIZ_CONFIG", default_value = "config/workspace.yaml")]
    config: PathBuf,

    /// Where frames go
    #[arg(long, value_enum, default_value = "json")]
    surface: SurfaceKind,

    /// Log line format on stderr
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,

    /// Exit after presenting this many frames
    #[arg(long)]
    frames: Option<u64>,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Set `reload` on every SIGHUP.
fn spawn_reload_listener(reload: Arc<AtomicBool>) -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut hangup = signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;
        tokio::spawn(async move {
            while hangup.recv().await.is_some() {
                info!("SIGHUP received, reload scheduled");
                reload.store(true, Ordering::SeqCst);
            }
        });
    }
    #[cfg(not(unix))]
    {
        let _ = reload;
        warn!("Configuration reload on signal is not supported on this platform");
    }
    Ok(())
}

async fn quit_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

async fn run<S: DrawSurface>(mut viz: Visualizer<S>, frames: Option<u64>) -> Result<()> {
    if let Some(frames) = frames {
        viz = viz.with_frame_limit(frames);
    }
    spawn_reload_listener(viz.reload_handle())?;

    // Quit does not drain: dropping the visualizer aborts every subscription
    tokio::select! {
        result = viz.run() => result.context("Visualization stopped")?,
        _ = quit_signal() => info!("Quit signal received"),
    }
    info!(frames = viz.frames(), "Shutdown complete");
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    info!("Workspace visualizer");
    info!("Using config: {}", args.config.display());

    match args.surface {
        SurfaceKind::Json => run(Visualizer::new(&args.config, JsonSurface::stdout()), args.frames).await,
        SurfaceKind::Null => run(Visualizer::new(&args.config, NullSurface), args.frames).await,
    }
}
