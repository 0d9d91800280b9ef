use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rollcall_core::{Capture, CameraSession, CaptureFormat, VideoSurface};
use rollcall_hw::{FacingMode, V4l2Device};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

mod config;
mod console;

use config::Config;
use console::StatusBadge;

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall attendance camera CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List video capture devices
    Devices,
    /// Capture a single still frame
    Capture {
        /// Output format: blob, data-url, base64, or json
        #[arg(short, long, default_value = "blob")]
        format: CaptureFormat,
        /// JPEG quality in [0, 1] (default from config)
        #[arg(short, long)]
        quality: Option<f32>,
        /// Camera to open first: user or environment
        #[arg(long, default_value = "user")]
        facing: FacingMode,
        /// Flip to the other camera before capturing
        #[arg(long)]
        flip: bool,
        /// Write to this file instead of the capture directory / stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Start the camera and print session status
    Status,
    /// Interactive preview (Enter: start/stop, f: flip, c: capture, s: status, q: quit)
    Watch {
        #[arg(long, default_value = "user")]
        facing: FacingMode,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Devices => list_devices(),
        Commands::Capture {
            format,
            quality,
            facing,
            flip,
            output,
        } => capture_once(&config, format, quality, facing, flip, output.as_deref()).await?,
        Commands::Status => status(&config).await?,
        Commands::Watch { facing } => watch(&config, facing).await?,
    }

    Ok(())
}

fn build_session(config: &Config, facing: FacingMode) -> CameraSession {
    let mut device = V4l2Device::new(config.camera_user.as_str());
    if let Some(path) = &config.camera_environment {
        device = device.with_environment(path.as_str());
    }
    let surface = Arc::new(VideoSurface::new());
    let mut session = CameraSession::new(Arc::new(device), surface, config.session_config())
        .with_facing_mode(facing);
    session.subscribe(Arc::new(StatusBadge));
    session
}

fn list_devices() {
    let devices = V4l2Device::list_devices();
    if devices.is_empty() {
        println!("No video capture devices found");
        return;
    }
    for device in devices {
        println!(
            "{}  {} ({}, {})",
            device.path, device.name, device.driver, device.bus
        );
    }
}

async fn capture_once(
    config: &Config,
    format: CaptureFormat,
    quality: Option<f32>,
    facing: FacingMode,
    flip: bool,
    output: Option<&Path>,
) -> Result<()> {
    let mut session = build_session(config, facing);

    if !session.start().await.is_started() {
        session.dispose();
        bail!("could not start camera");
    }
    if flip && !session.flip().await.is_started() {
        session.dispose();
        bail!("could not start camera after flip");
    }

    let capture = session.capture_frame(format, quality).await?;
    let written = write_capture(capture, output, &config.capture_dir).await;
    session.dispose();

    if let Some(path) = written? {
        println!("Saved {}", path.display());
    }
    Ok(())
}

/// Write a capture to `output`, or the capture directory for binary output,
/// or stdout for text. Returns the file written, if any.
async fn write_capture(
    capture: Capture,
    output: Option<&Path>,
    capture_dir: &Path,
) -> Result<Option<PathBuf>> {
    let (bytes, is_text) = match capture {
        Capture::Blob(blob) => (blob.bytes, false),
        Capture::DataUrl(text) | Capture::Base64(text) => (text.into_bytes(), true),
        Capture::Detailed(details) => (serde_json::to_vec_pretty(&details)?, true),
    };

    let path = match output {
        Some(path) => path.to_path_buf(),
        None if is_text => {
            println!("{}", String::from_utf8_lossy(&bytes));
            return Ok(None);
        }
        None => capture_path(capture_dir),
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    tokio::fs::write(&path, &bytes)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    tracing::info!(path = %path.display(), bytes = bytes.len(), "capture written");
    Ok(Some(path))
}

fn capture_path(capture_dir: &Path) -> PathBuf {
    let stamp = chrono::Utc::now().format("%Y%m%d-%H%M%S%.3f");
    capture_dir.join(format!("capture-{stamp}.jpg"))
}

async fn status(config: &Config) -> Result<()> {
    let mut session = build_session(config, FacingMode::User);
    let outcome = session.start().await;
    let status = serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "started": outcome.is_started(),
        "session": session.snapshot(),
        "camera_user": config.camera_user,
        "camera_environment": config.camera_environment,
    });
    session.dispose();
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

async fn watch(config: &Config, facing: FacingMode) -> Result<()> {
    let mut session = build_session(config, facing);
    println!("Enter: start/stop   f: flip   c: capture   s: status   q: quit");

    if !session.start().await.is_started() {
        println!("Camera not started; press Enter to retry");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim().to_ascii_lowercase().as_str() {
            "" => {
                if session.is_active() {
                    session.stop();
                } else if !session.start().await.is_started() {
                    println!("Camera not started");
                }
            }
            "f" if session.is_active() => {
                if !session.flip().await.is_started() {
                    println!("Camera not started after flip");
                }
            }
            "f" => println!("Camera not active"),
            "c" if session.is_active() => match session.capture_blob(None).await {
                Ok(blob) => {
                    let path = capture_path(&config.capture_dir);
                    tokio::fs::create_dir_all(&config.capture_dir)
                        .await
                        .with_context(|| {
                            format!("failed to create {}", config.capture_dir.display())
                        })?;
                    tokio::fs::write(&path, &blob.bytes)
                        .await
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("Captured {} ({} bytes)", path.display(), blob.bytes.len());
                }
                Err(e) => eprintln!("Capture failed: {e}"),
            },
            "c" => println!("Camera not ready"),
            "s" => println!("{}", serde_json::to_string_pretty(&session.snapshot())?),
            "q" | "quit" => break,
            other => println!("Unknown key: {other}"),
        }
    }

    session.dispose();
    Ok(())
}
