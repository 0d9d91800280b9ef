//! V4L2 capture via the `v4l` crate.
//!
//! Each granted stream runs on its own capture thread, which owns the
//! device and publishes converted frames until the track is stopped.

use crate::device::{CaptureDevice, Constraints, DeviceFault, FacingMode};
use crate::frame::{self, Frame, PixelFormat};
use crate::stream::{FrameSender, MediaStream, VideoTrack};
use async_trait::async_trait;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::oneshot;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

/// Number of mmap buffers queued per stream.
const STREAM_BUFFERS: u32 = 4;

/// Upper bound on a single dequeue, so a stopped track is noticed on a stalled camera.
const DEQUEUE_TIMEOUT: Duration = Duration::from_millis(200);

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// V4L2 capture device, with one device node per facing mode.
///
/// If the node for the requested facing mode is missing, the other one is
/// used, the same way an ideal `facingMode` constraint falls back.
#[derive(Debug, Clone)]
pub struct V4l2Device {
    user_path: String,
    environment_path: Option<String>,
    worker: Arc<Mutex<Option<CaptureWorker>>>,
}

/// The capture thread of the most recently granted stream.
#[derive(Debug)]
struct CaptureWorker {
    track: VideoTrack,
    handle: JoinHandle<()>,
}

impl V4l2Device {
    /// Camera at `user_path` (e.g., "/dev/video0") serves the user-facing mode.
    pub fn new(user_path: impl Into<String>) -> Self {
        Self {
            user_path: user_path.into(),
            environment_path: None,
            worker: Arc::default(),
        }
    }

    /// Node used for the environment-facing (back) camera.
    pub fn with_environment(mut self, path: impl Into<String>) -> Self {
        self.environment_path = Some(path.into());
        self
    }

    fn resolve(&self, facing: FacingMode) -> Result<String, DeviceFault> {
        let user = Some(self.user_path.as_str());
        let environment = self.environment_path.as_deref();
        let (preferred, fallback) = match facing {
            FacingMode::User => (user, environment),
            FacingMode::Environment => (environment, user),
        };
        [preferred, fallback]
            .into_iter()
            .flatten()
            .find(|path| Path::new(path).exists())
            .map(str::to_string)
            .ok_or(DeviceFault::NoDevice)
    }

    fn track_worker(&self, track: VideoTrack, handle: JoinHandle<()>) {
        let mut slot = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(CaptureWorker { track, handle });
    }

    /// Wait until the previous capture thread has closed its device.
    ///
    /// Only a worker whose track was stopped is waited for; a live one still
    /// owns the node and the next open reports it busy.
    async fn reap_worker(&self) {
        let worker = {
            let mut slot = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
            match slot.take() {
                Some(worker) if worker.track.is_live() => {
                    *slot = Some(worker);
                    None
                }
                other => other,
            }
        };
        let Some(worker) = worker else {
            return;
        };

        let label = worker.track.label().to_string();
        match tokio::task::spawn_blocking(move || worker.handle.join()).await {
            Ok(Ok(())) => tracing::debug!(device = %label, "previous capture thread exited"),
            Ok(Err(_)) => tracing::warn!(device = %label, "previous capture thread panicked"),
            Err(e) => tracing::warn!(device = %label, error = %e, "failed to join capture thread"),
        }
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        for i in 0..16 {
            let path = format!("/dev/video{i}");
            if !Path::new(&path).exists() {
                continue;
            }
            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }
            devices.push(DeviceInfo {
                path,
                name: caps.card.clone(),
                driver: caps.driver.clone(),
                bus: caps.bus.clone(),
            });
        }

        devices
    }
}

#[async_trait]
impl CaptureDevice for V4l2Device {
    async fn acquire(&self, constraints: &Constraints) -> Result<MediaStream, DeviceFault> {
        let path = self.resolve(constraints.facing_mode)?;
        self.reap_worker().await;

        let (stream, sender) = MediaStream::channel(path.clone());
        let (grant_tx, grant_rx) = oneshot::channel();
        let constraints = constraints.clone();

        let thread_path = path.clone();
        let handle = std::thread::Builder::new()
            .name("rollcall-capture".into())
            .spawn(move || run_capture(&thread_path, &constraints, sender, grant_tx))
            .map_err(|e| DeviceFault::Other(format!("failed to spawn capture thread: {e}")))?;
        self.track_worker(stream.video_track().clone(), handle);

        grant_rx
            .await
            .map_err(|_| DeviceFault::Other(format!("{path}: capture thread exited")))??;
        Ok(stream)
    }
}

/// An opened device with its negotiated format.
struct OpenedDevice {
    device: Device,
    width: u32,
    height: u32,
    format: PixelFormat,
}

fn open_device(path: &str, constraints: &Constraints) -> Result<OpenedDevice, DeviceFault> {
    if !Path::new(path).exists() {
        return Err(DeviceFault::io(
            path,
            std::io::Error::from(std::io::ErrorKind::NotFound),
        ));
    }

    let device = Device::with_path(path).map_err(|e| DeviceFault::io(path, e))?;

    let caps = device.query_caps().map_err(|e| DeviceFault::io(path, e))?;
    tracing::info!(
        device = path,
        driver = %caps.driver,
        card = %caps.card,
        "opened camera"
    );

    if !caps
        .capabilities
        .contains(v4l::capability::Flags::VIDEO_CAPTURE)
    {
        return Err(DeviceFault::Overconstrained(format!(
            "{path} is not a video capture device"
        )));
    }

    // Ask for YUYV at the ideal size; drivers answer with the closest they have.
    let mut fmt = device.format().map_err(|e| DeviceFault::io(path, e))?;
    fmt.fourcc = FourCC::new(PixelFormat::Yuyv.fourcc());
    fmt.width = constraints.ideal_width;
    fmt.height = constraints.ideal_height;

    let negotiated = device.set_format(&fmt).map_err(|e| DeviceFault::io(path, e))?;

    let format = PixelFormat::from_fourcc(&negotiated.fourcc.repr).ok_or_else(|| {
        DeviceFault::Overconstrained(format!(
            "unsupported pixel format: {:?} (need YUYV, MJPG, GREY, or RGB3)",
            negotiated.fourcc
        ))
    })?;
    if negotiated.width == 0 || negotiated.height == 0 {
        return Err(DeviceFault::Overconstrained(format!(
            "driver negotiated {}x{}",
            negotiated.width, negotiated.height
        )));
    }

    tracing::info!(
        width = negotiated.width,
        height = negotiated.height,
        fourcc = ?negotiated.fourcc,
        "negotiated format"
    );

    Ok(OpenedDevice {
        device,
        width: negotiated.width,
        height: negotiated.height,
        format,
    })
}

/// Capture thread body: open, report the grant, then stream until stopped.
fn run_capture(
    path: &str,
    constraints: &Constraints,
    sender: FrameSender,
    grant: oneshot::Sender<Result<(), DeviceFault>>,
) {
    let opened = match open_device(path, constraints) {
        Ok(opened) => opened,
        Err(fault) => {
            let _ = grant.send(Err(fault));
            return;
        }
    };

    let mut stream =
        match MmapStream::with_buffers(&opened.device, BufType::VideoCapture, STREAM_BUFFERS) {
            Ok(stream) => stream,
            Err(e) => {
                let _ = grant.send(Err(DeviceFault::io(path, e)));
                return;
            }
        };
    stream.set_timeout(DEQUEUE_TIMEOUT);

    if grant.send(Ok(())).is_err() {
        tracing::debug!(device = path, "acquire abandoned before grant");
        return;
    }
    tracing::info!(device = path, "capture stream started");

    let mut resync = false;
    while !sender.is_stopped() {
        // A timed-out next() leaves its buffer queued; dequeue it (and drop
        // that frame) before queueing again.
        if resync {
            match CaptureStream::dequeue(&mut stream) {
                Ok(_) => resync = false,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {}
                Err(e) => {
                    tracing::warn!(device = path, error = %e, "failed to dequeue buffer");
                    break;
                }
            }
            continue;
        }

        let (buf, meta) = match stream.next() {
            Ok(next) => next,
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                tracing::trace!(device = path, "no frame within dequeue timeout");
                resync = true;
                continue;
            }
            Err(e) => {
                tracing::warn!(device = path, error = %e, "failed to dequeue buffer");
                break;
            }
        };

        let used = (meta.bytesused as usize).min(buf.len());
        let raw = if used > 0 { &buf[..used] } else { buf };
        let sequence = meta.sequence;

        let rgb = match frame::to_rgb(opened.format, raw, opened.width, opened.height) {
            Ok(rgb) => rgb,
            Err(e) => {
                tracing::debug!(seq = sequence, error = %e, "dropping undecodable frame");
                continue;
            }
        };
        match Frame::from_rgb(rgb, opened.width, opened.height, sequence) {
            Ok(frame) => {
                sender.push(frame);
            }
            Err(e) => tracing::debug!(seq = sequence, error = %e, "dropping malformed frame"),
        }
    }

    tracing::info!(device = path, "capture stream stopped");
    // The stream, then the device, close here; the sender is dropped last and ends the track.
}
