//! Camera session: owns one capture stream at a time and turns it into stills.
//!
//! State machine:
//!
//! ```text
//! Idle -> Starting -> Active -> Stopping -> Idle
//!                     Active -> Flipping -> Starting -> Active
//! ```
//!
//! Operations take `&mut self`, so calls on one session never overlap.
//! Starting always stops any held stream first, which keeps at most one
//! stream attached at a time. A session whose track ended underneath it no
//! longer counts as active.

use crate::capture::{self, Capture, CaptureDetails, CaptureFormat, FrameBuffer, ImageBlob};
use crate::error::{classify, CameraError};
use crate::events::{EventKind, Observers, SessionEvent, SessionObserver, SubscriptionId};
use crate::origin::is_secure_origin;
use crate::surface::VideoSurface;
use chrono::Utc;
use rollcall_hw::{CaptureDevice, Constraints, DeviceFault, FacingMode, MediaStream};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const DEFAULT_IDEAL_WIDTH: u32 = 1280;
pub const DEFAULT_IDEAL_HEIGHT: u32 = 720;
pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_FLIP_SETTLE: Duration = Duration::from_millis(300);

/// Session tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub ideal_width: u32,
    pub ideal_height: u32,
    /// How long `start` waits for the first frame.
    pub start_timeout: Duration,
    /// Pause between releasing and re-acquiring the device on flip.
    pub flip_settle: Duration,
    /// Quality used when a capture does not specify one, in [0, 1].
    pub default_quality: f32,
    /// Where captures are uploaded. Insecure origins block the camera.
    pub origin: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ideal_width: DEFAULT_IDEAL_WIDTH,
            ideal_height: DEFAULT_IDEAL_HEIGHT,
            start_timeout: DEFAULT_START_TIMEOUT,
            flip_settle: DEFAULT_FLIP_SETTLE,
            default_quality: capture::DEFAULT_QUALITY,
            origin: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Starting,
    Active,
    Stopping,
    Flipping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub state: SessionState,
    pub active: bool,
    pub facing_mode: FacingMode,
    pub resolution: Option<Resolution>,
    pub has_stream: bool,
}

/// How a `start` or `flip` ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// No frame arrived within the start timeout. Not reported to observers.
    TimedOut,
    /// The stream ended before delivering a frame. Not reported to observers.
    StreamEnded,
    /// The device refused; observers were notified.
    Failed(CameraError),
    /// `flip` on a session that was not active.
    Inactive,
}

impl StartOutcome {
    pub fn is_started(&self) -> bool {
        matches!(self, StartOutcome::Started)
    }
}

pub struct CameraSession {
    id: Uuid,
    config: SessionConfig,
    device: Arc<dyn CaptureDevice>,
    surface: Arc<VideoSurface>,
    facing_mode: FacingMode,
    state: SessionState,
    active: bool,
    stream: Option<MediaStream>,
    frame_buffer: FrameBuffer,
    observers: Observers,
}

impl CameraSession {
    pub fn new(
        device: Arc<dyn CaptureDevice>,
        surface: Arc<VideoSurface>,
        config: SessionConfig,
    ) -> Self {
        let id = Uuid::new_v4();
        tracing::debug!(session = %id, "camera session created");
        Self {
            id,
            config,
            device,
            surface,
            facing_mode: FacingMode::default(),
            state: SessionState::Idle,
            active: false,
            stream: None,
            frame_buffer: FrameBuffer::default(),
            observers: Observers::default(),
        }
    }

    /// Initial camera to request.
    pub fn with_facing_mode(mut self, facing_mode: FacingMode) -> Self {
        self.facing_mode = facing_mode;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// True while the session holds a stream with a live video track.
    pub fn is_active(&self) -> bool {
        self.active && self.stream.as_ref().is_some_and(MediaStream::is_live)
    }

    pub fn facing_mode(&self) -> FacingMode {
        self.facing_mode
    }

    pub fn surface(&self) -> &Arc<VideoSurface> {
        &self.surface
    }

    pub fn subscribe(&mut self, observer: Arc<dyn SessionObserver>) -> SubscriptionId {
        self.observers.subscribe(observer)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Dimensions of the frame currently on the surface.
    pub fn resolution(&self) -> Option<Resolution> {
        self.surface
            .video_dimensions()
            .map(|(width, height)| Resolution { width, height })
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            state: self.state,
            active: self.is_active(),
            facing_mode: self.facing_mode,
            resolution: self.resolution(),
            has_stream: self.stream.is_some(),
        }
    }

    /// Acquire the camera and wait for the first frame.
    ///
    /// Any stream already held is stopped first.
    pub async fn start(&mut self) -> StartOutcome {
        if self.stream.is_some() || self.active {
            self.stop();
        }

        if let Some(origin) = self.config.origin.clone() {
            if !is_secure_origin(&origin) {
                return self.fail(&DeviceFault::InsecureContext(origin));
            }
        }

        self.state = SessionState::Starting;
        let constraints = Constraints::video(
            self.facing_mode,
            self.config.ideal_width,
            self.config.ideal_height,
        );
        tracing::info!(
            session = %self.id,
            facing = %constraints.facing_mode,
            width = constraints.ideal_width,
            height = constraints.ideal_height,
            "requesting camera"
        );

        let stream = match self.device.acquire(&constraints).await {
            Ok(stream) => stream,
            Err(fault) => return self.fail(&fault),
        };

        let timeout = self.config.start_timeout;
        let stream = self.stream.insert(stream);
        self.surface.attach(stream.subscribe());

        let meta = match tokio::time::timeout(timeout, stream.ready()).await {
            Ok(Ok(meta)) => meta,
            Ok(Err(ended)) => {
                tracing::warn!(session = %self.id, error = %ended, "camera stream ended early");
                self.abandon();
                return StartOutcome::StreamEnded;
            }
            Err(_) => {
                tracing::warn!(
                    session = %self.id,
                    timeout_ms = timeout.as_millis() as u64,
                    "camera load timeout"
                );
                self.abandon();
                return StartOutcome::TimedOut;
            }
        };

        if let Err(e) = self.surface.play() {
            tracing::error!(session = %self.id, error = %e, "error playing video stream");
            return self.fail(&DeviceFault::Other(format!("error playing video stream: {e}")));
        }

        self.active = true;
        self.state = SessionState::Active;
        tracing::info!(
            session = %self.id,
            track = stream_label(self.stream.as_ref()),
            width = meta.width,
            height = meta.height,
            "camera started"
        );
        self.emit(EventKind::Start);
        StartOutcome::Started
    }

    /// Release the camera. Always succeeds; emits `stop` even when idle.
    pub fn stop(&mut self) {
        tracing::info!(session = %self.id, "stopping camera");
        self.state = SessionState::Stopping;
        self.release_stream();
        self.active = false;
        self.state = SessionState::Idle;
        self.emit(EventKind::Stop);
    }

    /// Switch to the other camera. Does nothing unless active.
    pub async fn flip(&mut self) -> StartOutcome {
        self.check_track();
        if !self.active {
            tracing::debug!(session = %self.id, "flip ignored: camera not active");
            return StartOutcome::Inactive;
        }

        self.facing_mode = self.facing_mode.toggled();
        tracing::info!(session = %self.id, facing = %self.facing_mode, "flipping camera");
        self.stop();
        self.state = SessionState::Flipping;
        tokio::time::sleep(self.config.flip_settle).await;
        self.start().await
    }

    /// Rasterize the current frame and encode it as `format`.
    ///
    /// `quality` is in [0, 1]; `None` uses the configured default.
    pub async fn capture_frame(
        &mut self,
        format: CaptureFormat,
        quality: Option<f32>,
    ) -> Result<Capture, CameraError> {
        self.check_track();
        if !self.active {
            return Err(CameraError::NotReady);
        }
        let frame = self.surface.current_frame().ok_or(CameraError::NotReady)?;
        let quality = quality.unwrap_or(self.config.default_quality);

        let image = self.frame_buffer.rasterize(&frame)?;
        tracing::debug!(
            session = %self.id,
            width = image.width(),
            height = image.height(),
            seq = frame.sequence,
            ?format,
            "frame captured"
        );

        let capture = match format {
            CaptureFormat::Blob => Capture::Blob(capture::encode_blob(image.clone(), quality).await?),
            CaptureFormat::DataUrl => Capture::DataUrl(capture::encode_data_url(image, quality)?),
            CaptureFormat::Base64 => Capture::Base64(capture::encode_base64(image, quality)?),
            CaptureFormat::Detailed => Capture::Detailed(CaptureDetails {
                data_url: capture::encode_data_url(image, quality)?,
                width: image.width(),
                height: image.height(),
                timestamp: Utc::now().timestamp_millis(),
            }),
        };
        Ok(capture)
    }

    /// Capture the current frame as JPEG bytes.
    pub async fn capture_blob(&mut self, quality: Option<f32>) -> Result<ImageBlob, CameraError> {
        match self.capture_frame(CaptureFormat::Blob, quality).await? {
            Capture::Blob(blob) => Ok(blob),
            _ => Err(CameraError::unknown("capture returned a non-binary payload")),
        }
    }

    /// Stop the camera and consume the session.
    pub fn dispose(mut self) {
        self.stop();
    }

    /// Stop an active session whose track ended, e.g. an unplugged camera.
    fn check_track(&mut self) {
        if self.active && !self.is_active() {
            tracing::warn!(
                session = %self.id,
                track = stream_label(self.stream.as_ref()),
                "camera track ended"
            );
            self.stop();
        }
    }

    fn release_stream(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.stop_all();
        }
        self.surface.detach();
    }

    /// Drop a stream that never became ready. Soft failure, no notification.
    fn abandon(&mut self) {
        self.release_stream();
        self.active = false;
        self.state = SessionState::Idle;
    }

    fn fail(&mut self, fault: &DeviceFault) -> StartOutcome {
        let error = classify(fault);
        tracing::error!(
            session = %self.id,
            category = error.category(),
            error = %fault,
            "camera start failed"
        );
        self.abandon();
        self.observers.notify_error(self.id, &error);
        StartOutcome::Failed(error)
    }

    fn emit(&self, kind: EventKind) {
        let event = SessionEvent {
            kind,
            session: self.snapshot(),
            timestamp: Utc::now(),
        };
        self.observers.emit(&event);
    }
}

fn stream_label(stream: Option<&MediaStream>) -> &str {
    stream.map_or("", |stream| stream.video_track().label())
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        if self.stream.is_some() {
            tracing::debug!(session = %self.id, "releasing camera on drop");
            self.release_stream();
        }
    }
}
