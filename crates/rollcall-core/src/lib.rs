//! rollcall-core — Camera session engine.
//!
//! Owns acquisition, release and re-acquisition of a capture device,
//! rasterizes still frames for upload, and reports lifecycle events and
//! classified device errors to registered observers.

pub mod capture;
pub mod error;
pub mod events;
pub mod origin;
pub mod session;
pub mod surface;

pub use capture::{Capture, CaptureDetails, CaptureFormat, FrameBuffer, ImageBlob};
pub use error::{classify, CameraError};
pub use events::{EventKind, SessionEvent, SessionObserver, SubscriptionId};
pub use session::{
    CameraSession, Resolution, SessionConfig, SessionSnapshot, SessionState, StartOutcome,
};
pub use surface::VideoSurface;

pub use rollcall_hw::{CaptureDevice, Constraints, DeviceFault, FacingMode};
