//! rollcall-hw — Hardware abstraction for camera capture.
//!
//! Defines the capture-device contract consumed by the session core,
//! the media stream handles it hands out, and a V4L2 backend.

pub mod device;
pub mod frame;
pub mod stream;
pub mod v4l2;

pub use device::{CaptureDevice, Constraints, DeviceFault, FacingMode};
pub use frame::{Frame, FrameError, PixelFormat};
pub use stream::{FrameMetadata, FrameSender, MediaStream, StreamEnded, StreamView, TrackState, VideoTrack};
pub use v4l2::{DeviceInfo, V4l2Device};
