//! Render surface a session attaches its stream to.
//!
//! The surface belongs to the presentation layer and is shared with the
//! session by reference; the session only attaches, plays and detaches.

use rollcall_hw::{Frame, StreamView};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("no stream attached")]
    NoStream,
    #[error("stream has no live video track")]
    TrackEnded,
}

#[derive(Default)]
struct SurfaceState {
    stream: Option<StreamView>,
    playing: bool,
}

/// A video preview surface.
#[derive(Default)]
pub struct VideoSurface {
    state: Mutex<SurfaceState>,
}

impl VideoSurface {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SurfaceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach a stream, replacing any previous one. Playback starts paused.
    pub fn attach(&self, stream: StreamView) {
        let mut state = self.lock();
        state.stream = Some(stream);
        state.playing = false;
    }

    /// Empty the surface and pause.
    pub fn detach(&self) {
        let mut state = self.lock();
        state.stream = None;
        state.playing = false;
    }

    pub fn play(&self) -> Result<(), PlaybackError> {
        let mut state = self.lock();
        let live = match &state.stream {
            None => return Err(PlaybackError::NoStream),
            Some(stream) => stream.is_live(),
        };
        if !live {
            return Err(PlaybackError::TrackEnded);
        }
        state.playing = true;
        Ok(())
    }

    pub fn is_playing(&self) -> bool {
        self.lock().playing
    }

    pub fn has_stream(&self) -> bool {
        self.lock().stream.is_some()
    }

    pub fn stream_id(&self) -> Option<Uuid> {
        self.lock().stream.as_ref().map(StreamView::id)
    }

    /// Most recent frame of the attached stream.
    pub fn current_frame(&self) -> Option<Arc<Frame>> {
        self.lock().stream.as_ref().and_then(StreamView::latest_frame)
    }

    /// Pixel dimensions of the current frame, if any.
    pub fn video_dimensions(&self) -> Option<(u32, u32)> {
        self.current_frame()
            .map(|frame| (frame.width, frame.height))
            .filter(|&(w, h)| w > 0 && h > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_hw::MediaStream;

    fn frame() -> Frame {
        Frame::from_rgb(vec![10; 4 * 2 * 3], 4, 2, 1).unwrap()
    }

    #[test]
    fn test_play_requires_live_stream() {
        let surface = VideoSurface::new();
        assert_eq!(surface.play(), Err(PlaybackError::NoStream));

        let (stream, _sender) = MediaStream::channel("test");
        surface.attach(stream.subscribe());
        assert!(!surface.is_playing());
        assert!(surface.play().is_ok());
        assert!(surface.is_playing());

        stream.stop_all();
        assert_eq!(surface.play(), Err(PlaybackError::TrackEnded));
    }

    #[test]
    fn test_detach_empties_and_pauses() {
        let surface = VideoSurface::new();
        let (stream, sender) = MediaStream::channel("test");
        sender.push(frame());
        surface.attach(stream.subscribe());
        surface.play().unwrap();
        assert_eq!(surface.video_dimensions(), Some((4, 2)));
        assert_eq!(surface.stream_id(), Some(stream.id()));

        surface.detach();
        assert!(!surface.has_stream());
        assert!(!surface.is_playing());
        assert!(surface.current_frame().is_none());
        assert_eq!(surface.video_dimensions(), None);
    }

    #[test]
    fn test_dimensions_absent_before_first_frame() {
        let surface = VideoSurface::new();
        let (stream, _sender) = MediaStream::channel("test");
        surface.attach(stream.subscribe());
        assert_eq!(surface.video_dimensions(), None);
    }
}
