//! Media stream handles.
//!
//! A [`MediaStream`] is the consumer half: it owns the video track and sees
//! the latest frame. The backend keeps the matching [`FrameSender`] and stops
//! producing once the track is stopped. Dropping the sender ends the track.

use crate::frame::Frame;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use uuid::Uuid;

type FrameSlot = Option<Arc<Frame>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    Live,
    Ended,
}

/// A video track. Clones share the same live/ended state.
#[derive(Debug, Clone)]
pub struct VideoTrack {
    label: String,
    live: Arc<AtomicBool>,
}

impl VideoTrack {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn state(&self) -> TrackState {
        if self.is_live() {
            TrackState::Live
        } else {
            TrackState::Ended
        }
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    /// Stop the track. Idempotent.
    pub fn stop(&self) {
        if self.live.swap(false, Ordering::SeqCst) {
            tracing::debug!(label = %self.label, "stopping track");
        }
    }
}

/// Pixel dimensions reported by the first frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameMetadata {
    pub width: u32,
    pub height: u32,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("stream ended before the first frame")]
pub struct StreamEnded;

/// A live video stream. Dropping it stops its track.
pub struct MediaStream {
    id: Uuid,
    track: VideoTrack,
    frames: watch::Receiver<FrameSlot>,
}

impl MediaStream {
    /// Create a stream and the sender a backend uses to feed it.
    pub fn channel(label: impl Into<String>) -> (MediaStream, FrameSender) {
        let live = Arc::new(AtomicBool::new(true));
        let (tx, rx) = watch::channel(None);
        let stream = MediaStream {
            id: Uuid::new_v4(),
            track: VideoTrack {
                label: label.into(),
                live: Arc::clone(&live),
            },
            frames: rx,
        };
        (stream, FrameSender { tx, live })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// All tracks of the stream. Streams are video-only, so this is one track.
    pub fn tracks(&self) -> &[VideoTrack] {
        std::slice::from_ref(&self.track)
    }

    pub fn video_track(&self) -> &VideoTrack {
        &self.track
    }

    /// True while at least one track is live.
    pub fn is_live(&self) -> bool {
        self.tracks().iter().any(VideoTrack::is_live)
    }

    /// Stop every track. Idempotent.
    pub fn stop_all(&self) {
        for track in self.tracks() {
            track.stop();
        }
    }

    /// Wait until a frame with non-zero dimensions is available.
    pub async fn ready(&mut self) -> Result<FrameMetadata, StreamEnded> {
        let slot = self
            .frames
            .wait_for(|slot| {
                slot.as_ref()
                    .is_some_and(|frame| frame.width > 0 && frame.height > 0)
            })
            .await
            .map_err(|_| StreamEnded)?;
        match slot.as_ref() {
            Some(frame) => Ok(FrameMetadata {
                width: frame.width,
                height: frame.height,
            }),
            None => Err(StreamEnded),
        }
    }

    pub fn latest_frame(&self) -> Option<Arc<Frame>> {
        self.frames.borrow().clone()
    }

    /// A non-owning view for render surfaces.
    pub fn subscribe(&self) -> StreamView {
        StreamView {
            id: self.id,
            track: self.track.clone(),
            frames: self.frames.clone(),
        }
    }
}

impl Drop for MediaStream {
    fn drop(&mut self) {
        self.stop_all();
    }
}

/// Read-only view of a stream. Does not keep the stream alive.
#[derive(Clone)]
pub struct StreamView {
    id: Uuid,
    track: VideoTrack,
    frames: watch::Receiver<FrameSlot>,
}

impl StreamView {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_live(&self) -> bool {
        self.track.is_live()
    }

    pub fn latest_frame(&self) -> Option<Arc<Frame>> {
        self.frames.borrow().clone()
    }
}

/// Producer half of a [`MediaStream`].
pub struct FrameSender {
    tx: watch::Sender<FrameSlot>,
    live: Arc<AtomicBool>,
}

impl FrameSender {
    /// True once the consumer stopped the track.
    pub fn is_stopped(&self) -> bool {
        !self.live.load(Ordering::SeqCst)
    }

    /// Publish a frame. Returns false if the track was stopped.
    pub fn push(&self, frame: Frame) -> bool {
        if self.is_stopped() {
            return false;
        }
        self.tx.send_replace(Some(Arc::new(frame)));
        true
    }
}

impl Drop for FrameSender {
    fn drop(&mut self) {
        self.live.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: u32, height: u32) -> Frame {
        Frame::from_rgb(vec![0u8; (width * height * 3) as usize], width, height, 0).unwrap()
    }

    #[tokio::test]
    async fn test_ready_reports_first_frame_dimensions() {
        let (mut stream, sender) = MediaStream::channel("test");
        assert!(sender.push(frame(4, 2)));
        let meta = stream.ready().await.unwrap();
        assert_eq!(meta, FrameMetadata { width: 4, height: 2 });
        assert_eq!(stream.latest_frame().unwrap().width, 4);
    }

    #[tokio::test]
    async fn test_ready_fails_when_producer_goes_away() {
        let (mut stream, sender) = MediaStream::channel("test");
        drop(sender);
        assert_eq!(stream.ready().await, Err(StreamEnded));
    }

    #[test]
    fn test_stop_all_ends_tracks_and_producer() {
        let (stream, sender) = MediaStream::channel("test");
        assert!(stream.is_live());
        stream.stop_all();
        stream.stop_all();
        assert!(!stream.is_live());
        assert_eq!(stream.video_track().state(), TrackState::Ended);
        assert!(sender.is_stopped());
        assert!(!sender.push(frame(2, 2)));
    }

    #[test]
    fn test_producer_gone_ends_track() {
        let (stream, sender) = MediaStream::channel("test");
        sender.push(frame(2, 2));
        drop(sender);
        assert!(!stream.is_live());
        assert_eq!(stream.video_track().state(), TrackState::Ended);
        assert!(stream.latest_frame().is_some());
    }

    #[test]
    fn test_drop_stops_track() {
        let (stream, sender) = MediaStream::channel("test");
        let track = stream.video_track().clone();
        drop(stream);
        assert!(!track.is_live());
        assert!(sender.is_stopped());
    }

    #[test]
    fn test_view_tracks_stream_state() {
        let (stream, sender) = MediaStream::channel("test");
        let view = stream.subscribe();
        assert_eq!(view.id(), stream.id());
        assert!(view.latest_frame().is_none());
        sender.push(frame(2, 2));
        assert_eq!(view.latest_frame().unwrap().height, 2);
        stream.stop_all();
        assert!(!view.is_live());
    }
}
