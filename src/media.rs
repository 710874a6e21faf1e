//! Collaborator traits for local capture and remote playback
//!
//! Capture and playback live outside this crate: the UI supplies a
//! [`CaptureSource`] when joining and receives an opaque
//! [`RemoteStream`] handle per remote participant to wire into a
//! playback surface.

use crate::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Source of the local audio track, supplied by the embedding application
#[async_trait]
pub trait CaptureSource: Send + Sync {
    /// Acquire the local audio track.
    ///
    /// Called exactly once per session, before signaling connects.
    async fn acquire(&self) -> Result<Arc<dyn AudioTrack>>;
}

/// An owned handle to a locally captured audio track
pub trait AudioTrack: Send + Sync {
    /// Stable identifier of the track for logging
    fn id(&self) -> &str;

    /// Stop capture and release the device.
    ///
    /// Implementations must tolerate repeated calls.
    fn stop(&self);
}

/// An opaque handle to a remote participant's media stream.
///
/// Handed to the playback surface via
/// [`SessionEvent::ConsumerAdded`](crate::session::SessionEvent).
pub trait RemoteStream: Send + Sync {
    /// Close the stream and release any engine-side resources.
    ///
    /// Implementations must tolerate repeated calls.
    fn close(&self);
}

/// The session's single local capture, released exactly once.
///
/// Wraps the collaborator-provided track with a release guard so that
/// every exit path (leave, bootstrap failure, double leave) can call
/// [`release`](LocalCapture::release) without double-stopping.
pub struct LocalCapture {
    track: Arc<dyn AudioTrack>,
    released: AtomicBool,
}

impl LocalCapture {
    /// Wrap an acquired track
    pub fn new(track: Arc<dyn AudioTrack>) -> Self {
        Self {
            track,
            released: AtomicBool::new(false),
        }
    }

    /// The underlying track, for handing to the send transport
    pub fn track(&self) -> Arc<dyn AudioTrack> {
        Arc::clone(&self.track)
    }

    /// Stop the track. Only the first call reaches the track.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }

        debug!(track_id = %self.track.id(), "Releasing local capture");
        self.track.stop();
    }

    /// Whether the capture has been released
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}
