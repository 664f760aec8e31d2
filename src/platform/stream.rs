//! Live stream plumbing between a camera backend and the capture session
//!
//! [`stream_channel`] yields two halves: the backend keeps the [`StreamFeed`] and pushes
//! decoded frames into it; the session owns the [`StreamHandle`]. Readiness and
//! termination are plain awaitables on [`StreamSignals`], and releasing the handle (or
//! dropping it) tells the backend to return the hardware.

use crate::extract::FrameSource;
use crate::types::VideoFrame;
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    /// Acquired, no frame delivered yet
    Starting,
    /// Frames are flowing at the given size
    Playing { width: u32, height: u32 },
    /// The source terminated (unplugged, permission revoked, backend gone)
    Ended,
}

type LatestFrame = Option<Arc<VideoFrame>>;

/// Create the two ends of a live stream for `device_id` (`None` = default device)
pub fn stream_channel(device_id: Option<String>) -> (StreamFeed, StreamHandle) {
    let id = Uuid::new_v4();
    let (frame_tx, frame_rx) = watch::channel::<LatestFrame>(None);
    let (status_tx, status_rx) = watch::channel(StreamStatus::Starting);
    let (release_tx, release_rx) = watch::channel(false);

    let feed = StreamFeed {
        id,
        device_id: device_id.clone(),
        frames: frame_tx,
        status: status_tx,
        released: release_rx,
    };
    let handle = StreamHandle {
        id,
        device_id,
        frames: frame_rx,
        status: status_rx,
        release: release_tx,
    };
    (feed, handle)
}

/// Producer side, held by the backend
pub struct StreamFeed {
    id: Uuid,
    device_id: Option<String>,
    frames: watch::Sender<LatestFrame>,
    status: watch::Sender<StreamStatus>,
    released: watch::Receiver<bool>,
}

impl StreamFeed {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    /// Publish a frame. Returns `false` once the stream was released or has ended.
    pub fn push_frame(&self, frame: VideoFrame) -> bool {
        if self.is_released() || *self.status.borrow() == StreamStatus::Ended {
            return false;
        }

        let playing = StreamStatus::Playing {
            width: frame.width,
            height: frame.height,
        };
        self.frames
            .send_replace(Some(Arc::new(frame.with_device(self.device_id.clone()))));
        self.status.send_if_modified(|status| {
            if *status != playing {
                *status = playing;
                true
            } else {
                false
            }
        });
        true
    }

    /// Signal that the source terminated on its own
    pub fn end(&self) {
        log::debug!("Stream {} ended by source", self.id);
        self.status.send_replace(StreamStatus::Ended);
    }

    pub fn is_released(&self) -> bool {
        *self.released.borrow()
    }

    /// Resolve once the session released the stream
    pub async fn wait_released(&mut self) {
        let _ = self.released.wait_for(|released| *released).await;
    }
}

/// Consumer side, owned by the capture session
pub struct StreamHandle {
    id: Uuid,
    device_id: Option<String>,
    frames: watch::Receiver<LatestFrame>,
    status: watch::Receiver<StreamStatus>,
    release: watch::Sender<bool>,
}

impl StreamHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    pub fn status(&self) -> StreamStatus {
        *self.status.borrow()
    }

    pub fn reader(&self) -> FrameReader {
        FrameReader {
            frames: self.frames.clone(),
            status: self.status.clone(),
        }
    }

    pub fn signals(&self) -> StreamSignals {
        StreamSignals {
            status: self.status.clone(),
        }
    }

    /// Return the stream to the backend. Idempotent.
    pub fn release(&self) {
        if !self.release.send_replace(true) {
            log::debug!("Released stream {}", self.id);
        }
    }

    pub fn is_released(&self) -> bool {
        *self.release.borrow()
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// Awaitable lifecycle signals of one stream
#[derive(Clone)]
pub struct StreamSignals {
    status: watch::Receiver<StreamStatus>,
}

impl StreamSignals {
    /// Wait until frames flow. `None` if the stream ended first.
    pub async fn ready(&mut self) -> Option<(u32, u32)> {
        let status = self
            .status
            .wait_for(|s| !matches!(s, StreamStatus::Starting))
            .await
            .map(|s| *s);

        match status {
            Ok(StreamStatus::Playing { width, height }) => Some((width, height)),
            _ => None,
        }
    }

    /// Wait for termination. A backend that vanished counts as terminated.
    pub async fn ended(&mut self) {
        let _ = self
            .status
            .wait_for(|s| *s == StreamStatus::Ended)
            .await;
    }
}

/// Read access to the most recent frame of a stream
#[derive(Clone)]
pub struct FrameReader {
    frames: watch::Receiver<LatestFrame>,
    status: watch::Receiver<StreamStatus>,
}

impl FrameSource for FrameReader {
    fn dimensions(&self) -> (u32, u32) {
        match *self.status.borrow() {
            StreamStatus::Playing { width, height } => (width, height),
            _ => (0, 0),
        }
    }

    fn is_playing(&self) -> bool {
        matches!(*self.status.borrow(), StreamStatus::Playing { .. })
            && self.frames.borrow().is_some()
    }

    fn current_frame(&self) -> Option<Arc<VideoFrame>> {
        self.frames.borrow().clone()
    }
}
