//! Camera capability boundary
//!
//! The host environment provides device enumeration and stream acquisition; everything
//! above this module only sees [`CameraBackend`] and the stream halves from
//! [`stream::stream_channel`].

pub mod stream;

#[cfg(feature = "native")]
pub mod native;

use crate::errors::CameraError;
use crate::types::{CaptureConstraints, DeviceDescriptor};
use async_trait::async_trait;

pub use stream::{stream_channel, FrameReader, StreamFeed, StreamHandle, StreamSignals, StreamStatus};

#[cfg(feature = "native")]
pub use native::NativeCamera;

/// Access to capture hardware
#[async_trait]
pub trait CameraBackend: Send + Sync {
    /// Query the devices currently attached
    async fn enumerate(&self) -> Result<Vec<DeviceDescriptor>, CameraError>;

    /// Open a stream on `device_id`, or on the default device when `None`.
    ///
    /// Returns once the device is open; frames may arrive later, see
    /// [`StreamSignals::ready`].
    async fn acquire(
        &self,
        device_id: Option<&str>,
        constraints: CaptureConstraints,
    ) -> Result<StreamHandle, CameraError>;
}
