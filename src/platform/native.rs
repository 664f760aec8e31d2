//! Real cameras through nokhwa
//!
//! nokhwa cameras are not `Send` on every platform, so each acquired stream lives on its
//! own capture thread: the camera is opened there, frames are pushed into the
//! [`StreamFeed`], and the thread stops the hardware once the session releases the
//! handle or the device stops delivering.

use super::{stream_channel, CameraBackend, StreamFeed, StreamHandle};
use crate::errors::CameraError;
use crate::types::{CaptureConstraints, DeviceDescriptor, VideoFrame};
use async_trait::async_trait;
use nokhwa::{
    pixel_format::RgbFormat,
    query,
    utils::{
        ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
        Resolution,
    },
    Camera,
};
use tokio::sync::oneshot;

/// Consecutive failed reads after which the device is considered gone
const MAX_READ_FAILURES: u32 = 5;

#[derive(Debug, Default, Clone, Copy)]
pub struct NativeCamera;

impl NativeCamera {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CameraBackend for NativeCamera {
    async fn enumerate(&self) -> Result<Vec<DeviceDescriptor>, CameraError> {
        tokio::task::spawn_blocking(list_cameras)
            .await
            .map_err(|e| CameraError::EnumerationError(format!("Task join error: {}", e)))?
    }

    async fn acquire(
        &self,
        device_id: Option<&str>,
        constraints: CaptureConstraints,
    ) -> Result<StreamHandle, CameraError> {
        let index = match device_id {
            Some(id) => id
                .parse::<u32>()
                .map_err(|_| CameraError::DeviceNotFound(format!("invalid device id {}", id)))?,
            None => 0,
        };

        let known = self.enumerate().await?;
        if !known.iter().any(|d| d.id == index.to_string()) {
            return Err(CameraError::DeviceNotFound(format!("no camera at index {}", index)));
        }

        let (feed, handle) = stream_channel(device_id.map(str::to_string));
        let (opened_tx, opened_rx) = oneshot::channel();

        std::thread::Builder::new()
            .name(format!("huemirror-capture-{}", index))
            .spawn(move || capture_thread(index, constraints, feed, opened_tx))
            .map_err(|e| CameraError::GenericCaptureError(format!("spawn failed: {}", e)))?;

        opened_rx.await.map_err(|_| {
            CameraError::GenericCaptureError("capture thread exited before opening".to_string())
        })??;

        log::info!("Acquired native camera {}", index);
        Ok(handle)
    }
}

fn list_cameras() -> Result<Vec<DeviceDescriptor>, CameraError> {
    let cameras = query(ApiBackend::Auto)
        .map_err(|e| CameraError::EnumerationError(format!("Failed to query cameras: {}", e)))?;

    Ok(cameras
        .into_iter()
        .map(|info| DeviceDescriptor::new(info.index().to_string(), info.human_name()))
        .collect())
}

fn classify_open_error(message: String) -> CameraError {
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized")
    {
        CameraError::AccessDenied(message)
    } else if lower.contains("not found") || lower.contains("no such") {
        CameraError::DeviceNotFound(message)
    } else {
        CameraError::GenericCaptureError(message)
    }
}

fn open_camera(index: u32, constraints: CaptureConstraints) -> Result<Camera, CameraError> {
    let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
        CameraFormat::new(
            Resolution::new(constraints.ideal_width, constraints.ideal_height),
            FrameFormat::MJPEG,
            30,
        ),
    ));

    let mut camera = Camera::new(CameraIndex::Index(index), requested)
        .map_err(|e| classify_open_error(e.to_string()))?;
    camera
        .open_stream()
        .map_err(|e| classify_open_error(e.to_string()))?;
    Ok(camera)
}

fn capture_thread(
    index: u32,
    constraints: CaptureConstraints,
    feed: StreamFeed,
    opened: oneshot::Sender<Result<(), CameraError>>,
) {
    let mut camera = match open_camera(index, constraints) {
        Ok(camera) => camera,
        Err(e) => {
            let _ = opened.send(Err(e));
            return;
        }
    };
    if opened.send(Ok(())).is_err() {
        // Acquisition was abandoned by the caller
        let _ = camera.stop_stream();
        return;
    }

    let mut failures = 0;
    while !feed.is_released() {
        match read_frame(&mut camera) {
            Ok(frame) => {
                failures = 0;
                if !feed.push_frame(frame) {
                    break;
                }
            }
            Err(e) => {
                failures += 1;
                log::warn!("Camera {} read failed ({}/{}): {}", index, failures, MAX_READ_FAILURES, e);
                if failures >= MAX_READ_FAILURES {
                    feed.end();
                    break;
                }
            }
        }
    }

    if let Err(e) = camera.stop_stream() {
        log::warn!("Failed to stop camera {}: {}", index, e);
    }
    log::debug!("Capture thread for camera {} finished", index);
}

/// Grab one frame as packed RGB24. nokhwa may hand back MJPEG even when RGB was requested.
fn read_frame(camera: &mut Camera) -> Result<VideoFrame, String> {
    let buffer = camera.frame().map_err(|e| e.to_string())?;
    let width = buffer.resolution().width_x;
    let height = buffer.resolution().height_y;
    let raw = buffer.buffer_bytes();

    if raw.starts_with(&[0xFF, 0xD8, 0xFF]) {
        let decoded = image::load_from_memory(&raw)
            .map_err(|e| format!("Failed to decode MJPEG: {}", e))?
            .to_rgb8();
        let (width, height) = decoded.dimensions();
        return Ok(VideoFrame::new(decoded.into_raw(), width, height));
    }

    Ok(VideoFrame::new(raw.to_vec(), width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_errors_are_classified() {
        assert!(matches!(
            classify_open_error("Permission denied (os error 13)".to_string()),
            CameraError::AccessDenied(_)
        ));
        assert!(matches!(
            classify_open_error("No such device".to_string()),
            CameraError::DeviceNotFound(_)
        ));
        assert!(matches!(
            classify_open_error("device busy".to_string()),
            CameraError::GenericCaptureError(_)
        ));
    }
}
