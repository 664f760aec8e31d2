//! Test doubles for huemirror
//!
//! [`SyntheticCamera`] stands in for capture hardware and [`RecordingBulb`] for the
//! bulb endpoint, so the whole pipeline can run offline and under paused tokio time.

use crate::bulb::{BulbClient, BulbReply};
use crate::errors::{CameraError, ExtractFault, SubmissionError};
use crate::extract::ColorStrategy;
use crate::platform::{stream_channel, CameraBackend, StreamFeed, StreamHandle};
use crate::types::{CaptureConstraints, ColorSample, DeviceDescriptor, VideoFrame};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Packed RGB24 frame filled with one color
pub fn solid_frame(width: u32, height: u32, color: ColorSample) -> VideoFrame {
    let data = [color.red, color.green, color.blue].repeat(width as usize * height as usize);
    VideoFrame::new(data, width, height)
}

/// Frame whose pixels left of `split_x` are `left` and the rest `right`
pub fn split_frame(
    width: u32,
    height: u32,
    split_x: u32,
    left: ColorSample,
    right: ColorSample,
) -> VideoFrame {
    let mut data = Vec::with_capacity(width as usize * height as usize * 3);
    for _ in 0..height {
        for x in 0..width {
            let c = if x < split_x { left } else { right };
            data.extend_from_slice(&[c.red, c.green, c.blue]);
        }
    }
    VideoFrame::new(data, width, height)
}

/// Horizontal/vertical gradient, different on every `seed`
pub fn gradient_frame(width: u32, height: u32, seed: u8) -> VideoFrame {
    let mut data = Vec::with_capacity(width as usize * height as usize * 3);
    for y in 0..height {
        for x in 0..width {
            data.push(seed.wrapping_add((x % 256) as u8));
            data.push(seed.wrapping_add((y % 256) as u8));
            data.push(seed.wrapping_add(((x + y) % 256) as u8));
        }
    }
    VideoFrame::new(data, width, height)
}

/// Strategy that faults on every frame
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingStrategy;

impl ColorStrategy for FailingStrategy {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn extract(&self, _frame: &VideoFrame) -> Result<ColorSample, ExtractFault> {
        Err(ExtractFault::NoSamples)
    }
}

/// Strategy that panics, for exercising cycle isolation
#[derive(Debug, Clone, Copy, Default)]
pub struct PanickingStrategy;

impl ColorStrategy for PanickingStrategy {
    fn name(&self) -> &'static str {
        "panicking"
    }

    fn extract(&self, _frame: &VideoFrame) -> Result<ColorSample, ExtractFault> {
        panic!("extraction exploded")
    }
}

/// What [`SyntheticCamera`] does when a device is acquired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// Open and deliver a frame right away
    Stream,
    /// Open but never deliver a frame
    Silent,
    AccessDenied,
    NotFound,
    Failure,
}

/// One acquisition attempt, successful or not
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acquisition {
    pub device_id: Option<String>,
    pub at: Instant,
}

struct SyntheticDevice {
    descriptor: DeviceDescriptor,
    color: ColorSample,
    outcome: AcquireOutcome,
}

struct LiveFeed {
    device_id: String,
    feed: StreamFeed,
}

struct CameraState {
    devices: Vec<SyntheticDevice>,
    enumeration_denied: Option<String>,
    feeds: Vec<LiveFeed>,
    max_live: usize,
    acquisitions: Vec<Acquisition>,
    frame_size: (u32, u32),
}

impl CameraState {
    fn prune(&mut self) {
        self.feeds.retain(|live| !live.feed.is_released());
    }
}

/// Scriptable in-memory camera backend. Clones share state.
#[derive(Clone)]
pub struct SyntheticCamera {
    state: Arc<Mutex<CameraState>>,
}

impl Default for SyntheticCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntheticCamera {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(CameraState {
                devices: Vec::new(),
                enumeration_denied: None,
                feeds: Vec::new(),
                max_live: 0,
                acquisitions: Vec::new(),
                frame_size: (320, 240),
            })),
        }
    }

    /// A camera with a single device showing `color`
    pub fn with_device(id: &str, color: ColorSample) -> Self {
        let camera = Self::new();
        camera.add_device(id, &format!("Synthetic {}", id), color);
        camera
    }

    fn state(&self) -> MutexGuard<'_, CameraState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_device(&self, id: &str, label: &str, color: ColorSample) {
        self.state().devices.push(SyntheticDevice {
            descriptor: DeviceDescriptor::new(id, label),
            color,
            outcome: AcquireOutcome::Stream,
        });
    }

    pub fn remove_device(&self, id: &str) {
        self.state().devices.retain(|d| d.descriptor.id != id);
    }

    pub fn deny_enumeration(&self, cause: &str) {
        self.state().enumeration_denied = Some(cause.to_string());
    }

    pub fn allow_enumeration(&self) {
        self.state().enumeration_denied = None;
    }

    /// Set what later acquisitions of `id` do
    pub fn script(&self, id: &str, outcome: AcquireOutcome) {
        if let Some(device) = self.state().devices.iter_mut().find(|d| d.descriptor.id == id) {
            device.outcome = outcome;
        }
    }

    pub fn set_frame_size(&self, width: u32, height: u32) {
        self.state().frame_size = (width, height);
    }

    /// Change what `id` shows; live streams of it get a new frame immediately
    pub fn set_color(&self, id: &str, color: ColorSample) {
        let mut state = self.state();
        let (width, height) = state.frame_size;
        if let Some(device) = state.devices.iter_mut().find(|d| d.descriptor.id == id) {
            device.color = color;
        }
        for live in state.feeds.iter().filter(|live| live.device_id == id) {
            live.feed.push_frame(solid_frame(width, height, color));
        }
    }

    /// Deliver `frame` on every live stream of `id`
    pub fn push_frame(&self, id: &str, frame: VideoFrame) {
        let state = self.state();
        for live in state.feeds.iter().filter(|live| live.device_id == id) {
            live.feed.push_frame(frame.clone());
        }
    }

    /// Simulate the device going away: end its live streams. Returns how many ended.
    pub fn drop_stream(&self, id: &str) -> usize {
        let mut state = self.state();
        state.prune();
        let (ended, kept): (Vec<LiveFeed>, Vec<LiveFeed>) = std::mem::take(&mut state.feeds)
            .into_iter()
            .partition(|live| live.device_id == id);
        state.feeds = kept;
        for live in &ended {
            live.feed.end();
        }
        ended.len()
    }

    /// Streams acquired and not yet released or ended
    pub fn live_streams(&self) -> usize {
        let mut state = self.state();
        state.prune();
        state.feeds.len()
    }

    pub fn max_concurrent_streams(&self) -> usize {
        self.state().max_live
    }

    pub fn acquisitions(&self) -> Vec<Acquisition> {
        self.state().acquisitions.clone()
    }

    pub fn acquisitions_of(&self, id: &str) -> Vec<Instant> {
        self.state()
            .acquisitions
            .iter()
            .filter(|a| a.device_id.as_deref() == Some(id))
            .map(|a| a.at)
            .collect()
    }
}

#[async_trait]
impl CameraBackend for SyntheticCamera {
    async fn enumerate(&self) -> Result<Vec<DeviceDescriptor>, CameraError> {
        let state = self.state();
        if let Some(cause) = &state.enumeration_denied {
            return Err(CameraError::EnumerationError(cause.clone()));
        }
        Ok(state.devices.iter().map(|d| d.descriptor.clone()).collect())
    }

    async fn acquire(
        &self,
        device_id: Option<&str>,
        _constraints: CaptureConstraints,
    ) -> Result<StreamHandle, CameraError> {
        let mut state = self.state();
        state.acquisitions.push(Acquisition {
            device_id: device_id.map(str::to_string),
            at: Instant::now(),
        });
        state.prune();

        let device = match device_id {
            Some(id) => state.devices.iter().find(|d| d.descriptor.id == id),
            None => state.devices.first(),
        }
        .ok_or_else(|| {
            CameraError::DeviceNotFound(format!(
                "no synthetic device {}",
                device_id.unwrap_or("<default>")
            ))
        })?;

        let resolved_id = device.descriptor.id.clone();
        let color = device.color;
        let outcome = device.outcome;
        match outcome {
            AcquireOutcome::AccessDenied => {
                return Err(CameraError::AccessDenied("NotAllowedError".to_string()))
            }
            AcquireOutcome::NotFound => {
                return Err(CameraError::DeviceNotFound("NotFoundError".to_string()))
            }
            AcquireOutcome::Failure => {
                return Err(CameraError::GenericCaptureError("device busy".to_string()))
            }
            AcquireOutcome::Stream | AcquireOutcome::Silent => {}
        }

        let (feed, handle) = stream_channel(device_id.map(str::to_string));
        if outcome == AcquireOutcome::Stream {
            let (width, height) = state.frame_size;
            feed.push_frame(solid_frame(width, height, color));
        }

        state.feeds.push(LiveFeed {
            device_id: resolved_id,
            feed,
        });
        state.max_live = state.max_live.max(state.feeds.len());
        Ok(handle)
    }
}

struct BulbState {
    submissions: Vec<(ColorSample, Instant)>,
    scripted: VecDeque<SubmissionError>,
    always: Option<SubmissionError>,
    latency: Duration,
    message: Option<String>,
}

/// Bulb client that records every submission. Clones share state.
#[derive(Clone)]
pub struct RecordingBulb {
    state: Arc<Mutex<BulbState>>,
}

impl Default for RecordingBulb {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingBulb {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BulbState {
                submissions: Vec::new(),
                scripted: VecDeque::new(),
                always: None,
                latency: Duration::ZERO,
                message: Some("Color set successfully".to_string()),
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, BulbState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail the next submission with `error`
    pub fn fail_next(&self, error: SubmissionError) {
        self.state().scripted.push_back(error);
    }

    /// Fail every submission until [`RecordingBulb::recover`]
    pub fn fail_always(&self, error: SubmissionError) {
        self.state().always = Some(error);
    }

    pub fn recover(&self) {
        let mut state = self.state();
        state.always = None;
        state.scripted.clear();
    }

    pub fn set_latency(&self, latency: Duration) {
        self.state().latency = latency;
    }

    /// Message carried by successful replies; `None` mimics a server that sends none
    pub fn set_reply_message(&self, message: Option<&str>) {
        self.state().message = message.map(str::to_string);
    }

    pub fn submissions(&self) -> Vec<ColorSample> {
        self.state().submissions.iter().map(|(c, _)| *c).collect()
    }

    pub fn submission_times(&self) -> Vec<Instant> {
        self.state().submissions.iter().map(|(_, at)| *at).collect()
    }

    pub fn count(&self) -> usize {
        self.state().submissions.len()
    }
}

#[async_trait]
impl BulbClient for RecordingBulb {
    fn describe(&self) -> String {
        "recording bulb".to_string()
    }

    async fn submit(&self, color: ColorSample) -> Result<BulbReply, SubmissionError> {
        let latency = {
            let mut state = self.state();
            state.submissions.push((color, Instant::now()));
            state.latency
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state();
        if let Some(error) = state.scripted.pop_front() {
            return Err(error);
        }
        if let Some(error) = &state.always {
            return Err(error.clone());
        }
        Ok(BulbReply {
            message: state.message.clone(),
        })
    }
}
