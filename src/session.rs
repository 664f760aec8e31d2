//! Capture session: owner of zero or one live camera stream
//!
//! `select` always releases the current stream before asking the backend for a new one.
//! Each acquired stream gets a watcher task that reports readiness and, when the source
//! terminates on its own, re-selects the same device after the reconnect delay. Every
//! acquisition bumps a generation counter so watchers of replaced streams stay silent.

use crate::assert_invariant;
use crate::config::CameraConfig;
use crate::errors::CameraError;
use crate::invariants;
use crate::platform::{CameraBackend, FrameReader, StreamHandle, StreamSignals, StreamStatus};
use crate::types::CaptureConstraints;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No stream has been acquired, or the last acquisition failed
    Empty,
    Live { device_id: Option<String> },
    /// The source terminated; a reconnect may be pending
    Ended { device_id: Option<String> },
}

/// Proof that a stream produced its first frame. Only the session creates these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamReady {
    device_id: Option<String>,
    width: u32,
    height: u32,
    generation: u64,
}

impl StreamReady {
    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Ready(StreamReady),
    Disconnected { device_id: Option<String> },
    Failed { device_id: Option<String>, error: CameraError },
}

struct Active {
    generation: u64,
    handle: StreamHandle,
}

#[derive(Default)]
struct Slot {
    active_device: Option<String>,
    stream: Option<Active>,
    ended: bool,
}

struct Inner {
    backend: Arc<dyn CameraBackend>,
    constraints: CaptureConstraints,
    reconnect_delay: Duration,
    select_lock: tokio::sync::Mutex<()>,
    slot: Mutex<Slot>,
    generation: AtomicU64,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl Inner {
    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

#[derive(Clone)]
pub struct CaptureSession {
    inner: Arc<Inner>,
}

impl CaptureSession {
    pub fn new(
        backend: Arc<dyn CameraBackend>,
        config: &CameraConfig,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let session = Self {
            inner: Arc::new(Inner {
                backend,
                constraints: config.constraints(),
                reconnect_delay: config.reconnect_delay(),
                select_lock: tokio::sync::Mutex::new(()),
                slot: Mutex::new(Slot::default()),
                generation: AtomicU64::new(0),
                events,
            }),
        };
        (session, rx)
    }

    /// Switch to `device_id` (`None` = default device).
    ///
    /// The current stream is released before the new one is requested. On failure no
    /// stream is held and a [`SessionEvent::Failed`] is emitted alongside the error.
    pub async fn select(&self, device_id: Option<String>) -> Result<(), CameraError> {
        let serialized = self.inner.select_lock.lock().await;
        self.select_locked(&serialized, device_id).await
    }

    /// Select only if no other select or release ran since `expected`.
    /// The check happens under the select lock, so a concurrent manual select always wins.
    async fn select_if_generation(
        &self,
        expected: u64,
        device_id: Option<String>,
    ) -> Option<Result<(), CameraError>> {
        let serialized = self.inner.select_lock.lock().await;
        if self.generation() != expected {
            return None;
        }
        Some(self.select_locked(&serialized, device_id).await)
    }

    async fn select_locked(
        &self,
        _serialized: &tokio::sync::MutexGuard<'_, ()>,
        device_id: Option<String>,
    ) -> Result<(), CameraError> {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;

        {
            let mut slot = self.inner.slot();
            if let Some(previous) = slot.stream.take() {
                previous.handle.release();
                log::info!(
                    "Released stream {} ({})",
                    previous.handle.id(),
                    describe(previous.handle.device_id())
                );
            }
            assert_invariant!(
                slot.stream.is_none(),
                invariants::SINGLE_LIVE_STREAM,
                "CaptureSession::select"
            );
        }

        log::info!("Acquiring camera {}", describe(device_id.as_deref()));
        match self
            .inner
            .backend
            .acquire(device_id.as_deref(), self.inner.constraints)
            .await
        {
            Ok(handle) => {
                let signals = handle.signals();
                {
                    let mut slot = self.inner.slot();
                    slot.active_device = device_id.clone();
                    slot.ended = false;
                    slot.stream = Some(Active { generation, handle });
                }
                self.spawn_watcher(generation, signals, device_id);
                Ok(())
            }
            Err(error) => {
                log::warn!(
                    "Failed to acquire camera {}: {}",
                    describe(device_id.as_deref()),
                    error
                );
                self.inner.slot().ended = false;
                self.inner.emit(SessionEvent::Failed {
                    device_id,
                    error: error.clone(),
                });
                Err(error)
            }
        }
    }

    /// Drop the current stream without scheduling a reconnect
    pub async fn release(&self) {
        let _serialized = self.inner.select_lock.lock().await;
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        let mut slot = self.inner.slot();
        slot.ended = false;
        if let Some(active) = slot.stream.take() {
            active.handle.release();
            log::info!("Released stream {}", active.handle.id());
        }
    }

    pub fn state(&self) -> SessionState {
        let slot = self.inner.slot();
        match &slot.stream {
            Some(active) if active.handle.status() != StreamStatus::Ended => SessionState::Live {
                device_id: slot.active_device.clone(),
            },
            Some(_) => SessionState::Ended {
                device_id: slot.active_device.clone(),
            },
            None if slot.ended => SessionState::Ended {
                device_id: slot.active_device.clone(),
            },
            None => SessionState::Empty,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self.state(), SessionState::Live { .. })
    }

    /// Device of the last successful acquisition
    pub fn active_device(&self) -> Option<String> {
        self.inner.slot().active_device.clone()
    }

    /// Reader over the live stream's frames
    pub fn frame_source(&self) -> Option<FrameReader> {
        let slot = self.inner.slot();
        slot.stream
            .as_ref()
            .filter(|active| active.handle.status() != StreamStatus::Ended)
            .map(|active| active.handle.reader())
    }

    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    /// Forget the stream of `generation` after its source ended. False if it was already replaced.
    fn mark_terminated(&self, generation: u64) -> bool {
        let mut slot = self.inner.slot();
        match slot.stream.as_ref() {
            Some(active) if active.generation == generation => {
                if let Some(active) = slot.stream.take() {
                    active.handle.release();
                }
                slot.ended = true;
                true
            }
            _ => false,
        }
    }

    fn spawn_watcher(&self, generation: u64, mut signals: StreamSignals, device_id: Option<String>) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            if let Some((width, height)) = signals.ready().await {
                let Some(inner) = weak.upgrade() else { return };
                if inner.generation.load(Ordering::SeqCst) == generation {
                    log::info!(
                        "Camera {} ready at {}x{}",
                        describe(device_id.as_deref()),
                        width,
                        height
                    );
                    inner.emit(SessionEvent::Ready(StreamReady {
                        device_id: device_id.clone(),
                        width,
                        height,
                        generation,
                    }));
                }
            }

            signals.ended().await;

            let Some(inner) = weak.upgrade() else { return };
            let session = CaptureSession { inner };
            if !session.mark_terminated(generation) {
                return;
            }

            log::warn!(
                "Camera {} disconnected, reconnecting in {:?}",
                describe(device_id.as_deref()),
                session.inner.reconnect_delay
            );
            session.inner.emit(SessionEvent::Disconnected {
                device_id: device_id.clone(),
            });

            tokio::time::sleep(session.inner.reconnect_delay).await;

            match session.select_if_generation(generation, device_id.clone()).await {
                None => log::debug!("Reconnect to {} superseded", describe(device_id.as_deref())),
                Some(Err(e)) => {
                    log::warn!("Reconnect to {} failed: {}", describe(device_id.as_deref()), e)
                }
                Some(Ok(())) => {}
            }
        });
    }
}

fn describe(device_id: Option<&str>) -> &str {
    device_id.unwrap_or("<default>")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{AcquireOutcome, SyntheticCamera};
    use crate::types::ColorSample;

    fn session_for(camera: &SyntheticCamera) -> (CaptureSession, mpsc::UnboundedReceiver<SessionEvent>) {
        CaptureSession::new(Arc::new(camera.clone()), &CameraConfig::default())
    }

    #[tokio::test]
    async fn test_select_goes_live_and_reports_ready() {
        let camera = SyntheticCamera::with_device("cam-a", ColorSample::new(5, 6, 7));
        let (session, mut events) = session_for(&camera);
        assert_eq!(session.state(), SessionState::Empty);

        session.select(Some("cam-a".to_string())).await.unwrap();
        assert_eq!(
            session.state(),
            SessionState::Live {
                device_id: Some("cam-a".to_string())
            }
        );

        match events.recv().await {
            Some(SessionEvent::Ready(ready)) => {
                assert_eq!(ready.device_id(), Some("cam-a"));
                assert_eq!(ready.dimensions(), (320, 240));
            }
            other => panic!("expected ready, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_select_reports_typed_error() {
        let camera = SyntheticCamera::with_device("cam-a", ColorSample::new(5, 6, 7));
        camera.script("cam-a", AcquireOutcome::AccessDenied);
        let (session, mut events) = session_for(&camera);

        let err = session.select(Some("cam-a".to_string())).await.unwrap_err();
        assert!(matches!(err, CameraError::AccessDenied(_)));
        assert_eq!(session.state(), SessionState::Empty);
        assert!(matches!(
            events.recv().await,
            Some(SessionEvent::Failed { error: CameraError::AccessDenied(_), .. })
        ));
    }

    #[tokio::test]
    async fn test_swap_releases_previous_first() {
        let camera = SyntheticCamera::new();
        camera.add_device("cam-a", "A", ColorSample::new(1, 1, 1));
        camera.add_device("cam-b", "B", ColorSample::new(2, 2, 2));
        let (session, _events) = session_for(&camera);

        session.select(Some("cam-a".to_string())).await.unwrap();
        session.select(Some("cam-b".to_string())).await.unwrap();
        session.select(Some("cam-a".to_string())).await.unwrap();

        assert_eq!(camera.live_streams(), 1);
        assert_eq!(camera.max_concurrent_streams(), 1);
        assert_eq!(session.active_device().as_deref(), Some("cam-a"));
    }

    #[tokio::test]
    async fn test_release_stops_stream_without_reconnect() {
        let camera = SyntheticCamera::with_device("cam-a", ColorSample::new(1, 1, 1));
        let (session, _events) = session_for(&camera);
        session.select(Some("cam-a".to_string())).await.unwrap();

        session.release().await;
        assert_eq!(camera.live_streams(), 0);
        assert!(session.frame_source().is_none());
        assert_eq!(session.state(), SessionState::Empty);
    }

    #[tokio::test]
    async fn test_conditional_select_rechecks_generation_under_lock() {
        let camera = SyntheticCamera::new();
        camera.add_device("cam-a", "A", ColorSample::new(1, 1, 1));
        camera.add_device("cam-b", "B", ColorSample::new(2, 2, 2));
        let (session, _events) = session_for(&camera);
        session.select(Some("cam-a".to_string())).await.unwrap();
        let stale = session.generation();

        // Reconnect passes its early check, then queues behind a manual select
        let guard = session.inner.select_lock.lock().await;
        let reconnect = tokio::spawn({
            let session = session.clone();
            async move {
                session
                    .select_if_generation(stale, Some("cam-a".to_string()))
                    .await
            }
        });
        tokio::task::yield_now().await;
        let manual = session.select_locked(&guard, Some("cam-b".to_string())).await;
        drop(guard);
        manual.unwrap();

        assert!(reconnect.await.unwrap().is_none());
        assert_eq!(session.active_device().as_deref(), Some("cam-b"));
        assert_eq!(camera.acquisitions_of("cam-a").len(), 1);
        assert_eq!(camera.live_streams(), 1);
    }

    #[tokio::test]
    async fn test_conditional_select_runs_when_current() {
        let camera = SyntheticCamera::with_device("cam-a", ColorSample::new(1, 1, 1));
        let (session, _events) = session_for(&camera);
        let current = session.generation();

        let result = session
            .select_if_generation(current, Some("cam-a".to_string()))
            .await;
        assert!(matches!(result, Some(Ok(()))));
        assert!(session.is_live());
    }
}
