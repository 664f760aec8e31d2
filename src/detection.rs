//! Continuous color detection
//!
//! A single tokio task ticks at the configured frame interval. Each cycle reads the
//! session's current frame, runs the extractor and, on a sample, overwrites the last
//! known color and publishes it. The loop never looks at network state and survives
//! stream loss: cycles without a playable source simply produce nothing.

use crate::assert_invariant;
use crate::extract::{panic_message, ColorExtractor};
use crate::invariants;
use crate::presentation::Presenter;
use crate::session::{CaptureSession, StreamReady};
use crate::types::ColorSample;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// The single "last known color" slot: one writer, any number of readers
#[derive(Clone)]
pub struct ColorCell {
    tx: Arc<watch::Sender<Option<ColorSample>>>,
}

impl ColorCell {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn get(&self) -> Option<ColorSample> {
        *self.tx.borrow()
    }

    pub fn set(&self, color: ColorSample) {
        self.tx.send_replace(Some(color));
    }

    /// Receiver that wakes on every overwrite
    pub fn subscribe(&self) -> watch::Receiver<Option<ColorSample>> {
        self.tx.subscribe()
    }
}

impl Default for ColorCell {
    fn default() -> Self {
        Self::new()
    }
}

struct LoopInner {
    session: CaptureSession,
    extractor: ColorExtractor,
    color: ColorCell,
    presenter: Presenter,
    interval: Duration,
    running: AtomicBool,
    cycles: AtomicU64,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl LoopInner {
    fn cycle(&self) -> Option<ColorSample> {
        if !self.session.is_live() {
            return None;
        }
        let source = self.session.frame_source()?;
        let color = self.extractor.extract(&source)?;
        self.color.set(color);
        self.presenter.color(color);
        Some(color)
    }

    fn guarded_cycle(&self) -> Option<ColorSample> {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        match catch_unwind(AssertUnwindSafe(|| self.cycle())) {
            Ok(color) => color,
            Err(panic) => {
                log::error!("Color detection failed: {}", panic_message(panic.as_ref()));
                None
            }
        }
    }
}

/// Handle to the detection task. Clones control the same loop.
#[derive(Clone)]
pub struct DetectionLoop {
    inner: Arc<LoopInner>,
}

impl DetectionLoop {
    pub fn new(
        session: CaptureSession,
        extractor: ColorExtractor,
        color: ColorCell,
        presenter: Presenter,
        interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(LoopInner {
                session,
                extractor,
                color,
                presenter,
                interval,
                running: AtomicBool::new(false),
                cycles: AtomicU64::new(0),
                task: Mutex::new(None),
            }),
        }
    }

    /// Begin ticking. Returns `false` when the loop was already running.
    pub fn start(&self, ready: &StreamReady) -> bool {
        let (width, height) = ready.dimensions();
        assert_invariant!(
            width > 0 && height > 0,
            invariants::LOOP_STARTS_ON_READY,
            "DetectionLoop::start"
        );

        if self.inner.running.swap(true, Ordering::SeqCst) {
            log::debug!("Color detection already running");
            return false;
        }
        log::info!("Starting color detection every {:?}", self.inner.interval);

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(inner.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !inner.running.load(Ordering::SeqCst) {
                    break;
                }
                inner.guarded_cycle();
            }
        });

        let mut task = self.inner.task.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(stale) = task.replace(handle) {
            stale.abort();
        }
        true
    }

    pub fn stop(&self) {
        if self.inner.running.swap(false, Ordering::SeqCst) {
            log::info!("Stopping color detection");
        }
        let handle = self
            .inner
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Run one cycle inline. Panics inside extraction are logged and yield `None`.
    pub fn run_cycle(&self) -> Option<ColorSample> {
        self.inner.guarded_cycle()
    }

    /// Cycles attempted so far, including ones that produced nothing
    pub fn cycles(&self) -> u64 {
        self.inner.cycles.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;

    #[test]
    fn test_color_cell_overwrites() {
        let cell = ColorCell::new();
        assert_eq!(cell.get(), None);
        cell.set(ColorSample::new(1, 2, 3));
        cell.set(ColorSample::new(4, 5, 6));
        assert_eq!(cell.get(), Some(ColorSample::new(4, 5, 6)));
    }

    #[tokio::test]
    async fn test_subscribers_see_updates() {
        let cell = ColorCell::new();
        let mut rx = cell.subscribe();
        let writer = cell.clone();
        writer.set(ColorSample::new(7, 7, 7));
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), Some(ColorSample::new(7, 7, 7)));
    }

    #[test]
    fn test_panic_message_extraction() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
        let boxed: Box<dyn Any + Send> = Box::new(5u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }
}
