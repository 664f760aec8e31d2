//! Manual and periodic color submission
//!
//! All submissions go through one in-flight gate: a trigger that arrives while another
//! submission is outstanding is dropped, never queued. Auto mode is a ticker task whose
//! presence is the enabled flag; each tick hands its submission to a separate task so
//! disabling auto mode stops future ticks without cancelling a request already on the
//! wire.

use crate::assert_invariant;
use crate::bulb::BulbClient;
use crate::detection::ColorCell;
use crate::invariants;
use crate::presentation::{Presenter, SendControl, UiEvent};
use crate::types::ColorSample;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

pub const NO_COLOR_MESSAGE: &str = "No color detected yet";
pub const DEFAULT_SUCCESS_MESSAGE: &str = "Color sent successfully";

/// Result of one trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Delivered; carries the status text shown
    Sent(String),
    /// Refused or unreachable; carries the status text shown
    Failed(String),
    /// Nothing detected yet, no request made
    NoColor,
    /// Another submission was in flight, trigger dropped
    Busy,
}

/// Clears the in-flight flag when the submission finishes or is cancelled
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| InFlight(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct AutoState {
    enabled: bool,
    timer: Option<JoinHandle<()>>,
}

struct SyncInner {
    bulb: Arc<dyn BulbClient>,
    color: ColorCell,
    presenter: Presenter,
    interval: Duration,
    in_flight: AtomicBool,
    auto: Mutex<AutoState>,
}

impl SyncInner {
    fn auto(&self) -> MutexGuard<'_, AutoState> {
        self.auto.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SyncInner {
    fn drop(&mut self) {
        let auto = self.auto.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(timer) = auto.timer.take() {
            timer.abort();
        }
    }
}

#[derive(Clone)]
pub struct SyncScheduler {
    inner: Arc<SyncInner>,
}

impl SyncScheduler {
    pub fn new(
        bulb: Arc<dyn BulbClient>,
        color: ColorCell,
        presenter: Presenter,
        interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(SyncInner {
                bulb,
                color,
                presenter,
                interval,
                in_flight: AtomicBool::new(false),
                auto: Mutex::new(AutoState {
                    enabled: false,
                    timer: None,
                }),
            }),
        }
    }

    /// Manual trigger: submit the last known color and drive the send control's state
    pub async fn send_now(&self) -> SendOutcome {
        let Some(color) = self.inner.color.get() else {
            self.inner.presenter.error(NO_COLOR_MESSAGE);
            return SendOutcome::NoColor;
        };
        let Some(_gate) = InFlight::try_acquire(&self.inner.in_flight) else {
            log::debug!("Manual send ignored, submission already in flight");
            return SendOutcome::Busy;
        };

        self.publish_control(SendControl::Sending);
        let outcome = self.deliver(color).await;
        self.publish_control(SendControl::Idle);
        outcome
    }

    /// Submit `color` unless another submission is in flight
    pub async fn submit(&self, color: ColorSample) -> SendOutcome {
        let Some(_gate) = InFlight::try_acquire(&self.inner.in_flight) else {
            log::debug!("Submission of {} dropped, another is in flight", color);
            return SendOutcome::Busy;
        };
        self.deliver(color).await
    }

    pub fn is_in_flight(&self) -> bool {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    async fn deliver(&self, color: ColorSample) -> SendOutcome {
        log::info!("Sending {} to {}", color, self.inner.bulb.describe());
        match self.inner.bulb.submit(color).await {
            Ok(reply) => {
                let text = reply
                    .message
                    .unwrap_or_else(|| DEFAULT_SUCCESS_MESSAGE.to_string());
                self.inner.presenter.success(text.clone());
                SendOutcome::Sent(text)
            }
            Err(e) => {
                log::warn!("Color submission failed: {}", e);
                let text = e.to_string();
                self.inner.presenter.error(text.clone());
                SendOutcome::Failed(text)
            }
        }
    }

    fn publish_control(&self, state: SendControl) {
        self.inner.presenter.publish(UiEvent::SendControl { state });
    }

    /// Start the periodic trigger. First tick fires one interval from now.
    /// Returns `false` if auto mode was already on.
    pub fn enable_auto(&self) -> bool {
        let mut auto = self.inner.auto();
        if auto.enabled {
            return false;
        }

        let weak = Arc::downgrade(&self.inner);
        let interval = self.inner.interval;
        auto.timer = Some(tokio::spawn(auto_ticker(weak, interval)));
        auto.enabled = true;
        assert_invariant!(
            auto.timer.is_some() == auto.enabled,
            invariants::AUTO_TIMER_MATCHES_FLAG,
            "SyncScheduler::enable_auto"
        );
        drop(auto);

        log::info!("Auto mode enabled, interval {:?}", interval);
        self.inner.presenter.publish(UiEvent::AutoMode { enabled: true });
        self.inner.presenter.success(format!(
            "Auto mode enabled - sending color every {}",
            describe_interval(interval)
        ));
        true
    }

    /// Stop future ticks immediately. Returns `false` if auto mode was already off.
    pub fn disable_auto(&self) -> bool {
        let mut auto = self.inner.auto();
        if !auto.enabled {
            return false;
        }
        if let Some(timer) = auto.timer.take() {
            timer.abort();
        }
        auto.enabled = false;
        assert_invariant!(
            auto.timer.is_some() == auto.enabled,
            invariants::AUTO_TIMER_MATCHES_FLAG,
            "SyncScheduler::disable_auto"
        );
        drop(auto);

        log::info!("Auto mode disabled");
        self.inner.presenter.publish(UiEvent::AutoMode { enabled: false });
        self.inner.presenter.success("Auto mode disabled");
        true
    }

    /// Flip auto mode; returns the new state
    pub fn toggle_auto(&self) -> bool {
        if self.is_auto_enabled() {
            self.disable_auto();
            false
        } else {
            self.enable_auto();
            true
        }
    }

    pub fn is_auto_enabled(&self) -> bool {
        self.inner.auto().enabled
    }
}

async fn auto_ticker(weak: Weak<SyncInner>, interval: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let Some(inner) = weak.upgrade() else { break };
        let scheduler = SyncScheduler { inner };
        match scheduler.inner.color.get() {
            Some(color) => {
                tokio::spawn(async move {
                    scheduler.submit(color).await;
                });
            }
            None => log::debug!("Auto tick skipped, no color detected yet"),
        }
    }
}

/// "3 seconds", "1 second", "1500 ms"
fn describe_interval(interval: Duration) -> String {
    let millis = interval.as_millis();
    match (millis % 1000, millis / 1000) {
        (0, 1) => "1 second".to_string(),
        (0, secs) => format!("{} seconds", secs),
        _ => format!("{} ms", millis),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingBulb;

    fn scheduler(bulb: &RecordingBulb) -> (SyncScheduler, ColorCell) {
        let cell = ColorCell::new();
        let scheduler = SyncScheduler::new(
            Arc::new(bulb.clone()),
            cell.clone(),
            Presenter::detached(),
            Duration::from_millis(3000),
        );
        (scheduler, cell)
    }

    #[test]
    fn test_interval_rendering() {
        assert_eq!(describe_interval(Duration::from_millis(3000)), "3 seconds");
        assert_eq!(describe_interval(Duration::from_millis(1000)), "1 second");
        assert_eq!(describe_interval(Duration::from_millis(1500)), "1500 ms");
    }

    #[test]
    fn test_gate_is_single_slot() {
        let flag = AtomicBool::new(false);
        let first = InFlight::try_acquire(&flag);
        assert!(first.is_some());
        assert!(InFlight::try_acquire(&flag).is_none());
        drop(first);
        assert!(InFlight::try_acquire(&flag).is_some());
    }

    #[tokio::test]
    async fn test_server_message_is_surfaced() {
        let bulb = RecordingBulb::new();
        let (scheduler, cell) = scheduler(&bulb);
        cell.set(ColorSample::new(1, 2, 3));
        assert_eq!(
            scheduler.send_now().await,
            SendOutcome::Sent("Color set successfully".to_string())
        );

        bulb.set_reply_message(None);
        assert_eq!(
            scheduler.send_now().await,
            SendOutcome::Sent(DEFAULT_SUCCESS_MESSAGE.to_string())
        );
    }

    #[tokio::test]
    async fn test_toggle_flips_state() {
        let bulb = RecordingBulb::new();
        let (scheduler, _cell) = scheduler(&bulb);
        assert!(scheduler.toggle_auto());
        assert!(scheduler.is_auto_enabled());
        assert!(!scheduler.enable_auto());
        assert!(!scheduler.toggle_auto());
        assert!(!scheduler.is_auto_enabled());
        assert!(!scheduler.disable_auto());
    }
}
