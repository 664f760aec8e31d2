//! Sync scheduler: manual sends, auto-mode cadence and the in-flight gate

use huemirror::detection::ColorCell;
use huemirror::presentation::{Presenter, SendControl, StatusKind, UiEvent};
use huemirror::sync::{SendOutcome, SyncScheduler, NO_COLOR_MESSAGE};
use huemirror::testing::RecordingBulb;
use huemirror::{ColorSample, SubmissionError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{sleep, Instant};

const PERIOD: Duration = Duration::from_millis(3000);
const SLACK: Duration = Duration::from_millis(100);

struct Rig {
    bulb: RecordingBulb,
    cell: ColorCell,
    scheduler: SyncScheduler,
    ui: UnboundedReceiver<UiEvent>,
}

fn rig() -> Rig {
    let bulb = RecordingBulb::new();
    let cell = ColorCell::new();
    let (presenter, ui) = Presenter::channel();
    let scheduler = SyncScheduler::new(Arc::new(bulb.clone()), cell.clone(), presenter, PERIOD);
    Rig {
        bulb,
        cell,
        scheduler,
        ui,
    }
}

fn drain(ui: &mut UnboundedReceiver<UiEvent>) -> Vec<UiEvent> {
    let mut events = Vec::new();
    while let Ok(event) = ui.try_recv() {
        events.push(event);
    }
    events
}

fn statuses(events: &[UiEvent]) -> Vec<(String, StatusKind)> {
    events
        .iter()
        .filter_map(|e| match e {
            UiEvent::Status(status) => Some((status.text.clone(), status.kind)),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_manual_send_without_color_makes_no_request() {
    let mut rig = rig();
    assert_eq!(rig.scheduler.send_now().await, SendOutcome::NoColor);
    assert_eq!(rig.bulb.count(), 0);
    assert_eq!(
        statuses(&drain(&mut rig.ui)),
        vec![(NO_COLOR_MESSAGE.to_string(), StatusKind::Error)]
    );
}

#[tokio::test]
async fn test_manual_send_drives_control_state() {
    let mut rig = rig();
    rig.cell.set(ColorSample::new(200, 100, 50));

    let outcome = rig.scheduler.send_now().await;
    assert_eq!(outcome, SendOutcome::Sent("Color set successfully".to_string()));
    assert_eq!(rig.bulb.submissions(), vec![ColorSample::new(200, 100, 50)]);

    let events = drain(&mut rig.ui);
    assert_eq!(
        events.first(),
        Some(&UiEvent::SendControl {
            state: SendControl::Sending
        })
    );
    assert_eq!(
        events.last(),
        Some(&UiEvent::SendControl {
            state: SendControl::Idle
        })
    );
    assert_eq!(
        statuses(&events),
        vec![("Color set successfully".to_string(), StatusKind::Success)]
    );
}

#[tokio::test]
async fn test_failures_surface_best_message() {
    let mut rig = rig();
    rig.cell.set(ColorSample::new(1, 2, 3));

    rig.bulb.fail_next(SubmissionError::Rejected {
        status: 500,
        message: "Failed to connect to bulb: timeout".to_string(),
    });
    rig.bulb
        .fail_next(SubmissionError::Network("connection refused".to_string()));

    assert_eq!(
        rig.scheduler.send_now().await,
        SendOutcome::Failed("Failed to connect to bulb: timeout".to_string())
    );
    assert_eq!(
        rig.scheduler.send_now().await,
        SendOutcome::Failed("Network error: connection refused".to_string())
    );
    let statuses = statuses(&drain(&mut rig.ui));
    assert!(statuses.iter().all(|(_, kind)| *kind == StatusKind::Error));
    // Control always returns to idle
    assert!(!rig.scheduler.is_in_flight());
}

#[tokio::test(start_paused = true)]
async fn test_auto_mode_cadence_uses_fire_time_color() {
    let rig = rig();
    rig.cell.set(ColorSample::new(10, 10, 10));
    let start = Instant::now();
    assert!(rig.scheduler.enable_auto());

    sleep(PERIOD - SLACK).await;
    assert_eq!(rig.bulb.count(), 0, "first tick is one period after enabling");

    sleep(SLACK * 2).await;
    assert_eq!(rig.bulb.submissions(), vec![ColorSample::new(10, 10, 10)]);

    rig.cell.set(ColorSample::new(20, 20, 20));
    sleep(PERIOD).await;
    rig.cell.set(ColorSample::new(30, 30, 30));
    sleep(PERIOD).await;

    assert_eq!(
        rig.bulb.submissions(),
        vec![
            ColorSample::new(10, 10, 10),
            ColorSample::new(20, 20, 20),
            ColorSample::new(30, 30, 30),
        ]
    );
    let offsets: Vec<Duration> = rig
        .bulb
        .submission_times()
        .into_iter()
        .map(|at| at - start)
        .collect();
    for (tick, offset) in offsets.iter().enumerate() {
        let due = PERIOD * (tick as u32 + 1);
        assert!(*offset >= due && *offset < due + SLACK, "tick {} at {:?}", tick, offset);
    }
}

#[tokio::test(start_paused = true)]
async fn test_disabling_stops_future_ticks_immediately() {
    let rig = rig();
    rig.cell.set(ColorSample::new(1, 1, 1));
    rig.scheduler.enable_auto();

    sleep(PERIOD * 2 + SLACK).await;
    assert_eq!(rig.bulb.count(), 2);

    assert!(rig.scheduler.disable_auto());
    assert!(!rig.scheduler.is_auto_enabled());
    sleep(PERIOD * 5).await;
    assert_eq!(rig.bulb.count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failures_do_not_stop_auto_mode() {
    let rig = rig();
    rig.cell.set(ColorSample::new(1, 1, 1));
    rig.bulb
        .fail_always(SubmissionError::Network("unreachable".to_string()));
    rig.scheduler.enable_auto();

    sleep(PERIOD * 3 + SLACK).await;
    assert_eq!(rig.bulb.count(), 3);
    assert!(rig.scheduler.is_auto_enabled());

    rig.bulb.recover();
    sleep(PERIOD).await;
    assert_eq!(rig.bulb.count(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_ticks_without_color_are_skipped() {
    let rig = rig();
    rig.scheduler.enable_auto();
    sleep(PERIOD * 2 + SLACK).await;
    assert_eq!(rig.bulb.count(), 0);

    rig.cell.set(ColorSample::new(4, 4, 4));
    sleep(PERIOD).await;
    assert_eq!(rig.bulb.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_disable_does_not_cancel_in_flight_submission() {
    let mut rig = rig();
    rig.cell.set(ColorSample::new(9, 9, 9));
    rig.bulb.set_latency(Duration::from_millis(1000));
    rig.scheduler.enable_auto();

    sleep(PERIOD + SLACK).await;
    assert!(rig.scheduler.is_in_flight());
    rig.scheduler.disable_auto();
    drain(&mut rig.ui);

    sleep(Duration::from_millis(1000)).await;
    assert!(!rig.scheduler.is_in_flight());
    assert!(!rig.scheduler.is_auto_enabled(), "a late result must not re-enable auto mode");

    let events = drain(&mut rig.ui);
    assert_eq!(
        statuses(&events),
        vec![("Color set successfully".to_string(), StatusKind::Success)]
    );
    assert!(!events
        .iter()
        .any(|e| matches!(e, UiEvent::AutoMode { enabled: true })));
}

#[tokio::test(start_paused = true)]
async fn test_trigger_during_flight_is_dropped_not_queued() {
    let rig = rig();
    rig.cell.set(ColorSample::new(3, 3, 3));
    rig.bulb.set_latency(Duration::from_millis(500));

    let manual = rig.scheduler.clone();
    let in_flight = tokio::spawn(async move { manual.send_now().await });
    sleep(Duration::from_millis(10)).await;

    assert_eq!(rig.scheduler.send_now().await, SendOutcome::Busy);
    assert_eq!(
        rig.scheduler.submit(ColorSample::new(4, 4, 4)).await,
        SendOutcome::Busy
    );

    assert!(matches!(in_flight.await.unwrap(), SendOutcome::Sent(_)));
    sleep(Duration::from_secs(5)).await;
    assert_eq!(rig.bulb.submissions(), vec![ColorSample::new(3, 3, 3)]);
}

#[tokio::test(start_paused = true)]
async fn test_auto_tick_during_manual_send_is_dropped() {
    let rig = rig();
    rig.cell.set(ColorSample::new(6, 6, 6));
    rig.bulb.set_latency(Duration::from_millis(500));
    rig.scheduler.enable_auto();

    sleep(PERIOD - Duration::from_millis(100)).await;
    let manual = rig.scheduler.clone();
    let manual = tokio::spawn(async move { manual.send_now().await });

    sleep(Duration::from_millis(300)).await;
    // Tick at 3000 ms hit the gate while the manual send was in flight
    assert_eq!(rig.bulb.count(), 1);
    assert!(matches!(manual.await.unwrap(), SendOutcome::Sent(_)));

    sleep(PERIOD).await;
    assert_eq!(rig.bulb.count(), 2);
}

#[tokio::test]
async fn test_auto_mode_status_texts() {
    let mut rig = rig();
    rig.scheduler.enable_auto();
    rig.scheduler.disable_auto();

    let events = drain(&mut rig.ui);
    assert_eq!(
        statuses(&events),
        vec![
            (
                "Auto mode enabled - sending color every 3 seconds".to_string(),
                StatusKind::Success
            ),
            ("Auto mode disabled".to_string(), StatusKind::Success),
        ]
    );
    assert!(events.contains(&UiEvent::AutoMode { enabled: true }));
    assert!(events.contains(&UiEvent::AutoMode { enabled: false }));
}
