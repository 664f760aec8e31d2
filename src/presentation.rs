//! Events handed to whatever renders the appliance state
//!
//! The pipeline never draws anything; it pushes [`UiEvent`]s into an unbounded channel
//! and the presentation layer (terminal printer, GUI, test) drains it.

use crate::types::ColorSample;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Success,
    Error,
}

/// A transient, human-readable status line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusMessage {
    pub text: String,
    pub kind: StatusKind,
    pub issued_at: DateTime<Utc>,
}

impl StatusMessage {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: StatusKind::Success,
            issued_at: Utc::now(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: StatusKind::Error,
            issued_at: Utc::now(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == StatusKind::Error
    }

    /// Whether the message should still be shown `hide_after` past issue time
    pub fn is_visible_at(&self, now: DateTime<Utc>, hide_after: Duration) -> bool {
        match chrono::Duration::from_std(hide_after) {
            Ok(hide_after) => now < self.issued_at + hide_after,
            Err(_) => true,
        }
    }
}

/// State of the manual send control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SendControl {
    Idle,
    Sending,
}

impl SendControl {
    pub fn label(&self) -> &'static str {
        match self {
            SendControl::Idle => "Send Color",
            SendControl::Sending => "Sending...",
        }
    }

    pub fn enabled(&self) -> bool {
        *self == SendControl::Idle
    }
}

pub fn auto_label(enabled: bool) -> &'static str {
    if enabled {
        "Auto Mode (ON)"
    } else {
        "Auto Mode"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum UiEvent {
    /// A fresh detection result for the preview swatch
    ColorDetected(ColorSample),
    Status(StatusMessage),
    SendControl { state: SendControl },
    AutoMode { enabled: bool },
    CameraReady { device_id: Option<String> },
    CameraDisconnected { device_id: Option<String> },
}

/// Sending half of the presentation channel. Events are dropped once nobody listens.
#[derive(Debug, Clone)]
pub struct Presenter {
    tx: mpsc::UnboundedSender<UiEvent>,
}

impl Presenter {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<UiEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// A presenter whose events go nowhere
    pub fn detached() -> Self {
        Self::channel().0
    }

    pub fn publish(&self, event: UiEvent) {
        let _ = self.tx.send(event);
    }

    pub fn color(&self, color: ColorSample) {
        self.publish(UiEvent::ColorDetected(color));
    }

    pub fn success(&self, text: impl Into<String>) {
        self.publish(UiEvent::Status(StatusMessage::success(text)));
    }

    pub fn error(&self, text: impl Into<String>) {
        self.publish(UiEvent::Status(StatusMessage::error(text)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_visibility_window() {
        let message = StatusMessage::success("ok");
        let hide = Duration::from_millis(5000);
        assert!(message.is_visible_at(message.issued_at, hide));
        assert!(message.is_visible_at(message.issued_at + chrono::Duration::milliseconds(4999), hide));
        assert!(!message.is_visible_at(message.issued_at + chrono::Duration::milliseconds(5000), hide));
    }

    #[test]
    fn test_control_labels() {
        assert_eq!(SendControl::Idle.label(), "Send Color");
        assert_eq!(SendControl::Sending.label(), "Sending...");
        assert!(!SendControl::Sending.enabled());
        assert_eq!(auto_label(true), "Auto Mode (ON)");
        assert_eq!(auto_label(false), "Auto Mode");
    }

    #[test]
    fn test_event_json_shape() {
        let json = serde_json::to_value(UiEvent::ColorDetected(ColorSample::new(1, 2, 3))).unwrap();
        assert_eq!(json["event"], "color_detected");
        assert_eq!(json["red"], 1);
    }

    #[tokio::test]
    async fn test_presenter_delivers_in_order() {
        let (presenter, mut rx) = Presenter::channel();
        presenter.color(ColorSample::new(9, 9, 9));
        presenter.error("boom");
        assert_eq!(rx.recv().await, Some(UiEvent::ColorDetected(ColorSample::new(9, 9, 9))));
        match rx.recv().await {
            Some(UiEvent::Status(status)) => assert!(status.is_error()),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
