//! Core value types shared across the pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A capture device as reported by one enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub id: String,
    pub label: String,
}

impl DeviceDescriptor {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// One RGB color, 8 bits per channel.
///
/// Serializes as `{"red":..,"green":..,"blue":..}`, the body the bulb endpoint expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColorSample {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl ColorSample {
    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    /// Build a sample from wider integers, rejecting anything outside 0..=255
    pub fn try_from_channels(red: i64, green: i64, blue: i64) -> Result<Self, String> {
        let channel = |v: i64| u8::try_from(v).ok();
        match (channel(red), channel(green), channel(blue)) {
            (Some(r), Some(g), Some(b)) => Ok(Self::new(r, g, b)),
            _ => Err("RGB values must be between 0 and 255".to_string()),
        }
    }

    /// CSS rendering used by the preview swatch
    pub fn css(&self) -> String {
        format!("rgb({}, {}, {})", self.red, self.green, self.blue)
    }
}

impl fmt::Display for ColorSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RGB: {}, {}, {}", self.red, self.green, self.blue)
    }
}

impl From<[u8; 3]> for ColorSample {
    fn from([red, green, blue]: [u8; 3]) -> Self {
        Self { red, green, blue }
    }
}

/// Resolution hints passed to the capability on acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConstraints {
    pub ideal_width: u32,
    pub ideal_height: u32,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            ideal_width: 1280,
            ideal_height: 720,
        }
    }
}

/// A decoded video frame, packed RGB24 rows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoFrame {
    pub id: uuid::Uuid,
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub device_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl VideoFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            data,
            width,
            height,
            device_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_device(mut self, device_id: Option<String>) -> Self {
        self.device_id = device_id;
        self
    }

    /// Byte length a well-formed RGB24 buffer of this size must have
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_json_shape() {
        let json = serde_json::to_string(&ColorSample::new(200, 100, 50)).unwrap();
        assert_eq!(json, r#"{"red":200,"green":100,"blue":50}"#);
    }

    #[test]
    fn test_channel_validation() {
        assert_eq!(
            ColorSample::try_from_channels(0, 128, 255),
            Ok(ColorSample::new(0, 128, 255))
        );
        assert!(ColorSample::try_from_channels(256, 0, 0).is_err());
        assert!(ColorSample::try_from_channels(0, -1, 0).is_err());
    }

    #[test]
    fn test_preview_renderings() {
        let color = ColorSample::new(1, 2, 3);
        assert_eq!(color.to_string(), "RGB: 1, 2, 3");
        assert_eq!(color.css(), "rgb(1, 2, 3)");
    }

    #[test]
    fn test_default_constraints() {
        let constraints = CaptureConstraints::default();
        assert_eq!((constraints.ideal_width, constraints.ideal_height), (1280, 720));
    }
}
