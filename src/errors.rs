use thiserror::Error;

/// Failures at the camera capability boundary.
///
/// Every variant carries the underlying cause as reported by the host; the `Display`
/// output is the user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraError {
    #[error("Error accessing cameras: {0}")]
    EnumerationError(String),
    #[error("Camera access denied ({0}). Please allow camera access and retry.")]
    AccessDenied(String),
    #[error("Camera not found ({0}). Please check your camera connection.")]
    DeviceNotFound(String),
    #[error("Error accessing camera: {0}")]
    GenericCaptureError(String),
}

impl CameraError {
    /// Underlying cause without the user-facing wording
    pub fn cause(&self) -> &str {
        match self {
            CameraError::EnumerationError(cause)
            | CameraError::AccessDenied(cause)
            | CameraError::DeviceNotFound(cause)
            | CameraError::GenericCaptureError(cause) => cause,
        }
    }
}

/// Why a single extraction attempt produced no sample.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractFault {
    #[error("frame source is not ready")]
    NotReady,
    #[error("frame has no pixels ({width}x{height})")]
    EmptyFrame { width: u32, height: u32 },
    #[error("frame buffer holds {actual} bytes, expected {expected}")]
    MalformedBuffer { expected: usize, actual: usize },
    #[error("no usable pixels in frame")]
    NoSamples,
    #[error("{strategy} strategy panicked: {message}")]
    Panicked {
        strategy: &'static str,
        message: String,
    },
}

/// A color submission that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionError {
    /// The endpoint answered but refused the color (non-2xx or `success: false`)
    #[error("{message}")]
    Rejected { status: u16, message: String },
    /// The endpoint could not be reached or its reply could not be read
    #[error("Network error: {0}")]
    Network(String),
    /// A direct bulb could not be driven
    #[error("Failed to connect to bulb: {0}")]
    Bulb(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(String),
    #[error("Failed to parse config file: {0}")]
    Parse(String),
    #[error("Failed to write config file: {0}")]
    Write(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_denied_asks_for_permission() {
        let error = CameraError::AccessDenied("NotAllowedError".to_string());
        let message = error.to_string();
        assert!(message.contains("allow camera access"));
        assert!(message.contains("retry"));
        assert_eq!(error.cause(), "NotAllowedError");
    }

    #[test]
    fn test_generic_error_includes_cause() {
        let error = CameraError::GenericCaptureError("device busy".to_string());
        assert_eq!(error.to_string(), "Error accessing camera: device busy");
    }

    #[test]
    fn test_rejected_submission_shows_server_message() {
        let error = SubmissionError::Rejected {
            status: 500,
            message: "Failed to connect to bulb: timeout".to_string(),
        };
        assert_eq!(error.to_string(), "Failed to connect to bulb: timeout");
    }
}
