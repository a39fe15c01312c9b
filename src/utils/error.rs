//! Error types and handling
//!
//! Common error types used across the capture pipeline.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pipeline-wide error type
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// A recording was started without a live stream.
    #[error("No active capture device")]
    NoActiveDevice,

    /// A second stream was requested while one is still held.
    #[error("A capture stream is already held by this session")]
    StreamAlreadyHeld,

    #[error("Recording not supported: none of the preferred codecs are available")]
    Unsupported,

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Server rejected request ({status}): {body}")]
    ServerRejected { status: u16, body: String },

    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    #[error("Capture session is closed")]
    SessionClosed,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CaptureError {
    /// Whether the session can carry on from the review state after this error.
    ///
    /// Upload failures keep the clip so the user can retry or retake; every
    /// other failure ends the capture surface.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CaptureError::NetworkError(_) | CaptureError::ServerRejected { .. }
        )
    }

    /// Internal precondition violations that indicate a lifecycle bug.
    pub fn is_defect(&self) -> bool {
        matches!(
            self,
            CaptureError::NoActiveDevice | CaptureError::StreamAlreadyHeld
        )
    }
}

/// Error response for the UI layer
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<CaptureError> for ErrorResponse {
    fn from(error: CaptureError) -> Self {
        let code = match &error {
            CaptureError::PermissionDenied(_) => "PERMISSION_DENIED",
            CaptureError::DeviceUnavailable(_) => "DEVICE_UNAVAILABLE",
            CaptureError::NoActiveDevice => "NO_ACTIVE_DEVICE",
            CaptureError::StreamAlreadyHeld => "STREAM_ALREADY_HELD",
            CaptureError::Unsupported => "RECORDING_UNSUPPORTED",
            CaptureError::NetworkError(_) => "NETWORK_ERROR",
            CaptureError::ServerRejected { .. } => "SERVER_REJECTED",
            CaptureError::InvalidState { .. } => "INVALID_STATE",
            CaptureError::SessionClosed => "SESSION_CLOSED",
            CaptureError::Config(_) => "CONFIG_ERROR",
            CaptureError::Io(_) => "IO_ERROR",
            CaptureError::Serialization(_) => "SERIALIZATION_ERROR",
        };

        ErrorResponse {
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using CaptureError
pub type CaptureResult<T> = Result<T, CaptureError>;
