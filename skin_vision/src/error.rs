//! Error types for capture and rendering.
//!
//! Per-frame detection misses never show up here; they are reported as
//! `FaceObservation { found: false }`. Everything in this enum is either a
//! capability failure (camera, landmark model) or an input that could not be
//! decoded, and callers turn it into a status value rather than propagating
//! it to a global handler.

use thiserror::Error;

/// Result type for vision operations.
pub type VisionResult<T> = Result<T, VisionError>;

/// Errors that can occur while capturing or rendering.
#[derive(Debug, Error)]
pub enum VisionError {
    #[error("Camera unavailable: {0}")]
    CameraUnavailable(String),

    #[error("Landmark model failed to load: {0}")]
    ModelLoad(String),

    #[error("Landmark detection failed: {0}")]
    Detection(String),

    #[error("Image decode failed: {0}")]
    ImageDecode(#[from] image::ImageError),

    #[error("Base64 decode failed: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Invalid data URI: {0}")]
    InvalidDataUri(String),

    #[error("Frame buffer has {actual} bytes, expected {expected} for {width}x{height} RGBA")]
    FrameSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("Capture encoding failed: {0}")]
    Encode(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Capture session is not running")]
    SessionClosed,
}

impl VisionError {
    /// Create a detection failure error.
    pub fn detection(message: impl Into<String>) -> Self {
        Self::Detection(message.into())
    }

    /// Create a camera failure error.
    pub fn camera(message: impl Into<String>) -> Self {
        Self::CameraUnavailable(message.into())
    }

    /// Whether the failure means a capability is missing for the rest of the session.
    pub fn is_capability_failure(&self) -> bool {
        matches!(self, Self::CameraUnavailable(_) | Self::ModelLoad(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_failures_are_classified() {
        assert!(VisionError::camera("permission denied").is_capability_failure());
        assert!(VisionError::ModelLoad("no gpu".into()).is_capability_failure());
        assert!(!VisionError::detection("timeout").is_capability_failure());
        assert!(!VisionError::SessionClosed.is_capability_failure());
    }

    #[test]
    fn frame_size_message_names_dimensions() {
        let err = VisionError::FrameSize { width: 4, height: 2, expected: 32, actual: 30 };
        assert_eq!(err.to_string(), "Frame buffer has 30 bytes, expected 32 for 4x2 RGBA");
    }
}
