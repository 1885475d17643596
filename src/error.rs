//! Error types for the VPS core

/// Errors raised while localizing against the VPS backend.
#[derive(Debug, thiserror::Error)]
pub enum VpsError {
    #[error("camera image is not yet available")]
    ImageNotYetAvailable,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("camera pose for image index {0} was not captured")]
    UnknownImageIndex(usize),

    #[error("feature extraction failed: {0}")]
    FeatureExtraction(String),

    #[error("no tokio runtime available to drive the localization loop")]
    NoRuntime,

    #[error("lifecycle error: {0}")]
    Lifecycle(String),
}

/// Result type used across the crate
pub type Result<T> = std::result::Result<T, VpsError>;

impl VpsError {
    /// Whether the localization loop may keep running after this error.
    ///
    /// Only a missing camera image is retried; anything else ends the session.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, VpsError::ImageNotYetAvailable)
    }
}
