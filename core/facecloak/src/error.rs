use thiserror::Error;

#[derive(Debug, Error)]
pub enum CloakError {
    #[error("failed to decode image: {0}")]
    InvalidImage(String),

    #[error("no faces detected in image")]
    NoFaceDetected,

    #[error("jpeg quality must be between 1 and 100, got {0}")]
    InvalidQuality(u8),

    #[error("failed to load detector model: {0}")]
    CascadeLoad(String),

    #[error("failed to encode image: {0}")]
    EncodeError(String),
}

impl CloakError {
    /// Whether the error was caused by the submitted image rather than by
    /// configuration or an internal failure.
    pub fn is_client_error(&self) -> bool {
        matches!(self, CloakError::InvalidImage(_) | CloakError::NoFaceDetected)
    }

    /// Short cause suitable for showing to an end user.
    pub fn public_message(&self) -> &'static str {
        match self {
            CloakError::InvalidImage(_) => "invalid image format",
            CloakError::NoFaceDetected => "no faces detected in image",
            _ => "internal processing error",
        }
    }
}
