use thiserror::Error;

/// Errors returned by gallery operations.
#[derive(Debug, Error)]
pub enum GalleryError {
    #[error("gallery: invalid argument: {0}")]
    InvalidArgument(String),

    #[error("gallery: invalid vector: {reason}")]
    InvalidVector { reason: String },

    #[error("gallery: invalid name {0:?}")]
    InvalidName(String),

    #[error("gallery: dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("gallery: {field} mismatch: expected {expected}, got {got}")]
    HeaderMismatch {
        field: &'static str,
        expected: String,
        got: String,
    },

    #[error("gallery: persistence: {0}")]
    Persistence(String),

    #[error("gallery: invalid format: {0}")]
    InvalidFormat(String),

    #[error("gallery: configuration: {0}")]
    Configuration(String),
}

impl GalleryError {
    pub(crate) fn invalid_vector(reason: impl Into<String>) -> Self {
        Self::InvalidVector {
            reason: reason.into(),
        }
    }
}
