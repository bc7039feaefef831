use facekit_gallery::GalleryError;
use thiserror::Error;

/// Errors returned by pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline: detection failed: {0}")]
    Detection(String),

    #[error("pipeline: embedding failed: {0}")]
    Embedding(String),

    #[error(transparent)]
    Gallery(#[from] GalleryError),

    #[error("pipeline: invalid frame: {0}")]
    InvalidFrame(String),

    #[error("pipeline: already running")]
    AlreadyRunning,

    #[error("pipeline: no face found")]
    NoFace,

    #[error("pipeline: expected one face, found {0}")]
    MultipleFaces(usize),

    #[error("pipeline: face is not fully inside the image")]
    FaceOffImage,

    #[error("pipeline: {0} timed out")]
    Timeout(&'static str),
}
