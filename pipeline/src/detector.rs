use async_trait::async_trait;

use crate::frame::Frame;
use crate::PipelineError;

/// Axis-aligned face box in pixel coordinates. `right` and `bottom` are
/// exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundingBox {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl BoundingBox {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }
}

/// One face reported by a [`FaceDetector`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectedFace {
    pub bbox: BoundingBox,
    /// In-plane rotation in degrees, handed to the embedder unchanged.
    pub rotation: f32,
}

impl DetectedFace {
    pub fn new(bbox: BoundingBox) -> Self {
        Self { bbox, rotation: 0.0 }
    }
}

/// Finds faces in a frame.
///
/// Detection is usually backed by a remote service or an accelerator queue,
/// so the call is async. A frame with no faces yields an empty list, not an
/// error.
///
/// Implementations must be safe for concurrent use.
#[async_trait]
pub trait FaceDetector: Send + Sync {
    async fn detect(&self, frame: &Frame) -> Result<Vec<DetectedFace>, PipelineError>;
}
