//! Live face recognition over a [`facekit_gallery`] gallery.
//!
//! A camera thread pushes frames into a [`FrameChannel`]; a
//! [`RecognitionPipeline`] running on tokio takes the newest one, asks a
//! [`FaceDetector`] for faces, embeds each face with a [`FaceEmbedder`], and
//! publishes who is in the picture. Detection and embedding are supplied by
//! the caller.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use facekit_pipeline::*;
//! # async fn demo(
//! #     detector: Arc<dyn FaceDetector>,
//! #     embedder: Arc<dyn FaceEmbedder>,
//! #     store: Arc<facekit_gallery::IdentityStore>,
//! #     frame: Frame,
//! # ) -> Result<(), PipelineError> {
//! let pipeline = RecognitionPipeline::new(detector, embedder, store, PipelineConfig::default());
//! let mut results = pipeline.subscribe();
//! pipeline.start()?;
//!
//! pipeline.frames().set(frame);
//! results.changed().await.ok();
//! if let Some(result) = pipeline.latest() {
//!     for face in &result.faces {
//!         println!("{:?}: {}", face.bbox, face.name);
//!     }
//! }
//!
//! pipeline.stop();
//! pipeline.join().await;
//! # Ok(())
//! # }
//! ```
//!
//! [`enroll`] adds identities from frames using the same collaborators, and
//! [`run_benchmark`] compares several embedding models over a set of photos.

mod benchmark;
mod detector;
mod embedder;
mod enroll;
mod error;
mod frame;
mod pipeline;
mod preprocess;

pub use benchmark::{run_benchmark, BenchmarkFace, BenchmarkModel, BenchmarkReport, ModelTiming};
pub use detector::{BoundingBox, DetectedFace, FaceDetector};
pub use embedder::FaceEmbedder;
pub use enroll::{enroll, EnrollMode};
pub use error::PipelineError;
pub use frame::{Frame, FrameChannel};
pub use pipeline::{
    PipelineConfig, PipelineState, PipelineStats, Recognition, RecognitionPipeline,
    RecognitionResult,
};
pub use preprocess::{crop_face, is_face_on_image, FaceImage};
