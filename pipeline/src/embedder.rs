use crate::preprocess::FaceImage;
use crate::PipelineError;

/// Extracts an embedding vector from a cropped face.
///
/// The output length is returned by [`FaceEmbedder::dimension`] and must
/// match the gallery the embeddings are matched against. The same input
/// must always give the same vector.
///
/// Embedding is CPU-bound; the pipeline calls it from a blocking thread.
///
/// # Thread Safety
///
/// Implementations must be safe for concurrent use.
pub trait FaceEmbedder: Send + Sync {
    fn embed(&self, face: &FaceImage) -> Result<Vec<f32>, PipelineError>;

    /// Returns the embedding length (e.g., 128).
    fn dimension(&self) -> usize;
}
