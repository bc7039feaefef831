//! Adding identities from camera frames.

use std::sync::Arc;

use facekit_gallery::{IdentityRecord, IdentityStore};
use tracing::debug;

use crate::detector::FaceDetector;
use crate::embedder::FaceEmbedder;
use crate::frame::Frame;
use crate::preprocess::crop_face;
use crate::PipelineError;

/// What to do when the name is already enrolled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnrollMode {
    /// Fold the new embedding into the stored one.
    #[default]
    Merge,
    /// Overwrite the stored embedding and reset its weight.
    Replace,
}

/// Enrolls the single face in `frame` under `name` and returns the record as
/// stored.
///
/// The frame must contain exactly one face, fully inside the image.
/// Embedding and the gallery write (which may save to disk) run on a
/// blocking thread.
pub async fn enroll(
    detector: &dyn FaceDetector,
    embedder: Arc<dyn FaceEmbedder>,
    store: Arc<IdentityStore>,
    frame: &Frame,
    name: &str,
    mode: EnrollMode,
) -> Result<IdentityRecord, PipelineError> {
    let faces = detector.detect(frame).await?;
    let face = match faces.as_slice() {
        [] => return Err(PipelineError::NoFace),
        [face] => face,
        _ => return Err(PipelineError::MultipleFaces(faces.len())),
    };
    let image = crop_face(frame, face).ok_or(PipelineError::FaceOffImage)?;

    let name = name.to_string();
    let gallery = Arc::clone(&store);
    let stored = tokio::task::spawn_blocking(move || -> Result<IdentityRecord, PipelineError> {
        let record = IdentityRecord::new(name, embedder.embed(&image)?);
        match mode {
            EnrollMode::Merge => Ok(gallery.add_record(record)?),
            EnrollMode::Replace => {
                gallery.force_add_record(record.clone())?;
                Ok(record)
            }
        }
    })
    .await
    .map_err(|e| PipelineError::Embedding(format!("enrollment task: {e}")))??;

    debug!(
        gallery = %store.id(),
        name = stored.name(),
        weight = stored.weight(),
        ?mode,
        "face enrolled"
    );
    Ok(stored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::{BoundingBox, DetectedFace};
    use crate::preprocess::FaceImage;
    use async_trait::async_trait;
    use facekit_gallery::{DistanceMetric, GalleryError, Metric};
    use parking_lot::Mutex;
    use std::thread::{self, ThreadId};

    struct Faces(Vec<DetectedFace>);

    #[async_trait]
    impl FaceDetector for Faces {
        async fn detect(&self, _frame: &Frame) -> Result<Vec<DetectedFace>, PipelineError> {
            Ok(self.0.clone())
        }
    }

    struct Broken;

    #[async_trait]
    impl FaceDetector for Broken {
        async fn detect(&self, _frame: &Frame) -> Result<Vec<DetectedFace>, PipelineError> {
            Err(PipelineError::Detection("offline".into()))
        }
    }

    /// Embeds a face as the (red, green) value of its first pixel and
    /// remembers which thread did the work.
    #[derive(Default)]
    struct PixelEmbedder {
        thread: Mutex<Option<ThreadId>>,
    }

    impl FaceEmbedder for PixelEmbedder {
        fn embed(&self, face: &FaceImage) -> Result<Vec<f32>, PipelineError> {
            *self.thread.lock() = Some(thread::current().id());
            Ok(vec![face.rgb[0] as f32, face.rgb[1] as f32])
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    fn embedder() -> Arc<dyn FaceEmbedder> {
        Arc::new(PixelEmbedder::default())
    }

    fn store() -> Arc<IdentityStore> {
        let metric = DistanceMetric::new(Metric::Euclidean, 1.0).unwrap();
        Arc::new(IdentityStore::in_memory("enroll", 2, metric).unwrap())
    }

    fn solid(r: u8, g: u8) -> Frame {
        let rgb: Vec<u8> = std::iter::repeat([r, g, 0]).take(64).flatten().collect();
        Frame::new(8, 8, rgb).unwrap()
    }

    fn one_face() -> Faces {
        Faces(vec![DetectedFace::new(BoundingBox::new(1, 1, 5, 5))])
    }

    async fn enroll_one(
        store: &Arc<IdentityStore>,
        frame: &Frame,
        name: &str,
        mode: EnrollMode,
    ) -> Result<IdentityRecord, PipelineError> {
        enroll(&one_face(), embedder(), Arc::clone(store), frame, name, mode).await
    }

    #[tokio::test]
    async fn enroll_and_merge() {
        let store = store();
        let rec = enroll_one(&store, &solid(2, 0), "carol", EnrollMode::Merge)
            .await
            .unwrap();
        assert_eq!(rec.vector().to_vec(), vec![2.0, 0.0]);
        assert_eq!(rec.weight(), 1);

        // (2*1 + 4) / 1 + 1 = 7
        let rec = enroll_one(&store, &solid(4, 0), "carol", EnrollMode::Merge)
            .await
            .unwrap();
        assert_eq!(rec.vector().to_vec(), vec![7.0, 1.0]);
        assert_eq!(rec.weight(), 2);
        assert_eq!(store.get_record("carol").unwrap(), rec);
    }

    #[tokio::test]
    async fn replace_resets_weight() {
        let store = store();
        for _ in 0..3 {
            enroll_one(&store, &solid(2, 0), "dave", EnrollMode::Merge)
                .await
                .unwrap();
        }
        let rec = enroll_one(&store, &solid(9, 9), "dave", EnrollMode::Replace)
            .await
            .unwrap();
        assert_eq!(rec.weight(), 1);
        assert_eq!(store.get_vector("dave").unwrap(), vec![9.0, 9.0]);
    }

    #[tokio::test]
    async fn embedding_runs_off_the_async_thread() {
        let store = store();
        let pixel = Arc::new(PixelEmbedder::default());
        let emb: Arc<dyn FaceEmbedder> = pixel.clone();
        enroll(&one_face(), emb, store, &solid(2, 0), "erin", EnrollMode::Merge)
            .await
            .unwrap();

        let worker = *pixel.thread.lock();
        let worker = worker.expect("embedder was called");
        assert_ne!(worker, thread::current().id());
    }

    #[tokio::test]
    async fn face_count_and_position_are_checked() {
        let store = store();
        let frame = solid(1, 1);
        let run = |detector: Faces| {
            let store = Arc::clone(&store);
            let frame = frame.clone();
            async move {
                enroll(&detector, embedder(), store, &frame, "x", EnrollMode::Merge).await
            }
        };

        let err = run(Faces(vec![])).await;
        assert!(matches!(err, Err(PipelineError::NoFace)));

        let err = run(Faces(vec![
            DetectedFace::new(BoundingBox::new(1, 1, 3, 3)),
            DetectedFace::new(BoundingBox::new(4, 4, 6, 6)),
        ]))
        .await;
        assert!(matches!(err, Err(PipelineError::MultipleFaces(2))));

        let err = run(Faces(vec![DetectedFace::new(BoundingBox::new(0, 1, 3, 3))])).await;
        assert!(matches!(err, Err(PipelineError::FaceOffImage)));

        let err = enroll(&Broken, embedder(), Arc::clone(&store), &frame, "x", EnrollMode::Merge)
            .await;
        assert!(matches!(err, Err(PipelineError::Detection(_))));

        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn gallery_errors_pass_through() {
        let store = store();
        let err = enroll_one(&store, &solid(1, 1), "", EnrollMode::Merge).await;
        assert!(matches!(
            err,
            Err(PipelineError::Gallery(GalleryError::InvalidName(_)))
        ));
    }
}
