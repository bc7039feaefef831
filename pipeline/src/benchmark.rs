//! Side-by-side comparison of embedding models over a set of photos.
//!
//! Every face found in the photos is identified once per model against that
//! model's own gallery. Models run in parallel, each on its own blocking
//! thread, and report how long they took.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use facekit_gallery::{IdentityStore, UNKNOWN_NAME};
use tracing::{debug, warn};

use crate::detector::{BoundingBox, FaceDetector};
use crate::embedder::FaceEmbedder;
use crate::frame::Frame;
use crate::preprocess::{crop_face, FaceImage};
use crate::PipelineError;

/// An embedding model paired with the gallery enrolled through it.
#[derive(Clone)]
pub struct BenchmarkModel {
    pub name: String,
    pub embedder: Arc<dyn FaceEmbedder>,
    pub store: Arc<IdentityStore>,
}

impl BenchmarkModel {
    pub fn new(
        name: impl Into<String>,
        embedder: Arc<dyn FaceEmbedder>,
        store: Arc<IdentityStore>,
    ) -> Self {
        Self {
            name: name.into(),
            embedder,
            store,
        }
    }
}

/// One face and the name each model gave it.
#[derive(Debug, Clone)]
pub struct BenchmarkFace {
    /// Index of the photo the face came from.
    pub photo: usize,
    pub bbox: BoundingBox,
    pub face: FaceImage,
    /// Model name to the nearest enrolled identity, or [`UNKNOWN_NAME`].
    pub names: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelTiming {
    pub model: String,
    /// Wall time spent embedding and matching every face.
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct BenchmarkReport {
    /// Faces in photo order, then detector order.
    pub faces: Vec<BenchmarkFace>,
    /// One entry per model, in the order the models were given.
    pub timings: Vec<ModelTiming>,
}

/// Detects the faces in `photos` and identifies each with every model.
///
/// Faces touching the image border are skipped. The reported name is the
/// nearest enrolled identity with no threshold applied, so models can be
/// compared on the same footing; a failed embedding or an empty gallery
/// reports [`UNKNOWN_NAME`]. A detector error aborts the run.
pub async fn run_benchmark(
    detector: &dyn FaceDetector,
    models: &[BenchmarkModel],
    photos: &[Frame],
) -> Result<BenchmarkReport, PipelineError> {
    let mut faces = Vec::new();
    for (photo, frame) in photos.iter().enumerate() {
        for detected in detector.detect(frame).await? {
            if let Some(face) = crop_face(frame, &detected) {
                faces.push(BenchmarkFace {
                    photo,
                    bbox: detected.bbox,
                    face,
                    names: BTreeMap::new(),
                });
            }
        }
    }
    debug!(
        photos = photos.len(),
        faces = faces.len(),
        models = models.len(),
        "benchmark started"
    );

    let images: Arc<Vec<FaceImage>> = Arc::new(faces.iter().map(|f| f.face.clone()).collect());
    let tasks: Vec<_> = models
        .iter()
        .map(|model| {
            let model = model.clone();
            let images = Arc::clone(&images);
            tokio::task::spawn_blocking(move || {
                let started = Instant::now();
                let names = identify_all(&model, &images);
                (model.name, names, started.elapsed())
            })
        })
        .collect();

    let mut timings = Vec::with_capacity(tasks.len());
    for task in tasks {
        let (model, names, elapsed) = task
            .await
            .map_err(|e| PipelineError::Embedding(format!("benchmark task: {e}")))?;
        debug!(model = %model, elapsed_ms = elapsed.as_millis() as u64, "model finished");
        for (face, name) in faces.iter_mut().zip(names) {
            face.names.insert(model.clone(), name);
        }
        timings.push(ModelTiming { model, elapsed });
    }

    Ok(BenchmarkReport { faces, timings })
}

fn identify_all(model: &BenchmarkModel, images: &[FaceImage]) -> Vec<String> {
    images
        .iter()
        .map(|image| {
            let nearest = model
                .embedder
                .embed(image)
                .and_then(|v| Ok(model.store.find_closest(&v)?));
            match nearest {
                Ok(Some(m)) => m.name().to_string(),
                Ok(None) => UNKNOWN_NAME.to_string(),
                Err(e) => {
                    warn!(model = %model.name, "benchmark face failed: {}", e);
                    UNKNOWN_NAME.to_string()
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::DetectedFace;
    use async_trait::async_trait;
    use facekit_gallery::{DistanceMetric, IdentityRecord, Metric};

    /// Reports a face in the middle and one on the border of every photo.
    struct TwoFaces;

    #[async_trait]
    impl FaceDetector for TwoFaces {
        async fn detect(&self, _frame: &Frame) -> Result<Vec<DetectedFace>, PipelineError> {
            Ok(vec![
                DetectedFace::new(BoundingBox::new(2, 2, 6, 6)),
                DetectedFace::new(BoundingBox::new(0, 0, 3, 3)),
            ])
        }
    }

    struct Offline;

    #[async_trait]
    impl FaceDetector for Offline {
        async fn detect(&self, _frame: &Frame) -> Result<Vec<DetectedFace>, PipelineError> {
            Err(PipelineError::Detection("offline".into()))
        }
    }

    /// Embeds the (red, green) value of the first pixel.
    struct RedGreen;

    impl FaceEmbedder for RedGreen {
        fn embed(&self, face: &FaceImage) -> Result<Vec<f32>, PipelineError> {
            Ok(vec![face.rgb[0] as f32, face.rgb[1] as f32])
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    /// Embeds only the green value, so it cannot tell red faces apart.
    struct GreenOnly;

    impl FaceEmbedder for GreenOnly {
        fn embed(&self, face: &FaceImage) -> Result<Vec<f32>, PipelineError> {
            Ok(vec![face.rgb[1] as f32])
        }

        fn dimension(&self) -> usize {
            1
        }
    }

    struct Failing;

    impl FaceEmbedder for Failing {
        fn embed(&self, _face: &FaceImage) -> Result<Vec<f32>, PipelineError> {
            Err(PipelineError::Embedding("no model".into()))
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    fn gallery(id: &str, dim: usize, records: &[(&str, Vec<f32>)]) -> Arc<IdentityStore> {
        let metric = DistanceMetric::new(Metric::Euclidean, 0.5).unwrap();
        let store = IdentityStore::in_memory(id, dim, metric).unwrap();
        for (name, v) in records {
            store.add_record(IdentityRecord::new(*name, v.clone())).unwrap();
        }
        Arc::new(store)
    }

    fn solid(r: u8, g: u8) -> Frame {
        let rgb: Vec<u8> = std::iter::repeat([r, g, 0]).take(64).flatten().collect();
        Frame::new(8, 8, rgb).unwrap()
    }

    #[tokio::test]
    async fn every_model_names_every_face() {
        let models = vec![
            BenchmarkModel::new(
                "redgreen",
                Arc::new(RedGreen),
                gallery("redgreen", 2, &[("alice", vec![10.0, 0.0]), ("bob", vec![90.0, 0.0])]),
            ),
            BenchmarkModel::new(
                "green",
                Arc::new(GreenOnly),
                gallery("green", 1, &[("alice", vec![0.0]), ("carol", vec![50.0])]),
            ),
        ];
        let photos = [solid(10, 30), solid(88, 30)];

        let report = run_benchmark(&TwoFaces, &models, &photos).await.unwrap();

        // The border face of each photo is skipped.
        assert_eq!(report.faces.len(), 2);
        assert_eq!(report.faces[0].photo, 0);
        assert_eq!(report.faces[1].photo, 1);
        assert_eq!(report.faces[0].bbox, BoundingBox::new(2, 2, 6, 6));

        assert_eq!(report.faces[0].names["redgreen"], "alice");
        assert_eq!(report.faces[1].names["redgreen"], "bob");
        // Nearest identity is reported even outside the threshold.
        assert_eq!(report.faces[0].names["green"], "carol");
        assert_eq!(report.faces[1].names["green"], "carol");

        let order: Vec<_> = report.timings.iter().map(|t| t.model.as_str()).collect();
        assert_eq!(order, vec!["redgreen", "green"]);
    }

    #[tokio::test]
    async fn failures_and_empty_galleries_report_unknown() {
        let models = vec![
            BenchmarkModel::new(
                "broken",
                Arc::new(Failing),
                gallery("broken", 2, &[("a", vec![0.0, 0.0])]),
            ),
            BenchmarkModel::new("empty", Arc::new(RedGreen), gallery("empty", 2, &[])),
        ];
        let report = run_benchmark(&TwoFaces, &models, &[solid(1, 1)]).await.unwrap();
        assert_eq!(report.faces.len(), 1);
        assert_eq!(report.faces[0].names["broken"], UNKNOWN_NAME);
        assert_eq!(report.faces[0].names["empty"], UNKNOWN_NAME);
        assert_eq!(report.timings.len(), 2);
    }

    #[tokio::test]
    async fn detector_error_aborts() {
        let models = vec![BenchmarkModel::new("m", Arc::new(RedGreen), gallery("m", 2, &[]))];
        let err = run_benchmark(&Offline, &models, &[solid(1, 1)]).await;
        assert!(matches!(err, Err(PipelineError::Detection(_))));
    }

    #[tokio::test]
    async fn no_photos_no_faces() {
        let models = vec![BenchmarkModel::new("m", Arc::new(RedGreen), gallery("m", 2, &[]))];
        let report = run_benchmark(&TwoFaces, &models, &[]).await.unwrap();
        assert!(report.faces.is_empty());
        assert_eq!(report.timings.len(), 1);
    }
}
