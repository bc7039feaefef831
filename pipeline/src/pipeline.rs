//! Background recognition loop.
//!
//! The loop takes the newest frame from a [`FrameChannel`], detects faces,
//! and matches each face against an [`IdentityStore`]. Only one pass runs at
//! a time; frames that arrive meanwhile overwrite each other, so the loop
//! always works on the freshest picture.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use facekit_gallery::{IdentityStore, UNKNOWN_NAME};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::detector::{BoundingBox, DetectedFace, FaceDetector};
use crate::embedder::FaceEmbedder;
use crate::frame::{Frame, FrameChannel};
use crate::preprocess::crop_face;
use crate::PipelineError;

/// Lifecycle of a [`RecognitionPipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running,
    Stopping,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// How long the loop sleeps when there is no frame, or while a timed-out
    /// detection or recognition task is still running.
    pub idle_interval: Duration,
    /// Limit for each of detection and recognition. `None` waits forever.
    pub pass_timeout: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            idle_interval: Duration::from_millis(100),
            pass_timeout: Some(Duration::from_secs(5)),
        }
    }
}

/// One face and who it is.
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    pub bbox: BoundingBox,
    /// Matched identity, or [`UNKNOWN_NAME`].
    pub name: String,
    /// Distance to the nearest identity, when there was one to compare with.
    pub distance: Option<f64>,
}

impl Recognition {
    fn unknown(bbox: BoundingBox) -> Self {
        Self {
            bbox,
            name: UNKNOWN_NAME.to_string(),
            distance: None,
        }
    }

    pub fn is_known(&self) -> bool {
        self.name != UNKNOWN_NAME
    }
}

/// Faces found in one frame, in detector order.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionResult {
    pub frame_seq: u64,
    pub faces: Vec<Recognition>,
}

/// Counters since the pipeline was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Passes that published a result.
    pub passes: u64,
    /// Passes abandoned because the detector or the recognition task failed.
    pub failures: u64,
    /// Passes abandoned because detection or recognition took too long.
    pub timeouts: u64,
    /// Frames overwritten before the loop could take them.
    pub frames_dropped: u64,
}

#[derive(Default)]
struct Counters {
    passes: AtomicU64,
    failures: AtomicU64,
    timeouts: AtomicU64,
}

struct Shared {
    detector: Arc<dyn FaceDetector>,
    embedder: Arc<dyn FaceEmbedder>,
    store: Arc<IdentityStore>,
    config: PipelineConfig,
    frames: FrameChannel,
    results: watch::Sender<Option<Arc<RecognitionResult>>>,
    counters: Counters,
    state: Mutex<PipelineState>,
}

/// Runs face recognition on the latest frame, continuously.
///
/// Feed frames through [`RecognitionPipeline::frames`]; read results with
/// [`RecognitionPipeline::latest`] or [`RecognitionPipeline::subscribe`].
///
/// Errors inside a pass (a failing detector, a slow embedder) are logged and
/// counted in [`RecognitionPipeline::stats`]; they never stop the loop.
pub struct RecognitionPipeline {
    shared: Arc<Shared>,
    cancel: Mutex<CancellationToken>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RecognitionPipeline {
    pub fn new(
        detector: Arc<dyn FaceDetector>,
        embedder: Arc<dyn FaceEmbedder>,
        store: Arc<IdentityStore>,
        config: PipelineConfig,
    ) -> Self {
        if embedder.dimension() != store.dim() {
            warn!(
                gallery = %store.id(),
                embedder_dim = embedder.dimension(),
                gallery_dim = store.dim(),
                "embedder and gallery dimensions differ; every face will be unknown"
            );
        }
        let (results, _) = watch::channel(None);
        Self {
            shared: Arc::new(Shared {
                detector,
                embedder,
                store,
                config,
                frames: FrameChannel::new(),
                results,
                counters: Counters::default(),
                state: Mutex::new(PipelineState::Idle),
            }),
            cancel: Mutex::new(CancellationToken::new()),
            task: Mutex::new(None),
        }
    }

    /// Producer handle. Setting a frame never blocks.
    pub fn frames(&self) -> FrameChannel {
        self.shared.frames.clone()
    }

    pub fn store(&self) -> &Arc<IdentityStore> {
        &self.shared.store
    }

    pub fn state(&self) -> PipelineState {
        *self.shared.state.lock()
    }

    /// Starts the loop on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn start(&self) -> Result<(), PipelineError> {
        {
            let mut state = self.shared.state.lock();
            if *state != PipelineState::Idle {
                return Err(PipelineError::AlreadyRunning);
            }
            *state = PipelineState::Running;
        }

        let cancel = CancellationToken::new();
        *self.cancel.lock() = cancel.clone();

        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(async move {
            debug!(gallery = %shared.store.id(), "recognition loop started");
            shared.run(cancel).await;
            *shared.state.lock() = PipelineState::Idle;
            debug!(gallery = %shared.store.id(), "recognition loop stopped");
        });
        *self.task.lock() = Some(handle);
        Ok(())
    }

    /// Asks the loop to stop. A pass already under way finishes first.
    pub fn stop(&self) {
        {
            let mut state = self.shared.state.lock();
            if *state == PipelineState::Running {
                *state = PipelineState::Stopping;
            }
        }
        self.cancel.lock().cancel();
    }

    /// Waits until the loop has exited.
    pub async fn join(&self) {
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("recognition loop ended abnormally: {}", e);
                *self.shared.state.lock() = PipelineState::Idle;
            }
        }
    }

    /// Result of the most recent completed pass.
    pub fn latest(&self) -> Option<Arc<RecognitionResult>> {
        self.shared.results.borrow().clone()
    }

    /// Receiver that is notified whenever a newer result is published.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<RecognitionResult>>> {
        self.shared.results.subscribe()
    }

    pub fn stats(&self) -> PipelineStats {
        let c = &self.shared.counters;
        PipelineStats {
            passes: c.passes.load(Ordering::Relaxed),
            failures: c.failures.load(Ordering::Relaxed),
            timeouts: c.timeouts.load(Ordering::Relaxed),
            frames_dropped: self.shared.frames.dropped(),
        }
    }
}

impl Drop for RecognitionPipeline {
    fn drop(&mut self) {
        self.cancel.lock().cancel();
    }
}

/// A detection or recognition task that outlived its timeout.
enum Straggler {
    Detection(JoinHandle<Result<Vec<DetectedFace>, PipelineError>>),
    Recognition(JoinHandle<Vec<Recognition>>),
}

impl Straggler {
    fn is_finished(&self) -> bool {
        match self {
            Self::Detection(task) => task.is_finished(),
            Self::Recognition(task) => task.is_finished(),
        }
    }

    fn stage(&self) -> &'static str {
        match self {
            Self::Detection(_) => "detection",
            Self::Recognition(_) => "recognition",
        }
    }
}

impl Shared {
    async fn run(&self, cancel: CancellationToken) {
        // No new pass starts until a timed-out task completes; its result
        // is discarded.
        let mut straggler: Option<Straggler> = None;

        while !cancel.is_cancelled() {
            if let Some(task) = straggler.take() {
                if !task.is_finished() {
                    straggler = Some(task);
                    if self.idle(&cancel).await {
                        break;
                    }
                    continue;
                }
                debug!(stage = task.stage(), "timed-out task finished, result discarded");
            }

            let Some(frame) = self.frames.take_latest() else {
                if self.idle(&cancel).await {
                    break;
                }
                continue;
            };

            let seq = frame.seq();
            match self.pass(frame, &mut straggler).await {
                Ok(result) => {
                    self.counters.passes.fetch_add(1, Ordering::Relaxed);
                    debug!(frame_seq = seq, faces = result.faces.len(), "pass complete");
                    self.publish(result);
                }
                Err(PipelineError::Timeout(stage)) => {
                    self.counters.timeouts.fetch_add(1, Ordering::Relaxed);
                    warn!(frame_seq = seq, stage, "pass timed out, frame dropped");
                }
                Err(e) => {
                    self.counters.failures.fetch_add(1, Ordering::Relaxed);
                    warn!(frame_seq = seq, "pass failed: {}", e);
                }
            }
        }
    }

    /// Sleeps for the idle interval. Returns true if cancelled meanwhile.
    async fn idle(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => true,
            _ = tokio::time::sleep(self.config.idle_interval) => false,
        }
    }

    /// Runs detection and recognition for one frame. Both stages run as
    /// owned tasks; a stage that times out is parked in `straggler`.
    async fn pass(
        &self,
        frame: Frame,
        straggler: &mut Option<Straggler>,
    ) -> Result<RecognitionResult, PipelineError> {
        let seq = frame.seq();
        let limit = self.config.pass_timeout;

        let detector = Arc::clone(&self.detector);
        let detect_frame = frame.clone();
        let mut detection = tokio::spawn(async move { detector.detect(&detect_frame).await });
        let faces = match with_timeout(limit, &mut detection).await {
            Some(Ok(result)) => result?,
            Some(Err(e)) => return Err(PipelineError::Detection(format!("detection task: {e}"))),
            None => {
                *straggler = Some(Straggler::Detection(detection));
                return Err(PipelineError::Timeout("detection"));
            }
        };
        if faces.is_empty() {
            return Ok(RecognitionResult {
                frame_seq: seq,
                faces: Vec::new(),
            });
        }

        let embedder = Arc::clone(&self.embedder);
        let store = Arc::clone(&self.store);
        let mut recognition = tokio::task::spawn_blocking(move || {
            recognize_faces(embedder.as_ref(), &store, &frame, &faces)
        });
        match with_timeout(limit, &mut recognition).await {
            Some(Ok(faces)) => Ok(RecognitionResult {
                frame_seq: seq,
                faces,
            }),
            Some(Err(e)) => Err(PipelineError::Embedding(format!("recognition task: {e}"))),
            None => {
                *straggler = Some(Straggler::Recognition(recognition));
                Err(PipelineError::Timeout("recognition"))
            }
        }
    }

    fn publish(&self, result: RecognitionResult) {
        let seq = result.frame_seq;
        let result = Arc::new(result);
        self.results.send_if_modified(|current| {
            if current.as_ref().is_some_and(|c| c.frame_seq >= seq) {
                return false;
            }
            *current = Some(result);
            true
        });
    }
}

async fn with_timeout<F: Future>(limit: Option<Duration>, fut: F) -> Option<F::Output> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.ok(),
        None => Some(fut.await),
    }
}

/// Embeds and identifies every face, keeping detector order. Faces that
/// cannot be cropped, embedded or matched come back as unknown.
fn recognize_faces(
    embedder: &dyn FaceEmbedder,
    store: &IdentityStore,
    frame: &Frame,
    faces: &[DetectedFace],
) -> Vec<Recognition> {
    faces
        .iter()
        .map(|face| {
            let Some(image) = crop_face(frame, face) else {
                return Recognition::unknown(face.bbox);
            };
            let vector = match embedder.embed(&image) {
                Ok(v) => v,
                Err(e) => {
                    warn!(frame_seq = frame.seq(), "embedding failed: {}", e);
                    return Recognition::unknown(face.bbox);
                }
            };
            match store.find_closest_with_threshold(&vector) {
                Ok(id) => Recognition {
                    bbox: face.bbox,
                    name: id.display_name().to_string(),
                    distance: id.nearest().map(|m| m.distance),
                },
                Err(e) => {
                    warn!(frame_seq = frame.seq(), gallery = %store.id(), "query rejected: {}", e);
                    Recognition::unknown(face.bbox)
                }
            }
        })
        .collect()
}
