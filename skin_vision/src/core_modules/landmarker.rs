// THEORY:
// Facial landmarks come from an external detector; the engine never computes
// them. This module defines the seam. A `LandmarkSource` answers one question,
// "where are the face landmarks in this frame?", in two modes: streaming (per
// video frame, latency matters) and one-shot (a still image).
//
// Models are loaded through a `LandmarkerFactory`. Loading tries the accelerated
// delegate first and the CPU delegate once after that; only when both fail does
// the caller see a `ModelLoad` error. In streaming mode a detection error is
// absorbed as a miss, because the next frame will try again anyway.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::core_modules::face::{FaceObservation, Landmarks};
use crate::core_modules::frame::frame::Frame;
use crate::error::{VisionError, VisionResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionMode {
    /// Per video frame.
    Streaming,
    /// A single still image.
    OneShot,
}

/// Execution backend of a landmark model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delegate {
    Gpu,
    Cpu,
}

impl Delegate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Delegate::Gpu => "gpu",
            Delegate::Cpu => "cpu",
        }
    }
}

/// A loaded landmark detector.
#[async_trait]
pub trait LandmarkSource: Send + Sync {
    /// Landmarks of the most prominent face, normalized to the frame. An empty
    /// list means no face; `Err` means the detector itself failed.
    async fn detect(&self, frame: Arc<Frame>, mode: DetectionMode) -> VisionResult<Landmarks>;
}

/// Loads landmark detectors.
#[async_trait]
pub trait LandmarkerFactory: Send + Sync {
    async fn load(&self, delegate: Delegate) -> VisionResult<Arc<dyn LandmarkSource>>;
}

/// Loads a detector, falling back from GPU to CPU once.
pub async fn load_landmarker(factory: &dyn LandmarkerFactory) -> VisionResult<(Arc<dyn LandmarkSource>, Delegate)> {
    let gpu_error = match factory.load(Delegate::Gpu).await {
        Ok(source) => {
            info!(delegate = "gpu", "landmark model loaded");
            return Ok((source, Delegate::Gpu));
        }
        Err(e) => e,
    };
    warn!(error = %gpu_error, "gpu landmark model failed, retrying on cpu");

    match factory.load(Delegate::Cpu).await {
        Ok(source) => {
            info!(delegate = "cpu", "landmark model loaded");
            Ok((source, Delegate::Cpu))
        }
        Err(cpu_error) => Err(VisionError::ModelLoad(format!(
            "gpu: {gpu_error}; cpu: {cpu_error}"
        ))),
    }
}

/// Streaming detection that never fails: detector errors become a miss.
pub async fn observe(source: &dyn LandmarkSource, frame: Arc<Frame>) -> FaceObservation {
    match source.detect(frame, DetectionMode::Streaming).await {
        Ok(landmarks) => FaceObservation::from_landmarks(&landmarks),
        Err(e) => {
            warn!(error = %e, "landmark detection failed, treating frame as a miss");
            FaceObservation::not_found()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::face::Point2;
    use crate::core_modules::pixel::pixel::Pixel;
    use std::sync::Mutex;

    struct FixedSource(VisionResult<Landmarks>);

    #[async_trait]
    impl LandmarkSource for FixedSource {
        async fn detect(&self, _frame: Arc<Frame>, _mode: DetectionMode) -> VisionResult<Landmarks> {
            match &self.0 {
                Ok(l) => Ok(l.clone()),
                Err(_) => Err(VisionError::detection("boom")),
            }
        }
    }

    struct Factory {
        gpu_ok: bool,
        cpu_ok: bool,
        attempts: Mutex<Vec<Delegate>>,
    }

    #[async_trait]
    impl LandmarkerFactory for Factory {
        async fn load(&self, delegate: Delegate) -> VisionResult<Arc<dyn LandmarkSource>> {
            self.attempts.lock().unwrap().push(delegate);
            let ok = match delegate {
                Delegate::Gpu => self.gpu_ok,
                Delegate::Cpu => self.cpu_ok,
            };
            if ok {
                Ok(Arc::new(FixedSource(Ok(Landmarks::empty()))))
            } else {
                Err(VisionError::ModelLoad(format!("{} unavailable", delegate.as_str())))
            }
        }
    }

    fn factory(gpu_ok: bool, cpu_ok: bool) -> Factory {
        Factory { gpu_ok, cpu_ok, attempts: Mutex::new(Vec::new()) }
    }

    #[tokio::test]
    async fn gpu_is_preferred() {
        let f = factory(true, true);
        let (_, delegate) = load_landmarker(&f).await.unwrap();
        assert_eq!(delegate, Delegate::Gpu);
        assert_eq!(*f.attempts.lock().unwrap(), vec![Delegate::Gpu]);
    }

    #[tokio::test]
    async fn falls_back_to_cpu_once() {
        let f = factory(false, true);
        let (_, delegate) = load_landmarker(&f).await.unwrap();
        assert_eq!(delegate, Delegate::Cpu);
        assert_eq!(*f.attempts.lock().unwrap(), vec![Delegate::Gpu, Delegate::Cpu]);
    }

    #[tokio::test]
    async fn both_failing_is_a_model_load_error() {
        let f = factory(false, false);
        let err = load_landmarker(&f).await.err().unwrap();
        assert!(matches!(err, VisionError::ModelLoad(ref m) if m.contains("gpu") && m.contains("cpu")));
    }

    #[tokio::test]
    async fn detection_errors_become_misses() {
        let frame = Arc::new(Frame::filled(4, 4, Pixel::new(0, 0, 0, 255)));
        let failing = FixedSource(Err(VisionError::detection("boom")));
        assert!(!observe(&failing, frame.clone()).await.found);

        let face = Landmarks::new(vec![Point2::new(0.2, 0.2), Point2::new(0.5, 0.5), Point2::new(0.8, 0.8)]);
        assert!(observe(&FixedSource(Ok(face)), frame).await.found);
    }
}
