// THEORY:
// This file is the entry point of the `skin_vision` library crate. It exposes two
// high-level surfaces and keeps everything else under `core_modules`:
//
// 1.  **`CaptureSession`** (in `pipeline`): drives a live camera, scores frame
//     quality, decides when to auto-capture, and streams overlay commands.
// 2.  **`ConcernMapRenderer`**: turns a finished analysis result and its still
//     image into draw commands (photo, concern glows or heatmaps, callouts).
//
// Camera and landmark detection are capabilities supplied by the host through
// the `CameraSource` and `LandmarkerFactory` traits. Drawing is likewise handed
// off as `DrawCommand`s; `RasterSurface` is the bundled CPU backend.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod pipeline;

pub use config::VisionConfig;
pub use core_modules::analysis::{AnalysisResult, MetricResult};
pub use core_modules::camera::CameraSource;
pub use core_modules::capture_store::{CaptureItem, CaptureOrigin};
pub use core_modules::concern_map::{ConcernMapRenderer, MetricView, RenderStatus, StillImage};
pub use core_modules::draw::{DrawBackend, DrawCommand};
pub use core_modules::face::{FaceObservation, Landmarks, Point2, Pose};
pub use core_modules::frame::frame::Frame;
pub use core_modules::landmarker::{Delegate, DetectionMode, LandmarkSource, LandmarkerFactory};
pub use core_modules::quality::{QualitySample, QualityWarning};
pub use core_modules::raster::RasterSurface;
pub use error::{VisionError, VisionResult};
pub use pipeline::{CaptureHandle, CaptureSession, SessionEvent, SessionStatus};
