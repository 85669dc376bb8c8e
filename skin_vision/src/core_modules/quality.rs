// THEORY:
// The Quality Aggregator folds the raw per-tick signals into one 0..1 score and a
// list of warnings. It is a pure function: same inputs, bit-identical output, no
// hidden state. The score is
//
//     score = found ? 0.45 * sharpness + 0.35 * bright_centered + 0.20 * size_score : 0
//     bright_centered = max(0, 1 - |brightness - 0.55| / 0.55)
//     size_score      = min(1, coverage / 0.20)
//
// Warnings come from fixed thresholds and are computed independently of the
// score; several may fire at once and all of them are reported.

use serde::{Deserialize, Serialize};

use crate::core_modules::face::{FaceObservation, Pose};

const SHARPNESS_WEIGHT: f64 = 0.45;
const BRIGHTNESS_WEIGHT: f64 = 0.35;
const SIZE_WEIGHT: f64 = 0.20;

const BRIGHTNESS_TARGET: f64 = 0.55;
const FULL_SIZE_COVERAGE: f64 = 0.20;

const LOW_BRIGHTNESS: f64 = 0.25;
const HIGH_BRIGHTNESS: f64 = 0.88;
const LOW_SHARPNESS: f64 = 0.25;
const MIN_COVERAGE: f64 = 0.08;

/// A reason the current frame is not a good capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityWarning {
    LowLight,
    Overexposed,
    Blurry,
    NoFace,
    FaceTooSmall,
}

impl QualityWarning {
    /// User-facing retake hint.
    pub fn message(&self) -> &'static str {
        match self {
            QualityWarning::LowLight => "Lighting is low; move to brighter, even light.",
            QualityWarning::Overexposed => "Lighting is very strong; avoid overexposure.",
            QualityWarning::Blurry => "Image is blurry; hold still and refocus.",
            QualityWarning::NoFace => "No face detected. Ensure your full face is visible.",
            QualityWarning::FaceTooSmall => "Move closer to the camera; face is too small in frame.",
        }
    }
}

impl std::fmt::Display for QualityWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// The aggregated quality of one sampling tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualitySample {
    pub score: f64,
    pub brightness: f64,
    pub sharpness: f64,
    pub face_coverage: f64,
    pub pose: Pose,
    pub warnings: Vec<QualityWarning>,
}

impl QualitySample {
    /// The sample reported before the first tick: nothing seen yet.
    pub fn empty() -> Self {
        aggregate(0.0, 0.0, &FaceObservation::not_found())
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Combines brightness, sharpness and the face observation into a `QualitySample`.
///
/// Inputs outside [0, 1] (or NaN) are clamped before use.
pub fn aggregate(brightness: f64, sharpness: f64, face: &FaceObservation) -> QualitySample {
    let brightness = clamp01(brightness);
    let sharpness = clamp01(sharpness);
    let face_coverage = if face.found { clamp01(face.coverage) } else { 0.0 };

    let score = if face.found {
        let bright_centered =
            (1.0 - (brightness - BRIGHTNESS_TARGET).abs() / BRIGHTNESS_TARGET).max(0.0);
        let size_score = (face_coverage / FULL_SIZE_COVERAGE).min(1.0);
        clamp01(
            SHARPNESS_WEIGHT * sharpness
                + BRIGHTNESS_WEIGHT * bright_centered
                + SIZE_WEIGHT * size_score,
        )
    } else {
        0.0
    };

    QualitySample {
        score,
        brightness,
        sharpness,
        face_coverage,
        pose: face.pose(),
        warnings: warnings_for(brightness, sharpness, face.found, face_coverage),
    }
}

fn warnings_for(brightness: f64, sharpness: f64, found: bool, coverage: f64) -> Vec<QualityWarning> {
    let mut warnings = Vec::new();
    if brightness < LOW_BRIGHTNESS {
        warnings.push(QualityWarning::LowLight);
    }
    if brightness > HIGH_BRIGHTNESS {
        warnings.push(QualityWarning::Overexposed);
    }
    if sharpness < LOW_SHARPNESS {
        warnings.push(QualityWarning::Blurry);
    }
    if !found {
        warnings.push(QualityWarning::NoFace);
    } else if coverage < MIN_COVERAGE {
        warnings.push(QualityWarning::FaceTooSmall);
    }
    warnings
}

/// Clamps into [0, 1]; NaN maps to 0.
pub(crate) fn clamp01(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}
