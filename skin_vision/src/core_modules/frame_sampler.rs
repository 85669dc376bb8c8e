// THEORY:
// The Frame Quality Sampler runs on a fixed timer while the capture surface is
// live. On each tick it shrinks the current frame to the working width, converts
// it to luma, and measures:
//
// - brightness: mean luma / 255;
// - sharpness: Laplacian variance / an empirical divisor, clamped to [0, 1];
//
// then hands both, together with the most recent `FaceObservation`, to the pure
// aggregator. Face coverage and pose are never recomputed here. The only state
// the sampler keeps between ticks is its working buffers.

use crate::config::SamplerConfig;
use crate::core_modules::face::FaceObservation;
use crate::core_modules::frame::frame::{DownsampleBuffer, Frame};
use crate::core_modules::luma_plane::LumaPlane;
use crate::core_modules::quality::{QualitySample, aggregate, clamp01};

/// Raw brightness and sharpness of a frame, both in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSignals {
    pub brightness: f64,
    pub sharpness: f64,
}

pub struct FrameQualitySampler {
    config: SamplerConfig,
    downsampled: DownsampleBuffer,
    luma: LumaPlane,
}

impl FrameQualitySampler {
    pub fn new(config: SamplerConfig) -> Self {
        Self {
            config,
            downsampled: DownsampleBuffer::new(),
            luma: LumaPlane::new(),
        }
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Measures brightness and sharpness of `frame`.
    pub fn measure(&mut self, frame: &Frame) -> FrameSignals {
        self.downsampled.fill_from(frame, self.config.working_width);
        self.luma.fill_from(&self.downsampled);

        let brightness = clamp01(self.luma.mean() / 255.0);
        let divisor = self.config.sharpness_divisor.max(f64::EPSILON);
        let sharpness = clamp01(self.luma.laplacian_variance() / divisor);
        FrameSignals { brightness, sharpness }
    }

    /// One sampling tick: measure the frame and aggregate with the latest observation.
    pub fn sample(&mut self, frame: &Frame, face: &FaceObservation) -> QualitySample {
        let signals = self.measure(frame);
        aggregate(signals.brightness, signals.sharpness, face)
    }
}
