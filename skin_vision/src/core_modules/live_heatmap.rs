// THEORY:
// The Live Heatmap Synthesizer paints a soft, colour-coded overlay over the face
// while the camera is running. It is a visualization aid with a stability
// contract, not a measurement: it must not change faster than its throttle, and
// it must disappear on the first frame without a face.
//
// Key architectural principles:
// 1.  **Three Concern Signals**: On the downsampled frame every pixel gets
//     -   redness: red excess over the green/blue mean, attenuated in the dark;
//     -   shine: closeness to a bright, desaturated highlight;
//     -   texture: local Laplacian magnitude.
//     The strongest signal picks the pixel's colour and its magnitude the alpha.
//     Weak pixels stay fully transparent.
// 2.  **Throttled Emission**: A new overlay is computed at most once per
//     `min_interval`. In between, the previous overlay stays on screen.
// 3.  **Coverage Fade-in**: The overlay's global strength ramps with face
//     coverage, so a small or distant face gets no overlay at all.
// 4.  **Commands, Not Pixels**: The result is a `Clear` plus one screen-blended,
//     face-clipped, blurred image layer. The host decides how to draw it.

use std::sync::Arc;
use std::time::Instant;

use image::{Rgba as ImagePixel, RgbaImage};

use crate::config::LiveHeatmapConfig;
use crate::core_modules::draw::{BlendMode, DrawCommand, ImageLayer, Rect, Rgba, unit};
use crate::core_modules::face::FaceObservation;
use crate::core_modules::face_regions::face_ellipse;
use crate::core_modules::frame::frame::{DownsampleBuffer, Frame};
use crate::core_modules::luma_plane::LumaPlane;
use crate::core_modules::pixel::pixel::Pixel;

const REDNESS_SCALE: f32 = 96.0;
const DARK_LUMA: f32 = 0.12;
const LUMA_RAMP: f32 = 0.4;
const SHINE_VALUE_START: f32 = 200.0;
const SHINE_VALUE_RAMP: f32 = 55.0;
const SHINE_SATURATION_MAX: f32 = 90.0;
const TEXTURE_SCALE: f32 = 40.0;

/// The concern a live pixel is coloured by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveConcern {
    Redness,
    Shine,
    Texture,
}

impl LiveConcern {
    pub fn color(&self) -> Rgba {
        match self {
            LiveConcern::Redness => Rgba::from_rgb8(244, 63, 94),
            LiveConcern::Shine => Rgba::from_rgb8(56, 189, 248),
            LiveConcern::Texture => Rgba::from_rgb8(167, 139, 250),
        }
    }
}

/// Raw concern signals of one pixel, each clamped to [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConcernSignals {
    pub redness: f32,
    pub shine: f32,
    pub texture: f32,
}

impl ConcernSignals {
    pub fn measure(pixel: Pixel, laplacian: f32) -> Self {
        let luma = pixel.luma() / 255.0;
        let light = unit((luma - DARK_LUMA) / LUMA_RAMP);
        let redness = unit(pixel.red_excess().max(0.0) / REDNESS_SCALE) * light;

        let bright = unit((pixel.value_hsv() - SHINE_VALUE_START) / SHINE_VALUE_RAMP);
        let desaturated = unit((SHINE_SATURATION_MAX - pixel.saturation_hsv()) / SHINE_SATURATION_MAX);
        let shine = bright * desaturated;

        let texture = unit(laplacian.abs() / TEXTURE_SCALE);
        Self { redness, shine, texture }
    }

    /// Strongest concern and its magnitude. Ties favour redness, then shine.
    pub fn dominant(&self) -> (LiveConcern, f32) {
        let mut best = (LiveConcern::Redness, self.redness);
        if self.shine > best.1 {
            best = (LiveConcern::Shine, self.shine);
        }
        if self.texture > best.1 {
            best = (LiveConcern::Texture, self.texture);
        }
        best
    }
}

pub struct LiveHeatmapSynthesizer {
    config: LiveHeatmapConfig,
    downsampled: DownsampleBuffer,
    luma: LumaPlane,
    last_emit: Option<Instant>,
    showing: bool,
}

impl LiveHeatmapSynthesizer {
    pub fn new(config: LiveHeatmapConfig) -> Self {
        Self {
            config,
            downsampled: DownsampleBuffer::new(),
            luma: LumaPlane::new(),
            last_emit: None,
            showing: false,
        }
    }

    /// Whether the last emitted overlay is still visible.
    pub fn is_showing(&self) -> bool {
        self.showing
    }

    /// Processes a live frame. Returns the commands that replace the overlay, or
    /// `None` when the overlay should stay as it is.
    pub fn on_frame(&mut self, frame: &Frame, face: &FaceObservation, now: Instant) -> Option<Vec<DrawCommand>> {
        let bbox = match (face.found, face.bbox) {
            (true, Some(bbox)) => bbox,
            _ => return self.hide(),
        };

        if let Some(last) = self.last_emit {
            if now.saturating_duration_since(last) < self.config.min_interval {
                return None;
            }
        }

        let strength = self.strength(face.coverage);
        if strength <= 0.0 {
            return self.hide();
        }

        let overlay = self.colorize(frame);
        let (width, height) = (frame.width() as f32, frame.height() as f32);
        let face_px = bbox.scaled(width, height);
        let layer = ImageLayer::new(Arc::new(overlay), Rect::new(0.0, 0.0, width, height))
            .with_alpha(strength)
            .with_blend(BlendMode::Screen)
            .with_clip(face_ellipse(&face_px))
            .with_blur(face_px.width() * self.config.blur_fraction);

        self.last_emit = Some(now);
        self.showing = true;
        Some(vec![DrawCommand::Clear, DrawCommand::Image(layer)])
    }

    fn hide(&mut self) -> Option<Vec<DrawCommand>> {
        if !self.showing {
            return None;
        }
        self.showing = false;
        self.last_emit = None;
        Some(vec![DrawCommand::Clear])
    }

    /// Global overlay strength for a face coverage.
    pub fn strength(&self, coverage: f64) -> f32 {
        let span = (self.config.full_coverage - self.config.min_coverage).max(f64::EPSILON);
        let ramp = ((coverage - self.config.min_coverage) / span).clamp(0.0, 1.0) as f32;
        ramp * unit(self.config.max_strength)
    }

    /// Colour-codes the downsampled frame by dominant concern.
    pub fn colorize(&mut self, frame: &Frame) -> RgbaImage {
        self.downsampled.fill_from(frame, self.config.working_width);
        self.luma.fill_from(&self.downsampled);

        let (width, height) = (self.downsampled.width(), self.downsampled.height());
        let floor = unit(self.config.visibility_floor);
        let max_alpha = unit(self.config.max_alpha);

        let mut overlay = RgbaImage::new(width, height);
        for y in 0..height {
            for x in 0..width {
                let signals = ConcernSignals::measure(self.downsampled.get(x, y), self.luma.laplacian_at(x, y));
                let (concern, magnitude) = signals.dominant();
                if magnitude < floor {
                    continue;
                }
                let [r, g, b, _] = concern.color().to_rgba8();
                let alpha = (magnitude * max_alpha * 255.0).round() as u8;
                overlay.put_pixel(x, y, ImagePixel([r, g, b, alpha]));
            }
        }
        overlay
    }
}
