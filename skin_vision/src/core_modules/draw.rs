// THEORY:
// Rendering is split in two. The synthesizers and the concern-map renderer never
// touch pixels; they emit a list of `DrawCommand`s, each of which carries
// everything a backend needs: colour, alpha, blend mode, clip region and blur.
// A `DrawBackend` then executes the list onto some surface.
//
// Key architectural principles:
// 1.  **Immutable Layers**: A command is a value. There is no clip/blend/filter
//     stack to push and pop, so a layer cannot inherit state from the one before.
// 2.  **Clamped at Construction**: `Rgba` and alpha values are clamped into [0, 1]
//     when a command is built. Backends never see out-of-range colour.
// 3.  **Swappable Backends**: Layout and compositing can be tested by inspecting
//     commands; the software `RasterSurface` is just one backend.

use std::sync::Arc;

use image::RgbaImage;

use crate::core_modules::face::Point2;

/// A straight-alpha colour with every channel in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    r: f32,
    g: f32,
    b: f32,
    a: f32,
}

impl Rgba {
    pub fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self {
            r: unit(r),
            g: unit(g),
            b: unit(b),
            a: unit(a),
        }
    }

    pub fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self::new(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0, 1.0)
    }

    pub fn with_alpha(self, alpha: f32) -> Self {
        Self::new(self.r, self.g, self.b, alpha)
    }

    pub fn r(&self) -> f32 {
        self.r
    }

    pub fn g(&self) -> f32 {
        self.g
    }

    pub fn b(&self) -> f32 {
        self.b
    }

    pub fn a(&self) -> f32 {
        self.a
    }

    pub fn to_rgba8(&self) -> [u8; 4] {
        [
            (self.r * 255.0).round() as u8,
            (self.g * 255.0).round() as u8,
            (self.b * 255.0).round() as u8,
            (self.a * 255.0).round() as u8,
        ]
    }
}

/// Clamps into [0, 1]; NaN maps to 0.
pub fn unit(value: f32) -> f32 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlendMode {
    #[default]
    SourceOver,
    /// `1 - (1 - src) * (1 - dst)`: only ever brightens.
    Screen,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ClipRegion {
    #[default]
    None,
    /// Axis-aligned ellipse in surface pixels.
    Ellipse { cx: f32, cy: f32, rx: f32, ry: f32 },
}

impl ClipRegion {
    pub fn contains(&self, x: f32, y: f32) -> bool {
        match *self {
            ClipRegion::None => true,
            ClipRegion::Ellipse { cx, cy, rx, ry } => {
                if rx <= 0.0 || ry <= 0.0 {
                    return false;
                }
                let dx = (x - cx) / rx;
                let dy = (y - cy) / ry;
                dx * dx + dy * dy <= 1.0
            }
        }
    }
}

/// Axis-aligned rectangle in surface pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn center_y(&self) -> f32 {
        self.y + self.height * 0.5
    }
}

/// An image composited onto the surface.
#[derive(Debug, Clone)]
pub struct ImageLayer {
    pub image: Arc<RgbaImage>,
    /// Destination on the surface; the image is scaled bilinearly to fit.
    pub dest: Rect,
    /// Global alpha multiplier, [0, 1].
    pub alpha: f32,
    pub blend: BlendMode,
    pub clip: ClipRegion,
    /// Gaussian blur sigma in surface pixels, applied after scaling. 0 disables it.
    pub blur: f32,
}

impl ImageLayer {
    pub fn new(image: Arc<RgbaImage>, dest: Rect) -> Self {
        Self {
            image,
            dest,
            alpha: 1.0,
            blend: BlendMode::SourceOver,
            clip: ClipRegion::None,
            blur: 0.0,
        }
    }

    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = unit(alpha);
        self
    }

    pub fn with_blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }

    pub fn with_clip(mut self, clip: ClipRegion) -> Self {
        self.clip = clip;
        self
    }

    pub fn with_blur(mut self, blur: f32) -> Self {
        self.blur = blur.max(0.0);
        self
    }
}

/// A single drawing operation.
#[derive(Debug, Clone)]
pub enum DrawCommand {
    /// Reset the whole surface to transparent.
    Clear,
    Image(ImageLayer),
    /// A radial gradient from `color` at the center to transparent at `radius`.
    RadialGlow {
        center: Point2,
        radius: f32,
        color: Rgba,
        blend: BlendMode,
        clip: ClipRegion,
    },
    Line {
        from: Point2,
        to: Point2,
        color: Rgba,
        width: f32,
    },
    RoundedRect {
        rect: Rect,
        radius: f32,
        fill: Rgba,
        stroke: Option<Rgba>,
    },
    /// Text with its top-left corner at `origin`.
    Text {
        origin: Point2,
        text: String,
        size: f32,
        color: Rgba,
    },
}

/// Executes draw commands onto a surface.
pub trait DrawBackend {
    fn size(&self) -> (u32, u32);

    fn execute(&mut self, command: &DrawCommand);

    fn execute_all(&mut self, commands: &[DrawCommand]) {
        for command in commands {
            self.execute(command);
        }
    }
}

/// Text metrics needed by the callout layout.
pub trait TextMeasure {
    /// Advance width of `text` at `size` pixels.
    fn measure(&self, text: &str, size: f32) -> f32;
    /// Height of a line of text at `size` pixels.
    fn line_height(&self, size: f32) -> f32;
}
