// THEORY:
// `RasterSurface` is the software `DrawBackend`: it executes draw commands onto an
// `image::RgbaImage` held in straight (non-premultiplied) alpha. Every primitive
// is reduced to "compute a source colour and coverage for this pixel", followed
// by one shared compositing step that honours the command's blend mode and clip.
//
// Screen blending follows the canvas compositing model: where the destination
// is transparent the source shows through unchanged, where it is opaque the
// screened colour is used, and the result is laid over the destination.

use image::imageops::{self, FilterType};
use image::{Rgba as ImagePixel, RgbaImage};

use crate::core_modules::draw::{
    BlendMode, ClipRegion, DrawBackend, DrawCommand, ImageLayer, Rect, Rgba, TextMeasure, unit,
};
use crate::core_modules::face::Point2;
use crate::core_modules::font::BitmapFont;

pub struct RasterSurface {
    image: RgbaImage,
    font: BitmapFont,
}

impl RasterSurface {
    /// A fully transparent surface.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
            font: BitmapFont,
        }
    }

    pub fn from_image(image: RgbaImage) -> Self {
        Self {
            image,
            font: BitmapFont,
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    fn composite(&mut self, x: i32, y: i32, src: [f32; 3], src_alpha: f32, blend: BlendMode, clip: ClipRegion) {
        if x < 0 || y < 0 || x as u32 >= self.image.width() || y as u32 >= self.image.height() {
            return;
        }
        let sa = unit(src_alpha);
        if sa <= 0.0 || !clip.contains(x as f32 + 0.5, y as f32 + 0.5) {
            return;
        }

        let dst = self.image.get_pixel_mut(x as u32, y as u32);
        let da = dst[3] as f32 / 255.0;
        let dc = [dst[0] as f32 / 255.0, dst[1] as f32 / 255.0, dst[2] as f32 / 255.0];

        let sc = match blend {
            BlendMode::SourceOver => src,
            BlendMode::Screen => {
                let mut mixed = [0.0; 3];
                for i in 0..3 {
                    let screened = src[i] + dc[i] - src[i] * dc[i];
                    mixed[i] = (1.0 - da) * src[i] + da * screened;
                }
                mixed
            }
        };

        let out_a = sa + da * (1.0 - sa);
        if out_a <= 0.0 {
            *dst = ImagePixel([0, 0, 0, 0]);
            return;
        }
        let mut out = [0u8; 4];
        for i in 0..3 {
            let c = (sc[i] * sa + dc[i] * da * (1.0 - sa)) / out_a;
            out[i] = (unit(c) * 255.0).round() as u8;
        }
        out[3] = (out_a * 255.0).round() as u8;
        *dst = ImagePixel(out);
    }

    fn draw_image(&mut self, layer: &ImageLayer) {
        let dest_w = layer.dest.width.round() as i64;
        let dest_h = layer.dest.height.round() as i64;
        if dest_w <= 0 || dest_h <= 0 || layer.alpha <= 0.0 {
            return;
        }
        // Guards against absurd destinations allocating unbounded buffers.
        let max_w = self.image.width() as i64 * 4;
        let max_h = self.image.height() as i64 * 4;
        let (dest_w, dest_h) = (dest_w.min(max_w.max(1)) as u32, dest_h.min(max_h.max(1)) as u32);

        let mut scaled = if layer.image.dimensions() == (dest_w, dest_h) {
            (*layer.image).clone()
        } else {
            imageops::resize(&*layer.image, dest_w, dest_h, FilterType::Triangle)
        };
        if layer.blur > 0.0 {
            scaled = imageops::blur(&scaled, layer.blur);
        }

        let origin_x = layer.dest.x.round() as i32;
        let origin_y = layer.dest.y.round() as i32;
        for (x, y, pixel) in scaled.enumerate_pixels() {
            let src = [pixel[0] as f32 / 255.0, pixel[1] as f32 / 255.0, pixel[2] as f32 / 255.0];
            let alpha = pixel[3] as f32 / 255.0 * layer.alpha;
            self.composite(origin_x + x as i32, origin_y + y as i32, src, alpha, layer.blend, layer.clip);
        }
    }

    fn draw_glow(&mut self, center: Point2, radius: f32, color: Rgba, blend: BlendMode, clip: ClipRegion) {
        if radius <= 0.0 {
            return;
        }
        let src = [color.r(), color.g(), color.b()];
        let x0 = (center.x - radius).floor() as i32;
        let x1 = (center.x + radius).ceil() as i32;
        let y0 = (center.y - radius).floor() as i32;
        let y1 = (center.y + radius).ceil() as i32;
        for y in y0..=y1 {
            for x in x0..=x1 {
                let dx = x as f32 + 0.5 - center.x;
                let dy = y as f32 + 0.5 - center.y;
                let t = (dx * dx + dy * dy).sqrt() / radius;
                if t >= 1.0 {
                    continue;
                }
                let falloff = (1.0 - t) * (1.0 - t);
                self.composite(x, y, src, color.a() * falloff, blend, clip);
            }
        }
    }

    fn draw_line(&mut self, from: Point2, to: Point2, color: Rgba, width: f32) {
        let src = [color.r(), color.g(), color.b()];
        let half = (width * 0.5).max(0.5);
        let x0 = (from.x.min(to.x) - half).floor() as i32;
        let x1 = (from.x.max(to.x) + half).ceil() as i32;
        let y0 = (from.y.min(to.y) - half).floor() as i32;
        let y1 = (from.y.max(to.y) + half).ceil() as i32;

        let (vx, vy) = (to.x - from.x, to.y - from.y);
        let len_sq = vx * vx + vy * vy;
        for y in y0..=y1 {
            for x in x0..=x1 {
                let px = x as f32 + 0.5;
                let py = y as f32 + 0.5;
                let t = if len_sq > 0.0 {
                    (((px - from.x) * vx + (py - from.y) * vy) / len_sq).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                let (cx, cy) = (from.x + vx * t, from.y + vy * t);
                let distance = ((px - cx).powi(2) + (py - cy).powi(2)).sqrt();
                if distance <= half {
                    self.composite(x, y, src, color.a(), BlendMode::SourceOver, ClipRegion::None);
                }
            }
        }
    }

    fn draw_rounded_rect(&mut self, rect: Rect, radius: f32, fill: Rgba, stroke: Option<Rgba>) {
        let radius = radius.clamp(0.0, rect.width.min(rect.height) * 0.5);
        let fill_rgb = [fill.r(), fill.g(), fill.b()];
        for y in rect.y.floor() as i32..rect.bottom().ceil() as i32 {
            for x in rect.x.floor() as i32..rect.right().ceil() as i32 {
                let (px, py) = (x as f32 + 0.5, y as f32 + 0.5);
                let Some(edge) = inset_distance(rect, radius, px, py) else {
                    continue;
                };
                match stroke {
                    Some(stroke) if edge < 1.0 => self.composite(
                        x,
                        y,
                        [stroke.r(), stroke.g(), stroke.b()],
                        stroke.a(),
                        BlendMode::SourceOver,
                        ClipRegion::None,
                    ),
                    _ => self.composite(x, y, fill_rgb, fill.a(), BlendMode::SourceOver, ClipRegion::None),
                }
            }
        }
    }

    fn draw_text(&mut self, origin: Point2, text: &str, size: f32, color: Rgba) {
        let src = [color.r(), color.g(), color.b()];
        let mut lit = Vec::new();
        self.font.rasterize(text, origin.x.round() as i32, origin.y.round() as i32, size, |x, y| {
            lit.push((x, y))
        });
        for (x, y) in lit {
            self.composite(x, y, src, color.a(), BlendMode::SourceOver, ClipRegion::None);
        }
    }
}

/// Distance from a point inside the rounded rect to its outline, or `None` outside.
fn inset_distance(rect: Rect, radius: f32, px: f32, py: f32) -> Option<f32> {
    if px < rect.x || px > rect.right() || py < rect.y || py > rect.bottom() {
        return None;
    }
    let cx = px.clamp(rect.x + radius, rect.right() - radius);
    let cy = py.clamp(rect.y + radius, rect.bottom() - radius);
    let (dx, dy) = (px - cx, py - cy);
    let corner = (dx * dx + dy * dy).sqrt();
    if radius > 0.0 && (dx != 0.0 && dy != 0.0) {
        return (corner <= radius).then_some(radius - corner);
    }
    let straight = (px - rect.x)
        .min(rect.right() - px)
        .min(py - rect.y)
        .min(rect.bottom() - py);
    Some(straight)
}

impl DrawBackend for RasterSurface {
    fn size(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    fn execute(&mut self, command: &DrawCommand) {
        match command {
            DrawCommand::Clear => {
                for pixel in self.image.pixels_mut() {
                    *pixel = ImagePixel([0, 0, 0, 0]);
                }
            }
            DrawCommand::Image(layer) => self.draw_image(layer),
            DrawCommand::RadialGlow {
                center,
                radius,
                color,
                blend,
                clip,
            } => self.draw_glow(*center, *radius, *color, *blend, *clip),
            DrawCommand::Line { from, to, color, width } => self.draw_line(*from, *to, *color, *width),
            DrawCommand::RoundedRect {
                rect,
                radius,
                fill,
                stroke,
            } => self.draw_rounded_rect(*rect, *radius, *fill, *stroke),
            DrawCommand::Text {
                origin,
                text,
                size,
                color,
            } => self.draw_text(*origin, text, *size, *color),
        }
    }
}

impl TextMeasure for RasterSurface {
    fn measure(&self, text: &str, size: f32) -> f32 {
        self.font.measure(text, size)
    }

    fn line_height(&self, size: f32) -> f32 {
        self.font.line_height(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn opaque(r: u8, g: u8, b: u8) -> RgbaImage {
        RgbaImage::from_pixel(10, 10, ImagePixel([r, g, b, 255]))
    }

    #[test]
    fn screen_only_brightens() {
        let mut surface = RasterSurface::from_image(opaque(100, 100, 100));
        surface.execute(&DrawCommand::Image(
            ImageLayer::new(Arc::new(opaque(100, 0, 200)), Rect::new(0.0, 0.0, 10.0, 10.0))
                .with_blend(BlendMode::Screen),
        ));
        let p = surface.image().get_pixel(5, 5);
        assert!(p[0] > 100 && p[2] > 200);
        assert_eq!(p[1], 100);
        assert_eq!(p[3], 255);
    }

    #[test]
    fn ellipse_clip_masks_corners() {
        let mut surface = RasterSurface::new(20, 20);
        surface.execute(&DrawCommand::Image(
            ImageLayer::new(Arc::new(opaque(255, 0, 0)), Rect::new(0.0, 0.0, 20.0, 20.0))
                .with_clip(ClipRegion::Ellipse { cx: 10.0, cy: 10.0, rx: 8.0, ry: 8.0 }),
        ));
        assert_eq!(surface.image().get_pixel(10, 10)[3], 255);
        assert_eq!(surface.image().get_pixel(0, 0)[3], 0);
    }

    #[test]
    fn glow_fades_from_center() {
        let mut surface = RasterSurface::new(40, 40);
        surface.execute(&DrawCommand::RadialGlow {
            center: Point2::new(20.0, 20.0),
            radius: 15.0,
            color: Rgba::from_rgb8(56, 189, 248).with_alpha(0.8),
            blend: BlendMode::Screen,
            clip: ClipRegion::None,
        });
        let center = surface.image().get_pixel(20, 20)[3];
        let edge = surface.image().get_pixel(32, 20)[3];
        assert!(center > edge);
        assert_eq!(surface.image().get_pixel(0, 0)[3], 0);
    }

    #[test]
    fn clear_resets_everything() {
        let mut surface = RasterSurface::from_image(opaque(9, 9, 9));
        surface.execute(&DrawCommand::Clear);
        assert!(surface.image().pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn text_and_rect_draw_inside_their_bounds() {
        let mut surface = RasterSurface::new(100, 40);
        let rect = Rect::new(10.0, 5.0, 60.0, 20.0);
        surface.execute_all(&[
            DrawCommand::RoundedRect {
                rect,
                radius: 6.0,
                fill: Rgba::new(0.0, 0.0, 0.0, 0.7),
                stroke: Some(Rgba::from_rgb8(255, 255, 255)),
            },
            DrawCommand::Text {
                origin: Point2::new(16.0, 8.0),
                text: "HI".into(),
                size: 13.0,
                color: Rgba::from_rgb8(255, 255, 255),
            },
        ]);
        assert_eq!(surface.image().get_pixel(5, 5)[3], 0);
        assert!(surface.image().get_pixel(40, 15)[3] > 0);
        // Rounded corner stays empty.
        assert_eq!(surface.image().get_pixel(10, 5)[3], 0);
    }

    #[test]
    fn line_connects_its_endpoints() {
        let mut surface = RasterSurface::new(30, 30);
        surface.execute(&DrawCommand::Line {
            from: Point2::new(2.0, 2.0),
            to: Point2::new(27.0, 27.0),
            color: Rgba::from_rgb8(255, 255, 255),
            width: 1.5,
        });
        assert!(surface.image().get_pixel(2, 2)[3] > 0);
        assert!(surface.image().get_pixel(15, 15)[3] > 0);
        assert_eq!(surface.image().get_pixel(27, 2)[3], 0);
    }
}
