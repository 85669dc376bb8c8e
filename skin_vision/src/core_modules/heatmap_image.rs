// THEORY:
// Server heatmaps are single-colour RGBA images whose alpha channel carries the
// concern intensity. They arrive as `data:image/png;base64,...` URIs. This module
// decodes them and finds where each one "points": the alpha-weighted centroid of
// its strongest pixels, which becomes the metric's anchor on the face.
//
// The centroid search runs on a copy shrunk so its longest side is at most
// `max_dim` pixels. Pixels count if their alpha reaches `max(40, 0.55 * maxAlpha)`;
// if none does, every nonzero pixel counts; if the whole image is transparent
// there is no anchor and the caller falls back to landmark regions.

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::RgbaImage;
use image::imageops::{self, FilterType};
use tracing::{debug, warn};

use crate::core_modules::face::Point2;
use crate::error::{VisionError, VisionResult};

const MIN_ALPHA_THRESHOLD: f32 = 40.0;
const RELATIVE_ALPHA_THRESHOLD: f32 = 0.55;

/// Decodes a base64 image data URI into RGBA.
pub fn decode_data_uri(uri: &str) -> VisionResult<RgbaImage> {
    let rest = uri
        .trim()
        .strip_prefix("data:")
        .ok_or_else(|| VisionError::InvalidDataUri("missing `data:` scheme".into()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| VisionError::InvalidDataUri("missing `,` separator".into()))?;
    if !header.ends_with(";base64") {
        return Err(VisionError::InvalidDataUri(format!("unsupported encoding `{header}`")));
    }
    let bytes = STANDARD.decode(payload.trim())?;
    Ok(image::load_from_memory(&bytes)?.to_rgba8())
}

/// Decoded heatmaps keyed by metric id.
#[derive(Debug, Clone, Default)]
pub struct HeatmapSet {
    images: BTreeMap<String, Arc<RgbaImage>>,
}

impl HeatmapSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes every URI. A heatmap that fails to decode is skipped, so its
    /// metric falls back to a synthesized glow.
    pub fn from_uris(uris: &BTreeMap<String, String>) -> Self {
        let mut set = Self::new();
        for (id, uri) in uris {
            match decode_data_uri(uri) {
                Ok(image) => {
                    debug!(metric = %id, width = image.width(), height = image.height(), "decoded heatmap");
                    set.insert(id.clone(), image);
                }
                Err(e) => warn!(metric = %id, error = %e, "skipping undecodable heatmap"),
            }
        }
        set
    }

    pub fn insert(&mut self, id: impl Into<String>, image: RgbaImage) {
        self.images.insert(id.into(), Arc::new(image));
    }

    pub fn get(&self, id: &str) -> Option<&Arc<RgbaImage>> {
        self.images.get(id)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

/// Alpha-weighted centroid of a heatmap, in the heatmap's own pixel coordinates.
pub fn intensity_centroid(heatmap: &RgbaImage, max_dim: u32) -> Option<Point2> {
    let (width, height) = heatmap.dimensions();
    if width == 0 || height == 0 {
        return None;
    }

    let longest = width.max(height);
    let max_dim = max_dim.max(1);
    let small = if longest > max_dim {
        let scale = max_dim as f32 / longest as f32;
        let w = ((width as f32 * scale).round() as u32).max(1);
        let h = ((height as f32 * scale).round() as u32).max(1);
        imageops::resize(heatmap, w, h, FilterType::Triangle)
    } else {
        heatmap.clone()
    };

    let max_alpha = small.pixels().map(|p| p[3]).max().unwrap_or(0);
    if max_alpha == 0 {
        return None;
    }

    let threshold = MIN_ALPHA_THRESHOLD.max(RELATIVE_ALPHA_THRESHOLD * max_alpha as f32);
    let (cx, cy) = weighted_centroid(&small, threshold).or_else(|| weighted_centroid(&small, 1.0))?;

    let sx = width as f32 / small.width() as f32;
    let sy = height as f32 / small.height() as f32;
    Some(Point2::new(cx * sx, cy * sy))
}

fn weighted_centroid(image: &RgbaImage, threshold: f32) -> Option<(f32, f32)> {
    let mut total = 0.0f64;
    let mut sum_x = 0.0f64;
    let mut sum_y = 0.0f64;
    for (x, y, pixel) in image.enumerate_pixels() {
        let alpha = pixel[3] as f32;
        if alpha < threshold {
            continue;
        }
        let w = alpha as f64;
        total += w;
        sum_x += (x as f64 + 0.5) * w;
        sum_y += (y as f64 + 0.5) * w;
    }
    (total > 0.0).then(|| ((sum_x / total) as f32, (sum_y / total) as f32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba};
    use std::io::Cursor;

    fn spot(width: u32, height: u32, at: (u32, u32), alpha: u8) -> RgbaImage {
        let mut image = RgbaImage::new(width, height);
        for y in at.1.saturating_sub(1)..=(at.1 + 1).min(height - 1) {
            for x in at.0.saturating_sub(1)..=(at.0 + 1).min(width - 1) {
                image.put_pixel(x, y, Rgba([244, 63, 94, alpha]));
            }
        }
        image
    }

    fn to_data_uri(image: &RgbaImage) -> String {
        let mut bytes = Cursor::new(Vec::new());
        image.write_to(&mut bytes, ImageFormat::Png).unwrap();
        format!("data:image/png;base64,{}", STANDARD.encode(bytes.into_inner()))
    }

    #[test]
    fn centroid_finds_the_hot_spot() {
        let image = spot(200, 100, (150, 30), 220);
        let c = intensity_centroid(&image, 96).unwrap();
        assert!((c.x - 150.5).abs() < 4.0, "x = {}", c.x);
        assert!((c.y - 30.5).abs() < 4.0, "y = {}", c.y);
    }

    #[test]
    fn faint_heatmaps_fall_back_to_any_nonzero_pixel() {
        // Max alpha 20 never clears the absolute threshold of 40.
        let image = spot(40, 40, (10, 20), 20);
        let c = intensity_centroid(&image, 96).unwrap();
        assert!((c.x - 10.5).abs() < 1e-3);
        assert!((c.y - 20.5).abs() < 1e-3);
    }

    #[test]
    fn transparent_heatmap_has_no_anchor() {
        assert!(intensity_centroid(&RgbaImage::new(32, 32), 96).is_none());
    }

    #[test]
    fn data_uris_round_trip_through_png() {
        let image = spot(16, 8, (4, 4), 200);
        let decoded = decode_data_uri(&to_data_uri(&image)).unwrap();
        assert_eq!(decoded, image);
    }

    #[test]
    fn malformed_uris_are_rejected() {
        assert!(matches!(decode_data_uri("image/png;base64,AA"), Err(VisionError::InvalidDataUri(_))));
        assert!(matches!(decode_data_uri("data:image/png,AA"), Err(VisionError::InvalidDataUri(_))));
        assert!(matches!(decode_data_uri("data:image/png;base64,@@@"), Err(VisionError::Base64(_))));
    }

    #[test]
    fn undecodable_entries_are_skipped() {
        let mut uris = BTreeMap::new();
        uris.insert("redness".to_string(), to_data_uri(&spot(8, 8, (3, 3), 255)));
        uris.insert("texture".to_string(), "data:image/png;base64,AAAA".to_string());
        let set = HeatmapSet::from_uris(&uris);
        assert_eq!(set.len(), 1);
        assert!(set.get("redness").is_some());
        assert!(set.get("texture").is_none());
    }
}
