// THEORY:
// Face regions give every metric a place to live on a still image when no
// server heatmap says otherwise. Each region is a single face-mesh landmark
// (forehead center, nose tip, chin, cheeks, under-eyes, outer eye corners). If
// the detector returned a sparse landmark set that lacks an index, the region
// falls back to a fixed position inside the face bounding box, so a region
// always resolves once a face was found.
//
// All coordinates here are image pixels. "Left" and "right" are sides of the
// image, not of the subject.

use crate::core_modules::draw::ClipRegion;
use crate::core_modules::face::{FaceBox, Landmarks, Point2};

/// The face ellipse is drawn slightly larger than the landmark box so cheeks and
/// forehead edges are not cut off.
const CLIP_PADDING: f32 = 1.08;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaceRegion {
    Forehead,
    Nose,
    Chin,
    LeftCheek,
    RightCheek,
    LeftUnderEye,
    RightUnderEye,
    LeftEyeCorner,
    RightEyeCorner,
}

impl FaceRegion {
    /// Face-mesh landmark index of the region.
    pub fn landmark_index(&self) -> usize {
        match self {
            FaceRegion::Forehead => 151,
            FaceRegion::Nose => 4,
            FaceRegion::Chin => 152,
            FaceRegion::LeftCheek => 50,
            FaceRegion::RightCheek => 280,
            FaceRegion::LeftUnderEye => 145,
            FaceRegion::RightUnderEye => 374,
            FaceRegion::LeftEyeCorner => 33,
            FaceRegion::RightEyeCorner => 263,
        }
    }

    /// Fallback position as fractions of the face box.
    fn box_fraction(&self) -> (f32, f32) {
        match self {
            FaceRegion::Forehead => (0.5, 0.18),
            FaceRegion::Nose => (0.5, 0.58),
            FaceRegion::Chin => (0.5, 0.94),
            FaceRegion::LeftCheek => (0.24, 0.62),
            FaceRegion::RightCheek => (0.76, 0.62),
            FaceRegion::LeftUnderEye => (0.32, 0.46),
            FaceRegion::RightUnderEye => (0.68, 0.46),
            FaceRegion::LeftEyeCorner => (0.16, 0.4),
            FaceRegion::RightEyeCorner => (0.84, 0.4),
        }
    }
}

/// Regions a metric is drawn at. Unknown metrics use the face centroid.
pub fn regions_for_metric(metric_id: &str) -> &'static [FaceRegion] {
    use FaceRegion::*;
    match metric_id {
        "wrinkles" => &[Forehead, LeftEyeCorner, RightEyeCorner],
        "puffy_eyes" => &[LeftUnderEye, RightUnderEye],
        "redness" => &[LeftCheek, RightCheek, Nose],
        "uneven_tone" => &[LeftCheek, RightCheek],
        "oiliness" => &[Forehead, Nose],
        "texture" => &[LeftCheek, RightCheek, Nose],
        _ => &[],
    }
}

/// Face layout of one still image, in image pixels.
#[derive(Debug, Clone)]
pub struct FaceGeometry {
    pub bbox: FaceBox,
    pub centroid: Point2,
    points: Vec<Point2>,
}

impl FaceGeometry {
    /// Scales normalized landmarks to a `width` x `height` image. `None` without
    /// landmarks or when any coordinate is not finite.
    pub fn from_landmarks(landmarks: &Landmarks, width: u32, height: u32) -> Option<Self> {
        if !landmarks.points.iter().all(Point2::is_finite) {
            return None;
        }
        let (sx, sy) = (width as f32, height as f32);
        let points: Vec<Point2> = landmarks.points.iter().map(|p| p.scaled(sx, sy)).collect();
        let bbox = FaceBox::enclosing(&points)?;
        let centroid = Landmarks::new(points.clone()).centroid()?;
        Some(Self { bbox, centroid, points })
    }

    pub fn region(&self, region: FaceRegion) -> Point2 {
        self.points
            .get(region.landmark_index())
            .copied()
            .unwrap_or_else(|| {
                let (fx, fy) = region.box_fraction();
                self.bbox.at(fx, fy)
            })
    }

    /// Anchor points for a metric without a heatmap.
    pub fn anchors_for_metric(&self, metric_id: &str) -> Vec<Point2> {
        let regions = regions_for_metric(metric_id);
        if regions.is_empty() {
            return vec![self.centroid];
        }
        regions.iter().map(|r| self.region(*r)).collect()
    }

    /// Ellipse fitted to the face box, used to clip overlays.
    pub fn ellipse_clip(&self) -> ClipRegion {
        face_ellipse(&self.bbox)
    }
}

/// Ellipse fitted to a face box in surface pixels.
pub fn face_ellipse(bbox: &FaceBox) -> ClipRegion {
    let center = bbox.center();
    ClipRegion::Ellipse {
        cx: center.x,
        cy: center.y,
        rx: bbox.width() * 0.5 * CLIP_PADDING,
        ry: bbox.height() * 0.5 * CLIP_PADDING,
    }
}
