// THEORY:
// The `face` module turns a raw landmark list into the per-frame facts the rest
// of the engine reasons about. Landmarks arrive normalized to the frame
// ([0, 1] on both axes, origin top-left); from them we derive:
//
// - the face bounding box, clamped to the frame;
// - `coverage`, the box area over the frame area;
// - `nose_ratio`, where the nose tip sits horizontally inside the box, which is
//   the only pose cue the engine uses.
//
// A `FaceObservation` is recomputed for every detection result and replaced as a
// whole value; nothing here carries state between frames. An empty landmark list
// is not an error, it is an observation with `found == false`.

use serde::{Deserialize, Serialize};

/// MediaPipe face-mesh index of the nose tip.
pub const NOSE_TIP_INDEX: usize = 1;

const POSE_LEFT_BELOW: f64 = 0.46;
const POSE_RIGHT_ABOVE: f64 = 0.54;

/// A 2D point. Normalized or pixel space depending on context.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f32,
    pub y: f32,
}

impl Point2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn scaled(self, sx: f32, sy: f32) -> Self {
        Self::new(self.x * sx, self.y * sy)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// An axis-aligned box enclosing the face.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceBox {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl FaceBox {
    /// Tightest box around `points`; `None` for an empty list.
    pub fn enclosing(points: &[Point2]) -> Option<Self> {
        let first = points.first()?;
        let mut bbox = FaceBox {
            min_x: first.x,
            min_y: first.y,
            max_x: first.x,
            max_y: first.y,
        };
        for p in &points[1..] {
            bbox.min_x = bbox.min_x.min(p.x);
            bbox.min_y = bbox.min_y.min(p.y);
            bbox.max_x = bbox.max_x.max(p.x);
            bbox.max_y = bbox.max_y.max(p.y);
        }
        Some(bbox)
    }

    pub fn width(&self) -> f32 {
        (self.max_x - self.min_x).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.max_y - self.min_y).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn center(&self) -> Point2 {
        Point2::new((self.min_x + self.max_x) * 0.5, (self.min_y + self.max_y) * 0.5)
    }

    /// Point at fractional position `(fx, fy)` inside the box.
    pub fn at(&self, fx: f32, fy: f32) -> Point2 {
        Point2::new(self.min_x + self.width() * fx, self.min_y + self.height() * fy)
    }

    pub fn clamped_to_unit(&self) -> Self {
        Self {
            min_x: self.min_x.clamp(0.0, 1.0),
            min_y: self.min_y.clamp(0.0, 1.0),
            max_x: self.max_x.clamp(0.0, 1.0),
            max_y: self.max_y.clamp(0.0, 1.0),
        }
    }

    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self {
            min_x: self.min_x * sx,
            min_y: self.min_y * sy,
            max_x: self.max_x * sx,
            max_y: self.max_y * sy,
        }
    }
}

/// Coarse head orientation derived from the nose position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pose {
    Front,
    Left,
    Right,
    #[default]
    Unknown,
}

impl Pose {
    /// Classifies a nose ratio. The band `[0.46, 0.54]` is `Front`, so small
    /// jitter around the center never flips the pose.
    pub fn from_nose_ratio(nose_ratio: f64) -> Self {
        if nose_ratio < POSE_LEFT_BELOW {
            Pose::Left
        } else if nose_ratio > POSE_RIGHT_ABOVE {
            Pose::Right
        } else {
            Pose::Front
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Pose::Front => "front",
            Pose::Left => "left",
            Pose::Right => "right",
            Pose::Unknown => "unknown",
        }
    }
}

/// Landmarks for one face, normalized to the source frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Landmarks {
    pub points: Vec<Point2>,
}

impl Landmarks {
    pub fn new(points: Vec<Point2>) -> Self {
        Self { points }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Point2> {
        self.points.get(index).copied()
    }

    pub fn bounding_box(&self) -> Option<FaceBox> {
        FaceBox::enclosing(&self.points)
    }

    /// Mean of all points.
    pub fn centroid(&self) -> Option<Point2> {
        if self.points.is_empty() {
            return None;
        }
        let n = self.points.len() as f32;
        let (sx, sy) = self.points.iter().fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        Some(Point2::new(sx / n, sy / n))
    }
}

/// What the latest detection says about the face in frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FaceObservation {
    pub found: bool,
    /// Bounding-box area over frame area, in [0, 1].
    pub coverage: f64,
    /// Horizontal nose position inside the bounding box, in [0, 1].
    pub nose_ratio: f64,
    /// Normalized bounding box, present whenever `found` is true.
    pub bbox: Option<FaceBox>,
}

impl FaceObservation {
    /// The observation published when no face is in frame.
    pub fn not_found() -> Self {
        Self::default()
    }

    /// A set containing any NaN or infinite coordinate is treated as no face.
    pub fn from_landmarks(landmarks: &Landmarks) -> Self {
        if !landmarks.points.iter().all(Point2::is_finite) {
            return Self::not_found();
        }
        let Some(raw_box) = landmarks.bounding_box() else {
            return Self::not_found();
        };
        let bbox = raw_box.clamped_to_unit();
        let coverage = (bbox.area() as f64).clamp(0.0, 1.0);

        let nose_x = landmarks
            .get(NOSE_TIP_INDEX)
            .or_else(|| landmarks.centroid())
            .map(|p| p.x)
            .unwrap_or(bbox.center().x);
        let nose_ratio = if raw_box.width() > f32::EPSILON {
            ((nose_x - raw_box.min_x) / raw_box.width()) as f64
        } else {
            0.5
        };

        Self {
            found: true,
            coverage,
            nose_ratio: nose_ratio.clamp(0.0, 1.0),
            bbox: Some(bbox),
        }
    }

    pub fn pose(&self) -> Pose {
        if self.found {
            Pose::from_nose_ratio(self.nose_ratio)
        } else {
            Pose::Unknown
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face_with_nose(nose_x: f32) -> Landmarks {
        Landmarks::new(vec![
            Point2::new(0.3, 0.2),
            Point2::new(nose_x, 0.5),
            Point2::new(0.7, 0.8),
        ])
    }

    #[test]
    fn pose_thresholds_have_a_front_dead_zone() {
        assert_eq!(Pose::from_nose_ratio(0.45), Pose::Left);
        assert_eq!(Pose::from_nose_ratio(0.46), Pose::Front);
        assert_eq!(Pose::from_nose_ratio(0.50), Pose::Front);
        assert_eq!(Pose::from_nose_ratio(0.54), Pose::Front);
        assert_eq!(Pose::from_nose_ratio(0.55), Pose::Right);
    }

    #[test]
    fn observation_measures_coverage_and_nose() {
        let obs = FaceObservation::from_landmarks(&face_with_nose(0.5));
        assert!(obs.found);
        assert!((obs.coverage - 0.24).abs() < 1e-6);
        assert!((obs.nose_ratio - 0.5).abs() < 1e-6);
        assert_eq!(obs.pose(), Pose::Front);

        let turned = FaceObservation::from_landmarks(&face_with_nose(0.36));
        assert_eq!(turned.pose(), Pose::Left);
    }

    #[test]
    fn non_finite_landmarks_mean_no_face() {
        let mut points = vec![Point2::new(0.3, 0.2), Point2::new(0.5, 0.5), Point2::new(0.7, 0.8)];
        points[2].x = f32::NAN;
        let obs = FaceObservation::from_landmarks(&Landmarks::new(points.clone()));
        assert_eq!(obs, FaceObservation::not_found());

        points[2].x = 0.7;
        points[1].y = f32::INFINITY;
        let obs = FaceObservation::from_landmarks(&Landmarks::new(points));
        assert!(!obs.found);
        assert_eq!(obs.pose(), Pose::Unknown);
        assert!(obs.coverage.is_finite());
    }

    #[test]
    fn empty_landmarks_mean_no_face() {
        let obs = FaceObservation::from_landmarks(&Landmarks::empty());
        assert!(!obs.found);
        assert_eq!(obs.coverage, 0.0);
        assert_eq!(obs.pose(), Pose::Unknown);
        assert!(obs.bbox.is_none());
    }

    #[test]
    fn coverage_is_clamped_to_the_frame() {
        let obs = FaceObservation::from_landmarks(&Landmarks::new(vec![
            Point2::new(-0.5, -0.5),
            Point2::new(0.5, 0.5),
            Point2::new(1.5, 1.5),
        ]));
        assert!(obs.coverage <= 1.0);
        assert_eq!(obs.bbox.unwrap().min_x, 0.0);
    }

    #[test]
    fn pose_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Pose::Right).unwrap(), "\"right\"");
    }
}
