// THEORY:
// The capture store holds the photos a session has taken, in capture order, up to
// a fixed budget. Items are only ever appended or removed by id; removing an item
// or resetting the store drops its encoded bytes. Each item remembers the quality
// score it was taken at, so the best shot can be picked for analysis without
// re-measuring anything.

use std::io::Cursor;

use image::DynamicImage;
use image::codecs::jpeg::JpegEncoder;
use serde::Serialize;

use crate::core_modules::face::Pose;
use crate::core_modules::frame::frame::Frame;
use crate::error::{VisionError, VisionResult};

const JPEG_QUALITY: u8 = 90;

/// How an item entered the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureOrigin {
    Auto,
    Manual,
}

/// One captured photo.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptureItem {
    pub id: u64,
    /// JPEG-encoded image.
    #[serde(skip)]
    pub image_bytes: Vec<u8>,
    pub pose: Pose,
    /// Aggregated quality score at the moment of capture.
    pub quality_score: f64,
    pub origin: CaptureOrigin,
}

/// Ordered, budget-limited list of captures.
#[derive(Debug)]
pub struct CaptureStore {
    budget: usize,
    next_id: u64,
    items: Vec<CaptureItem>,
}

impl CaptureStore {
    pub fn new(budget: usize) -> Self {
        Self {
            budget,
            next_id: 1,
            items: Vec::with_capacity(budget),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.budget
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn items(&self) -> &[CaptureItem] {
        &self.items
    }

    /// Appends a capture. Returns `None` and drops the bytes once the budget is reached.
    pub fn push(
        &mut self,
        image_bytes: Vec<u8>,
        pose: Pose,
        quality_score: f64,
        origin: CaptureOrigin,
    ) -> Option<&CaptureItem> {
        if self.is_full() {
            return None;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.items.push(CaptureItem {
            id,
            image_bytes,
            pose,
            quality_score,
            origin,
        });
        self.items.last()
    }

    pub fn remove(&mut self, id: u64) -> Option<CaptureItem> {
        let index = self.items.iter().position(|item| item.id == id)?;
        Some(self.items.remove(index))
    }

    /// Empties the store and hands back what it held. Ids keep increasing.
    pub fn take_all(&mut self) -> Vec<CaptureItem> {
        std::mem::take(&mut self.items)
    }

    /// Highest quality score wins; the earlier capture wins a tie.
    pub fn best(&self) -> Option<&CaptureItem> {
        self.items.iter().fold(None, |best: Option<&CaptureItem>, item| match best {
            Some(current) if current.quality_score >= item.quality_score => Some(current),
            _ => Some(item),
        })
    }
}

/// Encodes a frame as JPEG for the capture store.
pub fn encode_capture(frame: &Frame) -> VisionResult<Vec<u8>> {
    let image = frame
        .to_image()
        .ok_or_else(|| VisionError::Encode("frame buffer does not match its dimensions".into()))?;
    let rgb = DynamicImage::ImageRgba8(image).to_rgb8();

    let mut bytes = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(|e| VisionError::Encode(e.to_string()))?;
    Ok(bytes.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::pixel::pixel::Pixel;

    #[test]
    fn budget_is_enforced() {
        let mut store = CaptureStore::new(2);
        assert!(store.push(vec![1], Pose::Front, 0.8, CaptureOrigin::Auto).is_some());
        assert!(store.push(vec![2], Pose::Left, 0.8, CaptureOrigin::Auto).is_some());
        assert!(store.is_full());
        assert!(store.push(vec![3], Pose::Right, 0.9, CaptureOrigin::Manual).is_none());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn remove_frees_a_slot() {
        let mut store = CaptureStore::new(2);
        let first = store.push(vec![1], Pose::Front, 0.8, CaptureOrigin::Auto).unwrap().id;
        store.push(vec![2], Pose::Left, 0.8, CaptureOrigin::Auto);
        assert_eq!(store.remove(first).map(|i| i.pose), Some(Pose::Front));
        assert!(store.remove(first).is_none());
        let next = store.push(vec![3], Pose::Right, 0.8, CaptureOrigin::Auto).unwrap();
        assert_eq!(next.id, 3);
    }

    #[test]
    fn best_prefers_earliest_on_tie() {
        let mut store = CaptureStore::new(3);
        assert!(store.best().is_none());
        store.push(vec![1], Pose::Front, 0.81, CaptureOrigin::Auto);
        store.push(vec![2], Pose::Left, 0.92, CaptureOrigin::Auto);
        store.push(vec![3], Pose::Right, 0.92, CaptureOrigin::Manual);
        assert_eq!(store.best().map(|i| i.id), Some(2));
    }

    #[test]
    fn take_all_empties_the_store() {
        let mut store = CaptureStore::new(3);
        store.push(vec![1], Pose::Front, 0.8, CaptureOrigin::Auto);
        let taken = store.take_all();
        assert_eq!(taken.len(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn frames_encode_to_jpeg() {
        let frame = Frame::filled(8, 8, Pixel::new(200, 120, 90, 255));
        let bytes = encode_capture(&frame).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 8));
    }
}
