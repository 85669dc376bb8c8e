// THEORY:
// A `LumaPlane` is the grayscale view of a downsampled frame. It is where the
// engine measures edge energy: the 4-neighbour discrete Laplacian
//
//     [ 0  1  0 ]
//     [ 1 -4  1 ]
//     [ 0  1  0 ]
//
// is evaluated on interior pixels only. The variance of that response is the
// sharpness cue of the quality sampler, and its per-pixel magnitude is the
// texture cue of the live heatmap. A plane narrower or shorter than 3 pixels has
// no interior and reports zero edge energy.

use crate::core_modules::frame::frame::DownsampleBuffer;

/// Grayscale (Rec. 709 luma) samples of a downsampled frame, 0..255 scale.
#[derive(Debug, Default)]
pub struct LumaPlane {
    width: u32,
    height: u32,
    values: Vec<f32>,
}

impl LumaPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a plane directly from luma values. `values.len()` must equal `width * height`.
    pub fn from_values(width: u32, height: u32, values: Vec<f32>) -> Option<Self> {
        (values.len() == (width * height) as usize).then_some(Self { width, height, values })
    }

    /// Refills the plane from a downsampled frame, reusing the allocation.
    pub fn fill_from(&mut self, buffer: &DownsampleBuffer) {
        self.width = buffer.width();
        self.height = buffer.height();
        self.values.clear();
        self.values.extend(buffer.pixels().iter().map(|p| p.luma()));
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.values[(y * self.width + x) as usize]
    }

    /// Mean luma, 0..255. Zero for an empty plane.
    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().map(|v| *v as f64).sum::<f64>() / self.values.len() as f64
    }

    /// Laplacian response at an interior pixel. Border pixels report 0.
    #[inline]
    pub fn laplacian_at(&self, x: u32, y: u32) -> f32 {
        if x == 0 || y == 0 || x + 1 >= self.width || y + 1 >= self.height {
            return 0.0;
        }
        self.get(x, y - 1) + self.get(x, y + 1) + self.get(x - 1, y) + self.get(x + 1, y)
            - 4.0 * self.get(x, y)
    }

    /// Variance of the Laplacian over interior pixels.
    pub fn laplacian_variance(&self) -> f64 {
        if self.width < 3 || self.height < 3 {
            return 0.0;
        }

        let mut count = 0u64;
        let mut sum = 0.0f64;
        let mut sum_sq = 0.0f64;
        for y in 1..self.height - 1 {
            for x in 1..self.width - 1 {
                let response = self.laplacian_at(x, y) as f64;
                sum += response;
                sum_sq += response * response;
                count += 1;
            }
        }

        let mean = sum / count as f64;
        (sum_sq / count as f64 - mean * mean).max(0.0)
    }
}
