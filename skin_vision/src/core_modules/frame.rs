// THEORY:
// The `Frame` module bridges raw RGBA buffers and the small working buffers every
// analysis stage runs on. Both the quality sampler and the live heatmap work on a
// copy of the frame shrunk to a fixed width (160 px by default), so the cost of a
// tick is bounded no matter what resolution the camera delivers.
//
// Key architectural principles:
// 1.  **Spatial Pooling**: Downsampling averages every source pixel that falls into
//     a destination cell, the same block-average a chunk uses to summarize its
//     pixels. Single-pixel sensor noise is averaged away before any derivative is
//     taken.
// 2.  **Buffer Reuse**: `DownsampleBuffer` owns its pixel vector and is refilled in
//     place on every tick. It only reallocates when the working size changes.
// 3.  **Validated Construction**: A `Frame` can only be built from a non-empty
//     buffer whose length matches `width * height * 4`, so indexing never goes out
//     of bounds. The downsampler still treats an empty frame as an empty buffer.

pub mod frame {
    use crate::core_modules::pixel::pixel::{CHANNELS, Pixel};
    use crate::error::{VisionError, VisionResult};
    use image::RgbaImage;

    /// A full-resolution RGBA frame from the camera or a decoded still image.
    #[derive(Debug, Clone)]
    pub struct Frame {
        width: u32,
        height: u32,
        data: Vec<u8>,
    }

    impl Frame {
        /// Wraps an RGBA buffer, checking that its length matches the dimensions.
        pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> VisionResult<Self> {
            let expected = width as usize * height as usize * CHANNELS;
            if data.len() != expected || width == 0 || height == 0 {
                return Err(VisionError::FrameSize {
                    width,
                    height,
                    expected,
                    actual: data.len(),
                });
            }
            Ok(Self { width, height, data })
        }

        /// A frame filled with one colour. Mostly useful for tests and placeholders.
        /// Zero dimensions are raised to one pixel.
        pub fn filled(width: u32, height: u32, pixel: Pixel) -> Self {
            let (width, height) = (width.max(1), height.max(1));
            let bytes: [u8; CHANNELS] = pixel.into();
            let data = bytes
                .iter()
                .copied()
                .cycle()
                .take(width as usize * height as usize * CHANNELS)
                .collect();
            Self { width, height, data }
        }

        /// Wraps a decoded image. Empty images are rejected like empty buffers.
        pub fn from_image(image: RgbaImage) -> VisionResult<Self> {
            let (width, height) = image.dimensions();
            Self::from_rgba(width, height, image.into_raw())
        }

        pub fn width(&self) -> u32 {
            self.width
        }

        pub fn height(&self) -> u32 {
            self.height
        }

        pub fn as_bytes(&self) -> &[u8] {
            &self.data
        }

        /// Reads the pixel at `(x, y)`. Coordinates are clamped to the frame.
        #[inline]
        pub fn pixel(&self, x: u32, y: u32) -> Pixel {
            let x = x.min(self.width - 1) as usize;
            let y = y.min(self.height - 1) as usize;
            let index = (y * self.width as usize + x) * CHANNELS;
            Pixel::from_rgba_slice(&self.data[index..index + CHANNELS])
        }

        /// Copies the frame into an `image` buffer for encoding.
        pub fn to_image(&self) -> Option<RgbaImage> {
            RgbaImage::from_raw(self.width, self.height, self.data.clone())
        }
    }

    /// A reusable, downsampled copy of a frame.
    #[derive(Debug, Default)]
    pub struct DownsampleBuffer {
        width: u32,
        height: u32,
        pixels: Vec<Pixel>,
    }

    impl DownsampleBuffer {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn width(&self) -> u32 {
            self.width
        }

        pub fn height(&self) -> u32 {
            self.height
        }

        pub fn pixels(&self) -> &[Pixel] {
            &self.pixels
        }

        #[inline]
        pub fn get(&self, x: u32, y: u32) -> Pixel {
            self.pixels[(y * self.width + x) as usize]
        }

        /// Refills the buffer with `frame` shrunk to `target_width` pixels wide.
        /// Frames narrower than the target are copied at their own size.
        pub fn fill_from(&mut self, frame: &Frame, target_width: u32) {
            self.pixels.clear();
            if frame.width() == 0 || frame.height() == 0 || target_width == 0 {
                self.width = 0;
                self.height = 0;
                return;
            }

            let width = target_width.clamp(1, frame.width());
            let height = ((frame.height() as u64 * width as u64 + frame.width() as u64 / 2)
                / frame.width() as u64)
                .max(1) as u32;

            self.width = width;
            self.height = height;
            self.pixels.reserve((width * height) as usize);

            for cell_y in 0..height {
                let y0 = cell_y as u64 * frame.height() as u64 / height as u64;
                let y1 = ((cell_y as u64 + 1) * frame.height() as u64 / height as u64).max(y0 + 1);
                for cell_x in 0..width {
                    let x0 = cell_x as u64 * frame.width() as u64 / width as u64;
                    let x1 = ((cell_x as u64 + 1) * frame.width() as u64 / width as u64).max(x0 + 1);
                    self.pixels.push(average_block(frame, x0 as u32, x1 as u32, y0 as u32, y1 as u32));
                }
            }
        }
    }

    fn average_block(frame: &Frame, x0: u32, x1: u32, y0: u32, y1: u32) -> Pixel {
        let mut sum_r = 0u64;
        let mut sum_g = 0u64;
        let mut sum_b = 0u64;
        let mut sum_a = 0u64;
        let mut count = 0u64;

        for y in y0..y1 {
            for x in x0..x1 {
                let pixel = frame.pixel(x, y);
                sum_r += pixel.red as u64;
                sum_g += pixel.green as u64;
                sum_b += pixel.blue as u64;
                sum_a += pixel.alpha as u64;
                count += 1;
            }
        }

        if count == 0 {
            return Pixel::default();
        }
        Pixel {
            red: (sum_r / count) as u8,
            green: (sum_g / count) as u8,
            blue: (sum_b / count) as u8,
            alpha: (sum_a / count) as u8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::frame::*;
    use crate::core_modules::pixel::pixel::Pixel;

    #[test]
    fn rejects_mismatched_buffers() {
        assert!(Frame::from_rgba(2, 2, vec![0; 15]).is_err());
        assert!(Frame::from_rgba(0, 2, vec![]).is_err());
        assert!(Frame::from_rgba(2, 2, vec![0; 16]).is_ok());
    }

    #[test]
    fn downsample_keeps_aspect_ratio() {
        let frame = Frame::filled(640, 480, Pixel::new(10, 20, 30, 255));
        let mut buffer = DownsampleBuffer::new();
        buffer.fill_from(&frame, 160);
        assert_eq!((buffer.width(), buffer.height()), (160, 120));
        assert!(buffer.pixels().iter().all(|p| *p == Pixel::new(10, 20, 30, 255)));
    }

    #[test]
    fn downsample_averages_blocks() {
        // Left half black, right half white; a 2-wide target gets one of each.
        let mut data = Vec::new();
        for _y in 0..4 {
            for x in 0..4 {
                let v = if x < 2 { 0 } else { 255 };
                data.extend_from_slice(&[v, v, v, 255]);
            }
        }
        let frame = Frame::from_rgba(4, 4, data).unwrap();
        let mut buffer = DownsampleBuffer::new();
        buffer.fill_from(&frame, 2);
        assert_eq!(buffer.get(0, 0).red, 0);
        assert_eq!(buffer.get(1, 1).red, 255);
    }

    #[test]
    fn empty_images_are_rejected() {
        assert!(Frame::from_image(image::RgbaImage::new(0, 0)).is_err());
        assert!(Frame::from_image(image::RgbaImage::new(3, 0)).is_err());
        let frame = Frame::from_image(image::RgbaImage::new(3, 2)).unwrap();
        assert_eq!((frame.width(), frame.height()), (3, 2));
    }

    #[test]
    fn filled_never_builds_an_empty_frame() {
        let frame = Frame::filled(0, 0, Pixel::new(9, 9, 9, 255));
        assert_eq!((frame.width(), frame.height()), (1, 1));
        assert_eq!(frame.pixel(0, 0), Pixel::new(9, 9, 9, 255));
    }

    #[test]
    fn zero_target_width_empties_the_buffer() {
        let frame = Frame::filled(8, 8, Pixel::new(1, 1, 1, 255));
        let mut buffer = DownsampleBuffer::new();
        buffer.fill_from(&frame, 4);
        buffer.fill_from(&frame, 0);
        assert_eq!((buffer.width(), buffer.height()), (0, 0));
        assert!(buffer.pixels().is_empty());
    }

    #[test]
    fn small_frames_are_not_upscaled() {
        let frame = Frame::filled(40, 30, Pixel::new(1, 1, 1, 255));
        let mut buffer = DownsampleBuffer::new();
        buffer.fill_from(&frame, 160);
        assert_eq!((buffer.width(), buffer.height()), (40, 30));
    }
}
