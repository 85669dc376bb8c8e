// THEORY (single-pixel heuristics):
// The `Pixel` module is the smallest unit of the engine: a "dumb" RGBA container
// plus the handful of metrics that can be computed from one pixel alone. Anything
// that needs neighbours (Laplacian texture, sharpness) lives in `luma_plane`, and
// anything that needs time lives in the samplers.
//
// Heuristics kept here:
// - Luma (Rec. 709): `Y = 0.2126R + 0.7152G + 0.0722B`, on the 0..255 scale.
//   Every brightness and texture signal in the engine starts from this value.
// - Red excess: `R - (G + B) / 2`, the raw redness cue used by the live heatmap.
// - HSV value and saturation, on the 0..255 scale, used to spot clipped
//   highlights (very bright and nearly gray pixels read as skin shine).
//
// All channel math is done in f32 on the computed 0..255 scale; no gamma
// linearization is applied because none of the consumers need colorimetry.

pub mod pixel {
    pub type Byte = u8;
    pub type Channel = Byte;
    pub type Luma = f32;

    pub const CHANNELS: usize = 4;

    /// A "dumb" data container representing a single RGBA pixel.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Pixel {
        /// The red channel value (0-255).
        pub red: Channel,
        /// The green channel value (0-255).
        pub green: Channel,
        /// The blue channel value (0-255).
        pub blue: Channel,
        /// The alpha (transparency) channel value (0-255).
        pub alpha: Channel,
    }

    impl Pixel {
        pub const fn new(red: Channel, green: Channel, blue: Channel, alpha: Channel) -> Self {
            Self { red, green, blue, alpha }
        }

        /// Builds a pixel from the first four bytes of an RGBA slice.
        /// Missing channels read as zero; a missing alpha reads as opaque.
        pub fn from_rgba_slice(bytes: &[Byte]) -> Self {
            Self {
                red: bytes.first().copied().unwrap_or(0),
                green: bytes.get(1).copied().unwrap_or(0),
                blue: bytes.get(2).copied().unwrap_or(0),
                alpha: bytes.get(3).copied().unwrap_or(255),
            }
        }

        /// Rec. 709 luma on the 0..255 scale.
        #[inline]
        pub fn luma(&self) -> Luma {
            0.2126 * self.red as f32 + 0.7152 * self.green as f32 + 0.0722 * self.blue as f32
        }

        /// How far red rises above the mean of green and blue. Negative for
        /// pixels that lean green or blue.
        #[inline]
        pub fn red_excess(&self) -> f32 {
            self.red as f32 - (self.green as f32 + self.blue as f32) * 0.5
        }

        /// HSV value (max channel) on the 0..255 scale.
        #[inline]
        pub fn value_hsv(&self) -> f32 {
            self.red.max(self.green).max(self.blue) as f32
        }

        /// HSV saturation on the 0..255 scale (chroma / value).
        #[inline]
        pub fn saturation_hsv(&self) -> f32 {
            let max = self.red.max(self.green).max(self.blue) as f32;
            if max <= 0.0 {
                return 0.0;
            }
            let min = self.red.min(self.green).min(self.blue) as f32;
            (max - min) / max * 255.0
        }
    }

    impl From<&[Byte]> for Pixel {
        fn from(bytes: &[Byte]) -> Self {
            Pixel::from_rgba_slice(bytes)
        }
    }

    impl From<Pixel> for [Byte; CHANNELS] {
        fn from(pixel: Pixel) -> Self {
            [pixel.red, pixel.green, pixel.blue, pixel.alpha]
        }
    }
}
