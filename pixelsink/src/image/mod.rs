//! Decoded image buffers handed to downstream code

mod decode;

pub use decode::decode;

use image::DynamicImage;

/// Sample storage of a [`PixelArray`], in the decoder's native depth.
#[derive(Debug, Clone, PartialEq)]
pub enum Samples {
    U8(Vec<u8>),
    U16(Vec<u16>),
    F32(Vec<f32>),
}

impl Samples {
    pub fn len(&self) -> usize {
        match self {
            Samples::U8(v) => v.len(),
            Samples::U16(v) => v.len(),
            Samples::F32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Samples::U8(_) => "u8",
            Samples::U16(_) => "u16",
            Samples::F32(_) => "f32",
        }
    }
}

/// Dense `height x width x channels` array, row-major with interleaved channels.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelArray {
    height: usize,
    width: usize,
    channels: usize,
    samples: Samples,
}

impl PixelArray {
    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn shape(&self) -> [usize; 3] {
        [self.height, self.width, self.channels]
    }

    /// 2 for single channel images, 3 otherwise.
    pub fn ndim(&self) -> usize {
        if self.channels == 1 {
            2
        } else {
            3
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &Samples {
        &self.samples
    }

    pub fn as_u8(&self) -> Option<&[u8]> {
        match &self.samples {
            Samples::U8(v) => Some(v),
            _ => None,
        }
    }

    /// Sample at row `y`, column `x`, channel `c`, widened to `f64`.
    pub fn get(&self, y: usize, x: usize, c: usize) -> Option<f64> {
        if y >= self.height || x >= self.width || c >= self.channels {
            return None;
        }

        let idx = (y * self.width + x) * self.channels + c;
        match &self.samples {
            Samples::U8(v) => v.get(idx).map(|&s| f64::from(s)),
            Samples::U16(v) => v.get(idx).map(|&s| f64::from(s)),
            Samples::F32(v) => v.get(idx).map(|&s| f64::from(s)),
        }
    }
}

impl From<DynamicImage> for PixelArray {
    fn from(img: DynamicImage) -> Self {
        let width = img.width() as usize;
        let height = img.height() as usize;
        let channels = img.color().channel_count() as usize;

        let samples = match img {
            DynamicImage::ImageLuma8(buf) => Samples::U8(buf.into_raw()),
            DynamicImage::ImageLumaA8(buf) => Samples::U8(buf.into_raw()),
            DynamicImage::ImageRgb8(buf) => Samples::U8(buf.into_raw()),
            DynamicImage::ImageRgba8(buf) => Samples::U8(buf.into_raw()),
            DynamicImage::ImageLuma16(buf) => Samples::U16(buf.into_raw()),
            DynamicImage::ImageLumaA16(buf) => Samples::U16(buf.into_raw()),
            DynamicImage::ImageRgb16(buf) => Samples::U16(buf.into_raw()),
            DynamicImage::ImageRgba16(buf) => Samples::U16(buf.into_raw()),
            DynamicImage::ImageRgb32F(buf) => Samples::F32(buf.into_raw()),
            DynamicImage::ImageRgba32F(buf) => Samples::F32(buf.into_raw()),
            other => {
                return PixelArray {
                    height,
                    width,
                    channels: 4,
                    samples: Samples::F32(other.into_rgba32f().into_raw()),
                }
            }
        };

        PixelArray {
            height,
            width,
            channels,
            samples,
        }
    }
}
