//! Pixel image value produced by decode and consumed by encode.

use serde::{Deserialize, Serialize};

use crate::color::{pack_rgb565, unpack_rgb565};
use crate::types::ColorSpace;

/// Pixel layout of an [`Image`] buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 1 bit per pixel, rows padded to 32 bits.
    Binary,
    /// 8-bit luminance.
    #[default]
    Grayscale,
    /// 16-bit packed RGB, little-endian `u16` per pixel.
    Rgb565,
    /// 24-bit packed RGB.
    Rgb888,
}

impl PixelFormat {
    /// Bytes per pixel for byte-aligned formats, zero for [`PixelFormat::Binary`].
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Binary => 0,
            PixelFormat::Grayscale => 1,
            PixelFormat::Rgb565 => 2,
            PixelFormat::Rgb888 => 3,
        }
    }

    /// Size in bytes of a `width` x `height` pixel buffer, saturating at
    /// `usize::MAX`.
    pub fn buffer_size(self, width: u32, height: u32) -> usize {
        self.checked_buffer_size(width, height).unwrap_or(usize::MAX)
    }

    /// Size in bytes of a `width` x `height` pixel buffer, or `None` if it
    /// does not fit in `usize`.
    pub fn checked_buffer_size(self, width: u32, height: u32) -> Option<usize> {
        let (width, height) = (width as usize, height as usize);
        match self {
            PixelFormat::Binary => width.div_ceil(32).checked_mul(4)?.checked_mul(height),
            _ => width.checked_mul(height)?.checked_mul(self.bytes_per_pixel()),
        }
    }

    /// Format a decoded stream of the given colorspace is delivered in.
    pub fn for_color_space(color_space: ColorSpace) -> Self {
        match color_space {
            ColorSpace::Grayscale => PixelFormat::Grayscale,
            ColorSpace::YCbCr | ColorSpace::Cmyk => PixelFormat::Rgb565,
        }
    }

    /// Whether the codec can read or write pixels of this format.
    pub fn is_byte_aligned(self) -> bool {
        self != PixelFormat::Binary
    }

    /// Read pixel `index` of a buffer in this format as RGB.
    ///
    /// Binary pixels read as black.
    #[inline]
    pub fn read_rgb(self, data: &[u8], index: usize) -> [u8; 3] {
        match self {
            PixelFormat::Binary => [0; 3],
            PixelFormat::Grayscale => {
                let v = data[index];
                [v, v, v]
            }
            PixelFormat::Rgb565 => {
                let i = index * 2;
                unpack_rgb565(u16::from_le_bytes([data[i], data[i + 1]]))
            }
            PixelFormat::Rgb888 => {
                let i = index * 3;
                [data[i], data[i + 1], data[i + 2]]
            }
        }
    }

    /// Store an RGB value as pixel `index` of a buffer in this format.
    ///
    /// Grayscale buffers receive the red channel; callers convert first.
    #[inline]
    pub fn write_rgb(self, data: &mut [u8], index: usize, rgb: [u8; 3]) {
        match self {
            PixelFormat::Binary => {}
            PixelFormat::Grayscale => data[index] = rgb[0],
            PixelFormat::Rgb565 => {
                let i = index * 2;
                let packed = pack_rgb565(rgb[0], rgb[1], rgb[2]);
                data[i..i + 2].copy_from_slice(&packed.to_le_bytes());
            }
            PixelFormat::Rgb888 => {
                let i = index * 3;
                data[i..i + 3].copy_from_slice(&rgb);
            }
        }
    }
}

/// An image with its pixel data in row-major order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Image {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Pixel layout of `data`.
    pub format: PixelFormat,
    /// Pixel data, `format.buffer_size(width, height)` bytes.
    pub data: Vec<u8>,
}

impl Image {
    /// Create an image from its dimensions, format and pixel data.
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
        debug_assert_eq!(
            data.len(),
            format.buffer_size(width, height),
            "Pixel buffer size mismatch"
        );
        Self {
            width,
            height,
            format,
            data,
        }
    }

    /// An image with no dimensions and no data.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a zero-filled image.
    pub fn zeroed(width: u32, height: u32, format: PixelFormat) -> Self {
        let data = vec![0u8; format.buffer_size(width, height)];
        Self::new(width, height, format, data)
    }

    /// Check if this is an empty/invalid image.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.data.is_empty()
    }

    /// Get the total number of pixels.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Get the size of the pixel buffer in bytes.
    pub fn byte_size(&self) -> usize {
        self.data.len()
    }

    /// Read one pixel as RGB, expanding grayscale and RGB565 values.
    ///
    /// Returns black for out-of-range coordinates and for binary images.
    pub fn rgb_at(&self, x: u32, y: u32) -> [u8; 3] {
        if x >= self.width || y >= self.height {
            return [0; 3];
        }
        let index = y as usize * self.width as usize + x as usize;
        self.format.read_rgb(&self.data, index)
    }

    /// Build an RGB565 image from 24-bit RGB pixel data.
    pub fn rgb565_from_rgb888(width: u32, height: u32, rgb: &[u8]) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize * 2);
        for px in rgb.chunks_exact(3) {
            data.extend_from_slice(&pack_rgb565(px[0], px[1], px[2]).to_le_bytes());
        }
        Self::new(width, height, PixelFormat::Rgb565, data)
    }

    /// Convert to an image::RgbImage for inspection or further processing.
    pub fn to_rgb_image(&self) -> Option<image::RgbImage> {
        if !self.format.is_byte_aligned() {
            return None;
        }
        let mut rgb = Vec::with_capacity(self.pixel_count() * 3);
        for y in 0..self.height {
            for x in 0..self.width {
                rgb.extend_from_slice(&self.rgb_at(x, y));
            }
        }
        image::RgbImage::from_raw(self.width, self.height, rgb)
    }
}
