//! MCU color conversion.
//!
//! Given a frame's colorspace and chroma subsampling, the selector returns a
//! converter that turns one minimum coded unit (MCU) of pixels into engine
//! samples (encode) or one unit of engine samples back into pixels (decode),
//! together with the number of units that cover the image.
//!
//! Converters work on absolute unit indices so the session only has to track
//! how many units have been processed; they never hold on to the pixel buffer.

mod convert;
mod layout;
mod tables;

pub use convert::{
    select_decode, select_encode, Converted, PixelsToSamples, SamplesToPixels, Selection,
    UnitConverter,
};
pub use layout::McuLayout;
pub use tables::init_tables;

use thiserror::Error;

use crate::raster::PixelFormat;

/// Errors from converter selection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ColorError {
    /// The pixel format cannot be converted to or from samples.
    #[error("Unsupported pixel format: {0:?}")]
    UnsupportedFormat(PixelFormat),

    /// Width or height is zero.
    #[error("Image has no pixels")]
    EmptyImage,
}

/// Pack 8-bit RGB into a 5-6-5 word.
#[inline]
pub fn pack_rgb565(r: u8, g: u8, b: u8) -> u16 {
    ((r as u16 >> 3) << 11) | ((g as u16 >> 2) << 5) | (b as u16 >> 3)
}

/// Expand a 5-6-5 word to 8-bit RGB, replicating the high bits into the low bits.
#[inline]
pub fn unpack_rgb565(v: u16) -> [u8; 3] {
    let r = ((v >> 11) & 0x1F) as u8;
    let g = ((v >> 5) & 0x3F) as u8;
    let b = (v & 0x1F) as u8;
    [(r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb565_extremes() {
        assert_eq!(pack_rgb565(0, 0, 0), 0x0000);
        assert_eq!(pack_rgb565(255, 255, 255), 0xFFFF);
        assert_eq!(pack_rgb565(255, 0, 0), 0xF800);
        assert_eq!(pack_rgb565(0, 255, 0), 0x07E0);
        assert_eq!(pack_rgb565(0, 0, 255), 0x001F);

        assert_eq!(unpack_rgb565(0xFFFF), [255, 255, 255]);
        assert_eq!(unpack_rgb565(0xF800), [255, 0, 0]);
    }

    #[test]
    fn test_rgb565_quantization_error_is_bounded() {
        for v in (0..=255u8).step_by(5) {
            let [r, g, b] = unpack_rgb565(pack_rgb565(v, v, v));
            assert!((r as i32 - v as i32).abs() <= 7);
            assert!((g as i32 - v as i32).abs() <= 3);
            assert!((b as i32 - v as i32).abs() <= 7);
        }
    }
}
