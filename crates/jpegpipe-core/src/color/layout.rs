//! Geometry of the minimum coded unit for each colorspace/subsampling pair.

use crate::config::{
    BLOCK_SIZE, MCU_SIZE_CMYK, MCU_SIZE_GRAYSCALE, MCU_SIZE_YCBCR420, MCU_SIZE_YCBCR422,
    MCU_SIZE_YCBCR444, SOURCE_STRIDE_420, SOURCE_STRIDE_422, SOURCE_STRIDE_444,
    STRIDE_BYTES_PER_PIXEL,
};
use crate::raster::PixelFormat;
use crate::types::{ChromaSubsampling, ColorSpace, FrameInfo};

/// Sample layout of one MCU.
///
/// Luma blocks come first in raster order, followed by one block per
/// chroma (or ink) channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum McuLayout {
    /// One 8x8 luma block.
    Grayscale,
    /// 16x16 pixels: four luma blocks, Cb, Cr.
    YCbCr420,
    /// 16x8 pixels: two luma blocks, Cb, Cr.
    YCbCr422,
    /// 8x8 pixels: Y, Cb, Cr.
    YCbCr444,
    /// 8x8 pixels: C, M, Y, K.
    Cmyk,
}

impl McuLayout {
    /// Select the layout for a colorspace and chroma subsampling.
    pub fn new(color_space: ColorSpace, subsampling: ChromaSubsampling) -> Self {
        match color_space {
            ColorSpace::Grayscale => McuLayout::Grayscale,
            ColorSpace::Cmyk => McuLayout::Cmyk,
            ColorSpace::YCbCr => match subsampling {
                ChromaSubsampling::S420 => McuLayout::YCbCr420,
                ChromaSubsampling::S422 => McuLayout::YCbCr422,
                ChromaSubsampling::S444 => McuLayout::YCbCr444,
            },
        }
    }

    /// Layout of the given frame.
    pub fn from_frame(info: &FrameInfo) -> Self {
        Self::new(info.color_space, info.subsampling)
    }

    /// MCU width in pixels.
    pub const fn width(self) -> u32 {
        match self {
            McuLayout::YCbCr420 | McuLayout::YCbCr422 => 16,
            _ => 8,
        }
    }

    /// MCU height in pixels.
    pub const fn height(self) -> u32 {
        match self {
            McuLayout::YCbCr420 => 16,
            _ => 8,
        }
    }

    /// Pixels covered by one MCU.
    pub const fn pixels(self) -> usize {
        (self.width() * self.height()) as usize
    }

    /// Sample bytes of one MCU.
    pub const fn sample_size(self) -> usize {
        match self {
            McuLayout::Grayscale => MCU_SIZE_GRAYSCALE,
            McuLayout::YCbCr420 => MCU_SIZE_YCBCR420,
            McuLayout::YCbCr422 => MCU_SIZE_YCBCR422,
            McuLayout::YCbCr444 => MCU_SIZE_YCBCR444,
            McuLayout::Cmyk => MCU_SIZE_CMYK,
        }
    }

    /// Number of 8x8 luma blocks at the start of each MCU.
    pub const fn luma_blocks(self) -> usize {
        (self.pixels()) / BLOCK_SIZE
    }

    /// Whether the MCU carries Cb and Cr blocks after the luma blocks.
    pub const fn has_chroma(self) -> bool {
        matches!(
            self,
            McuLayout::YCbCr420 | McuLayout::YCbCr422 | McuLayout::YCbCr444
        )
    }

    /// Source bytes per conversion step, in RGB565 terms.
    pub const fn source_stride(self) -> usize {
        match self {
            McuLayout::YCbCr420 => SOURCE_STRIDE_420,
            McuLayout::YCbCr422 => SOURCE_STRIDE_422,
            McuLayout::YCbCr444 | McuLayout::Grayscale | McuLayout::Cmyk => SOURCE_STRIDE_444,
        }
    }

    /// Source bytes per conversion step for pixels of `format`.
    pub fn source_stride_for(self, format: PixelFormat) -> usize {
        self.source_stride() / STRIDE_BYTES_PER_PIXEL * format.bytes_per_pixel()
    }

    /// MCUs per row for an image `width` pixels wide.
    pub fn units_across(self, width: u32) -> usize {
        width.div_ceil(self.width()) as usize
    }

    /// MCU rows for an image `height` pixels tall.
    pub fn units_down(self, height: u32) -> usize {
        height.div_ceil(self.height()) as usize
    }

    /// Total MCUs covering a `width` x `height` image.
    pub fn unit_count(self, width: u32, height: u32) -> usize {
        self.units_across(width) * self.units_down(height)
    }

    /// Whether `width` x `height` is tiled exactly by whole MCUs.
    pub fn fits(self, width: u32, height: u32) -> bool {
        width % self.width() == 0 && height % self.height() == 0
    }
}
