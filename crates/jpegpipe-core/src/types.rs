//! Frame-level types shared by the converters, the engine and the codec.

use serde::{Deserialize, Serialize};

/// Colorspace of a compressed stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorSpace {
    /// Single luminance channel.
    Grayscale,
    /// Luminance plus two color-difference channels.
    #[default]
    YCbCr,
    /// Four ink channels.
    Cmyk,
}

/// Ratio at which the color-difference channels are stored relative to luminance.
///
/// Only meaningful for [`ColorSpace::YCbCr`]; grayscale and CMYK streams are
/// always laid out as 4:4:4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChromaSubsampling {
    /// 4:4:4, full chroma resolution.
    #[serde(rename = "4:4:4")]
    S444,
    /// 4:2:2, chroma halved horizontally.
    #[default]
    #[serde(rename = "4:2:2")]
    S422,
    /// 4:2:0, chroma halved in both directions.
    #[serde(rename = "4:2:0")]
    S420,
}

impl ChromaSubsampling {
    /// Horizontal and vertical luminance sampling factors.
    pub fn luma_factors(self) -> (u8, u8) {
        match self {
            ChromaSubsampling::S444 => (1, 1),
            ChromaSubsampling::S422 => (2, 1),
            ChromaSubsampling::S420 => (2, 2),
        }
    }

    /// Maps luminance sampling factors read from a frame header.
    pub fn from_luma_factors(h: u8, v: u8) -> Option<Self> {
        match (h, v) {
            (1, 1) => Some(ChromaSubsampling::S444),
            (2, 1) => Some(ChromaSubsampling::S422),
            (2, 2) => Some(ChromaSubsampling::S420),
            _ => None,
        }
    }
}

/// Image parameters of one encode or decode operation.
///
/// For encode these come from the caller; for decode they are discovered
/// from the stream's frame header, in which case `quality` is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FrameInfo {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Stream colorspace.
    pub color_space: ColorSpace,
    /// Chroma subsampling of the stream.
    pub subsampling: ChromaSubsampling,
    /// Encoder quality (1-100), zero when unknown.
    pub quality: u8,
}

impl FrameInfo {
    /// Create frame parameters for an encode operation.
    pub fn new(
        width: u32,
        height: u32,
        color_space: ColorSpace,
        subsampling: ChromaSubsampling,
        quality: u8,
    ) -> Self {
        Self {
            width,
            height,
            color_space,
            subsampling,
            quality,
        }
    }

    /// Subsampling actually laid out in the stream.
    ///
    /// Grayscale and CMYK frames carry full-resolution components regardless
    /// of the requested subsampling.
    pub fn effective_subsampling(&self) -> ChromaSubsampling {
        match self.color_space {
            ColorSpace::YCbCr => self.subsampling,
            ColorSpace::Grayscale | ColorSpace::Cmyk => ChromaSubsampling::S444,
        }
    }
}
