//! Staging buffer sizes, MCU geometry and runtime codec settings.
//!
//! The staging buffers are sized once here and never grow with the image;
//! the relationships between them and the engine's unit sizes are checked
//! at build time.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::ChromaSubsampling;

/// Compressed bytes exchanged with storage per refill or drain.
pub const BITSTREAM_BUFFER_SIZE: usize = 512;

/// Sample-domain bytes exchanged with the engine per signal.
pub const SAMPLE_BUFFER_SIZE: usize = 768;

/// Sample bytes of one 4:2:0 MCU (four luma blocks, two chroma blocks).
pub const MCU_SIZE_YCBCR420: usize = 384;
/// Sample bytes of one 4:2:2 MCU (two luma blocks, two chroma blocks).
pub const MCU_SIZE_YCBCR422: usize = 256;
/// Sample bytes of one 4:4:4 MCU.
pub const MCU_SIZE_YCBCR444: usize = 192;
/// Sample bytes of one grayscale MCU.
pub const MCU_SIZE_GRAYSCALE: usize = 64;
/// Sample bytes of one CMYK MCU.
pub const MCU_SIZE_CMYK: usize = 256;

/// Source bytes per conversion step for 4:2:0, in RGB565 terms.
pub const SOURCE_STRIDE_420: usize = 512;
/// Source bytes per conversion step for 4:2:2, in RGB565 terms.
pub const SOURCE_STRIDE_422: usize = 256;
/// Source bytes per conversion step for 4:4:4, grayscale and CMYK, in RGB565 terms.
pub const SOURCE_STRIDE_444: usize = 128;

/// Bytes per pixel the source strides are expressed in.
pub const STRIDE_BYTES_PER_PIXEL: usize = 2;

/// Bytes in one 8x8 sample block.
pub const BLOCK_SIZE: usize = 64;

/// Bound on one blocking engine call.
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Lowest quality the engine accepts.
pub const QUALITY_MIN: u8 = 1;
/// Highest quality the engine accepts.
pub const QUALITY_MAX: u8 = 100;
/// Quality used by the path-level save helper.
pub const DEFAULT_QUALITY: u8 = 90;

const _: () = {
    assert!(MCU_SIZE_YCBCR420 == 6 * BLOCK_SIZE);
    assert!(MCU_SIZE_YCBCR422 == 4 * BLOCK_SIZE);
    assert!(MCU_SIZE_YCBCR444 == 3 * BLOCK_SIZE);
    assert!(MCU_SIZE_GRAYSCALE == BLOCK_SIZE);
    assert!(MCU_SIZE_CMYK == 4 * BLOCK_SIZE);

    // One conversion step covers exactly one MCU of RGB565 pixels
    assert!(SOURCE_STRIDE_420 == 16 * 16 * STRIDE_BYTES_PER_PIXEL);
    assert!(SOURCE_STRIDE_422 == 16 * 8 * STRIDE_BYTES_PER_PIXEL);
    assert!(SOURCE_STRIDE_444 == 8 * 8 * STRIDE_BYTES_PER_PIXEL);

    // The sample buffer must hold at least one MCU of every layout
    assert!(SAMPLE_BUFFER_SIZE >= MCU_SIZE_YCBCR420);
    assert!(SAMPLE_BUFFER_SIZE >= MCU_SIZE_YCBCR422);
    assert!(SAMPLE_BUFFER_SIZE >= MCU_SIZE_YCBCR444);
    assert!(SAMPLE_BUFFER_SIZE >= MCU_SIZE_CMYK);
    assert!(SAMPLE_BUFFER_SIZE >= MCU_SIZE_GRAYSCALE);

    assert!(QUALITY_MIN <= DEFAULT_QUALITY && DEFAULT_QUALITY <= QUALITY_MAX);
};

/// Runtime settings of a [`JpegCodec`](crate::codec::JpegCodec).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Timeout of one blocking engine call, in milliseconds.
    pub timeout_ms: u64,
    /// Quality used when saving images.
    pub quality: u8,
    /// Chroma subsampling used when saving color images.
    pub subsampling: ChromaSubsampling,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            quality: DEFAULT_QUALITY,
            subsampling: ChromaSubsampling::S422,
        }
    }
}

impl CodecConfig {
    /// Timeout of one blocking engine call.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
