//! Core types for the codec entry points.

use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::color::ColorError;
use crate::config::CodecConfig;
use crate::engine::EngineError;
use crate::raster::PixelFormat;
use crate::types::{ChromaSubsampling, ColorSpace};

/// Error types for decode and encode operations.
#[derive(Debug, Error)]
pub enum CodecError {
    /// A call-site argument is malformed; nothing was read or written.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(&'static str),

    /// The image is not tiled by whole MCUs of the requested layout.
    #[error("Image size {width}x{height} is not a multiple of the {mcu_width}x{mcu_height} coding unit")]
    WrongSize {
        width: u32,
        height: u32,
        mcu_width: u32,
        mcu_height: u32,
    },

    /// The source pixel format cannot be encoded.
    #[error("Unsupported pixel format: {0:?}")]
    UnsupportedFormat(PixelFormat),

    /// The storage could not be opened or created.
    #[error("Failed to open storage: {0}")]
    Open(#[source] io::Error),

    /// Rewinding the storage before decoding failed.
    #[error("Storage seek failed: {0}")]
    Seek(#[source] io::Error),

    /// Reading the first chunk failed.
    #[error("Storage read failed: {0}")]
    Read(#[source] io::Error),

    /// Flushing the destination after encoding failed.
    #[error("Storage write failed: {0}")]
    Write(#[source] io::Error),

    /// The engine stopped before the operation finished.
    #[error("Operation not completed: {0}")]
    OperationNotCompleted(#[source] AbortCause),
}

/// Why an in-flight operation was aborted.
#[derive(Debug, Error)]
pub enum AbortCause {
    /// Rewinding to the engine's true position failed.
    #[error("seek to offset {offset} failed: {source}")]
    Seek { offset: u64, source: io::Error },

    /// Reading the next chunk failed.
    #[error("storage read failed: {0}")]
    Read(#[source] io::Error),

    /// Writing a compressed block failed.
    #[error("storage write failed: {0}")]
    Write(#[source] io::Error),

    /// The decoded pixel buffer could not be allocated.
    #[error("out of memory allocating {0} byte pixel buffer")]
    OutOfMemory(usize),

    /// No converter exists for the stream.
    #[error(transparent)]
    Color(#[from] ColorError),

    /// The engine raised a signal the session cannot honor.
    #[error("protocol violation: {0}")]
    Protocol(&'static str),

    /// The engine failed or timed out.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Direction of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    #[default]
    Decoding,
    Encoding,
}

/// Output stream parameters for [`JpegCodec::encode`](super::JpegCodec::encode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodeParams {
    /// Colorspace of the compressed stream.
    pub color_space: ColorSpace,
    /// Chroma subsampling; ignored for grayscale and CMYK.
    pub subsampling: ChromaSubsampling,
    /// Quality (1-100).
    pub quality: u8,
}

impl EncodeParams {
    pub fn new(color_space: ColorSpace, subsampling: ChromaSubsampling, quality: u8) -> Self {
        Self {
            color_space,
            subsampling,
            quality,
        }
    }

    /// Parameters used when saving an image of `format`.
    ///
    /// Grayscale images are stored as grayscale 4:4:4; everything else as
    /// YCbCr with the configured subsampling.
    pub fn for_image(format: PixelFormat, config: &CodecConfig) -> Self {
        match format {
            PixelFormat::Grayscale => {
                Self::new(ColorSpace::Grayscale, ChromaSubsampling::S444, config.quality)
            }
            _ => Self::new(ColorSpace::YCbCr, config.subsampling, config.quality),
        }
    }
}

/// Counters of the last decode or encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OperationStats {
    pub operation: Operation,
    /// Units converted.
    pub units: usize,
    /// Units covering the image, zero if the frame was never known.
    pub unit_total: usize,
    pub storage_reads: u32,
    pub bytes_read: u64,
    pub storage_writes: u32,
    pub bytes_written: u64,
    /// Times the read position was moved back to the engine's true position.
    pub rewinds: u32,
}

impl OperationStats {
    pub(crate) fn new(operation: Operation) -> Self {
        Self {
            operation,
            ..Default::default()
        }
    }
}
