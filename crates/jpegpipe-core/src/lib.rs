//! JpegPipe Core - Streaming JPEG codec pipeline
//!
//! This crate drives a block-throughput JPEG engine to decode or encode a
//! compressed stream against block storage, using two small fixed-size
//! staging buffers regardless of image resolution.
//!
//! The pieces, leaf first:
//! - [`color`]: per-MCU color converters and their selector
//! - [`storage`]: seekable block source and append-only block sink
//! - [`engine`]: the engine boundary and a software [`EmulatedEngine`]
//! - [`codec`]: the session state machine and the decode/encode entry points

pub mod codec;
pub mod color;
pub mod config;
pub mod engine;
pub mod raster;
pub mod storage;
pub mod types;

pub use codec::{AbortCause, CodecError, EncodeParams, JpegCodec, Operation, OperationStats};
pub use config::CodecConfig;
pub use engine::{EmulatedEngine, Engine, EngineError, EngineStats};
pub use raster::{Image, PixelFormat};
pub use storage::{StorageRead, StorageWrite};
pub use types::{ChromaSubsampling, ColorSpace, FrameInfo};
