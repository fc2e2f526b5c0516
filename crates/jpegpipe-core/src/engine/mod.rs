//! Block-throughput JPEG engine boundary.
//!
//! An [`Engine`] runs one blocking decode or encode call at a time. While the
//! call is in progress it raises signals on an [`EngineHandler`]: header
//! ready, need input, have output and error. Each handler receives an
//! [`EngineControl`] to pause or resume a stage, hand the engine new buffer
//! lengths, or abort the operation.
//!
//! Signals are delivered synchronously on the caller's stack, one at a time,
//! so the handler needs no locking. The engine reads input from and writes
//! output into buffers owned by the handler; only lengths cross the boundary.

mod emulated;
pub(crate) mod markers;

pub use emulated::{EmulatedEngine, EngineStats};

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::FrameInfo;

/// One side of the engine's data path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Data flowing into the engine.
    Input,
    /// Data flowing out of the engine.
    Output,
}

/// Failures reported by an engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The blocking call ran past its timeout.
    #[error("Engine operation timed out")]
    Timeout,

    /// A handler aborted the operation.
    #[error("Engine operation aborted")]
    Aborted,

    /// The compressed stream is malformed.
    #[error("Corrupt stream: {0}")]
    CorruptStream(String),

    /// The stream uses a feature the engine does not implement.
    #[error("Unsupported stream feature: {0}")]
    Unsupported(&'static str),

    /// Encode was started without frame parameters.
    #[error("Engine not configured")]
    NotConfigured,

    /// The engine was used before `init` or after `deinit`.
    #[error("Engine not initialized")]
    NotInitialized,

    /// A handler returned with the stage still paused.
    #[error("{0:?} stage left paused by handler")]
    Stalled(Stage),

    /// A handler set a buffer length the engine cannot use.
    #[error("Invalid {0:?} buffer length")]
    InvalidBuffer(Stage),

    /// Encode input ended before every unit was delivered.
    #[error("Input ended after {received} of {expected} units")]
    MissingSamples { received: usize, expected: usize },

    /// The compression core itself failed.
    #[error("Codec failure: {0}")]
    Codec(String),
}

/// Control calls available to a handler while it services a signal.
pub trait EngineControl {
    /// Stop the engine from touching `stage` until resumed.
    fn pause(&mut self, stage: Stage);

    /// Let the engine continue with `stage`.
    fn resume(&mut self, stage: Stage);

    /// Offer the first `len` bytes of the input buffer.
    ///
    /// A zero length while encoding marks the end of the input.
    fn set_input_buffer(&mut self, len: usize);

    /// Offer the first `len` bytes of the output buffer.
    fn set_output_buffer(&mut self, len: usize);

    /// Stop the operation; the blocking call returns [`EngineError::Aborted`].
    fn abort(&mut self);
}

/// Receiver of engine signals, and owner of the buffers the engine uses.
pub trait EngineHandler {
    /// Buffer the engine reads input from.
    fn input_buffer(&self) -> &[u8];

    /// Buffer the engine writes output into.
    fn output_buffer(&mut self) -> &mut [u8];

    /// The frame header has been parsed (decode only).
    fn on_header_ready(&mut self, ctl: &mut dyn EngineControl, info: &FrameInfo);

    /// The current input has been taken; `consumed` bytes of it were used.
    fn on_need_input(&mut self, ctl: &mut dyn EngineControl, consumed: usize);

    /// `len` bytes of output are ready at the start of the output buffer.
    fn on_have_output(&mut self, ctl: &mut dyn EngineControl, len: usize);

    /// The engine hit an error and is about to return it.
    fn on_error(&mut self, ctl: &mut dyn EngineControl, error: &EngineError);
}

/// A JPEG engine driven through blocking calls and handler signals.
pub trait Engine {
    /// Reset the engine to a known idle state.
    fn init(&mut self) -> Result<(), EngineError>;

    /// Release the engine; it must be re-initialized before the next call.
    fn deinit(&mut self);

    /// Set the frame parameters used by the next encode.
    fn configure(&mut self, info: &FrameInfo) -> Result<(), EngineError>;

    /// Decode until end of image, starting with `input_len` bytes of input
    /// and an output target of `output_len` bytes.
    fn start_decode(
        &mut self,
        handler: &mut dyn EngineHandler,
        input_len: usize,
        output_len: usize,
        timeout: Duration,
    ) -> Result<(), EngineError>;

    /// Encode until the end-of-input marker, starting with `input_len`
    /// sample bytes and an output target of `output_len` bytes.
    fn start_encode(
        &mut self,
        handler: &mut dyn EngineHandler,
        input_len: usize,
        output_len: usize,
        timeout: Duration,
    ) -> Result<(), EngineError>;
}
