//! Session state for one decode or encode, and the engine signal handlers.
//!
//! A session owns the two staging buffers for the duration of one blocking
//! engine call. Each signal does at most one unit of storage I/O and one
//! conversion step, then hands the engine a new buffer length. Any failure
//! is recorded as the abort cause and the engine is told to stop.

use std::io;

use tracing::{debug, trace, warn};

use super::types::{AbortCause, Operation, OperationStats};
use crate::color::{select_decode, Selection, UnitConverter};
use crate::config::{BITSTREAM_BUFFER_SIZE, SAMPLE_BUFFER_SIZE};
use crate::engine::{EngineControl, EngineError, EngineHandler, Stage};
use crate::raster::PixelFormat;
use crate::storage::{StorageRead, StorageWrite};
use crate::types::FrameInfo;

/// Fixed-size buffers reused for the whole operation.
struct Staging {
    samples: [u8; SAMPLE_BUFFER_SIZE],
    bitstream: [u8; BITSTREAM_BUFFER_SIZE],
}

impl Staging {
    fn new() -> Self {
        Self {
            samples: [0; SAMPLE_BUFFER_SIZE],
            bitstream: [0; BITSTREAM_BUFFER_SIZE],
        }
    }
}

/// Progress through the image's units.
#[derive(Default)]
struct UnitCursor {
    index: usize,
    total: usize,
    stride: usize,
    converter: Option<Box<dyn UnitConverter>>,
}

impl UnitCursor {
    fn select(selection: Selection) -> Self {
        Self {
            index: 0,
            total: selection.unit_total,
            stride: selection.stride,
            converter: Some(selection.converter),
        }
    }
}

struct DecodeTarget<'a> {
    storage: &'a mut dyn StorageRead,
    /// Bytes read so far, corrected to what the engine actually consumed.
    offset: u64,
    /// Length of the chunk last handed to the engine.
    chunk_len: usize,
    /// Reserved up front, zero-filled one MCU row at a time as samples arrive.
    pixels: Vec<u8>,
    frame_bytes: usize,
    band_bytes: usize,
    units_across: usize,
}

struct EncodeSource<'a> {
    storage: &'a mut dyn StorageWrite,
    pixels: &'a [u8],
}

enum Role<'a> {
    Decoding(DecodeTarget<'a>),
    Encoding(EncodeSource<'a>),
}

/// Mutable state of one pipeline run.
pub(crate) struct Session<'a> {
    role: Role<'a>,
    units: UnitCursor,
    frame: Option<FrameInfo>,
    staging: Staging,
    fault: Option<AbortCause>,
    stats: OperationStats,
}

impl<'a> Session<'a> {
    /// Start a decode reading from `storage`.
    pub(crate) fn decoding(storage: &'a mut dyn StorageRead) -> Self {
        Self {
            role: Role::Decoding(DecodeTarget {
                storage,
                offset: 0,
                chunk_len: 0,
                pixels: Vec::new(),
                frame_bytes: 0,
                band_bytes: 0,
                units_across: 0,
            }),
            units: UnitCursor::default(),
            frame: None,
            staging: Staging::new(),
            fault: None,
            stats: OperationStats::new(Operation::Decoding),
        }
    }

    /// Start an encode of `pixels` described by `info`, writing to `storage`.
    pub(crate) fn encoding(
        storage: &'a mut dyn StorageWrite,
        pixels: &'a [u8],
        info: FrameInfo,
        selection: Selection,
    ) -> Self {
        Self {
            role: Role::Encoding(EncodeSource { storage, pixels }),
            units: UnitCursor::select(selection),
            frame: Some(info),
            staging: Staging::new(),
            fault: None,
            stats: OperationStats::new(Operation::Encoding),
        }
    }

    pub(crate) fn stats(&self) -> OperationStats {
        let mut stats = self.stats;
        stats.units = self.units.index;
        stats.unit_total = self.units.total;
        stats
    }

    /// Units processed and units required.
    pub(crate) fn unit_progress(&self) -> (usize, usize) {
        (self.units.index, self.units.total)
    }

    /// Read the first chunk of the stream into the bitstream buffer.
    pub(crate) fn read_first_chunk(&mut self) -> io::Result<usize> {
        let Role::Decoding(target) = &mut self.role else {
            return Ok(0);
        };
        let n = target.storage.read_block(&mut self.staging.bitstream)?;
        target.offset = n as u64;
        target.chunk_len = n;
        self.stats.storage_reads += 1;
        self.stats.bytes_read += n as u64;
        trace!("First chunk: {} bytes", n);
        Ok(n)
    }

    /// Convert the first unit of source pixels into the sample buffer.
    pub(crate) fn prime_first_unit(&mut self) -> Result<usize, AbortCause> {
        self.convert_next_unit()
    }

    /// Error to report for a failed engine call: the recorded abort cause if
    /// a handler stopped the engine, the engine's own error otherwise.
    pub(crate) fn failure(&mut self, error: EngineError) -> AbortCause {
        self.fault.take().unwrap_or(AbortCause::Engine(error))
    }

    /// Frame and pixel buffer of a completed decode.
    ///
    /// Rows never reached by a unit are left zeroed.
    pub(crate) fn into_decoded(self) -> Option<(FrameInfo, Vec<u8>)> {
        match self.role {
            Role::Decoding(mut target) => {
                let info = self.frame?;
                target.pixels.resize(target.frame_bytes, 0);
                Some((info, target.pixels))
            }
            Role::Encoding(_) => None,
        }
    }

    fn abort(&mut self, ctl: &mut dyn EngineControl, cause: AbortCause) {
        warn!("Aborting {:?}: {}", self.stats.operation, cause);
        if self.fault.is_none() {
            self.fault = Some(cause);
        }
        ctl.abort();
    }

    fn convert_next_unit(&mut self) -> Result<usize, AbortCause> {
        let Role::Encoding(source) = &self.role else {
            return Err(AbortCause::Protocol("conversion of source pixels while decoding"));
        };
        let converter = self
            .units
            .converter
            .as_ref()
            .ok_or(AbortCause::Protocol("no converter selected"))?;
        let produced = converter.convert(
            source.pixels,
            &mut self.staging.samples,
            self.units.index,
            self.units.stride,
        );
        if produced.units == 0 {
            return Err(AbortCause::Protocol("conversion made no progress"));
        }
        self.units.index += produced.units;
        Ok(produced.bytes)
    }

    fn start_frame(&mut self, info: &FrameInfo) -> Result<(), AbortCause> {
        if !matches!(self.role, Role::Decoding(_)) {
            return Err(AbortCause::Protocol("header signal while encoding"));
        }
        if self.frame.is_some() {
            return Err(AbortCause::Protocol("second header signal"));
        }
        let selection = select_decode(info)?;
        let format = PixelFormat::for_color_space(info.color_space);
        let size = format
            .checked_buffer_size(info.width, info.height)
            .ok_or(AbortCause::OutOfMemory(usize::MAX))?;
        let band_bytes = format
            .checked_buffer_size(info.width, selection.layout.height())
            .ok_or(AbortCause::OutOfMemory(usize::MAX))?;

        let mut pixels = Vec::new();
        pixels
            .try_reserve_exact(size)
            .map_err(|_| AbortCause::OutOfMemory(size))?;

        debug!(
            "Decoding {}x{} {:?} {:?}: {} units into {} bytes",
            info.width, info.height, info.color_space, info.subsampling, selection.unit_total, size
        );
        if let Role::Decoding(target) = &mut self.role {
            target.pixels = pixels;
            target.frame_bytes = size;
            target.band_bytes = band_bytes;
            target.units_across = selection.layout.units_across(info.width);
        }
        self.units = UnitCursor::select(selection);
        self.frame = Some(*info);
        Ok(())
    }

    fn refill_bitstream(
        &mut self,
        ctl: &mut dyn EngineControl,
        consumed: usize,
    ) -> Result<(), AbortCause> {
        let Role::Decoding(target) = &mut self.role else {
            return Err(AbortCause::Protocol("bitstream refill while encoding"));
        };
        ctl.pause(Stage::Input);

        if consumed > target.chunk_len {
            return Err(AbortCause::Protocol("engine consumed more than it was given"));
        }
        if consumed < target.chunk_len {
            // Step back so the unused tail is read again
            let unused = (target.chunk_len - consumed) as u64;
            target.offset -= unused;
            self.stats.rewinds += 1;
            trace!("Rewinding {} unused bytes to offset {}", unused, target.offset);
            let offset = target.offset;
            target
                .storage
                .seek_to(offset)
                .map_err(|source| AbortCause::Seek { offset, source })?;
        }

        let n = target
            .storage
            .read_block(&mut self.staging.bitstream)
            .map_err(AbortCause::Read)?;
        target.offset += n as u64;
        target.chunk_len = n;
        self.stats.storage_reads += 1;
        self.stats.bytes_read += n as u64;

        ctl.set_input_buffer(n);
        ctl.resume(Stage::Input);
        Ok(())
    }

    fn refill_samples(&mut self, ctl: &mut dyn EngineControl) -> Result<(), AbortCause> {
        ctl.pause(Stage::Input);
        if self.units.index < self.units.total {
            let bytes = self.convert_next_unit()?;
            ctl.set_input_buffer(bytes);
            ctl.resume(Stage::Input);
        } else {
            trace!("All {} units delivered, signalling end of input", self.units.total);
            ctl.set_input_buffer(0);
        }
        Ok(())
    }

    fn drain_samples(&mut self, ctl: &mut dyn EngineControl, len: usize) -> Result<(), AbortCause> {
        let Role::Decoding(target) = &mut self.role else {
            return Err(AbortCause::Protocol("sample drain while encoding"));
        };
        ctl.pause(Stage::Output);

        if len > SAMPLE_BUFFER_SIZE {
            return Err(AbortCause::Protocol("output larger than the sample buffer"));
        }
        let converter = self
            .units
            .converter
            .as_ref()
            .ok_or(AbortCause::Protocol("output before header"))?;

        // Zero-fill through the last MCU row this block can reach
        let incoming = len / self.units.stride.max(1);
        let last = (self.units.index + incoming).min(self.units.total);
        let bands = last.div_ceil(target.units_across.max(1));
        let needed = bands.saturating_mul(target.band_bytes).min(target.frame_bytes);
        if target.pixels.len() < needed {
            target.pixels.resize(needed, 0);
        }

        let done = converter.convert(
            &self.staging.samples[..len],
            &mut target.pixels,
            self.units.index,
            len,
        );
        self.units.index += done.units;

        ctl.set_output_buffer(SAMPLE_BUFFER_SIZE);
        ctl.resume(Stage::Output);
        Ok(())
    }

    fn drain_bitstream(
        &mut self,
        ctl: &mut dyn EngineControl,
        len: usize,
    ) -> Result<(), AbortCause> {
        let Role::Encoding(source) = &mut self.role else {
            return Err(AbortCause::Protocol("bitstream drain while decoding"));
        };
        ctl.pause(Stage::Output);

        if len > BITSTREAM_BUFFER_SIZE {
            return Err(AbortCause::Protocol("output larger than the bitstream buffer"));
        }
        let written = source
            .storage
            .write_block(&self.staging.bitstream[..len])
            .map_err(AbortCause::Write)?;
        self.stats.storage_writes += 1;
        self.stats.bytes_written += written as u64;

        ctl.set_output_buffer(BITSTREAM_BUFFER_SIZE);
        ctl.resume(Stage::Output);
        Ok(())
    }
}

impl EngineHandler for Session<'_> {
    fn input_buffer(&self) -> &[u8] {
        match self.role {
            Role::Decoding(_) => &self.staging.bitstream[..],
            Role::Encoding(_) => &self.staging.samples[..],
        }
    }

    fn output_buffer(&mut self) -> &mut [u8] {
        match self.role {
            Role::Decoding(_) => &mut self.staging.samples[..],
            Role::Encoding(_) => &mut self.staging.bitstream[..],
        }
    }

    fn on_header_ready(&mut self, ctl: &mut dyn EngineControl, info: &FrameInfo) {
        if let Err(cause) = self.start_frame(info) {
            self.abort(ctl, cause);
        }
    }

    fn on_need_input(&mut self, ctl: &mut dyn EngineControl, consumed: usize) {
        let result = match self.role {
            Role::Decoding(_) => self.refill_bitstream(ctl, consumed),
            Role::Encoding(_) => self.refill_samples(ctl),
        };
        if let Err(cause) = result {
            self.abort(ctl, cause);
        }
    }

    fn on_have_output(&mut self, ctl: &mut dyn EngineControl, len: usize) {
        let result = match self.role {
            Role::Decoding(_) => self.drain_samples(ctl, len),
            Role::Encoding(_) => self.drain_bitstream(ctl, len),
        };
        if let Err(cause) = result {
            self.abort(ctl, cause);
        }
    }

    fn on_error(&mut self, ctl: &mut dyn EngineControl, error: &EngineError) {
        self.abort(ctl, AbortCause::Engine(error.clone()));
    }
}
