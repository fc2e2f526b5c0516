//! Software engine implementing the signal protocol on the host.
//!
//! Decompression uses the `image` crate and compression `jpeg-encoder`, which
//! writes the configured colorspace and chroma sampling factors. Everything
//! around them behaves like the block engine: input is taken in the lengths the handler
//! offers, output is produced in whole MCUs (decode) or output-buffer-sized
//! blocks (encode), and every stage obeys pause, resume and abort.
//!
//! Decode consumes input only up to the end-of-image marker, and an optional
//! input FIFO limit makes it take fewer bytes than offered, so the last
//! `consumed` count of a run is normally smaller than the chunk it was given.

use std::time::{Duration, Instant};

use image::ImageFormat;
use jpeg_encoder::{ColorType, Encoder, SamplingFactor};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::markers::MarkerTracker;
use super::{Engine, EngineControl, EngineError, EngineHandler, Stage};
use crate::color::{McuLayout, PixelsToSamples, SamplesToPixels, UnitConverter};
use crate::config::{QUALITY_MAX, QUALITY_MIN};
use crate::raster::PixelFormat;
use crate::types::{ChromaSubsampling, ColorSpace, FrameInfo};

/// Signal counters of an [`EmulatedEngine`].
///
/// Reset by [`Engine::init`], kept across [`Engine::deinit`] so they can be
/// inspected after an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EngineStats {
    pub header_ready: u32,
    pub need_input: u32,
    pub have_output: u32,
    pub errors: u32,
    pub aborts: u32,
    /// Input bytes the engine actually used.
    pub bytes_consumed: u64,
    /// Largest input length offered by the handler.
    pub largest_input: usize,
    /// Largest single output block.
    pub largest_output: usize,
}

/// Buffer lengths and stage flags, as seen by a handler through [`EngineControl`].
#[derive(Debug, Default)]
struct Registers {
    input_len: usize,
    output_len: usize,
    input_paused: bool,
    output_paused: bool,
    abort_requested: bool,
    stats: EngineStats,
}

impl Registers {
    fn new(input_len: usize, output_len: usize, stats: EngineStats) -> Self {
        Self {
            input_len,
            output_len,
            stats,
            ..Default::default()
        }
    }

    fn paused(&self, stage: Stage) -> bool {
        match stage {
            Stage::Input => self.input_paused,
            Stage::Output => self.output_paused,
        }
    }

    /// Check for abort or timeout between signals.
    fn poll(&self, deadline: Option<Instant>) -> Result<(), EngineError> {
        if self.abort_requested {
            return Err(EngineError::Aborted);
        }
        match deadline {
            Some(deadline) if Instant::now() >= deadline => Err(EngineError::Timeout),
            _ => Ok(()),
        }
    }

    /// A handler must not return with the stage it was signalled on still paused.
    fn ensure_running(&self, stage: Stage) -> Result<(), EngineError> {
        if self.abort_requested {
            return Err(EngineError::Aborted);
        }
        if self.paused(stage) {
            return Err(EngineError::Stalled(stage));
        }
        Ok(())
    }
}

impl EngineControl for Registers {
    fn pause(&mut self, stage: Stage) {
        match stage {
            Stage::Input => self.input_paused = true,
            Stage::Output => self.output_paused = true,
        }
    }

    fn resume(&mut self, stage: Stage) {
        match stage {
            Stage::Input => self.input_paused = false,
            Stage::Output => self.output_paused = false,
        }
    }

    fn set_input_buffer(&mut self, len: usize) {
        self.input_len = len;
    }

    fn set_output_buffer(&mut self, len: usize) {
        self.output_len = len;
    }

    fn abort(&mut self) {
        if !self.abort_requested {
            self.stats.aborts += 1;
        }
        self.abort_requested = true;
    }
}

/// Host implementation of [`Engine`].
#[derive(Debug, Default)]
pub struct EmulatedEngine {
    initialized: bool,
    frame: Option<FrameInfo>,
    input_fifo: Option<usize>,
    stats: EngineStats,
}

impl EmulatedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take at most `limit` bytes from each decode input buffer.
    pub fn with_input_fifo(mut self, limit: usize) -> Self {
        self.input_fifo = Some(limit.max(1));
        self
    }

    /// Counters of the current or most recent operation.
    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    fn deadline(timeout: Duration) -> Option<Instant> {
        Instant::now().checked_add(timeout)
    }

    /// Run `op` with fresh registers, reporting engine-side failures to the handler.
    fn run<F>(
        &mut self,
        handler: &mut dyn EngineHandler,
        input_len: usize,
        output_len: usize,
        op: F,
    ) -> Result<(), EngineError>
    where
        F: FnOnce(&Self, &mut Registers, &mut dyn EngineHandler) -> Result<(), EngineError>,
    {
        if !self.initialized {
            return Err(EngineError::NotInitialized);
        }
        let mut regs = Registers::new(input_len, output_len, self.stats);
        let result = match op(self, &mut regs, &mut *handler) {
            Err(EngineError::Aborted) => Err(EngineError::Aborted),
            Err(e) => {
                debug!("Engine error: {}", e);
                regs.stats.errors += 1;
                handler.on_error(&mut regs, &e);
                Err(e)
            }
            Ok(()) => Ok(()),
        };
        self.stats = regs.stats;
        result
    }

    fn decode(
        &self,
        regs: &mut Registers,
        handler: &mut dyn EngineHandler,
        deadline: Option<Instant>,
    ) -> Result<(), EngineError> {
        let mut tracker = MarkerTracker::new();
        let mut stream = Vec::new();
        let mut header_sent = false;

        loop {
            regs.poll(deadline)?;
            let offered = regs.input_len;
            if offered == 0 {
                return Err(EngineError::CorruptStream(
                    "input ended before end-of-image marker".to_string(),
                ));
            }
            let input = handler.input_buffer();
            if offered > input.len() {
                return Err(EngineError::InvalidBuffer(Stage::Input));
            }
            regs.stats.largest_input = regs.stats.largest_input.max(offered);

            let take = offered.min(self.input_fifo.unwrap_or(usize::MAX));
            let end = tracker.feed(&input[..take])?;
            let consumed = end.unwrap_or(take);
            stream.extend_from_slice(&input[..consumed]);
            regs.stats.bytes_consumed += consumed as u64;

            if !header_sent {
                if let Some(info) = tracker.frame().copied() {
                    header_sent = true;
                    regs.stats.header_ready += 1;
                    trace!("Header ready: {}x{}", info.width, info.height);
                    handler.on_header_ready(regs, &info);
                    regs.poll(deadline)?;
                }
            }

            if end.is_some() {
                break;
            }

            regs.stats.need_input += 1;
            trace!("Need input: consumed {} of {}", consumed, offered);
            handler.on_need_input(regs, consumed);
            regs.ensure_running(Stage::Input)?;
        }

        let info = tracker
            .frame()
            .copied()
            .ok_or_else(|| EngineError::CorruptStream("missing frame header".to_string()))?;
        self.emit_samples(regs, handler, deadline, &info, &stream)
    }

    /// Decompress the collected stream and hand it out one output buffer of whole MCUs at a time.
    fn emit_samples(
        &self,
        regs: &mut Registers,
        handler: &mut dyn EngineHandler,
        deadline: Option<Instant>,
        info: &FrameInfo,
        stream: &[u8],
    ) -> Result<(), EngineError> {
        let decoded = image::load_from_memory_with_format(stream, ImageFormat::Jpeg)
            .map_err(|e| EngineError::CorruptStream(e.to_string()))?;
        if (decoded.width(), decoded.height()) != (info.width, info.height) {
            return Err(EngineError::CorruptStream(
                "decoded size differs from frame header".to_string(),
            ));
        }

        let (format, pixels) = match info.color_space {
            ColorSpace::Grayscale => (PixelFormat::Grayscale, decoded.to_luma8().into_raw()),
            ColorSpace::YCbCr | ColorSpace::Cmyk => {
                (PixelFormat::Rgb888, decoded.to_rgb8().into_raw())
            }
        };
        let layout = McuLayout::from_frame(info);
        let sampler = PixelsToSamples::new(layout, format, info.width, info.height);
        let total = sampler.unit_total();

        let mut unit = 0;
        while unit < total {
            regs.poll(deadline)?;
            let len = regs.output_len;
            let out = handler.output_buffer();
            if len > out.len() || len < layout.sample_size() {
                return Err(EngineError::InvalidBuffer(Stage::Output));
            }
            let produced = sampler.convert(&pixels, &mut out[..len], unit, pixels.len());
            unit += produced.units;

            regs.stats.have_output += 1;
            regs.stats.largest_output = regs.stats.largest_output.max(produced.bytes);
            handler.on_have_output(regs, produced.bytes);
            regs.ensure_running(Stage::Output)?;
        }
        Ok(())
    }

    fn encode(
        &self,
        regs: &mut Registers,
        handler: &mut dyn EngineHandler,
        deadline: Option<Instant>,
    ) -> Result<(), EngineError> {
        let info = self.frame.ok_or(EngineError::NotConfigured)?;
        let layout = McuLayout::from_frame(&info);
        let format = match info.color_space {
            ColorSpace::Grayscale => PixelFormat::Grayscale,
            ColorSpace::YCbCr | ColorSpace::Cmyk => PixelFormat::Rgb888,
        };
        let rebuild = SamplesToPixels::new(layout, format, info.width, info.height);
        let total = rebuild.unit_total();
        let mut raster = vec![0u8; format.buffer_size(info.width, info.height)];
        let mut pending: Vec<u8> = Vec::with_capacity(layout.sample_size());
        let mut unit = 0;

        loop {
            regs.poll(deadline)?;
            let len = regs.input_len;
            // Zero length is the end-of-input marker, even with input paused
            if len == 0 {
                break;
            }
            if regs.input_paused {
                return Err(EngineError::Stalled(Stage::Input));
            }
            let input = handler.input_buffer();
            if len > input.len() {
                return Err(EngineError::InvalidBuffer(Stage::Input));
            }
            regs.stats.largest_input = regs.stats.largest_input.max(len);
            regs.stats.bytes_consumed += len as u64;

            pending.extend_from_slice(&input[..len]);
            let done = rebuild.convert(&pending, &mut raster, unit, pending.len());
            unit += done.units;
            pending.drain(..done.bytes);

            regs.stats.need_input += 1;
            trace!("Need input: unit {} of {}", unit, total);
            handler.on_need_input(regs, len);
            if regs.abort_requested {
                return Err(EngineError::Aborted);
            }
        }

        if unit < total {
            return Err(EngineError::MissingSamples {
                received: unit,
                expected: total,
            });
        }

        let jpeg = compress(&info, raster)?;
        debug!("Compressed {} units into {} bytes", total, jpeg.len());

        let mut sent = 0;
        while sent < jpeg.len() {
            regs.poll(deadline)?;
            let len = regs.output_len;
            let out = handler.output_buffer();
            if len == 0 || len > out.len() {
                return Err(EngineError::InvalidBuffer(Stage::Output));
            }
            let n = len.min(jpeg.len() - sent);
            out[..n].copy_from_slice(&jpeg[sent..sent + n]);
            sent += n;

            regs.stats.have_output += 1;
            regs.stats.largest_output = regs.stats.largest_output.max(n);
            handler.on_have_output(regs, n);
            regs.ensure_running(Stage::Output)?;
        }
        Ok(())
    }
}

/// Compress a rebuilt raster with the frame's colorspace and sampling factors.
fn compress(info: &FrameInfo, raster: Vec<u8>) -> Result<Vec<u8>, EngineError> {
    let width = u16::try_from(info.width).map_err(|_| EngineError::Unsupported("image width"))?;
    let height =
        u16::try_from(info.height).map_err(|_| EngineError::Unsupported("image height"))?;

    let (color, pixels) = match info.color_space {
        ColorSpace::Grayscale => (ColorType::Luma, raster),
        ColorSpace::YCbCr => (ColorType::Rgb, raster),
        // Rebuilt pixels carry no separate black channel
        ColorSpace::Cmyk => {
            let cmyk = raster
                .chunks_exact(3)
                .flat_map(|rgb| [255 - rgb[0], 255 - rgb[1], 255 - rgb[2], 0])
                .collect();
            (ColorType::Cmyk, cmyk)
        }
    };

    let mut jpeg = Vec::new();
    let mut encoder = Encoder::new(&mut jpeg, info.quality);
    encoder.set_sampling_factor(sampling_factor(info.effective_subsampling()));
    encoder
        .encode(&pixels, width, height, color)
        .map_err(|e| EngineError::Codec(e.to_string()))?;
    Ok(jpeg)
}

fn sampling_factor(subsampling: ChromaSubsampling) -> SamplingFactor {
    match subsampling {
        ChromaSubsampling::S444 => SamplingFactor::F_1_1,
        ChromaSubsampling::S422 => SamplingFactor::F_2_1,
        ChromaSubsampling::S420 => SamplingFactor::F_2_2,
    }
}

impl Engine for EmulatedEngine {
    fn init(&mut self) -> Result<(), EngineError> {
        self.initialized = true;
        self.frame = None;
        self.stats = EngineStats::default();
        Ok(())
    }

    fn deinit(&mut self) {
        self.initialized = false;
        self.frame = None;
    }

    fn configure(&mut self, info: &FrameInfo) -> Result<(), EngineError> {
        if !self.initialized {
            return Err(EngineError::NotInitialized);
        }
        if info.width == 0 || info.height == 0 || info.width > 0xFFFF || info.height > 0xFFFF {
            return Err(EngineError::Unsupported("image dimensions"));
        }
        if !(QUALITY_MIN..=QUALITY_MAX).contains(&info.quality) {
            return Err(EngineError::Unsupported("quality outside 1-100"));
        }
        self.frame = Some(*info);
        Ok(())
    }

    fn start_decode(
        &mut self,
        handler: &mut dyn EngineHandler,
        input_len: usize,
        output_len: usize,
        timeout: Duration,
    ) -> Result<(), EngineError> {
        let deadline = Self::deadline(timeout);
        self.run(handler, input_len, output_len, |engine, regs, handler| {
            engine.decode(regs, handler, deadline)
        })
    }

    fn start_encode(
        &mut self,
        handler: &mut dyn EngineHandler,
        input_len: usize,
        output_len: usize,
        timeout: Duration,
    ) -> Result<(), EngineError> {
        let deadline = Self::deadline(timeout);
        self.run(handler, input_len, output_len, |engine, regs, handler| {
            engine.encode(regs, handler, deadline)
        })
    }
}
