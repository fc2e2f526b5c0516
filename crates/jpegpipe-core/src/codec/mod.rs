//! Streaming JPEG decode and encode over block storage.
//!
//! [`JpegCodec`] drives an [`Engine`] through one blocking call per
//! operation. Compressed bytes move through a 512-byte bitstream buffer and
//! samples through a 768-byte sample buffer, whatever the image size; only
//! the decoded pixel buffer grows with the image.
//!
//! # Example
//!
//! ```ignore
//! use jpegpipe_core::{ChromaSubsampling, ColorSpace, EncodeParams, Image, JpegCodec, PixelFormat};
//! use std::io::Cursor;
//!
//! let mut codec = JpegCodec::new();
//! let source = Image::zeroed(64, 64, PixelFormat::Grayscale);
//! let mut jpeg = Cursor::new(Vec::new());
//! let params = EncodeParams::new(ColorSpace::Grayscale, ChromaSubsampling::S444, 90);
//! codec.encode(&source, &mut jpeg, &params)?;
//!
//! let mut decoded = Image::empty();
//! codec.decode(&mut decoded, &mut jpeg)?;
//! assert_eq!(decoded.byte_size(), 4096);
//! ```

mod decode;
mod encode;
mod session;
mod types;

pub use types::{AbortCause, CodecError, EncodeParams, Operation, OperationStats};

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use tracing::debug;

use crate::config::CodecConfig;
use crate::engine::{EmulatedEngine, Engine};
use crate::raster::Image;

/// JPEG codec bound to one engine.
///
/// One operation runs at a time; `&mut self` on every entry point keeps
/// concurrent callers out.
#[derive(Debug)]
pub struct JpegCodec<E: Engine = EmulatedEngine> {
    engine: E,
    config: CodecConfig,
    last_stats: Option<OperationStats>,
}

impl JpegCodec<EmulatedEngine> {
    /// Create a codec on the software engine with default settings.
    pub fn new() -> Self {
        Self::with_engine(EmulatedEngine::new(), CodecConfig::default())
    }
}

impl Default for JpegCodec<EmulatedEngine> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Engine> JpegCodec<E> {
    /// Create a codec driving `engine`.
    pub fn with_engine(engine: E, config: CodecConfig) -> Self {
        Self {
            engine,
            config,
            last_stats: None,
        }
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: CodecConfig) {
        self.config = config;
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Counters of the most recent operation that reached the engine.
    pub fn last_stats(&self) -> Option<&OperationStats> {
        self.last_stats.as_ref()
    }

    /// Decode the JPEG file at `path`.
    pub fn read_jpeg(&mut self, path: impl AsRef<Path>) -> Result<Image, CodecError> {
        let path = path.as_ref();
        debug!("Reading {}", path.display());
        let file = File::open(path).map_err(CodecError::Open)?;
        let mut reader = BufReader::new(file);
        let mut image = Image::empty();
        self.decode(&mut image, &mut reader)?;
        Ok(image)
    }

    /// Encode `image` into a new JPEG file at `path`.
    ///
    /// Grayscale images are saved as grayscale, everything else as YCbCr with
    /// the configured subsampling, both at the configured quality. The file is
    /// closed whether or not encoding succeeds.
    pub fn save_jpeg(&mut self, image: &Image, path: impl AsRef<Path>) -> Result<(), CodecError> {
        let path = path.as_ref();
        let params = EncodeParams::for_image(image.format, &self.config);
        debug!("Saving {} with {:?}", path.display(), params);
        let file = File::create(path).map_err(CodecError::Open)?;
        let mut writer = BufWriter::new(file);
        self.encode(image, &mut writer, &params)?;
        writer.flush().map_err(CodecError::Write)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::McuLayout;
    use crate::config::{BITSTREAM_BUFFER_SIZE, DEFAULT_TIMEOUT_MS, SAMPLE_BUFFER_SIZE};
    use crate::engine::markers::MarkerTracker;
    use crate::engine::{EngineControl, EngineError, EngineHandler, EngineStats, Stage};
    use crate::raster::PixelFormat;
    use crate::storage::StorageWrite;
    use crate::types::{ChromaSubsampling, ColorSpace, FrameInfo};
    use image::codecs::jpeg::JpegEncoder;
    use image::{ExtendedColorType, ImageEncoder};
    use std::io::{self, Cursor, Read, Seek, SeekFrom};
    use std::time::Duration;

    // ===== Storage helpers =====

    /// Reader that counts the bytes it hands out.
    struct CountingReader {
        inner: Cursor<Vec<u8>>,
        bytes_read: usize,
        seeks: usize,
    }

    impl CountingReader {
        fn new(data: Vec<u8>) -> Self {
            Self {
                inner: Cursor::new(data),
                bytes_read: 0,
                seeks: 0,
            }
        }
    }

    impl Read for CountingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.inner.read(buf)?;
            self.bytes_read += n;
            Ok(n)
        }
    }

    impl Seek for CountingReader {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.seeks += 1;
            self.inner.seek(pos)
        }
    }

    /// Reader that fails every read after the first `ok_reads`.
    struct BrokenReader {
        inner: Cursor<Vec<u8>>,
        ok_reads: usize,
        fail_seek: bool,
    }

    impl Read for BrokenReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.ok_reads == 0 {
                return Err(io::Error::other("media removed"));
            }
            self.ok_reads -= 1;
            self.inner.read(buf)
        }
    }

    impl Seek for BrokenReader {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            if self.fail_seek {
                return Err(io::Error::other("seek unsupported"));
            }
            self.inner.seek(pos)
        }
    }

    /// Sink that fails on the `fail_at`-th block write (1-based).
    struct FailingWriter {
        fail_at: usize,
        writes: usize,
        data: Vec<u8>,
    }

    impl StorageWrite for FailingWriter {
        fn write_block(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.writes += 1;
            if self.writes == self.fail_at {
                return Err(io::Error::other("disk full"));
            }
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }
    }

    // ===== Scripted engine =====

    #[derive(Default)]
    struct ScriptRegisters {
        input_len: usize,
        output_len: usize,
        aborts: usize,
    }

    impl EngineControl for ScriptRegisters {
        fn pause(&mut self, _stage: Stage) {}
        fn resume(&mut self, _stage: Stage) {}
        fn set_input_buffer(&mut self, len: usize) {
            self.input_len = len;
        }
        fn set_output_buffer(&mut self, len: usize) {
            self.output_len = len;
        }
        fn abort(&mut self) {
            self.aborts += 1;
        }
    }

    /// Decode engine that consumes inputs in a fixed pattern of lengths and
    /// records exactly which bytes it was given.
    struct ScriptedEngine {
        header: FrameInfo,
        consume: Vec<usize>,
        received: Vec<u8>,
        aborts: usize,
    }

    impl ScriptedEngine {
        fn new(header: FrameInfo, consume: Vec<usize>) -> Self {
            Self {
                header,
                consume,
                received: Vec::new(),
                aborts: 0,
            }
        }
    }

    impl Engine for ScriptedEngine {
        fn init(&mut self) -> Result<(), EngineError> {
            self.received.clear();
            self.aborts = 0;
            Ok(())
        }

        fn deinit(&mut self) {}

        fn configure(&mut self, _info: &FrameInfo) -> Result<(), EngineError> {
            Ok(())
        }

        fn start_decode(
            &mut self,
            handler: &mut dyn EngineHandler,
            input_len: usize,
            output_len: usize,
            _timeout: Duration,
        ) -> Result<(), EngineError> {
            let mut regs = ScriptRegisters {
                input_len,
                output_len,
                aborts: 0,
            };
            handler.on_header_ready(&mut regs, &self.header);
            self.aborts = regs.aborts;
            if regs.aborts > 0 {
                return Err(EngineError::Aborted);
            }

            let mut step = 0;
            while regs.input_len > 0 {
                let take = self.consume[step % self.consume.len()].min(regs.input_len);
                self.received
                    .extend_from_slice(&handler.input_buffer()[..take]);
                step += 1;
                handler.on_need_input(&mut regs, take);
                if regs.aborts > 0 {
                    return Err(EngineError::Aborted);
                }
            }

            // Mid-gray samples for every unit of the frame
            let layout = McuLayout::from_frame(&self.header);
            let unit_size = layout.sample_size();
            let mut left = layout.unit_count(self.header.width, self.header.height);
            while left > 0 {
                let n = (regs.output_len / unit_size).min(left);
                handler.output_buffer()[..n * unit_size].fill(128);
                handler.on_have_output(&mut regs, n * unit_size);
                if regs.aborts > 0 {
                    return Err(EngineError::Aborted);
                }
                left -= n;
            }
            Ok(())
        }

        fn start_encode(
            &mut self,
            _handler: &mut dyn EngineHandler,
            _input_len: usize,
            _output_len: usize,
            _timeout: Duration,
        ) -> Result<(), EngineError> {
            Err(EngineError::Unsupported("scripted engine only decodes"))
        }
    }

    // ===== Fixtures =====

    fn gradient_gray(width: u32, height: u32) -> Image {
        let data = (0..height)
            .flat_map(|y| (0..width).map(move |x| ((x * 3 + y * 2) % 256) as u8))
            .collect();
        Image::new(width, height, PixelFormat::Grayscale, data)
    }

    fn noisy_gray(width: u32, height: u32) -> Image {
        let data = (0..height)
            .flat_map(|y| (0..width).map(move |x| ((x * 31) ^ (y * 17) ^ (x * y)) as u8))
            .collect();
        Image::new(width, height, PixelFormat::Grayscale, data)
    }

    fn rgb565_blocks(width: u32, height: u32) -> Image {
        let mut rgb = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                let color = match ((x / 8) + (y / 8)) % 3 {
                    0 => [200, 40, 40],
                    1 => [40, 200, 40],
                    _ => [40, 40, 200],
                };
                rgb.extend_from_slice(&color);
            }
        }
        Image::rgb565_from_rgb888(width, height, &rgb)
    }

    fn gray_params() -> EncodeParams {
        EncodeParams::new(ColorSpace::Grayscale, ChromaSubsampling::S420, 90)
    }

    fn encode_to_vec(codec: &mut JpegCodec, image: &Image, params: &EncodeParams) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        codec.encode(image, &mut out, params).unwrap();
        out.into_inner()
    }

    fn mean_abs_diff(a: &[u8], b: &[u8]) -> f64 {
        let total: u64 = a
            .iter()
            .zip(b)
            .map(|(&x, &y)| (x as i64 - y as i64).unsigned_abs())
            .sum();
        total as f64 / a.len() as f64
    }

    // ===== End-to-end =====

    #[test]
    fn test_grayscale_64x64_round_trip() {
        let mut codec = JpegCodec::new();
        let source = gradient_gray(64, 64);
        let jpeg = encode_to_vec(&mut codec, &source, &gray_params());
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let stats = *codec.last_stats().unwrap();
        assert_eq!(stats.operation, Operation::Encoding);
        assert_eq!((stats.units, stats.unit_total), (64, 64));
        assert_eq!(stats.bytes_written, jpeg.len() as u64);
        // One need-input signal per unit taken, the last one answered with end of input
        assert_eq!(codec.engine().stats().need_input, 64);

        let mut decoded = Image::empty();
        codec.decode(&mut decoded, &mut Cursor::new(jpeg)).unwrap();
        assert_eq!(decoded.width, 64);
        assert_eq!(decoded.height, 64);
        assert_eq!(decoded.format, PixelFormat::Grayscale);
        assert_eq!(decoded.byte_size(), 4096);
        assert!(mean_abs_diff(&decoded.data, &source.data) < 4.0);

        let stats = *codec.last_stats().unwrap();
        assert_eq!(stats.operation, Operation::Decoding);
        assert_eq!(stats.units, stats.unit_total);
    }

    #[test]
    fn test_rgb565_420_32x32_uses_four_units() {
        let mut codec = JpegCodec::new();
        let source = rgb565_blocks(32, 32);
        let params = EncodeParams::new(ColorSpace::YCbCr, ChromaSubsampling::S420, 90);
        let jpeg = encode_to_vec(&mut codec, &source, &params);

        let stats = codec.last_stats().unwrap();
        assert_eq!(stats.unit_total, 4);
        assert_eq!(stats.units, 4);

        let mut decoded = Image::empty();
        codec.decode(&mut decoded, &mut Cursor::new(jpeg)).unwrap();
        assert_eq!(decoded.format, PixelFormat::Rgb565);
        assert_eq!(decoded.byte_size(), 32 * 32 * 2);

        let a = source.to_rgb_image().unwrap().into_raw();
        let b = decoded.to_rgb_image().unwrap().into_raw();
        assert!(mean_abs_diff(&a, &b) < 24.0);
    }

    #[test]
    fn test_all_layouts_round_trip() {
        let source = rgb565_blocks(32, 32);
        for (cs, sub) in [
            (ColorSpace::YCbCr, ChromaSubsampling::S444),
            (ColorSpace::YCbCr, ChromaSubsampling::S422),
            (ColorSpace::YCbCr, ChromaSubsampling::S420),
            (ColorSpace::Cmyk, ChromaSubsampling::S444),
            (ColorSpace::Grayscale, ChromaSubsampling::S444),
        ] {
            let mut codec = JpegCodec::new();
            let jpeg = encode_to_vec(&mut codec, &source, &EncodeParams::new(cs, sub, 85));

            let mut tracker = MarkerTracker::new();
            assert_eq!(tracker.feed(&jpeg).unwrap(), Some(jpeg.len()));
            let frame = *tracker.frame().unwrap();
            assert_eq!(frame.color_space, cs, "{cs:?} {sub:?}");
            assert_eq!(frame.subsampling, sub, "{cs:?} {sub:?}");

            let mut decoded = Image::empty();
            codec.decode(&mut decoded, &mut Cursor::new(jpeg)).unwrap();
            assert_eq!((decoded.width, decoded.height), (32, 32), "{cs:?} {sub:?}");
            if cs == ColorSpace::YCbCr {
                let a = source.to_rgb_image().unwrap().into_raw();
                let b = decoded.to_rgb_image().unwrap().into_raw();
                assert!(mean_abs_diff(&a, &b) < 24.0, "{sub:?}");
            }
        }
    }

    #[test]
    fn test_rgb888_source() {
        let mut codec = JpegCodec::new();
        let source = Image::new(16, 16, PixelFormat::Rgb888, vec![90; 16 * 16 * 3]);
        let params = EncodeParams::new(ColorSpace::YCbCr, ChromaSubsampling::S422, 90);
        let jpeg = encode_to_vec(&mut codec, &source, &params);

        let mut decoded = Image::empty();
        codec.decode(&mut decoded, &mut Cursor::new(jpeg)).unwrap();
        let [r, g, b] = decoded.rgb_at(5, 5);
        for c in [r, g, b] {
            assert!((c as i32 - 90).abs() <= 8, "{c}");
        }
    }

    #[test]
    fn test_decode_non_mcu_multiple_stream() {
        let pixels: Vec<u8> = (0..20 * 12 * 3).map(|i| (i % 256) as u8).collect();
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, 90)
            .write_image(&pixels, 20, 12, ExtendedColorType::Rgb8)
            .unwrap();

        let mut codec = JpegCodec::new();
        let mut decoded = Image::empty();
        codec.decode(&mut decoded, &mut Cursor::new(jpeg)).unwrap();
        assert_eq!((decoded.width, decoded.height), (20, 12));
        assert_eq!(decoded.byte_size(), 20 * 12 * 2);
    }

    // ===== Storage accounting =====

    #[test]
    fn test_decode_reads_each_byte_once() {
        let mut codec = JpegCodec::new();
        let jpeg = encode_to_vec(&mut codec, &noisy_gray(64, 64), &gray_params());

        let mut reader = CountingReader::new(jpeg.clone());
        let mut decoded = Image::empty();
        codec.decode(&mut decoded, &mut reader).unwrap();

        assert_eq!(reader.bytes_read, jpeg.len());
        assert_eq!(codec.last_stats().unwrap().rewinds, 0);
        assert_eq!(codec.engine().stats().bytes_consumed, jpeg.len() as u64);
    }

    #[test]
    fn test_partial_consumption_rewinds_storage() {
        let mut codec = JpegCodec::new();
        let source = noisy_gray(64, 64);
        let jpeg = encode_to_vec(&mut codec, &source, &gray_params());

        let mut expected = Image::empty();
        codec.decode(&mut expected, &mut Cursor::new(jpeg.clone())).unwrap();

        let mut fifo = JpegCodec::with_engine(
            EmulatedEngine::new().with_input_fifo(100),
            CodecConfig::default(),
        );
        let mut reader = CountingReader::new(jpeg.clone());
        let mut decoded = Image::empty();
        fifo.decode(&mut decoded, &mut reader).unwrap();

        assert_eq!(decoded, expected);
        // Every byte reached the engine exactly once despite re-reads
        assert_eq!(fifo.engine().stats().bytes_consumed, jpeg.len() as u64);
        let rewinds = fifo.last_stats().unwrap().rewinds;
        assert!(rewinds > 0);
        // The initial rewind to offset 0, then one seek per correction
        assert_eq!(reader.seeks, rewinds as usize + 1);
        assert!(reader.bytes_read > jpeg.len());
    }

    #[test]
    fn test_scripted_offset_correction() {
        let file: Vec<u8> = (0..3000).map(|i| (i % 253) as u8).collect();
        let header = FrameInfo::new(16, 16, ColorSpace::Grayscale, ChromaSubsampling::S444, 0);
        let engine = ScriptedEngine::new(header, vec![512, 37, 300, 511, 1]);
        let mut codec = JpegCodec::with_engine(engine, CodecConfig::default());

        let mut decoded = Image::empty();
        codec
            .decode(&mut decoded, &mut Cursor::new(file.clone()))
            .unwrap();

        assert_eq!(codec.engine().received, file);
        assert_eq!(decoded.byte_size(), 256);
        assert!(decoded.data.iter().all(|&p| p == 128));
        assert!(codec.last_stats().unwrap().rewinds > 0);
    }

    #[test]
    fn test_unallocatable_frame_aborts_decode() {
        let header = FrameInfo::new(16, 16, ColorSpace::Grayscale, ChromaSubsampling::S444, 0);
        let engine = ScriptedEngine::new(header, vec![512]);
        let mut codec = JpegCodec::with_engine(engine, CodecConfig::default());
        assert_eq!(codec.config().timeout_ms, DEFAULT_TIMEOUT_MS);
        codec.engine_mut().header =
            FrameInfo::new(u32::MAX, u32::MAX, ColorSpace::YCbCr, ChromaSubsampling::S420, 0);

        let mut decoded = gradient_gray(8, 8);
        let err = codec
            .decode(&mut decoded, &mut Cursor::new(vec![0u8; 600]))
            .unwrap_err();
        assert!(matches!(
            err,
            CodecError::OperationNotCompleted(AbortCause::OutOfMemory(_))
        ));
        assert_eq!(codec.engine().aborts, 1);
        assert!(decoded.is_empty());
        assert_eq!(codec.last_stats().unwrap().units, 0);
    }

    #[test]
    fn test_staging_buffers_bound_every_transfer() {
        for (w, h) in [(8, 8), (256, 192)] {
            let mut codec = JpegCodec::new();
            let source = noisy_gray(w, h);
            let jpeg = encode_to_vec(&mut codec, &source, &gray_params());
            let enc = codec.engine().stats();
            assert!(enc.largest_input <= SAMPLE_BUFFER_SIZE);
            assert!(enc.largest_output <= BITSTREAM_BUFFER_SIZE);

            let mut decoded = Image::empty();
            codec.decode(&mut decoded, &mut Cursor::new(jpeg)).unwrap();
            let dec = codec.engine().stats();
            assert!(dec.largest_input <= BITSTREAM_BUFFER_SIZE);
            assert!(dec.largest_output <= SAMPLE_BUFFER_SIZE);
            assert_eq!(decoded.byte_size(), (w * h) as usize);
        }
    }

    // ===== Validation =====

    #[test]
    fn test_wrong_size_touches_nothing() {
        let mut codec = JpegCodec::new();
        let source = Image::zeroed(9, 8, PixelFormat::Rgb565);
        let params = EncodeParams::new(ColorSpace::YCbCr, ChromaSubsampling::S420, 90);
        let mut sink = FailingWriter {
            fail_at: usize::MAX,
            writes: 0,
            data: Vec::new(),
        };

        let err = codec.encode(&source, &mut sink, &params).unwrap_err();
        assert!(matches!(
            err,
            CodecError::WrongSize {
                width: 9,
                height: 8,
                mcu_width: 16,
                mcu_height: 16
            }
        ));
        assert_eq!(sink.writes, 0);
        assert!(codec.last_stats().is_none());
        assert_eq!(codec.engine().stats(), EngineStats::default());
    }

    #[test]
    fn test_binary_source_is_unsupported() {
        let mut codec = JpegCodec::new();
        let source = Image::zeroed(8, 8, PixelFormat::Binary);
        let err = codec
            .encode(&source, &mut Vec::<u8>::new(), &gray_params())
            .unwrap_err();
        assert!(matches!(
            err,
            CodecError::UnsupportedFormat(PixelFormat::Binary)
        ));
    }

    // ===== Failures =====

    #[test]
    fn test_write_failure_aborts_once() {
        let mut codec = JpegCodec::new();
        let source = noisy_gray(64, 64);
        let mut sink = FailingWriter {
            fail_at: 2,
            writes: 0,
            data: Vec::new(),
        };

        let err = codec.encode(&source, &mut sink, &gray_params()).unwrap_err();
        assert!(matches!(
            err,
            CodecError::OperationNotCompleted(AbortCause::Write(_))
        ));
        let stats = codec.engine().stats();
        assert_eq!(stats.aborts, 1);
        assert_eq!(stats.have_output, 2);
        assert_eq!(stats.errors, 0);
        // The first block stays written
        assert_eq!(sink.data.len(), BITSTREAM_BUFFER_SIZE);
    }

    #[test]
    fn test_corrupt_stream_leaves_output_empty() {
        let mut codec = JpegCodec::new();
        let mut output = gradient_gray(8, 8);
        let mut storage = Cursor::new(b"definitely not a jpeg stream".to_vec());

        let err = codec.decode(&mut output, &mut storage).unwrap_err();
        assert!(matches!(
            err,
            CodecError::OperationNotCompleted(AbortCause::Engine(EngineError::CorruptStream(_)))
        ));
        assert!(output.is_empty());
        assert_eq!(codec.engine().stats().aborts, 1);
    }

    #[test]
    fn test_truncated_stream_frees_pixels() {
        let mut codec = JpegCodec::new();
        let jpeg = encode_to_vec(&mut codec, &noisy_gray(64, 64), &gray_params());
        let truncated = jpeg[..jpeg.len() - 200].to_vec();

        let mut output = Image::empty();
        let err = codec
            .decode(&mut output, &mut Cursor::new(truncated))
            .unwrap_err();
        assert!(matches!(err, CodecError::OperationNotCompleted(_)));
        assert!(output.is_empty());
        // Header was seen, so the buffer existed before the failure
        assert_eq!(codec.engine().stats().header_ready, 1);
    }

    #[test]
    fn test_zero_timeout() {
        let mut codec = JpegCodec::new();
        let jpeg = encode_to_vec(&mut codec, &gradient_gray(16, 16), &gray_params());

        codec.set_config(CodecConfig {
            timeout_ms: 0,
            ..Default::default()
        });
        let mut output = Image::empty();
        let err = codec
            .decode(&mut output, &mut Cursor::new(jpeg))
            .unwrap_err();
        assert!(matches!(
            err,
            CodecError::OperationNotCompleted(AbortCause::Engine(EngineError::Timeout))
        ));
    }

    #[test]
    fn test_seek_failure() {
        let mut codec = JpegCodec::new();
        let mut storage = BrokenReader {
            inner: Cursor::new(vec![0xFF, 0xD8]),
            ok_reads: 10,
            fail_seek: true,
        };
        let mut output = Image::empty();
        let err = codec.decode(&mut output, &mut storage).unwrap_err();
        assert!(matches!(err, CodecError::Seek(_)));
        assert!(codec.last_stats().is_none());
    }

    #[test]
    fn test_first_read_failure() {
        let mut codec = JpegCodec::new();
        let mut storage = BrokenReader {
            inner: Cursor::new(vec![0xFF, 0xD8]),
            ok_reads: 0,
            fail_seek: false,
        };
        let mut output = Image::empty();
        let err = codec.decode(&mut output, &mut storage).unwrap_err();
        assert!(matches!(err, CodecError::Read(_)));
    }

    #[test]
    fn test_read_failure_mid_stream() {
        let mut codec = JpegCodec::new();
        let jpeg = encode_to_vec(&mut codec, &noisy_gray(64, 64), &gray_params());
        assert!(jpeg.len() > 2 * BITSTREAM_BUFFER_SIZE);
        let mut storage = BrokenReader {
            inner: Cursor::new(jpeg),
            ok_reads: 1,
            fail_seek: false,
        };
        let mut output = Image::empty();
        let err = codec.decode(&mut output, &mut storage).unwrap_err();
        assert!(matches!(
            err,
            CodecError::OperationNotCompleted(AbortCause::Read(_))
        ));
        assert!(output.is_empty());
    }

    // ===== Path helpers =====

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("jpegpipe-{}-{}.jpg", std::process::id(), name))
    }

    #[test]
    fn test_save_and_read_file() {
        let path = temp_path("save-read");
        let mut codec = JpegCodec::new();
        codec.save_jpeg(&rgb565_blocks(32, 16), &path).unwrap();

        let image = codec.read_jpeg(&path).unwrap();
        assert_eq!((image.width, image.height), (32, 16));
        assert_eq!(image.format, PixelFormat::Rgb565);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_read_missing_file() {
        let mut codec = JpegCodec::new();
        let err = codec.read_jpeg(temp_path("does-not-exist")).unwrap_err();
        assert!(matches!(err, CodecError::Open(_)));
    }
}
