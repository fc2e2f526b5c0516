//! Encode entry point.

use tracing::{debug, warn};

use super::session::Session;
use super::types::{CodecError, EncodeParams};
use super::JpegCodec;
use crate::color::{self, select_encode, ColorError, McuLayout};
use crate::config::{BITSTREAM_BUFFER_SIZE, QUALITY_MAX, QUALITY_MIN};
use crate::engine::Engine;
use crate::raster::{Image, PixelFormat};
use crate::storage::StorageWrite;
use crate::types::FrameInfo;

impl<E: Engine> JpegCodec<E> {
    /// Encode `source` as a JPEG stream appended to `storage`.
    ///
    /// The source must be grayscale or packed RGB, with dimensions that are
    /// whole multiples of the coding unit: 8x8, or 16 pixels wide for 4:2:2
    /// and 16x16 for 4:2:0. Grayscale and CMYK streams always use 4:4:4.
    ///
    /// All parameters are checked before the engine is touched or anything is
    /// written. Bytes already flushed to `storage` are left in place if the
    /// engine fails part way.
    ///
    /// # Errors
    ///
    /// * [`CodecError::InvalidParameter`] for an empty source, a pixel buffer
    ///   that does not match the dimensions, or a quality outside 1-100.
    /// * [`CodecError::UnsupportedFormat`] for binary sources.
    /// * [`CodecError::WrongSize`] if the dimensions are not unit multiples.
    /// * [`CodecError::OperationNotCompleted`] if the engine fails, times out
    ///   or a write fails; the cause is attached.
    pub fn encode<W: StorageWrite>(
        &mut self,
        source: &Image,
        storage: &mut W,
        params: &EncodeParams,
    ) -> Result<(), CodecError> {
        let info = validate(source, params)?;
        let selection = select_encode(&info, source.format).map_err(|e| match e {
            ColorError::UnsupportedFormat(format) => CodecError::UnsupportedFormat(format),
            ColorError::EmptyImage => CodecError::InvalidParameter("source image has no pixels"),
        })?;
        debug!(
            "Encoding {}x{} {:?} as {:?} {:?} q{}: {} units",
            info.width,
            info.height,
            source.format,
            info.color_space,
            info.subsampling,
            info.quality,
            selection.unit_total
        );

        color::init_tables();
        self.engine
            .init()
            .map_err(|e| CodecError::OperationNotCompleted(e.into()))?;

        let mut session = Session::encoding(storage, &source.data, info, selection);
        let result = self.run_encode(&mut session, &info);
        self.engine.deinit();
        self.last_stats = Some(session.stats());
        result?;

        let (index, total) = session.unit_progress();
        if index != total {
            warn!("Encode finished after {} of {} units", index, total);
        }
        Ok(())
    }

    fn run_encode(
        &mut self,
        session: &mut Session<'_>,
        info: &FrameInfo,
    ) -> Result<(), CodecError> {
        self.engine
            .configure(info)
            .map_err(|e| CodecError::OperationNotCompleted(e.into()))?;
        let first = session
            .prime_first_unit()
            .map_err(CodecError::OperationNotCompleted)?;
        self.engine
            .start_encode(session, first, BITSTREAM_BUFFER_SIZE, self.config.timeout())
            .map_err(|e| CodecError::OperationNotCompleted(session.failure(e)))
    }
}

/// Check the source and parameters, returning the frame to encode.
fn validate(source: &Image, params: &EncodeParams) -> Result<FrameInfo, CodecError> {
    if source.is_empty() {
        return Err(CodecError::InvalidParameter("source image has no pixels"));
    }
    if source.data.len() != source.format.buffer_size(source.width, source.height) {
        return Err(CodecError::InvalidParameter(
            "pixel buffer size does not match dimensions",
        ));
    }
    if source.format == PixelFormat::Binary {
        return Err(CodecError::UnsupportedFormat(source.format));
    }

    let mut info = FrameInfo::new(
        source.width,
        source.height,
        params.color_space,
        params.subsampling,
        params.quality,
    );
    info.subsampling = info.effective_subsampling();

    let layout = McuLayout::from_frame(&info);
    if !layout.fits(info.width, info.height) {
        return Err(CodecError::WrongSize {
            width: info.width,
            height: info.height,
            mcu_width: layout.width(),
            mcu_height: layout.height(),
        });
    }
    if !(QUALITY_MIN..=QUALITY_MAX).contains(&params.quality) {
        return Err(CodecError::InvalidParameter("quality must be within 1-100"));
    }
    Ok(info)
}
