//! Decode entry point.

use tracing::{debug, warn};

use super::session::Session;
use super::types::{AbortCause, CodecError};
use super::JpegCodec;
use crate::color;
use crate::config::SAMPLE_BUFFER_SIZE;
use crate::engine::Engine;
use crate::raster::{Image, PixelFormat};
use crate::storage::StorageRead;

impl<E: Engine> JpegCodec<E> {
    /// Decode the JPEG stream in `storage` into `output`.
    ///
    /// `output` is reset to an empty image first and only receives the
    /// decoded frame on success. Grayscale streams decode to
    /// [`PixelFormat::Grayscale`], all others to [`PixelFormat::Rgb565`].
    ///
    /// # Errors
    ///
    /// * [`CodecError::Seek`] / [`CodecError::Read`] if the storage cannot be
    ///   rewound or its first chunk read.
    /// * [`CodecError::OperationNotCompleted`] if the engine fails, times out
    ///   or is aborted; the cause is attached.
    pub fn decode<S: StorageRead>(
        &mut self,
        output: &mut Image,
        storage: &mut S,
    ) -> Result<(), CodecError> {
        *output = Image::empty();
        storage.seek_to(0).map_err(CodecError::Seek)?;

        color::init_tables();
        self.engine
            .init()
            .map_err(|e| CodecError::OperationNotCompleted(e.into()))?;

        let mut session = Session::decoding(storage);
        let result = self.run_decode(&mut session);
        self.engine.deinit();
        self.last_stats = Some(session.stats());
        result?;

        let (index, total) = session.unit_progress();
        if index != total {
            warn!("Decode finished after {} of {} units", index, total);
        }

        let (info, pixels) = session.into_decoded().ok_or(
            CodecError::OperationNotCompleted(AbortCause::Protocol("no frame header")),
        )?;
        let format = PixelFormat::for_color_space(info.color_space);
        debug!(
            "Decoded {}x{} {:?} ({} bytes)",
            info.width,
            info.height,
            format,
            pixels.len()
        );
        *output = Image::new(info.width, info.height, format, pixels);
        Ok(())
    }

    fn run_decode(&mut self, session: &mut Session<'_>) -> Result<(), CodecError> {
        let first = session.read_first_chunk().map_err(CodecError::Read)?;
        self.engine
            .start_decode(session, first, SAMPLE_BUFFER_SIZE, self.config.timeout())
            .map_err(|e| CodecError::OperationNotCompleted(session.failure(e)))
    }
}
