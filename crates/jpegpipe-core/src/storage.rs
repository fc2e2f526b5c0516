//! Block storage the codec streams compressed bytes through.
//!
//! Decode needs a seekable source because the engine may consume less of a
//! chunk than was read, and the session rewinds to the true position. Encode
//! only ever appends.
//!
//! Both traits are implemented for any `std::io` type, so files, cursors and
//! buffered wrappers all work unchanged.

use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};

/// Seekable block source.
pub trait StorageRead {
    /// Position the next read at `offset` bytes from the start.
    fn seek_to(&mut self, offset: u64) -> io::Result<()>;

    /// Read up to `buf.len()` bytes, returning the count read.
    ///
    /// A short count means the end of the stream was reached; failures are
    /// reported as errors, never as short reads.
    fn read_block(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Append-only block sink.
pub trait StorageWrite {
    /// Write all of `buf`, returning the count written.
    fn write_block(&mut self, buf: &[u8]) -> io::Result<usize>;
}

impl<T: Read + Seek> StorageRead for T {
    fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        self.seek(SeekFrom::Start(offset)).map(|_| ())
    }

    fn read_block(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

impl<T: Write> StorageWrite for T {
    fn write_block(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_all(buf)?;
        Ok(buf.len())
    }
}
