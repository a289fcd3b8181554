//! Byte sources an archive can be read from.
//!
//! Skipping unread entry content is the one operation where capabilities
//! differ: a file can seek forward, while a pipe (e.g. the output of a
//! decompressor) can only be drained by reading. [`TarSource`] abstracts
//! over that, with [`SeekSource`] and [`StreamSource`] as the two
//! realizations. Both land on exactly the same archive offset.

use std::io::{Read, Result, Seek, SeekFrom};

use crate::BLOCKSIZE;

/// A byte source a Tar archive is read from: sequential reads plus the
/// ability to advance the cursor without surfacing the bytes.
pub trait TarSource: Read {
    /// Advances the cursor by `offset` bytes. `offset` is never larger than
    /// the remaining padded content region of the current entry.
    fn skip(&mut self, offset: u64) -> Result<()>;
}

/// A [`TarSource`] over a plain [`Read`] stream. Skipping drains the stream:
/// one read of `offset % 512` bytes, then `offset / 512` full block reads.
#[derive(Debug)]
pub struct StreamSource<R> {
    inner: R,
}

impl<R: Read> StreamSource<R> {
    /// Wraps a non-seekable reader.
    pub const fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Returns the wrapped reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for StreamSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: Read> TarSource for StreamSource<R> {
    fn skip(&mut self, offset: u64) -> Result<()> {
        let mut buf = [0u8; BLOCKSIZE];
        let lead = (offset % BLOCKSIZE as u64) as usize;
        self.inner.read_exact(&mut buf[..lead])?;
        for _ in 0..offset / BLOCKSIZE as u64 {
            self.inner.read_exact(&mut buf)?;
        }
        log::debug!("skipped {offset} byte(s) by discard reads");
        Ok(())
    }
}

/// A [`TarSource`] over a random-access stream. Skipping is a relative seek.
#[derive(Debug)]
pub struct SeekSource<R> {
    inner: R,
}

impl<R: Read + Seek> SeekSource<R> {
    /// Wraps a seekable reader.
    pub const fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Returns the wrapped reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek> Read for SeekSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: Read + Seek> TarSource for SeekSource<R> {
    fn skip(&mut self, offset: u64) -> Result<()> {
        // Entry sizes come from a 12-digit octal field, so the cast cannot
        // overflow.
        self.inner.seek(SeekFrom::Current(offset as i64))?;
        log::debug!("skipped {offset} byte(s) by seeking");
        Ok(())
    }
}
