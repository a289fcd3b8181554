/*
MIT License

Copyright (c) 2024 The tar-stream authors

Permission is hereby granted, free of charge, to any person obtaining a copy
of this software and associated documentation files (the "Software"), to deal
in the Software without restriction, including without limitation the rights
to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
copies of the Software, and to permit persons to whom the Software is
furnished to do so, subject to the following conditions:

The above copyright notice and this permission notice shall be included in all
copies or substantial portions of the Software.

THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
SOFTWARE.
*/
//! Module for [`TarArchive`] and [`TarEntry`].

use std::fmt::{Debug, Formatter};
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use crate::{
    SeekSource, StreamSource, TarError, TarHeader, TarSource, TextEncoding, Utf8, BLOCKSIZE,
};

/// Rounds an entry's content length up to the next block boundary.
const fn padded_end(size: u64) -> u64 {
    const BLOCK: u64 = BLOCKSIZE as u64;
    if size % BLOCK == 0 {
        size
    } else {
        size + (BLOCK - size % BLOCK)
    }
}

/// A Tar archive read lazily from a byte source.
///
/// The archive exclusively owns the source and its cursor. Entries are
/// enumerated with [`Self::next_entry`]; enumeration and content reading are
/// strictly interleaved — each yielded [`TarEntry`] mutably borrows the
/// archive, so the borrow checker rules out touching a stale entry after
/// moving on. The sequence is finite and not restartable; re-enumerating
/// requires a fresh archive over a fresh source.
pub struct TarArchive<S> {
    source: S,
    encoding: Box<dyn TextEncoding>,
    /// Content size of the entry yielded last; `None` when the cursor is at
    /// a header boundary.
    current: Option<u64>,
    /// Content bytes of the current entry the caller has read so far.
    consumed: u64,
    done: bool,
}

impl<R: Read> TarArchive<StreamSource<R>> {
    /// Reads an archive from a non-seekable byte stream, e.g. a pipe or the
    /// output of a decompressor. Unread entry content is skipped with
    /// discard reads.
    pub fn new(reader: R) -> Self {
        Self::with_source(StreamSource::new(reader))
    }
}

impl<R: Read + Seek> TarArchive<SeekSource<R>> {
    /// Reads an archive from a random-access byte stream. Unread entry
    /// content is skipped by seeking.
    pub fn from_seekable(reader: R) -> Self {
        Self::with_source(SeekSource::new(reader))
    }
}

impl TarArchive<SeekSource<File>> {
    /// Opens a tar file. The file must hold raw tar bytes; decompressing
    /// e.g. a `.tar.gz` is up to the caller, who can feed the decompressor's
    /// output to [`TarArchive::new`].
    ///
    /// # Errors
    /// Any error from opening the file, a missing file included.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, TarError> {
        Ok(Self::from_seekable(File::open(path)?))
    }
}

impl<S: TarSource> TarArchive<S> {
    /// Reads an archive from an arbitrary [`TarSource`].
    pub fn with_source(source: S) -> Self {
        Self {
            source,
            encoding: Box::new(Utf8),
            current: None,
            consumed: 0,
            done: false,
        }
    }

    /// Replaces the text encoding used to decode name, link, uname and
    /// gname fields. Defaults to [`Utf8`].
    pub fn set_encoding<E: TextEncoding + 'static>(&mut self, encoding: E) {
        self.encoding = Box::new(encoding);
    }

    /// Returns the underlying source.
    pub fn into_source(self) -> S {
        self.source
    }

    /// Decodes and yields the next entry, or `Ok(None)` at the end of the
    /// archive.
    ///
    /// Whatever content of the previous entry the caller did not read is
    /// skipped first, along with the pad bytes up to the next block
    /// boundary. After a decode error the enumeration is over; subsequent
    /// calls return `Ok(None)`.
    ///
    /// # Errors
    /// See [`TarHeader::decode`]; additionally any I/O error raised while
    /// skipping.
    pub fn next_entry(&mut self) -> Result<Option<TarEntry<'_, S>>, TarError> {
        if self.done {
            return Ok(None);
        }
        self.finish_current()?;
        match TarHeader::decode(&mut self.source, self.encoding.as_ref()) {
            Ok(Some(header)) => {
                log::debug!("entry: {header}");
                self.current = Some(header.size());
                self.consumed = 0;
                Ok(Some(TarEntry {
                    header,
                    archive: self,
                }))
            }
            Ok(None) => {
                self.done = true;
                Ok(None)
            }
            Err(e) => {
                self.done = true;
                Err(e)
            }
        }
    }

    /// Advances the source past the unread remainder of the current entry's
    /// content region, pad bytes included.
    fn finish_current(&mut self) -> Result<(), TarError> {
        if let Some(size) = self.current.take() {
            if size == 0 {
                return Ok(());
            }
            let remaining = padded_end(size) - self.consumed;
            if remaining > 0 {
                self.source.skip(remaining)?;
            }
        }
        Ok(())
    }
}

impl<S: Debug> Debug for TarArchive<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TarArchive")
            .field("source", &self.source)
            .field("encoding", &"<dyn TextEncoding>")
            .field("current", &self.current)
            .field("consumed", &self.consumed)
            .field("done", &self.done)
            .finish()
    }
}

/// One archive entry: its decoded header plus a read-only view over its
/// content.
///
/// The view is bounded to the header's `size`: reads return at most the
/// bytes left before that bound and `Ok(0)` once it is reached. It is a
/// forward cursor only — writing and seeking are not implemented, so
/// misuse is a compile error rather than a runtime one. Dropping the entry
/// with content unread is fine; the archive skips the rest before decoding
/// the next header.
pub struct TarEntry<'a, S> {
    header: TarHeader,
    archive: &'a mut TarArchive<S>,
}

impl<S: TarSource> TarEntry<'_, S> {
    /// The entry's decoded header.
    #[must_use]
    pub const fn header(&self) -> &TarHeader {
        &self.header
    }

    /// Consumes the entry, returning the owned header. The unread content
    /// is skipped when the archive moves on, exactly as if the entry had
    /// been dropped.
    #[must_use]
    pub fn into_header(self) -> TarHeader {
        self.header
    }

    /// Content bytes read so far; starts at 0, never exceeds the header's
    /// `size`.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.archive.consumed
    }
}

impl<S: TarSource> Read for TarEntry<'_, S> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let remaining = self.header.size() - self.archive.consumed;
        if remaining == 0 {
            return Ok(0);
        }
        let want = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
        let read = self.archive.source.read(&mut buf[..want])?;
        self.archive.consumed += read as u64;
        Ok(read)
    }
}

impl<S> Debug for TarEntry<'_, S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TarEntry")
            .field("header", &self.header)
            .field("position", &self.archive.consumed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read};

    use crate::header::test_support::{
        content_blocks, end_marker, gnu_extension, header_block, symlink_block,
    };
    use crate::{EntryType, TarArchive, TarError, BLOCKSIZE};

    /// Wraps a cursor so only `Read` is visible, and serves at most
    /// `chunk` bytes per call to exercise short reads.
    struct Pipe {
        inner: Cursor<Vec<u8>>,
        chunk: usize,
    }

    impl Read for Pipe {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let end = buf.len().min(self.chunk);
            self.inner.read(&mut buf[..end])
        }
    }

    /// A three-entry archive: a directory, a 513-byte file and a 12-byte
    /// file, terminated by two zero blocks.
    fn sample_archive() -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&header_block("testdir/", b'5', 0, 0o755));
        bytes.extend_from_slice(&header_block("testdir/big.txt", b'0', 513, 0o644));
        bytes.extend_from_slice(&content_blocks(&big_content()));
        bytes.extend_from_slice(&header_block("testdir/hello.txt", b'0', 12, 0o644));
        bytes.extend_from_slice(&content_blocks(b"Hello World\n"));
        bytes.extend_from_slice(&end_marker());
        bytes
    }

    fn big_content() -> Vec<u8> {
        b"0123456789".iter().copied().cycle().take(513).collect()
    }

    #[test]
    fn test_enumerate_without_reading_content() {
        let _ = env_logger::builder().is_test(true).try_init();

        let mut archive = TarArchive::new(Cursor::new(sample_archive()));
        let mut names = Vec::new();
        while let Some(entry) = archive.next_entry().unwrap() {
            names.push(entry.header().name().to_owned());
        }
        assert_eq!(names, ["testdir/", "testdir/big.txt", "testdir/hello.txt"]);
        // terminated; stays terminated
        assert!(archive.next_entry().unwrap().is_none());
    }

    #[test]
    fn test_entry_contents() {
        let mut archive = TarArchive::new(Cursor::new(sample_archive()));

        let entry = archive.next_entry().unwrap().unwrap();
        assert!(entry.header().entry_type().is_directory());
        assert_eq!(entry.header().size(), 0);

        let mut entry = archive.next_entry().unwrap().unwrap();
        let mut content = Vec::new();
        entry.read_to_end(&mut content).unwrap();
        assert_eq!(content, big_content());
        assert_eq!(entry.position(), 513);

        let mut entry = archive.next_entry().unwrap().unwrap();
        let mut content = String::new();
        entry.read_to_string(&mut content).unwrap();
        assert_eq!(content, "Hello World\n");

        assert!(archive.next_entry().unwrap().is_none());
    }

    #[test]
    fn test_read_is_bounded_to_entry_size() {
        let mut archive = TarArchive::new(Cursor::new(sample_archive()));
        archive.next_entry().unwrap().unwrap(); // directory
        let mut entry = archive.next_entry().unwrap().unwrap();

        // a buffer far larger than the entry still only yields `size` bytes
        let mut buf = vec![0u8; 4096];
        let mut collected = Vec::new();
        loop {
            let n = entry.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            collected.extend_from_slice(&buf[..n]);
        }
        assert_eq!(collected.len(), 513);
        // at the bound every further read keeps returning 0
        assert_eq!(entry.read(&mut buf).unwrap(), 0);
        assert_eq!(entry.read(&mut buf).unwrap(), 0);
        assert_eq!(entry.position(), 513);
    }

    #[test]
    fn test_chunked_reads_equal_one_shot_read() {
        let one_shot = {
            let mut archive = TarArchive::new(Cursor::new(sample_archive()));
            archive.next_entry().unwrap().unwrap();
            let mut entry = archive.next_entry().unwrap().unwrap();
            let mut content = Vec::new();
            entry.read_to_end(&mut content).unwrap();
            content
        };

        let mut archive = TarArchive::new(Cursor::new(sample_archive()));
        archive.next_entry().unwrap().unwrap();
        let mut entry = archive.next_entry().unwrap().unwrap();
        let mut chunked = Vec::new();
        let mut buf = [0u8; 7];
        loop {
            let n = entry.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            chunked.extend_from_slice(&buf[..n]);
        }
        assert_eq!(chunked, one_shot);
    }

    #[test]
    fn test_partially_read_entry_is_skipped() {
        let mut archive = TarArchive::new(Cursor::new(sample_archive()));
        archive.next_entry().unwrap().unwrap(); // directory

        let mut entry = archive.next_entry().unwrap().unwrap();
        let mut buf = [0u8; 100];
        entry.read_exact(&mut buf).unwrap();
        assert_eq!(entry.position(), 100);

        // the remaining 413 content bytes plus padding are skipped
        let entry = archive.next_entry().unwrap().unwrap();
        assert_eq!(entry.header().name(), "testdir/hello.txt");
    }

    #[test]
    fn test_seekable_and_streamed_sources_agree() {
        let mut seekable = TarArchive::from_seekable(Cursor::new(sample_archive()));
        let mut seekable_entries = Vec::new();
        while let Some(mut entry) = seekable.next_entry().unwrap() {
            let name = entry.header().name().to_owned();
            let mut content = Vec::new();
            entry.read_to_end(&mut content).unwrap();
            seekable_entries.push((name, content));
        }

        let mut streamed = TarArchive::new(Pipe {
            inner: Cursor::new(sample_archive()),
            chunk: 17,
        });
        let mut streamed_entries = Vec::new();
        while let Some(mut entry) = streamed.next_entry().unwrap() {
            let name = entry.header().name().to_owned();
            let mut content = Vec::new();
            entry.read_to_end(&mut content).unwrap();
            streamed_entries.push((name, content));
        }

        assert_eq!(seekable_entries.len(), 3);
        assert_eq!(seekable_entries, streamed_entries);
    }

    #[test]
    fn test_next_header_lands_on_block_boundary() {
        // entry content of 513 bytes occupies 2 blocks; the next header
        // must be decoded from offset header_end + 1024
        let mut archive = TarArchive::from_seekable(Cursor::new(sample_archive()));
        archive.next_entry().unwrap().unwrap(); // testdir/ at [0, 512)
        archive.next_entry().unwrap().unwrap(); // big.txt header at [512, 1024)
        let entry = archive.next_entry().unwrap().unwrap();
        assert_eq!(entry.header().name(), "testdir/hello.txt");
        let source = archive.into_source().into_inner();
        // hello.txt header spans [2048, 2560): 1024 + padded_end(513)
        assert_eq!(source.position(), 2560);
        assert_eq!(source.position() % BLOCKSIZE as u64, 0);
    }

    #[test]
    fn test_unknown_type_terminates_enumeration() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&header_block("ok.txt", b'0', 0, 0o644));
        bytes.extend_from_slice(&header_block("bad.txt", 0x7f, 0, 0o644));
        bytes.extend_from_slice(&end_marker());

        let mut archive = TarArchive::new(Cursor::new(bytes));
        assert!(archive.next_entry().unwrap().is_some());
        let err = archive.next_entry().unwrap_err();
        assert!(matches!(err, TarError::UnknownType(0x7f)));
        // fatal: no retry, no further entries
        assert!(archive.next_entry().unwrap().is_none());
    }

    #[test]
    fn test_early_end_marker_wins_over_later_entries() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&header_block("first.txt", b'0', 0, 0o644));
        bytes.extend_from_slice(&[0u8; BLOCKSIZE]);
        bytes.extend_from_slice(&header_block("unreachable.txt", b'0', 0, 0o644));

        let mut archive = TarArchive::new(Cursor::new(bytes));
        assert_eq!(
            archive.next_entry().unwrap().unwrap().header().name(),
            "first.txt"
        );
        assert!(archive.next_entry().unwrap().is_none());
        assert!(archive.next_entry().unwrap().is_none());
    }

    #[test]
    fn test_gnu_long_entries_in_sequence() {
        let long_name = format!("dir/{}.txt", "n".repeat(150));
        let long_target = format!("../{}", "t".repeat(150));

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&gnu_extension(b'L', &long_name));
        bytes.extend_from_slice(&header_block("short", b'0', 5, 0o644));
        bytes.extend_from_slice(&content_blocks(b"12345"));
        bytes.extend_from_slice(&gnu_extension(b'K', &long_target));
        bytes.extend_from_slice(&gnu_extension(b'L', &long_name));
        bytes.extend_from_slice(&symlink_block("short", "short_target"));
        bytes.extend_from_slice(&end_marker());

        let mut archive = TarArchive::new(Cursor::new(bytes));

        let mut entry = archive.next_entry().unwrap().unwrap();
        assert_eq!(entry.header().name(), long_name);
        assert!(entry.header().gnu_long_name());
        let mut content = String::new();
        entry.read_to_string(&mut content).unwrap();
        assert_eq!(content, "12345");

        let entry = archive.next_entry().unwrap().unwrap();
        assert_eq!(entry.header().entry_type(), EntryType::SymbolicLink);
        assert_eq!(entry.header().name(), long_name);
        assert_eq!(entry.header().link_name(), long_target);
        assert!(entry.header().gnu_long_name());
        assert!(entry.header().gnu_long_link());

        assert!(archive.next_entry().unwrap().is_none());
    }

    #[test]
    fn test_truncated_content_region() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&header_block("cut.txt", b'0', 513, 0o644));
        bytes.extend_from_slice(&[b'x'; 100]); // instead of 1024 content bytes

        let mut archive = TarArchive::new(Cursor::new(bytes));
        archive.next_entry().unwrap().unwrap();
        // skipping past the missing content fails with an I/O error
        assert!(matches!(
            archive.next_entry().unwrap_err(),
            TarError::Io(_)
        ));
    }

    #[test]
    fn test_open_missing_file() {
        let err = TarArchive::open("/nonexistent/archive.tar").unwrap_err();
        assert!(matches!(err, TarError::Io(_)));
    }
}
