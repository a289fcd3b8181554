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
//! Library to read POSIX/GNU Tar archives from byte streams.
//!
//! Unlike readers that require the whole archive in memory or a seekable
//! file, this crate consumes any [`std::io::Read`] source — a plain file, a
//! pipe, or the output of a decompressor. When the source additionally
//! implements [`std::io::Seek`], skipping over unread entry content uses a
//! relative seek instead of discard reads (see [`TarSource`]).
//!
//! Entries are enumerated lazily with [`TarArchive::next_entry`]. Each
//! [`TarEntry`] exposes the decoded [`TarHeader`] and implements `Read`
//! bounded to the entry's content size. Whatever content the caller does not
//! read is skipped automatically before the next entry is decoded.
//!
//! The GNU Longname (`L`) and Longlink (`K`) extension blocks are resolved
//! transparently; the name/link they carry is spliced into the following
//! header. PAX extended headers and the ustar `prefix` field are not
//! interpreted. The header checksum field is decoded but never validated;
//! verification is deliberately out of scope.
//!
//! ```no_run
//! use std::io::Read;
//!
//! let mut archive = tar_stream::TarArchive::open("archive.tar")?;
//! while let Some(mut entry) = archive.next_entry()? {
//!     println!("{}", entry.header());
//!     let mut content = Vec::new();
//!     entry.read_to_end(&mut content)?;
//! }
//! # Ok::<(), tar_stream::TarError>(())
//! ```

#![deny(rustdoc::all)]
#![allow(rustdoc::missing_doc_code_examples)]
#![deny(clippy::all)]
#![deny(missing_debug_implementations)]

use std::num::ParseIntError;

use thiserror::Error;

/// Each archive region (header or content) is made of blocks of 512 bytes.
const BLOCKSIZE: usize = 512;

mod archive;
mod header;
mod source;
mod tar_format_types;

pub use archive::*;
pub use header::*;
pub use source::*;
pub use tar_format_types::*;

/// Errors produced while reading an archive.
///
/// Every parse error is fatal for the enumeration: a Tar stream offers no way
/// to re-synchronize on a block boundary once a header is misread, so there
/// is no skip-and-continue. End-of-archive is *not* an error; it is signalled
/// by [`TarArchive::next_entry`] returning `Ok(None)`.
#[derive(Debug, Error)]
pub enum TarError {
    /// The underlying byte source failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// The source ended in the middle of a 512-byte block.
    #[error("truncated archive: got {got} bytes of a {expected} byte block")]
    Truncated {
        /// Bytes actually available.
        got: usize,
        /// Bytes the block required.
        expected: usize,
    },
    /// The typeflag byte is not in the recognized set.
    #[error("unknown tar entry type: {0:#04x}")]
    UnknownType(u8),
    /// A numeric header field does not hold octal ASCII digits.
    #[error("invalid numeric header field")]
    InvalidNumber(#[from] ParseIntError),
    /// The mtime field holds a value outside the representable range.
    #[error("mtime {0} is out of range")]
    InvalidTimestamp(i64),
}
