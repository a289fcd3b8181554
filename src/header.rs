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
//! TAR header definition taken from
//! <https://www.gnu.org/software/tar/manual/html_node/Standard.html>.
//! A Tar archive is a sequence of 512-byte blocks: each entry starts with a
//! header block describing name, size and kind, followed by the content in
//! zero-padded blocks.
//!
//! This module holds the raw [`PosixHeader`] block layout, the decoded
//! [`TarHeader`], and the decoder that resolves the GNU Longname/Longlink
//! extension blocks preceding a real header. Entries whose name or link
//! target exceeds the 100-byte fixed fields are stored by GNU tar as a
//! pseudo-entry of type `L`/`K` whose content region carries the full
//! string; the decoder splices that string into the following header.

use std::fmt::{Debug, Display, Formatter};
use std::io::{ErrorKind, Read};

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::tar_format_types::decode_until_nul;
use crate::{TarError, TarFormatOctal, TarFormatString, TextEncoding, BLOCKSIZE};

/// Header block of the TAR format as specified by POSIX (POSIX 1003.1-1990).
///
/// This is the raw wire layout: every field is a fixed-width byte array and
/// the whole struct is exactly one 512-byte block. It is also compatible with
/// the "Ustar" and "GNU" layouts; the fields those variants add on top of the
/// common prefix (`dev_major`, `dev_minor`, `prefix`) are kept so the struct
/// covers the full block, but they are never decoded into a [`TarHeader`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(C, packed)]
pub struct PosixHeader {
    pub name: TarFormatString<100>,
    pub mode: TarFormatOctal<8>,
    pub uid: TarFormatOctal<8>,
    pub gid: TarFormatOctal<8>,
    // confusing; size is stored as ASCII string
    pub size: TarFormatOctal<12>,
    pub mtime: TarFormatOctal<12>,
    pub cksum: TarFormatOctal<8>,
    pub typeflag: u8,
    /// Link target. There is always a null byte, therefore the max len is 99.
    pub linkname: TarFormatString<100>,
    pub magic: TarFormatString<6>,
    pub version: TarFormatString<2>,
    /// Username. There is always a null byte, therefore the max len is N-1.
    pub uname: TarFormatString<32>,
    /// Groupname. There is always a null byte, therefore the max len is N-1.
    pub gname: TarFormatString<32>,
    pub dev_major: TarFormatOctal<8>,
    pub dev_minor: TarFormatOctal<8>,
    pub prefix: TarFormatString<155>,
    // padding => to BLOCKSIZE bytes
    pub _pad: [u8; 12],
}

impl PosixHeader {
    /// Reinterprets a 512-byte block as a raw header.
    #[must_use]
    pub fn from_block(block: &[u8; BLOCKSIZE]) -> &Self {
        // SAFETY: PosixHeader is repr(C, packed), exactly BLOCKSIZE bytes
        // long, and all of its fields are byte arrays valid for any bit
        // pattern.
        unsafe { &*block.as_ptr().cast::<Self>() }
    }
}

/// Filesystem kind of an archive entry.
///
/// The GNU Longname/Longlink pseudo-entries are decoder-internal states and
/// never surface here; whether an entry's name or link target came from such
/// an extension block is reported by [`TarHeader::gnu_long_name`] and
/// [`TarHeader::gnu_long_link`]. End-of-archive is likewise not a kind but a
/// termination signal of the enumeration.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum EntryType {
    /// A regular file. Typeflag `'0'`, or NUL in pre-POSIX archives.
    Regular,
    /// A file hard-linked to a previously archived one; the target is in
    /// the link name. Typeflag `'1'`.
    HardLink,
    /// A symbolic link; the target is in the link name. Typeflag `'2'`.
    SymbolicLink,
    /// A character special file. Typeflag `'3'`.
    CharDevice,
    /// A block special file. Typeflag `'4'`.
    BlockDevice,
    /// A directory. The name usually ends with a slash. Typeflag `'5'`.
    Directory,
    /// A FIFO special file; only its existence is archived. Typeflag `'6'`.
    Fifo,
}

impl EntryType {
    /// Whether the entry is a regular file.
    #[must_use]
    pub fn is_regular_file(self) -> bool {
        self == Self::Regular
    }

    /// Whether the entry is a directory.
    #[must_use]
    pub fn is_directory(self) -> bool {
        self == Self::Directory
    }

    /// Whether the entry is a symbolic link.
    #[must_use]
    pub fn is_symbolic_link(self) -> bool {
        self == Self::SymbolicLink
    }
}

/// What a single header block turned out to be. Longname/Longlink blocks are
/// carried through the decode loop as pending overrides and never leave it.
enum BlockKind {
    Entry(EntryType),
    GnuLongName,
    GnuLongLink,
}

fn classify(typeflag: u8) -> Result<BlockKind, TarError> {
    let kind = match typeflag {
        0 | b'0' => BlockKind::Entry(EntryType::Regular),
        b'1' => BlockKind::Entry(EntryType::HardLink),
        b'2' => BlockKind::Entry(EntryType::SymbolicLink),
        b'3' => BlockKind::Entry(EntryType::CharDevice),
        b'4' => BlockKind::Entry(EntryType::BlockDevice),
        b'5' => BlockKind::Entry(EntryType::Directory),
        b'6' => BlockKind::Entry(EntryType::Fifo),
        b'L' => BlockKind::GnuLongName,
        b'K' => BlockKind::GnuLongLink,
        other => return Err(TarError::UnknownType(other)),
    };
    Ok(kind)
}

bitflags::bitflags! {
    /// UNIX file permissions in octal format.
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ModeFlags: u32 {
        /// Set UID on execution.
        const SetUID = 0o4000;
        /// Set GID on execution.
        const SetGID = 0o2000;
        /// Sticky bit.
        const Sticky = 0o1000;
        /// Owner read.
        const OwnerRead = 0o400;
        /// Owner write.
        const OwnerWrite = 0o200;
        /// Owner execute.
        const OwnerExec = 0o100;
        /// Group read.
        const GroupRead = 0o040;
        /// Group write.
        const GroupWrite = 0o020;
        /// Group execute.
        const GroupExec = 0o010;
        /// Others read.
        const OthersRead = 0o004;
        /// Others write.
        const OthersWrite = 0o002;
        /// Others execute.
        const OthersExec = 0o001;
    }
}

/// Decoded UNIX permission value: the nine rwx bits plus setuid, setgid and
/// sticky.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Mode(u32);

impl Mode {
    /// Raw permission bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Typed view of the permission bits. Bits outside the known set are
    /// dropped.
    #[must_use]
    pub fn to_flags(self) -> ModeFlags {
        ModeFlags::from_bits_truncate(self.0)
    }

    /// Four-digit octal rendering, e.g. `"0755"`.
    #[must_use]
    pub fn octal(self) -> String {
        format!("{:04o}", self.0)
    }

    /// Nine-character `ls -l` style rendering, e.g. `"rwxr-xr-x"`.
    ///
    /// The owner/group execute slot shows `s`/`S` when setuid/setgid is set
    /// and the others execute slot shows `t`/`T` when the sticky bit is set,
    /// lowercase when the execute bit underneath is also set.
    #[must_use]
    pub fn symbolic(self) -> String {
        let f = self.to_flags();
        let rwx = |read: ModeFlags, write: ModeFlags, exec: ModeFlags, special: ModeFlags, set: char, unset: char| {
            [
                if f.contains(read) { 'r' } else { '-' },
                if f.contains(write) { 'w' } else { '-' },
                match (f.contains(special), f.contains(exec)) {
                    (false, false) => '-',
                    (false, true) => 'x',
                    (true, true) => set,
                    (true, false) => unset,
                },
            ]
        };
        let mut out = String::with_capacity(9);
        out.extend(rwx(
            ModeFlags::OwnerRead,
            ModeFlags::OwnerWrite,
            ModeFlags::OwnerExec,
            ModeFlags::SetUID,
            's',
            'S',
        ));
        out.extend(rwx(
            ModeFlags::GroupRead,
            ModeFlags::GroupWrite,
            ModeFlags::GroupExec,
            ModeFlags::SetGID,
            's',
            'S',
        ));
        out.extend(rwx(
            ModeFlags::OthersRead,
            ModeFlags::OthersWrite,
            ModeFlags::OthersExec,
            ModeFlags::Sticky,
            't',
            'T',
        ));
        out
    }
}

impl Debug for Mode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Mode({})", self.octal())
    }
}

impl Display for Mode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.symbolic())
    }
}

/// Fully decoded metadata of one archive entry, after GNU extension
/// splicing.
///
/// The checksum field is decoded but deliberately never validated against a
/// sum computed over the block. The `dev_major`/`dev_minor`/`prefix` fields
/// of the raw layout are not decoded; long paths via the ustar `prefix`
/// field are unsupported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TarHeader {
    name: String,
    mode: Mode,
    uid: u64,
    gid: u64,
    size: u64,
    mtime: OffsetDateTime,
    checksum: u64,
    link_name: String,
    magic: String,
    version: String,
    uname: String,
    gname: String,
    entry_type: EntryType,
    gnu_long_name: bool,
    gnu_long_link: bool,
    header_block_count: usize,
}

impl TarHeader {
    /// Decodes the next entry header from `source`.
    ///
    /// Consumes one 512-byte block for a standard header, plus — for each
    /// GNU Longname/Longlink pseudo-entry preceding it — one header block
    /// and `ceil(len/512)` payload blocks. A chain of Longlink followed by
    /// Longname followed by a standard header yields a single header
    /// carrying both overrides.
    ///
    /// Returns `Ok(None)` at the end of the archive: a block whose first
    /// byte is zero (the marker's second zero block is not consumed), or a
    /// source that is cleanly exhausted at a block boundary.
    ///
    /// # Errors
    ///
    /// [`TarError::Truncated`] when the source ends inside a block,
    /// [`TarError::UnknownType`] for an unrecognized typeflag, and
    /// [`TarError::InvalidNumber`]/[`TarError::InvalidTimestamp`] for
    /// malformed numeric fields. All of them are unrecoverable for the
    /// enumeration.
    pub fn decode<R: Read + ?Sized>(
        source: &mut R,
        encoding: &dyn TextEncoding,
    ) -> Result<Option<Self>, TarError> {
        let mut blocks = 0usize;
        let mut long_name: Option<String> = None;
        let mut long_link: Option<String> = None;

        loop {
            let mut block = [0u8; BLOCKSIZE];
            let eof_legal = blocks == 0 && long_name.is_none() && long_link.is_none();
            if !read_block(source, &mut block, eof_legal)? {
                log::warn!("tar stream ended without an end-of-archive marker");
                return Ok(None);
            }
            blocks += 1;

            // End-of-archive marker; only the first of its two zero blocks
            // is inspected.
            if block[0] == 0 {
                if long_name.is_some() || long_link.is_some() {
                    log::warn!("end-of-archive marker directly after GNU extension blocks");
                } else {
                    log::debug!("end-of-archive marker found after {blocks} block(s)");
                }
                return Ok(None);
            }

            let hdr = PosixHeader::from_block(&block);
            let size: u64 = hdr.size.as_number()?;

            match classify(hdr.typeflag)? {
                BlockKind::GnuLongName => {
                    long_name = Some(read_extension(source, size, encoding, &mut blocks)?);
                    log::debug!("GNU Longname block(s) consumed");
                }
                BlockKind::GnuLongLink => {
                    long_link = Some(read_extension(source, size, encoding, &mut blocks)?);
                    log::debug!("GNU Longlink block(s) consumed");
                }
                BlockKind::Entry(entry_type) => {
                    let mtime_epoch: i64 = hdr.mtime.as_number()?;
                    let mtime = OffsetDateTime::from_unix_timestamp(mtime_epoch)
                        .map_err(|_| TarError::InvalidTimestamp(mtime_epoch))?;
                    let gnu_long_name = long_name.is_some();
                    let gnu_long_link = long_link.is_some();
                    return Ok(Some(Self {
                        name: long_name.unwrap_or_else(|| hdr.name.decode(encoding)),
                        mode: Mode(hdr.mode.as_number()?),
                        uid: hdr.uid.as_number()?,
                        gid: hdr.gid.as_number()?,
                        size,
                        mtime,
                        checksum: hdr.cksum.as_number()?,
                        link_name: long_link.unwrap_or_else(|| hdr.linkname.decode(encoding)),
                        magic: hdr.magic.decode(encoding),
                        version: hdr.version.decode(encoding),
                        uname: hdr.uname.decode(encoding),
                        gname: hdr.gname.decode(encoding),
                        entry_type,
                        gnu_long_name,
                        gnu_long_link,
                        header_block_count: blocks,
                    }));
                }
            }
        }
    }

    /// Entry path. Up to 99 bytes from the fixed header field, or arbitrary
    /// length when spliced from a GNU Longname block.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// UNIX permission bits.
    #[must_use]
    pub const fn mode(&self) -> Mode {
        self.mode
    }

    /// Numeric owner id.
    #[must_use]
    pub const fn uid(&self) -> u64 {
        self.uid
    }

    /// Numeric group id.
    #[must_use]
    pub const fn gid(&self) -> u64 {
        self.gid
    }

    /// Content length in bytes. Zero for directories and most special
    /// entries.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Last modification time.
    #[must_use]
    pub const fn mtime(&self) -> OffsetDateTime {
        self.mtime
    }

    /// Last modification time as seconds since the Unix epoch.
    #[must_use]
    pub const fn mtime_epoch(&self) -> i64 {
        self.mtime.unix_timestamp()
    }

    /// Header checksum as stored in the archive. Parsed, never verified.
    #[must_use]
    pub const fn checksum(&self) -> u64 {
        self.checksum
    }

    /// Target of a link entry; empty for other kinds.
    #[must_use]
    pub fn link_name(&self) -> &str {
        &self.link_name
    }

    /// Format marker, e.g. `"ustar"`.
    #[must_use]
    pub fn magic(&self) -> &str {
        &self.magic
    }

    /// Format version marker.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Symbolic owner name.
    #[must_use]
    pub fn uname(&self) -> &str {
        &self.uname
    }

    /// Symbolic group name.
    #[must_use]
    pub fn gname(&self) -> &str {
        &self.gname
    }

    /// Filesystem kind of the entry.
    #[must_use]
    pub const fn entry_type(&self) -> EntryType {
        self.entry_type
    }

    /// True when the name was spliced from a GNU Longname block.
    #[must_use]
    pub const fn gnu_long_name(&self) -> bool {
        self.gnu_long_name
    }

    /// True when the link target was spliced from a GNU Longlink block.
    #[must_use]
    pub const fn gnu_long_link(&self) -> bool {
        self.gnu_long_link
    }

    /// Number of 512-byte blocks consumed to decode this header, extension
    /// blocks included. The entry's content region starts directly after.
    #[must_use]
    pub const fn header_block_count(&self) -> usize {
        self.header_block_count
    }
}

/// Renders a summary of the entry like the `ls -l` Unix command.
impl Display for TarHeader {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let kind = match self.entry_type {
            EntryType::Directory => 'd',
            EntryType::SymbolicLink => 'l',
            EntryType::CharDevice => 'c',
            EntryType::BlockDevice => 'b',
            _ => '-',
        };
        let mtime = self.mtime.format(&Rfc3339).map_err(|_| std::fmt::Error)?;
        write!(
            f,
            "{}{} {}:{} {:10} {} {}",
            kind,
            self.mode.symbolic(),
            self.uname,
            self.gname,
            self.size,
            mtime,
            self.name
        )?;
        if self.entry_type == EntryType::SymbolicLink {
            write!(f, " -> {}", self.link_name)?;
        }
        Ok(())
    }
}

/// Reads one full block. Returns `Ok(false)` when the source is exhausted
/// right at the block boundary and `eof_legal` allows that; a partial block
/// is always [`TarError::Truncated`].
fn read_block<R: Read + ?Sized>(
    source: &mut R,
    block: &mut [u8; BLOCKSIZE],
    eof_legal: bool,
) -> Result<bool, TarError> {
    let mut filled = 0;
    while filled < BLOCKSIZE {
        match source.read(&mut block[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    match filled {
        0 if eof_legal => Ok(false),
        BLOCKSIZE => Ok(true),
        got => Err(TarError::Truncated {
            got,
            expected: BLOCKSIZE,
        }),
    }
}

/// Reads the payload of a GNU Longname/Longlink pseudo-entry: `declared_len`
/// bytes rounded up to whole blocks. The string is the first `declared_len`
/// bytes cut at the first NUL. Extension payloads have no separate padding
/// phase; the rounded-up block read is all there is.
fn read_extension<R: Read + ?Sized>(
    source: &mut R,
    declared_len: u64,
    encoding: &dyn TextEncoding,
    blocks: &mut usize,
) -> Result<String, TarError> {
    let len = usize::try_from(declared_len).map_err(|_| TarError::Truncated {
        got: 0,
        expected: BLOCKSIZE,
    })?;
    let block_count = len.div_ceil(BLOCKSIZE);
    let mut buf = Vec::with_capacity(block_count * BLOCKSIZE);
    let mut block = [0u8; BLOCKSIZE];
    for _ in 0..block_count {
        read_block(source, &mut block, false)?;
        *blocks += 1;
        buf.extend_from_slice(&block);
    }
    Ok(decode_until_nul(&buf[..len], encoding))
}
