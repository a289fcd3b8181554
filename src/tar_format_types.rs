//! Primitive field types of the 512-byte Tar header block: fixed-width
//! NUL-padded strings and ASCII octal numbers, plus the [`TextEncoding`]
//! hook that turns raw name bytes into Rust strings.

use core::fmt::{Debug, Formatter};
use core::str::{from_utf8, Utf8Error};

use num_traits::Num;

/// Decodes raw header bytes into text.
///
/// Tar predates any portable encoding rule: names are whatever byte sequence
/// the creating system used. Archives written on non-UTF-8 systems can be
/// read by passing a custom decoder to
/// [`TarArchive::set_encoding`](crate::TarArchive::set_encoding); everything
/// else defaults to [`Utf8`].
pub trait TextEncoding {
    /// Turns the given bytes into a string. The bytes have already been cut
    /// at the first NUL; padding/whitespace trimming happens in the caller.
    fn decode(&self, bytes: &[u8]) -> String;
}

/// The default [`TextEncoding`]: UTF-8, with invalid sequences replaced by
/// U+FFFD rather than failing the whole entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8;

impl TextEncoding for Utf8 {
    fn decode(&self, bytes: &[u8]) -> String {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

/// Decodes a byte buffer up to its first NUL (or the full buffer when there
/// is none) and trims surrounding whitespace. Used both for fixed-width
/// header fields and for GNU Longname/Longlink payloads, where the name may
/// span multiple blocks and is not field-bounded.
pub(crate) fn decode_until_nul(bytes: &[u8], encoding: &dyn TextEncoding) -> String {
    let end = memchr::memchr(0, bytes).unwrap_or(bytes.len());
    let decoded = encoding.decode(&bytes[..end]);
    let trimmed = decoded.trim();
    if trimmed.len() == decoded.len() {
        decoded
    } else {
        trimmed.to_owned()
    }
}

/// A string embedded in a Tar header at a fixed width `N`. The contents are
/// either a fully populated string with no NUL termination, or a partially
/// populated string where the unused bytes are zero.
#[derive(Copy, Clone, PartialEq, Eq)]
#[repr(C)]
pub struct TarFormatString<const N: usize> {
    bytes: [u8; N],
}

impl<const N: usize> TarFormatString<N> {
    /// Constructor.
    ///
    /// # Panics
    /// Panics if `N` is zero, i.e., the underlying array has no length.
    #[must_use]
    pub const fn new(bytes: [u8; N]) -> Self {
        assert!(N > 0, "array should have at least one element");
        Self { bytes }
    }

    /// True if the string is empty (ignoring NUL bytes).
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.bytes[0] == 0
    }

    /// Returns the length of the payload in bytes. This is either the full
    /// capacity `N` or the data until the first NUL byte.
    #[must_use]
    pub fn size(&self) -> usize {
        memchr::memchr(0, &self.bytes).unwrap_or(N)
    }

    /// Returns a str ref cut at the first NUL byte, in case not the full
    /// width was used. Only suitable for fields that are ASCII by format
    /// (magic, version, numerics); name fields go through [`Self::decode`].
    ///
    /// # Errors
    /// Returns a [`Utf8Error`] for invalid strings.
    pub fn as_str(&self) -> Result<&str, Utf8Error> {
        from_utf8(&self.bytes[0..self.size()])
    }

    /// Decodes the field with the given encoding, cut at the first NUL and
    /// trimmed of surrounding whitespace.
    pub fn decode(&self, encoding: &dyn TextEncoding) -> String {
        decode_until_nul(&self.bytes, encoding)
    }
}

impl<const N: usize> Debug for TarFormatString<N> {
    fn fmt(&self, f: &mut Formatter) -> core::fmt::Result {
        let sub_array = &self.bytes[0..self.size()];
        write!(
            f,
            "str='{:?}',byte_usage={}/{}",
            from_utf8(sub_array),
            self.size(),
            N
        )
    }
}

/// A number with radix `R`, stored as ASCII digits. NUL and space padding on
/// either side is ignored; an entirely padded field reads as zero.
#[derive(Copy, Clone, PartialEq, Eq)]
#[repr(C)]
pub struct TarFormatNumber<const N: usize, const R: u32>(TarFormatString<N>);

/// An octal number. All numeric fields of the Tar header (mode, uid, gid,
/// size, mtime, checksum) use this representation.
#[derive(Copy, Clone, PartialEq, Eq)]
#[repr(C)]
pub struct TarFormatOctal<const N: usize>(TarFormatNumber<N, 8>);

impl<const N: usize, const R: u32> TarFormatNumber<N, R> {
    #[cfg(test)]
    pub(crate) const fn new(bytes: [u8; N]) -> Self {
        Self(TarFormatString::<N> { bytes })
    }

    /// Interprets the underlying value as a number of the specified type
    /// using its respective radix.
    ///
    /// # Errors
    ///
    /// Returns an error if the digits cannot be parsed as a number of the
    /// specified type and respective radix.
    pub fn as_number<T>(&self) -> core::result::Result<T, T::FromStrRadixErr>
    where
        T: Num,
    {
        let str = self.0.as_str().unwrap_or("0");
        let str = str.trim_matches(' ');
        if str.is_empty() {
            return Ok(T::zero());
        }
        T::from_str_radix(str, R)
    }

    /// Returns the underlying [`TarFormatString`].
    #[must_use]
    pub const fn as_inner(&self) -> &TarFormatString<N> {
        &self.0
    }
}

impl<const N: usize, const R: u32> Debug for TarFormatNumber<N, R> {
    fn fmt(&self, f: &mut Formatter) -> core::fmt::Result {
        let sub_array = &self.0.bytes[0..self.0.size()];
        match self.as_number::<u64>() {
            Err(msg) => write!(f, "{} [{:?}]", msg, from_utf8(sub_array)),
            Ok(val) => write!(f, "{} [{:?}]", val, from_utf8(sub_array)),
        }
    }
}

impl<const N: usize> Debug for TarFormatOctal<N> {
    fn fmt(&self, f: &mut Formatter) -> core::fmt::Result {
        self.0.fmt(f)
    }
}

impl<const N: usize> TarFormatOctal<N> {
    #[cfg(test)]
    pub(crate) const fn new(bytes: [u8; N]) -> Self {
        Self(TarFormatNumber::<N, 8>::new(bytes))
    }

    /// Interprets the underlying value as an octal number of the specified
    /// type.
    ///
    /// # Errors
    ///
    /// Returns an error if the digits cannot be parsed as a number of the
    /// specified type.
    pub fn as_number<T>(&self) -> core::result::Result<T, T::FromStrRadixErr>
    where
        T: Num,
    {
        self.0.as_number::<T>()
    }

    /// Returns the underlying [`TarFormatString`].
    #[must_use]
    pub const fn as_inner(&self) -> &TarFormatString<N> {
        self.0.as_inner()
    }
}

#[cfg(test)]
mod tar_format_string_tests {
    use super::{decode_until_nul, TarFormatString, Utf8};

    use core::mem::size_of_val;

    #[test]
    fn test_empty_string() {
        let empty = TarFormatString::new([0]);
        assert_eq!(size_of_val(&empty), 1);
        assert!(empty.is_empty());
        assert_eq!(empty.size(), 0);
        assert_eq!(empty.as_str(), Ok(""));
    }

    #[test]
    fn test_one_byte_string() {
        let s = TarFormatString::new([b'A']);
        assert_eq!(size_of_val(&s), 1);
        assert!(!s.is_empty());
        assert_eq!(s.size(), 1);
        assert_eq!(s.as_str(), Ok("A"));
    }

    #[test]
    fn test_cut_at_first_nul() {
        let s = TarFormatString::new([b'A', 0, b'B']);
        assert_eq!(size_of_val(&s), 3);
        assert!(!s.is_empty());
        assert_eq!(s.size(), 1);
        assert_eq!(s.as_str(), Ok("A"));
    }

    #[test]
    fn test_decode_trims_whitespace() {
        let s = TarFormatString::new(*b" ustar \0");
        assert_eq!(s.decode(&Utf8), "ustar");
    }

    #[test]
    fn test_decode_invalid_utf8_is_replaced() {
        let s = TarFormatString::new([b'A', 0xff, b'B', 0, 0]);
        assert_eq!(s.decode(&Utf8), "A\u{fffd}B");
    }

    #[test]
    fn test_decode_until_nul_unbounded() {
        // Long-name payloads are cut at the first NUL of the whole buffer,
        // not at a field boundary.
        let mut buf = vec![b'x'; 150];
        buf.extend_from_slice(&[0; 362]);
        assert_eq!(decode_until_nul(&buf, &Utf8), "x".repeat(150));
        assert_eq!(decode_until_nul(&[b'a', b'b'], &Utf8), "ab");
    }
}

#[cfg(test)]
mod tar_format_number_tests {
    use super::{TarFormatNumber, TarFormatOctal};

    #[test]
    fn test_as_number_with_space_padding() {
        let str = [b'0', b'1', b'0', b' ', 0];
        let str = TarFormatNumber::<5, 10>::new(str);
        assert_eq!(str.as_number::<u64>(), Ok(10));
    }

    #[test]
    fn test_as_number_with_leading_spaces() {
        let str = [b' ', b' ', b'6', b'4', b'4', 0];
        let str = TarFormatOctal::<6>::new(str);
        assert_eq!(str.as_number::<u64>(), Ok(0o644));
    }

    #[test]
    fn test_empty_field_is_zero() {
        let str = TarFormatOctal::<8>::new([0; 8]);
        assert_eq!(str.as_number::<u64>(), Ok(0));
        let str = TarFormatOctal::<8>::new(*b"        ");
        assert_eq!(str.as_number::<u64>(), Ok(0));
    }

    #[test]
    fn test_octal_size_field() {
        let str = TarFormatOctal::<12>::new(*b"00000001001\0");
        assert_eq!(str.as_number::<u64>(), Ok(513));
    }

    #[test]
    fn test_garbage_is_an_error() {
        let str = TarFormatOctal::<8>::new(*b"0o644\0\0\0");
        assert!(str.as_number::<u64>().is_err());
    }
}
