//! Binary reader for zero-copy parsing of byte slices.
//!
//! This module provides [`BinaryReader`], a cursor-like type that reads the
//! big-endian primitives used by Fable III container formats without copying.

use byteorder::{BigEndian, ByteOrder};
use zerocopy::FromBytes;

use crate::{Error, Result};

/// A binary reader that provides zero-copy reading from a byte slice.
///
/// Every read either consumes exactly the requested number of bytes or fails
/// with [`Error::UnexpectedEof`] and leaves the position untouched. There is
/// no partial-read retry.
///
/// # Example
///
/// ```
/// use fable_common::BinaryReader;
///
/// let data = [0x00, 0x00, 0x00, 0x04, 0xFF, 0xFF, 0xFF, 0xFE];
/// let mut reader = BinaryReader::new(&data);
///
/// assert_eq!(reader.read_u32_be().unwrap(), 4);
/// assert_eq!(reader.read_i32_be().unwrap(), -2);
/// assert!(reader.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct BinaryReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> BinaryReader<'a> {
    /// Create a new reader from a byte slice.
    #[inline]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Create a new reader starting at a specific position.
    #[inline]
    pub const fn new_at(data: &'a [u8], position: usize) -> Self {
        Self { data, position }
    }

    /// Get the current position in the buffer.
    #[inline]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Get the total length of the underlying buffer.
    #[inline]
    pub const fn len(&self) -> usize {
        self.data.len()
    }

    /// Get the number of bytes remaining to read.
    #[inline]
    pub const fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Check if there are no more bytes to read.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.position >= self.data.len()
    }

    /// Peek at bytes without advancing the position.
    #[inline]
    pub fn peek_bytes(&self, count: usize) -> Result<&'a [u8]> {
        if self.remaining() < count {
            return Err(Error::UnexpectedEof {
                needed: count,
                available: self.remaining(),
                offset: self.position,
            });
        }
        Ok(&self.data[self.position..self.position + count])
    }

    /// Read bytes and advance the position.
    #[inline]
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        let bytes = self.peek_bytes(count)?;
        self.position += count;
        Ok(bytes)
    }

    /// Read a single byte.
    #[inline]
    pub fn read_u8(&mut self) -> Result<u8> {
        self.read_bytes(1).map(|b| b[0])
    }

    /// Read a boolean (non-zero = true).
    #[inline]
    pub fn read_bool(&mut self) -> Result<bool> {
        self.read_u8().map(|b| b != 0)
    }

    /// Read a big-endian u32.
    #[inline]
    pub fn read_u32_be(&mut self) -> Result<u32> {
        self.read_bytes(4).map(BigEndian::read_u32)
    }

    /// Read a big-endian i32.
    #[inline]
    pub fn read_i32_be(&mut self) -> Result<i32> {
        self.read_bytes(4).map(BigEndian::read_i32)
    }

    /// Read `N` consecutive big-endian u32 values.
    pub fn read_u32_array_be<const N: usize>(&mut self) -> Result<[u32; N]> {
        let bytes = self.read_bytes(N * 4)?;
        let mut out = [0u32; N];
        BigEndian::read_u32_into(bytes, &mut out);
        Ok(out)
    }

    /// Read a big-endian i32 length prefix and check it is non-negative.
    pub fn read_length_be(&mut self) -> Result<usize> {
        let offset = self.position;
        let length = self.read_i32_be()?;
        usize::try_from(length).map_err(|_| {
            self.position = offset;
            Error::InvalidLength { length, offset }
        })
    }

    /// Read a length-prefixed, null-terminated ASCII string.
    ///
    /// The big-endian i32 prefix counts the terminator. The last of the
    /// prefixed bytes must be `0x00`; the bytes before it are returned.
    pub fn read_length_prefixed_string(&mut self) -> Result<&'a str> {
        let start = self.position;
        let length = self.read_i32_be()?;
        if length <= 0 {
            self.position = start;
            return Err(Error::InvalidLength {
                length,
                offset: start,
            });
        }

        let string_offset = self.position;
        let bytes = match self.read_bytes(length as usize) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.position = start;
                return Err(e);
            }
        };

        // `length` is positive, so there is a last byte.
        let (text, last) = (&bytes[..bytes.len() - 1], bytes[bytes.len() - 1]);
        if last != 0 {
            self.position = start;
            return Err(Error::MissingNullTerminator {
                offset: string_offset,
                found: last,
            });
        }

        if let Some(bad) = text.iter().position(|b| !b.is_ascii()) {
            self.position = start;
            return Err(Error::NonAscii {
                offset: string_offset + bad,
            });
        }

        // ASCII is always valid UTF-8.
        Ok(std::str::from_utf8(text).unwrap_or_default())
    }

    /// Read a struct using zerocopy.
    ///
    /// The struct must implement `FromBytes` from the zerocopy crate.
    #[inline]
    pub fn read_struct<T: FromBytes>(&mut self) -> Result<T> {
        let size = std::mem::size_of::<T>();
        let offset = self.position;
        let bytes = self.read_bytes(size)?;
        T::read_from_bytes(bytes).map_err(|_| Error::UnexpectedEof {
            needed: size,
            available: bytes.len(),
            offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_primitives() {
        let data = [
            0x01u8, 0x02, 0x03, 0x04, // u32: 0x01020304
            0xFF, 0xFF, 0xFF, 0xFF, // i32: -1
        ];
        let mut reader = BinaryReader::new(&data);

        assert_eq!(reader.read_u32_be().unwrap(), 0x01020304);
        assert_eq!(reader.read_i32_be().unwrap(), -1);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_short_read_is_eof() {
        let data = [0x01, 0x02, 0x03];
        let mut reader = BinaryReader::new(&data);

        match reader.read_u32_be() {
            Err(Error::UnexpectedEof {
                needed,
                available,
                offset,
            }) => {
                assert_eq!(needed, 4);
                assert_eq!(available, 3);
                assert_eq!(offset, 0);
            }
            other => panic!("expected UnexpectedEof, got {:?}", other),
        }
        // A failed read does not consume anything.
        assert_eq!(reader.position(), 0);
    }

    #[test]
    fn test_eof_at_end_of_stream() {
        let mut reader = BinaryReader::new(&[]);
        assert!(matches!(
            reader.read_i32_be(),
            Err(Error::UnexpectedEof { available: 0, .. })
        ));
    }

    #[test]
    fn test_read_u32_array() {
        let data: Vec<u8> = (1u32..=3).flat_map(|v| v.to_be_bytes()).collect();
        let mut reader = BinaryReader::new(&data);
        assert_eq!(reader.read_u32_array_be::<3>().unwrap(), [1, 2, 3]);
    }

    #[test]
    fn test_length_prefixed_string() {
        let mut data = 6i32.to_be_bytes().to_vec();
        data.extend_from_slice(b"a\\b.c\0");
        let mut reader = BinaryReader::new(&data);

        assert_eq!(reader.read_length_prefixed_string().unwrap(), "a\\b.c");
        assert!(reader.is_empty());
    }

    #[test]
    fn test_string_without_terminator() {
        let mut data = 3i32.to_be_bytes().to_vec();
        data.extend_from_slice(b"abc");
        let mut reader = BinaryReader::new(&data);

        match reader.read_length_prefixed_string() {
            Err(Error::MissingNullTerminator { offset, found }) => {
                assert_eq!(offset, 4);
                assert_eq!(found, b'c');
            }
            other => panic!("expected MissingNullTerminator, got {:?}", other),
        }
    }

    #[test]
    fn test_string_truncated() {
        let mut data = 10i32.to_be_bytes().to_vec();
        data.extend_from_slice(b"abc\0");
        let mut reader = BinaryReader::new(&data);

        assert!(matches!(
            reader.read_length_prefixed_string(),
            Err(Error::UnexpectedEof {
                needed: 10,
                available: 4,
                ..
            })
        ));
    }

    #[test]
    fn test_string_bad_length() {
        let data = 0i32.to_be_bytes();
        let mut reader = BinaryReader::new(&data);
        assert!(matches!(
            reader.read_length_prefixed_string(),
            Err(Error::InvalidLength { length: 0, .. })
        ));

        let data = (-5i32).to_be_bytes();
        let mut reader = BinaryReader::new(&data);
        assert!(matches!(
            reader.read_length_prefixed_string(),
            Err(Error::InvalidLength { length: -5, .. })
        ));
    }

    #[test]
    fn test_string_non_ascii() {
        let mut data = 3i32.to_be_bytes().to_vec();
        data.extend_from_slice(&[b'a', 0xC3, 0]);
        let mut reader = BinaryReader::new(&data);

        assert!(matches!(
            reader.read_length_prefixed_string(),
            Err(Error::NonAscii { offset: 5 })
        ));
    }

    #[test]
    fn test_read_length_rejects_negative() {
        let data = (-1i32).to_be_bytes();
        let mut reader = BinaryReader::new(&data);
        assert!(matches!(
            reader.read_length_be(),
            Err(Error::InvalidLength { length: -1, offset: 0 })
        ));
    }
}
