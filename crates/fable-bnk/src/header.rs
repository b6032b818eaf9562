//! BNK header file.
//!
//! The header file starts with a fixed 9-byte prefix followed by one or more
//! compressed chunks:
//!
//! ```text
//! u32 total file size (big-endian, must equal the file length)
//! u32 constant 4
//! u8  data-compressed flag
//! repeated { i32 compressed_size, i32 decompressed_size, u8[compressed_size] }
//! ```
//!
//! The chunks are one DEFLATE stream split for buffering; they are joined
//! and inflated in a single call.

use fable_common::BinaryReader;
use tracing::{debug, trace};
use zerocopy::byteorder::{BigEndian, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::decompress::{decompress_exact, Decompressor};
use crate::entry::{CompressionInfo, FileEntry};
use crate::table::EntryTable;
use crate::{Error, Result};

/// Fixed prefix of the header file.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct HeaderPrefix {
    /// Total size of the header file in bytes.
    pub total_size: U32<BigEndian>,
    /// Always 4 in Fable III. Possibly the offset just past `total_size`.
    pub constant: U32<BigEndian>,
    /// Non-zero when entry data is DEFLATE-compressed.
    pub is_compressed: u8,
}

impl HeaderPrefix {
    /// Size of the prefix in bytes.
    pub const SIZE: usize = 9;

    /// Expected value of [`HeaderPrefix::constant`].
    pub const CONSTANT: u32 = 4;
}

/// One compressed chunk of the header payload.
#[derive(Debug, Clone, Copy)]
pub struct HeaderChunk<'a> {
    /// Length of `data`.
    pub compressed_size: i32,
    /// This chunk's share of the decompressed payload.
    pub decompressed_size: i32,
    /// Raw compressed bytes.
    pub data: &'a [u8],
}

/// A parsed BNK header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveHeader {
    /// Size field from the prefix; equals the header file length.
    pub declared_total_size: u32,
    /// Constant from the prefix; always 4.
    pub magic_constant: u32,
    /// Whether entry data is compressed.
    pub is_data_compressed: bool,
    /// First word of the decompressed payload; meaning unknown.
    pub unknown_header_int: i32,
    entries: Vec<FileEntry>,
    compression: CompressionInfo,
}

impl ArchiveHeader {
    /// Parse a header file's bytes.
    ///
    /// The size and constant checks run before any chunk is read.
    pub fn parse<D: Decompressor + ?Sized>(data: &[u8], decompressor: &D) -> Result<Self> {
        // Check the size field before reading the rest of the prefix.
        let declared_total_size = BinaryReader::new(data).read_u32_be()?;
        if usize::try_from(declared_total_size).ok() != Some(data.len()) {
            return Err(Error::HeaderSizeMismatch {
                declared: declared_total_size,
                actual: data.len(),
            });
        }

        let mut reader = BinaryReader::new(data);
        let prefix: HeaderPrefix = reader.read_struct()?;

        let magic_constant = prefix.constant.get();
        if magic_constant != HeaderPrefix::CONSTANT {
            return Err(Error::UnexpectedConstant {
                expected: HeaderPrefix::CONSTANT,
                actual: magic_constant,
            });
        }

        let is_data_compressed = prefix.is_compressed != 0;
        let payload = decompress_header_chunks(&mut reader, decompressor)?;
        let table = EntryTable::parse(&payload, is_data_compressed)?;

        debug!(
            entries = table.entries.len(),
            is_data_compressed,
            payload_len = payload.len(),
            "parsed BNK header"
        );

        Ok(Self {
            declared_total_size,
            magic_constant,
            is_data_compressed,
            unknown_header_int: table.unknown_header_int,
            entries: table.entries,
            compression: table.compression,
        })
    }

    /// Entries in archive order.
    #[inline]
    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    /// Get entry by index.
    #[inline]
    pub fn entry(&self, index: usize) -> Option<&FileEntry> {
        self.entries.get(index)
    }

    /// Number of entries.
    #[inline]
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Per-entry compression records.
    #[inline]
    pub fn compression(&self) -> &CompressionInfo {
        &self.compression
    }
}

/// Read every remaining chunk, returning them with the summed
/// decompressed size.
pub fn read_header_chunks<'a>(
    reader: &mut BinaryReader<'a>,
) -> Result<(Vec<HeaderChunk<'a>>, usize)> {
    let mut chunks = Vec::new();
    let mut total_decompressed: usize = 0;

    while !reader.is_empty() {
        let offset = reader.position();
        let compressed_size = reader.read_i32_be()?;
        let decompressed_size = reader.read_i32_be()?;

        let compressed_len = usize::try_from(compressed_size).map_err(|_| Error::InvalidCount {
            field: "header chunk compressed size",
            value: compressed_size.into(),
        })?;
        let increment = usize::try_from(decompressed_size).map_err(|_| Error::InvalidCount {
            field: "header chunk decompressed size",
            value: decompressed_size.into(),
        })?;
        total_decompressed =
            total_decompressed
                .checked_add(increment)
                .ok_or(Error::InvalidCount {
                    field: "header decompressed size",
                    value: i64::MAX,
                })?;

        let data = reader.read_bytes(compressed_len)?;
        trace!(offset, compressed_size, decompressed_size, "header chunk");

        chunks.push(HeaderChunk {
            compressed_size,
            decompressed_size,
            data,
        });
    }

    Ok((chunks, total_decompressed))
}

/// Join the header chunks and inflate them as one stream.
pub fn decompress_header_chunks<D: Decompressor + ?Sized>(
    reader: &mut BinaryReader<'_>,
    decompressor: &D,
) -> Result<Vec<u8>> {
    let (chunks, total_decompressed) = read_header_chunks(reader)?;

    let compressed_len = chunks.iter().map(|c| c.data.len()).sum();
    let mut compressed = Vec::with_capacity(compressed_len);
    for chunk in &chunks {
        compressed.extend_from_slice(chunk.data);
    }

    debug!(
        chunks = chunks.len(),
        compressed_len, total_decompressed, "decompressing BNK header payload"
    );

    if chunks.is_empty() {
        return Ok(Vec::new());
    }

    decompress_exact(decompressor, &compressed, total_decompressed, "BNK header")
}
