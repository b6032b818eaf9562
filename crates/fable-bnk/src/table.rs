//! File entry table stored in the decompressed header payload.
//!
//! Layout (big-endian):
//!
//! ```text
//! i32 unknown
//! i32 entry_count
//! entry_count x { u32 hash, i32 offset, i32 uncompressed_size
//!                 [, i32 compressed_size, i32 chunk_count, u8[chunk_count * 4]] }
//! entry_count x { i32 path_len, u8[path_len] (null-terminated), u32[7] }
//! ```
//!
//! All numeric records come first, then all paths, so the entry vector is
//! sized and filled during the numeric pass and the path pass completes
//! each record in place.

use fable_common::BinaryReader;
use tracing::{debug, trace};

use crate::entry::{CompressedEntryInfo, CompressionInfo, FileEntry, TRAILER_WORDS};
use crate::{Error, Result};

/// The parsed file entry table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryTable {
    /// First word of the payload; meaning unknown.
    pub unknown_header_int: i32,
    /// Entries in archive order.
    pub entries: Vec<FileEntry>,
    /// Per-entry compression records, parallel to `entries`.
    pub compression: CompressionInfo,
}

impl EntryTable {
    /// Parse the table from a decompressed header payload.
    ///
    /// Any short read aborts the whole parse; later records are positioned
    /// by earlier ones, so a partial table is never returned.
    pub fn parse(payload: &[u8], is_data_compressed: bool) -> Result<Self> {
        let mut reader = BinaryReader::new(payload);

        let unknown_header_int = reader.read_i32_be()?;
        let raw_count = reader.read_i32_be()?;
        let entry_count = usize::try_from(raw_count).map_err(|_| Error::InvalidCount {
            field: "entry count",
            value: raw_count.into(),
        })?;

        debug!(
            entry_count,
            is_data_compressed, unknown_header_int, "parsing BNK entry table"
        );

        // Every entry needs at least 12 bytes of numeric data, so a count the
        // payload cannot hold fails here instead of over-allocating.
        let capacity = entry_count.min(reader.remaining() / 12);
        let mut entries = Vec::with_capacity(capacity);
        let mut compressed = is_data_compressed.then(|| Vec::with_capacity(capacity));

        for index in 0..entry_count {
            let content_hash = reader.read_u32_be()?;
            let data_offset = reader.read_i32_be()?;
            let uncompressed_size = reader.read_i32_be()?;

            entries.push(FileEntry {
                content_hash,
                data_offset,
                uncompressed_size,
                full_path: String::new(),
                trailer_fields: [0; TRAILER_WORDS],
            });

            if let Some(infos) = compressed.as_mut() {
                infos.push(read_compressed_info(&mut reader)?);
            }

            trace!(index, content_hash, data_offset, uncompressed_size, "entry record");
        }

        for entry in entries.iter_mut() {
            entry.full_path = reader.read_length_prefixed_string()?.to_string();
            entry.trailer_fields = reader.read_u32_array_be::<TRAILER_WORDS>()?;
        }

        if !reader.is_empty() {
            debug!(
                trailing = reader.remaining(),
                "entry table followed by unread bytes"
            );
        }

        let compression = match compressed {
            Some(infos) => CompressionInfo::Compressed(infos),
            None => CompressionInfo::Uncompressed,
        };

        Ok(Self {
            unknown_header_int,
            entries,
            compression,
        })
    }

    /// Number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table has no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn read_compressed_info(reader: &mut BinaryReader<'_>) -> Result<CompressedEntryInfo> {
    let compressed_size = reader.read_i32_be()?;
    let chunk_count = reader.read_i32_be()?;

    let sequence_len = usize::try_from(chunk_count)
        .ok()
        .and_then(|count| count.checked_mul(4))
        .ok_or(Error::InvalidCount {
            field: "chunk count",
            value: chunk_count.into(),
        })?;
    let unknown_sequence = reader.read_bytes(sequence_len)?.to_vec();

    Ok(CompressedEntryInfo {
        compressed_size,
        chunk_count,
        unknown_sequence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Payload(Vec<u8>);

    impl Payload {
        fn new(unknown: i32, count: i32) -> Self {
            let mut data = Vec::new();
            data.extend_from_slice(&unknown.to_be_bytes());
            data.extend_from_slice(&count.to_be_bytes());
            Self(data)
        }

        fn word(mut self, value: i32) -> Self {
            self.0.extend_from_slice(&value.to_be_bytes());
            self
        }

        fn bytes(mut self, bytes: &[u8]) -> Self {
            self.0.extend_from_slice(bytes);
            self
        }

        fn path(self, path: &str) -> Self {
            let mut with_nul = path.as_bytes().to_vec();
            with_nul.push(0);
            self.word(with_nul.len() as i32).bytes(&with_nul)
        }

        fn trailer(mut self, base: u32) -> Self {
            for i in 0..TRAILER_WORDS as u32 {
                self.0.extend_from_slice(&(base + i).to_be_bytes());
            }
            self
        }
    }

    #[test]
    fn test_empty_table() {
        let payload = Payload::new(9, 0);
        let table = EntryTable::parse(&payload.0, true).unwrap();

        assert_eq!(table.unknown_header_int, 9);
        assert!(table.is_empty());
        assert_eq!(table.compression, CompressionInfo::Compressed(Vec::new()));

        let table = EntryTable::parse(&payload.0, false).unwrap();
        assert_eq!(table.compression, CompressionInfo::Uncompressed);
    }

    #[test]
    fn test_uncompressed_entries() {
        let payload = Payload::new(1, 2)
            .word(0x1111)
            .word(0)
            .word(50)
            .word(0x2222)
            .word(50)
            .word(30)
            .path(r"data\a.txt")
            .trailer(100)
            .path(r"data\b.bin")
            .trailer(200);

        let table = EntryTable::parse(&payload.0, false).unwrap();
        assert_eq!(table.len(), 2);

        let a = &table.entries[0];
        assert_eq!(a.content_hash, 0x1111);
        assert_eq!(a.data_offset, 0);
        assert_eq!(a.uncompressed_size, 50);
        assert_eq!(a.full_path, r"data\a.txt");
        assert_eq!(a.trailer_fields, [100, 101, 102, 103, 104, 105, 106]);

        let b = &table.entries[1];
        assert_eq!(b.data_offset, 50);
        assert_eq!(b.uncompressed_size, 30);
        assert_eq!(b.full_path, r"data\b.bin");
        assert_eq!(b.trailer_fields[0], 200);
    }

    #[test]
    fn test_compressed_entries_keep_sequence() {
        let payload = Payload::new(0, 1)
            .word(7)
            .word(16)
            .word(1024)
            .word(99)
            .word(2)
            .bytes(&[1, 2, 3, 4, 5, 6, 7, 8])
            .path("x")
            .trailer(0);

        let table = EntryTable::parse(&payload.0, true).unwrap();
        let info = table.compression.get(0).unwrap();
        assert_eq!(info.compressed_size, 99);
        assert_eq!(info.chunk_count, 2);
        assert_eq!(info.unknown_sequence, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(table.entries[0].uncompressed_size, 1024);
    }

    #[test]
    fn test_missing_terminator_fails_whole_parse() {
        let payload = Payload::new(0, 1)
            .word(0)
            .word(0)
            .word(0)
            .word(3)
            .bytes(b"abc")
            .trailer(0);

        assert!(matches!(
            EntryTable::parse(&payload.0, false),
            Err(Error::Common(fable_common::Error::MissingNullTerminator { found: b'c', .. }))
        ));
    }

    #[test]
    fn test_truncated_trailer() {
        let payload = Payload::new(0, 1)
            .word(0)
            .word(0)
            .word(0)
            .path("a")
            .word(1);

        assert!(matches!(
            EntryTable::parse(&payload.0, false),
            Err(Error::Common(fable_common::Error::UnexpectedEof { needed: 28, .. }))
        ));
    }

    #[test]
    fn test_negative_entry_count() {
        let payload = Payload::new(0, -1);
        assert!(matches!(
            EntryTable::parse(&payload.0, false),
            Err(Error::InvalidCount { value: -1, .. })
        ));
    }

    #[test]
    fn test_negative_chunk_count() {
        let payload = Payload::new(0, 1).word(0).word(0).word(0).word(10).word(-3);
        assert!(matches!(
            EntryTable::parse(&payload.0, true),
            Err(Error::InvalidCount { field: "chunk count", value: -3 })
        ));
    }

    #[test]
    fn test_huge_count_fails_without_allocating() {
        let payload = Payload::new(0, i32::MAX);
        assert!(matches!(
            EntryTable::parse(&payload.0, false),
            Err(Error::Common(fable_common::Error::UnexpectedEof { .. }))
        ));
    }

    #[test]
    fn test_empty_payload_is_truncated() {
        assert!(matches!(
            EntryTable::parse(&[], false),
            Err(Error::Common(fable_common::Error::UnexpectedEof { .. }))
        ));
    }
}
