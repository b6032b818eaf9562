//! BNK archive writer.
//!
//! Produces a header file and data file pair readable by
//! [`ArchiveHeader::parse`](crate::ArchiveHeader::parse). The header payload
//! is compressed as a single DEFLATE stream, sync-flushed every
//! `chunk_size` input bytes so each flush becomes one header chunk.

use std::fs;
use std::io::Write;
use std::path::Path;

use byteorder::{BigEndian, WriteBytesExt};
use fable_common::crc;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use rayon::prelude::*;
use tracing::debug;

use crate::entry::TRAILER_WORDS;
use crate::header::HeaderPrefix;
use crate::{Error, Result};

struct PendingEntry {
    path: String,
    data: Vec<u8>,
    content_hash: u32,
    trailer_fields: [u32; TRAILER_WORDS],
}

/// Builder for BNK archives.
///
/// # Example
///
/// ```
/// use fable_bnk::{ArchiveHeader, BnkBuilder, Deflate};
///
/// let mut builder = BnkBuilder::new();
/// builder.add_file(r"data\hello.txt", b"hello".to_vec());
/// let (header, data) = builder.build()?;
///
/// let parsed = ArchiveHeader::parse(&header, &Deflate)?;
/// assert_eq!(parsed.entries()[0].full_path, r"data\hello.txt");
/// # let _ = data;
/// # Ok::<(), fable_bnk::Error>(())
/// ```
pub struct BnkBuilder {
    compress: bool,
    level: Compression,
    chunk_size: usize,
    unknown_header_int: i32,
    entries: Vec<PendingEntry>,
}

impl BnkBuilder {
    /// Default number of payload bytes per header chunk.
    pub const DEFAULT_CHUNK_SIZE: usize = 0x8000;

    /// Create a builder that compresses entry data.
    pub fn new() -> Self {
        Self {
            compress: true,
            level: Compression::default(),
            chunk_size: Self::DEFAULT_CHUNK_SIZE,
            unknown_header_int: 0,
            entries: Vec::new(),
        }
    }

    /// Set whether entry data is DEFLATE-compressed.
    pub fn compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Set the DEFLATE level (0-9).
    pub fn level(mut self, level: u32) -> Self {
        self.level = Compression::new(level.min(9));
        self
    }

    /// Set how many payload bytes go into each header chunk.
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Set the first word of the header payload.
    pub fn unknown_header_int(mut self, value: i32) -> Self {
        self.unknown_header_int = value;
        self
    }

    /// Add a file, hashing its path for the content hash.
    pub fn add_file(&mut self, path: impl Into<String>, data: Vec<u8>) -> &mut Self {
        let path = path.into();
        let content_hash = crc::hash_str(&path);
        self.add_entry(path, data, content_hash, [0; TRAILER_WORDS])
    }

    /// Add a file with explicit hash and trailer words.
    pub fn add_entry(
        &mut self,
        path: impl Into<String>,
        data: Vec<u8>,
        content_hash: u32,
        trailer_fields: [u32; TRAILER_WORDS],
    ) -> &mut Self {
        self.entries.push(PendingEntry {
            path: path.into(),
            data,
            content_hash,
            trailer_fields,
        });
        self
    }

    /// Number of entries added so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no entries were added.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize the archive, returning `(header file, data file)`.
    pub fn build(&self) -> Result<(Vec<u8>, Vec<u8>)> {
        for entry in &self.entries {
            if entry.path.is_empty() || !entry.path.is_ascii() || entry.path.contains('\0') {
                return Err(Error::UnsafePath(entry.path.clone()));
            }
        }

        let stored: Vec<Vec<u8>> = if self.compress {
            self.entries
                .par_iter()
                .map(|entry| deflate(&entry.data, self.level))
                .collect::<Result<_>>()?
        } else {
            Vec::new()
        };

        let mut data = Vec::new();
        let mut numeric = Vec::with_capacity(self.entries.len() * 24);

        for (index, entry) in self.entries.iter().enumerate() {
            let offset = to_i32("data offset", data.len())?;
            let uncompressed_size = to_i32("uncompressed size", entry.data.len())?;

            numeric.write_u32::<BigEndian>(entry.content_hash)?;
            numeric.write_i32::<BigEndian>(offset)?;
            numeric.write_i32::<BigEndian>(uncompressed_size)?;

            match stored.get(index) {
                Some(compressed) => {
                    let compressed_size = to_i32("compressed size", compressed.len())?;
                    numeric.write_i32::<BigEndian>(compressed_size)?;
                    numeric.write_i32::<BigEndian>(1)?;
                    numeric.write_i32::<BigEndian>(compressed_size)?;
                    data.extend_from_slice(compressed);
                }
                None => data.extend_from_slice(&entry.data),
            }
        }

        let mut payload = Vec::new();
        payload.write_i32::<BigEndian>(self.unknown_header_int)?;
        payload.write_i32::<BigEndian>(to_i32("entry count", self.entries.len())?)?;
        payload.extend_from_slice(&numeric);

        for entry in &self.entries {
            payload.write_i32::<BigEndian>(to_i32("path length", entry.path.len() + 1)?)?;
            payload.extend_from_slice(entry.path.as_bytes());
            payload.push(0);
            for word in entry.trailer_fields {
                payload.write_u32::<BigEndian>(word)?;
            }
        }

        let chunks = self.compress_payload(&payload)?;

        let body_len: usize = chunks.iter().map(|(c, _)| 8 + c.len()).sum();
        let total_size = u32::try_from(HeaderPrefix::SIZE + body_len).map_err(|_| Error::InvalidCount {
            field: "header size",
            value: (HeaderPrefix::SIZE + body_len) as i64,
        })?;

        let mut header = Vec::with_capacity(HeaderPrefix::SIZE + body_len);
        header.write_u32::<BigEndian>(total_size)?;
        header.write_u32::<BigEndian>(HeaderPrefix::CONSTANT)?;
        header.write_u8(self.compress as u8)?;
        for (compressed, decompressed_len) in &chunks {
            header.write_i32::<BigEndian>(to_i32("header chunk size", compressed.len())?)?;
            header.write_i32::<BigEndian>(to_i32("header chunk size", *decompressed_len)?)?;
            header.extend_from_slice(compressed);
        }

        debug!(
            entries = self.entries.len(),
            header_len = header.len(),
            data_len = data.len(),
            chunks = chunks.len(),
            "built BNK archive"
        );

        Ok((header, data))
    }

    /// Build the archive and write both files.
    pub fn write<P: AsRef<Path>, Q: AsRef<Path>>(&self, header_path: P, data_path: Q) -> Result<()> {
        let (header, data) = self.build()?;
        fs::write(header_path, header)?;
        fs::write(data_path, data)?;
        Ok(())
    }

    /// Compress the payload as one stream, cut at sync flushes.
    ///
    /// Returns `(compressed bytes, payload bytes covered)` per chunk.
    fn compress_payload(&self, payload: &[u8]) -> Result<Vec<(Vec<u8>, usize)>> {
        let mut encoder = DeflateEncoder::new(Vec::new(), self.level);
        let mut chunks = Vec::new();

        let pieces: Vec<&[u8]> = payload.chunks(self.chunk_size).collect();
        let last = pieces.len().saturating_sub(1);

        for (i, piece) in pieces.iter().enumerate() {
            encoder.write_all(piece)?;
            if i != last {
                encoder.flush()?;
                chunks.push((std::mem::take(encoder.get_mut()), piece.len()));
            }
        }

        let tail = encoder.finish()?;
        let tail_len = pieces.last().map_or(0, |p| p.len());
        chunks.push((tail, tail_len));

        Ok(chunks)
    }
}

impl Default for BnkBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn deflate(data: &[u8], level: Compression) -> Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::with_capacity(data.len() / 2), level);
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn to_i32(field: &'static str, value: usize) -> Result<i32> {
    i32::try_from(value).map_err(|_| Error::InvalidCount {
        field,
        value: value as i64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decompress::Deflate;
    use crate::header::ArchiveHeader;
    use crate::CompressionInfo;

    #[test]
    fn test_build_uncompressed_layout() {
        let mut builder = BnkBuilder::new().compress(false);
        builder.add_file("a", vec![1; 50]).add_file("b", vec![2; 30]);
        let (header_bytes, data) = builder.build().unwrap();

        assert_eq!(data.len(), 80);
        assert_eq!(
            u32::from_be_bytes(header_bytes[0..4].try_into().unwrap()) as usize,
            header_bytes.len()
        );

        let header = ArchiveHeader::parse(&header_bytes, &Deflate).unwrap();
        assert_eq!(header.compression(), &CompressionInfo::Uncompressed);
        let offsets: Vec<i32> = header.entries().iter().map(|e| e.data_offset).collect();
        let sizes: Vec<i32> = header.entries().iter().map(|e| e.uncompressed_size).collect();
        assert_eq!(offsets, vec![0, 50]);
        assert_eq!(sizes, vec![50, 30]);
        assert_eq!(header.entries()[0].content_hash, crc::hash_str("a"));
    }

    #[test]
    fn test_small_chunks_span_many_header_chunks() {
        let mut builder = BnkBuilder::new().chunk_size(16).unknown_header_int(-7);
        for i in 0..10 {
            builder.add_entry(
                format!("folder\\file_{i}.bin"),
                vec![i as u8; i * 3],
                i as u32,
                [i as u32; TRAILER_WORDS],
            );
        }
        let (header_bytes, _) = builder.build().unwrap();

        let header = ArchiveHeader::parse(&header_bytes, &Deflate).unwrap();
        assert_eq!(header.unknown_header_int, -7);
        assert_eq!(header.entry_count(), 10);
        assert_eq!(header.entries()[4].trailer_fields, [4; TRAILER_WORDS]);
        assert_eq!(header.entries()[9].full_path, "folder\\file_9.bin");

        match header.compression() {
            CompressionInfo::Compressed(infos) => {
                assert_eq!(infos.len(), 10);
                assert!(infos.iter().all(|i| i.chunk_count == 1 && i.unknown_sequence.len() == 4));
            }
            CompressionInfo::Uncompressed => panic!("expected compressed archive"),
        }
    }

    #[test]
    fn test_rejects_unusable_paths() {
        let mut builder = BnkBuilder::new();
        builder.add_file("caf\u{e9}.txt", Vec::new());
        assert!(matches!(builder.build(), Err(Error::UnsafePath(_))));
    }

    #[test]
    fn test_empty_archive() {
        let (header_bytes, data) = BnkBuilder::new().build().unwrap();
        assert!(data.is_empty());

        let header = ArchiveHeader::parse(&header_bytes, &Deflate).unwrap();
        assert_eq!(header.entry_count(), 0);
    }
}
