//! BNK archive entries.

use std::path::{Component, Path, PathBuf};

use crate::{Error, Result};

/// Number of opaque words stored after each entry's path.
pub const TRAILER_WORDS: usize = 7;

/// A file within a BNK archive.
///
/// This contains metadata about the file, not the file data itself.
/// Entry order is significant: the entry at index `i` pairs with the
/// compression record at index `i`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FileEntry {
    /// Content hash. Not verified against the data.
    pub content_hash: u32,
    /// Byte offset into the data file.
    pub data_offset: i32,
    /// Exact size of the extracted file.
    pub uncompressed_size: i32,
    /// Archive path, without the null terminator.
    pub full_path: String,
    /// Unknown per-entry words, kept as read.
    pub trailer_fields: [u32; TRAILER_WORDS],
}

impl FileEntry {
    /// Get the file extension, if any.
    pub fn extension(&self) -> Option<&str> {
        Path::new(self.full_path.rsplit('\\').next().unwrap_or(&self.full_path))
            .extension()
            .and_then(|ext| ext.to_str())
    }

    /// Get the relative output path for extraction.
    ///
    /// See [`output_path`].
    pub fn output_path(&self) -> Result<PathBuf> {
        output_path(&self.full_path)
    }
}

/// Compression metadata for one entry of a compressed archive.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CompressedEntryInfo {
    /// Length of the compressed span at the entry's data offset.
    pub compressed_size: i32,
    /// Number of 4-byte words in `unknown_sequence`.
    pub chunk_count: i32,
    /// Opaque bytes, `chunk_count * 4` long.
    pub unknown_sequence: Vec<u8>,
}

/// Archive-wide compression state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompressionInfo {
    /// Entry data is stored as-is.
    Uncompressed,
    /// Entry data is raw DEFLATE; one record per entry, in entry order.
    Compressed(Vec<CompressedEntryInfo>),
}

impl CompressionInfo {
    /// Check whether entry data is compressed.
    #[inline]
    pub fn is_compressed(&self) -> bool {
        matches!(self, Self::Compressed(_))
    }

    /// Get the compression record for an entry.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&CompressedEntryInfo> {
        match self {
            Self::Uncompressed => None,
            Self::Compressed(infos) => infos.get(index),
        }
    }
}

/// Convert an archive path to a relative path safe to join onto an
/// output directory.
///
/// Backslashes become path separators. Absolute paths, drive prefixes and
/// `..` components are rejected with [`Error::UnsafePath`].
pub fn output_path(archive_path: &str) -> Result<PathBuf> {
    let normalized = archive_path.replace('\\', "/");
    let mut out = PathBuf::new();

    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(Error::UnsafePath(archive_path.to_string()));
            }
        }
    }

    // Windows drive letters are plain components on other platforms.
    if normalized.split('/').next().is_some_and(|first| first.ends_with(':')) {
        return Err(Error::UnsafePath(archive_path.to_string()));
    }

    if out.as_os_str().is_empty() {
        return Err(Error::UnsafePath(archive_path.to_string()));
    }

    Ok(out)
}
