//! Error types for the BNK crate.

use thiserror::Error;

use crate::extract::ExtractedFile;

/// Errors that can occur when working with BNK archives.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Common library error (truncated reads, bad strings).
    #[error("{0}")]
    Common(#[from] fable_common::Error),

    /// The header's leading size field disagrees with the file length.
    #[error("the header declares a total size of {declared} bytes, but the file is {actual} bytes long")]
    HeaderSizeMismatch { declared: u32, actual: usize },

    /// The constant after the size field is not the expected value.
    #[error("header constant at offset 0x4 should be {expected}, got {actual}")]
    UnexpectedConstant { expected: u32, actual: u32 },

    /// A count or size field holds a value that cannot be valid.
    #[error("invalid {field}: {value}")]
    InvalidCount { field: &'static str, value: i64 },

    /// The decompressor consumed or produced a different number of bytes
    /// than the archive declares.
    #[error(
        "decompressing {target}: expected to read {expected_read} and write {expected_written} bytes, \
         but read {read} and wrote {written}"
    )]
    DecompressionSizeMismatch {
        target: String,
        expected_read: usize,
        read: usize,
        expected_written: usize,
        written: usize,
    },

    /// The compressed stream itself is corrupt.
    #[error("decompression error in {target}: {message}")]
    Decompression { target: String, message: String },

    /// An entry's byte range does not lie within the data file.
    #[error("entry {path} spans {length} bytes at offset {offset}, outside the {data_len}-byte data file")]
    EntryOutOfBounds {
        path: String,
        offset: i64,
        length: i64,
        data_len: usize,
    },

    /// Entry index past the end of the table.
    #[error("entry index {index} out of bounds ({count} entries)")]
    EntryIndex { index: usize, count: usize },

    /// Entry path that would escape the destination directory.
    #[error("unsafe entry path: {0}")]
    UnsafePath(String),

    /// The worker pool could not be created.
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// Extraction was cancelled before this entry started.
    #[error("extraction cancelled")]
    Cancelled,

    /// One or more entries failed; the rest were extracted.
    #[error("{} of {} entries failed to extract; first failure: {}", .0.failures.len(), .0.total(), .0.first_failure())]
    Extraction(Box<PartialExtraction>),
}

/// Result type for BNK operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A single entry that failed to extract.
#[derive(Debug)]
pub struct EntryFailure {
    /// Position of the entry in the table.
    pub index: usize,
    /// The entry's archive path.
    pub path: String,
    /// Why it failed.
    pub error: Error,
}

/// Outcome of an extraction where some entries failed.
///
/// Entries that decompressed successfully are kept, so callers can still
/// write them out.
#[derive(Debug, Default)]
pub struct PartialExtraction {
    pub extracted: Vec<ExtractedFile>,
    pub failures: Vec<EntryFailure>,
}

impl PartialExtraction {
    /// Number of entries that were attempted.
    pub fn total(&self) -> usize {
        self.extracted.len() + self.failures.len()
    }

    fn first_failure(&self) -> String {
        self.failures
            .first()
            .map(|f| format!("{} ({})", f.path, f.error))
            .unwrap_or_default()
    }
}
