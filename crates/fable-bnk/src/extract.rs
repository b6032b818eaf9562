//! Parallel extraction of entry data.
//!
//! Each entry is an independent unit of work: it reads a disjoint span of the
//! data file and writes a buffer it owns. The only shared mutable state is an
//! atomic completion counter used for progress reporting.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{trace, warn};

use crate::decompress::{decompress_exact, Decompressor};
use crate::entry::{self, FileEntry};
use crate::error::{EntryFailure, PartialExtraction};
use crate::header::ArchiveHeader;
use crate::{Error, Result};

/// Stage label passed to progress callbacks during extraction.
pub const EXTRACT_STAGE: &str = "Extracting file data.";

/// Progress callback: `(fraction complete, stage label)`.
///
/// Called from worker threads, once per finished entry. Calls may arrive
/// out of order, so consecutive fractions are not guaranteed to increase.
pub type ProgressFn<'a> = dyn Fn(f32, &str) + Send + Sync + 'a;

/// Cooperative cancellation flag shared between a caller and an extraction.
///
/// Checked before each entry starts; entries already running finish.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Check whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// An extracted file: its archive path and exact contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFile {
    pub path: String,
    pub data: Vec<u8>,
}

impl ExtractedFile {
    /// Relative path to write this file to under an output directory.
    pub fn output_path(&self) -> Result<PathBuf> {
        entry::output_path(&self.path)
    }
}

/// Extracts entries from a loaded data file.
pub struct Extractor<'a, D: ?Sized> {
    header: &'a ArchiveHeader,
    data: &'a [u8],
    decompressor: &'a D,
}

impl<'a, D: Decompressor + ?Sized> Extractor<'a, D> {
    /// Create an extractor over a parsed header and the data file bytes.
    pub fn new(header: &'a ArchiveHeader, data: &'a [u8], decompressor: &'a D) -> Self {
        Self {
            header,
            data,
            decompressor,
        }
    }

    /// Extract one entry's contents.
    ///
    /// The result is exactly `uncompressed_size` bytes long.
    pub fn extract(&self, index: usize) -> Result<Vec<u8>> {
        let entry = self.header.entry(index).ok_or(Error::EntryIndex {
            index,
            count: self.header.entry_count(),
        })?;

        match self.header.compression().get(index) {
            None => Ok(self.span(entry, entry.uncompressed_size)?.to_vec()),
            Some(info) => {
                let compressed = self.span(entry, info.compressed_size)?;
                let expected_len =
                    usize::try_from(entry.uncompressed_size).map_err(|_| Error::InvalidCount {
                        field: "uncompressed size",
                        value: entry.uncompressed_size.into(),
                    })?;
                decompress_exact(self.decompressor, compressed, expected_len, &entry.full_path)
            }
        }
    }

    /// Extract every entry in parallel.
    ///
    /// The returned vector is in entry order regardless of completion
    /// order; a failed entry does not affect its siblings. Entries not yet
    /// started when `cancel` fires report [`Error::Cancelled`].
    pub fn extract_all(
        &self,
        progress: Option<&ProgressFn<'_>>,
        cancel: &CancelToken,
    ) -> Vec<Result<ExtractedFile>> {
        let indices: Vec<usize> = (0..self.header.entry_count()).collect();
        self.extract_indices(&indices, progress, cancel)
    }

    /// Extract the given entries in parallel.
    ///
    /// Result `i` belongs to `indices[i]`. Progress fractions are relative
    /// to `indices.len()`.
    pub fn extract_indices(
        &self,
        indices: &[usize],
        progress: Option<&ProgressFn<'_>>,
        cancel: &CancelToken,
    ) -> Vec<Result<ExtractedFile>> {
        let total = indices.len();
        let completed = AtomicUsize::new(0);

        indices
            .par_iter()
            .map(|&index| {
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }

                let result = self.extract(index).map(|data| ExtractedFile {
                    path: self.header.entries()[index].full_path.clone(),
                    data,
                });

                match &result {
                    Ok(file) => trace!(index, path = %file.path, len = file.data.len(), "extracted"),
                    Err(e) => warn!(index, error = %e, "failed to extract entry"),
                }

                let done = completed.fetch_add(1, Ordering::AcqRel) + 1;
                if let Some(progress) = progress {
                    progress(done as f32 / total as f32, EXTRACT_STAGE);
                }

                result
            })
            .collect()
    }

    /// Borrow `length` bytes at the entry's data offset.
    fn span(&self, entry: &FileEntry, length: i32) -> Result<&'a [u8]> {
        let out_of_bounds = || Error::EntryOutOfBounds {
            path: entry.full_path.clone(),
            offset: entry.data_offset.into(),
            length: length.into(),
            data_len: self.data.len(),
        };

        let start = usize::try_from(entry.data_offset).map_err(|_| out_of_bounds())?;
        let len = usize::try_from(length).map_err(|_| out_of_bounds())?;
        let end = start.checked_add(len).ok_or_else(out_of_bounds)?;

        self.data.get(start..end).ok_or_else(out_of_bounds)
    }
}

/// Split per-entry results into the extracted files, or an
/// [`Error::Extraction`] carrying both the failures and the successes.
///
/// `indices[i]` is the entry index of `results[i]`.
pub fn collect_extracted(
    entries: &[FileEntry],
    indices: &[usize],
    results: Vec<Result<ExtractedFile>>,
) -> Result<Vec<ExtractedFile>> {
    let mut partial = PartialExtraction::default();

    for (&index, result) in indices.iter().zip(results) {
        match result {
            Ok(file) => partial.extracted.push(file),
            Err(error) => partial.failures.push(EntryFailure {
                index,
                path: entries
                    .get(index)
                    .map(|e| e.full_path.clone())
                    .unwrap_or_default(),
                error,
            }),
        }
    }

    if partial.failures.is_empty() {
        Ok(partial.extracted)
    } else {
        Err(Error::Extraction(Box::new(partial)))
    }
}
