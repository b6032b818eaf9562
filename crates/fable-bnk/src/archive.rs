//! BNK archive reader.
//!
//! A BNK archive is a header file plus a separate data file. Opening an
//! archive reads the data file on a second thread while the header is parsed,
//! and joins both before any extraction starts.

use std::fs;
use std::path::Path;
use std::thread;

use tracing::{debug, info};

use crate::decompress::{Decompressor, Deflate};
use crate::entry::{CompressionInfo, FileEntry};
use crate::extract::{collect_extracted, CancelToken, ExtractedFile, Extractor, ProgressFn};
use crate::header::ArchiveHeader;
use crate::{Error, Result};

/// Tuning for [`BnkArchive::extract_all_with`].
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Worker threads; `None` uses rayon's global pool.
    pub threads: Option<usize>,
}

/// Summary of an archive, for listings.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ArchiveSummary {
    pub entry_count: usize,
    pub is_data_compressed: bool,
    pub unknown_header_int: i32,
    pub total_uncompressed_size: u64,
}

impl ArchiveSummary {
    /// Summarize a parsed header.
    pub fn of(header: &ArchiveHeader) -> Self {
        Self {
            entry_count: header.entry_count(),
            is_data_compressed: header.is_data_compressed,
            unknown_header_int: header.unknown_header_int,
            total_uncompressed_size: header
                .entries()
                .iter()
                .map(|e| e.uncompressed_size.max(0) as u64)
                .sum(),
        }
    }
}

/// A BNK archive with its data file loaded into memory.
pub struct BnkArchive<D = Deflate> {
    name: String,
    header: ArchiveHeader,
    data: Vec<u8>,
    decompressor: D,
}

impl BnkArchive<Deflate> {
    /// Open an archive from its header and data files.
    pub fn open<P: AsRef<Path>, Q: AsRef<Path>>(header_path: P, data_path: Q) -> Result<Self> {
        Self::open_with(header_path, data_path, Deflate)
    }
}

impl<D: Decompressor> BnkArchive<D> {
    /// Open an archive using a specific decompressor.
    pub fn open_with<P: AsRef<Path>, Q: AsRef<Path>>(
        header_path: P,
        data_path: Q,
        decompressor: D,
    ) -> Result<Self> {
        let header_path = header_path.as_ref();
        let data_path = data_path.as_ref();

        let (header, data) = thread::scope(|scope| {
            let data_task = scope.spawn(|| fs::read(data_path));
            let header = read_header_file(header_path, &decompressor);
            let data = match data_task.join() {
                Ok(data) => data,
                Err(panic) => std::panic::resume_unwind(panic),
            };
            Ok::<_, Error>((header?, data?))
        })?;

        let name = header_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        info!(
            archive = %name,
            entries = header.entry_count(),
            data_len = data.len(),
            "opened BNK archive"
        );

        Ok(Self::from_parts(name, header, data, decompressor))
    }

    /// Assemble an archive from an already parsed header and data bytes.
    pub fn from_parts(name: impl Into<String>, header: ArchiveHeader, data: Vec<u8>, decompressor: D) -> Self {
        Self {
            name: name.into(),
            header,
            data,
            decompressor,
        }
    }

    /// Get the archive name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the parsed header.
    #[inline]
    pub fn header(&self) -> &ArchiveHeader {
        &self.header
    }

    /// Entries in archive order.
    #[inline]
    pub fn entries(&self) -> &[FileEntry] {
        self.header.entries()
    }

    /// Get the number of entries.
    #[inline]
    pub fn entry_count(&self) -> usize {
        self.header.entry_count()
    }

    /// Get entry by index.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&FileEntry> {
        self.header.entry(index)
    }

    /// Per-entry compression records.
    #[inline]
    pub fn compression(&self) -> &CompressionInfo {
        self.header.compression()
    }

    /// Find an entry by path (case-insensitive, either separator).
    pub fn find(&self, path: &str) -> Option<(usize, &FileEntry)> {
        let normalized = path.replace('/', "\\");
        self.entries()
            .iter()
            .enumerate()
            .find(|(_, e)| e.full_path.eq_ignore_ascii_case(&normalized))
    }

    /// Extract one entry.
    pub fn extract(&self, index: usize) -> Result<Vec<u8>> {
        self.extractor().extract(index)
    }

    /// Extract every entry in parallel on rayon's global pool.
    pub fn extract_all(
        &self,
        progress: Option<&ProgressFn<'_>>,
        cancel: &CancelToken,
    ) -> Vec<Result<ExtractedFile>> {
        self.extractor().extract_all(progress, cancel)
    }

    /// Extract the given entries in parallel on rayon's global pool.
    pub fn extract_indices(
        &self,
        indices: &[usize],
        progress: Option<&ProgressFn<'_>>,
        cancel: &CancelToken,
    ) -> Vec<Result<ExtractedFile>> {
        self.extractor().extract_indices(indices, progress, cancel)
    }

    /// Extract the given entries with explicit options.
    pub fn extract_indices_with(
        &self,
        options: &ExtractOptions,
        indices: &[usize],
        progress: Option<&ProgressFn<'_>>,
        cancel: &CancelToken,
    ) -> Result<Vec<Result<ExtractedFile>>> {
        match options.threads {
            Some(threads) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()?;
                debug!(threads, "extracting on dedicated pool");
                Ok(pool.install(|| self.extract_indices(indices, progress, cancel)))
            }
            None => Ok(self.extract_indices(indices, progress, cancel)),
        }
    }

    /// Extract every entry with explicit options.
    pub fn extract_all_with(
        &self,
        options: &ExtractOptions,
        progress: Option<&ProgressFn<'_>>,
        cancel: &CancelToken,
    ) -> Result<Vec<Result<ExtractedFile>>> {
        let indices: Vec<usize> = (0..self.entry_count()).collect();
        self.extract_indices_with(options, &indices, progress, cancel)
    }

    fn extractor(&self) -> Extractor<'_, D> {
        Extractor::new(&self.header, &self.data, &self.decompressor)
    }
}

impl<D> std::fmt::Debug for BnkArchive<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BnkArchive")
            .field("name", &self.name)
            .field("entries", &self.header.entry_count())
            .field("data_len", &self.data.len())
            .finish()
    }
}

/// Read and parse a header file without touching the data file.
pub fn read_header_file<P: AsRef<Path>, D: Decompressor + ?Sized>(
    path: P,
    decompressor: &D,
) -> Result<ArchiveHeader> {
    let bytes = fs::read(path.as_ref())?;
    ArchiveHeader::parse(&bytes, decompressor)
}

/// Extract every file of an archive.
///
/// Returns `(path, contents)` pairs in entry order. If any entry fails, the
/// error is [`Error::Extraction`], which still carries the entries that
/// succeeded.
pub fn extract_archive<P: AsRef<Path>, Q: AsRef<Path>>(
    header_path: P,
    data_path: Q,
    progress: Option<&ProgressFn<'_>>,
) -> Result<Vec<ExtractedFile>> {
    let archive = BnkArchive::open(header_path, data_path)?;
    let indices: Vec<usize> = (0..archive.entry_count()).collect();
    let results = archive.extract_indices(&indices, progress, &CancelToken::new());
    collect_extracted(archive.entries(), &indices, results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::BnkBuilder;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn write_archive(dir: &Path, compress: bool) -> (std::path::PathBuf, std::path::PathBuf) {
        let mut builder = BnkBuilder::new().compress(compress).chunk_size(64);
        builder
            .add_file(r"art\textures\stone.dds", vec![0xAB; 300])
            .add_file(r"Scripts\Quest.lua", b"print('Albion')".to_vec())
            .add_file(r"empty.bin", Vec::new());

        let header_path = dir.join("levels.bnk");
        let data_path = dir.join("levels.dat");
        builder.write(&header_path, &data_path).unwrap();
        (header_path, data_path)
    }

    #[test]
    fn test_extract_archive_compressed() {
        let dir = tempfile::tempdir().unwrap();
        let (header_path, data_path) = write_archive(dir.path(), true);

        let calls = AtomicUsize::new(0);
        let progress = |_: f32, _: &str| {
            calls.fetch_add(1, Ordering::SeqCst);
        };
        let files = extract_archive(&header_path, &data_path, Some(&progress)).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(files.len(), 3);
        assert_eq!(files[0].path, r"art\textures\stone.dds");
        assert_eq!(files[0].data, vec![0xAB; 300]);
        assert_eq!(files[1].data, b"print('Albion')");
        assert!(files[2].data.is_empty());
    }

    #[test]
    fn test_open_uncompressed_and_find() {
        let dir = tempfile::tempdir().unwrap();
        let (header_path, data_path) = write_archive(dir.path(), false);

        let archive = BnkArchive::open(&header_path, &data_path).unwrap();
        assert_eq!(archive.name(), "levels.bnk");
        assert_eq!(archive.entry_count(), 3);
        assert!(!archive.compression().is_compressed());

        let (index, entry) = archive.find("scripts/quest.LUA").unwrap();
        assert_eq!(index, 1);
        assert_eq!(entry.full_path, r"Scripts\Quest.lua");
        assert_eq!(archive.extract(index).unwrap(), b"print('Albion')");
        assert!(archive.find("missing.txt").is_none());
    }

    #[test]
    fn test_extract_with_dedicated_pool() {
        let dir = tempfile::tempdir().unwrap();
        let (header_path, data_path) = write_archive(dir.path(), true);

        let archive = BnkArchive::open(&header_path, &data_path).unwrap();
        let options = ExtractOptions { threads: Some(2) };
        let results = archive
            .extract_all_with(&options, None, &CancelToken::new())
            .unwrap();
        assert!(results.iter().all(|r| r.is_ok()));
    }

    #[test]
    fn test_subset_progress_borrows_caller_state() {
        let dir = tempfile::tempdir().unwrap();
        let (header_path, data_path) = write_archive(dir.path(), true);
        let archive = BnkArchive::open(&header_path, &data_path).unwrap();

        let fractions = std::sync::Mutex::new(Vec::new());
        let progress = |fraction: f32, stage: &str| {
            assert_eq!(stage, crate::EXTRACT_STAGE);
            fractions.lock().unwrap().push(fraction);
        };

        let options = ExtractOptions { threads: Some(2) };
        let results = archive
            .extract_indices_with(&options, &[2, 0], Some(&progress), &CancelToken::new())
            .unwrap();
        assert_eq!(results[0].as_ref().unwrap().path, "empty.bin");
        assert_eq!(results[1].as_ref().unwrap().data, vec![0xAB; 300]);

        let mut fractions = fractions.into_inner().unwrap();
        fractions.sort_by(f32::total_cmp);
        assert_eq!(fractions, vec![0.5, 1.0]);
    }

    #[test]
    fn test_missing_data_file() {
        let dir = tempfile::tempdir().unwrap();
        let (header_path, _) = write_archive(dir.path(), true);

        assert!(matches!(
            BnkArchive::open(&header_path, dir.path().join("nope.dat")),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_corrupt_header_reported_over_data() {
        let dir = tempfile::tempdir().unwrap();
        let (header_path, data_path) = write_archive(dir.path(), true);

        let mut bytes = fs::read(&header_path).unwrap();
        bytes.push(0);
        fs::write(&header_path, bytes).unwrap();

        assert!(matches!(
            BnkArchive::open(&header_path, &data_path),
            Err(Error::HeaderSizeMismatch { .. })
        ));
    }

    #[test]
    fn test_summary() {
        let dir = tempfile::tempdir().unwrap();
        let (header_path, _) = write_archive(dir.path(), true);

        let header = read_header_file(&header_path, &Deflate).unwrap();
        let summary = ArchiveSummary::of(&header);
        assert_eq!(summary.entry_count, 3);
        assert!(summary.is_data_compressed);
        assert_eq!(summary.total_uncompressed_size, 315);
    }
}
