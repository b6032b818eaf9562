//! BNK archive reader and writer for Fable III game files.
//!
//! A BNK archive is split across two files:
//!
//! - a header file: a 9-byte big-endian prefix followed by DEFLATE-compressed
//!   chunks that together hold the file entry table
//! - a data file: a flat blob addressed by the `(offset, size)` pairs in the
//!   entry table, optionally DEFLATE-compressed per entry
//!
//! Parsing is sequential; extraction runs in parallel with rayon, with each
//! entry validated to decompress to exactly its declared size.
//!
//! # Example
//!
//! ```no_run
//! use fable_bnk::{BnkArchive, CancelToken};
//!
//! let archive = BnkArchive::open("levels.bnk", "levels.dat")?;
//!
//! for entry in archive.entries() {
//!     println!("{}: {} bytes", entry.full_path, entry.uncompressed_size);
//! }
//!
//! for result in archive.extract_all(None, &CancelToken::new()) {
//!     let file = result?;
//!     println!("{} -> {:?}", file.path, file.output_path()?);
//! }
//! # Ok::<(), fable_bnk::Error>(())
//! ```

mod archive;
mod builder;
mod entry;
mod error;
mod extract;
mod table;

pub mod decompress;
pub mod header;

pub use archive::{extract_archive, read_header_file, ArchiveSummary, BnkArchive, ExtractOptions};
pub use builder::BnkBuilder;
pub use decompress::{Decompressed, Decompressor, Deflate};
pub use entry::{output_path, CompressedEntryInfo, CompressionInfo, FileEntry, TRAILER_WORDS};
pub use error::{EntryFailure, Error, PartialExtraction, Result};
pub use extract::{collect_extracted, CancelToken, ExtractedFile, Extractor, ProgressFn, EXTRACT_STAGE};
pub use header::ArchiveHeader;
pub use table::EntryTable;
