//! Fable - Fable III game file extraction library.
//!
//! This crate provides a unified interface to the Fable library crates.
//!
//! # Crates
//!
//! - [`fable_common`] - Common utilities (big-endian binary reading, CRC32C)
//! - [`fable_bnk`] - BNK archive reading, extraction and packing
//!
//! # Example
//!
//! ```no_run
//! use fable::prelude::*;
//!
//! let archive = BnkArchive::open("levels.bnk", "levels.dat")?;
//!
//! if let Some((index, entry)) = archive.find("data\\levels\\fairfield.lev") {
//!     let data = archive.extract(index)?;
//!     assert_eq!(data.len(), entry.uncompressed_size as usize);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Re-export all sub-crates
pub use fable_bnk as bnk;
pub use fable_common as common;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use fable_bnk::{
        extract_archive, read_header_file, ArchiveHeader, ArchiveSummary, BnkArchive, BnkBuilder,
        CancelToken, CompressionInfo, Deflate, ExtractOptions, ExtractedFile, FileEntry,
    };
    pub use fable_common::{crc, BinaryReader};
}

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
