//! Error types for fable-common.

use thiserror::Error;

/// Common error type for Fable operations.
#[derive(Debug, Error)]
pub enum Error {
    /// End of buffer reached while reading.
    #[error("unexpected end of buffer at offset {offset:#x}: needed {needed} bytes but only {available} available")]
    UnexpectedEof {
        needed: usize,
        available: usize,
        offset: usize,
    },

    /// A length prefix that cannot describe a valid span.
    #[error("invalid length prefix {length} at offset {offset:#x}")]
    InvalidLength { length: i32, offset: usize },

    /// Missing null terminator in string.
    #[error("string at offset {offset:#x} should end with a null byte, but ends with {found:#04x}")]
    MissingNullTerminator { offset: usize, found: u8 },

    /// Non-ASCII byte in a string that must be ASCII.
    #[error("non-ASCII byte in string at offset {offset:#x}")]
    NonAscii { offset: usize },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;
