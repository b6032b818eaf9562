//! CRC32C hashing utilities.
//!
//! BNK entries carry a 32-bit content hash whose original function is
//! unknown. Archives written by this toolkit fill it with CRC32C.

/// Compute CRC32C hash of a byte slice.
#[inline]
pub fn hash_bytes(data: &[u8]) -> u32 {
    crc32c::crc32c(data)
}

/// Compute CRC32C hash of a string.
#[inline]
pub fn hash_str(s: &str) -> u32 {
    hash_bytes(s.as_bytes())
}
