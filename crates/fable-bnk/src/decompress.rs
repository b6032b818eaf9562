//! Decompression for BNK archives.
//!
//! Both the header chunks and the entry data are raw DEFLATE streams (no zlib
//! or gzip wrapper). Decompression is injected through the [`Decompressor`]
//! trait so the parsing and extraction logic can be exercised with fakes.

use flate2::{Decompress, FlushDecompress, Status};

use crate::{Error, Result};

/// Byte counts reported by a [`Decompressor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decompressed {
    /// Bytes of input consumed.
    pub consumed: usize,
    /// Bytes written to the start of the output buffer.
    pub produced: usize,
}

/// A decompression capability with counted I/O.
///
/// Implementations fill `output` from its start and report how many bytes
/// they read and wrote. They must not fail just because the counts differ
/// from what the caller expects; the caller checks that.
pub trait Decompressor: Sync {
    /// Decompress `input` into `output`.
    fn decompress(&self, input: &[u8], output: &mut [u8]) -> Result<Decompressed>;
}

impl<D: Decompressor + ?Sized> Decompressor for &D {
    fn decompress(&self, input: &[u8], output: &mut [u8]) -> Result<Decompressed> {
        (**self).decompress(input, output)
    }
}

/// Raw DEFLATE decompressor backed by flate2.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deflate;

impl Decompressor for Deflate {
    /// Inflate into `output`.
    ///
    /// When the stream holds more data than `output` can take, the reported
    /// `produced` count exceeds `output.len()` so callers see the mismatch;
    /// the excess bytes are discarded.
    fn decompress(&self, input: &[u8], output: &mut [u8]) -> Result<Decompressed> {
        let mut inflater = Decompress::new(false);

        let finished = inflate_into(&mut inflater, input, output)?;
        let produced_into_output = inflater.total_out() as usize;

        let mut overflow = 0;
        if !finished {
            let mut scratch = [0u8; 256];
            let before = inflater.total_out();
            inflate_into(&mut inflater, input, &mut scratch)?;
            overflow = (inflater.total_out() - before) as usize;
        }

        Ok(Decompressed {
            consumed: inflater.total_in() as usize,
            produced: produced_into_output + overflow,
        })
    }
}

/// Run the inflater until the stream ends or it stops making progress.
///
/// Only `StreamEnd` counts as completion. A full `output` leaves the stream
/// resumable so the caller can measure any excess.
///
/// Returns whether the end of the DEFLATE stream was reached.
fn inflate_into(inflater: &mut Decompress, input: &[u8], output: &mut [u8]) -> Result<bool> {
    let out_base = inflater.total_out();

    loop {
        let consumed = inflater.total_in() as usize;
        let produced = (inflater.total_out() - out_base) as usize;

        let status = inflater
            .decompress(
                &input[consumed..],
                &mut output[produced..],
                FlushDecompress::None,
            )
            .map_err(|e| Error::Decompression {
                target: "deflate stream".to_string(),
                message: e.to_string(),
            })?;

        let stalled = inflater.total_in() as usize == consumed
            && (inflater.total_out() - out_base) as usize == produced;

        match status {
            Status::StreamEnd => return Ok(true),
            Status::Ok | Status::BufError if stalled => return Ok(false),
            Status::Ok | Status::BufError => {}
        }
    }
}

/// Decompress `input` into a fresh buffer of exactly `expected_len` bytes.
///
/// Fails with [`Error::DecompressionSizeMismatch`] unless the decompressor
/// consumed all of `input` and produced exactly `expected_len` bytes.
/// `target` names what is being decompressed in error messages.
pub fn decompress_exact<D: Decompressor + ?Sized>(
    decompressor: &D,
    input: &[u8],
    expected_len: usize,
    target: &str,
) -> Result<Vec<u8>> {
    let mut output = vec![0u8; expected_len];

    let counts = decompressor
        .decompress(input, &mut output)
        .map_err(|e| match e {
            Error::Decompression { message, .. } => Error::Decompression {
                target: target.to_string(),
                message,
            },
            other => other,
        })?;

    if counts.consumed != input.len() || counts.produced != expected_len {
        return Err(Error::DecompressionSizeMismatch {
            target: target.to_string(),
            expected_read: input.len(),
            read: counts.consumed,
            expected_written: expected_len,
            written: counts.produced,
        });
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::DeflateEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_deflate_exact() {
        let original = b"Hello, Albion! This is a test of DEFLATE compression.";
        let compressed = deflate(original);

        let decompressed = decompress_exact(&Deflate, &compressed, original.len(), "test").unwrap();
        assert_eq!(decompressed, original);
    }

    #[test]
    fn test_deflate_reports_counts() {
        let original = vec![7u8; 4096];
        let compressed = deflate(&original);

        let mut output = vec![0u8; original.len()];
        let counts = Deflate.decompress(&compressed, &mut output).unwrap();
        assert_eq!(counts.consumed, compressed.len());
        assert_eq!(counts.produced, original.len());
    }

    #[test]
    fn test_declared_size_too_large() {
        let original = b"twelve bytes";
        let compressed = deflate(original);

        match decompress_exact(&Deflate, &compressed, 20, "sized") {
            Err(Error::DecompressionSizeMismatch {
                target,
                expected_written,
                written,
                ..
            }) => {
                assert_eq!(target, "sized");
                assert_eq!(expected_written, 20);
                assert_eq!(written, 12);
            }
            other => panic!("expected size mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_declared_size_too_small() {
        let original = vec![1u8; 1000];
        let compressed = deflate(&original);

        match decompress_exact(&Deflate, &compressed, 10, "small") {
            Err(Error::DecompressionSizeMismatch {
                expected_written,
                written,
                ..
            }) => {
                assert_eq!(expected_written, 10);
                assert!(written > 10);
            }
            other => panic!("expected size mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_corrupt_stream() {
        // Block type 3 is reserved in DEFLATE.
        let corrupt = [0xFFu8, 0xFF, 0xFF, 0xFF];
        assert!(matches!(
            decompress_exact(&Deflate, &corrupt, 16, "corrupt"),
            Err(Error::Decompression { target, .. }) if target == "corrupt"
        ));
    }
}
