//! Zlib compression of dataset chunks.
//!
//! A compressed chunk is stored as `[raw_len: u64 LE][zlib stream]`. Whether
//! a chunk is compressed is recorded in the index, so decoding never guesses.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::util::{Error, Result};

/// Compress a chunk at the given level (0-9).
///
/// Returns the bytes to store and whether they are compressed. Level 0,
/// empty input, and input that does not shrink are stored raw.
pub fn compress(data: &[u8], level: u32) -> Result<(Vec<u8>, bool)> {
    if level == 0 || data.is_empty() {
        return Ok((data.to_vec(), false));
    }

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level.min(9)));
    encoder.write_all(data)?;
    let compressed = encoder.finish()?;

    if compressed.len() + 8 >= data.len() {
        return Ok((data.to_vec(), false));
    }

    let mut result = Vec::with_capacity(8 + compressed.len());
    result.extend_from_slice(&(data.len() as u64).to_le_bytes());
    result.extend_from_slice(&compressed);
    Ok((result, true))
}

/// Decompress a chunk written by [`compress`].
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < 8 {
        return Err(Error::invalid("compressed chunk shorter than its size prefix"));
    }
    let mut size = [0u8; 8];
    size.copy_from_slice(&data[..8]);
    let raw_len = u64::from_le_bytes(size) as usize;

    let mut decoder = ZlibDecoder::new(&data[8..]);
    let mut out = Vec::with_capacity(raw_len);
    decoder
        .read_to_end(&mut out)
        .map_err(|e| Error::invalid(format!("corrupt compressed chunk: {}", e)))?;

    if out.len() != raw_len {
        return Err(Error::invalid(format!(
            "chunk decompressed to {} bytes, expected {}",
            out.len(),
            raw_len
        )));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compress_decompress() {
        let original = b"points points points points points ".repeat(100);
        let (stored, compressed) = compress(&original, 6).unwrap();
        assert!(compressed);
        assert!(stored.len() < original.len());
        assert_eq!(decompress(&stored).unwrap(), original);
    }

    #[test]
    fn test_level_zero_is_raw() {
        let (stored, compressed) = compress(b"short", 0).unwrap();
        assert!(!compressed);
        assert_eq!(stored, b"short");
    }

    #[test]
    fn test_incompressible_is_raw() {
        let (stored, compressed) = compress(b"Hi", 9).unwrap();
        assert!(!compressed);
        assert_eq!(stored, b"Hi");
    }

    #[test]
    fn test_decompress_truncated() {
        assert!(decompress(&[1, 2, 3]).is_err());
    }
}
