use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::{ParzError, Result};

/// Compresses `data` into a gzip member at the default compression level.
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(
        Vec::with_capacity(data.len() / 2 + 64),
        Compression::default(),
    );
    encoder
        .write_all(data)
        .map_err(|error| ParzError::CompressionError(error.to_string()))?;
    encoder
        .finish()
        .map_err(|error| ParzError::CompressionError(error.to_string()))
}

/// Inflates a gzip member that must expand to exactly `expected_len` bytes.
///
/// # Errors
/// Malformed input, and output that is shorter or longer than `expected_len`,
/// are decode errors. Nothing is padded or truncated.
pub fn decompress_exact(data: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(expected_len);
    GzDecoder::new(data)
        .take(expected_len as u64 + 1)
        .read_to_end(&mut output)
        .map_err(|error| ParzError::DecompressionError(error.to_string()))?;

    if output.len() != expected_len {
        return Err(ParzError::DecompressionError(format!(
            "decoded {} bytes, expected {expected_len}",
            output.len()
        )));
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_round_trips() {
        let packed = compress(&[]).expect("compress");
        assert!(!packed.is_empty());
        assert!(decompress_exact(&packed, 0).expect("decompress").is_empty());
    }

    #[test]
    fn size_mismatch_is_an_error() {
        let data = vec![42u8; 1000];
        let packed = compress(&data).expect("compress");

        assert!(decompress_exact(&packed, 2000).is_err());
        assert!(decompress_exact(&packed, 999).is_err());
        assert_eq!(decompress_exact(&packed, 1000).expect("exact"), data);
    }

    #[test]
    fn malformed_input_is_an_error() {
        let data: Vec<u8> = (0..5000u32).map(|value| (value * 7 % 251) as u8).collect();
        let packed = compress(&data).expect("compress");

        assert!(decompress_exact(&packed[..packed.len() / 2], data.len()).is_err());
        assert!(decompress_exact(b"not a gzip member", 4).is_err());
    }
}
