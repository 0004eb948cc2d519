//! Checksum utilities for staged content verification

use crate::error::{LoaderError, Result};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

/// Compute the SHA-256 checksum of a file, hex-encoded.
pub fn compute_file_checksum(path: impl AsRef<Path>) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    compute_checksum(&mut file)
}

/// Compute the SHA-256 checksum of any readable source, hex-encoded.
pub fn compute_checksum<R: Read>(reader: &mut R) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Verify the checksum of a file against an expected value.
pub fn verify_file_checksum(path: impl AsRef<Path>, expected: &str) -> Result<bool> {
    let actual = compute_file_checksum(path)?;
    if actual == expected {
        Ok(true)
    } else {
        Err(LoaderError::ChecksumMismatch {
            expected: expected.to_string(),
            actual,
        })
    }
}
