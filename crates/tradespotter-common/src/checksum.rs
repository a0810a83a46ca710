//! Payload hashing and integrity verification
//!
//! Backs the blob-store upload checksums and the trade deduplication
//! hash, which both use lowercase hex SHA-256.

use crate::error::{CommonError, Result};
use sha2::{Digest, Sha256};

/// Compute the lowercase hex SHA-256 digest of a byte slice.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Verify a payload against an expected SHA-256 digest.
///
/// Returns [`CommonError::ChecksumMismatch`] when the digests differ.
/// Comparison is case-insensitive on the hex encoding.
pub fn verify_checksum(bytes: &[u8], expected: &str) -> Result<()> {
    let actual = sha256_hex(bytes);
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(CommonError::ChecksumMismatch {
            expected: expected.to_lowercase(),
            actual,
        })
    }
}
