use sha2::{Digest as _, Sha256};
use trickle_protocol::{DIGEST_LEN, Digest};

use crate::TransferError;

/// Computes the SHA-256 digest of `data`.
pub fn checksum(data: &[u8]) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let mut digest = [0u8; DIGEST_LEN];
    digest.copy_from_slice(&hasher.finalize());
    digest
}

/// Compares two digests.
pub fn verify(expected: &Digest, actual: &Digest) -> bool {
    expected == actual
}

/// Hashes `data` and checks it against `expected`.
pub fn verify_data(expected: &Digest, data: &[u8]) -> Result<(), TransferError> {
    let actual = checksum(data);
    if verify(expected, &actual) {
        Ok(())
    } else {
        Err(TransferError::ChecksumMismatch {
            expected: to_hex(expected),
            actual: to_hex(&actual),
        })
    }
}

/// Lowercase hex rendering of a digest, for logs and error messages.
pub fn to_hex(digest: &Digest) -> String {
    hex::encode(digest)
}
