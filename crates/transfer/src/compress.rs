//! Per-chunk compression (zstd).

use crate::TransferError;

/// Chunks shorter than this are always sent raw.
pub const MIN_COMPRESS_LEN: usize = 64;

/// Compresses one chunk at the given zstd level.
pub fn compress(data: &[u8], level: i32) -> Result<Vec<u8>, TransferError> {
    Ok(zstd::bulk::compress(data, level)?)
}

/// Decompresses one chunk that must expand to exactly `original_len` bytes.
///
/// Output longer or shorter than `original_len` is reported as corruption.
pub fn decompress(payload: &[u8], original_len: usize) -> Result<Vec<u8>, TransferError> {
    let data = zstd::bulk::decompress(payload, original_len)
        .map_err(|e| TransferError::Corrupt(format!("decompression failed: {e}")))?;
    if data.len() != original_len {
        return Err(TransferError::Corrupt(format!(
            "decompressed to {} bytes, expected {original_len}",
            data.len()
        )));
    }
    Ok(data)
}
