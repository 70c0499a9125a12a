use std::path::{Component, Path};

use crate::TransferError;

/// Longest file name accepted, in bytes.
pub const MAX_FILENAME_LEN: usize = 255;

/// Validates that `name` is a plain file name that stays inside the storage
/// root.
///
/// Rejects:
/// - Empty names and names longer than [`MAX_FILENAME_LEN`] bytes
/// - Directory separators (`/` or `\`) on every platform
/// - `.` and `..`
/// - NUL bytes
pub fn validate_filename(name: &str) -> Result<(), TransferError> {
    let reject = |reason: &str| Err(TransferError::InvalidFilename(format!("{reason}: {name:?}")));

    if name.is_empty() {
        return reject("empty name");
    }
    if name.len() > MAX_FILENAME_LEN {
        return reject("name too long");
    }
    if name.contains(['/', '\\']) {
        return reject("directory separators not allowed");
    }
    if name.contains('\0') {
        return reject("NUL byte not allowed");
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        (Some(Component::CurDir), None) | (Some(Component::ParentDir), None) => {
            reject("relative directory reference not allowed")
        }
        _ => reject("not a plain file name"),
    }
}
