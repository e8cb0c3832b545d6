//! Path-component checks for names that come from remote data.
//!
//! Artist/title pairs and category names become directory and file names,
//! so they must stay a single component under their root.

use crate::error::SyncError;

const SEPARATORS: [char; 2] = ['/', '\\'];

/// Replaces path separators and rejects names that would escape the root.
///
/// # Returns
/// * `Ok(name)` with separators replaced by `_`
/// * `Err(SyncError::UnsafeName)` for empty, `.`/`..`, or NUL-containing names
pub fn safe_component(name: &str) -> Result<String, SyncError> {
    let cleaned = name.replace(SEPARATORS, "_");
    let trimmed = cleaned.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." || cleaned.contains('\0') {
        return Err(SyncError::UnsafeName(name.to_string()));
    }
    Ok(cleaned)
}
