//! Atomic file writes and content hashing.

use crate::error::{CascadeError, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Result summary for a file written back to disk.
#[derive(Debug, Clone, Serialize)]
pub struct FileSummary {
    /// Workspace-relative path of the written file.
    pub file: String,
    /// SHA-256 before the session's edits.
    pub before_hash: String,
    /// SHA-256 after the session's edits.
    pub after_hash: String,
}

/// Hex SHA-256 of a byte slice.
pub(crate) fn compute_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let result = hasher.finalize();
    format!("{:x}", result)
}

/// Write through a temp file in the same directory, fsync, then rename.
pub(crate) fn write_atomic(file_path: &Path, content: &[u8], suffix: &str) -> Result<()> {
    if let Some(parent) = file_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| CascadeError::io(parent, e))?;
    }
    let temp_path = temp_path_for(file_path, suffix)?;
    let mut temp_file = File::create(&temp_path).map_err(|e| CascadeError::io(&temp_path, e))?;
    temp_file
        .write_all(content)
        .map_err(|e| CascadeError::io(&temp_path, e))?;
    temp_file
        .sync_all()
        .map_err(|e| CascadeError::io(&temp_path, e))?;
    std::fs::rename(&temp_path, file_path).map_err(|e| CascadeError::io(file_path, e))?;
    Ok(())
}

fn temp_path_for(file_path: &Path, suffix: &str) -> Result<PathBuf> {
    let file_dir = file_path
        .parent()
        .ok_or_else(|| CascadeError::Other("File has no parent directory".to_string()))?;
    let file_name = file_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("tmp");
    Ok(file_dir.join(format!(".{}.{}.tmp", file_name, suffix)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_stable_hex() {
        let hash = compute_hash(b"abc");
        assert_eq!(
            hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
