//! VirtualFileSystem trait definition

use crate::error::VfsResult;
use std::path::{Path, PathBuf};

/// Virtual File System trait
///
/// Provides a unified interface for file operations, decoupling code from
/// specific file system implementations.
///
/// # Implementations
/// - `MemoryFileSystem`: In-memory file system
/// - `NativeFileSystem`: Native OS file system
pub trait VirtualFileSystem: Send + Sync {
    /// Read file contents
    ///
    /// # Arguments
    /// * `path` - File path
    ///
    /// # Returns
    /// File contents as bytes, or VfsError
    fn read_file(&self, path: &Path) -> VfsResult<Vec<u8>>;

    /// Write file contents
    ///
    /// Creates the file if it doesn't exist, truncates it if it does.
    /// The native backend does not create parent directories.
    fn write_file(&self, path: &Path, content: &[u8]) -> VfsResult<()>;

    /// Size of a file in bytes, without reading its contents
    fn file_len(&self, path: &Path) -> VfsResult<u64>;

    /// Remove a single file
    fn remove_file(&self, path: &Path) -> VfsResult<()>;

    /// Create a directory and all of its missing parents
    fn create_dir_all(&self, path: &Path) -> VfsResult<()>;

    /// List files under `dir` whose extension equals `extension`
    /// (case-insensitive, without the leading dot). An empty `extension`
    /// matches every file.
    ///
    /// Results are sorted by path so enumeration order is deterministic.
    /// A missing directory is `NotFound`.
    fn list_files(&self, dir: &Path, extension: &str, recursive: bool)
        -> VfsResult<Vec<PathBuf>>;

    /// Check if path exists
    fn exists(&self, path: &Path) -> bool;

    /// Check if path is a file
    fn is_file(&self, path: &Path) -> bool;

    /// Check if path is a directory
    fn is_dir(&self, path: &Path) -> bool;
}

/// Extension match shared by the backends.
pub(crate) fn has_extension(path: &Path, extension: &str) -> bool {
    if extension.is_empty() {
        return true;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(extension.trim_start_matches('.')))
        .unwrap_or(false)
}
