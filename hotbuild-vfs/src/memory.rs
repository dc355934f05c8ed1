//! In-memory file system implementation

use crate::error::{VfsError, VfsResult};
use crate::r#trait::has_extension;
use crate::VirtualFileSystem;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

#[derive(Debug, Default)]
struct Tree {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
}

/// An in-memory file system implementation.
///
/// All files are stored in memory using a `BTreeMap`, making it suitable
/// for testing and scenarios where disk access is not desired. Directories
/// exist either explicitly (via `create_dir_all`) or implicitly as the
/// parent of a stored file.
///
/// # Example
/// ```
/// use hotbuild_vfs::{MemoryFileSystem, VirtualFileSystem};
/// use std::path::Path;
///
/// let fs = MemoryFileSystem::new();
/// fs.write_file(Path::new("/test.txt"), b"hello").unwrap();
/// let content = fs.read_file(Path::new("/test.txt")).unwrap();
/// assert_eq!(content, b"hello");
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryFileSystem {
    tree: Arc<RwLock<Tree>>,
}

impl MemoryFileSystem {
    /// Create a new empty memory file system.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new memory file system pre-populated with files.
    ///
    /// # Arguments
    /// * `files` - Iterator of (path, content) tuples
    pub fn with_files<I, S>(files: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<u8>)>,
        S: AsRef<str>,
    {
        let fs = Self::new();
        for (path, content) in files {
            // a fresh tree has no other holder, so the lock cannot be poisoned
            let _ = fs.write_file(Path::new(path.as_ref()), &content);
        }
        fs
    }

    /// Number of stored files.
    pub fn file_count(&self) -> usize {
        self.tree.read().map(|t| t.files.len()).unwrap_or(0)
    }

    /// Normalize a path string for internal storage.
    /// Uses forward slashes consistently and drops trailing separators.
    fn normalize_path(path: &Path) -> String {
        let s = path.to_string_lossy().replace('\\', "/");
        if s.len() > 1 {
            s.trim_end_matches('/').to_string()
        } else {
            s
        }
    }

    fn dir_prefix(dir: &str) -> String {
        if dir.ends_with('/') {
            dir.to_string()
        } else {
            format!("{}/", dir)
        }
    }

    fn poisoned() -> VfsError {
        VfsError::Custom {
            message: String::from("Lock poisoned"),
        }
    }

    fn tree_is_dir(tree: &Tree, normalized: &str) -> bool {
        if tree.dirs.contains(normalized) {
            return true;
        }
        let prefix = Self::dir_prefix(normalized);
        tree.files.keys().any(|k| k.starts_with(&prefix))
            || tree.dirs.iter().any(|d| d.starts_with(&prefix))
    }
}

impl VirtualFileSystem for MemoryFileSystem {
    fn read_file(&self, path: &Path) -> VfsResult<Vec<u8>> {
        let normalized = Self::normalize_path(path);
        let tree = self.tree.read().map_err(|_| Self::poisoned())?;

        tree.files
            .get(&normalized)
            .cloned()
            .ok_or(VfsError::NotFound { path: normalized })
    }

    fn write_file(&self, path: &Path, content: &[u8]) -> VfsResult<()> {
        let normalized = Self::normalize_path(path);
        let mut tree = self.tree.write().map_err(|_| Self::poisoned())?;
        if tree.dirs.contains(&normalized) {
            return Err(VfsError::InvalidPath {
                path: normalized,
                reason: "is a directory".to_string(),
            });
        }
        tree.files.insert(normalized, content.to_vec());
        Ok(())
    }

    fn file_len(&self, path: &Path) -> VfsResult<u64> {
        let normalized = Self::normalize_path(path);
        let tree = self.tree.read().map_err(|_| Self::poisoned())?;
        tree.files
            .get(&normalized)
            .map(|c| c.len() as u64)
            .ok_or(VfsError::NotFound { path: normalized })
    }

    fn remove_file(&self, path: &Path) -> VfsResult<()> {
        let normalized = Self::normalize_path(path);
        let mut tree = self.tree.write().map_err(|_| Self::poisoned())?;
        match tree.files.remove(&normalized) {
            Some(_) => Ok(()),
            None => Err(VfsError::NotFound { path: normalized }),
        }
    }

    fn create_dir_all(&self, path: &Path) -> VfsResult<()> {
        let normalized = Self::normalize_path(path);
        let mut tree = self.tree.write().map_err(|_| Self::poisoned())?;
        if tree.files.contains_key(&normalized) {
            return Err(VfsError::InvalidPath {
                path: normalized,
                reason: "is a file".to_string(),
            });
        }
        tree.dirs.insert(normalized);
        Ok(())
    }

    fn list_files(
        &self,
        dir: &Path,
        extension: &str,
        recursive: bool,
    ) -> VfsResult<Vec<PathBuf>> {
        let normalized = Self::normalize_path(dir);
        let tree = self.tree.read().map_err(|_| Self::poisoned())?;
        if !Self::tree_is_dir(&tree, &normalized) {
            return Err(VfsError::NotFound { path: normalized });
        }

        let prefix = Self::dir_prefix(&normalized);
        // BTreeMap iteration is already ordered by path
        Ok(tree
            .files
            .keys()
            .filter_map(|key| {
                let rest = key.strip_prefix(&prefix)?;
                if !recursive && rest.contains('/') {
                    return None;
                }
                let path = PathBuf::from(key);
                has_extension(&path, extension).then_some(path)
            })
            .collect())
    }

    fn exists(&self, path: &Path) -> bool {
        self.is_file(path) || self.is_dir(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        let normalized = Self::normalize_path(path);
        match self.tree.read() {
            Ok(tree) => tree.files.contains_key(&normalized),
            Err(_) => false,
        }
    }

    fn is_dir(&self, path: &Path) -> bool {
        let normalized = Self::normalize_path(path);
        match self.tree.read() {
            Ok(tree) => Self::tree_is_dir(&tree, &normalized),
            Err(_) => false,
        }
    }
}
