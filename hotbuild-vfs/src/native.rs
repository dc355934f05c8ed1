//! Native file system implementation

use crate::error::{VfsError, VfsResult};
use crate::r#trait::has_extension;
use crate::VirtualFileSystem;
use std::path::{Path, PathBuf};

/// A native OS file system implementation.
///
/// This wraps `std::fs` operations and provides the `VirtualFileSystem`
/// interface for local file access.
#[derive(Debug, Clone, Default)]
pub struct NativeFileSystem {}

impl NativeFileSystem {
    /// Create a new native file system.
    pub fn new() -> Self {
        Self {}
    }

    fn collect(
        &self,
        dir: &Path,
        extension: &str,
        recursive: bool,
        out: &mut Vec<PathBuf>,
    ) -> VfsResult<()> {
        let entries = std::fs::read_dir(dir).map_err(|e| VfsError::from_io(e, dir))?;
        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                if recursive {
                    self.collect(&path, extension, recursive, out)?;
                }
            } else if has_extension(&path, extension) {
                out.push(path);
            }
        }
        Ok(())
    }
}

impl VirtualFileSystem for NativeFileSystem {
    fn read_file(&self, path: &Path) -> VfsResult<Vec<u8>> {
        std::fs::read(path).map_err(|e| VfsError::from_io(e, path))
    }

    fn write_file(&self, path: &Path, content: &[u8]) -> VfsResult<()> {
        std::fs::write(path, content).map_err(|e| VfsError::from_io(e, path))
    }

    fn file_len(&self, path: &Path) -> VfsResult<u64> {
        std::fs::metadata(path)
            .map(|m| m.len())
            .map_err(|e| VfsError::from_io(e, path))
    }

    fn remove_file(&self, path: &Path) -> VfsResult<()> {
        std::fs::remove_file(path).map_err(|e| VfsError::from_io(e, path))
    }

    fn create_dir_all(&self, path: &Path) -> VfsResult<()> {
        std::fs::create_dir_all(path).map_err(|e| VfsError::from_io(e, path))
    }

    fn list_files(
        &self,
        dir: &Path,
        extension: &str,
        recursive: bool,
    ) -> VfsResult<Vec<PathBuf>> {
        let mut out = Vec::new();
        self.collect(dir, extension, recursive, &mut out)?;
        out.sort();
        Ok(out)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }
}
