//! Hotbuild Virtual File System
//!
//! A virtual file system abstraction with multiple backend implementations.
//! The build engine reads sources, writes artifacts and logs, and enumerates
//! directories only through [`VirtualFileSystem`].
//!
//! # Usage
//! ```rust,ignore
//! use hotbuild_vfs::{VirtualFileSystem, MemoryFileSystem};
//! use std::path::Path;
//!
//! let fs = MemoryFileSystem::new();
//! fs.write_file(Path::new("/src/a.cs"), b"class A {}").unwrap();
//! let files = fs.list_files(Path::new("/src"), "cs", true).unwrap();
//! ```

mod error;
mod memory;
mod native;
mod r#trait;

pub use error::{VfsError, VfsResult};
pub use memory::MemoryFileSystem;
pub use native::NativeFileSystem;
pub use r#trait::VirtualFileSystem;

/// Create a new memory-based file system.
pub fn memory_fs() -> MemoryFileSystem {
    MemoryFileSystem::new()
}

/// Create a new native file system.
pub fn native_fs() -> NativeFileSystem {
    NativeFileSystem::new()
}
