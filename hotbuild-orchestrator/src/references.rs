//! Reference resolution and caching
//!
//! The reference set is assembled from three best-effort sources: user
//! assemblies, the host interface and runtime binaries, and the platform
//! assemblies in the runtime install directory. Every candidate must look
//! like a loadable module before it is trusted.

use crate::error::ReferenceError;
use hotbuild_config::{BuildConfig, Workspace};
use hotbuild_vfs::VirtualFileSystem;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument, warn};

const TARGET: &str = "hotbuild::references";

/// Extension of reference binaries
pub const BINARY_EXTENSION: &str = "dll";

/// Offset of the PE header pointer inside the DOS header
const PE_POINTER_OFFSET: usize = 0x3C;

/// Cheap structural check that `bytes` is a PE module: DOS `MZ` magic plus a
/// `PE\0\0` signature at the offset the DOS header points to.
pub fn is_loadable_binary(bytes: &[u8]) -> bool {
    if bytes.len() < PE_POINTER_OFFSET + 4 || &bytes[..2] != b"MZ" {
        return false;
    }
    let mut pointer = [0u8; 4];
    pointer.copy_from_slice(&bytes[PE_POINTER_OFFSET..PE_POINTER_OFFSET + 4]);
    let pe_offset = u32::from_le_bytes(pointer) as usize;
    match pe_offset.checked_add(4) {
        Some(end) if end <= bytes.len() => &bytes[pe_offset..end] == b"PE\0\0",
        _ => false,
    }
}

/// Where reference binaries come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceRoots {
    /// User-provided assemblies, searched recursively
    pub assemblies: PathBuf,
    /// Host install root; host binaries are relative to it
    pub host: Option<PathBuf>,
    /// Runtime install directory; platform binaries are relative to it
    pub runtime: Option<PathBuf>,
}

impl ReferenceRoots {
    /// Assemblies under the workspace, no host or runtime roots
    pub fn for_workspace(workspace: &Workspace) -> Self {
        Self {
            assemblies: workspace.assemblies_dir(),
            host: None,
            runtime: None,
        }
    }

    pub fn with_host(mut self, host: impl Into<PathBuf>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_runtime(mut self, runtime: impl Into<PathBuf>) -> Self {
        self.runtime = Some(runtime.into());
        self
    }
}

/// Deduplicated, validated reference paths in discovery order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceSet {
    paths: Vec<PathBuf>,
}

impl ReferenceSet {
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// A copy with `extra` appended, skipping paths already present
    pub fn with_extra(&self, extra: &[PathBuf]) -> ReferenceSet {
        let mut set = self.clone();
        for path in extra {
            if !set.paths.contains(path) {
                set.paths.push(path.clone());
            }
        }
        set
    }
}

/// Builds a [`ReferenceSet`] from the configured roots
pub struct ReferenceResolver {
    vfs: Arc<dyn VirtualFileSystem>,
    roots: ReferenceRoots,
    host_binaries: Vec<String>,
    system_assemblies: Vec<String>,
}

impl ReferenceResolver {
    pub fn new(vfs: Arc<dyn VirtualFileSystem>, roots: ReferenceRoots, config: &BuildConfig) -> Self {
        let mut host_binaries = vec![config.host_interface_library.clone()];
        host_binaries.extend(config.host_runtime_binaries.iter().cloned());
        Self {
            vfs,
            roots,
            host_binaries,
            system_assemblies: config.system_assembly_names.clone(),
        }
    }

    #[instrument(target = "hotbuild::references", skip(self))]
    pub fn resolve(&self) -> Result<ReferenceSet, ReferenceError> {
        let mut seen = HashSet::new();
        let mut set = ReferenceSet::default();

        for path in self.user_assemblies() {
            self.admit(path, &mut seen, &mut set);
        }
        if let Some(host) = &self.roots.host {
            for rel in &self.host_binaries {
                self.admit_if_present(host.join(rel), &mut seen, &mut set);
            }
        }
        if let Some(runtime) = &self.roots.runtime {
            for name in &self.system_assemblies {
                self.admit_if_present(runtime.join(name), &mut seen, &mut set);
            }
        }

        if set.is_empty() {
            return Err(ReferenceError::Empty);
        }
        info!(target: TARGET, count = set.len(), "reference set resolved");
        Ok(set)
    }

    fn user_assemblies(&self) -> Vec<PathBuf> {
        let dir = &self.roots.assemblies;
        if !self.vfs.is_dir(dir) {
            if let Err(err) = self.vfs.create_dir_all(dir) {
                warn!(target: TARGET, dir = %dir.display(), %err, "cannot create assemblies directory");
            }
            return Vec::new();
        }
        match self.vfs.list_files(dir, BINARY_EXTENSION, true) {
            Ok(files) => files,
            Err(err) => {
                warn!(target: TARGET, dir = %dir.display(), %err, "cannot list assemblies");
                Vec::new()
            }
        }
    }

    fn admit_if_present(&self, path: PathBuf, seen: &mut HashSet<PathBuf>, set: &mut ReferenceSet) {
        if self.vfs.is_file(&path) {
            self.admit(path, seen, set);
        } else {
            debug!(target: TARGET, path = %path.display(), "reference not present");
        }
    }

    fn admit(&self, path: PathBuf, seen: &mut HashSet<PathBuf>, set: &mut ReferenceSet) {
        if seen.contains(&path) {
            return;
        }
        match self.vfs.read_file(&path) {
            Ok(bytes) if is_loadable_binary(&bytes) => {
                seen.insert(path.clone());
                set.paths.push(path);
            }
            Ok(_) => warn!(target: TARGET, path = %path.display(), "skipping invalid binary"),
            Err(err) => warn!(target: TARGET, path = %path.display(), %err, "skipping unreadable binary"),
        }
    }
}

/// Lazily built, explicitly invalidated reference set shared by the build
/// orchestrator and the script cache.
///
/// Resolution runs under the cache lock, so at most one build of the set is
/// in flight.
pub struct ReferenceCache {
    resolver: ReferenceResolver,
    cached: Mutex<Option<Arc<ReferenceSet>>>,
}

impl ReferenceCache {
    pub fn new(resolver: ReferenceResolver) -> Self {
        Self {
            resolver,
            cached: Mutex::new(None),
        }
    }

    pub fn get_or_resolve(&self) -> Result<Arc<ReferenceSet>, ReferenceError> {
        let mut slot = self.cached.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(set) = slot.as_ref() {
            return Ok(Arc::clone(set));
        }
        let set = Arc::new(self.resolver.resolve()?);
        *slot = Some(Arc::clone(&set));
        Ok(set)
    }

    /// Drop the cached set; the next consumer resolves again
    pub fn invalidate(&self) {
        let mut slot = self.cached.lock().unwrap_or_else(|e| e.into_inner());
        if slot.take().is_some() {
            debug!(target: TARGET, "reference cache invalidated");
        }
    }

    pub fn is_cached(&self) -> bool {
        self.cached
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }
}

/// The subset of `paths` that exist and pass [`is_loadable_binary`].
/// Missing paths are skipped quietly; invalid ones with a warning.
pub(crate) fn loadable_paths(vfs: &dyn VirtualFileSystem, paths: &[PathBuf]) -> Vec<PathBuf> {
    paths
        .iter()
        .filter(|path| {
            if !vfs.is_file(path) {
                debug!(target: TARGET, path = %path.display(), "extra reference not present");
                return false;
            }
            match vfs.read_file(path) {
                Ok(bytes) if is_loadable_binary(&bytes) => true,
                Ok(_) => {
                    warn!(target: TARGET, path = %path.display(), "skipping invalid binary");
                    false
                }
                Err(err) => {
                    warn!(target: TARGET, path = %path.display(), %err, "skipping unreadable binary");
                    false
                }
            }
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fake_dll;
    use hotbuild_vfs::MemoryFileSystem;
    use std::path::Path;

    fn roots() -> ReferenceRoots {
        ReferenceRoots {
            assemblies: PathBuf::from("/base/assemblies"),
            host: Some(PathBuf::from("/host")),
            runtime: Some(PathBuf::from("/runtime")),
        }
    }

    fn config() -> BuildConfig {
        BuildConfig {
            system_assembly_names: vec!["System.Runtime.dll".into(), "netstandard.dll".into()],
            ..BuildConfig::default()
        }
    }

    #[test]
    fn test_pe_probe() {
        assert!(is_loadable_binary(&fake_dll()));
        assert!(!is_loadable_binary(b"MZ"));
        assert!(!is_loadable_binary(b"not a binary at all, just text padding........"));
        let mut truncated = fake_dll();
        truncated[PE_POINTER_OFFSET] = 0xF0;
        assert!(!is_loadable_binary(&truncated));
    }

    #[test]
    fn test_resolve_all_sources_and_skip_invalid() {
        let fs = MemoryFileSystem::with_files([
            ("/base/assemblies/Good.dll", fake_dll()),
            ("/base/assemblies/nested/Deep.dll", fake_dll()),
            ("/base/assemblies/Corrupt.dll", b"garbage".to_vec()),
            ("/host/ServerPlugins/TShockAPI.dll", fake_dll()),
            ("/host/bin/OTAPI.dll", fake_dll()),
            ("/runtime/System.Runtime.dll", fake_dll()),
        ]);
        let resolver = ReferenceResolver::new(Arc::new(fs), roots(), &config());
        let set = resolver.resolve().unwrap();
        let paths: Vec<&Path> = set.paths().iter().map(|p| p.as_path()).collect();
        assert_eq!(
            paths,
            vec![
                Path::new("/base/assemblies/Good.dll"),
                Path::new("/base/assemblies/nested/Deep.dll"),
                Path::new("/host/ServerPlugins/TShockAPI.dll"),
                Path::new("/host/bin/OTAPI.dll"),
                Path::new("/runtime/System.Runtime.dll"),
            ]
        );
    }

    #[test]
    fn test_empty_assemblies_is_not_fatal() {
        let fs = MemoryFileSystem::with_files([("/runtime/netstandard.dll", fake_dll())]);
        let resolver = ReferenceResolver::new(Arc::new(fs.clone()), roots(), &config());
        assert_eq!(resolver.resolve().unwrap().len(), 1);
        assert!(fs.is_dir(Path::new("/base/assemblies")));
    }

    #[test]
    fn test_empty_set_is_an_error() {
        let fs = MemoryFileSystem::with_files([("/base/assemblies/Bad.dll", b"nope".to_vec())]);
        let resolver = ReferenceResolver::new(Arc::new(fs), roots(), &config());
        assert_eq!(resolver.resolve().unwrap_err(), ReferenceError::Empty);
    }

    #[test]
    fn test_cache_reuses_until_invalidated() {
        let fs = MemoryFileSystem::with_files([("/base/assemblies/A.dll", fake_dll())]);
        let cache = ReferenceCache::new(ReferenceResolver::new(
            Arc::new(fs.clone()),
            roots(),
            &config(),
        ));

        let first = cache.get_or_resolve().unwrap();
        fs.write_file(Path::new("/base/assemblies/B.dll"), &fake_dll()).unwrap();
        let second = cache.get_or_resolve().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.len(), 1);

        cache.invalidate();
        assert!(!cache.is_cached());
        assert_eq!(cache.get_or_resolve().unwrap().len(), 2);
    }

    #[test]
    fn test_loadable_paths_checks_every_extra() {
        let fs = MemoryFileSystem::with_files([
            ("/extra/Lib.dll", fake_dll()),
            ("/extra/Corrupt.dll", b"garbage".to_vec()),
        ]);
        let paths = loadable_paths(
            &fs,
            &[
                PathBuf::from("/extra/Lib.dll"),
                PathBuf::from("/extra/Corrupt.dll"),
                PathBuf::from("/extra/Missing.dll"),
            ],
        );
        assert_eq!(paths, vec![PathBuf::from("/extra/Lib.dll")]);
    }

    #[test]
    fn test_with_extra_deduplicates() {
        let set = ReferenceSet {
            paths: vec![PathBuf::from("/a.dll")],
        };
        let extended = set.with_extra(&[PathBuf::from("/a.dll"), PathBuf::from("/b.dll")]);
        assert_eq!(extended.len(), 2);
    }
}
