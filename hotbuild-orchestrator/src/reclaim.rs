//! Per-cycle resource reclamation
//!
//! Parsed units and groups are plain owned values that drop with the build
//! call. The shared reference set outlives a cycle inside [`ReferenceCache`],
//! so a [`CycleScope`] invalidates it when the cycle ends, on every exit path.

use crate::references::ReferenceCache;
use std::time::{Duration, Instant};
use tracing::debug;

/// Guard for one compile or script cycle
pub struct CycleScope<'a> {
    references: &'a ReferenceCache,
    label: &'static str,
    started: Instant,
}

impl<'a> CycleScope<'a> {
    pub fn begin(references: &'a ReferenceCache, label: &'static str) -> Self {
        debug!(target: "hotbuild::compile", cycle = label, "cycle started");
        Self {
            references,
            label,
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Drop for CycleScope<'_> {
    fn drop(&mut self) {
        self.references.invalidate();
        debug!(
            target: "hotbuild::compile",
            cycle = self.label,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "cycle finished, references released"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::references::{ReferenceResolver, ReferenceRoots};
    use crate::testing::fake_dll;
    use hotbuild_config::BuildConfig;
    use hotbuild_vfs::MemoryFileSystem;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn cache() -> ReferenceCache {
        let fs = MemoryFileSystem::with_files([("/asm/A.dll", fake_dll())]);
        let roots = ReferenceRoots {
            assemblies: PathBuf::from("/asm"),
            host: None,
            runtime: None,
        };
        ReferenceCache::new(ReferenceResolver::new(Arc::new(fs), roots, &BuildConfig::default()))
    }

    #[test]
    fn test_scope_invalidates_on_drop() {
        let cache = cache();
        {
            let _scope = CycleScope::begin(&cache, "build");
            cache.get_or_resolve().unwrap();
            assert!(cache.is_cached());
        }
        assert!(!cache.is_cached());
    }

    #[test]
    fn test_scope_invalidates_on_early_return() {
        fn failing(cache: &ReferenceCache) -> Result<(), String> {
            let _scope = CycleScope::begin(cache, "build");
            cache.get_or_resolve().map_err(|e| e.to_string())?;
            Err("group failed".to_string())
        }
        let cache = cache();
        assert!(failing(&cache).is_err());
        assert!(!cache.is_cached());
    }
}
