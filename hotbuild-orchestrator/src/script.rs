//! Script cache
//!
//! Single-unit scripts compiled once and kept by name until their content
//! changes or they are evicted. Compiles for one name are serialized; the
//! entry map is only locked for lookups and inserts, never across a compile.
//! Execution runs outside every lock and is bounded by a caller-supplied
//! timeout.

use crate::error::ScriptError;
use crate::imports;
use crate::ingest::decode_source;
use crate::reclaim::CycleScope;
use crate::references::{loadable_paths, ReferenceCache};
use crate::report;
use crate::service::{guarded, panic_message, CompileService, Runnable, ScriptRequest};
use hotbuild_config::{BuildConfig, LanguageVersion};
use hotbuild_vfs::VirtualFileSystem;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const TARGET: &str = "hotbuild::script";

/// Extension of script files picked up by [`ScriptCache::precompile_dir`]
pub const SCRIPT_EXTENSION: &str = "csx";

/// Hash over the line-ending-normalized source and the sorted extra imports
pub fn content_hash(source: &str, extra_imports: &[String]) -> String {
    let mut sorted: Vec<&str> = extra_imports.iter().map(|s| s.trim()).collect();
    sorted.sort_unstable();

    let mut hasher = blake3::Hasher::new();
    hasher.update(source.replace("\r\n", "\n").as_bytes());
    hasher.update(&[0]);
    for import in sorted {
        hasher.update(import.as_bytes());
        hasher.update(b"\n");
    }
    hasher.finalize().to_hex().to_string()
}

#[derive(Clone)]
pub struct ScriptCacheEntry {
    /// Name as first submitted; lookups ignore case
    pub name: String,
    pub content_hash: String,
    runnable: Arc<dyn Runnable>,
}

impl std::fmt::Debug for ScriptCacheEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptCacheEntry")
            .field("name", &self.name)
            .field("content_hash", &self.content_hash)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrecompileStatus {
    /// An entry with the same content hash already existed
    Cached,
    Compiled,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

pub struct ScriptCache {
    service: Arc<dyn CompileService>,
    references: Arc<ReferenceCache>,
    vfs: Arc<dyn VirtualFileSystem>,
    script_imports: Vec<String>,
    language_version: LanguageVersion,
    extra_assemblies: Vec<PathBuf>,
    entries: Mutex<HashMap<String, ScriptCacheEntry>>,
    /// Keys with a compile in flight
    compiling: Mutex<HashSet<String>>,
    compile_done: Condvar,
}

/// Exclusive right to compile one key; released on drop
struct CompileClaim<'a> {
    cache: &'a ScriptCache,
    key: String,
}

impl Drop for CompileClaim<'_> {
    fn drop(&mut self) {
        let mut compiling = self.cache.compiling.lock().unwrap_or_else(|e| e.into_inner());
        compiling.remove(&self.key);
        self.cache.compile_done.notify_all();
    }
}

impl ScriptCache {
    pub fn new(
        config: &BuildConfig,
        vfs: Arc<dyn VirtualFileSystem>,
        service: Arc<dyn CompileService>,
        references: Arc<ReferenceCache>,
    ) -> Self {
        Self {
            service,
            references,
            vfs,
            script_imports: config.script_imports.clone(),
            language_version: config.language_version,
            extra_assemblies: Vec::new(),
            entries: Mutex::new(HashMap::new()),
            compiling: Mutex::new(HashSet::new()),
            compile_done: Condvar::new(),
        }
    }

    /// Extra reference binaries, used when present on disk and loadable
    pub fn with_extra_assemblies(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.extra_assemblies.extend(paths);
        self
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, ScriptCacheEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Wait until no other caller compiles `key`, then claim it
    fn claim(&self, key: &str) -> CompileClaim<'_> {
        let mut compiling = self.compiling.lock().unwrap_or_else(|e| e.into_inner());
        while compiling.contains(key) {
            compiling = self
                .compile_done
                .wait(compiling)
                .unwrap_or_else(|e| e.into_inner());
        }
        compiling.insert(key.to_string());
        CompileClaim {
            cache: self,
            key: key.to_string(),
        }
    }

    fn key(name: &str) -> String {
        name.trim().to_lowercase()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock_entries().contains_key(&Self::key(name))
    }

    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_entries().is_empty()
    }

    pub fn entry(&self, name: &str) -> Option<ScriptCacheEntry> {
        self.lock_entries().get(&Self::key(name)).cloned()
    }

    /// Compile `source` under `name` unless an entry with the same content
    /// hash exists. A failed compile leaves the cache untouched.
    ///
    /// Concurrent calls for the same name run one after another, so the
    /// second sees the first one's entry.
    #[instrument(target = "hotbuild::script", skip(self, source, extra_imports))]
    pub fn precompile(
        &self,
        name: &str,
        source: &str,
        extra_imports: &[String],
    ) -> Result<PrecompileStatus, ScriptError> {
        let hash = content_hash(source, extra_imports);
        let key = Self::key(name);

        // check and insert are atomic per name
        let _claim = self.claim(&key);
        let cached = self
            .lock_entries()
            .get(&key)
            .map(|e| e.content_hash == hash)
            .unwrap_or(false);
        if cached {
            debug!(target: TARGET, name, "cache hit");
            return Ok(PrecompileStatus::Cached);
        }

        let runnable = self.compile(name, source, extra_imports)?;
        self.lock_entries().insert(
            key,
            ScriptCacheEntry {
                name: name.to_string(),
                content_hash: hash,
                runnable,
            },
        );
        info!(target: TARGET, name, "script compiled");
        Ok(PrecompileStatus::Compiled)
    }

    /// Evict `name`, then compile it again
    pub fn recompile(
        &self,
        name: &str,
        source: &str,
        extra_imports: &[String],
    ) -> Result<PrecompileStatus, ScriptError> {
        self.lock_entries().remove(&Self::key(name));
        self.precompile(name, source, extra_imports)
    }

    fn compile(
        &self,
        name: &str,
        source: &str,
        extra_imports: &[String],
    ) -> Result<Arc<dyn Runnable>, ScriptError> {
        let _scope = CycleScope::begin(&self.references, "script");
        let references = self.references.get_or_resolve()?;
        let extra = loadable_paths(self.vfs.as_ref(), &self.extra_assemblies);
        let references = references.with_extra(&extra);

        let text = imports::add_default_imports(
            source,
            &imports::declared_imports(source),
            extra_imports,
        );
        let request = ScriptRequest {
            name: name.to_string(),
            source: text,
            imports: self.script_imports.clone(),
            references: references.paths().to_vec(),
            language_version: self.language_version,
        };

        let build = guarded(|| self.service.compile_script(&request))?;
        match build.runnable {
            Some(runnable) if build.success => Ok(runnable),
            _ => {
                let diagnostics: Vec<String> = build
                    .diagnostics
                    .iter()
                    .filter(|d| d.is_error())
                    .map(|d| report::translate(&d.message))
                    .collect();
                warn!(target: TARGET, name, errors = diagnostics.len(), "script failed to compile");
                Err(ScriptError::Compile {
                    name: name.to_string(),
                    diagnostics,
                })
            }
        }
    }

    fn runnable(&self, name: &str) -> Result<Arc<dyn Runnable>, ScriptError> {
        self.lock_entries()
            .get(&Self::key(name))
            .map(|e| Arc::clone(&e.runnable))
            .ok_or_else(|| ScriptError::NotCompiled {
                name: name.to_string(),
            })
    }

    /// Invoke a cached script, waiting at most `timeout`.
    ///
    /// A timed-out invocation keeps running in the background; the entry
    /// stays valid.
    pub fn run(&self, name: &str, context: Value, timeout: Duration) -> Result<Value, ScriptError> {
        let runnable = self.runnable(name)?;
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let result = catch_unwind(AssertUnwindSafe(|| runnable.invoke(&context)));
            let _ = tx.send(result);
        });

        match rx.recv_timeout(timeout) {
            Ok(Ok(result)) => finish(name, result),
            Ok(Err(payload)) => Err(ScriptError::Execution {
                name: name.to_string(),
                message: panic_message(payload.as_ref()),
            }),
            Err(RecvTimeoutError::Timeout) => Err(timed_out(name, timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(ScriptError::Execution {
                name: name.to_string(),
                message: "script worker exited without a result".to_string(),
            }),
        }
    }

    /// Async form of [`ScriptCache::run`]; the script runs on the blocking pool
    pub async fn run_async(
        &self,
        name: &str,
        context: Value,
        timeout: Duration,
    ) -> Result<Value, ScriptError> {
        let runnable = self.runnable(name)?;
        let handle = tokio::task::spawn_blocking(move || runnable.invoke(&context));

        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(result)) => finish(name, result),
            Ok(Err(join)) => {
                let message = if join.is_panic() {
                    panic_message(join.into_panic().as_ref())
                } else {
                    join.to_string()
                };
                Err(ScriptError::Execution {
                    name: name.to_string(),
                    message,
                })
            }
            Err(_) => Err(timed_out(name, timeout)),
        }
    }

    /// Evict one entry, or all of them; returns the number removed
    pub fn clear(&self, name: Option<&str>) -> usize {
        let mut entries = self.lock_entries();
        let removed = match name {
            Some(name) => entries.remove(&Self::key(name)).map(|_| 1).unwrap_or(0),
            None => {
                let n = entries.len();
                entries.clear();
                n
            }
        };
        debug!(target: TARGET, removed, "script cache cleared");
        removed
    }

    /// Precompile every script file under `dir`, named by file stem.
    /// Individual failures are counted, never fatal.
    #[instrument(target = "hotbuild::script", skip(self, extra_imports), fields(dir = %dir.display()))]
    pub fn precompile_dir(&self, dir: &Path, extra_imports: &[String]) -> Result<BatchSummary, ScriptError> {
        if !self.vfs.is_dir(dir) {
            self.vfs.create_dir_all(dir)?;
            return Ok(BatchSummary::default());
        }

        let mut summary = BatchSummary::default();
        for path in self.vfs.list_files(dir, SCRIPT_EXTENSION, true)? {
            summary.total += 1;
            let name = match path.file_stem() {
                Some(stem) => stem.to_string_lossy().to_string(),
                None => {
                    summary.failed += 1;
                    continue;
                }
            };
            let outcome = self
                .vfs
                .read_file(&path)
                .map_err(ScriptError::from)
                .and_then(|bytes| {
                    let (text, _) = decode_source(&bytes);
                    self.precompile(&name, &text, extra_imports)
                });
            match outcome {
                Ok(_) => summary.succeeded += 1,
                Err(err) => {
                    warn!(target: TARGET, path = %path.display(), %err, "script skipped");
                    summary.failed += 1;
                }
            }
        }
        info!(
            target: TARGET,
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "script batch precompiled"
        );
        Ok(summary)
    }
}

fn finish(name: &str, result: Result<Value, String>) -> Result<Value, ScriptError> {
    result.map_err(|message| ScriptError::Execution {
        name: name.to_string(),
        message,
    })
}

fn timed_out(name: &str, timeout: Duration) -> ScriptError {
    warn!(target: TARGET, name, timeout_ms = timeout.as_millis() as u64, "script timed out");
    ScriptError::Timeout {
        name: name.to_string(),
        timeout_ms: timeout.as_millis(),
    }
}
