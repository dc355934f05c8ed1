//! Hotbuild Orchestrator
//!
//! Hot-compilation engine: source ingestion, import rewriting, namespace
//! grouping, reference resolution, the self-healing compile loop, failure
//! reporting and the script cache.

pub mod error;
pub mod grouping;
pub mod imports;
pub mod ingest;
pub mod orchestrator;
pub mod process;
pub mod reclaim;
pub mod references;
pub mod report;
pub mod retry;
pub mod script;
pub mod service;
pub mod syntax;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{
    BuildFailure, FailureKind, IngestError, OrchestratorError, ReferenceError, ScriptError,
    ServiceError,
};
pub use grouping::CompilationGroup;
pub use ingest::{IngestReport, ParsedUnit, SkipReason, SkippedFile, SourceIngestor, SourceUnit};
pub use orchestrator::{
    BuildReport, BuildState, CompileOutcome, GroupOutcome, Orchestrator, StopReason,
    WorkspaceSummary,
};
pub use process::ProcessCompileService;
pub use reclaim::CycleScope;
pub use references::{ReferenceCache, ReferenceResolver, ReferenceRoots, ReferenceSet};
pub use report::DiagnosticReporter;
pub use script::{BatchSummary, PrecompileStatus, ScriptCache, ScriptCacheEntry};
pub use service::{
    CompileService, Diagnostic, EmitOutput, EmitPolicy, EmitRequest, Runnable, ScriptBuild,
    ScriptRequest, Severity, SourceFile, SyntaxNode, SyntaxTree,
};

use hotbuild_config::{BuildConfig, Workspace};
use hotbuild_vfs::VirtualFileSystem;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// The build orchestrator and script cache wired to one shared reference
/// cache
pub struct Engine {
    orchestrator: Orchestrator,
    scripts: ScriptCache,
    vfs: Arc<dyn VirtualFileSystem>,
}

impl Engine {
    pub fn new(
        config: BuildConfig,
        workspace: Workspace,
        vfs: Arc<dyn VirtualFileSystem>,
        service: Arc<dyn CompileService>,
        roots: ReferenceRoots,
    ) -> Self {
        let references = Arc::new(ReferenceCache::new(ReferenceResolver::new(
            Arc::clone(&vfs),
            roots,
            &config,
        )));
        let scripts = ScriptCache::new(
            &config,
            Arc::clone(&vfs),
            Arc::clone(&service),
            Arc::clone(&references),
        );
        let orchestrator =
            Orchestrator::new(config, workspace, Arc::clone(&vfs), service, references);
        Self {
            orchestrator,
            scripts,
            vfs,
        }
    }

    /// Replace the script cache, e.g. to add extra assemblies
    pub fn with_scripts(mut self, build: impl FnOnce(ScriptCache) -> ScriptCache) -> Self {
        self.scripts = build(self.scripts);
        self
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn scripts(&self) -> &ScriptCache {
        &self.scripts
    }

    /// Load a script file, compile it under its file stem unless cached, and
    /// run it with `context`
    pub fn run_script_file(
        &self,
        path: &Path,
        context: Value,
        timeout: Duration,
    ) -> Result<Value, OrchestratorError> {
        let bytes = self.vfs.read_file(path)?;
        let (source, _) = ingest::decode_source(&bytes);
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "script".to_string());
        self.scripts.precompile(&name, &source, &[])?;
        Ok(self.scripts.run(&name, context, timeout)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fake_dll, ScriptedCompileService};
    use hotbuild_vfs::MemoryFileSystem;
    use serde_json::json;

    #[test]
    fn test_engine_shares_reference_cache() {
        let fs = MemoryFileSystem::with_files([
            ("/w/assemblies/A.dll", fake_dll()),
            ("/w/source/a.cs", b"namespace Foo { class A {} }".to_vec()),
        ]);
        let workspace = Workspace::new("/w");
        let roots = ReferenceRoots::for_workspace(&workspace);
        let engine = Engine::new(
            BuildConfig::default(),
            workspace,
            Arc::new(fs.clone()),
            Arc::new(ScriptedCompileService::new()),
            roots,
        );

        let report = engine.orchestrator().build().unwrap();
        assert!(report.all_succeeded());
        assert!(fs.is_file(Path::new("/w/compiled output/Foo.dll")));

        engine.scripts().precompile("s", "return 1;", &[]).unwrap();
        assert!(engine.scripts().contains("s"));
        assert!(!engine.orchestrator().references().is_cached());
    }

    fn engine(fs: &MemoryFileSystem) -> Engine {
        let workspace = Workspace::new("/w");
        let roots = ReferenceRoots::for_workspace(&workspace);
        Engine::new(
            BuildConfig::default(),
            workspace,
            Arc::new(fs.clone()),
            Arc::new(ScriptedCompileService::new()),
            roots,
        )
    }

    #[test]
    fn test_run_script_file() {
        let fs = MemoryFileSystem::with_files([
            ("/w/assemblies/Host.dll", fake_dll()),
            ("/w/scripts/Greet.csx", b"return 1;".to_vec()),
        ]);
        let engine = engine(&fs);
        let value = engine
            .run_script_file(Path::new("/w/scripts/Greet.csx"), json!({"n": 1}), Duration::from_secs(5))
            .unwrap();
        assert_eq!(value["script"], json!("Greet"));
        assert!(engine.scripts().contains("greet"));
    }

    #[test]
    fn test_run_script_file_reports_the_failing_stage() {
        let fs = MemoryFileSystem::with_files([
            ("/w/assemblies/Host.dll", fake_dll()),
            ("/w/scripts/Bad.csx", b"#error".to_vec()),
        ]);
        let engine = engine(&fs);
        let timeout = Duration::from_secs(5);

        let missing = engine.run_script_file(Path::new("/w/scripts/Gone.csx"), json!(null), timeout);
        assert!(matches!(missing, Err(OrchestratorError::Vfs(_))));

        let failed = engine.run_script_file(Path::new("/w/scripts/Bad.csx"), json!(null), timeout);
        assert!(matches!(failed, Err(OrchestratorError::Script(_))));
        assert!(!engine.scripts().contains("Bad"));
    }
}
