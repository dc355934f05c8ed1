//! Compilation orchestrator
//!
//! Drives one full build cycle: ingest, group, resolve references, then
//! compile every group through the bounded self-healing retry loop. At most
//! one cycle runs at a time per orchestrator.

use crate::error::{BuildFailure, FailureKind, ServiceError};
use crate::grouping::{self, CompilationGroup};
use crate::ingest::{SkippedFile, SourceIngestor, SOURCE_EXTENSION};
use crate::reclaim::CycleScope;
use crate::references::{ReferenceCache, ReferenceSet, BINARY_EXTENSION};
use crate::report::{self, DiagnosticReporter};
use crate::retry;
use crate::service::{guarded, CompileService, Diagnostic, EmitOutput, EmitPolicy, EmitRequest};
use hotbuild_config::{BuildConfig, Workspace};
use hotbuild_vfs::{VfsError, VirtualFileSystem};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

const TARGET: &str = "hotbuild::compile";

/// Extension of debug-symbol artifacts
pub const SYMBOLS_EXTENSION: &str = "pdb";

/// Observable state of the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Idle,
    Ingesting,
    Compiling,
    Retrying,
    Success,
    Failed,
}

/// Why a group stopped without success
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// No error was a missing-symbol error
    NotRetryable,
    /// Missing-symbol errors remained but no import matched them
    NothingToRemove,
    RetriesExhausted,
    /// The compile service failed outside a compile error
    ServiceFailure,
    /// Artifacts could not be written
    ArtifactWriteFailed,
}

/// Result of the last compile attempt for one group
#[derive(Debug, Clone, PartialEq)]
pub struct CompileOutcome {
    pub success: bool,
    /// In the order the service emitted them
    pub diagnostics: Vec<Diagnostic>,
    /// Binary, then the debug-symbol file when one was produced
    pub artifact_paths: Vec<PathBuf>,
}

impl CompileOutcome {
    pub fn error_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_error()).count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupOutcome {
    pub key: String,
    pub full_namespace: String,
    pub plugin_name: Option<String>,
    pub files: Vec<PathBuf>,
    /// Compile attempts made, at most `retry_count + 1`
    pub attempts: u32,
    /// Import directives removed by the retry loop
    pub removed_imports: usize,
    pub outcome: CompileOutcome,
    pub stop_reason: Option<StopReason>,
    pub log_file: Option<PathBuf>,
    pub message: Option<String>,
}

impl GroupOutcome {
    pub fn succeeded(&self) -> bool {
        self.outcome.success
    }
}

/// Outcome of one full build
#[derive(Debug, Clone, PartialEq)]
pub struct BuildReport {
    /// Files that reached grouping
    pub files: usize,
    pub skipped: Vec<SkippedFile>,
    pub groups: Vec<GroupOutcome>,
    pub elapsed: Duration,
}

impl BuildReport {
    pub fn all_succeeded(&self) -> bool {
        self.groups.iter().all(GroupOutcome::succeeded)
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &GroupOutcome> {
        self.groups.iter().filter(|g| g.succeeded())
    }

    pub fn failed(&self) -> impl Iterator<Item = &GroupOutcome> {
        self.groups.iter().filter(|g| !g.succeeded())
    }

    pub fn artifact_count(&self) -> usize {
        self.groups
            .iter()
            .flat_map(|g| g.outcome.artifact_paths.iter())
            .filter(|p| p.extension().map(|e| e == BINARY_EXTENSION).unwrap_or(false))
            .count()
    }

    pub fn summary(&self) -> String {
        format!(
            "compiled {} files in {} ms, produced {} artifacts ({} of {} groups failed)",
            self.files,
            self.elapsed.as_millis(),
            self.artifact_count(),
            self.failed().count(),
            self.groups.len()
        )
    }
}

/// Fixed roots and their current file counts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceSummary {
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
    pub assemblies_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub source_files: usize,
    pub artifacts: usize,
    pub assemblies: usize,
    pub logs: usize,
}

impl fmt::Display for WorkspaceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "source:     {} ({} files)", self.source_dir.display(), self.source_files)?;
        writeln!(f, "output:     {} ({} artifacts)", self.output_dir.display(), self.artifacts)?;
        writeln!(f, "assemblies: {} ({} binaries)", self.assemblies_dir.display(), self.assemblies)?;
        write!(f, "logs:       {} ({} logs)", self.logs_dir.display(), self.logs)
    }
}

struct GroupCompile {
    attempts: u32,
    removed_imports: usize,
    output: EmitOutput,
    stop_reason: Option<StopReason>,
}

/// The build engine
pub struct Orchestrator {
    config: BuildConfig,
    workspace: Workspace,
    vfs: Arc<dyn VirtualFileSystem>,
    service: Arc<dyn CompileService>,
    references: Arc<ReferenceCache>,
    reporter: DiagnosticReporter,
    build_lock: Mutex<()>,
    state: Mutex<BuildState>,
}

impl Orchestrator {
    pub fn new(
        config: BuildConfig,
        workspace: Workspace,
        vfs: Arc<dyn VirtualFileSystem>,
        service: Arc<dyn CompileService>,
        references: Arc<ReferenceCache>,
    ) -> Self {
        let reporter = DiagnosticReporter::new(
            Arc::clone(&vfs),
            workspace.logs_dir(),
            config.show_original_errors,
            config.show_translated_errors,
        );
        Self {
            config,
            workspace,
            vfs,
            service,
            references,
            reporter,
            build_lock: Mutex::new(()),
            state: Mutex::new(BuildState::Idle),
        }
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn references(&self) -> &Arc<ReferenceCache> {
        &self.references
    }

    pub fn reporter(&self) -> &DiagnosticReporter {
        &self.reporter
    }

    pub fn state(&self) -> BuildState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, next: BuildState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state != next {
            debug!(target: TARGET, from = ?*state, to = ?next, "state transition");
            *state = next;
        }
    }

    /// Build everything under the workspace source root
    pub fn build(&self) -> Result<BuildReport, BuildFailure> {
        let root = self.workspace.source_dir();
        self.build_dir(&root)
    }

    /// Build everything under `root`
    #[instrument(target = "hotbuild::compile", skip(self), fields(root = %root.display()))]
    pub fn build_dir(&self, root: &Path) -> Result<BuildReport, BuildFailure> {
        let _guard = self.build_lock.lock().unwrap_or_else(|e| e.into_inner());
        let result = self.run_cycle(root);
        match &result {
            Ok(report) if report.all_succeeded() => self.set_state(BuildState::Success),
            _ => self.set_state(BuildState::Failed),
        }
        result
    }

    fn run_cycle(&self, root: &Path) -> Result<BuildReport, BuildFailure> {
        if !self.config.enabled {
            return Err(BuildFailure::new(FailureKind::InputRejected, "compilation is disabled")
                .with_hint("enable compilation in the configuration"));
        }

        let scope = CycleScope::begin(&self.references, "build");
        self.set_state(BuildState::Ingesting);
        self.clean_output();

        let ingest = SourceIngestor::new(self.vfs.as_ref(), self.service.as_ref(), &self.config)
            .ingest(root)?;
        if let Some(summary) = report::skip_summary(&ingest.skipped) {
            warn!(target: "hotbuild::ingest", "{}", summary.trim_end());
        }
        if ingest.units.is_empty() {
            let mut failure = BuildFailure::new(
                FailureKind::NoEligibleFiles,
                format!("no eligible source files in {}", root.display()),
            )
            .with_hint("place .cs files in the source folder");
            if !ingest.skipped.is_empty() {
                failure = failure.with_hint("fix or remove the skipped files");
            }
            return Err(failure);
        }

        let files = ingest.units.len();
        let skipped = ingest.skipped;
        let groups = grouping::group_units(ingest.units, &self.config.plugin_base_type);
        info!(target: "hotbuild::group", groups = groups.len(), files, "sources grouped");

        let references = self.references.get_or_resolve()?;

        let mut outcomes = Vec::with_capacity(groups.len());
        for group in &groups {
            outcomes.push(self.build_group(group, &references)?);
        }

        if outcomes.iter().all(GroupOutcome::succeeded) && self.config.clear_logs_on_success {
            let removed = self.reporter.clear_logs();
            if removed > 0 {
                debug!(target: "hotbuild::report", removed, "old failure logs cleared");
            }
        }

        let report = BuildReport {
            files,
            skipped,
            groups: outcomes,
            elapsed: scope.elapsed(),
        };
        info!(target: TARGET, "{}", report.summary());
        Ok(report)
    }

    /// Compile one group and persist its artifacts or failure log.
    /// Only resource exhaustion escapes as an error.
    fn build_group(
        &self,
        group: &CompilationGroup,
        references: &ReferenceSet,
    ) -> Result<GroupOutcome, BuildFailure> {
        let mut outcome = GroupOutcome {
            key: group.key.clone(),
            full_namespace: group.full_namespace.clone(),
            plugin_name: group.plugin_name.clone(),
            files: group.files.iter().map(|u| u.path.clone()).collect(),
            attempts: 0,
            removed_imports: 0,
            outcome: CompileOutcome {
                success: false,
                diagnostics: Vec::new(),
                artifact_paths: Vec::new(),
            },
            stop_reason: None,
            log_file: None,
            message: None,
        };

        let compiled = match self.compile_group(group, references) {
            Ok(compiled) => compiled,
            Err(err) if err.is_resource_exhaustion() => {
                error!(target: TARGET, group = %group.key, %err, "out of memory, aborting build");
                return Err(err.into());
            }
            Err(err) => {
                error!(target: TARGET, group = %group.key, %err, "compile service failed");
                outcome.stop_reason = Some(StopReason::ServiceFailure);
                outcome.message = Some(err.to_string());
                return Ok(outcome);
            }
        };

        outcome.attempts = compiled.attempts;
        outcome.removed_imports = compiled.removed_imports;
        outcome.stop_reason = compiled.stop_reason;
        outcome.outcome.diagnostics = compiled.output.diagnostics.clone();

        if compiled.output.success {
            match self.write_artifacts(&group.key, &compiled.output) {
                Ok(paths) => {
                    info!(
                        target: TARGET,
                        group = %group.display_name(),
                        attempts = compiled.attempts,
                        "group compiled"
                    );
                    outcome.outcome.success = true;
                    outcome.outcome.artifact_paths = paths;
                }
                Err(err) => {
                    error!(target: TARGET, group = %group.key, %err, "cannot write artifacts");
                    outcome.stop_reason = Some(StopReason::ArtifactWriteFailed);
                    outcome.message = Some(err.to_string());
                }
            }
            return Ok(outcome);
        }

        error!(
            target: "hotbuild::report",
            "{}",
            report::console_summary(group.display_name(), &compiled.output.diagnostics).trim_end()
        );
        match self
            .reporter
            .write_failure_log(&group.key, group.display_name(), &compiled.output.diagnostics)
        {
            Ok(path) => outcome.log_file = Some(path),
            Err(err) => warn!(target: "hotbuild::report", %err, "cannot save failure log"),
        }
        Ok(outcome)
    }

    /// The retry loop: compile, and on missing-symbol failures remove the
    /// related imports and compile again, at most `retry_count` more times.
    fn compile_group(
        &self,
        group: &CompilationGroup,
        references: &ReferenceSet,
    ) -> Result<GroupCompile, ServiceError> {
        let mut request = EmitRequest {
            assembly_name: report::safe_name(&group.key),
            sources: group.sources(),
            language_version: self.config.language_version,
            references: references.paths().to_vec(),
            policy: EmitPolicy::fixed(),
        };
        let mut remaining = self.config.retry_count;
        let mut attempts = 0;
        let mut removed_total = 0;

        loop {
            self.set_state(BuildState::Compiling);
            attempts += 1;
            debug!(target: TARGET, group = %group.key, attempt = attempts, "compiling");
            let output = guarded(|| self.service.emit(&request))?;

            if output.success {
                return Ok(GroupCompile {
                    attempts,
                    removed_imports: removed_total,
                    output,
                    stop_reason: None,
                });
            }

            let stop = if !retry::is_retry_eligible(&output.diagnostics) {
                Some(StopReason::NotRetryable)
            } else if remaining == 0 {
                Some(StopReason::RetriesExhausted)
            } else {
                let offending = retry::offending_names(&output.diagnostics);
                let removed = retry::prune_imports(&mut request.sources, &offending);
                if removed == 0 {
                    Some(StopReason::NothingToRemove)
                } else {
                    info!(
                        target: TARGET,
                        group = %group.key,
                        removed,
                        names = ?offending,
                        "removed unresolved imports, retrying"
                    );
                    removed_total += removed;
                    remaining -= 1;
                    None
                }
            };

            if let Some(reason) = stop {
                debug!(target: TARGET, group = %group.key, ?reason, attempts, "giving up");
                return Ok(GroupCompile {
                    attempts,
                    removed_imports: removed_total,
                    output,
                    stop_reason: Some(reason),
                });
            }
            self.set_state(BuildState::Retrying);
        }
    }

    fn write_artifacts(&self, key: &str, output: &EmitOutput) -> Result<Vec<PathBuf>, VfsError> {
        let dir = self.workspace.output_dir();
        self.vfs.create_dir_all(&dir)?;
        let name = report::safe_name(key);

        let binary = dir.join(format!("{}.{}", name, BINARY_EXTENSION));
        self.vfs.write_file(&binary, &output.binary)?;
        let mut paths = vec![binary];

        if let Some(symbols) = &output.debug_symbols {
            let pdb = dir.join(format!("{}.{}", name, SYMBOLS_EXTENSION));
            self.vfs.write_file(&pdb, symbols)?;
            paths.push(pdb);
        }
        Ok(paths)
    }

    /// Delete previous binaries and symbol files; failures are only logged
    fn clean_output(&self) {
        let dir = self.workspace.output_dir();
        if !self.vfs.is_dir(&dir) {
            if let Err(err) = self.vfs.create_dir_all(&dir) {
                warn!(target: TARGET, %err, "cannot create output directory");
            }
            return;
        }
        for extension in [BINARY_EXTENSION, SYMBOLS_EXTENSION] {
            let files = match self.vfs.list_files(&dir, extension, false) {
                Ok(files) => files,
                Err(err) => {
                    warn!(target: TARGET, %err, "cannot list old artifacts");
                    continue;
                }
            };
            for file in files {
                if let Err(err) = self.vfs.remove_file(&file) {
                    warn!(target: TARGET, path = %file.display(), %err, "cannot delete old artifact");
                }
            }
        }
    }

    /// Delete every file under the source root; returns the count
    pub fn clean_sources(&self) -> Result<usize, VfsError> {
        let _guard = self.build_lock.lock().unwrap_or_else(|e| e.into_inner());
        let dir = self.workspace.source_dir();
        if !self.vfs.is_dir(&dir) {
            self.vfs.create_dir_all(&dir)?;
            return Ok(0);
        }
        let files = self.vfs.list_files(&dir, "", true)?;
        let mut removed = 0;
        for file in &files {
            match self.vfs.remove_file(file) {
                Ok(()) => removed += 1,
                Err(err) => {
                    warn!(target: "hotbuild::ingest", path = %file.display(), %err, "cannot delete source file")
                }
            }
        }
        info!(target: "hotbuild::ingest", removed, failed = files.len() - removed, "source directory cleaned");
        Ok(removed)
    }

    /// File names of the binaries in the output root
    pub fn list_artifacts(&self) -> Result<Vec<String>, VfsError> {
        let dir = self.workspace.output_dir();
        if !self.vfs.is_dir(&dir) {
            return Ok(Vec::new());
        }
        Ok(self
            .vfs
            .list_files(&dir, BINARY_EXTENSION, false)?
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
            .collect())
    }

    pub fn describe_paths(&self) -> WorkspaceSummary {
        let count = |dir: &Path, extension: &str, recursive: bool| {
            self.vfs
                .list_files(dir, extension, recursive)
                .map(|f| f.len())
                .unwrap_or(0)
        };
        let ws = &self.workspace;
        WorkspaceSummary {
            source_files: count(&ws.source_dir(), SOURCE_EXTENSION, self.config.include_subdirectories),
            artifacts: count(&ws.output_dir(), BINARY_EXTENSION, false),
            assemblies: count(&ws.assemblies_dir(), BINARY_EXTENSION, true),
            logs: count(&ws.logs_dir(), report::LOG_EXTENSION, false),
            source_dir: ws.source_dir(),
            output_dir: ws.output_dir(),
            assemblies_dir: ws.assemblies_dir(),
            logs_dir: ws.logs_dir(),
        }
    }
}
