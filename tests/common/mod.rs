//! 测试辅助工具
//!
//! An in-memory workspace wired to the scripted compile service.

#![allow(dead_code)]

use hotbuild::orchestrator::testing::{fake_dll, ScriptedCompileService};
use hotbuild::{BuildConfig, Diagnostic, Engine, MemoryFileSystem, ReferenceRoots, VirtualFileSystem, Workspace};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const BASE: &str = "/host/hotbuild";

pub struct Harness {
    pub fs: MemoryFileSystem,
    pub service: Arc<ScriptedCompileService>,
    pub workspace: Workspace,
    pub engine: Engine,
}

impl Harness {
    pub fn new(config: BuildConfig) -> Self {
        Self::with_service(config, ScriptedCompileService::new())
    }

    pub fn with_service(config: BuildConfig, service: ScriptedCompileService) -> Self {
        let fs = MemoryFileSystem::new();
        let workspace = Workspace::new(BASE);
        fs.write_file(&workspace.assemblies_dir().join("TShockAPI.dll"), &fake_dll())
            .expect("seed reference");
        let service = Arc::new(service);
        let engine = Engine::new(
            config,
            workspace.clone(),
            Arc::new(fs.clone()),
            service.clone(),
            ReferenceRoots::for_workspace(&workspace),
        );
        Self {
            fs,
            service,
            workspace,
            engine,
        }
    }

    /// Write a source file under the workspace source folder
    pub fn source(&self, relative: &str, text: &str) -> PathBuf {
        let path = self.workspace.source_dir().join(relative);
        self.fs.write_file(&path, text.as_bytes()).expect("write source");
        path
    }

    pub fn artifact(&self, name: &str) -> PathBuf {
        self.workspace.output_dir().join(name)
    }

    pub fn exists(&self, path: &Path) -> bool {
        self.fs.is_file(path)
    }

    pub fn logs(&self) -> Vec<PathBuf> {
        self.fs
            .list_files(&self.workspace.logs_dir(), "txt", false)
            .unwrap_or_default()
    }

    pub fn read(&self, path: &Path) -> String {
        String::from_utf8(self.fs.read_file(path).expect("read file")).expect("utf-8 file")
    }
}

/// Defaults without the default import list, so emitted text equals input
pub fn plain_config() -> BuildConfig {
    BuildConfig {
        default_imports: Vec::new(),
        ..BuildConfig::default()
    }
}

pub fn missing_type(name: &str) -> Diagnostic {
    Diagnostic::error(format!(
        "The type or namespace name '{}' could not be found (are you missing a using directive or an assembly reference?)",
        name
    ))
    .with_code("CS0246")
}
