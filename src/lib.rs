//! Hotbuild - hot compilation for long-running hosts
//!
//! Compiles user-submitted plugin sources into loadable binaries on demand,
//! one binary per root namespace, and keeps a content-hashed cache of
//! single-unit scripts.
//!
//! # Architecture
//!
//! ```text
//! hotbuild-config        - configuration document and workspace layout (no IO)
//! hotbuild-vfs           - file system abstraction (native / in-memory)
//! hotbuild-orchestrator  - ingestion, grouping, references, retry loop, reports, scripts
//! hotbuild-cli           - `hotbuild` command line front end
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use hotbuild::{BuildConfig, Engine, NativeFileSystem, ProcessCompileService, ReferenceRoots, Workspace};
//! use std::sync::Arc;
//!
//! let workspace = Workspace::new("/srv/host/hotbuild");
//! let engine = Engine::new(
//!     BuildConfig::default(),
//!     workspace.clone(),
//!     Arc::new(NativeFileSystem::new()),
//!     Arc::new(ProcessCompileService::new("hotbuild-compiler")),
//!     ReferenceRoots::for_workspace(&workspace).with_host("/srv/host"),
//! );
//! let report = engine.orchestrator().build()?;
//! println!("{}", report.summary());
//! ```

pub use hotbuild_config as config;
pub use hotbuild_orchestrator as orchestrator;
pub use hotbuild_vfs as vfs;

pub use hotbuild_config::{BuildConfig, LanguageVersion, Stage, Workspace};
pub use hotbuild_orchestrator::{
    BuildFailure, BuildReport, BuildState, CompileService, Diagnostic, Engine, FailureKind,
    GroupOutcome, Orchestrator, PrecompileStatus, ProcessCompileService, ReferenceRoots,
    ScriptCache, ScriptError,
};
pub use hotbuild_vfs::{MemoryFileSystem, NativeFileSystem, VirtualFileSystem};
