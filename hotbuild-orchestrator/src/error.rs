//! Error types for the orchestrator

use hotbuild_vfs::VfsError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Main orchestrator error type
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("ingest error: {0}")]
    Ingest(#[from] IngestError),

    #[error("reference error: {0}")]
    Reference(#[from] ReferenceError),

    #[error("compile service error: {0}")]
    Service(#[from] ServiceError),

    #[error("script error: {0}")]
    Script(#[from] ScriptError),

    #[error("file system error: {0}")]
    Vfs(#[from] VfsError),
}

/// Failure of the external compile service itself (not a compile error)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    /// The service ran out of memory; callers should shrink the input
    #[error("compile service ran out of memory: {0}")]
    OutOfMemory(String),

    /// The service panicked while handling a request
    #[error("compile service crashed: {0}")]
    Crashed(String),

    #[error("compile service transport failed: {0}")]
    Transport(String),

    #[error("compile service protocol error: {0}")]
    Protocol(String),

    #[error("compile service rejected the request: {0}")]
    Rejected(String),
}

impl ServiceError {
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(self, ServiceError::OutOfMemory(_))
    }
}

/// Batch-level ingestion failures; per-file problems are skip records instead
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("source directory did not exist and was created: {}", .0.display())]
    SourceRootCreated(PathBuf),

    #[error("too many source files: {count} (limit {limit})")]
    TooManyFiles { count: usize, limit: usize },

    #[error("source files too large: {size_mb} MB (limit {limit_mb} MB)")]
    TooLarge { size_mb: u64, limit_mb: u64 },

    #[error("cannot enumerate sources: {0}")]
    Vfs(#[from] VfsError),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Reference-set resolution failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReferenceError {
    #[error("no usable reference assemblies were found")]
    Empty,
}

/// Script cache failures, each a distinct reported kind
#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("script '{name}' is not compiled")]
    NotCompiled { name: String },

    #[error("script '{name}' timed out after {timeout_ms} ms")]
    Timeout { name: String, timeout_ms: u128 },

    #[error("script '{name}' failed: {message}")]
    Execution { name: String, message: String },

    #[error("script '{name}' failed to compile: {}", .diagnostics.join("; "))]
    Compile {
        name: String,
        diagnostics: Vec<String>,
    },

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Reference(#[from] ReferenceError),

    #[error(transparent)]
    Vfs(#[from] VfsError),
}

/// Category tag of a failed build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Caps exceeded, engine disabled, or the source root was missing
    InputRejected,
    /// Nothing left to compile after ingestion
    NoEligibleFiles,
    /// The reference set resolved to nothing
    NoReferences,
    /// The compile service ran out of memory
    ResourceExhausted,
    /// The compile service failed outside a compile error
    Service,
    /// Workspace I/O failed
    Io,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::InputRejected => "input rejected",
            FailureKind::NoEligibleFiles => "no eligible files",
            FailureKind::NoReferences => "no references",
            FailureKind::ResourceExhausted => "resource exhausted",
            FailureKind::Service => "compile service failure",
            FailureKind::Io => "io failure",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A build that produced no per-group outcomes
#[derive(Debug, Clone, PartialEq)]
pub struct BuildFailure {
    pub kind: FailureKind,
    pub message: String,
    /// Actionable suggestions for the user
    pub hints: Vec<String>,
}

impl BuildFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            hints: Vec::new(),
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hints.push(hint.into());
        self
    }
}

impl fmt::Display for BuildFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        for hint in &self.hints {
            write!(f, "\n  - {}", hint)?;
        }
        Ok(())
    }
}

impl std::error::Error for BuildFailure {}

impl From<IngestError> for BuildFailure {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::SourceRootCreated(_) => {
                BuildFailure::new(FailureKind::InputRejected, err.to_string())
                    .with_hint("place source files in the created directory and build again")
            }
            IngestError::TooManyFiles { .. } | IngestError::TooLarge { .. } => {
                BuildFailure::new(FailureKind::InputRejected, err.to_string())
                    .with_hint("split the submission or raise maxFiles / maxSizeMB")
            }
            IngestError::Vfs(_) => BuildFailure::new(FailureKind::Io, err.to_string()),
            IngestError::Service(service) => service.into(),
        }
    }
}

impl From<ServiceError> for BuildFailure {
    fn from(err: ServiceError) -> Self {
        if err.is_resource_exhaustion() {
            BuildFailure::new(FailureKind::ResourceExhausted, err.to_string())
                .with_hint("reduce the number or size of source files")
        } else {
            BuildFailure::new(FailureKind::Service, err.to_string())
        }
    }
}

impl From<ReferenceError> for BuildFailure {
    fn from(err: ReferenceError) -> Self {
        BuildFailure::new(FailureKind::NoReferences, err.to_string())
            .with_hint("check the assemblies folder")
            .with_hint("check the host and runtime install directories")
    }
}

impl From<VfsError> for BuildFailure {
    fn from(err: VfsError) -> Self {
        BuildFailure::new(FailureKind::Io, err.to_string())
    }
}
