//! Compile service boundary
//!
//! Lexical, syntactic and semantic analysis plus binary emission belong to an
//! external service. The engine sees it through [`CompileService`] and a small,
//! explicit syntax outline: just enough structure to read imports, namespaces,
//! public types and the plugin name property.

use crate::error::ServiceError;
use hotbuild_config::LanguageVersion;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

/// Diagnostic severity reported by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// One compiler message. Never mutated once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub severity: Severity,
    /// Service diagnostic code (e.g. `CS0246`), when the service reports one
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
    #[serde(default)]
    pub source_file: Option<PathBuf>,
    /// 1-based line number
    #[serde(default)]
    pub line: Option<u32>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code: None,
            message: message.into(),
            source_file: None,
            line: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn at(mut self, file: impl Into<PathBuf>, line: u32) -> Self {
        self.source_file = Some(file.into());
        self.line = Some(line);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Expression shape the engine cares about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "lowercase")]
pub enum Expr {
    /// A string literal, unquoted
    Literal(String),
    Other(String),
}

/// How a property produces its value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum PropertyValue {
    /// `Name => expr;`
    ExpressionBody { expr: Expr },
    /// `Name { get { ... return expr; } }`; only the first return is kept
    Getter {
        #[serde(default)]
        first_return: Option<Expr>,
    },
    Auto,
}

/// Node kinds of the syntax outline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SyntaxNode {
    /// An import directive. `text` is the service's own rendering of it.
    Using {
        target: String,
        text: String,
        #[serde(default)]
        is_global: bool,
        #[serde(default)]
        alias: Option<String>,
    },
    Namespace {
        name: String,
        #[serde(default)]
        file_scoped: bool,
        #[serde(default)]
        members: Vec<SyntaxNode>,
    },
    Type {
        kind: String,
        name: String,
        #[serde(default)]
        modifiers: Vec<String>,
        #[serde(default)]
        bases: Vec<String>,
        #[serde(default)]
        members: Vec<SyntaxNode>,
    },
    Property {
        name: String,
        value: PropertyValue,
    },
    Other,
}

/// Parsed form of one source file, owned by the engine until the cycle ends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyntaxTree {
    pub path: PathBuf,
    #[serde(default)]
    pub outline: Vec<SyntaxNode>,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}

impl SyntaxTree {
    pub fn error_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_error()).count()
    }

    /// The service's rendering of every import in the file, in order
    pub fn import_texts(&self) -> Vec<String> {
        let mut out = Vec::new();
        collect_imports(&self.outline, &mut out);
        out
    }
}

fn collect_imports(nodes: &[SyntaxNode], out: &mut Vec<String>) {
    for node in nodes {
        match node {
            SyntaxNode::Using { text, .. } => out.push(text.clone()),
            SyntaxNode::Namespace { members, .. } => collect_imports(members, out),
            _ => {}
        }
    }
}

/// A source text with its filesystem identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: PathBuf,
    pub text: String,
}

/// Emission policy. These are constants, not per-call options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmitPolicy {
    pub output_kind: String,
    pub optimization: String,
    pub overflow_checks: bool,
    pub allow_unsafe: bool,
    pub debug_symbols: bool,
}

impl EmitPolicy {
    pub fn fixed() -> Self {
        Self {
            output_kind: "DynamicallyLinkedLibrary".to_string(),
            optimization: "Release".to_string(),
            overflow_checks: false,
            allow_unsafe: true,
            debug_symbols: true,
        }
    }
}

/// One emit call: a named unit, its ordered sources and the reference set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmitRequest {
    pub assembly_name: String,
    pub sources: Vec<SourceFile>,
    pub language_version: LanguageVersion,
    pub references: Vec<PathBuf>,
    pub policy: EmitPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmitOutput {
    pub success: bool,
    #[serde(default)]
    pub binary: Vec<u8>,
    #[serde(default)]
    pub debug_symbols: Option<Vec<u8>>,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}

/// A single script unit compile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptRequest {
    pub name: String,
    pub source: String,
    pub imports: Vec<String>,
    pub references: Vec<PathBuf>,
    pub language_version: LanguageVersion,
}

/// Invocable handle bound at compile time to one set of references and imports
pub trait Runnable: Send + Sync {
    fn invoke(&self, context: &serde_json::Value) -> Result<serde_json::Value, String>;
}

pub struct ScriptBuild {
    pub success: bool,
    pub diagnostics: Vec<Diagnostic>,
    /// Present exactly when `success` is true
    pub runnable: Option<Arc<dyn Runnable>>,
}

impl std::fmt::Debug for ScriptBuild {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptBuild")
            .field("success", &self.success)
            .field("diagnostics", &self.diagnostics)
            .field("runnable", &self.runnable.is_some())
            .finish()
    }
}

/// The external compiler. Synchronous, opaque, and never retried by itself.
pub trait CompileService: Send + Sync {
    /// Service name for logging
    fn name(&self) -> &str;

    fn parse(
        &self,
        source: &SourceFile,
        language_version: LanguageVersion,
    ) -> Result<SyntaxTree, ServiceError>;

    fn emit(&self, request: &EmitRequest) -> Result<EmitOutput, ServiceError>;

    fn compile_script(&self, request: &ScriptRequest) -> Result<ScriptBuild, ServiceError>;
}

/// Run a service call, turning a panic into `ServiceError::Crashed`
pub(crate) fn guarded<T>(
    call: impl FnOnce() -> Result<T, ServiceError>,
) -> Result<T, ServiceError> {
    match catch_unwind(AssertUnwindSafe(call)) {
        Ok(result) => result,
        Err(payload) => Err(ServiceError::Crashed(panic_message(payload.as_ref()))),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guarded_catches_panic() {
        let result: Result<(), ServiceError> = guarded(|| panic!("compiler exploded"));
        assert_eq!(
            result.unwrap_err(),
            ServiceError::Crashed("compiler exploded".to_string())
        );
    }

    #[test]
    fn test_guarded_passes_through() {
        let result = guarded(|| Ok::<_, ServiceError>(7));
        assert_eq!(result.unwrap(), 7);
        let result: Result<(), _> = guarded(|| Err(ServiceError::OutOfMemory("x".into())));
        assert!(result.unwrap_err().is_resource_exhaustion());
    }

    #[test]
    fn test_import_texts_in_order() {
        let tree = SyntaxTree {
            path: PathBuf::from("/a.cs"),
            outline: vec![
                SyntaxNode::Using {
                    target: "System".into(),
                    text: "using System;".into(),
                    is_global: false,
                    alias: None,
                },
                SyntaxNode::Namespace {
                    name: "Foo".into(),
                    file_scoped: false,
                    members: vec![SyntaxNode::Using {
                        target: "System.Linq".into(),
                        text: "using System.Linq;".into(),
                        is_global: false,
                        alias: None,
                    }],
                },
            ],
            diagnostics: vec![],
        };
        assert_eq!(tree.import_texts(), vec!["using System;", "using System.Linq;"]);
    }

    #[test]
    fn test_outline_json_shape() {
        let node: SyntaxNode = serde_json::from_str(
            r#"{"node":"property","name":"Name","value":{"kind":"expressionBody","expr":{"kind":"literal","text":"Demo"}}}"#,
        )
        .unwrap();
        assert_eq!(
            node,
            SyntaxNode::Property {
                name: "Name".into(),
                value: PropertyValue::ExpressionBody {
                    expr: Expr::Literal("Demo".into())
                },
            }
        );
    }

    #[test]
    fn test_fixed_emit_policy() {
        let policy = EmitPolicy::fixed();
        assert_eq!(policy.output_kind, "DynamicallyLinkedLibrary");
        assert!(!policy.overflow_checks);
        assert!(policy.allow_unsafe);
    }
}
