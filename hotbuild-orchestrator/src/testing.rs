//! Test doubles for the compile service
//!
//! [`ScriptedCompileService`] understands just enough of the source language
//! to produce syntax outlines (imports, namespaces, types and the `Name`
//! property) and lets tests script emit results.

use crate::error::ServiceError;
use crate::service::{
    CompileService, Diagnostic, EmitOutput, EmitRequest, Expr, PropertyValue, Runnable,
    ScriptBuild, ScriptRequest, SourceFile, SyntaxNode, SyntaxTree,
};
use hotbuild_config::LanguageVersion;
use once_cell::sync::OnceCell;
use regex::{Captures, Regex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Smallest byte string that passes the loadable-module probe
pub fn fake_dll() -> Vec<u8> {
    let mut bytes = vec![0u8; 0x80];
    bytes[..2].copy_from_slice(b"MZ");
    bytes[0x3C..0x40].copy_from_slice(&0x40u32.to_le_bytes());
    bytes[0x40..0x44].copy_from_slice(b"PE\0\0");
    bytes
}

fn outline_token_regex() -> &'static Regex {
    static REGEX: OnceCell<Regex> = OnceCell::new();
    REGEX.get_or_init(|| {
        Regex::new(concat!(
            r"(?m)(?P<using>^[ \t]*(?P<global>global\s+)?using\s+(?:static\s+)?(?:(?P<alias>\w+)\s*=\s*)?(?P<target>[\w.]+)\s*;)",
            r#"|(?P<ns>\bnamespace\s+(?P<nsname>[\w.]+)\s*(?P<nsterm>[{;]))"#,
            r"|(?P<ty>(?P<mods>(?:(?:public|internal|private|protected|static|sealed|abstract|partial|unsafe)\s+)*)\b(?P<kind>class|struct|interface|record|enum)\s+(?P<tyname>\w+)(?:<[^>]*>)?\s*(?::\s*(?P<bases>[^{]+?))?\s*\{)",
            r#"|(?P<prop>\bName\s*=>\s*"(?P<lit>[^"]*)"\s*;)"#,
            r#"|(?P<getter>\bName\s*\{\s*get\s*\{\s*return\s+"(?P<ret>[^"]*)"\s*;)"#,
            r"|(?P<open>\{)|(?P<close>\})",
        ))
        .expect("outline token regex must compile")
    })
}

fn sleep_call_regex() -> &'static Regex {
    static REGEX: OnceCell<Regex> = OnceCell::new();
    REGEX.get_or_init(|| {
        Regex::new(r"Thread\.Sleep\((\d+)\)").expect("sleep call regex must compile")
    })
}

/// `#delay(n)` in a script makes its compile take `n` milliseconds
fn compile_delay_regex() -> &'static Regex {
    static REGEX: OnceCell<Regex> = OnceCell::new();
    REGEX.get_or_init(|| Regex::new(r"#delay\((\d+)\)").expect("compile delay regex must compile"))
}

fn pause_for(re: &Regex, text: &str) {
    if let Some(caps) = re.captures(text) {
        let ms: u64 = caps[1].parse().unwrap_or(0);
        thread::sleep(Duration::from_millis(ms));
    }
}

enum Frame {
    Root(Vec<SyntaxNode>),
    Namespace {
        name: String,
        file_scoped: bool,
        members: Vec<SyntaxNode>,
    },
    Type {
        kind: String,
        name: String,
        modifiers: Vec<String>,
        bases: Vec<String>,
        members: Vec<SyntaxNode>,
    },
    Block,
}

impl Frame {
    fn braced(&self) -> bool {
        match self {
            Frame::Root(_) => false,
            Frame::Namespace { file_scoped, .. } => !file_scoped,
            Frame::Type { .. } | Frame::Block => true,
        }
    }

    fn into_node(self) -> Option<SyntaxNode> {
        match self {
            Frame::Namespace {
                name,
                file_scoped,
                members,
            } => Some(SyntaxNode::Namespace {
                name,
                file_scoped,
                members,
            }),
            Frame::Type {
                kind,
                name,
                modifiers,
                bases,
                members,
            } => Some(SyntaxNode::Type {
                kind,
                name,
                modifiers,
                bases,
                members,
            }),
            Frame::Root(_) | Frame::Block => None,
        }
    }
}

struct OutlineBuilder {
    frames: Vec<Frame>,
}

impl OutlineBuilder {
    fn new() -> Self {
        Self {
            frames: vec![Frame::Root(Vec::new())],
        }
    }

    /// Members of the innermost frame that can hold declarations
    fn push_member(&mut self, node: SyntaxNode) {
        for frame in self.frames.iter_mut().rev() {
            match frame {
                Frame::Root(members)
                | Frame::Namespace { members, .. }
                | Frame::Type { members, .. } => {
                    members.push(node);
                    return;
                }
                Frame::Block => {}
            }
        }
    }

    fn close_top(&mut self) {
        if let Some(node) = self.frames.pop().and_then(Frame::into_node) {
            self.push_member(node);
        }
    }

    /// Returns false on an unmatched `}`
    fn close_brace(&mut self) -> bool {
        while self.frames.last().map(|f| !f.braced()).unwrap_or(false) {
            if self.frames.len() == 1 {
                return false;
            }
            self.close_top();
        }
        if self.frames.len() <= 1 {
            return false;
        }
        self.close_top();
        true
    }

    /// Returns the outline and whether every brace was closed
    fn finish(mut self) -> (Vec<SyntaxNode>, bool) {
        let mut balanced = true;
        while self.frames.len() > 1 {
            if self.frames.last().map(Frame::braced).unwrap_or(false) {
                balanced = false;
            }
            self.close_top();
        }
        match self.frames.pop() {
            Some(Frame::Root(members)) => (members, balanced),
            _ => (Vec::new(), false),
        }
    }
}

fn scan_outline(text: &str) -> (Vec<SyntaxNode>, bool) {
    let mut builder = OutlineBuilder::new();
    let mut balanced = true;

    for caps in outline_token_regex().captures_iter(text) {
        if caps.name("using").is_some() {
            builder.push_member(using_node(&caps));
        } else if caps.name("ns").is_some() {
            builder.frames.push(Frame::Namespace {
                name: caps["nsname"].to_string(),
                file_scoped: &caps["nsterm"] == ";",
                members: Vec::new(),
            });
        } else if caps.name("ty").is_some() {
            builder.frames.push(Frame::Type {
                kind: caps["kind"].to_string(),
                name: caps["tyname"].to_string(),
                modifiers: caps["mods"].split_whitespace().map(str::to_string).collect(),
                bases: caps
                    .name("bases")
                    .map(|b| b.as_str().split(',').map(|s| s.trim().to_string()).collect())
                    .unwrap_or_default(),
                members: Vec::new(),
            });
        } else if caps.name("prop").is_some() {
            builder.push_member(SyntaxNode::Property {
                name: "Name".to_string(),
                value: PropertyValue::ExpressionBody {
                    expr: Expr::Literal(caps["lit"].to_string()),
                },
            });
        } else if caps.name("getter").is_some() {
            builder.push_member(SyntaxNode::Property {
                name: "Name".to_string(),
                value: PropertyValue::Getter {
                    first_return: Some(Expr::Literal(caps["ret"].to_string())),
                },
            });
            builder.frames.push(Frame::Block);
            builder.frames.push(Frame::Block);
        } else if caps.name("open").is_some() {
            builder.frames.push(Frame::Block);
        } else if caps.name("close").is_some() && !builder.close_brace() {
            balanced = false;
        }
    }

    let (outline, closed) = builder.finish();
    (outline, balanced && closed)
}

fn using_node(caps: &Captures<'_>) -> SyntaxNode {
    SyntaxNode::Using {
        target: caps["target"].to_string(),
        text: caps["using"].trim().to_string(),
        is_global: caps.name("global").is_some(),
        alias: caps.name("alias").map(|a| a.as_str().to_string()),
    }
}

type EmitFn = dyn Fn(&EmitRequest) -> Result<EmitOutput, ServiceError> + Send + Sync;

/// In-process compile service with scripted behavior
pub struct ScriptedCompileService {
    parse_calls: AtomicUsize,
    emit_calls: AtomicUsize,
    script_calls: AtomicUsize,
    parsed: Mutex<Vec<String>>,
    emitted: Mutex<Vec<EmitRequest>>,
    scripts: Mutex<Vec<ScriptRequest>>,
    queued: Mutex<VecDeque<Result<EmitOutput, ServiceError>>>,
    emit_fn: Option<Box<EmitFn>>,
}

impl Default for ScriptedCompileService {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedCompileService {
    pub fn new() -> Self {
        Self {
            parse_calls: AtomicUsize::new(0),
            emit_calls: AtomicUsize::new(0),
            script_calls: AtomicUsize::new(0),
            parsed: Mutex::new(Vec::new()),
            emitted: Mutex::new(Vec::new()),
            scripts: Mutex::new(Vec::new()),
            queued: Mutex::new(VecDeque::new()),
            emit_fn: None,
        }
    }

    /// Decide every emit result that is not queued
    pub fn with_emit<F>(mut self, f: F) -> Self
    where
        F: Fn(&EmitRequest) -> Result<EmitOutput, ServiceError> + Send + Sync + 'static,
    {
        self.emit_fn = Some(Box::new(f));
        self
    }

    /// Queue the result of the next emit call
    pub fn push_emit(&self, result: Result<EmitOutput, ServiceError>) {
        self.queued
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(result);
    }

    pub fn success_output() -> EmitOutput {
        EmitOutput {
            success: true,
            binary: fake_dll(),
            debug_symbols: Some(b"symbols".to_vec()),
            diagnostics: Vec::new(),
        }
    }

    pub fn failed_output(diagnostics: Vec<Diagnostic>) -> EmitOutput {
        EmitOutput {
            success: false,
            binary: Vec::new(),
            debug_symbols: None,
            diagnostics,
        }
    }

    pub fn parse_calls(&self) -> usize {
        self.parse_calls.load(Ordering::SeqCst)
    }

    pub fn emit_calls(&self) -> usize {
        self.emit_calls.load(Ordering::SeqCst)
    }

    pub fn script_calls(&self) -> usize {
        self.script_calls.load(Ordering::SeqCst)
    }

    /// Every text handed to `parse`, in call order
    pub fn parsed_texts(&self) -> Vec<String> {
        self.parsed.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn emitted_requests(&self) -> Vec<EmitRequest> {
        self.emitted.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn script_requests(&self) -> Vec<ScriptRequest> {
        self.scripts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl CompileService for ScriptedCompileService {
    fn name(&self) -> &str {
        "scripted"
    }

    fn parse(
        &self,
        source: &SourceFile,
        _language_version: LanguageVersion,
    ) -> Result<SyntaxTree, ServiceError> {
        self.parse_calls.fetch_add(1, Ordering::SeqCst);
        self.parsed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(source.text.clone());

        let (outline, balanced) = scan_outline(&source.text);
        let diagnostics = if balanced {
            Vec::new()
        } else {
            vec![Diagnostic::error("} expected")
                .with_code("CS1513")
                .at(source.path.clone(), source.text.lines().count().max(1) as u32)]
        };
        Ok(SyntaxTree {
            path: source.path.clone(),
            outline,
            diagnostics,
        })
    }

    fn emit(&self, request: &EmitRequest) -> Result<EmitOutput, ServiceError> {
        self.emit_calls.fetch_add(1, Ordering::SeqCst);
        self.emitted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        let queued = self
            .queued
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match (queued, &self.emit_fn) {
            (Some(result), _) => result,
            (None, Some(f)) => f(request),
            (None, None) => Ok(Self::success_output()),
        }
    }

    fn compile_script(&self, request: &ScriptRequest) -> Result<ScriptBuild, ServiceError> {
        self.script_calls.fetch_add(1, Ordering::SeqCst);
        self.scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        pause_for(compile_delay_regex(), &request.source);
        if request.source.contains("#error") {
            return Ok(ScriptBuild {
                success: false,
                diagnostics: vec![Diagnostic::error("#error: 'script rejected'").with_code("CS1029")],
                runnable: None,
            });
        }
        Ok(ScriptBuild {
            success: true,
            diagnostics: Vec::new(),
            runnable: Some(Arc::new(ScriptedRunnable {
                name: request.name.clone(),
                source: request.source.clone(),
            })),
        })
    }
}

/// Sleeps on `Thread.Sleep(n)`, fails on `throw`, otherwise echoes its input
struct ScriptedRunnable {
    name: String,
    source: String,
}

impl Runnable for ScriptedRunnable {
    fn invoke(&self, context: &serde_json::Value) -> Result<serde_json::Value, String> {
        pause_for(sleep_call_regex(), &self.source);
        if self.source.contains("throw") {
            return Err(format!("{} threw an exception", self.name));
        }
        Ok(serde_json::json!({ "script": self.name, "context": context }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax;
    use std::path::PathBuf;

    fn parse(text: &str) -> SyntaxTree {
        ScriptedCompileService::new()
            .parse(
                &SourceFile {
                    path: PathBuf::from("/a.cs"),
                    text: text.to_string(),
                },
                LanguageVersion::default(),
            )
            .unwrap()
    }

    #[test]
    fn test_outline_of_block_namespace() {
        let tree = parse("using System;\nnamespace Foo.Bar {\n  public class A : Base, IThing {}\n  class B {}\n}");
        assert_eq!(tree.error_count(), 0);
        assert_eq!(tree.import_texts(), vec!["using System;"]);
        assert_eq!(syntax::namespace_of(&tree), "Foo.Bar");
        assert_eq!(syntax::public_type_names(&tree), vec!["A"]);
    }

    #[test]
    fn test_file_scoped_namespace() {
        let tree = parse("namespace Foo;\ninternal class A { void M() { } }\n");
        assert_eq!(tree.error_count(), 0);
        assert_eq!(syntax::namespace_of(&tree), "Foo");
        assert_eq!(syntax::public_type_names(&tree), vec!["A"]);
    }

    #[test]
    fn test_unbalanced_braces_are_errors() {
        assert_eq!(parse("namespace Foo { class A {").error_count(), 1);
        assert_eq!(parse("class A { } }").error_count(), 1);
    }

    #[test]
    fn test_plugin_name_from_getter() {
        let tree = parse(
            "namespace P {\n public class Main : TerrariaPlugin {\n  public override string Name { get { return \"Demo\"; } }\n }\n}",
        );
        assert_eq!(tree.error_count(), 0);
        assert_eq!(syntax::plugin_name(&tree, "TerrariaPlugin").as_deref(), Some("Demo"));
    }

    #[test]
    fn test_using_statements_are_not_imports() {
        let tree = parse("class A { void M() { using var s = Open(); using (var t = Open()) { } } }");
        assert!(tree.import_texts().is_empty());
    }

    #[test]
    fn test_fake_dll_shape() {
        let dll = fake_dll();
        assert_eq!(&dll[..2], b"MZ");
        assert_eq!(&dll[0x40..0x44], b"PE\0\0");
    }
}
