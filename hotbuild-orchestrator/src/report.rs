//! Diagnostic reporting
//!
//! Error diagnostics are summarized per source file for the console and
//! collapsed by translated message for persisted logs. Translation is a
//! cosmetic phrase substitution; retry classification always reads the
//! original message.

use crate::ingest::SkippedFile;
use crate::service::Diagnostic;
use chrono::{DateTime, Local};
use hotbuild_vfs::{VfsError, VirtualFileSystem};
use once_cell::sync::OnceCell;
use regex::Regex;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

const TARGET: &str = "hotbuild::report";

/// Entries listed per skip list before truncation
pub const SKIP_LIST_LIMIT: usize = 10;

/// Extension of persisted failure logs
pub const LOG_EXTENSION: &str = "txt";

/// Suggestions attached to every failed group
pub const FAILURE_HINTS: &[&str] = &[
    "check the assemblies folder",
    "check that the import statements are correct",
    "check that the source files are complete",
    "check the log file",
];

fn culture_regex() -> &'static Regex {
    static REGEX: OnceCell<Regex> = OnceCell::new();
    REGEX.get_or_init(|| Regex::new(r", Culture=[^,']+").expect("culture regex must compile"))
}

fn public_key_token_regex() -> &'static Regex {
    static REGEX: OnceCell<Regex> = OnceCell::new();
    REGEX.get_or_init(|| {
        Regex::new(r", PublicKeyToken=[^,']+").expect("public key token regex must compile")
    })
}

fn quoted_regex() -> &'static Regex {
    static REGEX: OnceCell<Regex> = OnceCell::new();
    REGEX.get_or_init(|| Regex::new(r"'([^']*)'").expect("quote regex must compile"))
}

fn ctor_arity_regex() -> &'static Regex {
    static REGEX: OnceCell<Regex> = OnceCell::new();
    REGEX.get_or_init(|| {
        Regex::new(r"does not contain a constructor that takes (\d+) arguments")
            .expect("constructor arity regex must compile")
    })
}

const SUFFIXES: &[(&str, &str)] = &[
    (
        "(are you missing a using directive or an assembly reference?)",
        "（是否缺少 using 指令或程序集引用？）",
    ),
    ("(are you missing an assembly reference?)", "（是否缺少程序集引用？）"),
    ("(are you missing a using directive?)", "（是否缺少 using 指令？）"),
];

const PHRASES: &[(&str, &str)] = &[
    ("because", "因为"),
    ("Version=", "版本号"),
    ("Operator", "操作符"),
    ("The name", "该名称"),
    ("The type", "该类型"),
    ("could be found", "被找到"),
    ("does not exist", "不存在"),
    ("in the namespace", "这个命名空间"),
    ("in the current context", "当前上下文"),
    ("could not be found", "找不到"),
    ("The type or namespace name", "该类型或命名空间名称"),
    ("cannot be applied to operands of type", "不能应用于类型为的操作数"),
    ("does not contain a definition for", "不包含定义"),
    ("and no accessible extension method", "且没有可访问的扩展方法"),
    ("accepting a first argument of type", "接受类型为的第一个参数"),
    ("This type has been forwarded to assembly", "此类型已转发到程序集"),
    ("Consider adding a reference to that assembly", "请考虑添加对该程序集的引用"),
    ("You must add a reference to assembly", "必须添加对程序集的引用"),
    ("is defined in an assembly that is not referenced", "在未引用的程序集中定义"),
    ("is a method, which is not valid in the given context", "是一种方法，这在给定的上下文中无效"),
    ("is inaccessible due to its protection level", "由于其保护级别，无法访问"),
    ("is an ambiguous reference between", "以下两者之间存在模糊引用"),
    ("does not implement interface member", "无法实现接口成员"),
    (
        "A global using directive must precede all non-global using directives.",
        "不要把 bin 或 obj 放进源码文件夹",
    ),
    ("must be a non-abstract type with a public parameterless constructor", "必须是非抽象类型且具有公共无参数构造函数"),
    ("cannot be used as a constant", "不能用作常量"),
    ("is not supported by the language", "语言不支持"),
    ("Anonymous methods cannot be converted to expression trees", "匿名方法不能转换为表达式树"),
    ("The call is ambiguous between the following methods or properties", "以下方法或属性之间的调用不明确"),
    ("The best overloaded method match for", "最佳重载方法匹配"),
    ("has some invalid arguments", "有一些无效参数"),
    ("No overload for method", "方法没有重载"),
    ("cannot convert from", "无法转换自"),
    ("An object reference is required for the non-static field, method, or property", "非静态字段、方法或属性需要对象引用"),
    ("Missing compiler required member", "缺少编译器所需的成员"),
    ("The feature", "该功能"),
    ("is not available in C#", "在 C# 中不可用"),
    ("Please use language version", "请使用语言版本"),
    ("or greater", "或更高版本"),
    ("The left-hand side of an assignment must be a variable, property or indexer", "赋值操作的左侧必须是变量、属性或索引器"),
    ("The using directive for", "using 指令"),
    ("appeared previously in this namespace", "在此命名空间中已出现过"),
    ("The namespace", "命名空间"),
    ("already contains a definition for", "已包含定义"),
    ("The modifier", "修饰符"),
    ("is not valid for this item", "对此项无效"),
    ("Member names cannot be the same as their enclosing type", "成员名不能与其封闭类型相同"),
    ("A static class cannot contain non-static members", "静态类不能包含非静态成员"),
    ("Cannot create an instance of the static class", "无法创建静态类的实例"),
    ("Use of unassigned local variable", "使用了未赋值的局部变量"),
    ("Cannot assign to", "无法分配给"),
    ("because it is a", "因为它是一个"),
    ("foreach statement cannot operate on variables of type", "foreach 语句不能对该类型的变量进行操作"),
    ("does not contain a public instance or extension definition for", "不包含公共实例或扩展定义"),
    ("Pointers and fixed size buffers may only be used in an unsafe context", "指针和固定大小缓冲区只能在 unsafe 上下文中使用"),
];

/// Longest phrase first, so longer phrases win over their substrings
fn sorted_phrases() -> &'static [(&'static str, &'static str)] {
    static PHRASES_BY_LENGTH: OnceCell<Vec<(&'static str, &'static str)>> = OnceCell::new();
    PHRASES_BY_LENGTH.get_or_init(|| {
        let mut phrases = PHRASES.to_vec();
        phrases.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        phrases
    })
}

/// File-name-safe form of a group name; empty becomes `Global`
pub fn safe_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = replaced.trim();
    if trimmed.is_empty() {
        crate::syntax::GLOBAL_NAMESPACE.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Strip assembly identity noise from a diagnostic message
pub fn clean_message(message: &str) -> String {
    let message = culture_regex().replace_all(message, "");
    let message = public_key_token_regex().replace_all(&message, "");
    message.trim().to_string()
}

/// Best-effort translation used for display only
pub fn translate(message: &str) -> String {
    let mut text = clean_message(message);
    text = quoted_regex().replace_all(&text, "【$1】").into_owned();
    for (from, to) in SUFFIXES {
        text = text.replace(from, to);
    }
    text = ctor_arity_regex()
        .replace_all(&text, "不包含接受${1}个参数的构造函数")
        .into_owned();
    for (from, to) in sorted_phrases() {
        text = text.replace(from, to);
    }
    text.trim().to_string()
}

/// `{safeName}_{yyyyMMdd_HHmmss}.txt`
pub fn log_file_name(group_key: &str, at: DateTime<Local>) -> String {
    format!(
        "{}_{}.{}",
        safe_name(group_key),
        at.format("%Y%m%d_%H%M%S"),
        LOG_EXTENSION
    )
}

fn file_label(diagnostic: &Diagnostic) -> String {
    diagnostic
        .source_file
        .as_deref()
        .and_then(Path::file_name)
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Error diagnostics grouped by source file, groups in first-seen order
pub fn errors_by_file(diagnostics: &[Diagnostic]) -> Vec<(String, Vec<&Diagnostic>)> {
    let mut groups: Vec<(String, Vec<&Diagnostic>)> = Vec::new();
    for diagnostic in diagnostics.iter().filter(|d| d.is_error()) {
        let label = file_label(diagnostic);
        match groups.iter_mut().find(|(l, _)| *l == label) {
            Some((_, list)) => list.push(diagnostic),
            None => groups.push((label, vec![diagnostic])),
        }
    }
    groups
}

/// Error diagnostics collapsed by translated message, groups in first-seen order
pub fn errors_by_message(diagnostics: &[Diagnostic]) -> Vec<(String, Vec<&Diagnostic>)> {
    let mut groups: Vec<(String, Vec<&Diagnostic>)> = Vec::new();
    for diagnostic in diagnostics.iter().filter(|d| d.is_error()) {
        let key = translate(&diagnostic.message);
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, list)) => list.push(diagnostic),
            None => groups.push((key, vec![diagnostic])),
        }
    }
    groups
}

/// Console summary for one failed group
pub fn console_summary(group_name: &str, diagnostics: &[Diagnostic]) -> String {
    let by_file = errors_by_file(diagnostics);
    let total: usize = by_file.iter().map(|(_, list)| list.len()).sum();
    let mut out = String::new();
    let _ = writeln!(out, "compile failed [{}]", group_name);
    let _ = writeln!(out, "{}", "-".repeat(40));
    let _ = writeln!(out, "{} error(s)", total);
    for (file, list) in &by_file {
        let _ = writeln!(out, "  {}: {}", file, list.len());
    }
    let _ = writeln!(out, "suggestions:");
    for (i, hint) in FAILURE_HINTS.iter().enumerate() {
        let _ = writeln!(out, "  {}. {}", i + 1, hint);
    }
    out
}

/// Skip and parse-error listing, at most `SKIP_LIST_LIMIT` entries per list
pub fn skip_summary(skipped: &[SkippedFile]) -> Option<String> {
    if skipped.is_empty() {
        return None;
    }
    let mut out = String::new();
    let _ = writeln!(out, "skipped {} file(s):", skipped.len());
    for entry in skipped.iter().take(SKIP_LIST_LIMIT) {
        let name = entry
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| entry.path.display().to_string());
        let _ = writeln!(out, "  {} {}", name, entry.reason);
    }
    if skipped.len() > SKIP_LIST_LIMIT {
        let _ = writeln!(out, "  ... and {} more", skipped.len() - SKIP_LIST_LIMIT);
    }
    Some(out)
}

/// Renders and persists failure logs
pub struct DiagnosticReporter {
    vfs: Arc<dyn VirtualFileSystem>,
    logs_dir: PathBuf,
    show_original: bool,
    show_translated: bool,
}

impl DiagnosticReporter {
    pub fn new(
        vfs: Arc<dyn VirtualFileSystem>,
        logs_dir: impl Into<PathBuf>,
        show_original: bool,
        show_translated: bool,
    ) -> Self {
        // a log with neither language would be empty
        let show_original = show_original || !show_translated;
        Self {
            vfs,
            logs_dir: logs_dir.into(),
            show_original,
            show_translated,
        }
    }

    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    /// Full log text for one failed group
    pub fn render_log(&self, group_name: &str, diagnostics: &[Diagnostic], at: DateTime<Local>) -> String {
        let grouped = errors_by_message(diagnostics);
        let total: usize = grouped.iter().map(|(_, list)| list.len()).sum();

        let mut out = String::new();
        let _ = writeln!(out, "Compile error log - {}", at.format("%Y-%m-%d %H:%M:%S"));
        let _ = writeln!(out, "Group: {}", group_name);
        let _ = writeln!(out, "Total errors: {}", total);
        let _ = writeln!(out, "{}", "=".repeat(80));

        for (index, (translated, list)) in grouped.iter().enumerate() {
            let _ = writeln!(out);
            let _ = writeln!(out, "[Error class {}] {} occurrence(s)", index + 1, list.len());
            let _ = writeln!(out, "{}", "-".repeat(80));
            let _ = writeln!(out, "Locations:");
            for diagnostic in list {
                match diagnostic.line {
                    Some(line) => {
                        let _ = writeln!(out, "  {} 行 {}", file_label(diagnostic), line);
                    }
                    None => {
                        let _ = writeln!(out, "  {}", file_label(diagnostic));
                    }
                }
            }
            let _ = writeln!(out);
            let _ = writeln!(out, "Message:");
            if self.show_original {
                let _ = writeln!(out, "(EN): {}", list[0].message);
            }
            if self.show_translated && !translated.is_empty() {
                let _ = writeln!(out, "(CN): {}", translated);
            }
        }
        out
    }

    /// Persist the log for a failed group; returns its path
    pub fn write_failure_log(
        &self,
        group_key: &str,
        group_name: &str,
        diagnostics: &[Diagnostic],
    ) -> Result<PathBuf, VfsError> {
        let now = Local::now();
        self.vfs.create_dir_all(&self.logs_dir)?;
        let path = self.logs_dir.join(log_file_name(group_key, now));
        let text = self.render_log(group_name, diagnostics, now);
        self.vfs.write_file(&path, text.as_bytes())?;
        info!(target: TARGET, group = group_name, path = %path.display(), "failure log written");
        Ok(path)
    }

    /// Delete every persisted log; returns the number removed
    pub fn clear_logs(&self) -> usize {
        if !self.vfs.is_dir(&self.logs_dir) {
            return 0;
        }
        let files = match self.vfs.list_files(&self.logs_dir, LOG_EXTENSION, false) {
            Ok(files) => files,
            Err(err) => {
                warn!(target: TARGET, %err, "cannot list logs");
                return 0;
            }
        };
        let mut removed = 0;
        for file in files {
            match self.vfs.remove_file(&file) {
                Ok(()) => removed += 1,
                Err(err) => warn!(target: TARGET, path = %file.display(), %err, "cannot delete log"),
            }
        }
        removed
    }
}
