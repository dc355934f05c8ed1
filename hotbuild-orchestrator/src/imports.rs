//! Import directive rewriting
//!
//! Pure text transforms over source text: strip configured imports before
//! parsing, prepend missing default imports, and drop imports selected by the
//! retry loop. None of them reorder existing statements.

use once_cell::sync::OnceCell;
use regex::Regex;
use std::collections::HashSet;
use tracing::debug;

const TARGET: &str = "hotbuild::imports";

/// A single-line import directive; group 1 is the imported name
fn using_line_regex() -> &'static Regex {
    static REGEX: OnceCell<Regex> = OnceCell::new();
    REGEX.get_or_init(|| {
        Regex::new(
            r"^\s*(?:global\s+)?using\s+(?:static\s+)?(?:[A-Za-z_]\w*\s*=\s*)?([A-Za-z_][\w.]*(?:<[^;]*>)?)\s*;\s*$",
        )
        .expect("import directive regex must compile")
    })
}

/// Canonical statement form: `X` becomes `using X;`, full statements are kept
pub fn format_import(import: &str) -> String {
    let trimmed = import.trim();
    if trimmed.starts_with("using ") && trimmed.ends_with(';') {
        trimmed.to_string()
    } else {
        format!("using {};", trimmed.trim_end_matches(';').trim())
    }
}

/// The bare namespace or type a statement imports, as written
pub fn import_target(statement: &str) -> String {
    let mut s = statement.trim().trim_end_matches(';').trim();
    for prefix in ["global ", "using ", "static "] {
        if let Some(rest) = s.strip_prefix(prefix) {
            s = rest.trim_start();
        }
    }
    match s.split_once('=') {
        Some((_, target)) => target.trim().to_string(),
        None => s.to_string(),
    }
}

/// Import directives found by scanning lines, in order
pub fn declared_imports(text: &str) -> Vec<String> {
    text.lines()
        .filter(|line| using_line_regex().is_match(line))
        .map(|line| line.trim().to_string())
        .collect()
}

/// Remove every line that is exactly one of the configured imports, with or
/// without the `using` keyword. Runs before parsing.
pub fn strip_imports(text: &str, removed: &[String]) -> String {
    let mut out = text.to_string();
    for token in removed.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
        let mut forms = vec![token.to_string(), format_import(token)];
        forms.dedup();
        for form in forms {
            let escaped = regex::escape(&form);
            // mid-file lines first, then a final line without a newline
            let patterns = [
                format!(r"(?m)^[ \t]*{}[ \t]*\r?\n", escaped),
                format!(r"(?m)^[ \t]*{}[ \t]*\r?$", escaped),
            ];
            for pattern in patterns {
                match Regex::new(&pattern) {
                    Ok(re) => out = re.replace_all(&out, "").into_owned(),
                    Err(err) => debug!(target: TARGET, %err, token, "unusable import token"),
                }
            }
        }
    }
    out
}

/// Prepend each default import whose target is not already imported.
///
/// `existing` is the compile service's rendering of the file's current
/// imports. Returns the text unchanged when nothing is missing.
pub fn add_default_imports(text: &str, existing: &[String], defaults: &[String]) -> String {
    let mut present: HashSet<String> = existing
        .iter()
        .map(|s| import_target(s).to_ascii_lowercase())
        .collect();

    let mut missing = Vec::new();
    for default in defaults.iter().filter(|d| !d.trim().is_empty()) {
        let statement = format_import(default);
        let key = import_target(&statement).to_ascii_lowercase();
        if present.insert(key) {
            missing.push(statement);
        }
    }

    if missing.is_empty() {
        return text.to_string();
    }

    let newline = if text.contains("\r\n") { "\r\n" } else { "\n" };
    debug!(target: TARGET, added = missing.len(), "prepending default imports");
    format!("{}{}{}", missing.join(newline), newline, text)
}

/// Drop import lines whose target satisfies `remove`. Returns the new text
/// and the number of removed lines.
pub fn remove_imports_where(text: &str, remove: impl Fn(&str) -> bool) -> (String, usize) {
    let mut removed = 0;
    let mut out = String::with_capacity(text.len());
    for line in text.split_inclusive('\n') {
        let drop = using_line_regex()
            .captures(line.trim_end_matches(['\r', '\n']))
            .and_then(|caps| caps.get(1))
            .map(|target| remove(target.as_str()))
            .unwrap_or(false);
        if drop {
            removed += 1;
        } else {
            out.push_str(line);
        }
    }
    (out, removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_format_import() {
        assert_eq!(format_import("System.Linq"), "using System.Linq;");
        assert_eq!(format_import(" using System.IO; "), "using System.IO;");
        assert_eq!(format_import("System.Text;"), "using System.Text;");
    }

    #[test]
    fn test_import_target() {
        assert_eq!(import_target("using System.Linq;"), "System.Linq");
        assert_eq!(import_target("global using System;"), "System");
        assert_eq!(import_target("using static System.Math;"), "System.Math");
        assert_eq!(import_target("using IO = System.IO;"), "System.IO");
    }

    #[test]
    fn test_strip_mid_file_and_last_line() {
        let text = "using System;\nusing System.Drawing;\nclass A {}\nusing System.Drawing;";
        let out = strip_imports(text, &strings(&["System.Drawing"]));
        assert_eq!(out, "using System;\nclass A {}\n");
    }

    #[test]
    fn test_strip_matches_whole_lines_only() {
        let text = "using System.Drawing.Imaging;\nusing System.Drawing;\r\n";
        let out = strip_imports(text, &strings(&["using System.Drawing;"]));
        assert_eq!(out, "using System.Drawing.Imaging;\n");
    }

    #[test]
    fn test_strip_last_line_with_carriage_return() {
        let text = "using System;\r\nusing System.Drawing;\r";
        let out = strip_imports(text, &strings(&["System.Drawing"]));
        assert_eq!(out, "using System;\r\n");
    }

    #[test]
    fn test_add_defaults_prepends_missing() {
        let text = "using System;\nclass A {}\n";
        let out = add_default_imports(
            text,
            &declared_imports(text),
            &strings(&["system", "System.Linq", "System.Text"]),
        );
        assert_eq!(
            out,
            "using System.Linq;\nusing System.Text;\nusing System;\nclass A {}\n"
        );
    }

    #[test]
    fn test_add_defaults_is_idempotent() {
        let defaults = strings(&["System", "System.Linq", "using System.IO;"]);
        let text = "namespace Foo { class A {} }";
        let once = add_default_imports(text, &declared_imports(text), &defaults);
        let twice = add_default_imports(&once, &declared_imports(&once), &defaults);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_add_defaults_deduplicates_configured_list() {
        let out = add_default_imports("", &[], &strings(&["System", "using System;"]));
        assert_eq!(out, "using System;\n");
    }

    #[test]
    fn test_add_defaults_keeps_crlf() {
        let out = add_default_imports("class A {}\r\n", &[], &strings(&["System"]));
        assert_eq!(out, "using System;\r\nclass A {}\r\n");
    }

    #[test]
    fn test_remove_imports_where() {
        let text = "using System;\nusing Foo.Bar;\n  using Foo.Bar.Baz;\nusing (var x = y) {}\n";
        let (out, removed) = remove_imports_where(text, |t| t.starts_with("Foo"));
        assert_eq!(removed, 2);
        assert_eq!(out, "using System;\nusing (var x = y) {}\n");
    }

    #[test]
    fn test_using_declaration_is_not_a_directive() {
        let text = "using var stream = Open();\n";
        assert!(declared_imports(text).is_empty());
        let (_, removed) = remove_imports_where(text, |_| true);
        assert_eq!(removed, 0);
    }
}
