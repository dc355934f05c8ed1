//! Self-healing retry classification
//!
//! A failed compile is retried only when an error reports an unresolved type
//! or namespace. The structured diagnostic code decides; message shapes are a
//! fallback for services that report no code. Repair only ever removes
//! import directives.

use crate::imports;
use crate::service::{Diagnostic, SourceFile};
use once_cell::sync::OnceCell;
use regex::Regex;

/// Codes for "type or namespace not found" and "not in namespace"
pub const MISSING_SYMBOL_CODES: &[&str] = &["CS0246", "CS0234", "CS0400"];

fn type_not_found_regex() -> &'static Regex {
    static REGEX: OnceCell<Regex> = OnceCell::new();
    REGEX.get_or_init(|| {
        Regex::new(r"The type or namespace name '([^']+)' could not be found")
            .expect("type-not-found regex must compile")
    })
}

fn not_in_namespace_regex() -> &'static Regex {
    static REGEX: OnceCell<Regex> = OnceCell::new();
    REGEX.get_or_init(|| {
        Regex::new(r"The type or namespace name '([^']+)' does not exist in the namespace '([^']+)'")
            .expect("not-in-namespace regex must compile")
    })
}

fn global_not_found_regex() -> &'static Regex {
    static REGEX: OnceCell<Regex> = OnceCell::new();
    REGEX.get_or_init(|| {
        Regex::new(r"The type or namespace name '([^']+)' could not be found in the global namespace")
            .expect("global-not-found regex must compile")
    })
}

/// True when the diagnostic reports an unresolved type or namespace
pub fn is_missing_symbol(diagnostic: &Diagnostic) -> bool {
    if !diagnostic.is_error() {
        return false;
    }
    match diagnostic.code.as_deref() {
        Some(code) => MISSING_SYMBOL_CODES.contains(&code),
        None => {
            type_not_found_regex().is_match(&diagnostic.message)
                || not_in_namespace_regex().is_match(&diagnostic.message)
        }
    }
}

/// At least one error is a missing-symbol error
pub fn is_retry_eligible(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(is_missing_symbol)
}

/// Names the missing-symbol errors point at, each with its namespace prefix.
///
/// `'Foo.Bar.Baz'` yields `Foo.Bar.Baz` and `Foo.Bar`; a name missing from
/// namespace `'N'` yields only `N.Name`, since `N` itself resolved. Order
/// follows the diagnostics.
pub fn offending_names(diagnostics: &[Diagnostic]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let mut push = |name: String| {
        if !name.is_empty() && !names.contains(&name) {
            names.push(name);
        }
    };

    for diagnostic in diagnostics.iter().filter(|d| is_missing_symbol(d)) {
        let message = &diagnostic.message;
        if let Some(caps) = not_in_namespace_regex().captures(message) {
            push(format!("{}.{}", &caps[2], &caps[1]));
        } else if let Some(caps) = global_not_found_regex()
            .captures(message)
            .or_else(|| type_not_found_regex().captures(message))
        {
            let name = strip_generic_arity(&caps[1]);
            if let Some((prefix, _)) = name.rsplit_once('.') {
                let prefix = prefix.to_string();
                push(name);
                push(prefix);
            } else {
                push(name);
            }
        }
    }
    names
}

fn strip_generic_arity(name: &str) -> String {
    match name.find('<') {
        Some(idx) => name[..idx].to_string(),
        None => name.to_string(),
    }
}

/// Import target related to an offending name: the name itself or a
/// namespace below it (case-insensitive, on `.` boundaries). A parent of the
/// offending name resolved, so it is kept.
pub fn is_related(import: &str, offending: &str) -> bool {
    let import = import.to_ascii_lowercase();
    let offending = offending.to_ascii_lowercase();
    import == offending || import.starts_with(&format!("{}.", offending))
}

/// Remove every import in `sources` related to any offending name.
/// Returns the number of removed directives.
pub fn prune_imports(sources: &mut [SourceFile], offending: &[String]) -> usize {
    if offending.is_empty() {
        return 0;
    }
    let mut total = 0;
    for source in sources.iter_mut() {
        let (text, removed) = imports::remove_imports_where(&source.text, |target| {
            offending.iter().any(|name| is_related(target, name))
        });
        if removed > 0 {
            source.text = text;
            total += removed;
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::Severity;
    use std::path::PathBuf;

    fn missing_type(name: &str) -> Diagnostic {
        Diagnostic::error(format!(
            "The type or namespace name '{}' could not be found (are you missing a using directive or an assembly reference?)",
            name
        ))
        .with_code("CS0246")
    }

    #[test]
    fn test_code_decides_eligibility() {
        assert!(is_retry_eligible(&[missing_type("Foo")]));
        assert!(is_retry_eligible(&[Diagnostic::error("whatever").with_code("CS0234")]));
        assert!(!is_retry_eligible(&[Diagnostic::error("; expected").with_code("CS1002")]));
    }

    #[test]
    fn test_message_fallback_without_code() {
        let d = Diagnostic::error("The type or namespace name 'Widget' could not be found");
        assert!(is_retry_eligible(&[d]));
        let d = Diagnostic::error(
            "The type or namespace name 'Gone' does not exist in the namespace 'Old.Api'",
        );
        assert!(is_retry_eligible(&[d]));
    }

    #[test]
    fn test_linq_extension_method_is_not_eligible() {
        let linq = Diagnostic::error(
            "'int[]' does not contain a definition for 'Where' and no accessible extension method 'Where' accepting a first argument of type 'int[]' could be found (are you missing a using directive or an assembly reference?)",
        )
        .with_code("CS1061");
        assert!(!is_retry_eligible(&[linq.clone()]));
        assert!(!is_retry_eligible(&[linq.clone().with_code("CS1061")]));

        let mut uncoded = linq;
        uncoded.code = None;
        assert!(!is_retry_eligible(&[uncoded]));
    }

    #[test]
    fn test_warnings_never_qualify() {
        let mut d = missing_type("Foo");
        d.severity = Severity::Warning;
        assert!(!is_retry_eligible(&[d]));
    }

    #[test]
    fn test_offending_names() {
        let names = offending_names(&[
            missing_type("Legacy.Widgets.Button"),
            missing_type("Plain"),
            Diagnostic::error("The type or namespace name 'Gone' does not exist in the namespace 'Old.Api' (are you missing an assembly reference?)")
                .with_code("CS0234"),
            Diagnostic::error("; expected").with_code("CS1002"),
            missing_type("List<T>"),
        ]);
        assert_eq!(
            names,
            vec![
                "Legacy.Widgets.Button",
                "Legacy.Widgets",
                "Plain",
                "Old.Api.Gone",
                "List",
            ]
        );
    }

    #[test]
    fn test_is_related() {
        assert!(is_related("Old.Api", "Old.Api"));
        assert!(is_related("old.api", "Old.Api"));
        assert!(is_related("Old.Api.Extra", "Old.Api"));
        assert!(!is_related("Old", "Old.Api"));
        assert!(!is_related("Old.Apis", "Old.Api"));
        assert!(!is_related("System", "Old.Api"));
    }

    #[test]
    fn test_prune_imports_across_group() {
        let mut sources = vec![
            SourceFile {
                path: PathBuf::from("/a.cs"),
                text: "using System;\nusing Old.Api;\nclass A {}\n".into(),
            },
            SourceFile {
                path: PathBuf::from("/b.cs"),
                text: "using Old.Api.Extensions;\nclass B {}\n".into(),
            },
        ];
        let removed = prune_imports(&mut sources, &["Old.Api".to_string()]);
        assert_eq!(removed, 2);
        assert_eq!(sources[0].text, "using System;\nclass A {}\n");
        assert_eq!(sources[1].text, "class B {}\n");

        assert_eq!(prune_imports(&mut sources, &["Old.Api".to_string()]), 0);
    }

    #[test]
    fn test_missing_member_namespace_keeps_its_parent() {
        let not_in_system = Diagnostic::error(
            "The type or namespace name 'Drawing' does not exist in the namespace 'System' (are you missing an assembly reference?)",
        )
        .with_code("CS0234");
        let offending = offending_names(&[not_in_system]);
        assert_eq!(offending, vec!["System.Drawing"]);

        let mut sources = vec![SourceFile {
            path: PathBuf::from("/a.cs"),
            text: "using System;\nusing System.Linq;\nusing System.Collections.Generic;\nusing System.Drawing;\nusing System.Drawing.Imaging;\nclass A {}\n".into(),
        }];
        assert_eq!(prune_imports(&mut sources, &offending), 2);
        assert_eq!(
            sources[0].text,
            "using System;\nusing System.Linq;\nusing System.Collections.Generic;\nclass A {}\n"
        );
    }
}
