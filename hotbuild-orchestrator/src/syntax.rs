//! Narrow queries over the compile service's syntax outline

use crate::service::{Expr, PropertyValue, SyntaxNode, SyntaxTree};

/// Namespace used when a file declares none
pub const GLOBAL_NAMESPACE: &str = "Global";

const PLUGIN_NAME_PROPERTY: &str = "Name";

/// Declared namespace of a file: the first block-scoped declaration, else the
/// first file-scoped one, else `Global`.
pub fn namespace_of(tree: &SyntaxTree) -> String {
    find_namespace(&tree.outline, false)
        .or_else(|| find_namespace(&tree.outline, true))
        .unwrap_or_else(|| GLOBAL_NAMESPACE.to_string())
}

fn find_namespace(nodes: &[SyntaxNode], want_file_scoped: bool) -> Option<String> {
    for node in nodes {
        if let SyntaxNode::Namespace {
            name,
            file_scoped,
            members,
        } = node
        {
            if *file_scoped == want_file_scoped {
                return Some(name.clone());
            }
            if let Some(found) = find_namespace(members, want_file_scoped) {
                return Some(found);
            }
        }
    }
    None
}

/// Grouping key: the text before the first `.`
pub fn root_namespace(namespace: &str) -> String {
    match namespace.split('.').next().map(str::trim) {
        Some(root) if !root.is_empty() => root.to_string(),
        _ => GLOBAL_NAMESPACE.to_string(),
    }
}

/// Names of types declared `public` or `internal`, in declaration order
pub fn public_type_names(tree: &SyntaxTree) -> Vec<String> {
    let mut out = Vec::new();
    collect_public_types(&tree.outline, &mut out);
    out
}

fn collect_public_types(nodes: &[SyntaxNode], out: &mut Vec<String>) {
    for node in nodes {
        match node {
            SyntaxNode::Namespace { members, .. } => collect_public_types(members, out),
            SyntaxNode::Type {
                name,
                modifiers,
                members,
                ..
            } => {
                if modifiers.iter().any(|m| m == "public" || m == "internal") {
                    out.push(name.clone());
                }
                collect_public_types(members, out);
            }
            _ => {}
        }
    }
}

/// Display name of the plugin entry class, if the file declares one.
///
/// The entry class is the first class whose base list mentions `base_token`.
/// Its `Name` property supplies the name through an expression body literal
/// or the first `return` literal of its getter; otherwise the class name is
/// used.
pub fn plugin_name(tree: &SyntaxTree, base_token: &str) -> Option<String> {
    find_plugin_class(&tree.outline, base_token).map(|(class_name, members)| {
        name_property_literal(members).unwrap_or_else(|| class_name.to_string())
    })
}

fn find_plugin_class<'a>(
    nodes: &'a [SyntaxNode],
    base_token: &str,
) -> Option<(&'a str, &'a [SyntaxNode])> {
    for node in nodes {
        match node {
            SyntaxNode::Namespace { members, .. } => {
                if let Some(found) = find_plugin_class(members, base_token) {
                    return Some(found);
                }
            }
            SyntaxNode::Type {
                kind,
                name,
                bases,
                members,
                ..
            } => {
                if kind == "class" && bases.iter().any(|b| b.contains(base_token)) {
                    return Some((name.as_str(), members.as_slice()));
                }
                if let Some(found) = find_plugin_class(members, base_token) {
                    return Some(found);
                }
            }
            _ => {}
        }
    }
    None
}

fn name_property_literal(members: &[SyntaxNode]) -> Option<String> {
    members.iter().find_map(|member| match member {
        SyntaxNode::Property { name, value } if name == PLUGIN_NAME_PROPERTY => match value {
            PropertyValue::ExpressionBody {
                expr: Expr::Literal(text),
            }
            | PropertyValue::Getter {
                first_return: Some(Expr::Literal(text)),
            } => Some(text.clone()),
            _ => None,
        },
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn tree(outline: Vec<SyntaxNode>) -> SyntaxTree {
        SyntaxTree {
            path: PathBuf::from("/src/a.cs"),
            outline,
            diagnostics: vec![],
        }
    }

    fn class(name: &str, modifiers: &[&str], bases: &[&str], members: Vec<SyntaxNode>) -> SyntaxNode {
        SyntaxNode::Type {
            kind: "class".into(),
            name: name.into(),
            modifiers: modifiers.iter().map(|s| s.to_string()).collect(),
            bases: bases.iter().map(|s| s.to_string()).collect(),
            members,
        }
    }

    fn namespace(name: &str, file_scoped: bool, members: Vec<SyntaxNode>) -> SyntaxNode {
        SyntaxNode::Namespace {
            name: name.into(),
            file_scoped,
            members,
        }
    }

    #[test]
    fn test_namespace_prefers_block_scoped() {
        let t = tree(vec![
            namespace("Scoped.File", true, vec![]),
            namespace("Block.Ns", false, vec![]),
        ]);
        assert_eq!(namespace_of(&t), "Block.Ns");
    }

    #[test]
    fn test_namespace_file_scoped_and_global() {
        assert_eq!(namespace_of(&tree(vec![namespace("A.B", true, vec![])])), "A.B");
        assert_eq!(namespace_of(&tree(vec![class("X", &[], &[], vec![])])), "Global");
    }

    #[test]
    fn test_root_namespace() {
        assert_eq!(root_namespace("Foo.Bar.Baz"), "Foo");
        assert_eq!(root_namespace("Foo"), "Foo");
        assert_eq!(root_namespace("Global"), "Global");
        assert_eq!(root_namespace(""), "Global");
    }

    #[test]
    fn test_public_type_names() {
        let t = tree(vec![namespace(
            "Foo",
            false,
            vec![
                class("Visible", &["public"], &[], vec![class("Nested", &["internal"], &[], vec![])]),
                class("Hidden", &["private"], &[], vec![]),
            ],
        )]);
        assert_eq!(public_type_names(&t), vec!["Visible", "Nested"]);
    }

    #[test]
    fn test_plugin_name_from_expression_body() {
        let t = tree(vec![namespace(
            "Foo",
            false,
            vec![class(
                "MyPlugin",
                &["public"],
                &["TerrariaPlugin"],
                vec![SyntaxNode::Property {
                    name: "Name".into(),
                    value: PropertyValue::ExpressionBody {
                        expr: Expr::Literal("Fancy Plugin".into()),
                    },
                }],
            )],
        )]);
        assert_eq!(plugin_name(&t, "TerrariaPlugin").as_deref(), Some("Fancy Plugin"));
    }

    #[test]
    fn test_plugin_name_from_getter_and_fallback() {
        let getter = tree(vec![class(
            "P",
            &["public"],
            &["TShockAPI.TerrariaPlugin"],
            vec![SyntaxNode::Property {
                name: "Name".into(),
                value: PropertyValue::Getter {
                    first_return: Some(Expr::Literal("From Getter".into())),
                },
            }],
        )]);
        assert_eq!(plugin_name(&getter, "TerrariaPlugin").as_deref(), Some("From Getter"));

        let computed = tree(vec![class(
            "Computed",
            &["public"],
            &["TerrariaPlugin"],
            vec![SyntaxNode::Property {
                name: "Name".into(),
                value: PropertyValue::ExpressionBody {
                    expr: Expr::Other("GetName()".into()),
                },
            }],
        )]);
        assert_eq!(plugin_name(&computed, "TerrariaPlugin").as_deref(), Some("Computed"));
    }

    #[test]
    fn test_no_plugin_class() {
        let t = tree(vec![class("Helper", &["public"], &["IDisposable"], vec![])]);
        assert_eq!(plugin_name(&t, "TerrariaPlugin"), None);
    }
}
