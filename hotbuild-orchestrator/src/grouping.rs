//! Namespace grouping
//!
//! Partitions parsed files into independent build units keyed by root
//! namespace. Units keep their encounter order inside a group and groups keep
//! the order in which their key was first seen.

use crate::ingest::ParsedUnit;
use crate::service::SourceFile;
use crate::syntax;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

const TARGET: &str = "hotbuild::group";

/// Files sharing one root namespace
#[derive(Debug)]
pub struct CompilationGroup {
    /// Root namespace; grouping and artifact naming key
    pub key: String,
    /// Namespace of the first unit, for display
    pub full_namespace: String,
    pub files: Vec<ParsedUnit>,
    pub sub_namespaces: BTreeSet<String>,
    /// Ordered union without duplicates
    pub public_type_names: Vec<String>,
    pub plugin_name: Option<String>,
}

impl CompilationGroup {
    fn new(unit: &ParsedUnit) -> Self {
        Self {
            key: unit.root_namespace.clone(),
            full_namespace: unit.namespace.clone(),
            files: Vec::new(),
            sub_namespaces: BTreeSet::new(),
            public_type_names: Vec::new(),
            plugin_name: None,
        }
    }

    fn push(&mut self, unit: ParsedUnit, plugin_base_type: &str) {
        self.sub_namespaces.insert(unit.namespace.clone());
        for name in &unit.public_type_names {
            if !self.public_type_names.contains(name) {
                self.public_type_names.push(name.clone());
            }
        }
        if self.plugin_name.is_none() {
            self.plugin_name = syntax::plugin_name(&unit.tree, plugin_base_type);
        }
        self.files.push(unit);
    }

    /// Current source texts in file order
    pub fn sources(&self) -> Vec<SourceFile> {
        self.files.iter().map(ParsedUnit::source_file).collect()
    }

    /// Name for logs: the plugin name when known, else the key
    pub fn display_name(&self) -> &str {
        self.plugin_name.as_deref().unwrap_or(&self.key)
    }
}

/// Partition `units` by root namespace, preserving encounter order
pub fn group_units(units: Vec<ParsedUnit>, plugin_base_type: &str) -> Vec<CompilationGroup> {
    let mut groups: Vec<CompilationGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for unit in units {
        let slot = match index.get(&unit.root_namespace) {
            Some(&slot) => slot,
            None => {
                groups.push(CompilationGroup::new(&unit));
                index.insert(unit.root_namespace.clone(), groups.len() - 1);
                groups.len() - 1
            }
        };
        groups[slot].push(unit, plugin_base_type);
    }

    for group in &groups {
        debug!(
            target: TARGET,
            key = %group.key,
            files = group.files.len(),
            namespaces = group.sub_namespaces.len(),
            "group formed"
        );
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{Expr, PropertyValue, SyntaxNode, SyntaxTree};
    use std::path::PathBuf;

    fn unit(path: &str, namespace: &str, types: &[&str]) -> ParsedUnit {
        ParsedUnit {
            path: PathBuf::from(path),
            text: String::new(),
            tree: SyntaxTree {
                path: PathBuf::from(path),
                outline: vec![],
                diagnostics: vec![],
            },
            namespace: namespace.to_string(),
            root_namespace: syntax::root_namespace(namespace),
            public_type_names: types.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_shared_root_forms_one_group() {
        let groups = group_units(
            vec![unit("/a.cs", "Foo.Bar", &["A"]), unit("/b.cs", "Foo.Baz", &["B", "A"])],
            "TerrariaPlugin",
        );
        assert_eq!(groups.len(), 1);
        let g = &groups[0];
        assert_eq!(g.key, "Foo");
        assert_eq!(g.full_namespace, "Foo.Bar");
        assert_eq!(g.files.len(), 2);
        assert_eq!(g.sub_namespaces.iter().collect::<Vec<_>>(), vec!["Foo.Bar", "Foo.Baz"]);
        assert_eq!(g.public_type_names, vec!["A", "B"]);
    }

    #[test]
    fn test_encounter_order_is_preserved() {
        let groups = group_units(
            vec![
                unit("/1.cs", "Zeta", &[]),
                unit("/2.cs", "Alpha.X", &[]),
                unit("/3.cs", "Global", &[]),
                unit("/4.cs", "Zeta.Y", &[]),
            ],
            "TerrariaPlugin",
        );
        let keys: Vec<&str> = groups.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["Zeta", "Alpha", "Global"]);
        let zeta: Vec<PathBuf> = groups[0].files.iter().map(|u| u.path.clone()).collect();
        assert_eq!(zeta, vec![PathBuf::from("/1.cs"), PathBuf::from("/4.cs")]);
    }

    #[test]
    fn test_plugin_name_is_picked_up() {
        let mut plugin = unit("/p.cs", "Foo", &["P"]);
        plugin.tree.outline = vec![SyntaxNode::Type {
            kind: "class".into(),
            name: "P".into(),
            modifiers: vec!["public".into()],
            bases: vec!["TerrariaPlugin".into()],
            members: vec![SyntaxNode::Property {
                name: "Name".into(),
                value: PropertyValue::ExpressionBody {
                    expr: Expr::Literal("Pretty".into()),
                },
            }],
        }];
        let groups = group_units(vec![unit("/a.cs", "Foo.A", &[]), plugin], "TerrariaPlugin");
        assert_eq!(groups[0].plugin_name.as_deref(), Some("Pretty"));
        assert_eq!(groups[0].display_name(), "Pretty");
    }
}
