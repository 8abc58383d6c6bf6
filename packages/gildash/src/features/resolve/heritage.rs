//! Heritage tree construction
//!
//! Builds the extends/implements ancestry of a symbol by recursing through
//! relation rows. A `symbol::file` visited set turns inheritance cycles into
//! leaf nodes instead of unbounded recursion.

use serde::Serialize;
use std::collections::HashSet;

use crate::shared::error::{GildashError, Result};
use gildash_store::{RelationQuery, RelationType, SqliteStore};

/// One node of a heritage tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeritageNode {
    pub symbol_name: String,
    pub file_path: String,
    /// `extends` or `implements` for non-root nodes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub children: Vec<HeritageNode>,
}

/// Build the heritage tree rooted at `(symbol_name, file_path)`.
pub fn heritage_tree(
    store: &SqliteStore,
    project: &str,
    symbol_name: &str,
    file_path: &str,
) -> Result<HeritageNode> {
    let mut visited = HashSet::new();
    build_node(store, project, symbol_name, file_path, None, &mut visited)
}

fn build_node(
    store: &SqliteStore,
    project: &str,
    symbol_name: &str,
    file_path: &str,
    kind: Option<String>,
    visited: &mut HashSet<String>,
) -> Result<HeritageNode> {
    let key = format!("{symbol_name}::{file_path}");
    if !visited.insert(key) {
        // Revisit: terminate the cycle with a leaf
        return Ok(HeritageNode {
            symbol_name: symbol_name.to_string(),
            file_path: file_path.to_string(),
            kind,
            children: Vec::new(),
        });
    }

    let relations = store
        .search_relations(&RelationQuery {
            project: Some(project.to_string()),
            src_file_path: Some(file_path.to_string()),
            src_symbol_name: Some(symbol_name.to_string()),
            ..Default::default()
        })
        .map_err(|err| {
            GildashError::search(format!(
                "failed to load heritage relations for {symbol_name} in {file_path}"
            ))
            .with_source(err)
        })?;

    let mut children = Vec::new();
    for relation in relations {
        if !matches!(
            relation.rel_type,
            RelationType::Extends | RelationType::Implements
        ) {
            continue;
        }
        let Some(ref dst_symbol) = relation.dst_symbol_name else {
            continue;
        };
        children.push(build_node(
            store,
            project,
            dst_symbol,
            &relation.dst_file_path,
            Some(relation.rel_type.as_str().to_string()),
            visited,
        )?);
    }

    Ok(HeritageNode {
        symbol_name: symbol_name.to_string(),
        file_path: file_path.to_string(),
        kind,
        children,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gildash_store::Relation;

    fn relation(
        rel_type: RelationType,
        src_file: &str,
        src_symbol: &str,
        dst_file: &str,
        dst_symbol: Option<&str>,
    ) -> Relation {
        Relation {
            project: "p".into(),
            rel_type,
            src_file_path: src_file.into(),
            src_symbol_name: Some(src_symbol.into()),
            dst_file_path: dst_file.into(),
            dst_symbol_name: dst_symbol.map(Into::into),
            meta: serde_json::Value::Null,
        }
    }

    #[test]
    fn walks_extends_and_implements() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .replace_file_relations(
                "p",
                "src/child.ts",
                &[
                    relation(
                        RelationType::Extends,
                        "src/child.ts",
                        "Child",
                        "src/base.ts",
                        Some("Base"),
                    ),
                    relation(
                        RelationType::Implements,
                        "src/child.ts",
                        "Child",
                        "src/marker.ts",
                        Some("Marker"),
                    ),
                    // Unrelated relation types are ignored
                    relation(
                        RelationType::Imports,
                        "src/child.ts",
                        "Child",
                        "src/util.ts",
                        None,
                    ),
                ],
            )
            .unwrap();

        let tree = heritage_tree(&store, "p", "Child", "src/child.ts").unwrap();
        assert_eq!(tree.symbol_name, "Child");
        assert_eq!(tree.kind, None);
        assert_eq!(tree.children.len(), 2);
        assert_eq!(tree.children[0].symbol_name, "Base");
        assert_eq!(tree.children[0].kind.as_deref(), Some("extends"));
        assert_eq!(tree.children[1].symbol_name, "Marker");
        assert_eq!(tree.children[1].kind.as_deref(), Some("implements"));
    }

    #[test]
    fn null_destination_symbols_are_skipped() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .replace_file_relations(
                "p",
                "src/child.ts",
                &[relation(
                    RelationType::Extends,
                    "src/child.ts",
                    "Child",
                    "src/base.ts",
                    None,
                )],
            )
            .unwrap();

        let tree = heritage_tree(&store, "p", "Child", "src/child.ts").unwrap();
        assert!(tree.children.is_empty());
    }

    #[test]
    fn self_extension_terminates_with_a_single_leaf_child() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .replace_file_relations(
                "p",
                "src/a.ts",
                &[relation(
                    RelationType::Extends,
                    "src/a.ts",
                    "A",
                    "src/a.ts",
                    Some("A"),
                )],
            )
            .unwrap();

        let tree = heritage_tree(&store, "p", "A", "src/a.ts").unwrap();
        assert_eq!(tree.children.len(), 1);
        assert_eq!(tree.children[0].symbol_name, "A");
        assert!(tree.children[0].children.is_empty());
    }

    #[test]
    fn deep_chains_recurse() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .replace_file_relations(
                "p",
                "src/c.ts",
                &[relation(RelationType::Extends, "src/c.ts", "C", "src/b.ts", Some("B"))],
            )
            .unwrap();
        store
            .replace_file_relations(
                "p",
                "src/b.ts",
                &[relation(RelationType::Extends, "src/b.ts", "B", "src/a.ts", Some("A"))],
            )
            .unwrap();

        let tree = heritage_tree(&store, "p", "C", "src/c.ts").unwrap();
        assert_eq!(tree.children[0].symbol_name, "B");
        assert_eq!(tree.children[0].children[0].symbol_name, "A");
    }
}
