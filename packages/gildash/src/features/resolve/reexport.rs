//! Re-export chain resolution
//!
//! Follows `re-exports` relations from an aliased name back to its original
//! declaration, collecting the chain of intermediate files. Relations carry
//! untyped `meta`; rows whose meta does not hold a usable `specifiers` array
//! are skipped rather than failed, since relations written by foreign tools
//! may use forms we do not recognize.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;

use crate::shared::error::{GildashError, Result};
use gildash_store::{RelationQuery, RelationType, SqliteStore};

/// One hop in a re-export chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReExportHop {
    pub file_path: String,
    pub exported_as: String,
}

/// Result of [`resolve_symbol`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedSymbol {
    pub original_name: String,
    pub original_file_path: String,
    pub re_export_chain: Vec<ReExportHop>,
    pub circular: bool,
}

/// Follow re-export specifiers from `(symbol_name, starting_file)` to the
/// original declaration site.
pub fn resolve_symbol(
    store: &SqliteStore,
    project: &str,
    symbol_name: &str,
    starting_file: &str,
) -> Result<ResolvedSymbol> {
    let mut current_file = starting_file.to_string();
    let mut current_name = symbol_name.to_string();
    let mut chain: Vec<ReExportHop> = Vec::new();
    let mut visited: HashSet<(String, String)> = HashSet::new();
    visited.insert((current_file.clone(), current_name.clone()));

    loop {
        let relations = store
            .search_relations(&RelationQuery {
                project: Some(project.to_string()),
                rel_type: Some(RelationType::ReExports),
                src_file_path: Some(current_file.clone()),
                ..Default::default()
            })
            .map_err(|err| {
                GildashError::search(format!(
                    "failed to load re-export relations for {current_file}"
                ))
                .with_source(err)
            })?;

        let mut next: Option<(String, String)> = None;
        for relation in &relations {
            let Some(specifiers) = parse_specifiers(&relation.meta) else {
                continue;
            };
            if let Some(local) = specifiers
                .iter()
                .find(|(_, exported)| *exported == current_name)
                .map(|(local, _)| local.clone())
            {
                next = Some((relation.dst_file_path.clone(), local));
                break;
            }
        }

        let Some((next_file, next_name)) = next else {
            // No specifier matches here (including bare `export *`): this is
            // where the symbol originates.
            return Ok(ResolvedSymbol {
                original_name: current_name,
                original_file_path: current_file,
                re_export_chain: chain,
                circular: false,
            });
        };

        chain.push(ReExportHop {
            file_path: current_file.clone(),
            exported_as: current_name.clone(),
        });

        if !visited.insert((next_file.clone(), next_name.clone())) {
            return Ok(ResolvedSymbol {
                original_name: next_name,
                original_file_path: next_file,
                re_export_chain: chain,
                circular: true,
            });
        }

        current_file = next_file;
        current_name = next_name;
    }
}

/// Pull `(local, exported)` pairs out of a relation's meta, or `None` when
/// the meta is malformed or carries no specifiers.
fn parse_specifiers(meta: &Value) -> Option<Vec<(String, String)>> {
    let array = meta.get("specifiers")?.as_array()?;
    let pairs: Vec<(String, String)> = array
        .iter()
        .filter_map(|entry| {
            let local = entry.get("local")?.as_str()?;
            let exported = entry.get("exported")?.as_str()?;
            Some((local.to_string(), exported.to_string()))
        })
        .collect();
    if pairs.is_empty() {
        None
    } else {
        Some(pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gildash_store::Relation;
    use serde_json::json;

    fn re_export(src: &str, dst: &str, meta: Value) -> Relation {
        Relation {
            project: "p".into(),
            rel_type: RelationType::ReExports,
            src_file_path: src.into(),
            src_symbol_name: None,
            dst_file_path: dst.into(),
            dst_symbol_name: None,
            meta,
        }
    }

    #[test]
    fn symbol_without_re_exports_resolves_to_itself() {
        let store = SqliteStore::in_memory().unwrap();
        let resolved = resolve_symbol(&store, "p", "Foo", "src/a.ts").unwrap();
        assert_eq!(resolved.original_name, "Foo");
        assert_eq!(resolved.original_file_path, "src/a.ts");
        assert!(resolved.re_export_chain.is_empty());
        assert!(!resolved.circular);
    }

    #[test]
    fn single_alias_hop_is_followed() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .replace_file_relations(
                "p",
                "src/index.ts",
                &[re_export(
                    "src/index.ts",
                    "src/impl.ts",
                    json!({"specifiers": [{"local": "Impl", "exported": "Foo"}]}),
                )],
            )
            .unwrap();

        let resolved = resolve_symbol(&store, "p", "Foo", "src/index.ts").unwrap();
        assert_eq!(resolved.original_name, "Impl");
        assert_eq!(resolved.original_file_path, "src/impl.ts");
        assert_eq!(
            resolved.re_export_chain,
            vec![ReExportHop {
                file_path: "src/index.ts".into(),
                exported_as: "Foo".into(),
            }]
        );
        assert!(!resolved.circular);
    }

    #[test]
    fn circular_chain_is_detected_with_a_non_empty_chain() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .replace_file_relations(
                "p",
                "src/a.ts",
                &[re_export(
                    "src/a.ts",
                    "src/b.ts",
                    json!({"specifiers": [{"local": "X", "exported": "X"}]}),
                )],
            )
            .unwrap();
        store
            .replace_file_relations(
                "p",
                "src/b.ts",
                &[re_export(
                    "src/b.ts",
                    "src/a.ts",
                    json!({"specifiers": [{"local": "X", "exported": "X"}]}),
                )],
            )
            .unwrap();

        let resolved = resolve_symbol(&store, "p", "X", "src/a.ts").unwrap();
        assert!(resolved.circular);
        assert!(!resolved.re_export_chain.is_empty());
    }

    #[test]
    fn bare_export_star_terminates_here() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .replace_file_relations(
                "p",
                "src/index.ts",
                &[re_export("src/index.ts", "src/all.ts", Value::Null)],
            )
            .unwrap();

        let resolved = resolve_symbol(&store, "p", "Anything", "src/index.ts").unwrap();
        assert_eq!(resolved.original_file_path, "src/index.ts");
        assert!(!resolved.circular);
    }

    #[test]
    fn malformed_meta_is_skipped_silently() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .replace_file_relations(
                "p",
                "src/index.ts",
                &[
                    re_export("src/index.ts", "src/junk.ts", json!({"specifiers": "oops"})),
                    re_export(
                        "src/index.ts",
                        "src/real.ts",
                        json!({"specifiers": [{"local": "Real", "exported": "Foo"}]}),
                    ),
                ],
            )
            .unwrap();

        let resolved = resolve_symbol(&store, "p", "Foo", "src/index.ts").unwrap();
        assert_eq!(resolved.original_name, "Real");
        assert_eq!(resolved.original_file_path, "src/real.ts");
    }
}
