//! Graph cache and query engine
//!
//! Lazily materializes one [`DependencyGraph`] per cache key and reuses it
//! until an index run or an explicit reindex drops it. The key is the
//! project name, or `__cross__` for the all-projects graph; requesting
//! type-reference edges builds under a distinct key so the default graph is
//! never polluted by type-only coupling.

use parking_lot::Mutex;
use std::sync::Arc;

use super::dep_graph::DependencyGraph;
use crate::shared::error::{GildashError, Result};
use gildash_store::{RelationType, SqliteStore};

/// Cross-project sentinel cache key.
pub const CROSS_PROJECT_KEY: &str = "__cross__";

/// Edge-set options for graph queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphQueryOptions {
    /// Merge `type-ref` edges into the graph (default: imports and
    /// re-exports only).
    pub include_type_refs: bool,
}

pub struct GraphEngine {
    store: SqliteStore,
    cache: Mutex<Option<(String, Arc<DependencyGraph>)>>,
}

impl GraphEngine {
    pub fn new(store: SqliteStore) -> Self {
        Self {
            store,
            cache: Mutex::new(None),
        }
    }

    fn cache_key(project: Option<&str>, options: GraphQueryOptions) -> String {
        let base = project.unwrap_or(CROSS_PROJECT_KEY);
        if options.include_type_refs {
            format!("{base}+type-refs")
        } else {
            base.to_string()
        }
    }

    /// The graph for `project` (or the cross-project graph), building and
    /// caching it on first use.
    pub fn graph_for(
        &self,
        project: Option<&str>,
        options: GraphQueryOptions,
    ) -> Result<Arc<DependencyGraph>> {
        let key = Self::cache_key(project, options);
        {
            let cache = self.cache.lock();
            if let Some((cached_key, graph)) = cache.as_ref() {
                if *cached_key == key {
                    return Ok(Arc::clone(graph));
                }
            }
        }

        let graph = Arc::new(self.build(project, options)?);
        *self.cache.lock() = Some((key, Arc::clone(&graph)));
        Ok(graph)
    }

    fn build(
        &self,
        project: Option<&str>,
        options: GraphQueryOptions,
    ) -> Result<DependencyGraph> {
        let mut edge_types = vec![RelationType::Imports, RelationType::ReExports];
        if options.include_type_refs {
            edge_types.push(RelationType::TypeRef);
        }

        let relations = match project {
            Some(project) => {
                let mut rows = Vec::new();
                for rel_type in &edge_types {
                    rows.extend(self.store.get_by_type(project, *rel_type).map_err(|err| {
                        GildashError::search(format!(
                            "failed to load {rel_type} relations for the dependency graph"
                        ))
                        .with_source(err)
                    })?);
                }
                rows
            }
            None => self.store.get_by_types_all_projects(&edge_types).map_err(|err| {
                GildashError::search("failed to load relations for the cross-project graph")
                    .with_source(err)
            })?,
        };

        Ok(DependencyGraph::build(&relations))
    }

    /// Drop the cached graph. Called after every index run and on reindex.
    pub fn invalidate(&self) {
        *self.cache.lock() = None;
    }

    /// The key of the currently cached graph, if any.
    pub fn cached_key(&self) -> Option<String> {
        self.cache.lock().as_ref().map(|(key, _)| key.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gildash_store::Relation;

    fn store_with_chain() -> SqliteStore {
        let store = SqliteStore::in_memory().unwrap();
        let rel = |src: &str, dst: &str, rel_type: RelationType| Relation {
            project: "p".into(),
            rel_type,
            src_file_path: src.into(),
            src_symbol_name: None,
            dst_file_path: dst.into(),
            dst_symbol_name: None,
            meta: serde_json::Value::Null,
        };
        store
            .replace_file_relations(
                "p",
                "a.ts",
                &[
                    rel("a.ts", "b.ts", RelationType::Imports),
                    rel("a.ts", "t.ts", RelationType::TypeRef),
                ],
            )
            .unwrap();
        store
            .replace_file_relations("p", "b.ts", &[rel("b.ts", "c.ts", RelationType::Imports)])
            .unwrap();
        store
    }

    #[test]
    fn first_query_builds_and_caches() {
        let engine = GraphEngine::new(store_with_chain());
        assert_eq!(engine.cached_key(), None);
        let graph = engine.graph_for(Some("p"), GraphQueryOptions::default()).unwrap();
        assert_eq!(graph.dependencies("a.ts"), vec!["b.ts"]);
        assert_eq!(engine.cached_key(), Some("p".to_string()));

        // Same key reuses the cached build
        let again = engine.graph_for(Some("p"), GraphQueryOptions::default()).unwrap();
        assert!(Arc::ptr_eq(&graph, &again));
    }

    #[test]
    fn invalidate_clears_the_key_until_next_query() {
        let engine = GraphEngine::new(store_with_chain());
        engine.graph_for(Some("p"), GraphQueryOptions::default()).unwrap();
        engine.invalidate();
        assert_eq!(engine.cached_key(), None);
        engine.graph_for(Some("p"), GraphQueryOptions::default()).unwrap();
        assert_eq!(engine.cached_key(), Some("p".to_string()));
    }

    #[test]
    fn type_refs_build_under_a_distinct_key() {
        let engine = GraphEngine::new(store_with_chain());
        let plain = engine.graph_for(Some("p"), GraphQueryOptions::default()).unwrap();
        assert!(plain.dependencies("a.ts") == vec!["b.ts"]);

        let with_types = engine
            .graph_for(
                Some("p"),
                GraphQueryOptions {
                    include_type_refs: true,
                },
            )
            .unwrap();
        assert_eq!(with_types.dependencies("a.ts"), vec!["b.ts", "t.ts"]);
        assert_eq!(engine.cached_key(), Some("p+type-refs".to_string()));
    }

    #[test]
    fn cross_project_uses_the_sentinel_key() {
        let engine = GraphEngine::new(store_with_chain());
        engine.graph_for(None, GraphQueryOptions::default()).unwrap();
        assert_eq!(engine.cached_key(), Some(CROSS_PROJECT_KEY.to_string()));
    }
}
