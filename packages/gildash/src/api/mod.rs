//! Public façade
//!
//! Thin surface over the runtime. Every operation passes the closed gate
//! first; semantic operations additionally require the bridge. A missing
//! `project` argument defaults to the project discovered at open time.

use std::sync::Arc;

use crate::config::GildashConfig;
use crate::features::graph::dep_graph::{CycleOptions, DependencyGraph, FanMetrics};
use crate::features::graph::engine::GraphQueryOptions;
use crate::features::indexing::coordinator::IndexResult;
use crate::features::parsing::diff::{diff_symbols, SymbolDiff};
use crate::features::parsing::parser::{ParsedFile, SourceParser};
use crate::features::parsing::pattern::{search_pattern, PatternMatch, PatternQuery};
use crate::features::parsing::relations::{RelationExtractor, ResolveOptions};
use crate::features::parsing::symbols::SymbolExtractor;
use crate::features::resolve::heritage::{heritage_tree, HeritageNode};
use crate::features::resolve::reexport::{resolve_symbol, ResolvedSymbol};
use crate::features::semantic::{ModuleExport, SemanticAnalyzer, SymbolLocation, TypeInfo};
use crate::runtime::callbacks::Subscription;
use crate::runtime::lifecycle::{ProjectBoundary, Role, Runtime};
use crate::shared::error::{GildashError, Result};
use gildash_store::{
    FileRecord, IndexStats, Relation, RelationQuery, Symbol, SymbolQuery,
};

/// A persistent, incrementally maintained index of a TypeScript source tree.
///
/// Open one instance per process per project root. The first opener of a
/// store becomes the owner and maintains the index; later openers are
/// readers that promote automatically when the owner goes away.
///
/// # Example
/// ```ignore
/// use gildash::{Gildash, GildashConfig};
///
/// let gildash = Gildash::open(GildashConfig::new("/abs/path/to/project"))?;
/// let symbols = gildash.search_symbols(gildash::SymbolQuery {
///     text: Some("handleRequest".into()),
///     ..Default::default()
/// })?;
/// gildash.close()?;
/// ```
pub struct Gildash {
    runtime: Arc<Runtime>,
}

impl Gildash {
    /// Open against `config.project_root`. See the crate docs for the role
    /// protocol this kicks off.
    pub fn open(config: GildashConfig) -> Result<Gildash> {
        Ok(Gildash {
            runtime: Runtime::open(config)?,
        })
    }

    /// Tear the instance down. Idempotent; a second close is a no-op.
    pub fn close(&self) -> Result<()> {
        self.runtime.close()
    }

    fn gate(&self) -> Result<()> {
        if self.runtime.is_closed() {
            return Err(GildashError::closed("gildash instance is closed"));
        }
        Ok(())
    }

    fn semantic_gate(&self) -> Result<Arc<dyn SemanticAnalyzer>> {
        self.gate()?;
        self.runtime
            .semantic
            .lock()
            .clone()
            .ok_or_else(|| GildashError::semantic("semantic analysis is not enabled"))
    }

    fn project_or_default(&self, project: Option<&str>) -> String {
        project
            .unwrap_or(&self.runtime.default_project)
            .to_string()
    }

    // ── Identity ───────────────────────────────────────────────────────

    pub fn default_project(&self) -> &str {
        &self.runtime.default_project
    }

    /// A fresh copy of the discovered project boundaries; mutating the
    /// returned list never affects internal state.
    pub fn projects(&self) -> Result<Vec<ProjectBoundary>> {
        self.gate()?;
        Ok(self.runtime.project_boundaries())
    }

    pub fn role(&self) -> Role {
        self.runtime.role()
    }

    pub fn is_owner(&self) -> bool {
        self.runtime.role() == Role::Owner
    }

    // ── Search ─────────────────────────────────────────────────────────

    pub fn search_symbols(&self, mut query: SymbolQuery) -> Result<Vec<Symbol>> {
        self.gate()?;
        if query.project.is_none() {
            query.project = Some(self.runtime.default_project.clone());
        }
        Ok(self.runtime.store.search_symbols(&query)?)
    }

    pub fn search_relations(&self, mut query: RelationQuery) -> Result<Vec<Relation>> {
        self.gate()?;
        if query.project.is_none() {
            query.project = Some(self.runtime.default_project.clone());
        }
        Ok(self.runtime.store.search_relations(&query)?)
    }

    /// Run a tree-sitter pattern query over the project's source files.
    pub fn search_pattern(
        &self,
        project: Option<&str>,
        query: &PatternQuery,
    ) -> Result<Vec<PatternMatch>> {
        self.gate()?;
        let project = self.project_or_default(project);
        search_pattern(
            &self.runtime.store,
            &self.runtime.config.project_root,
            &project,
            query,
        )
    }

    // ── Files & stats ──────────────────────────────────────────────────

    pub fn get_file(&self, project: Option<&str>, file_path: &str) -> Result<Option<FileRecord>> {
        self.gate()?;
        let project = self.project_or_default(project);
        Ok(self.runtime.store.get_file(&project, file_path)?)
    }

    pub fn get_all_files(&self, project: Option<&str>) -> Result<Vec<FileRecord>> {
        self.gate()?;
        let project = self.project_or_default(project);
        Ok(self.runtime.store.get_all_files(&project)?)
    }

    pub fn get_file_symbols(&self, project: Option<&str>, file_path: &str) -> Result<Vec<Symbol>> {
        self.gate()?;
        let project = self.project_or_default(project);
        Ok(self.runtime.store.get_file_symbols(&project, file_path)?)
    }

    pub fn get_stats(&self, project: Option<&str>) -> Result<IndexStats> {
        self.gate()?;
        let project = self.project_or_default(project);
        Ok(self.runtime.store.get_stats(&project)?)
    }

    // ── Dependency graph ───────────────────────────────────────────────

    fn graph(
        &self,
        project: Option<&str>,
        options: GraphQueryOptions,
    ) -> Result<Arc<DependencyGraph>> {
        self.gate()?;
        let project = self.project_or_default(project);
        self.runtime.graph.graph_for(Some(&project), options)
    }

    pub fn get_dependencies(&self, project: Option<&str>, file: &str) -> Result<Vec<String>> {
        Ok(self.graph(project, GraphQueryOptions::default())?.dependencies(file))
    }

    pub fn get_dependents(&self, project: Option<&str>, file: &str) -> Result<Vec<String>> {
        Ok(self.graph(project, GraphQueryOptions::default())?.dependents(file))
    }

    pub fn get_transitive_dependencies(
        &self,
        project: Option<&str>,
        file: &str,
    ) -> Result<Vec<String>> {
        Ok(self
            .graph(project, GraphQueryOptions::default())?
            .transitive_dependencies(file))
    }

    /// The transitive dependents of `changed`, inclusive of `changed`.
    pub fn get_affected_files(
        &self,
        project: Option<&str>,
        changed: &[String],
    ) -> Result<Vec<String>> {
        Ok(self.graph(project, GraphQueryOptions::default())?.affected(changed))
    }

    pub fn has_circular_dependencies(&self, project: Option<&str>) -> Result<bool> {
        Ok(self.graph(project, GraphQueryOptions::default())?.has_cycle())
    }

    pub fn get_cycle_paths(
        &self,
        project: Option<&str>,
        options: CycleOptions,
    ) -> Result<Vec<Vec<String>>> {
        Ok(self.graph(project, GraphQueryOptions::default())?.cycle_paths(options))
    }

    /// A copy of the adjacency mapping.
    pub fn get_adjacency(
        &self,
        project: Option<&str>,
    ) -> Result<std::collections::BTreeMap<String, Vec<String>>> {
        Ok(self.graph(project, GraphQueryOptions::default())?.adjacency())
    }

    pub fn get_fan_metrics(&self, project: Option<&str>, file: &str) -> Result<FanMetrics> {
        Ok(self.graph(project, GraphQueryOptions::default())?.fan_metrics(file))
    }

    /// Graph access with an explicit edge set (e.g. including `type-ref`).
    pub fn dependency_graph(
        &self,
        project: Option<&str>,
        options: GraphQueryOptions,
    ) -> Result<Arc<DependencyGraph>> {
        self.graph(project, options)
    }

    // ── Resolution ─────────────────────────────────────────────────────

    /// Follow re-export chains back to the original declaration.
    pub fn resolve_symbol(
        &self,
        project: Option<&str>,
        symbol_name: &str,
        starting_file: &str,
    ) -> Result<ResolvedSymbol> {
        self.gate()?;
        let project = self.project_or_default(project);
        resolve_symbol(&self.runtime.store, &project, symbol_name, starting_file)
    }

    /// The extends/implements ancestry of a symbol.
    pub fn get_heritage_tree(
        &self,
        project: Option<&str>,
        symbol_name: &str,
        file_path: &str,
    ) -> Result<HeritageNode> {
        self.gate()?;
        let project = self.project_or_default(project);
        heritage_tree(&self.runtime.store, &project, symbol_name, file_path)
    }

    // ── Stateless derivation helpers ───────────────────────────────────

    pub fn parse_source(&self, file_path: &str, source: &str) -> Result<ParsedFile> {
        self.gate()?;
        SourceParser::new()?.parse(file_path, source)
    }

    pub fn extract_symbols(&self, file_path: &str, source: &str) -> Result<Vec<Symbol>> {
        self.gate()?;
        let parsed = SourceParser::new()?.parse(file_path, source)?;
        Ok(SymbolExtractor::extract(
            &parsed,
            &self.runtime.default_project,
            file_path,
        ))
    }

    pub fn extract_relations(&self, file_path: &str, source: &str) -> Result<Vec<Relation>> {
        self.gate()?;
        let parsed = SourceParser::new()?.parse(file_path, source)?;
        Ok(RelationExtractor::extract(
            &parsed,
            &self.runtime.default_project,
            file_path,
            &ResolveOptions {
                project_root: Some(&self.runtime.config.project_root),
                extensions: &self.runtime.config.extensions,
                paths: None,
            },
        ))
    }

    pub fn diff_symbols(&self, before: &[Symbol], after: &[Symbol]) -> Result<SymbolDiff> {
        self.gate()?;
        Ok(diff_symbols(before, after))
    }

    // ── Indexing ───────────────────────────────────────────────────────

    /// Run a full index now. Owners (and one-shot snapshots) only; readers
    /// fail with `closed`.
    pub fn reindex(&self) -> Result<IndexResult> {
        self.gate()?;
        self.runtime.reindex()
    }

    /// Subscribe to index-run results. The handle unsubscribes; it is
    /// idempotent and survives owner promotion.
    pub fn on_indexed(
        &self,
        callback: impl Fn(&IndexResult) + Send + Sync + 'static,
    ) -> Result<Subscription> {
        self.gate()?;
        Ok(self.runtime.callbacks.subscribe(Arc::new(callback)))
    }

    // ── Semantic operations ────────────────────────────────────────────

    pub fn find_references(&self, name: &str) -> Result<Vec<SymbolLocation>> {
        self.semantic_gate()?.find_references(name)
    }

    pub fn find_implementations(&self, name: &str) -> Result<Vec<SymbolLocation>> {
        self.semantic_gate()?.find_implementations(name)
    }

    pub fn collect_type_at(
        &self,
        file_path: &str,
        line: u32,
        column: u32,
    ) -> Result<Option<TypeInfo>> {
        self.semantic_gate()?.collect_type_at(file_path, line, column)
    }

    pub fn collect_file_types(&self, file_path: &str) -> Result<Vec<TypeInfo>> {
        self.semantic_gate()?.collect_file_types(file_path)
    }

    pub fn get_module_interface(&self, file_path: &str) -> Result<Vec<ModuleExport>> {
        self.semantic_gate()?.get_module_interface(file_path)
    }

    pub fn find_name_position(&self, file_path: &str, name: &str) -> Result<Option<(u32, u32)>> {
        self.semantic_gate()?.find_name_position(file_path, name)
    }

    pub fn line_column_to_position(
        &self,
        file_path: &str,
        line: u32,
        column: u32,
    ) -> Result<Option<usize>> {
        self.semantic_gate()?
            .line_column_to_position(file_path, line, column)
    }
}

impl Drop for Gildash {
    fn drop(&mut self) {
        if !self.runtime.is_closed() {
            if let Err(err) = self.runtime.close() {
                tracing::warn!(error = %err, "close during drop reported errors");
            }
        }
    }
}
