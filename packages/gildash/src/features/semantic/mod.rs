//! Semantic bridge
//!
//! Optional type-level query surface. The runtime only depends on the
//! [`SemanticAnalyzer`] trait; the default implementation answers
//! structurally from tree-sitter over the file contents the runtime feeds
//! it, and tests may inject their own analyzer through the config factory.
//! Watcher change events flow in via `notify_file_changed`, deletions via
//! `notify_file_deleted`; `dispose` runs before the store closes.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tree_sitter::Node;

use crate::features::parsing::node_kinds as kinds;
use crate::features::parsing::parser::{node_span, node_text, ParsedFile, SourceParser};
use crate::features::parsing::symbols::SymbolExtractor;
use crate::shared::error::{GildashError, Result};
use gildash_store::Span;

/// Builds the analyzer at open (or promotion) time.
pub type SemanticFactory =
    Arc<dyn Fn(&Path) -> Result<Arc<dyn SemanticAnalyzer>> + Send + Sync>;

/// Type information at a location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeInfo {
    pub name: String,
    pub type_text: String,
    pub span: Span,
}

/// A located symbol occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolLocation {
    pub file_path: String,
    pub name: String,
    pub span: Span,
}

/// One exported member of a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleExport {
    pub name: String,
    pub kind: String,
}

/// The semantic query surface the runtime forwards to.
pub trait SemanticAnalyzer: Send + Sync {
    /// Byte offset of a 1-based line / 0-based column position.
    fn line_column_to_position(&self, file_path: &str, line: u32, column: u32)
        -> Result<Option<usize>>;

    /// First occurrence of `name` in the file, as (line, column).
    fn find_name_position(&self, file_path: &str, name: &str) -> Result<Option<(u32, u32)>>;

    /// Declared type at a position, when one is annotated.
    fn collect_type_at(&self, file_path: &str, line: u32, column: u32) -> Result<Option<TypeInfo>>;

    /// Every annotated declaration in the file.
    fn collect_file_types(&self, file_path: &str) -> Result<Vec<TypeInfo>>;

    /// Occurrences of `name` across all tracked files.
    fn find_references(&self, name: &str) -> Result<Vec<SymbolLocation>>;

    /// Classes implementing the interface `name`.
    fn find_implementations(&self, name: &str) -> Result<Vec<SymbolLocation>>;

    /// Exported members of a module.
    fn get_module_interface(&self, file_path: &str) -> Result<Vec<ModuleExport>>;

    fn notify_file_changed(&self, file_path: &str, content: &str) -> Result<()>;

    fn notify_file_deleted(&self, file_path: &str) -> Result<()>;

    fn dispose(&self) -> Result<()>;
}

/// Default analyzer: structural answers over tracked file contents.
pub struct StructuralAnalyzer {
    parser: Mutex<SourceParser>,
    files: Mutex<HashMap<String, Arc<ParsedFile>>>,
}

impl StructuralAnalyzer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            parser: Mutex::new(SourceParser::new()?),
            files: Mutex::new(HashMap::new()),
        })
    }

    /// The default factory used when no override is configured.
    pub fn factory() -> SemanticFactory {
        Arc::new(|_root: &Path| {
            let analyzer = StructuralAnalyzer::new()
                .map_err(|err| GildashError::semantic("failed to initialize the semantic analyzer")
                    .with_source(err))?;
            Ok(Arc::new(analyzer) as Arc<dyn SemanticAnalyzer>)
        })
    }

    fn tracked(&self, file_path: &str) -> Result<Arc<ParsedFile>> {
        self.files.lock().get(file_path).cloned().ok_or_else(|| {
            GildashError::semantic(format!("{file_path} is not tracked by the semantic bridge"))
        })
    }

    fn walk_identifiers<'t>(
        node: &Node<'t>,
        source: &str,
        name: &str,
        hits: &mut Vec<Span>,
    ) {
        if matches!(
            node.kind(),
            kinds::IDENTIFIER | kinds::TYPE_IDENTIFIER | "property_identifier"
        ) && node_text(node, source) == name
        {
            hits.push(node_span(node));
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            Self::walk_identifiers(&child, source, name, hits);
        }
    }

    fn collect_annotations(node: &Node<'_>, source: &str, types: &mut Vec<TypeInfo>) {
        if matches!(
            node.kind(),
            kinds::VARIABLE_DECLARATOR
                | "required_parameter"
                | "optional_parameter"
                | kinds::PUBLIC_FIELD_DEFINITION
                | kinds::PROPERTY_SIGNATURE
        ) {
            let name = node
                .child_by_field_name("name")
                .or_else(|| node.child_by_field_name("pattern"))
                .map(|n| node_text(&n, source).to_string());
            let annotation = node.child_by_field_name("type");
            if let (Some(name), Some(annotation)) = (name, annotation) {
                types.push(TypeInfo {
                    name,
                    type_text: node_text(&annotation, source)
                        .trim_start_matches(':')
                        .trim()
                        .to_string(),
                    span: node_span(node),
                });
            }
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            Self::collect_annotations(&child, source, types);
        }
    }
}

impl SemanticAnalyzer for StructuralAnalyzer {
    fn line_column_to_position(
        &self,
        file_path: &str,
        line: u32,
        column: u32,
    ) -> Result<Option<usize>> {
        let parsed = self.tracked(file_path)?;
        let mut remaining = line.saturating_sub(1);
        let mut offset = 0usize;
        for text_line in parsed.source_text.split_inclusive('\n') {
            if remaining == 0 {
                let column = column as usize;
                if column > text_line.len() {
                    return Ok(None);
                }
                return Ok(Some(offset + column));
            }
            offset += text_line.len();
            remaining -= 1;
        }
        Ok(None)
    }

    fn find_name_position(&self, file_path: &str, name: &str) -> Result<Option<(u32, u32)>> {
        let parsed = self.tracked(file_path)?;
        let mut hits = Vec::new();
        Self::walk_identifiers(&parsed.root(), &parsed.source_text, name, &mut hits);
        Ok(hits
            .first()
            .map(|span| (span.start_line, span.start_column)))
    }

    fn collect_type_at(&self, file_path: &str, line: u32, column: u32) -> Result<Option<TypeInfo>> {
        let parsed = self.tracked(file_path)?;
        let mut types = Vec::new();
        Self::collect_annotations(&parsed.root(), &parsed.source_text, &mut types);
        Ok(types.into_iter().find(|info| {
            info.span.start_line <= line
                && line <= info.span.end_line
                && (info.span.start_line != line || info.span.start_column <= column)
        }))
    }

    fn collect_file_types(&self, file_path: &str) -> Result<Vec<TypeInfo>> {
        let parsed = self.tracked(file_path)?;
        let mut types = Vec::new();
        Self::collect_annotations(&parsed.root(), &parsed.source_text, &mut types);
        Ok(types)
    }

    fn find_references(&self, name: &str) -> Result<Vec<SymbolLocation>> {
        let files = self.files.lock();
        let mut locations = Vec::new();
        for (file_path, parsed) in files.iter() {
            let mut hits = Vec::new();
            Self::walk_identifiers(&parsed.root(), &parsed.source_text, name, &mut hits);
            locations.extend(hits.into_iter().map(|span| SymbolLocation {
                file_path: file_path.clone(),
                name: name.to_string(),
                span,
            }));
        }
        locations.sort_by(|a, b| {
            (&a.file_path, a.span.start_line, a.span.start_column)
                .cmp(&(&b.file_path, b.span.start_line, b.span.start_column))
        });
        Ok(locations)
    }

    fn find_implementations(&self, name: &str) -> Result<Vec<SymbolLocation>> {
        let files = self.files.lock();
        let mut locations = Vec::new();
        for (file_path, parsed) in files.iter() {
            let source = parsed.source_text.as_str();
            let root = parsed.root();
            let mut stack = vec![root];
            while let Some(node) = stack.pop() {
                if matches!(
                    node.kind(),
                    kinds::CLASS_DECLARATION | kinds::ABSTRACT_CLASS_DECLARATION
                ) {
                    if class_implements(&node, source, name) {
                        if let Some(class_name) = node.child_by_field_name("name") {
                            locations.push(SymbolLocation {
                                file_path: file_path.clone(),
                                name: node_text(&class_name, source).to_string(),
                                span: node_span(&node),
                            });
                        }
                    }
                }
                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    stack.push(child);
                }
            }
        }
        locations.sort_by(|a, b| a.file_path.cmp(&b.file_path));
        Ok(locations)
    }

    fn get_module_interface(&self, file_path: &str) -> Result<Vec<ModuleExport>> {
        let parsed = self.tracked(file_path)?;
        let symbols = SymbolExtractor::extract(&parsed, "", file_path);
        Ok(symbols
            .into_iter()
            .filter(|symbol| symbol.is_exported)
            .map(|symbol| ModuleExport {
                name: symbol.name,
                kind: symbol.kind.as_str().to_string(),
            })
            .collect())
    }

    fn notify_file_changed(&self, file_path: &str, content: &str) -> Result<()> {
        let parsed = self.parser.lock().parse(file_path, content)?;
        self.files
            .lock()
            .insert(file_path.to_string(), Arc::new(parsed));
        Ok(())
    }

    fn notify_file_deleted(&self, file_path: &str) -> Result<()> {
        self.files.lock().remove(file_path);
        Ok(())
    }

    fn dispose(&self) -> Result<()> {
        self.files.lock().clear();
        Ok(())
    }
}

fn class_implements(node: &Node<'_>, source: &str, interface: &str) -> bool {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() != kinds::CLASS_HERITAGE {
            continue;
        }
        let mut clause_cursor = child.walk();
        for clause in child.named_children(&mut clause_cursor) {
            if clause.kind() != kinds::IMPLEMENTS_CLAUSE {
                continue;
            }
            let mut item_cursor = clause.walk();
            for item in clause.named_children(&mut item_cursor) {
                if node_text(&item, source) == interface {
                    return true;
                }
            }
        }
    }
    false
}
