//! Relation extraction
//!
//! Produces the cross-file edges for one file: imports, re-exports with
//! their specifier pairs, extends/implements heritage, calls into imported
//! modules, and type references. Module specifiers resolve against the
//! importing file with the accepted extensions, `index.*` fallback, and
//! tsconfig path aliases; unresolvable bare specifiers (packages) are kept
//! verbatim so the graph can still show them.

use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tree_sitter::Node;

use super::node_kinds as kinds;
use super::parser::{node_text, ParsedFile};
use super::symbols::base_type_name;
use crate::features::indexing::tsconfig::TsconfigPaths;
use gildash_store::{Relation, RelationType};

/// Resolution context for module specifiers.
pub struct ResolveOptions<'a> {
    /// When set, candidates are checked against the filesystem.
    pub project_root: Option<&'a Path>,
    pub extensions: &'a [String],
    pub paths: Option<&'a TsconfigPaths>,
}

/// One imported local binding: where it came from and its original name
/// (`default` for default imports, `*` for namespace imports).
#[derive(Debug, Clone)]
struct ImportedBinding {
    dst_file: String,
    original_name: String,
}

pub struct RelationExtractor;

impl RelationExtractor {
    pub fn extract(
        parsed: &ParsedFile,
        project: &str,
        file_path: &str,
        opts: &ResolveOptions<'_>,
    ) -> Vec<Relation> {
        let source = parsed.source_text.as_str();
        let root = parsed.root();
        let mut relations = Vec::new();

        // Pass 1: imports and re-exports, building the local binding map
        let mut bindings: HashMap<String, ImportedBinding> = HashMap::new();
        let mut local_functions: HashSet<String> = HashSet::new();
        let mut cursor = root.walk();
        for child in root.children(&mut cursor) {
            match child.kind() {
                kinds::IMPORT_STATEMENT => extract_import(
                    &child, source, project, file_path, opts, &mut bindings, &mut relations,
                ),
                kinds::EXPORT_STATEMENT => {
                    if child.child_by_field_name("source").is_some() {
                        extract_re_export(&child, source, project, file_path, opts, &mut relations);
                    }
                }
                kinds::FUNCTION_DECLARATION | kinds::GENERATOR_FUNCTION_DECLARATION => {
                    if let Some(name) = child.child_by_field_name("name") {
                        local_functions.insert(node_text(&name, source).to_string());
                    }
                }
                _ => {}
            }
        }

        // Pass 2: heritage, calls, and type references over the whole tree
        let mut walker = TreeWalker {
            source,
            project,
            file_path,
            bindings: &bindings,
            local_functions: &local_functions,
            seen_calls: HashSet::new(),
            seen_type_refs: HashSet::new(),
            relations: &mut relations,
        };
        walker.walk(&root);

        relations
    }
}

fn make_relation(
    project: &str,
    rel_type: RelationType,
    src_file: &str,
    src_symbol: Option<String>,
    dst_file: String,
    dst_symbol: Option<String>,
    meta: Value,
) -> Relation {
    Relation {
        project: project.to_string(),
        rel_type,
        src_file_path: src_file.to_string(),
        src_symbol_name: src_symbol,
        dst_file_path: dst_file,
        dst_symbol_name: dst_symbol,
        meta,
    }
}

// ── Imports & re-exports ───────────────────────────────────────────────

fn import_source(node: &Node<'_>, source: &str) -> Option<String> {
    let source_node = node.child_by_field_name("source")?;
    let text = node_text(&source_node, source);
    Some(text.trim_matches(|c| c == '"' || c == '\'').to_string())
}

fn extract_import(
    node: &Node<'_>,
    source: &str,
    project: &str,
    file_path: &str,
    opts: &ResolveOptions<'_>,
    bindings: &mut HashMap<String, ImportedBinding>,
    relations: &mut Vec<Relation>,
) {
    let Some(specifier) = import_source(node, source) else {
        return;
    };
    let dst_file = resolve_specifier(file_path, &specifier, opts);

    let mut imported_names = Vec::new();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() != kinds::IMPORT_CLAUSE {
            continue;
        }
        let mut clause_cursor = child.walk();
        for part in child.named_children(&mut clause_cursor) {
            match part.kind() {
                kinds::IDENTIFIER => {
                    // default import
                    let local = node_text(&part, source).to_string();
                    imported_names.push(local.clone());
                    bindings.insert(
                        local,
                        ImportedBinding {
                            dst_file: dst_file.clone(),
                            original_name: "default".to_string(),
                        },
                    );
                }
                kinds::NAMESPACE_IMPORT => {
                    if let Some(name) = part.named_child(0) {
                        let local = node_text(&name, source).to_string();
                        imported_names.push(local.clone());
                        bindings.insert(
                            local,
                            ImportedBinding {
                                dst_file: dst_file.clone(),
                                original_name: "*".to_string(),
                            },
                        );
                    }
                }
                kinds::NAMED_IMPORTS => {
                    let mut spec_cursor = part.walk();
                    for spec in part.named_children(&mut spec_cursor) {
                        if spec.kind() != kinds::IMPORT_SPECIFIER {
                            continue;
                        }
                        let Some(name) = spec.child_by_field_name("name") else {
                            continue;
                        };
                        let original = node_text(&name, source).to_string();
                        let local = spec
                            .child_by_field_name("alias")
                            .map(|alias| node_text(&alias, source).to_string())
                            .unwrap_or_else(|| original.clone());
                        imported_names.push(local.clone());
                        bindings.insert(
                            local,
                            ImportedBinding {
                                dst_file: dst_file.clone(),
                                original_name: original,
                            },
                        );
                    }
                }
                _ => {}
            }
        }
    }

    let meta = if imported_names.is_empty() {
        // side-effect import: `import './polyfill';`
        Value::Null
    } else {
        json!({ "specifiers": imported_names })
    };
    relations.push(make_relation(
        project,
        RelationType::Imports,
        file_path,
        None,
        dst_file,
        None,
        meta,
    ));
}

fn extract_re_export(
    node: &Node<'_>,
    source: &str,
    project: &str,
    file_path: &str,
    opts: &ResolveOptions<'_>,
    relations: &mut Vec<Relation>,
) {
    let Some(specifier) = import_source(node, source) else {
        return;
    };
    let dst_file = resolve_specifier(file_path, &specifier, opts);

    let mut specifiers = Vec::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() != kinds::EXPORT_CLAUSE {
            continue;
        }
        let mut spec_cursor = child.walk();
        for spec in child.named_children(&mut spec_cursor) {
            if spec.kind() != kinds::EXPORT_SPECIFIER {
                continue;
            }
            let Some(name) = spec.child_by_field_name("name") else {
                continue;
            };
            let local = node_text(&name, source).to_string();
            let exported = spec
                .child_by_field_name("alias")
                .map(|alias| node_text(&alias, source).to_string())
                .unwrap_or_else(|| local.clone());
            specifiers.push(json!({ "local": local, "exported": exported }));
        }
    }

    // `export * from './x'` carries no specifiers
    let meta = if specifiers.is_empty() {
        Value::Null
    } else {
        json!({ "specifiers": specifiers })
    };
    relations.push(make_relation(
        project,
        RelationType::ReExports,
        file_path,
        None,
        dst_file,
        None,
        meta,
    ));
}

// ── Heritage, calls, type references ───────────────────────────────────

struct TreeWalker<'a> {
    source: &'a str,
    project: &'a str,
    file_path: &'a str,
    bindings: &'a HashMap<String, ImportedBinding>,
    local_functions: &'a HashSet<String>,
    seen_calls: HashSet<(Option<String>, String, String)>,
    seen_type_refs: HashSet<(String, String)>,
    relations: &'a mut Vec<Relation>,
}

impl TreeWalker<'_> {
    fn walk(&mut self, node: &Node<'_>) {
        match node.kind() {
            kinds::CLASS_DECLARATION | kinds::ABSTRACT_CLASS_DECLARATION => {
                self.extract_class_heritage(node);
            }
            kinds::INTERFACE_DECLARATION => self.extract_interface_heritage(node),
            kinds::CALL_EXPRESSION => self.extract_call(node),
            kinds::TYPE_IDENTIFIER => self.extract_type_ref(node),
            _ => {}
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.walk(&child);
        }
    }

    /// Map a referenced name to its defining file and original name. Names
    /// that are not imported are assumed local.
    fn target_of(&self, name: &str) -> (String, String) {
        match self.bindings.get(name) {
            Some(binding) => {
                let original = if binding.original_name == "default" || binding.original_name == "*"
                {
                    name.to_string()
                } else {
                    binding.original_name.clone()
                };
                (binding.dst_file.clone(), original)
            }
            None => (self.file_path.to_string(), name.to_string()),
        }
    }

    fn extract_class_heritage(&mut self, node: &Node<'_>) {
        let Some(class_name) = node
            .child_by_field_name("name")
            .map(|n| node_text(&n, self.source).to_string())
        else {
            return;
        };
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() != kinds::CLASS_HERITAGE {
                continue;
            }
            let mut clause_cursor = child.walk();
            for clause in child.named_children(&mut clause_cursor) {
                let rel_type = match clause.kind() {
                    kinds::EXTENDS_CLAUSE => RelationType::Extends,
                    kinds::IMPLEMENTS_CLAUSE => RelationType::Implements,
                    _ => continue,
                };
                let mut item_cursor = clause.walk();
                for item in clause.named_children(&mut item_cursor) {
                    if !matches!(
                        item.kind(),
                        kinds::IDENTIFIER | kinds::TYPE_IDENTIFIER | kinds::GENERIC_TYPE
                    ) {
                        continue;
                    }
                    let base = base_type_name(&item, self.source);
                    let (dst_file, dst_symbol) = self.target_of(&base);
                    self.relations.push(make_relation(
                        self.project,
                        rel_type,
                        self.file_path,
                        Some(class_name.clone()),
                        dst_file,
                        Some(dst_symbol),
                        Value::Null,
                    ));
                }
            }
        }
    }

    fn extract_interface_heritage(&mut self, node: &Node<'_>) {
        let Some(interface_name) = node
            .child_by_field_name("name")
            .map(|n| node_text(&n, self.source).to_string())
        else {
            return;
        };
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() != kinds::EXTENDS_TYPE_CLAUSE {
                continue;
            }
            let mut item_cursor = child.walk();
            for item in child.named_children(&mut item_cursor) {
                if !matches!(item.kind(), kinds::TYPE_IDENTIFIER | kinds::GENERIC_TYPE) {
                    continue;
                }
                let base = base_type_name(&item, self.source);
                let (dst_file, dst_symbol) = self.target_of(&base);
                self.relations.push(make_relation(
                    self.project,
                    RelationType::Extends,
                    self.file_path,
                    Some(interface_name.clone()),
                    dst_file,
                    Some(dst_symbol),
                    Value::Null,
                ));
            }
        }
    }

    fn extract_call(&mut self, node: &Node<'_>) {
        let Some(callee) = node.child_by_field_name("function") else {
            return;
        };
        let (callee_name, via_namespace) = match callee.kind() {
            kinds::IDENTIFIER => (node_text(&callee, self.source).to_string(), None),
            kinds::MEMBER_EXPRESSION => {
                // NS.fn(...) where NS is a namespace import
                let object = callee.child_by_field_name("object");
                let property = callee.child_by_field_name("property");
                match (object, property) {
                    (Some(object), Some(property)) if object.kind() == kinds::IDENTIFIER => {
                        let ns = node_text(&object, self.source).to_string();
                        match self.bindings.get(&ns) {
                            Some(binding) if binding.original_name == "*" => (
                                node_text(&property, self.source).to_string(),
                                Some(binding.dst_file.clone()),
                            ),
                            _ => return,
                        }
                    }
                    _ => return,
                }
            }
            _ => return,
        };

        let (dst_file, dst_symbol) = match via_namespace {
            Some(dst_file) => (dst_file, callee_name.clone()),
            None => {
                if self.bindings.contains_key(&callee_name) {
                    self.target_of(&callee_name)
                } else if self.local_functions.contains(&callee_name) {
                    (self.file_path.to_string(), callee_name.clone())
                } else {
                    return; // built-ins, methods on locals, etc.
                }
            }
        };

        let src_symbol = enclosing_declaration_name(node, self.source);
        let key = (src_symbol.clone(), dst_file.clone(), dst_symbol.clone());
        if !self.seen_calls.insert(key) {
            return;
        }
        self.relations.push(make_relation(
            self.project,
            RelationType::Calls,
            self.file_path,
            src_symbol,
            dst_file,
            Some(dst_symbol),
            Value::Null,
        ));
    }

    fn extract_type_ref(&mut self, node: &Node<'_>) {
        let name = node_text(node, self.source).to_string();
        let Some(binding) = self.bindings.get(&name) else {
            return; // only cross-file references are edges
        };
        let original = if binding.original_name == "default" || binding.original_name == "*" {
            name.clone()
        } else {
            binding.original_name.clone()
        };
        let key = (binding.dst_file.clone(), original.clone());
        if !self.seen_type_refs.insert(key) {
            return;
        }
        self.relations.push(make_relation(
            self.project,
            RelationType::TypeRef,
            self.file_path,
            enclosing_declaration_name(node, self.source),
            binding.dst_file.clone(),
            Some(original),
            Value::Null,
        ));
    }
}

/// The name of the nearest enclosing function, method, or class.
fn enclosing_declaration_name(node: &Node<'_>, source: &str) -> Option<String> {
    let mut current = node.parent();
    while let Some(ancestor) = current {
        if matches!(
            ancestor.kind(),
            kinds::FUNCTION_DECLARATION
                | kinds::GENERATOR_FUNCTION_DECLARATION
                | kinds::METHOD_DEFINITION
                | kinds::CLASS_DECLARATION
                | kinds::ABSTRACT_CLASS_DECLARATION
        ) {
            if let Some(name) = ancestor.child_by_field_name("name") {
                return Some(node_text(&name, source).to_string());
            }
        }
        current = ancestor.parent();
    }
    None
}

// ── Module specifier resolution ────────────────────────────────────────

/// Resolve an import specifier to a project-relative path.
///
/// Relative specifiers join against the importing file's directory; alias
/// specifiers expand through tsconfig paths first. Candidates try the
/// specifier as written, each accepted extension, and `index.*` inside a
/// directory; the first candidate existing on disk wins when a root is
/// available. Bare package names come back unchanged.
pub fn resolve_specifier(importing_file: &str, specifier: &str, opts: &ResolveOptions<'_>) -> String {
    let remapped = remap_js_extension(specifier, opts.extensions);

    if remapped.starts_with("./") || remapped.starts_with("../") {
        let dir = parent_dir(importing_file);
        let base = normalize_join(&dir, &remapped);
        return pick_candidate(&base, opts);
    }

    if let Some(paths) = opts.paths {
        for expanded in paths.expand(&remapped) {
            let resolved = pick_candidate(&normalize_join("", &expanded), opts);
            if opts.project_root.is_none() {
                return resolved;
            }
            if let Some(root) = opts.project_root {
                if root.join(&resolved).exists() {
                    return resolved;
                }
            }
        }
    }

    remapped
}

/// ESM-style `./b.js` specifiers point at `./b.ts` on disk.
fn remap_js_extension(specifier: &str, extensions: &[String]) -> String {
    for (js, ts) in [(".js", ".ts"), (".mjs", ".mts"), (".cjs", ".cts")] {
        if specifier.ends_with(js) && extensions.iter().any(|e| e == ts) {
            return format!("{}{}", &specifier[..specifier.len() - js.len()], ts);
        }
    }
    specifier.to_string()
}

fn parent_dir(file_path: &str) -> String {
    match file_path.rfind('/') {
        Some(idx) => file_path[..idx].to_string(),
        None => String::new(),
    }
}

/// Join and normalize `.` / `..` segments, forward slashes only.
fn normalize_join(dir: &str, relative: &str) -> String {
    let mut segments: Vec<&str> = dir.split('/').filter(|s| !s.is_empty()).collect();
    for segment in relative.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

fn has_accepted_extension(path: &str, extensions: &[String]) -> bool {
    let lower = path.to_ascii_lowercase();
    extensions
        .iter()
        .any(|ext| lower.ends_with(&ext.to_ascii_lowercase()))
}

fn pick_candidate(base: &str, opts: &ResolveOptions<'_>) -> String {
    let mut candidates = Vec::new();
    if has_accepted_extension(base, opts.extensions) {
        candidates.push(base.to_string());
    } else {
        for ext in opts.extensions {
            candidates.push(format!("{base}{ext}"));
        }
        for ext in opts.extensions {
            candidates.push(format!("{base}/index{ext}"));
        }
    }

    if let Some(root) = opts.project_root {
        for candidate in &candidates {
            if root.join(candidate).exists() {
                return candidate.clone();
            }
        }
    }
    candidates.into_iter().next().unwrap_or_else(|| base.to_string())
}
