//! Symbol extraction
//!
//! Walks a parsed TypeScript tree and produces the symbol rows for one file:
//! functions (including exported arrow constants), classes with their methods
//! and properties, interfaces, type aliases, enums, and variables. Extraction
//! is purely syntactic; type resolution belongs to the semantic bridge.

use serde_json::{json, Map, Value};
use tree_sitter::Node;

use super::fingerprint::fingerprint_symbol;
use super::node_kinds as kinds;
use super::parser::{node_span, node_text, ParsedFile};
use gildash_store::{Symbol, SymbolKind};

pub struct SymbolExtractor;

impl SymbolExtractor {
    /// Extract every symbol declared in `parsed`, stamping rows with the
    /// given project and project-relative path.
    pub fn extract(parsed: &ParsedFile, project: &str, file_path: &str) -> Vec<Symbol> {
        let source = parsed.source_text.as_str();
        let root = parsed.root();
        let exported_names = collect_locally_exported_names(&root, source);

        let mut ctx = ExtractContext {
            project,
            file_path,
            source,
            parsed,
            exported_names,
            symbols: Vec::new(),
        };

        let mut cursor = root.walk();
        for child in root.children(&mut cursor) {
            ctx.extract_statement(&child, false);
        }
        ctx.symbols
    }
}

struct ExtractContext<'a> {
    project: &'a str,
    file_path: &'a str,
    source: &'a str,
    parsed: &'a ParsedFile,
    exported_names: std::collections::HashSet<String>,
    symbols: Vec<Symbol>,
}

impl ExtractContext<'_> {
    fn extract_statement(&mut self, node: &Node<'_>, exported: bool) {
        match node.kind() {
            kinds::EXPORT_STATEMENT => {
                if let Some(declaration) = node.child_by_field_name("declaration") {
                    self.extract_statement(&declaration, true);
                }
            }
            kinds::FUNCTION_DECLARATION | kinds::GENERATOR_FUNCTION_DECLARATION => {
                self.extract_function(node, exported);
            }
            kinds::CLASS_DECLARATION | kinds::ABSTRACT_CLASS_DECLARATION => {
                self.extract_class(node, exported);
            }
            kinds::INTERFACE_DECLARATION => self.extract_interface(node, exported),
            kinds::TYPE_ALIAS_DECLARATION => self.extract_type_alias(node, exported),
            kinds::ENUM_DECLARATION => self.extract_enum(node, exported),
            kinds::LEXICAL_DECLARATION | kinds::VARIABLE_DECLARATION => {
                self.extract_variables(node, exported);
            }
            _ => {}
        }
    }

    fn push_symbol(
        &mut self,
        node: &Node<'_>,
        name: String,
        kind: SymbolKind,
        exported: bool,
        signature: Option<String>,
        detail: Value,
    ) {
        let is_exported = exported || self.exported_names.contains(&name);
        let fingerprint =
            fingerprint_symbol(kind, &name, signature.as_deref(), is_exported, &detail);
        self.symbols.push(Symbol {
            project: self.project.to_string(),
            file_path: self.file_path.to_string(),
            name,
            kind,
            span: node_span(node),
            is_exported,
            signature,
            fingerprint: Some(fingerprint),
            detail,
        });
    }

    fn extract_function(&mut self, node: &Node<'_>, exported: bool) {
        let Some(name) = field_text(node, "name", self.source) else {
            return;
        };
        let mut detail = Map::new();
        insert_parameters(&mut detail, node, self.source);
        insert_return_type(&mut detail, node, self.source);
        self.attach_js_doc(&mut detail, node);

        let signature = signature_before_body(node, self.source);
        self.push_symbol(
            node,
            name,
            SymbolKind::Function,
            exported,
            signature,
            Value::Object(detail),
        );
    }

    fn extract_class(&mut self, node: &Node<'_>, exported: bool) {
        let Some(name) = field_text(node, "name", self.source) else {
            return;
        };

        let mut members = Vec::new();
        let mut member_nodes = Vec::new();
        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            for member in body.named_children(&mut cursor) {
                match member.kind() {
                    kinds::METHOD_DEFINITION | kinds::ABSTRACT_METHOD_SIGNATURE => {
                        if let Some(member_name) = field_text(&member, "name", self.source) {
                            members.push(member_name.clone());
                            member_nodes.push((member, member_name, SymbolKind::Method));
                        }
                    }
                    kinds::PUBLIC_FIELD_DEFINITION => {
                        if let Some(member_name) = field_text(&member, "name", self.source) {
                            members.push(member_name.clone());
                            member_nodes.push((member, member_name, SymbolKind::Property));
                        }
                    }
                    _ => {}
                }
            }
        }

        let mut detail = Map::new();
        if !members.is_empty() {
            detail.insert("members".into(), json!(members));
        }
        let heritage = heritage_names(node, self.source);
        if !heritage.is_empty() {
            detail.insert("heritage".into(), json!(heritage));
        }
        let decorators = decorator_names(node, self.source);
        if !decorators.is_empty() {
            detail.insert("decorators".into(), json!(decorators));
        }
        self.attach_js_doc(&mut detail, node);

        let signature = signature_before_body(node, self.source);
        self.push_symbol(
            node,
            name.clone(),
            SymbolKind::Class,
            exported,
            signature,
            Value::Object(detail),
        );

        for (member, member_name, member_kind) in member_nodes {
            let mut member_detail = Map::new();
            member_detail.insert("parent".into(), json!(name));
            if member_kind == SymbolKind::Method {
                insert_parameters(&mut member_detail, &member, self.source);
                insert_return_type(&mut member_detail, &member, self.source);
            }
            let signature = signature_before_body(&member, self.source);
            self.push_symbol(
                &member,
                member_name,
                member_kind,
                false,
                signature,
                Value::Object(member_detail),
            );
        }
    }

    fn extract_interface(&mut self, node: &Node<'_>, exported: bool) {
        let Some(name) = field_text(node, "name", self.source) else {
            return;
        };

        let mut members = Vec::new();
        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            for member in body.named_children(&mut cursor) {
                if matches!(
                    member.kind(),
                    kinds::PROPERTY_SIGNATURE | kinds::METHOD_SIGNATURE
                ) {
                    if let Some(member_name) = field_text(&member, "name", self.source) {
                        members.push(member_name);
                    }
                }
            }
        }

        let mut detail = Map::new();
        if !members.is_empty() {
            detail.insert("members".into(), json!(members));
        }
        let heritage = interface_extends(node, self.source);
        if !heritage.is_empty() {
            detail.insert("heritage".into(), json!(heritage));
        }
        self.attach_js_doc(&mut detail, node);

        let signature = signature_before_body(node, self.source);
        self.push_symbol(
            node,
            name,
            SymbolKind::Interface,
            exported,
            signature,
            Value::Object(detail),
        );
    }

    fn extract_type_alias(&mut self, node: &Node<'_>, exported: bool) {
        let Some(name) = field_text(node, "name", self.source) else {
            return;
        };
        let mut detail = Map::new();
        self.attach_js_doc(&mut detail, node);
        let signature = Some(collapse_whitespace(node_text(node, self.source)));
        self.push_symbol(
            node,
            name,
            SymbolKind::TypeAlias,
            exported,
            signature,
            Value::Object(detail),
        );
    }

    fn extract_enum(&mut self, node: &Node<'_>, exported: bool) {
        let Some(name) = field_text(node, "name", self.source) else {
            return;
        };
        let mut members = Vec::new();
        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            for member in body.named_children(&mut cursor) {
                if let Some(member_name) = field_text(&member, "name", self.source) {
                    members.push(member_name);
                } else if member.kind() == "property_identifier" {
                    members.push(node_text(&member, self.source).to_string());
                }
            }
        }
        let mut detail = Map::new();
        if !members.is_empty() {
            detail.insert("members".into(), json!(members));
        }
        self.attach_js_doc(&mut detail, node);
        self.push_symbol(
            node,
            name,
            SymbolKind::Enum,
            exported,
            None,
            Value::Object(detail),
        );
    }

    fn extract_variables(&mut self, node: &Node<'_>, exported: bool) {
        let is_const = node
            .child(0)
            .map(|first| node_text(&first, self.source) == "const")
            .unwrap_or(false);

        let mut cursor = node.walk();
        for declarator in node.named_children(&mut cursor) {
            if declarator.kind() != kinds::VARIABLE_DECLARATOR {
                continue;
            }
            let Some(name) = field_text(&declarator, "name", self.source) else {
                continue;
            };
            let function_value = declarator
                .child_by_field_name("value")
                .filter(|v| matches!(v.kind(), kinds::ARROW_FUNCTION | kinds::FUNCTION_EXPRESSION));

            let mut detail = Map::new();
            if let Some(type_node) = declarator.child_by_field_name("type") {
                detail.insert(
                    "return_type".into(),
                    json!(type_annotation_text(&type_node, self.source)),
                );
            }
            self.attach_js_doc(&mut detail, node);

            if let Some(value_node) = function_value {
                insert_parameters(&mut detail, &value_node, self.source);
                insert_return_type(&mut detail, &value_node, self.source);
                let signature = signature_before_body(&value_node, self.source)
                    .map(|params| format!("{name} = {params}"));
                self.push_symbol(
                    &declarator,
                    name,
                    SymbolKind::Function,
                    exported,
                    signature,
                    Value::Object(detail),
                );
            } else {
                let kind = if is_const {
                    SymbolKind::Const
                } else {
                    SymbolKind::Variable
                };
                let signature = Some(collapse_whitespace(node_text(&declarator, self.source)));
                self.push_symbol(&declarator, name, kind, exported, signature, Value::Object(detail));
            }
        }
    }

    /// Attach the `/** ... */` block that ends on the line directly above the
    /// declaration (or its decorators).
    fn attach_js_doc(&self, detail: &mut Map<String, Value>, node: &Node<'_>) {
        let mut first_line = node_span(node).start_line;
        // Decorators sit between the doc block and the declaration keyword
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() == kinds::DECORATOR {
                first_line = first_line.min(node_span(&child).start_line);
            }
        }
        for comment in &self.parsed.comments {
            if comment.text.starts_with("/**") && comment.span.end_line + 1 == first_line {
                detail.insert("js_doc".into(), json!(comment.text.clone()));
                return;
            }
        }
    }
}

// ── Node helpers ───────────────────────────────────────────────────────

fn field_text(node: &Node<'_>, field: &str, source: &str) -> Option<String> {
    node.child_by_field_name(field)
        .map(|child| node_text(&child, source).to_string())
        .filter(|text| !text.is_empty())
}

fn insert_parameters(detail: &mut Map<String, Value>, node: &Node<'_>, source: &str) {
    let Some(parameters) = node.child_by_field_name("parameters") else {
        return;
    };
    let mut names = Vec::new();
    let mut cursor = parameters.walk();
    for parameter in parameters.named_children(&mut cursor) {
        if let Some(name) = field_text(&parameter, "pattern", source)
            .or_else(|| field_text(&parameter, "name", source))
        {
            names.push(name);
        } else {
            let text = node_text(&parameter, source);
            if !text.is_empty() {
                names.push(collapse_whitespace(text));
            }
        }
    }
    if !names.is_empty() {
        detail.insert("parameters".into(), json!(names));
    }
}

fn insert_return_type(detail: &mut Map<String, Value>, node: &Node<'_>, source: &str) {
    if let Some(return_type) = node.child_by_field_name("return_type") {
        detail.insert(
            "return_type".into(),
            json!(type_annotation_text(&return_type, source)),
        );
    }
}

/// `: Foo` annotations carry the leading colon in the grammar; strip it.
fn type_annotation_text(node: &Node<'_>, source: &str) -> String {
    collapse_whitespace(node_text(node, source).trim_start_matches(':').trim())
}

/// The declaration text up to (not including) its body, whitespace-collapsed.
fn signature_before_body(node: &Node<'_>, source: &str) -> Option<String> {
    let end = node
        .child_by_field_name("body")
        .map(|body| body.start_byte())
        .unwrap_or_else(|| node.end_byte());
    let start = node.start_byte();
    if end <= start || end > source.len() {
        return None;
    }
    let text = collapse_whitespace(source[start..end].trim());
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Names of classes/interfaces a class extends or implements, in order.
fn heritage_names(node: &Node<'_>, source: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() != kinds::CLASS_HERITAGE {
            continue;
        }
        let mut clause_cursor = child.walk();
        for clause in child.named_children(&mut clause_cursor) {
            let mut item_cursor = clause.walk();
            for item in clause.named_children(&mut item_cursor) {
                if !is_heritage_name_node(&item) {
                    continue;
                }
                let name = base_type_name(&item, source);
                if !name.is_empty() {
                    names.push(name);
                }
            }
        }
    }
    names
}

fn is_heritage_name_node(node: &Node<'_>) -> bool {
    matches!(
        node.kind(),
        kinds::IDENTIFIER | kinds::TYPE_IDENTIFIER | kinds::MEMBER_EXPRESSION | kinds::GENERIC_TYPE
            | "nested_type_identifier"
    )
}

fn interface_extends(node: &Node<'_>, source: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() != kinds::EXTENDS_TYPE_CLAUSE {
            continue;
        }
        let mut item_cursor = child.walk();
        for item in child.named_children(&mut item_cursor) {
            if !is_heritage_name_node(&item) {
                continue;
            }
            let name = base_type_name(&item, source);
            if !name.is_empty() {
                names.push(name);
            }
        }
    }
    names
}

/// For `Foo<Bar>` return `Foo`; otherwise the node text itself.
pub(super) fn base_type_name(node: &Node<'_>, source: &str) -> String {
    if node.kind() == kinds::GENERIC_TYPE {
        if let Some(name) = node.child_by_field_name("name") {
            return node_text(&name, source).to_string();
        }
    }
    node_text(node, source).to_string()
}

fn decorator_names(node: &Node<'_>, source: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == kinds::DECORATOR {
            names.push(collapse_whitespace(node_text(&child, source)));
        }
    }
    names
}

/// Names exported through `export { a, b }` clauses without a source module,
/// plus `export default <identifier>`.
fn collect_locally_exported_names(
    root: &Node<'_>,
    source: &str,
) -> std::collections::HashSet<String> {
    let mut names = std::collections::HashSet::new();
    let mut cursor = root.walk();
    for child in root.children(&mut cursor) {
        if child.kind() != kinds::EXPORT_STATEMENT {
            continue;
        }
        if child.child_by_field_name("source").is_some() {
            continue; // re-export, handled by the relation extractor
        }
        let mut clause_cursor = child.walk();
        for clause in child.named_children(&mut clause_cursor) {
            if clause.kind() == kinds::EXPORT_CLAUSE {
                let mut spec_cursor = clause.walk();
                for spec in clause.named_children(&mut spec_cursor) {
                    if spec.kind() == kinds::EXPORT_SPECIFIER {
                        if let Some(name) = field_text(&spec, "name", source) {
                            names.insert(name);
                        }
                    }
                }
            } else if clause.kind() == kinds::IDENTIFIER {
                // export default someLocalName;
                names.insert(node_text(&clause, source).to_string());
            }
        }
    }
    names
}
