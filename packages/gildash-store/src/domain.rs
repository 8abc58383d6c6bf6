//! Domain models for the gildash store
//!
//! Rows persisted by the SQLite layer plus the query objects the search
//! surfaces accept. All `file_path` values are project-relative with forward
//! slashes; `updated_at`, `mtime_ms` and `heartbeat_at` are Unix epoch
//! milliseconds.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-file bookkeeping row used for change detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub project: String,
    pub file_path: String,
    pub mtime_ms: i64,
    pub byte_size: u64,
    /// sha256 hex digest of the file bytes
    pub content_hash: String,
    pub line_count: u32,
    pub updated_at: i64,
}

/// Symbol declaration kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Class,
    Interface,
    #[serde(rename = "type")]
    TypeAlias,
    Enum,
    Variable,
    Const,
    Method,
    Property,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Class => "class",
            SymbolKind::Interface => "interface",
            SymbolKind::TypeAlias => "type",
            SymbolKind::Enum => "enum",
            SymbolKind::Variable => "variable",
            SymbolKind::Const => "const",
            SymbolKind::Method => "method",
            SymbolKind::Property => "property",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "function" => Some(SymbolKind::Function),
            "class" => Some(SymbolKind::Class),
            "interface" => Some(SymbolKind::Interface),
            "type" => Some(SymbolKind::TypeAlias),
            "enum" => Some(SymbolKind::Enum),
            "variable" => Some(SymbolKind::Variable),
            "const" => Some(SymbolKind::Const),
            "method" => Some(SymbolKind::Method),
            "property" => Some(SymbolKind::Property),
            _ => None,
        }
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Source span in 1-based lines and 0-based columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

/// Extracted symbol declaration.
///
/// `fingerprint` is a deterministic digest of the shape-relevant fields of
/// the declaration; identical shape produces an identical fingerprint, so a
/// pure move within the file never looks like a modification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub project: String,
    pub file_path: String,
    pub name: String,
    pub kind: SymbolKind,
    pub span: Span,
    pub is_exported: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    /// Open map: parameters, return_type, js_doc, members, heritage, decorators
    #[serde(default)]
    pub detail: serde_json::Value,
}

/// Cross-file relation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationType {
    #[serde(rename = "imports")]
    Imports,
    #[serde(rename = "re-exports")]
    ReExports,
    #[serde(rename = "extends")]
    Extends,
    #[serde(rename = "implements")]
    Implements,
    #[serde(rename = "calls")]
    Calls,
    #[serde(rename = "type-ref")]
    TypeRef,
}

impl RelationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::Imports => "imports",
            RelationType::ReExports => "re-exports",
            RelationType::Extends => "extends",
            RelationType::Implements => "implements",
            RelationType::Calls => "calls",
            RelationType::TypeRef => "type-ref",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "imports" => Some(RelationType::Imports),
            "re-exports" => Some(RelationType::ReExports),
            "extends" => Some(RelationType::Extends),
            "implements" => Some(RelationType::Implements),
            "calls" => Some(RelationType::Calls),
            "type-ref" => Some(RelationType::TypeRef),
            _ => None,
        }
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Cross-file relation row.
///
/// `meta` is untyped at the boundary. For `ReExports` it carries a
/// `specifiers` array of `{local, exported}` pairs; a bare `export *` sets
/// no specifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub project: String,
    pub rel_type: RelationType,
    pub src_file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_symbol_name: Option<String>,
    pub dst_file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_symbol_name: Option<String>,
    #[serde(default)]
    pub meta: serde_json::Value,
}

/// The single-writer heartbeat row. At most one per store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnerRecord {
    pub pid: i64,
    pub heartbeat_at: i64,
}

/// Aggregate counts for a project.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub file_count: u64,
    pub symbol_count: u64,
}

/// Symbol search filters. `None` fields do not constrain the search.
#[derive(Debug, Clone, Default)]
pub struct SymbolQuery {
    pub project: Option<String>,
    /// Substring match on the symbol name, or exact when `exact` is set
    pub text: Option<String>,
    pub exact: bool,
    pub file_path: Option<String>,
    pub kind: Option<SymbolKind>,
    pub is_exported: Option<bool>,
    pub limit: Option<u32>,
}

/// Relation search filters. `None` fields do not constrain the search.
#[derive(Debug, Clone, Default)]
pub struct RelationQuery {
    pub project: Option<String>,
    pub rel_type: Option<RelationType>,
    pub src_file_path: Option<String>,
    pub dst_file_path: Option<String>,
    pub src_symbol_name: Option<String>,
    pub dst_symbol_name: Option<String>,
    pub limit: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_kind_round_trips_through_str() {
        for kind in [
            SymbolKind::Function,
            SymbolKind::Class,
            SymbolKind::Interface,
            SymbolKind::TypeAlias,
            SymbolKind::Enum,
            SymbolKind::Variable,
            SymbolKind::Const,
            SymbolKind::Method,
            SymbolKind::Property,
        ] {
            assert_eq!(SymbolKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(SymbolKind::parse("namespace"), None);
    }

    #[test]
    fn relation_type_round_trips_through_str() {
        for rel in [
            RelationType::Imports,
            RelationType::ReExports,
            RelationType::Extends,
            RelationType::Implements,
            RelationType::Calls,
            RelationType::TypeRef,
        ] {
            assert_eq!(RelationType::parse(rel.as_str()), Some(rel));
        }
        assert_eq!(RelationType::parse("renames"), None);
    }
}
