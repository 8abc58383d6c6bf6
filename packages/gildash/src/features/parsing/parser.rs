//! TypeScript source parsing
//!
//! Wraps tree-sitter with the TypeScript grammar and produces immutable
//! [`ParsedFile`] values: the tree, syntax-error spans, comment tokens, and
//! the source text. `.mts`/`.cts` and plain JavaScript all go through the
//! same grammar.

use tree_sitter::{Node, Parser, Tree};

use super::node_kinds;
use crate::shared::error::{GildashError, Result};
use gildash_store::Span;

/// A syntax error reported by the grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDiagnostic {
    pub message: String,
    pub span: Span,
}

/// A comment token with its location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentToken {
    pub text: String,
    pub span: Span,
}

/// Immutable parse result for one file.
pub struct ParsedFile {
    pub file_path: String,
    pub tree: Tree,
    pub errors: Vec<ParseDiagnostic>,
    pub comments: Vec<CommentToken>,
    pub source_text: String,
}

impl ParsedFile {
    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

impl std::fmt::Debug for ParsedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParsedFile")
            .field("file_path", &self.file_path)
            .field("errors", &self.errors.len())
            .field("comments", &self.comments.len())
            .field("bytes", &self.source_text.len())
            .finish()
    }
}

/// Convert a tree-sitter node range to a 1-based-line span.
pub fn node_span(node: &Node<'_>) -> Span {
    let start = node.start_position();
    let end = node.end_position();
    Span {
        start_line: start.row as u32 + 1,
        start_column: start.column as u32,
        end_line: end.row as u32 + 1,
        end_column: end.column as u32,
    }
}

/// Node text helper; empty on any out-of-range slice.
pub fn node_text<'a>(node: &Node<'_>, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or_default()
}

/// TypeScript source parser.
pub struct SourceParser {
    parser: Parser,
}

impl SourceParser {
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_typescript::language_typescript())
            .map_err(|err| {
                GildashError::parse("failed to load the TypeScript grammar").with_source(err)
            })?;
        Ok(Self { parser })
    }

    /// Parse one file's source text.
    ///
    /// Grammar-level syntax errors do not fail the parse; they are collected
    /// into [`ParsedFile::errors`] so the extractors can still walk the
    /// recoverable parts of the tree.
    pub fn parse(&mut self, file_path: &str, source_text: &str) -> Result<ParsedFile> {
        let tree = self.parser.parse(source_text, None).ok_or_else(|| {
            GildashError::parse(format!("parser produced no tree for {file_path}"))
        })?;

        let mut errors = Vec::new();
        let mut comments = Vec::new();
        collect_tokens(&tree.root_node(), source_text, &mut errors, &mut comments);

        Ok(ParsedFile {
            file_path: file_path.to_string(),
            tree,
            errors,
            comments,
            source_text: source_text.to_string(),
        })
    }
}

fn collect_tokens(
    node: &Node<'_>,
    source: &str,
    errors: &mut Vec<ParseDiagnostic>,
    comments: &mut Vec<CommentToken>,
) {
    if node.is_error() || node.is_missing() {
        let label = if node.is_missing() { "missing" } else { "syntax error" };
        errors.push(ParseDiagnostic {
            message: format!("{label} near `{}`", truncate(node_text(node, source), 40)),
            span: node_span(node),
        });
        // Do not descend into error subtrees; one diagnostic per region.
        return;
    }
    if node.kind() == node_kinds::COMMENT {
        comments.push(CommentToken {
            text: node_text(node, source).to_string(),
            span: node_span(node),
        });
        return;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_tokens(&child, source, errors, comments);
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
