//! AST pattern search
//!
//! Runs tree-sitter query expressions (s-expression patterns with `@capture`
//! names) over the indexed source files of a project. Files are read from
//! disk at query time so matches always reflect current content; unreadable
//! or unparsable files are skipped.

use std::path::Path;
use tree_sitter::{Query, QueryCursor};

use super::parser::{node_span, SourceParser};
use crate::shared::error::{GildashError, Result};
use gildash_store::{Span, SqliteStore};

/// An AST pattern query.
#[derive(Debug, Clone, Default)]
pub struct PatternQuery {
    /// tree-sitter query source, e.g. `(call_expression function: (identifier) @fn)`
    pub pattern: String,
    /// Restrict to one file
    pub file_path: Option<String>,
    pub limit: Option<u32>,
}

/// One capture produced by a pattern query.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PatternMatch {
    pub file_path: String,
    pub capture: String,
    pub text: String,
    pub span: Span,
}

/// Run `query` over the indexed files of `project`.
pub fn search_pattern(
    store: &SqliteStore,
    project_root: &Path,
    project: &str,
    query: &PatternQuery,
) -> Result<Vec<PatternMatch>> {
    let language = tree_sitter_typescript::language_typescript();
    let compiled = Query::new(&language, &query.pattern).map_err(|err| {
        GildashError::search(format!("invalid pattern query: {err}")).with_source(err)
    })?;

    let files: Vec<String> = match query.file_path {
        Some(ref file_path) => vec![file_path.clone()],
        None => store
            .get_all_files(project)
            .map_err(|err| {
                GildashError::search("failed to enumerate files for pattern search")
                    .with_source(err)
            })?
            .into_iter()
            .map(|record| record.file_path)
            .collect(),
    };

    let limit = query.limit.map(|l| l as usize).unwrap_or(usize::MAX);
    let mut parser = SourceParser::new()?;
    let mut matches = Vec::new();

    'files: for file_path in files {
        let Ok(source) = std::fs::read_to_string(project_root.join(&file_path)) else {
            continue;
        };
        let Ok(parsed) = parser.parse(&file_path, &source) else {
            continue;
        };
        let mut cursor = QueryCursor::new();
        let query_matches = cursor.matches(&compiled, parsed.root(), source.as_bytes());
        for query_match in query_matches {
            for capture in query_match.captures {
                let capture_name = compiled.capture_names()[capture.index as usize].to_string();
                let text = capture
                    .node
                    .utf8_text(source.as_bytes())
                    .unwrap_or_default()
                    .to_string();
                matches.push(PatternMatch {
                    file_path: file_path.clone(),
                    capture: capture_name,
                    text,
                    span: node_span(&capture.node),
                });
                if matches.len() >= limit {
                    break 'files;
                }
            }
        }
    }
    Ok(matches)
}
