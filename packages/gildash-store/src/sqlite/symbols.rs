//! Symbol repository

use rusqlite::{params, Connection, ToSql};

use super::SqliteStore;
use crate::domain::{IndexStats, Span, Symbol, SymbolKind, SymbolQuery};
use crate::error::{Result, StoreError};

pub(super) fn delete_file_symbols_tx(
    conn: &Connection,
    project: &str,
    file_path: &str,
) -> Result<usize> {
    let changed = conn.execute(
        "DELETE FROM symbols WHERE project = ?1 AND file_path = ?2",
        params![project, file_path],
    )?;
    Ok(changed)
}

pub(super) fn insert_symbols_tx(conn: &Connection, symbols: &[Symbol]) -> Result<()> {
    if symbols.is_empty() {
        return Ok(());
    }
    let mut stmt = conn.prepare_cached(
        "INSERT INTO symbols (project, file_path, name, kind,
            start_line, start_column, end_line, end_column,
            is_exported, signature, fingerprint, detail)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
    )?;
    for symbol in symbols {
        let detail = if symbol.detail.is_null() {
            None
        } else {
            Some(serde_json::to_string(&symbol.detail)?)
        };
        stmt.execute(params![
            symbol.project,
            symbol.file_path,
            symbol.name,
            symbol.kind.as_str(),
            symbol.span.start_line,
            symbol.span.start_column,
            symbol.span.end_line,
            symbol.span.end_column,
            symbol.is_exported,
            symbol.signature,
            symbol.fingerprint,
            detail,
        ])?;
    }
    Ok(())
}

const SYMBOL_COLUMNS: &str = "project, file_path, name, kind, \
     start_line, start_column, end_line, end_column, \
     is_exported, signature, fingerprint, detail";

struct SymbolRow {
    project: String,
    file_path: String,
    name: String,
    kind: String,
    span: Span,
    is_exported: bool,
    signature: Option<String>,
    fingerprint: Option<String>,
    detail: Option<String>,
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SymbolRow> {
    Ok(SymbolRow {
        project: row.get(0)?,
        file_path: row.get(1)?,
        name: row.get(2)?,
        kind: row.get(3)?,
        span: Span {
            start_line: row.get(4)?,
            start_column: row.get(5)?,
            end_line: row.get(6)?,
            end_column: row.get(7)?,
        },
        is_exported: row.get(8)?,
        signature: row.get(9)?,
        fingerprint: row.get(10)?,
        detail: row.get(11)?,
    })
}

fn into_symbol(row: SymbolRow) -> Result<Symbol> {
    let kind = SymbolKind::parse(&row.kind)
        .ok_or_else(|| StoreError::serialization(format!("unknown symbol kind: {}", row.kind)))?;
    let detail = match row.detail {
        Some(text) => serde_json::from_str(&text)?,
        None => serde_json::Value::Null,
    };
    Ok(Symbol {
        project: row.project,
        file_path: row.file_path,
        name: row.name,
        kind,
        span: row.span,
        is_exported: row.is_exported,
        signature: row.signature,
        fingerprint: row.fingerprint,
        detail,
    })
}

fn collect_symbols(
    conn: &Connection,
    sql: &str,
    query_params: &[&dyn ToSql],
) -> Result<Vec<Symbol>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(query_params, read_row)?;
    let raw = rows.collect::<rusqlite::Result<Vec<_>>>()?;
    raw.into_iter().map(into_symbol).collect()
}

impl SqliteStore {
    /// Delete and re-insert all symbols for one file atomically.
    pub fn replace_file_symbols(
        &self,
        project: &str,
        file_path: &str,
        symbols: &[Symbol],
    ) -> Result<()> {
        self.immediate(|tx| {
            delete_file_symbols_tx(tx, project, file_path)?;
            insert_symbols_tx(tx, symbols)?;
            Ok(())
        })
    }

    pub fn get_file_symbols(&self, project: &str, file_path: &str) -> Result<Vec<Symbol>> {
        self.with_conn(|conn| {
            collect_symbols(
                conn,
                &format!(
                    "SELECT {SYMBOL_COLUMNS} FROM symbols
                     WHERE project = ?1 AND file_path = ?2 ORDER BY start_line, start_column"
                ),
                &[&project, &file_path],
            )
        })
    }

    pub fn get_by_fingerprint(&self, project: &str, fingerprint: &str) -> Result<Vec<Symbol>> {
        self.with_conn(|conn| {
            collect_symbols(
                conn,
                &format!(
                    "SELECT {SYMBOL_COLUMNS} FROM symbols
                     WHERE project = ?1 AND fingerprint = ?2"
                ),
                &[&project, &fingerprint],
            )
        })
    }

    pub fn delete_file_symbols(&self, project: &str, file_path: &str) -> Result<usize> {
        self.with_conn(|conn| delete_file_symbols_tx(conn, project, file_path))
    }

    /// Filtered symbol search. Unset query fields do not constrain.
    pub fn search_symbols(&self, query: &SymbolQuery) -> Result<Vec<Symbol>> {
        self.with_conn(|conn| {
            let mut sql = format!("SELECT {SYMBOL_COLUMNS} FROM symbols WHERE 1=1");
            let mut values: Vec<Box<dyn ToSql>> = Vec::new();

            if let Some(ref project) = query.project {
                sql.push_str(" AND project = ?");
                values.push(Box::new(project.clone()));
            }
            if let Some(ref text) = query.text {
                if query.exact {
                    sql.push_str(" AND name = ?");
                    values.push(Box::new(text.clone()));
                } else {
                    sql.push_str(" AND name LIKE '%' || ? || '%'");
                    values.push(Box::new(text.clone()));
                }
            }
            if let Some(ref file_path) = query.file_path {
                sql.push_str(" AND file_path = ?");
                values.push(Box::new(file_path.clone()));
            }
            if let Some(kind) = query.kind {
                sql.push_str(" AND kind = ?");
                values.push(Box::new(kind.as_str()));
            }
            if let Some(is_exported) = query.is_exported {
                sql.push_str(" AND is_exported = ?");
                values.push(Box::new(is_exported));
            }
            sql.push_str(" ORDER BY file_path, start_line, start_column");
            if let Some(limit) = query.limit {
                sql.push_str(" LIMIT ?");
                values.push(Box::new(limit));
            }

            let refs: Vec<&dyn ToSql> = values.iter().map(|value| value.as_ref()).collect();
            collect_symbols(conn, &sql, &refs)
        })
    }

    /// File and symbol counts for a project.
    pub fn get_stats(&self, project: &str) -> Result<IndexStats> {
        self.with_conn(|conn| {
            let file_count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM files WHERE project = ?1",
                params![project],
                |row| row.get(0),
            )?;
            let symbol_count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM symbols WHERE project = ?1",
                params![project],
                |row| row.get(0),
            )?;
            Ok(IndexStats {
                file_count: file_count as u64,
                symbol_count: symbol_count as u64,
            })
        })
    }
}
