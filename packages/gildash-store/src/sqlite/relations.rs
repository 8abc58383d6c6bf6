//! Relation repository

use rusqlite::{params, Connection, ToSql};

use super::SqliteStore;
use crate::domain::{Relation, RelationQuery, RelationType};
use crate::error::{Result, StoreError};

pub(super) fn delete_file_relations_tx(
    conn: &Connection,
    project: &str,
    src_file_path: &str,
) -> Result<usize> {
    let changed = conn.execute(
        "DELETE FROM relations WHERE project = ?1 AND src_file_path = ?2",
        params![project, src_file_path],
    )?;
    Ok(changed)
}

pub(super) fn insert_relations_tx(conn: &Connection, relations: &[Relation]) -> Result<()> {
    if relations.is_empty() {
        return Ok(());
    }
    let mut stmt = conn.prepare_cached(
        "INSERT INTO relations (project, rel_type, src_file_path, src_symbol_name,
            dst_file_path, dst_symbol_name, meta)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    for relation in relations {
        let meta = if relation.meta.is_null() {
            None
        } else {
            Some(serde_json::to_string(&relation.meta)?)
        };
        stmt.execute(params![
            relation.project,
            relation.rel_type.as_str(),
            relation.src_file_path,
            relation.src_symbol_name,
            relation.dst_file_path,
            relation.dst_symbol_name,
            meta,
        ])?;
    }
    Ok(())
}

const RELATION_COLUMNS: &str = "project, rel_type, src_file_path, src_symbol_name, \
     dst_file_path, dst_symbol_name, meta";

struct RelationRow {
    project: String,
    rel_type: String,
    src_file_path: String,
    src_symbol_name: Option<String>,
    dst_file_path: String,
    dst_symbol_name: Option<String>,
    meta: Option<String>,
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RelationRow> {
    Ok(RelationRow {
        project: row.get(0)?,
        rel_type: row.get(1)?,
        src_file_path: row.get(2)?,
        src_symbol_name: row.get(3)?,
        dst_file_path: row.get(4)?,
        dst_symbol_name: row.get(5)?,
        meta: row.get(6)?,
    })
}

fn into_relation(row: RelationRow) -> Result<Relation> {
    let rel_type = RelationType::parse(&row.rel_type).ok_or_else(|| {
        StoreError::serialization(format!("unknown relation type: {}", row.rel_type))
    })?;
    let meta = match row.meta {
        Some(text) => serde_json::from_str(&text)?,
        None => serde_json::Value::Null,
    };
    Ok(Relation {
        project: row.project,
        rel_type,
        src_file_path: row.src_file_path,
        src_symbol_name: row.src_symbol_name,
        dst_file_path: row.dst_file_path,
        dst_symbol_name: row.dst_symbol_name,
        meta,
    })
}

fn collect_relations(
    conn: &Connection,
    sql: &str,
    query_params: &[&dyn ToSql],
) -> Result<Vec<Relation>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(query_params, read_row)?;
    let raw = rows.collect::<rusqlite::Result<Vec<_>>>()?;
    raw.into_iter().map(into_relation).collect()
}

impl SqliteStore {
    /// Delete and re-insert all relations sourced at one file atomically.
    pub fn replace_file_relations(
        &self,
        project: &str,
        src_file_path: &str,
        relations: &[Relation],
    ) -> Result<()> {
        self.immediate(|tx| {
            delete_file_relations_tx(tx, project, src_file_path)?;
            insert_relations_tx(tx, relations)?;
            Ok(())
        })
    }

    /// Relations whose source is `file_path`.
    pub fn get_outgoing(&self, project: &str, file_path: &str) -> Result<Vec<Relation>> {
        self.with_conn(|conn| {
            collect_relations(
                conn,
                &format!(
                    "SELECT {RELATION_COLUMNS} FROM relations
                     WHERE project = ?1 AND src_file_path = ?2 ORDER BY id"
                ),
                &[&project, &file_path],
            )
        })
    }

    /// Relations whose destination is `file_path`.
    pub fn get_incoming(&self, project: &str, file_path: &str) -> Result<Vec<Relation>> {
        self.with_conn(|conn| {
            collect_relations(
                conn,
                &format!(
                    "SELECT {RELATION_COLUMNS} FROM relations
                     WHERE project = ?1 AND dst_file_path = ?2 ORDER BY id"
                ),
                &[&project, &file_path],
            )
        })
    }

    pub fn get_by_type(&self, project: &str, rel_type: RelationType) -> Result<Vec<Relation>> {
        self.with_conn(|conn| {
            collect_relations(
                conn,
                &format!(
                    "SELECT {RELATION_COLUMNS} FROM relations
                     WHERE project = ?1 AND rel_type = ?2 ORDER BY id"
                ),
                &[&project, &rel_type.as_str()],
            )
        })
    }

    /// Relations of the given types across every project.
    pub fn get_by_types_all_projects(
        &self,
        rel_types: &[RelationType],
    ) -> Result<Vec<Relation>> {
        if rel_types.is_empty() {
            return Ok(Vec::new());
        }
        self.with_conn(|conn| {
            let placeholders = vec!["?"; rel_types.len()].join(", ");
            let sql = format!(
                "SELECT {RELATION_COLUMNS} FROM relations
                 WHERE rel_type IN ({placeholders}) ORDER BY id"
            );
            let values: Vec<&str> = rel_types.iter().map(|t| t.as_str()).collect();
            let refs: Vec<&dyn ToSql> = values.iter().map(|v| v as &dyn ToSql).collect();
            collect_relations(conn, &sql, &refs)
        })
    }

    pub fn delete_file_relations(&self, project: &str, src_file_path: &str) -> Result<usize> {
        self.with_conn(|conn| delete_file_relations_tx(conn, project, src_file_path))
    }

    /// Point every relation aimed at `old_dst` to `new_dst` (rename support).
    pub fn retarget_relations(
        &self,
        project: &str,
        old_dst_file_path: &str,
        new_dst_file_path: &str,
    ) -> Result<usize> {
        self.immediate(|tx| {
            let changed = tx.execute(
                "UPDATE relations SET dst_file_path = ?1
                 WHERE project = ?2 AND dst_file_path = ?3",
                params![new_dst_file_path, project, old_dst_file_path],
            )?;
            Ok(changed)
        })
    }

    /// Filtered relation search. Unset query fields do not constrain.
    pub fn search_relations(&self, query: &RelationQuery) -> Result<Vec<Relation>> {
        self.with_conn(|conn| {
            let mut sql = format!("SELECT {RELATION_COLUMNS} FROM relations WHERE 1=1");
            let mut values: Vec<Box<dyn ToSql>> = Vec::new();

            if let Some(ref project) = query.project {
                sql.push_str(" AND project = ?");
                values.push(Box::new(project.clone()));
            }
            if let Some(rel_type) = query.rel_type {
                sql.push_str(" AND rel_type = ?");
                values.push(Box::new(rel_type.as_str()));
            }
            if let Some(ref src) = query.src_file_path {
                sql.push_str(" AND src_file_path = ?");
                values.push(Box::new(src.clone()));
            }
            if let Some(ref dst) = query.dst_file_path {
                sql.push_str(" AND dst_file_path = ?");
                values.push(Box::new(dst.clone()));
            }
            if let Some(ref name) = query.src_symbol_name {
                sql.push_str(" AND src_symbol_name = ?");
                values.push(Box::new(name.clone()));
            }
            if let Some(ref name) = query.dst_symbol_name {
                sql.push_str(" AND dst_symbol_name = ?");
                values.push(Box::new(name.clone()));
            }
            sql.push_str(" ORDER BY id");
            if let Some(limit) = query.limit {
                sql.push_str(" LIMIT ?");
                values.push(Box::new(limit));
            }

            let refs: Vec<&dyn ToSql> = values.iter().map(|value| value.as_ref()).collect();
            collect_relations(conn, &sql, &refs)
        })
    }

    /// Total relation count for a project.
    pub fn count_relations(&self, project: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM relations WHERE project = ?1",
                params![project],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn relation(rel_type: RelationType, src: &str, dst: &str) -> Relation {
        Relation {
            project: "p".into(),
            rel_type,
            src_file_path: src.into(),
            src_symbol_name: None,
            dst_file_path: dst.into(),
            dst_symbol_name: None,
            meta: serde_json::Value::Null,
        }
    }

    #[test]
    fn outgoing_and_incoming_are_directional() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .replace_file_relations(
                "p",
                "src/a.ts",
                &[relation(RelationType::Imports, "src/a.ts", "src/b.ts")],
            )
            .unwrap();

        assert_eq!(store.get_outgoing("p", "src/a.ts").unwrap().len(), 1);
        assert_eq!(store.get_outgoing("p", "src/b.ts").unwrap().len(), 0);
        assert_eq!(store.get_incoming("p", "src/b.ts").unwrap().len(), 1);
        assert_eq!(store.get_incoming("p", "src/a.ts").unwrap().len(), 0);
    }

    #[test]
    fn meta_round_trips_as_json() {
        let store = SqliteStore::in_memory().unwrap();
        let mut rel = relation(RelationType::ReExports, "src/index.ts", "src/impl.ts");
        rel.meta = json!({"specifiers": [{"local": "Impl", "exported": "Foo"}]});
        store
            .replace_file_relations("p", "src/index.ts", std::slice::from_ref(&rel))
            .unwrap();
        let loaded = store.get_outgoing("p", "src/index.ts").unwrap();
        assert_eq!(loaded[0].meta, rel.meta);
    }

    #[test]
    fn retarget_moves_incoming_edges() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .replace_file_relations(
                "p",
                "src/a.ts",
                &[relation(RelationType::Imports, "src/a.ts", "src/old.ts")],
            )
            .unwrap();
        let moved = store
            .retarget_relations("p", "src/old.ts", "src/new.ts")
            .unwrap();
        assert_eq!(moved, 1);
        assert_eq!(store.get_incoming("p", "src/new.ts").unwrap().len(), 1);
        assert!(store.get_incoming("p", "src/old.ts").unwrap().is_empty());
    }

    #[test]
    fn search_by_type_and_src() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .replace_file_relations(
                "p",
                "src/a.ts",
                &[
                    relation(RelationType::Imports, "src/a.ts", "src/b.ts"),
                    relation(RelationType::TypeRef, "src/a.ts", "src/c.ts"),
                ],
            )
            .unwrap();

        let hits = store
            .search_relations(&RelationQuery {
                project: Some("p".into()),
                rel_type: Some(RelationType::Imports),
                src_file_path: Some("src/a.ts".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].dst_file_path, "src/b.ts");
        assert_eq!(store.count_relations("p").unwrap(), 2);
    }
}
