//! File record repository

use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;

use super::SqliteStore;
use crate::domain::FileRecord;
use crate::error::Result;

pub(super) fn upsert_file_tx(conn: &Connection, record: &FileRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO files (project, file_path, mtime_ms, byte_size, content_hash, line_count, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT (project, file_path) DO UPDATE SET
            mtime_ms = excluded.mtime_ms,
            byte_size = excluded.byte_size,
            content_hash = excluded.content_hash,
            line_count = excluded.line_count,
            updated_at = excluded.updated_at",
        params![
            record.project,
            record.file_path,
            record.mtime_ms,
            record.byte_size as i64,
            record.content_hash,
            record.line_count,
            record.updated_at,
        ],
    )?;
    Ok(())
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        project: row.get(0)?,
        file_path: row.get(1)?,
        mtime_ms: row.get(2)?,
        byte_size: row.get::<_, i64>(3)? as u64,
        content_hash: row.get(4)?,
        line_count: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

const FILE_COLUMNS: &str =
    "project, file_path, mtime_ms, byte_size, content_hash, line_count, updated_at";

impl SqliteStore {
    /// Insert or refresh a file record.
    pub fn upsert_file(&self, record: &FileRecord) -> Result<()> {
        self.with_conn(|conn| upsert_file_tx(conn, record))
    }

    pub fn get_file(&self, project: &str, file_path: &str) -> Result<Option<FileRecord>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {FILE_COLUMNS} FROM files WHERE project = ?1 AND file_path = ?2"
                ),
                params![project, file_path],
                row_to_record,
            )
            .optional()
            .map_err(Into::into)
        })
    }

    pub fn get_all_files(&self, project: &str) -> Result<Vec<FileRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {FILE_COLUMNS} FROM files WHERE project = ?1 ORDER BY file_path"
            ))?;
            let rows = stmt.query_map(params![project], row_to_record)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
        })
    }

    /// All records for a project keyed by file path.
    pub fn get_files_map(&self, project: &str) -> Result<HashMap<String, FileRecord>> {
        let records = self.get_all_files(project)?;
        Ok(records
            .into_iter()
            .map(|record| (record.file_path.clone(), record))
            .collect())
    }

    /// Every project name that has at least one file record.
    pub fn get_projects(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT DISTINCT project FROM files ORDER BY project")?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
        })
    }

    pub fn delete_file(&self, project: &str, file_path: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM files WHERE project = ?1 AND file_path = ?2",
                params![project, file_path],
            )?;
            Ok(changed > 0)
        })
    }

    /// Refresh only the stat columns of a record whose content hash matched
    /// despite an mtime or size drift.
    pub fn touch_file_stat(
        &self,
        project: &str,
        file_path: &str,
        mtime_ms: i64,
        byte_size: u64,
        updated_at: i64,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE files SET mtime_ms = ?1, byte_size = ?2, updated_at = ?3
                 WHERE project = ?4 AND file_path = ?5",
                params![mtime_ms, byte_size as i64, updated_at, project, file_path],
            )?;
            Ok(changed > 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str) -> FileRecord {
        FileRecord {
            project: "p".into(),
            file_path: path.into(),
            mtime_ms: 1_000,
            byte_size: 42,
            content_hash: "abc".into(),
            line_count: 3,
            updated_at: 1_000,
        }
    }

    #[test]
    fn upsert_then_get_round_trips() {
        let store = SqliteStore::in_memory().unwrap();
        let rec = record("src/a.ts");
        store.upsert_file(&rec).unwrap();
        assert_eq!(store.get_file("p", "src/a.ts").unwrap(), Some(rec.clone()));

        // Upsert refreshes in place
        let mut newer = rec.clone();
        newer.content_hash = "def".into();
        newer.mtime_ms = 2_000;
        store.upsert_file(&newer).unwrap();
        assert_eq!(store.get_file("p", "src/a.ts").unwrap(), Some(newer));
        assert_eq!(store.get_all_files("p").unwrap().len(), 1);
    }

    #[test]
    fn files_map_keys_by_path() {
        let store = SqliteStore::in_memory().unwrap();
        store.upsert_file(&record("src/a.ts")).unwrap();
        store.upsert_file(&record("src/b.ts")).unwrap();
        let map = store.get_files_map("p").unwrap();
        assert_eq!(map.len(), 2);
        assert!(map.contains_key("src/a.ts"));
        assert!(map.contains_key("src/b.ts"));
        assert!(store.get_files_map("other").unwrap().is_empty());
    }

    #[test]
    fn touch_file_stat_leaves_hash_alone() {
        let store = SqliteStore::in_memory().unwrap();
        store.upsert_file(&record("src/a.ts")).unwrap();
        assert!(store
            .touch_file_stat("p", "src/a.ts", 9_000, 99, 9_000)
            .unwrap());
        let rec = store.get_file("p", "src/a.ts").unwrap().unwrap();
        assert_eq!(rec.mtime_ms, 9_000);
        assert_eq!(rec.byte_size, 99);
        assert_eq!(rec.content_hash, "abc");
    }
}
