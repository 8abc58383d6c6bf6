//! SQLite-backed index store
//!
//! File-based persistent storage using SQLite in WAL mode. The store owns a
//! single connection behind a mutex; every multi-statement write goes through
//! the immediate-transaction combinator so concurrent openers of the same
//! database file serialize on the SQLite write lock rather than corrupting
//! each other.

mod files;
mod relations;
mod symbols;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::domain::{FileRecord, OwnerRecord, Relation, Symbol};
use crate::error::{Result, StoreError};

/// SQLite-based index store
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Option<Connection>>>,
    db_path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (or create) the store at the given path.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        let conn = Connection::open(&db_path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(Some(conn))),
            db_path: Some(db_path),
        };
        store.init_pragmas()?;
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(Some(conn))),
            db_path: None,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// The main database file path, when file-backed.
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Close the store. Idempotent; later operations fail with `closed`.
    pub fn close(&self) -> Result<()> {
        let mut guard = self.conn.lock();
        if let Some(conn) = guard.take() {
            debug!(path = ?self.db_path, "closing store");
            // Fold the WAL back into the main file before releasing it.
            let _ = conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()));
            conn.close()
                .map_err(|(_, err)| StoreError::database(err.to_string()).with_source(err))?;
        }
        Ok(())
    }

    /// Unlink the database and its WAL/SHM sidecars. Requires a prior close.
    pub fn delete_files(&self) -> Result<()> {
        if self.conn.lock().is_some() {
            return Err(StoreError::database(
                "cannot delete store files while the store is open",
            ));
        }
        if let Some(ref path) = self.db_path {
            for candidate in Self::store_file_paths(path) {
                match std::fs::remove_file(&candidate) {
                    Ok(()) => {}
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                    Err(err) => return Err(StoreError::from(err)),
                }
            }
        }
        Ok(())
    }

    /// The main database file plus its `-wal` and `-shm` sidecars.
    pub fn store_file_paths(db_path: &Path) -> [PathBuf; 3] {
        let base = db_path.to_path_buf();
        let mut wal = db_path.as_os_str().to_os_string();
        wal.push("-wal");
        let mut shm = db_path.as_os_str().to_os_string();
        shm.push("-shm");
        [base, PathBuf::from(wal), PathBuf::from(shm)]
    }

    fn init_pragmas(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.pragma_update(None, "journal_mode", "wal")?;
            conn.pragma_update(None, "synchronous", "normal")?;
            conn.busy_timeout(std::time::Duration::from_secs(5))?;
            Ok(())
        })
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "CREATE TABLE IF NOT EXISTS files (
                    project TEXT NOT NULL,
                    file_path TEXT NOT NULL,
                    mtime_ms INTEGER NOT NULL,
                    byte_size INTEGER NOT NULL,
                    content_hash TEXT NOT NULL,
                    line_count INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL,
                    PRIMARY KEY (project, file_path)
                )",
                [],
            )?;

            conn.execute(
                "CREATE TABLE IF NOT EXISTS symbols (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    project TEXT NOT NULL,
                    file_path TEXT NOT NULL,
                    name TEXT NOT NULL,
                    kind TEXT NOT NULL,
                    start_line INTEGER NOT NULL,
                    start_column INTEGER NOT NULL,
                    end_line INTEGER NOT NULL,
                    end_column INTEGER NOT NULL,
                    is_exported INTEGER NOT NULL DEFAULT 0,
                    signature TEXT,
                    fingerprint TEXT,
                    detail TEXT
                )",
                [],
            )?;

            conn.execute(
                "CREATE INDEX IF NOT EXISTS idx_symbols_file
                 ON symbols(project, file_path)",
                [],
            )?;
            conn.execute(
                "CREATE INDEX IF NOT EXISTS idx_symbols_name
                 ON symbols(project, name)",
                [],
            )?;
            conn.execute(
                "CREATE INDEX IF NOT EXISTS idx_symbols_fingerprint
                 ON symbols(project, fingerprint)",
                [],
            )?;

            conn.execute(
                "CREATE TABLE IF NOT EXISTS relations (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    project TEXT NOT NULL,
                    rel_type TEXT NOT NULL,
                    src_file_path TEXT NOT NULL,
                    src_symbol_name TEXT,
                    dst_file_path TEXT NOT NULL,
                    dst_symbol_name TEXT,
                    meta TEXT
                )",
                [],
            )?;

            conn.execute(
                "CREATE INDEX IF NOT EXISTS idx_relations_src
                 ON relations(project, src_file_path)",
                [],
            )?;
            conn.execute(
                "CREATE INDEX IF NOT EXISTS idx_relations_dst
                 ON relations(project, dst_file_path)",
                [],
            )?;
            conn.execute(
                "CREATE INDEX IF NOT EXISTS idx_relations_type
                 ON relations(project, rel_type)",
                [],
            )?;

            // Single-row table: the writer heartbeat
            conn.execute(
                "CREATE TABLE IF NOT EXISTS owner (
                    id INTEGER PRIMARY KEY CHECK (id = 0),
                    pid INTEGER NOT NULL,
                    heartbeat_at INTEGER NOT NULL
                )",
                [],
            )?;

            Ok(())
        })
    }

    /// Run `f` against the live connection.
    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = self.conn.lock();
        let conn = guard
            .as_ref()
            .ok_or_else(|| StoreError::closed("store is closed"))?;
        f(conn)
    }

    /// Immediate-transaction combinator.
    ///
    /// Acquires the SQLite write lock up front so competing writers queue on
    /// the busy timeout instead of failing at commit.
    pub fn immediate<T>(
        &self,
        f: impl FnOnce(&rusqlite::Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut guard = self.conn.lock();
        let conn = guard
            .as_mut()
            .ok_or_else(|| StoreError::closed("store is closed"))?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()
            .map_err(|err| StoreError::transaction(err.to_string()).with_source(err))?;
        Ok(value)
    }

    // ── Owner CRUD ─────────────────────────────────────────────────────

    /// Read the owner row, if any.
    pub fn select_owner(&self) -> Result<Option<OwnerRecord>> {
        self.with_conn(|conn| {
            conn.query_row("SELECT pid, heartbeat_at FROM owner WHERE id = 0", [], |row| {
                Ok(OwnerRecord {
                    pid: row.get(0)?,
                    heartbeat_at: row.get(1)?,
                })
            })
            .optional()
            .map_err(StoreError::from)
        })
    }

    /// Insert the owner row if absent. Returns whether the row was inserted.
    pub fn insert_owner(&self, owner: &OwnerRecord) -> Result<bool> {
        self.immediate(|tx| {
            let changed = tx.execute(
                "INSERT OR IGNORE INTO owner (id, pid, heartbeat_at) VALUES (0, ?1, ?2)",
                params![owner.pid, owner.heartbeat_at],
            )?;
            Ok(changed > 0)
        })
    }

    /// Replace whatever owner row exists with `owner`.
    pub fn replace_owner(&self, owner: &OwnerRecord) -> Result<()> {
        self.immediate(|tx| {
            tx.execute("DELETE FROM owner WHERE id = 0", [])?;
            tx.execute(
                "INSERT INTO owner (id, pid, heartbeat_at) VALUES (0, ?1, ?2)",
                params![owner.pid, owner.heartbeat_at],
            )?;
            Ok(())
        })
    }

    /// Refresh the heartbeat of the row owned by `pid`.
    pub fn touch_owner(&self, pid: i64, heartbeat_at: i64) -> Result<bool> {
        self.immediate(|tx| {
            let changed = tx.execute(
                "UPDATE owner SET heartbeat_at = ?1 WHERE id = 0 AND pid = ?2",
                params![heartbeat_at, pid],
            )?;
            Ok(changed > 0)
        })
    }

    /// Delete the owner row held by `pid`.
    pub fn delete_owner(&self, pid: i64) -> Result<bool> {
        self.immediate(|tx| {
            let changed = tx.execute("DELETE FROM owner WHERE id = 0 AND pid = ?1", params![pid])?;
            Ok(changed > 0)
        })
    }

    // ── Per-file atomic combinators ────────────────────────────────────

    /// Replace everything keyed by one file in a single immediate transaction:
    /// delete the file's symbols and relations, insert the freshly extracted
    /// rows, and upsert the file record.
    pub fn replace_file_index(
        &self,
        record: &FileRecord,
        symbols: &[Symbol],
        relations: &[Relation],
    ) -> Result<()> {
        self.immediate(|tx| {
            symbols::delete_file_symbols_tx(tx, &record.project, &record.file_path)?;
            relations::delete_file_relations_tx(tx, &record.project, &record.file_path)?;
            symbols::insert_symbols_tx(tx, symbols)?;
            relations::insert_relations_tx(tx, relations)?;
            files::upsert_file_tx(tx, record)?;
            Ok(())
        })
    }

    /// Remove a file's record and every row keyed by it.
    pub fn remove_file_index(&self, project: &str, file_path: &str) -> Result<()> {
        self.immediate(|tx| {
            symbols::delete_file_symbols_tx(tx, project, file_path)?;
            relations::delete_file_relations_tx(tx, project, file_path)?;
            tx.execute(
                "DELETE FROM files WHERE project = ?1 AND file_path = ?2",
                params![project, file_path],
            )?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_row_is_single_and_replaceable() {
        let store = SqliteStore::in_memory().unwrap();
        assert_eq!(store.select_owner().unwrap(), None);

        let first = OwnerRecord {
            pid: 100,
            heartbeat_at: 1_000,
        };
        assert!(store.insert_owner(&first).unwrap());
        // Second insert is a no-op while a row exists
        let second = OwnerRecord {
            pid: 200,
            heartbeat_at: 2_000,
        };
        assert!(!store.insert_owner(&second).unwrap());
        assert_eq!(store.select_owner().unwrap(), Some(first));

        store.replace_owner(&second).unwrap();
        assert_eq!(store.select_owner().unwrap(), Some(second));

        // Touching with the wrong pid does nothing
        assert!(!store.touch_owner(100, 3_000).unwrap());
        assert!(store.touch_owner(200, 3_000).unwrap());
        assert_eq!(store.select_owner().unwrap().unwrap().heartbeat_at, 3_000);

        assert!(!store.delete_owner(100).unwrap());
        assert!(store.delete_owner(200).unwrap());
        assert_eq!(store.select_owner().unwrap(), None);
    }

    #[test]
    fn close_is_idempotent_and_gates_later_use() {
        let store = SqliteStore::in_memory().unwrap();
        store.close().unwrap();
        store.close().unwrap();
        let err = store.select_owner().unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Closed);
    }

    #[test]
    fn delete_files_requires_close_first() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("index.db");
        let store = SqliteStore::open(&db).unwrap();
        assert!(store.delete_files().is_err());
        store.close().unwrap();
        store.delete_files().unwrap();
        assert!(!db.exists());
    }
}
