//! gildash-store — SQLite persistence for the gildash index
//!
//! One SQLite database per project tree, holding four tables:
//!
//! - `files`: per-file change-detection records (mtime, size, content hash)
//! - `symbols`: extracted declarations, replaced per file
//! - `relations`: cross-file edges (imports, re-exports, extends, ...),
//!   replaced per file
//! - `owner`: the single-writer heartbeat row
//!
//! The store runs in WAL mode so one writer and many readers can share the
//! database file. Multi-statement writes go through an immediate-transaction
//! combinator; the per-file `replace_file_index` / `remove_file_index`
//! combinators give the indexing pipeline its delete-then-insert atomicity.

pub mod domain;
pub mod error;
pub mod sqlite;

pub use domain::{
    FileRecord, IndexStats, OwnerRecord, Relation, RelationQuery, RelationType, Span, Symbol,
    SymbolKind, SymbolQuery,
};
pub use error::{ErrorKind, Result, StoreError};
pub use sqlite::SqliteStore;
