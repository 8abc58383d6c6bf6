//! gildash — a persistent, incrementally maintained index of a
//! TypeScript/JavaScript source tree
//!
//! Gildash parses source files with tree-sitter, extracts symbol
//! declarations and cross-file relations (imports, re-exports, extends,
//! implements, calls, type references), persists them in SQLite, and
//! answers structural queries: symbol search, relation search, dependency
//! graph traversal, cycle detection, fan-in/fan-out, change diffing,
//! re-export resolution, and optional semantic queries.
//!
//! ## Roles
//!
//! Multiple processes can share one index. The first opener inserts the
//! owner heartbeat row and runs the write path (full index, filesystem
//! watcher, incremental updates); later openers become readers. Readers
//! healthcheck the heartbeat and promote themselves when the owner's row
//! goes stale or disappears.
//!
//! ## Quick start
//!
//! ```ignore
//! use gildash::{Gildash, GildashConfig, SymbolQuery};
//!
//! let gildash = Gildash::open(GildashConfig::new("/abs/project"))?;
//! let exported = gildash.search_symbols(SymbolQuery {
//!     is_exported: Some(true),
//!     ..Default::default()
//! })?;
//! let cycle = gildash.has_circular_dependencies(None)?;
//! gildash.close()?;
//! ```

pub mod api;
pub mod config;
pub mod features;
pub mod runtime;
pub mod shared;

pub use api::Gildash;
pub use config::GildashConfig;
pub use features::graph::dep_graph::{CycleOptions, FanMetrics};
pub use features::graph::engine::GraphQueryOptions;
pub use features::indexing::coordinator::{ChangedSymbolCounts, IndexResult};
pub use features::parsing::diff::{diff_symbols, SymbolDiff};
pub use features::parsing::parser::{CommentToken, ParseDiagnostic, ParsedFile};
pub use features::parsing::pattern::{PatternMatch, PatternQuery};
pub use features::resolve::heritage::HeritageNode;
pub use features::resolve::reexport::{ReExportHop, ResolvedSymbol};
pub use features::semantic::{
    ModuleExport, SemanticAnalyzer, SemanticFactory, SymbolLocation, TypeInfo,
};
pub use features::watcher::{WatchEvent, WatchEventType};
pub use runtime::callbacks::Subscription;
pub use runtime::lifecycle::{ProjectBoundary, Role};
pub use shared::error::{ErrorKind, GildashError, Result};

// The store's row and query types are part of the public surface
pub use gildash_store::{
    FileRecord, IndexStats, Relation, RelationQuery, RelationType, Span, Symbol, SymbolKind,
    SymbolQuery,
};
