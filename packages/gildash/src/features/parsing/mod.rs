//! Parsing and extraction
//!
//! tree-sitter parsing, symbol and relation extraction, shape fingerprints,
//! symbol diffing, the bounded parse LRU, and AST pattern search.

pub mod diff;
pub mod fingerprint;
pub mod node_kinds;
pub mod parse_cache;
pub mod parser;
pub mod pattern;
pub mod relations;
pub mod symbols;
