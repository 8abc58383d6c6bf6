//! Symbol list diffing
//!
//! Keys each symbol by `(name, file_path)` and reports additions, removals,
//! and fingerprint changes between two extractions.

use std::collections::HashMap;

use gildash_store::Symbol;

/// Result of [`diff_symbols`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SymbolDiff {
    pub added: Vec<Symbol>,
    pub removed: Vec<Symbol>,
    /// Pairs of (before, after) with the same key and different fingerprints
    pub modified: Vec<(Symbol, Symbol)>,
}

impl SymbolDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}

/// Diff two symbol lists.
///
/// A fingerprint absent on both sides compares equal, so extractors that do
/// not fingerprint never produce phantom modifications.
pub fn diff_symbols(before: &[Symbol], after: &[Symbol]) -> SymbolDiff {
    let key = |s: &Symbol| (s.name.clone(), s.file_path.clone());

    let before_map: HashMap<_, &Symbol> = before.iter().map(|s| (key(s), s)).collect();
    let after_map: HashMap<_, &Symbol> = after.iter().map(|s| (key(s), s)).collect();

    let mut diff = SymbolDiff::default();

    for symbol in after {
        match before_map.get(&key(symbol)) {
            None => diff.added.push(symbol.clone()),
            Some(previous) => {
                if previous.fingerprint != symbol.fingerprint {
                    diff.modified.push(((*previous).clone(), symbol.clone()));
                }
            }
        }
    }
    for symbol in before {
        if !after_map.contains_key(&key(symbol)) {
            diff.removed.push(symbol.clone());
        }
    }

    diff
}
