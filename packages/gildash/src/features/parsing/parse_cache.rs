//! Bounded LRU over parsed files
//!
//! Maps absolute file paths to shared [`ParsedFile`] values. Access is
//! serialized behind a mutex so concurrent readers observe a consistent
//! recency order.

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

use super::parser::ParsedFile;

pub struct ParseCache {
    entries: Mutex<LruCache<String, Arc<ParsedFile>>>,
}

impl ParseCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity clamped to >= 1");
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Fetch an entry, marking it most-recently used.
    pub fn get(&self, path: &str) -> Option<Arc<ParsedFile>> {
        self.entries.lock().get(path).cloned()
    }

    /// Insert or refresh an entry, evicting the least-recent when full.
    pub fn set(&self, path: impl Into<String>, parsed: Arc<ParsedFile>) {
        self.entries.lock().put(path.into(), parsed);
    }

    pub fn invalidate(&self, path: &str) {
        self.entries.lock().pop(path);
    }

    pub fn invalidate_all(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::parsing::parser::SourceParser;

    fn parsed(path: &str) -> Arc<ParsedFile> {
        let mut parser = SourceParser::new().unwrap();
        Arc::new(parser.parse(path, "const x = 1;\n").unwrap())
    }

    #[test]
    fn capacity_one_retains_only_the_last_set() {
        let cache = ParseCache::new(1);
        cache.set("/p/a.ts", parsed("/p/a.ts"));
        cache.set("/p/b.ts", parsed("/p/b.ts"));
        assert!(cache.get("/p/a.ts").is_none());
        assert!(cache.get("/p/b.ts").is_some());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn get_promotes_against_eviction() {
        let cache = ParseCache::new(2);
        cache.set("/p/a.ts", parsed("/p/a.ts"));
        cache.set("/p/b.ts", parsed("/p/b.ts"));
        // Touch a so b becomes the eviction candidate
        assert!(cache.get("/p/a.ts").is_some());
        cache.set("/p/c.ts", parsed("/p/c.ts"));
        assert!(cache.get("/p/a.ts").is_some());
        assert!(cache.get("/p/b.ts").is_none());
    }

    #[test]
    fn invalidate_all_then_get_returns_nothing() {
        let cache = ParseCache::new(4);
        cache.set("/p/a.ts", parsed("/p/a.ts"));
        cache.set("/p/b.ts", parsed("/p/b.ts"));
        cache.invalidate_all();
        assert!(cache.get("/p/a.ts").is_none());
        assert!(cache.get("/p/b.ts").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidate_is_per_path() {
        let cache = ParseCache::new(4);
        cache.set("/p/a.ts", parsed("/p/a.ts"));
        cache.set("/p/b.ts", parsed("/p/b.ts"));
        cache.invalidate("/p/a.ts");
        assert!(cache.get("/p/a.ts").is_none());
        assert!(cache.get("/p/b.ts").is_some());
    }
}
