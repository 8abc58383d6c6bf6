//! Runtime configuration
//!
//! Defaults match the production cadence (30 s heartbeat, 60 s healthcheck,
//! 50 ms debounce); tests shrink the intervals through the builder instead of
//! sleeping through real ones.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::features::semantic::SemanticFactory;

/// Owners refresh their heartbeat row at this cadence.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Readers re-run role acquisition at this cadence.
pub const HEALTHCHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Consecutive healthcheck failures tolerated before the instance closes itself.
pub const MAX_HEALTHCHECK_RETRIES: u32 = 10;

/// An owner row older than `STALE_OWNER_MULTIPLIER * heartbeat_interval` is
/// considered abandoned and may be replaced.
pub const STALE_OWNER_MULTIPLIER: u32 = 3;

/// Window within which watcher event bursts collapse into one index run.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(50);

/// Parsed-AST LRU capacity.
pub const PARSE_CACHE_CAPACITY: usize = 500;

/// Metadata directory created under the project root.
pub const META_DIR_NAME: &str = ".gildash";

/// Database file name inside the metadata directory.
pub const DB_FILE_NAME: &str = "index.db";

/// Source extensions indexed when the caller does not override them.
pub const DEFAULT_EXTENSIONS: &[&str] = &[".ts", ".mts", ".cts"];

/// Configuration for [`crate::Gildash::open`].
#[derive(Clone)]
pub struct GildashConfig {
    /// Absolute project root. Must exist.
    pub project_root: PathBuf,
    /// Accepted source extensions, leading dot included, compared
    /// case-insensitively.
    pub extensions: Vec<String>,
    /// Caller ignore globs, unioned with the built-in floor.
    pub ignore_patterns: Vec<String>,
    /// When false: no role, no watcher, no heartbeat, no signal handlers;
    /// one-shot full index only.
    pub watch_mode: bool,
    /// Construct the semantic bridge before the first full index.
    pub semantic: bool,
    /// Delete the store files after close.
    pub cleanup_on_close: bool,
    pub parse_cache_capacity: usize,
    pub heartbeat_interval: Duration,
    pub healthcheck_interval: Duration,
    pub stale_owner_multiplier: u32,
    pub debounce_window: Duration,
    /// Test hook: builds the semantic analyzer instead of the default
    /// tree-sitter-backed one.
    pub semantic_factory: Option<SemanticFactory>,
}

impl GildashConfig {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            ignore_patterns: Vec::new(),
            watch_mode: true,
            semantic: false,
            cleanup_on_close: false,
            parse_cache_capacity: PARSE_CACHE_CAPACITY,
            heartbeat_interval: HEARTBEAT_INTERVAL,
            healthcheck_interval: HEALTHCHECK_INTERVAL,
            stale_owner_multiplier: STALE_OWNER_MULTIPLIER,
            debounce_window: DEBOUNCE_WINDOW,
            semantic_factory: None,
        }
    }

    pub fn with_extensions(mut self, extensions: impl IntoIterator<Item = String>) -> Self {
        self.extensions = extensions.into_iter().collect();
        self
    }

    pub fn with_ignore_patterns(mut self, patterns: impl IntoIterator<Item = String>) -> Self {
        self.ignore_patterns = patterns.into_iter().collect();
        self
    }

    pub fn with_watch_mode(mut self, watch_mode: bool) -> Self {
        self.watch_mode = watch_mode;
        self
    }

    pub fn with_semantic(mut self, semantic: bool) -> Self {
        self.semantic = semantic;
        self
    }

    pub fn with_cleanup_on_close(mut self, cleanup: bool) -> Self {
        self.cleanup_on_close = cleanup;
        self
    }

    pub fn with_parse_cache_capacity(mut self, capacity: usize) -> Self {
        self.parse_cache_capacity = capacity;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_healthcheck_interval(mut self, interval: Duration) -> Self {
        self.healthcheck_interval = interval;
        self
    }

    pub fn with_debounce_window(mut self, window: Duration) -> Self {
        self.debounce_window = window;
        self
    }

    pub fn with_semantic_factory(mut self, factory: SemanticFactory) -> Self {
        self.semantic_factory = Some(factory);
        self
    }

    /// The owner-staleness cutoff in milliseconds.
    pub fn stale_owner_threshold_ms(&self) -> i64 {
        self.heartbeat_interval.as_millis() as i64 * i64::from(self.stale_owner_multiplier)
    }

    /// `<project_root>/.gildash/index.db`
    pub fn db_path(&self) -> PathBuf {
        self.project_root.join(META_DIR_NAME).join(DB_FILE_NAME)
    }

    /// Case-insensitive extension acceptance, dot included.
    pub fn accepts_extension(&self, file_name: &str) -> bool {
        let lower = file_name.to_ascii_lowercase();
        self.extensions
            .iter()
            .any(|ext| lower.ends_with(&ext.to_ascii_lowercase()))
    }
}

impl fmt::Debug for GildashConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GildashConfig")
            .field("project_root", &self.project_root)
            .field("extensions", &self.extensions)
            .field("ignore_patterns", &self.ignore_patterns)
            .field("watch_mode", &self.watch_mode)
            .field("semantic", &self.semantic)
            .field("cleanup_on_close", &self.cleanup_on_close)
            .field("parse_cache_capacity", &self.parse_cache_capacity)
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("healthcheck_interval", &self.healthcheck_interval)
            .field("stale_owner_multiplier", &self.stale_owner_multiplier)
            .field("debounce_window", &self.debounce_window)
            .field(
                "semantic_factory",
                &self.semantic_factory.as_ref().map(|_| "<factory>"),
            )
            .finish()
    }
}
