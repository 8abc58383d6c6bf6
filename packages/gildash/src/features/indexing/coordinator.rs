//! Index coordinator
//!
//! Brings the store into agreement with disk. Full runs sweep the project
//! root and categorize every discovered file as unchanged, changed, or
//! deleted; incremental runs reconcile the debounced watcher batch through
//! the same per-file pipeline. Parsing and extraction fan out on rayon, but
//! each file's delete-then-insert commits atomically before the next file's
//! cycle, and a per-file failure never aborts the run.

use parking_lot::Mutex;
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, RecvTimeoutError, Sender};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::discovery::{build_ignore_set, discover_source_files};
use super::tsconfig::{load_tsconfig_paths, TsconfigPaths};
use crate::config::GildashConfig;
use crate::features::parsing::diff::diff_symbols;
use crate::features::parsing::parse_cache::ParseCache;
use crate::features::parsing::parser::{ParsedFile, SourceParser};
use crate::features::parsing::relations::{RelationExtractor, ResolveOptions};
use crate::features::parsing::symbols::SymbolExtractor;
use crate::features::semantic::SemanticAnalyzer;
use crate::features::watcher::{WatchEvent, WatchEventType};
use crate::runtime::callbacks::CallbackRegistry;
use crate::shared::error::{GildashError, Result};
use gildash_store::{FileRecord, Relation, SqliteStore, Symbol};

/// Symbol-level change counts for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ChangedSymbolCounts {
    pub added: usize,
    pub modified: usize,
    pub removed: usize,
}

/// What one index run did. Delivered to every `on_indexed` subscriber.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct IndexResult {
    /// Files (re)indexed this run
    pub indexed_files: u64,
    /// Files removed from the store this run
    pub removed_files: u64,
    pub total_symbols: u64,
    pub total_relations: u64,
    pub duration_ms: u64,
    pub changed_files: Vec<String>,
    pub deleted_files: Vec<String>,
    pub changed_symbols: ChangedSymbolCounts,
    pub failed_files: Vec<String>,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn mtime_ms_of(metadata: &std::fs::Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|time| time.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|duration| duration.as_millis() as i64)
        .unwrap_or(0)
}

/// Outcome of preparing one candidate file off the store thread.
enum Prepared {
    /// mtime+size (or content hash) matched the record
    Unchanged {
        file_path: String,
        /// Set when the stat drifted but the hash matched
        refresh_stat: Option<(i64, u64)>,
    },
    Changed {
        record: FileRecord,
        parsed: Arc<ParsedFile>,
        symbols: Vec<Symbol>,
        relations: Vec<Relation>,
    },
    Failed {
        file_path: String,
        error: GildashError,
    },
    /// Vanished between discovery and read
    Missing { file_path: String },
}

struct DebounceWorker {
    tx: Sender<WatchEvent>,
    handle: thread::JoinHandle<()>,
}

pub struct IndexCoordinator {
    store: SqliteStore,
    parse_cache: Arc<ParseCache>,
    config: GildashConfig,
    project: String,
    callbacks: Arc<CallbackRegistry>,
    semantic: Arc<Mutex<Option<Arc<dyn SemanticAnalyzer>>>>,
    /// Called after a run commits, before callbacks fire
    graph_hook: Mutex<Option<Arc<dyn Fn() + Send + Sync>>>,
    tsconfig_cache: Mutex<Option<Option<TsconfigPaths>>>,
    run_lock: Mutex<()>,
    shutdown: AtomicBool,
    debounce: Mutex<Option<DebounceWorker>>,
}

impl IndexCoordinator {
    pub fn new(
        store: SqliteStore,
        parse_cache: Arc<ParseCache>,
        config: GildashConfig,
        project: String,
        callbacks: Arc<CallbackRegistry>,
        semantic: Arc<Mutex<Option<Arc<dyn SemanticAnalyzer>>>>,
    ) -> Result<Arc<Self>> {
        // Validate the globs up front so runs cannot fail on them later
        build_ignore_set(&config.ignore_patterns)?;
        Ok(Arc::new(Self {
            store,
            parse_cache,
            config,
            project,
            callbacks,
            semantic,
            graph_hook: Mutex::new(None),
            tsconfig_cache: Mutex::new(None),
            run_lock: Mutex::new(()),
            shutdown: AtomicBool::new(false),
            debounce: Mutex::new(None),
        }))
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// Install the graph-cache invalidation hook. Runs after every commit,
    /// before subscriber callbacks observe the run.
    pub fn set_graph_hook(&self, hook: Arc<dyn Fn() + Send + Sync>) {
        *self.graph_hook.lock() = Some(hook);
    }

    /// Start the debounce worker that turns watcher bursts into runs.
    pub fn start_event_pipeline(self: &Arc<Self>) {
        let (tx, rx) = channel::<WatchEvent>();
        let weak: Weak<IndexCoordinator> = Arc::downgrade(self);
        let window = self.config.debounce_window;
        let spawned = thread::Builder::new()
            .name("gildash-debounce".to_string())
            .spawn(move || loop {
                let Ok(first) = rx.recv() else {
                    break;
                };
                let mut batch = vec![first];
                let mut disconnected = false;
                loop {
                    match rx.recv_timeout(window) {
                        Ok(event) => batch.push(event),
                        Err(RecvTimeoutError::Timeout) => break,
                        Err(RecvTimeoutError::Disconnected) => {
                            disconnected = true;
                            break;
                        }
                    }
                }
                let Some(coordinator) = weak.upgrade() else {
                    break;
                };
                if coordinator.shutdown.load(Ordering::SeqCst) {
                    break;
                }
                if let Err(err) = coordinator.run_incremental(batch) {
                    warn!(error = %err, "incremental index run failed");
                }
                if disconnected {
                    break;
                }
            });
        match spawned {
            Ok(handle) => {
                *self.debounce.lock() = Some(DebounceWorker { tx, handle });
            }
            Err(err) => warn!(error = %err, "failed to spawn the debounce worker"),
        }
    }

    /// Feed normalized watcher events into the debounce pipeline.
    pub fn handle_events(&self, events: Vec<WatchEvent>) {
        if self.shutdown.load(Ordering::SeqCst) {
            return;
        }
        let debounce = self.debounce.lock();
        if let Some(worker) = debounce.as_ref() {
            for event in events {
                let _ = worker.tx.send(event);
            }
        }
    }

    /// Finish the in-flight run and refuse further work. Idempotent.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let worker = self.debounce.lock().take();
        if let Some(worker) = worker {
            drop(worker.tx);
            let _ = worker.handle.join();
        }
        // Wait for any in-flight run to reach its safe point
        drop(self.run_lock.lock());
    }

    pub fn invalidate_tsconfig_cache(&self) {
        *self.tsconfig_cache.lock() = None;
        debug!("tsconfig path cache invalidated");
    }

    fn tsconfig_paths(&self) -> Option<TsconfigPaths> {
        let mut cache = self.tsconfig_cache.lock();
        if cache.is_none() {
            *cache = Some(load_tsconfig_paths(&self.config.project_root));
        }
        cache.as_ref().and_then(Clone::clone)
    }

    /// Full index: discover, categorize, reconcile.
    pub fn run_full(&self) -> Result<IndexResult> {
        let _guard = self.run_lock.lock();
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(GildashError::closed("index coordinator is shut down"));
        }
        let started = Instant::now();

        let records = self.store.get_files_map(&self.project)?;
        let ignore = build_ignore_set(&self.config.ignore_patterns)?;
        let discovered = discover_source_files(
            &self.config.project_root,
            &self.config.extensions,
            &ignore,
        )?;

        let discovered_set: std::collections::HashSet<&str> =
            discovered.iter().map(String::as_str).collect();
        let deleted: Vec<String> = records
            .keys()
            .filter(|path| !discovered_set.contains(path.as_str()))
            .cloned()
            .collect();

        info!(
            project = %self.project,
            discovered = discovered.len(),
            tracked = records.len(),
            "starting full index"
        );
        self.reconcile(discovered, deleted, records, started)
    }

    /// Incremental index over one debounced watcher batch.
    pub fn run_incremental(&self, events: Vec<WatchEvent>) -> Result<IndexResult> {
        let _guard = self.run_lock.lock();
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(GildashError::closed("index coordinator is shut down"));
        }
        let started = Instant::now();

        // Last event per file wins; per-file order is the arrival order
        let mut latest: Vec<(String, WatchEventType)> = Vec::new();
        for event in events {
            if let Some(entry) = latest.iter_mut().find(|(path, _)| *path == event.file_path) {
                entry.1 = event.event_type;
            } else {
                latest.push((event.file_path, event.event_type));
            }
        }

        let records = self.store.get_files_map(&self.project)?;
        let mut changed = Vec::new();
        let mut deleted = Vec::new();
        for (file_path, event_type) in latest {
            if self.is_config_file(&file_path) {
                if file_path == "tsconfig.json" || file_path == "jsconfig.json" {
                    self.invalidate_tsconfig_cache();
                }
                continue;
            }
            match event_type {
                WatchEventType::Delete => {
                    if records.contains_key(&file_path) {
                        deleted.push(file_path);
                    }
                }
                WatchEventType::Create | WatchEventType::Change => {
                    if self.config.project_root.join(&file_path).exists() {
                        changed.push(file_path);
                    } else if records.contains_key(&file_path) {
                        // Raced with a deletion
                        deleted.push(file_path);
                    }
                }
            }
        }

        self.reconcile(changed, deleted, records, started)
    }

    fn is_config_file(&self, file_path: &str) -> bool {
        let name = file_path.rsplit('/').next().unwrap_or(file_path);
        matches!(name, "package.json" | "tsconfig.json" | "jsconfig.json")
    }

    /// The shared pipeline: prepare candidates in parallel, commit per file,
    /// remove deletions, then publish the result.
    fn reconcile(
        &self,
        candidates: Vec<String>,
        deleted: Vec<String>,
        records: HashMap<String, FileRecord>,
        started: Instant,
    ) -> Result<IndexResult> {
        let paths = self.tsconfig_paths();
        let root = self.config.project_root.clone();
        let extensions = self.config.extensions.clone();
        let project = self.project.clone();

        let prepared: Vec<Prepared> = candidates
            .par_iter()
            .map(|file_path| {
                prepare_file(
                    &root,
                    file_path,
                    &project,
                    &extensions,
                    paths.as_ref(),
                    records.get(file_path),
                )
            })
            .collect();

        let mut result = IndexResult::default();
        let mut counts = ChangedSymbolCounts::default();

        for item in prepared {
            match item {
                Prepared::Unchanged {
                    file_path,
                    refresh_stat,
                } => {
                    if let Some((mtime_ms, byte_size)) = refresh_stat {
                        self.store.touch_file_stat(
                            &self.project,
                            &file_path,
                            mtime_ms,
                            byte_size,
                            now_ms(),
                        )?;
                    }
                }
                Prepared::Missing { file_path } => {
                    if records.contains_key(&file_path) {
                        self.remove_file(&file_path, &mut result)?;
                    }
                }
                Prepared::Failed { file_path, error } => {
                    warn!(file = %file_path, error = %error, "per-file index step failed");
                    result.failed_files.push(file_path);
                }
                Prepared::Changed {
                    record,
                    parsed,
                    symbols,
                    relations,
                } => {
                    let before = self.store.get_file_symbols(&self.project, &record.file_path)?;
                    let diff = diff_symbols(&before, &symbols);
                    counts.added += diff.added.len();
                    counts.modified += diff.modified.len();
                    counts.removed += diff.removed.len();

                    self.store.replace_file_index(&record, &symbols, &relations)?;

                    let abs_path = self
                        .config
                        .project_root
                        .join(&record.file_path)
                        .to_string_lossy()
                        .into_owned();
                    self.parse_cache.set(abs_path, Arc::clone(&parsed));
                    self.notify_semantic_change(&record.file_path, &parsed.source_text);

                    result.changed_files.push(record.file_path.clone());
                    result.indexed_files += 1;
                }
            }
        }

        for file_path in deleted {
            self.remove_file(&file_path, &mut result)?;
        }

        result.changed_symbols = counts;
        let stats = self.store.get_stats(&self.project)?;
        result.total_symbols = stats.symbol_count;
        result.total_relations = self.store.count_relations(&self.project)?;
        result.duration_ms = started.elapsed().as_millis() as u64;

        info!(
            project = %self.project,
            indexed = result.indexed_files,
            removed = result.removed_files,
            failed = result.failed_files.len(),
            duration_ms = result.duration_ms,
            "index run complete"
        );

        // Graph cache drops before any subscriber observes the run
        let hook = self.graph_hook.lock().clone();
        if let Some(hook) = hook {
            hook();
        }
        self.callbacks.dispatch(&result);
        Ok(result)
    }

    fn remove_file(&self, file_path: &str, result: &mut IndexResult) -> Result<()> {
        self.store.remove_file_index(&self.project, file_path)?;
        let abs_path = self
            .config
            .project_root
            .join(file_path)
            .to_string_lossy()
            .into_owned();
        self.parse_cache.invalidate(&abs_path);

        let semantic = self.semantic.lock().clone();
        if let Some(semantic) = semantic {
            if let Err(err) = semantic.notify_file_deleted(file_path) {
                warn!(file = %file_path, error = %err, "semantic delete notification failed");
            }
        }

        result.deleted_files.push(file_path.to_string());
        result.removed_files += 1;
        Ok(())
    }

    fn notify_semantic_change(&self, file_path: &str, content: &str) {
        let semantic = self.semantic.lock().clone();
        if let Some(semantic) = semantic {
            if let Err(err) = semantic.notify_file_changed(file_path, content) {
                warn!(file = %file_path, error = %err, "semantic change notification failed");
            }
        }
    }
}

/// Read, hash, parse, and extract one candidate file. Runs on the rayon
/// pool; everything store-related happens later on the committing thread.
fn prepare_file(
    root: &Path,
    file_path: &str,
    project: &str,
    extensions: &[String],
    paths: Option<&TsconfigPaths>,
    record: Option<&FileRecord>,
) -> Prepared {
    let abs_path = root.join(file_path);
    let metadata = match std::fs::metadata(&abs_path) {
        Ok(metadata) => metadata,
        Err(_) => {
            return Prepared::Missing {
                file_path: file_path.to_string(),
            }
        }
    };
    let mtime_ms = mtime_ms_of(&metadata);
    let byte_size = metadata.len();

    if let Some(record) = record {
        if record.mtime_ms == mtime_ms && record.byte_size == byte_size {
            return Prepared::Unchanged {
                file_path: file_path.to_string(),
                refresh_stat: None,
            };
        }
    }

    let bytes = match std::fs::read(&abs_path) {
        Ok(bytes) => bytes,
        Err(err) => {
            return Prepared::Failed {
                file_path: file_path.to_string(),
                error: GildashError::index(format!("failed to read {file_path}")).with_source(err),
            }
        }
    };
    let hash = content_hash(&bytes);

    if let Some(record) = record {
        if record.content_hash == hash {
            // Stat drift without a content change
            return Prepared::Unchanged {
                file_path: file_path.to_string(),
                refresh_stat: Some((mtime_ms, byte_size)),
            };
        }
    }

    let text = String::from_utf8_lossy(&bytes).into_owned();
    let mut parser = match SourceParser::new() {
        Ok(parser) => parser,
        Err(error) => {
            return Prepared::Failed {
                file_path: file_path.to_string(),
                error,
            }
        }
    };
    let parsed = match parser.parse(&abs_path.to_string_lossy(), &text) {
        Ok(parsed) => Arc::new(parsed),
        Err(error) => {
            return Prepared::Failed {
                file_path: file_path.to_string(),
                error,
            }
        }
    };

    let symbols = SymbolExtractor::extract(&parsed, project, file_path);
    let relations = RelationExtractor::extract(
        &parsed,
        project,
        file_path,
        &ResolveOptions {
            project_root: Some(root),
            extensions,
            paths,
        },
    );

    Prepared::Changed {
        record: FileRecord {
            project: project.to_string(),
            file_path: file_path.to_string(),
            mtime_ms,
            byte_size,
            content_hash: hash,
            line_count: text.lines().count() as u32,
            updated_at: now_ms(),
        },
        parsed,
        symbols,
        relations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::watcher::WatchEventType;
    use std::fs;

    fn write_file(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn coordinator(root: &Path) -> Arc<IndexCoordinator> {
        let store = SqliteStore::in_memory().unwrap();
        let config = GildashConfig::new(root.to_path_buf());
        IndexCoordinator::new(
            store,
            Arc::new(ParseCache::new(16)),
            config,
            "p".to_string(),
            CallbackRegistry::new(),
            Arc::new(Mutex::new(None)),
        )
        .unwrap()
    }

    #[test]
    fn full_index_discovers_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "src/a.ts", "export const x = 1;\n");
        write_file(dir.path(), "src/b.ts", "import { x } from './a';\nexport const y = x;\n");

        let coordinator = coordinator(dir.path());
        let result = coordinator.run_full().unwrap();
        assert_eq!(result.indexed_files, 2);
        assert_eq!(result.changed_files, vec!["src/a.ts", "src/b.ts"]);
        assert!(result.failed_files.is_empty());
        assert!(result.total_symbols >= 2);
        assert!(result.total_relations >= 1);

        let files = coordinator.store.get_all_files("p").unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].file_path, "src/a.ts");
        assert!(files[0].line_count >= 1);
    }

    #[test]
    fn second_full_index_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "src/a.ts", "export const x = 1;\n");

        let coordinator = coordinator(dir.path());
        coordinator.run_full().unwrap();
        let second = coordinator.run_full().unwrap();
        assert_eq!(second.indexed_files, 0);
        assert!(second.changed_files.is_empty());
        assert!(second.deleted_files.is_empty());
    }

    #[test]
    fn content_change_reindexes_and_counts_modifications() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "src/a.ts", "export const x = 1;\n");

        let coordinator = coordinator(dir.path());
        coordinator.run_full().unwrap();

        write_file(dir.path(), "src/a.ts", "export const x: number = 2;\n");
        let result = coordinator
            .run_incremental(vec![WatchEvent {
                event_type: WatchEventType::Change,
                file_path: "src/a.ts".to_string(),
            }])
            .unwrap();
        assert_eq!(result.changed_files, vec!["src/a.ts"]);
        assert_eq!(result.changed_symbols.modified, 1);
    }

    #[test]
    fn deletions_remove_rows() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "src/a.ts", "export const x = 1;\n");
        write_file(dir.path(), "src/b.ts", "export const y = 2;\n");

        let coordinator = coordinator(dir.path());
        coordinator.run_full().unwrap();

        fs::remove_file(dir.path().join("src/b.ts")).unwrap();
        let result = coordinator.run_full().unwrap();
        assert_eq!(result.deleted_files, vec!["src/b.ts"]);
        assert_eq!(result.removed_files, 1);
        assert!(coordinator.store.get_file("p", "src/b.ts").unwrap().is_none());
        assert!(coordinator
            .store
            .get_file_symbols("p", "src/b.ts")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn per_file_failures_do_not_abort_the_run() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "src/ok.ts", "export const x = 1;\n");
        // Invalid UTF-8 still parses lossily; force a failure with an
        // unreadable path instead: a directory named like a source file.
        fs::create_dir_all(dir.path().join("src/trap.ts")).unwrap();

        let coordinator = coordinator(dir.path());
        let result = coordinator.run_full().unwrap();
        assert_eq!(result.indexed_files, 1);
        assert_eq!(result.failed_files, vec!["src/trap.ts"]);
    }

    #[test]
    fn callbacks_fire_after_store_effects() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "src/a.ts", "export const x = 1;\n");

        let store = SqliteStore::in_memory().unwrap();
        let callbacks = CallbackRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::<u64>::new()));
        {
            let store = store.clone();
            let seen = Arc::clone(&seen);
            callbacks.subscribe(Arc::new(move |result: &IndexResult| {
                // Store already reflects the run when the callback fires
                let stats = store.get_stats("p").unwrap();
                assert_eq!(stats.symbol_count, result.total_symbols);
                seen.lock().push(result.indexed_files);
            }));
        }
        let coordinator = IndexCoordinator::new(
            store,
            Arc::new(ParseCache::new(16)),
            GildashConfig::new(dir.path().to_path_buf()),
            "p".to_string(),
            callbacks,
            Arc::new(Mutex::new(None)),
        )
        .unwrap();
        coordinator.run_full().unwrap();
        assert_eq!(seen.lock().as_slice(), &[1]);
    }

    #[test]
    fn graph_hook_runs_before_callbacks() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "src/a.ts", "export const x = 1;\n");

        let callbacks = CallbackRegistry::new();
        let order = Arc::new(Mutex::new(Vec::<&'static str>::new()));
        {
            let order = Arc::clone(&order);
            callbacks.subscribe(Arc::new(move |_| order.lock().push("callback")));
        }
        let coordinator = IndexCoordinator::new(
            SqliteStore::in_memory().unwrap(),
            Arc::new(ParseCache::new(16)),
            GildashConfig::new(dir.path().to_path_buf()),
            "p".to_string(),
            callbacks,
            Arc::new(Mutex::new(None)),
        )
        .unwrap();
        {
            let order = Arc::clone(&order);
            coordinator.set_graph_hook(Arc::new(move || order.lock().push("graph")));
        }
        coordinator.run_full().unwrap();
        assert_eq!(order.lock().as_slice(), &["graph", "callback"]);
    }

    #[test]
    fn debounced_events_collapse_into_one_run() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "src/a.ts", "export const x = 1;\n");

        let coordinator = coordinator(dir.path());
        coordinator.run_full().unwrap();
        coordinator.start_event_pipeline();

        write_file(dir.path(), "src/a.ts", "export const x = 2;\n");
        let runs = Arc::new(Mutex::new(0usize));
        {
            let runs = Arc::clone(&runs);
            coordinator.callbacks.subscribe(Arc::new(move |_| {
                *runs.lock() += 1;
            }));
        }
        let event = || WatchEvent {
            event_type: WatchEventType::Change,
            file_path: "src/a.ts".to_string(),
        };
        coordinator.handle_events(vec![event(), event(), event()]);
        std::thread::sleep(std::time::Duration::from_millis(300));
        assert_eq!(*runs.lock(), 1);
        coordinator.shutdown();
    }

    #[test]
    fn shutdown_refuses_further_runs() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path());
        coordinator.shutdown();
        let err = coordinator.run_full().unwrap_err();
        assert_eq!(err.kind, crate::shared::error::ErrorKind::Closed);
    }
}
