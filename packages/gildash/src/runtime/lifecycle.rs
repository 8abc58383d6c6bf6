//! Lifecycle and role coordination
//!
//! Binds a runtime instance to the owner or reader role through the
//! heartbeat row in the shared store, keeps the binding alive over time,
//! promotes readers when the owner disappears, and tears everything down in
//! a fixed order at close. Owners carry the write-path infrastructure
//! (index coordinator, watcher, heartbeat timer); readers only run a
//! healthcheck that re-attempts acquisition.

use parking_lot::Mutex;
use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use tracing::{debug, info, warn};

use crate::config::{GildashConfig, MAX_HEALTHCHECK_RETRIES};
use crate::features::graph::engine::GraphEngine;
use crate::features::indexing::coordinator::{IndexCoordinator, IndexResult};
use crate::features::parsing::parse_cache::ParseCache;
use crate::features::semantic::{SemanticAnalyzer, StructuralAnalyzer};
use crate::features::watcher::{WatchEvent, WatcherAdapter};
use crate::runtime::callbacks::CallbackRegistry;
use crate::runtime::timer::RepeatingTimer;
use crate::shared::error::{ErrorKind, GildashError, Result};
use gildash_store::{OwnerRecord, SqliteStore};

/// The role a runtime instance holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Runs the write path: coordinator, watcher, heartbeat
    Owner,
    /// Queries only; healthchecks for promotion
    Reader,
    /// `watch_mode = false`: one-shot index, no role held
    Snapshot,
}

/// A discovered `(project, root directory)` pair.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ProjectBoundary {
    pub name: String,
    /// Relative to the project root; `.` for the root itself
    pub root_dir: String,
}

struct RuntimeState {
    role: Role,
    coordinator: Option<Arc<IndexCoordinator>>,
    watcher: Option<WatcherAdapter>,
    heartbeat: Option<RepeatingTimer>,
    healthcheck: Option<RepeatingTimer>,
    healthcheck_failures: u32,
    signals: Option<SignalGuard>,
}

pub(crate) struct Runtime {
    pub(crate) config: GildashConfig,
    pub(crate) store: SqliteStore,
    pub(crate) parse_cache: Arc<ParseCache>,
    pub(crate) graph: Arc<GraphEngine>,
    pub(crate) callbacks: Arc<CallbackRegistry>,
    pub(crate) semantic: Arc<Mutex<Option<Arc<dyn SemanticAnalyzer>>>>,
    pub(crate) default_project: String,
    projects: Mutex<Vec<ProjectBoundary>>,
    pid: i64,
    closed: AtomicBool,
    state: Mutex<RuntimeState>,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("default_project", &self.default_project)
            .field("pid", &self.pid)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Runtime {
    /// Open a runtime against `config.project_root`.
    pub(crate) fn open(config: GildashConfig) -> Result<Arc<Runtime>> {
        if !config.project_root.is_absolute() {
            return Err(GildashError::validation(format!(
                "project_root must be absolute, got {}",
                config.project_root.display()
            )));
        }
        if !config.project_root.is_dir() {
            return Err(GildashError::validation(format!(
                "project_root does not exist: {}",
                config.project_root.display()
            )));
        }

        let db_path = config.db_path();
        let meta_dir = config.project_root.join(crate::config::META_DIR_NAME);
        std::fs::create_dir_all(&meta_dir).map_err(|err| {
            GildashError::store(format!(
                "failed to create metadata directory {}",
                meta_dir.display()
            ))
            .with_source(err)
        })?;
        let store = SqliteStore::open(&db_path)?;

        // Everything past this point must close the store before surfacing
        match Self::open_with_store(config, store.clone()) {
            Ok(runtime) => Ok(runtime),
            Err(err) => {
                if let Err(close_err) = store.close() {
                    warn!(error = %close_err, "failed to close store after open failure");
                }
                Err(err)
            }
        }
    }

    fn open_with_store(config: GildashConfig, store: SqliteStore) -> Result<Arc<Runtime>> {
        let projects = discover_project_boundaries(&config.project_root);
        let default_project = projects
            .first()
            .map(|boundary| boundary.name.clone())
            .unwrap_or_else(|| {
                config
                    .project_root
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "default".to_string())
            });

        let semantic: Arc<Mutex<Option<Arc<dyn SemanticAnalyzer>>>> = Arc::new(Mutex::new(None));
        if config.semantic {
            let factory = config
                .semantic_factory
                .clone()
                .unwrap_or_else(StructuralAnalyzer::factory);
            let analyzer = factory(&config.project_root).map_err(|err| {
                if err.kind == ErrorKind::Semantic {
                    err
                } else {
                    GildashError::semantic("semantic bridge failed to initialize").with_source(err)
                }
            })?;
            *semantic.lock() = Some(analyzer);
        }

        let runtime = Arc::new(Runtime {
            parse_cache: Arc::new(ParseCache::new(config.parse_cache_capacity)),
            graph: Arc::new(GraphEngine::new(store.clone())),
            callbacks: CallbackRegistry::new(),
            semantic,
            default_project,
            projects: Mutex::new(projects),
            pid: std::process::id() as i64,
            closed: AtomicBool::new(false),
            state: Mutex::new(RuntimeState {
                role: Role::Reader,
                coordinator: None,
                watcher: None,
                heartbeat: None,
                healthcheck: None,
                healthcheck_failures: 0,
                signals: None,
            }),
            store,
            config,
        });

        if !runtime.config.watch_mode {
            // One-shot: full index, then live as a reader-like snapshot
            let coordinator = runtime.build_coordinator()?;
            coordinator.run_full()?;
            let mut state = runtime.state.lock();
            state.role = Role::Snapshot;
            state.coordinator = Some(coordinator);
            drop(state);
            return Ok(runtime);
        }

        match runtime.acquire_role()? {
            Role::Owner => {
                info!(pid = runtime.pid, "acquired owner role");
                runtime.build_owner_infra()?;
            }
            _ => {
                info!(pid = runtime.pid, "joined as reader");
                runtime.start_healthcheck();
            }
        }

        let guard = SignalGuard::register(Arc::downgrade(&runtime))?;
        runtime.state.lock().signals = Some(guard);

        Ok(runtime)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn role(&self) -> Role {
        self.state.lock().role
    }

    /// A fresh copy of the discovered project boundaries.
    pub(crate) fn project_boundaries(&self) -> Vec<ProjectBoundary> {
        self.projects.lock().clone()
    }

    // ── Role acquisition ───────────────────────────────────────────────

    /// One acquisition round against the owner row.
    fn acquire_role(&self) -> Result<Role> {
        let now = chrono::Utc::now().timestamp_millis();
        let record = OwnerRecord {
            pid: self.pid,
            heartbeat_at: now,
        };

        if self.store.insert_owner(&record)? {
            return Ok(Role::Owner);
        }
        let Some(current) = self.store.select_owner()? else {
            // Deleted between insert and select; next round resolves it
            return Ok(Role::Reader);
        };
        if now.saturating_sub(current.heartbeat_at) >= self.config.stale_owner_threshold_ms() {
            info!(
                stale_pid = current.pid,
                "replacing stale owner heartbeat"
            );
            self.store.replace_owner(&record)?;
            return Ok(Role::Owner);
        }
        Ok(Role::Reader)
    }

    fn build_coordinator(self: &Arc<Self>) -> Result<Arc<IndexCoordinator>> {
        let coordinator = IndexCoordinator::new(
            self.store.clone(),
            Arc::clone(&self.parse_cache),
            self.config.clone(),
            self.default_project.clone(),
            Arc::clone(&self.callbacks),
            Arc::clone(&self.semantic),
        )?;
        // Installed last relative to user callbacks: the hook runs before
        // dispatch, so subscribers always observe an invalidated cache
        let graph = Arc::clone(&self.graph);
        coordinator.set_graph_hook(Arc::new(move || graph.invalidate()));
        Ok(coordinator)
    }

    /// Construct the owner-only infrastructure and run the initial full
    /// index. On failure every partial piece is torn down.
    fn build_owner_infra(self: &Arc<Self>) -> Result<()> {
        let result = self.try_build_owner_infra();
        if let Err(ref err) = result {
            warn!(error = %err, "owner infrastructure construction failed; rolling back");
            self.rollback_owner_infra();
        }
        result
    }

    fn try_build_owner_infra(self: &Arc<Self>) -> Result<()> {
        let coordinator = self.build_coordinator()?;
        coordinator.start_event_pipeline();

        let weak: Weak<Runtime> = Arc::downgrade(self);
        let consumer: Arc<dyn Fn(Vec<WatchEvent>) + Send + Sync> =
            Arc::new(move |events: Vec<WatchEvent>| {
                if let Some(runtime) = weak.upgrade() {
                    runtime.on_watch_batch(events);
                }
            });
        let watcher = WatcherAdapter::subscribe(
            &self.config.project_root,
            &self.config.extensions,
            &self.config.ignore_patterns,
            consumer,
        )?;

        let heartbeat = {
            let weak: Weak<Runtime> = Arc::downgrade(self);
            RepeatingTimer::spawn(
                "gildash-heartbeat",
                self.config.heartbeat_interval,
                move || {
                    if let Some(runtime) = weak.upgrade() {
                        runtime.heartbeat_tick();
                    }
                },
            )
        };

        {
            let mut state = self.state.lock();
            if self.is_closed() {
                // Close raced the promotion; hand everything to rollback
                return Err(GildashError::closed("closed during owner construction"));
            }
            state.role = Role::Owner;
            state.coordinator = Some(Arc::clone(&coordinator));
            state.watcher = Some(watcher);
            state.heartbeat = Some(heartbeat);
        }

        coordinator.run_full().map_err(|err| {
            GildashError::index("initial full index failed").with_source(err)
        })?;

        // Promotion contract: feed every tracked file into the semantic
        // bridge so it sees the current content
        let semantic = self.semantic.lock().clone();
        if let Some(semantic) = semantic {
            for record in self.store.get_all_files(&self.default_project)? {
                let abs = self.config.project_root.join(&record.file_path);
                match std::fs::read_to_string(&abs) {
                    Ok(content) => {
                        if let Err(err) = semantic.notify_file_changed(&record.file_path, &content)
                        {
                            warn!(file = %record.file_path, error = %err, "semantic feed failed");
                        }
                    }
                    Err(err) => {
                        debug!(file = %record.file_path, error = %err, "skipping unreadable file for semantic feed");
                    }
                }
            }
        }
        Ok(())
    }

    /// Undo a partial owner build, swallowing secondary errors to the log.
    fn rollback_owner_infra(&self) {
        let (coordinator, watcher, heartbeat) = {
            let mut state = self.state.lock();
            state.role = Role::Reader;
            (
                state.coordinator.take(),
                state.watcher.take(),
                state.heartbeat.take(),
            )
        };
        if let Some(coordinator) = coordinator {
            coordinator.shutdown();
        }
        if let Some(mut watcher) = watcher {
            if let Err(err) = watcher.unsubscribe() {
                warn!(error = %err, "watcher teardown failed during rollback");
            }
        }
        if let Some(mut heartbeat) = heartbeat {
            heartbeat.cancel();
        }
        if let Err(err) = self.store.delete_owner(self.pid) {
            warn!(error = %err, "failed to release owner row during rollback");
        }
    }

    fn on_watch_batch(&self, events: Vec<WatchEvent>) {
        let coordinator = self.state.lock().coordinator.clone();
        if let Some(coordinator) = coordinator {
            coordinator.handle_events(events);
        }
    }

    fn heartbeat_tick(&self) {
        if self.is_closed() {
            return;
        }
        let now = chrono::Utc::now().timestamp_millis();
        match self.store.touch_owner(self.pid, now) {
            Ok(true) => {}
            Ok(false) => {
                warn!("heartbeat found no owner row for this pid; re-inserting");
                let record = OwnerRecord {
                    pid: self.pid,
                    heartbeat_at: now,
                };
                if let Err(err) = self.store.insert_owner(&record) {
                    warn!(error = %err, "owner row re-insert failed");
                }
            }
            Err(err) => warn!(error = %err, "heartbeat failed"),
        }
    }

    // ── Reader healthcheck & promotion ─────────────────────────────────

    fn start_healthcheck(self: &Arc<Self>) {
        let weak: Weak<Runtime> = Arc::downgrade(self);
        let timer = RepeatingTimer::spawn(
            "gildash-healthcheck",
            self.config.healthcheck_interval,
            move || {
                if let Some(runtime) = weak.upgrade() {
                    runtime.healthcheck_tick();
                }
            },
        );
        self.state.lock().healthcheck = Some(timer);
    }

    fn healthcheck_tick(self: Arc<Self>) {
        if self.is_closed() || self.role() != Role::Reader {
            return;
        }
        match self.acquire_role() {
            Ok(Role::Owner) => {
                info!(pid = self.pid, "reader promoted to owner");
                // The healthcheck timer is cancelled off-thread: this tick
                // runs ON its thread, and cancel joins
                let defunct = self.state.lock().healthcheck.take();
                if let Some(timer) = defunct {
                    thread::spawn(move || {
                        let mut timer = timer;
                        timer.cancel();
                    });
                }
                if self.build_owner_infra().is_err() {
                    // Rollback already ran; restore the healthcheck
                    self.start_healthcheck();
                } else {
                    self.state.lock().healthcheck_failures = 0;
                }
            }
            Ok(_) => {
                self.state.lock().healthcheck_failures = 0;
            }
            Err(err) => {
                let failures = {
                    let mut state = self.state.lock();
                    state.healthcheck_failures += 1;
                    state.healthcheck_failures
                };
                warn!(error = %err, failures, "healthcheck failed");
                if failures >= MAX_HEALTHCHECK_RETRIES {
                    warn!("healthcheck retry budget exhausted; closing instance");
                    let runtime = Arc::clone(&self);
                    thread::spawn(move || {
                        if let Err(err) = runtime.close() {
                            warn!(error = %err, "self-close after healthcheck failures reported errors");
                        }
                    });
                }
            }
        }
    }

    // ── Owner-only operations ──────────────────────────────────────────

    /// Run a full index now. Owners and snapshots only.
    pub(crate) fn reindex(&self) -> Result<IndexResult> {
        let (role, coordinator) = {
            let state = self.state.lock();
            (state.role, state.coordinator.clone())
        };
        let coordinator = match (role, coordinator) {
            (Role::Owner | Role::Snapshot, Some(coordinator)) => coordinator,
            _ => return Err(GildashError::closed("not available for readers")),
        };
        self.graph.invalidate();
        coordinator.run_full()
    }

    // ── Close ──────────────────────────────────────────────────────────

    /// Idempotent teardown. Every step runs; failures aggregate into one
    /// `close` error.
    pub(crate) fn close(self: &Arc<Self>) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!(pid = self.pid, "closing gildash runtime");
        let mut failures: Vec<GildashError> = Vec::new();

        // Take everything out under the lock, tear down outside it so
        // in-flight ticks can drain
        let (role, coordinator, watcher, heartbeat, healthcheck, signals) = {
            let mut state = self.state.lock();
            (
                state.role,
                state.coordinator.take(),
                state.watcher.take(),
                state.heartbeat.take(),
                state.healthcheck.take(),
                state.signals.take(),
            )
        };

        if let Some(mut heartbeat) = heartbeat {
            heartbeat.cancel();
        }
        if let Some(mut healthcheck) = healthcheck {
            healthcheck.cancel();
        }

        let semantic = self.semantic.lock().take();
        if let Some(semantic) = semantic {
            if let Err(err) = semantic.dispose() {
                failures.push(err);
            }
        }

        if let Some(coordinator) = coordinator {
            coordinator.shutdown();
        }

        if let Some(mut watcher) = watcher {
            if let Err(err) = watcher.unsubscribe() {
                failures.push(err);
            }
        }

        if role == Role::Owner {
            if let Err(err) = self.store.delete_owner(self.pid) {
                failures.push(err.into());
            }
        }

        if let Err(err) = self.store.close() {
            failures.push(err.into());
        }

        if self.config.cleanup_on_close {
            if let Err(err) = self.store.delete_files() {
                failures.push(err.into());
            }
        }

        if let Some(mut signals) = signals {
            if let Err(err) = signals.unregister() {
                failures.push(err);
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(GildashError::close_aggregate(failures))
        }
    }
}

// ── Project discovery ──────────────────────────────────────────────────

fn package_name(path: &Path) -> Option<String> {
    let raw = std::fs::read_to_string(path).ok()?;
    let value: serde_json::Value = serde_json::from_str(&raw).ok()?;
    value
        .get("name")
        .and_then(serde_json::Value::as_str)
        .map(|name| name.to_string())
}

/// Root `package.json` first, then first-level directories that carry their
/// own `package.json` or `tsconfig.json`.
fn discover_project_boundaries(root: &Path) -> Vec<ProjectBoundary> {
    let mut boundaries = Vec::new();

    if let Some(name) = package_name(&root.join("package.json")) {
        boundaries.push(ProjectBoundary {
            name,
            root_dir: ".".to_string(),
        });
    }

    let mut children: Vec<(String, std::path::PathBuf)> = Vec::new();
    if let Ok(entries) = std::fs::read_dir(root) {
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let dir_name = entry.file_name().to_string_lossy().into_owned();
            if matches!(dir_name.as_str(), "node_modules" | "dist")
                || dir_name.starts_with('.')
            {
                continue;
            }
            if path.join("package.json").is_file() || path.join("tsconfig.json").is_file() {
                children.push((dir_name, path));
            }
        }
    }
    children.sort_by(|a, b| a.0.cmp(&b.0));
    for (dir_name, path) in children {
        let name = package_name(&path.join("package.json")).unwrap_or_else(|| dir_name.clone());
        boundaries.push(ProjectBoundary {
            name,
            root_dir: dir_name,
        });
    }

    boundaries
}

// ── Signal handling ────────────────────────────────────────────────────

/// Tracks exactly what was registered so close can unregister it.
struct SignalGuard {
    handle: signal_hook::iterator::Handle,
    thread: Option<thread::JoinHandle<()>>,
}

impl SignalGuard {
    fn register(runtime: Weak<Runtime>) -> Result<SignalGuard> {
        let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP]).map_err(|err| {
            GildashError::watcher("failed to register signal handlers").with_source(err)
        })?;
        let handle = signals.handle();
        let thread = thread::Builder::new()
            .name("gildash-signals".to_string())
            .spawn(move || {
                for signal in signals.forever() {
                    info!(signal, "termination signal received; closing");
                    if let Some(runtime) = runtime.upgrade() {
                        // Close on a fresh thread: the close sequence joins
                        // this one when unregistering
                        thread::spawn(move || {
                            if let Err(err) = runtime.close() {
                                warn!(error = %err, "close on signal reported errors");
                            }
                        });
                    }
                    break;
                }
            })
            .map_err(|err| {
                GildashError::watcher("failed to spawn signal thread").with_source(err)
            })?;
        Ok(SignalGuard {
            handle,
            thread: Some(thread),
        })
    }

    fn unregister(&mut self) -> Result<()> {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            thread
                .join()
                .map_err(|_| GildashError::watcher("signal thread panicked"))?;
        }
        Ok(())
    }
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        let _ = self.unregister();
    }
}
