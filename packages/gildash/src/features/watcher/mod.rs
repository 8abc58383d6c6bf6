//! Filesystem watcher adapter
//!
//! Normalizes raw `notify` events into `{event_type, file_path}` pairs the
//! index coordinator understands. Filtering applies in order: paths outside
//! the project root are rejected, declaration files are rejected,
//! `package.json` and `tsconfig.json` pass regardless of the extension
//! filter, everything else must carry an accepted extension
//! (case-insensitive) and survive the ignore globs. Watcher failures are
//! logged and never tear the watcher down.

use globset::GlobSet;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

use crate::features::indexing::discovery::{build_ignore_set, to_relative};
use crate::shared::error::{GildashError, Result};

/// Normalized filesystem event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventType {
    Create,
    Change,
    Delete,
}

/// A normalized filesystem event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub event_type: WatchEventType,
    /// Project-relative, forward slashes
    pub file_path: String,
}

/// Config-file names accepted regardless of the extension filter.
const CONFIG_FILE_NAMES: &[&str] = &["package.json", "tsconfig.json", "jsconfig.json"];

/// Pure filtering core, separate from the notify plumbing so it can be
/// exercised without a real filesystem.
pub struct EventFilter {
    root: PathBuf,
    extensions: Vec<String>,
    ignore: GlobSet,
}

impl EventFilter {
    pub fn new(root: &Path, extensions: &[String], user_patterns: &[String]) -> Result<Self> {
        Ok(Self {
            root: root.to_path_buf(),
            extensions: extensions.to_vec(),
            ignore: build_ignore_set(user_patterns)?,
        })
    }

    /// Map an absolute path to a normalized project-relative path, or reject.
    pub fn normalize(&self, path: &Path) -> Option<String> {
        let relative = to_relative(&self.root, path)?;
        let lower = relative.to_ascii_lowercase();
        if lower.ends_with(".d.ts") {
            return None;
        }
        if self.ignore.is_match(&relative) {
            return None;
        }
        let file_name = relative.rsplit('/').next().unwrap_or(&relative);
        if CONFIG_FILE_NAMES.contains(&file_name) {
            return Some(relative);
        }
        if self
            .extensions
            .iter()
            .any(|ext| lower.ends_with(&ext.to_ascii_lowercase()))
        {
            return Some(relative);
        }
        None
    }

    /// Flatten one raw notify event into normalized events.
    pub fn normalize_event(&self, event: &Event) -> Vec<WatchEvent> {
        let event_type = match event.kind {
            EventKind::Create(_) => WatchEventType::Create,
            EventKind::Modify(_) => WatchEventType::Change,
            EventKind::Remove(_) => WatchEventType::Delete,
            _ => return Vec::new(),
        };
        event
            .paths
            .iter()
            .filter_map(|path| self.normalize(path))
            .map(|file_path| WatchEvent {
                event_type,
                file_path,
            })
            .collect()
    }
}

/// Running watcher over a project root.
///
/// Raw events flow through a channel into a dispatch thread that filters,
/// normalizes, and hands batches to the consumer callback.
pub struct WatcherAdapter {
    watcher: Option<RecommendedWatcher>,
    dispatch_thread: Option<thread::JoinHandle<()>>,
    shutdown_tx: Sender<()>,
}

impl WatcherAdapter {
    /// Subscribe to filesystem events under `root`.
    ///
    /// `consumer` receives each normalized batch; its panics and errors are
    /// contained and logged, never propagated into the watcher.
    pub fn subscribe(
        root: &Path,
        extensions: &[String],
        user_patterns: &[String],
        consumer: Arc<dyn Fn(Vec<WatchEvent>) + Send + Sync>,
    ) -> Result<Self> {
        let filter = EventFilter::new(root, extensions, user_patterns)?;
        let (event_tx, event_rx): (Sender<Event>, Receiver<Event>) = channel();
        let (shutdown_tx, shutdown_rx) = channel::<()>();

        let mut watcher = RecommendedWatcher::new(
            move |result: notify::Result<Event>| match result {
                Ok(event) => {
                    let _ = event_tx.send(event);
                }
                Err(err) => {
                    warn!(error = %GildashError::watcher(err.to_string()), "event delivery failed");
                }
            },
            notify::Config::default(),
        )
        .map_err(|err| {
            GildashError::watcher(format!("failed to create watcher: {err}")).with_source(err)
        })?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|err| {
                GildashError::watcher(format!("failed to watch {}: {err}", root.display()))
                    .with_source(err)
            })?;

        let dispatch_thread = thread::Builder::new()
            .name("gildash-watch".to_string())
            .spawn(move || loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }
                match event_rx.recv_timeout(std::time::Duration::from_millis(100)) {
                    Ok(event) => {
                        let batch = filter.normalize_event(&event);
                        if batch.is_empty() {
                            continue;
                        }
                        debug!(events = batch.len(), "dispatching watch batch");
                        let consumer = Arc::clone(&consumer);
                        if let Err(panic) =
                            std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
                                consumer(batch)
                            }))
                        {
                            warn!(?panic, "watch consumer panicked; watcher continues");
                        }
                    }
                    Err(std::sync::mpsc::RecvTimeoutError::Timeout) => continue,
                    Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
                }
            })
            .map_err(|err| GildashError::watcher("failed to spawn dispatch thread").with_source(err))?;

        Ok(Self {
            watcher: Some(watcher),
            dispatch_thread: Some(dispatch_thread),
            shutdown_tx,
        })
    }

    /// Stop watching and join the dispatch thread.
    pub fn unsubscribe(&mut self) -> Result<()> {
        if let Some(watcher) = self.watcher.take() {
            drop(watcher);
        }
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.dispatch_thread.take() {
            handle
                .join()
                .map_err(|_| GildashError::watcher("dispatch thread panicked"))?;
        }
        Ok(())
    }
}

impl Drop for WatcherAdapter {
    fn drop(&mut self) {
        let _ = self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> EventFilter {
        let extensions: Vec<String> = vec![".ts".into(), ".mts".into(), ".cts".into()];
        EventFilter::new(Path::new("/p"), &extensions, &["custom/**".to_string()]).unwrap()
    }

    #[test]
    fn paths_outside_root_are_rejected() {
        assert_eq!(filter().normalize(Path::new("/elsewhere/a.ts")), None);
    }

    #[test]
    fn declaration_files_are_rejected() {
        assert_eq!(filter().normalize(Path::new("/p/src/types.d.ts")), None);
    }

    #[test]
    fn config_files_pass_the_extension_filter() {
        let filter = filter();
        assert_eq!(
            filter.normalize(Path::new("/p/package.json")),
            Some("package.json".to_string())
        );
        assert_eq!(
            filter.normalize(Path::new("/p/tsconfig.json")),
            Some("tsconfig.json".to_string())
        );
        assert_eq!(filter.normalize(Path::new("/p/other.json")), None);
    }

    #[test]
    fn extension_filter_is_case_insensitive() {
        let filter = filter();
        assert_eq!(
            filter.normalize(Path::new("/p/src/A.TS")),
            Some("src/A.TS".to_string())
        );
        assert_eq!(filter.normalize(Path::new("/p/src/a.rs")), None);
    }

    #[test]
    fn ignore_floor_and_user_globs_apply() {
        let filter = filter();
        assert_eq!(filter.normalize(Path::new("/p/node_modules/x/a.ts")), None);
        assert_eq!(filter.normalize(Path::new("/p/.git/a.ts")), None);
        assert_eq!(filter.normalize(Path::new("/p/dist/a.ts")), None);
        assert_eq!(filter.normalize(Path::new("/p/.gildash/a.ts")), None);
        assert_eq!(filter.normalize(Path::new("/p/custom/a.ts")), None);
        assert_eq!(
            filter.normalize(Path::new("/p/src/ok.ts")),
            Some("src/ok.ts".to_string())
        );
    }

    #[test]
    fn raw_events_flatten_to_normalized_batches() {
        let filter = filter();
        let event = Event {
            kind: EventKind::Modify(notify::event::ModifyKind::Any),
            paths: vec![PathBuf::from("/p/src/a.ts"), PathBuf::from("/p/skip.rs")],
            attrs: Default::default(),
        };
        let batch = filter.normalize_event(&event);
        assert_eq!(
            batch,
            vec![WatchEvent {
                event_type: WatchEventType::Change,
                file_path: "src/a.ts".to_string(),
            }]
        );
    }
}
