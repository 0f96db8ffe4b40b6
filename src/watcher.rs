//! Debounced filesystem events for keeping an engine's caches fresh.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};
use std::time::Duration;

use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebouncedEvent, Debouncer};

use crate::error::{LensError, Result};

const DEBOUNCE: Duration = Duration::from_millis(500);

/// Files outside the module extensions that still affect resolution.
const CONFIG_NAMES: &[&str] = &["tsconfig.json", "jsconfig.json", "package.json", "lock.yaml"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    Modified(PathBuf),
    Deleted(PathBuf),
}

impl FileEvent {
    pub fn path(&self) -> &Path {
        match self {
            FileEvent::Modified(path) | FileEvent::Deleted(path) => path,
        }
    }
}

/// Whether a change to `path` can affect resolution or extraction.
pub fn is_relevant(path: &Path, extensions: &[String]) -> bool {
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    if CONFIG_NAMES.contains(&file_name) {
        return true;
    }
    match path.extension().and_then(|e| e.to_str()) {
        Some("json" | "vue" | "mts" | "cts" | "mjs" | "cjs") => true,
        Some(ext) => extensions.iter().any(|known| known.trim_start_matches('.') == ext),
        None => false,
    }
}

pub struct FileWatcher {
    _debouncer: Debouncer<notify::RecommendedWatcher>,
    receiver: Receiver<std::result::Result<Vec<DebouncedEvent>, notify::Error>>,
    extensions: Vec<String>,
}

impl FileWatcher {
    pub fn new(path: &Path, extensions: &[String]) -> Result<Self> {
        let (tx, rx) = channel();

        let mut debouncer =
            new_debouncer(DEBOUNCE, tx).map_err(|e| LensError::Watcher(e.to_string()))?;

        debouncer
            .watcher()
            .watch(path, RecursiveMode::Recursive)
            .map_err(|e| LensError::Watcher(e.to_string()))?;

        Ok(Self {
            _debouncer: debouncer,
            receiver: rx,
            extensions: extensions.to_vec(),
        })
    }

    /// Blocks until the next batch. `None` when the batch had nothing
    /// relevant or the watcher failed.
    pub fn recv(&self) -> Option<Vec<FileEvent>> {
        match self.receiver.recv() {
            Ok(Ok(events)) => self.classify(events),
            Ok(Err(e)) => {
                tracing::warn!("Watch error: {}", e);
                None
            }
            Err(_) => None,
        }
    }

    pub fn try_recv(&self) -> Option<Vec<FileEvent>> {
        match self.receiver.try_recv() {
            Ok(Ok(events)) => self.classify(events),
            _ => None,
        }
    }

    fn classify(&self, events: Vec<DebouncedEvent>) -> Option<Vec<FileEvent>> {
        let file_events: Vec<FileEvent> = events
            .into_iter()
            .map(|e| e.path)
            .filter(|path| is_relevant(path, &self.extensions))
            .filter_map(|path| {
                if path.is_file() {
                    Some(FileEvent::Modified(path))
                } else if !path.exists() {
                    Some(FileEvent::Deleted(path))
                } else {
                    None
                }
            })
            .collect();

        if file_events.is_empty() {
            None
        } else {
            Some(file_events)
        }
    }
}
