//! Memoized specifier resolutions.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::resolver::ResolvedLocation;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolutionKey {
    pub package_context: Option<PathBuf>,
    pub specifier: String,
    pub referencing_file: PathBuf,
}

impl ResolutionKey {
    pub fn new(specifier: &str, referencing_file: &Path, package_context: Option<&Path>) -> Self {
        Self {
            package_context: package_context.map(Path::to_path_buf),
            specifier: specifier.to_string(),
            referencing_file: referencing_file.to_path_buf(),
        }
    }
}

/// Successful resolutions only; a miss is always re-derived.
#[derive(Debug, Default)]
pub struct ResolutionCache {
    entries: Mutex<HashMap<ResolutionKey, ResolvedLocation>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ResolutionKey, ResolvedLocation>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Cached location, without checking that its file still exists.
    pub fn get(&self, key: &ResolutionKey) -> Option<ResolvedLocation> {
        let found = self.lock().get(key).cloned();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    pub fn insert(&self, key: ResolutionKey, location: ResolvedLocation) {
        self.lock().insert(key, location);
    }

    pub fn remove(&self, key: &ResolutionKey) {
        self.lock().remove(key);
    }

    pub fn invalidate_all(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}
