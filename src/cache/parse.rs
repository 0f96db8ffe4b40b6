//! Parse results keyed by module path and extraction mode.
//!
//! An entry stays valid exactly as long as the file content equals the
//! content it was computed from. Each entry also lists the modules it was
//! linked against, so evicting a module evicts everything built on top of it.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use xxhash_rust::xxh3::xxh3_64;

use crate::model::{ExtractMode, ModuleParseResult};

type Key = (PathBuf, ExtractMode);

/// A linked module and every module path it was linked against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedModule {
    pub result: Arc<ModuleParseResult>,
    pub dependencies: Vec<PathBuf>,
}

impl CachedModule {
    pub fn new(result: ModuleParseResult, dependencies: Vec<PathBuf>) -> Self {
        Self {
            result: Arc::new(result),
            dependencies,
        }
    }
}

#[derive(Debug, Clone)]
struct ParseEntry {
    content: Arc<str>,
    digest: u64,
    module: CachedModule,
}

impl ParseEntry {
    fn matches(&self, content: &str, digest: u64) -> bool {
        self.content.len() == content.len() && self.digest == digest && &*self.content == content
    }
}

#[derive(Debug, Default)]
pub struct ParseCache {
    entries: Mutex<HashMap<Key, ParseEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
    parses: AtomicU64,
}

impl ParseCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Key, ParseEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Cached result for `path` if it was computed from exactly `content`.
    /// A stale entry is dropped.
    pub fn get(&self, path: &Path, mode: ExtractMode, content: &str) -> Option<CachedModule> {
        let digest = xxh3_64(content.as_bytes());
        let key = (path.to_path_buf(), mode);
        let mut entries = self.lock();

        match entries.get(&key) {
            Some(entry) if entry.matches(content, digest) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Parse cache hit: {}", path.display());
                Some(entry.module.clone())
            }
            Some(_) => {
                entries.remove(&key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Parse cache stale: {}", path.display());
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn insert(&self, path: &Path, mode: ExtractMode, content: &str, module: CachedModule) {
        let entry = ParseEntry {
            content: Arc::from(content),
            digest: xxh3_64(content.as_bytes()),
            module,
        };
        self.lock().insert((path.to_path_buf(), mode), entry);
    }

    pub fn record_parse(&self) {
        self.parses.fetch_add(1, Ordering::Relaxed);
    }

    /// Evicts `path` in every mode plus every cached module that depends on
    /// it, transitively. Returns the evicted module paths.
    pub fn invalidate(&self, path: &Path) -> Vec<PathBuf> {
        let mut entries = self.lock();
        let mut evicted: HashSet<PathBuf> = HashSet::new();
        let mut pending = vec![path.to_path_buf()];

        while let Some(current) = pending.pop() {
            if !evicted.insert(current.clone()) {
                continue;
            }
            entries.retain(|(entry_path, _), entry| {
                if *entry_path == current {
                    return false;
                }
                if entry.module.dependencies.iter().any(|d| *d == current) {
                    pending.push(entry_path.clone());
                    return false;
                }
                true
            });
        }

        let mut evicted: Vec<PathBuf> = evicted.into_iter().collect();
        evicted.sort();
        evicted
    }

    pub fn invalidate_all(&self) {
        self.lock().clear();
    }

    pub fn contains(&self, path: &Path, mode: ExtractMode) -> bool {
        self.lock().contains_key(&(path.to_path_buf(), mode))
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

    pub fn parses(&self) -> u64 {
        self.parses.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Declaration, ExportEntry};

    fn module_with(name: &str, dependencies: Vec<PathBuf>) -> CachedModule {
        CachedModule::new(
            ModuleParseResult {
                exports: vec![ExportEntry::new(name, Declaration::variable_source(name))],
                ..Default::default()
            },
            dependencies,
        )
    }

    #[test]
    fn test_hit_on_same_content() {
        let cache = ParseCache::new();
        let path = Path::new("/p/a.ts");
        cache.insert(path, ExtractMode::Full, "export const a = 1", module_with("a", vec![]));

        let hit = cache.get(path, ExtractMode::Full, "export const a = 1").unwrap();
        assert_eq!(hit.result.exports[0].name, "a");
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 0);
    }

    #[test]
    fn test_changed_content_is_stale() {
        let cache = ParseCache::new();
        let path = Path::new("/p/a.ts");
        cache.insert(path, ExtractMode::Full, "export const a = 1", module_with("a", vec![]));

        assert!(cache.get(path, ExtractMode::Full, "export const a = 2").is_none());
        assert!(!cache.contains(path, ExtractMode::Full));
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn test_modes_are_separate() {
        let cache = ParseCache::new();
        let path = Path::new("/p/a.ts");
        cache.insert(path, ExtractMode::ExportsOnly, "x", module_with("a", vec![]));

        assert!(cache.get(path, ExtractMode::Full, "x").is_none());
        assert!(cache.get(path, ExtractMode::ExportsOnly, "x").is_some());
    }

    #[test]
    fn test_invalidate_evicts_dependents_transitively() {
        let cache = ParseCache::new();
        let leaf = PathBuf::from("/p/leaf.ts");
        let mid = PathBuf::from("/p/mid.ts");
        let top = PathBuf::from("/p/top.ts");
        let other = PathBuf::from("/p/other.ts");

        cache.insert(&leaf, ExtractMode::Full, "l", module_with("l", vec![]));
        cache.insert(&mid, ExtractMode::ExportsOnly, "m", module_with("m", vec![leaf.clone()]));
        cache.insert(&top, ExtractMode::Full, "t", module_with("t", vec![mid.clone()]));
        cache.insert(&other, ExtractMode::Full, "o", module_with("o", vec![]));

        let evicted = cache.invalidate(&leaf);
        assert_eq!(evicted, vec![leaf.clone(), mid.clone(), top.clone()]);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&other, ExtractMode::Full));
    }

    #[test]
    fn test_invalidate_handles_dependency_cycles() {
        let cache = ParseCache::new();
        let a = PathBuf::from("/p/a.ts");
        let b = PathBuf::from("/p/b.ts");
        cache.insert(&a, ExtractMode::Full, "a", module_with("a", vec![b.clone()]));
        cache.insert(&b, ExtractMode::Full, "b", module_with("b", vec![a.clone()]));

        cache.invalidate(&a);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate_all() {
        let cache = ParseCache::new();
        cache.insert(Path::new("/p/a.ts"), ExtractMode::Full, "a", module_with("a", vec![]));
        cache.invalidate_all();
        assert!(cache.is_empty());
    }
}
