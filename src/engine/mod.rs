//! The module engine: resolution, extraction, linking and caching behind one
//! `Send + Sync` handle.
//!
//! Every public lookup returns `Option`. Failures below this layer are logged
//! at debug level and surface as absent results.

pub mod link;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::cache::{CacheStats, CachedModule, ParseCache, ResolutionCache, ResolutionKey};
use crate::config::EngineConfig;
use crate::extract::ModuleExtractor;
use crate::languages::LanguageRegistry;
use crate::model::{ExtractMode, ModuleParseResult};
use crate::resolver::{probe, PathResolver, ResolvedLocation};
use crate::watcher::FileEvent;
use crate::workspace::{load_aliases, tsconfig, AliasMap};
use crate::BoxFuture;

pub use link::Trail;

pub struct ModuleEngine {
    config: EngineConfig,
    resolver: PathResolver,
    extractor: ModuleExtractor,
    aliases: Mutex<Option<Arc<AliasMap>>>,
    parse_cache: ParseCache,
    resolution_cache: ResolutionCache,
}

impl ModuleEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_registry(config, LanguageRegistry::new())
    }

    pub fn with_registry(config: EngineConfig, registry: LanguageRegistry) -> Self {
        Self {
            resolver: PathResolver::new(config.clone()),
            extractor: ModuleExtractor::new(registry),
            aliases: Mutex::new(None),
            parse_cache: ParseCache::new(),
            resolution_cache: ResolutionCache::new(),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn extractor(&self) -> &ModuleExtractor {
        &self.extractor
    }

    fn alias_slot(&self) -> MutexGuard<'_, Option<Arc<AliasMap>>> {
        self.aliases.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Alias table of the project, loaded on first use.
    pub async fn aliases(&self) -> Arc<AliasMap> {
        let cached = self.alias_slot().clone();
        if let Some(aliases) = cached {
            return aliases;
        }

        let loaded = Arc::new(load_aliases(self.config.project_root()).await);
        tracing::debug!("Loaded {} path aliases", loaded.len());

        let mut slot = self.alias_slot();
        Arc::clone(slot.get_or_insert(loaded))
    }

    /// Drops the alias table and every resolution that may have used it.
    pub fn reload_aliases(&self) {
        *self.alias_slot() = None;
        self.resolution_cache.invalidate_all();
        self.parse_cache.invalidate_all();
        tracing::info!("Path aliases reset");
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    pub async fn resolve(&self, specifier: &str, referencing_file: &Path) -> Option<ResolvedLocation> {
        self.resolve_in(specifier, referencing_file, None).await
    }

    /// Resolves `specifier` as seen from `referencing_file`, preferring
    /// packages under `package_context` when set.
    pub async fn resolve_in(
        &self,
        specifier: &str,
        referencing_file: &Path,
        package_context: Option<&Path>,
    ) -> Option<ResolvedLocation> {
        let key = ResolutionKey::new(specifier, referencing_file, package_context);

        if let Some(cached) = self.resolution_cache.get(&key) {
            if probe::is_file(&cached.absolute_path).await {
                return Some(cached);
            }
            tracing::debug!("Cached resolution vanished: {}", cached.absolute_path.display());
            self.resolution_cache.remove(&key);
        }

        let aliases = self.aliases().await;
        let location = self
            .resolver
            .resolve(&aliases, specifier, referencing_file, package_context)
            .await;

        match &location {
            Some(found) => {
                tracing::debug!("Resolved {} -> {}", specifier, found.absolute_path.display());
                self.resolution_cache.insert(key, found.clone());
            }
            None => tracing::debug!(
                "Unresolved {} from {}",
                specifier,
                referencing_file.display()
            ),
        }
        location
    }

    // ========================================================================
    // Extraction
    // ========================================================================

    /// Fully linked export table of the module at `path`.
    pub async fn parse_module(&self, path: &Path) -> Option<Arc<ModuleParseResult>> {
        self.parse_module_with(path, ExtractMode::Full).await
    }

    pub async fn parse_module_with(
        &self,
        path: &Path,
        mode: ExtractMode,
    ) -> Option<Arc<ModuleParseResult>> {
        let location = ResolvedLocation::new(path.to_path_buf(), None);
        let mut trail = Trail::new();
        self.load(&location, mode, &mut trail)
            .await
            .map(|module| module.result)
    }

    /// Resolves `specifier` from `referencing_file` and extracts the target.
    pub async fn resolve_and_extract(
        &self,
        specifier: &str,
        referencing_file: &Path,
    ) -> Option<Arc<ModuleParseResult>> {
        let location = self.resolve(specifier, referencing_file).await?;
        let mut trail = Trail::new();
        self.load(&location, ExtractMode::Full, &mut trail)
            .await
            .map(|module| module.result)
    }

    /// Reads, extracts and links one module, consulting the parse cache.
    pub(crate) fn load<'a>(
        &'a self,
        location: &'a ResolvedLocation,
        mode: ExtractMode,
        trail: &'a mut Trail,
    ) -> BoxFuture<'a, Option<CachedModule>> {
        Box::pin(async move {
            let path = location.absolute_path.as_path();
            let content = match tokio::fs::read_to_string(path).await {
                Ok(content) => content,
                Err(e) => {
                    tracing::debug!("Failed to read {}: {}", path.display(), e);
                    return None;
                }
            };

            if let Some(hit) = self.parse_cache.get(path, mode, &content) {
                return Some(hit);
            }

            let frame = trail.enter(path)?;
            let module = self.extract_and_link(location, &content, mode, trail).await;
            let complete = trail.leave(frame);

            let module = module?;
            if complete {
                self.parse_cache.insert(path, mode, &content, module.clone());
            } else {
                tracing::debug!("Not caching {}: linked across a cycle", path.display());
            }
            Some(module)
        })
    }

    async fn extract_and_link(
        &self,
        location: &ResolvedLocation,
        content: &str,
        mode: ExtractMode,
        trail: &mut Trail,
    ) -> Option<CachedModule> {
        let path = location.absolute_path.as_path();
        let extracted = match self.extractor.extract(path, content, mode) {
            Ok(extracted) => extracted,
            Err(e) => {
                tracing::debug!("Failed to extract {}: {}", path.display(), e);
                return None;
            }
        };
        self.parse_cache.record_parse();

        if extracted.needs_linking() {
            Some(link::link(self, extracted, location, trail).await)
        } else {
            Some(CachedModule::new(extracted.into_unlinked(), Vec::new()))
        }
    }

    // ========================================================================
    // Invalidation
    // ========================================================================

    /// Evicts `path` and every module linked against it. Project config files
    /// also reset the alias table, manifests drop memoized resolutions.
    pub fn invalidate(&self, path: &Path) -> Vec<PathBuf> {
        let evicted = self.parse_cache.invalidate(path);
        tracing::debug!("Invalidated {} modules for {}", evicted.len(), path.display());

        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if tsconfig::CONFIG_FILES.contains(&file_name)
            && path.parent() == Some(self.config.project_root())
        {
            self.reload_aliases();
        } else if file_name == "package.json" || file_name == "lock.yaml" {
            self.resolution_cache.invalidate_all();
            self.resolver.clear();
        }
        evicted
    }

    pub fn invalidate_all(&self) {
        self.parse_cache.invalidate_all();
        self.resolution_cache.invalidate_all();
        self.resolver.clear();
    }

    /// Applies a batch of watcher events.
    pub fn apply_file_events(&self, events: &[FileEvent]) {
        for event in events {
            self.invalidate(event.path());
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats::collect(&self.parse_cache, &self.resolution_cache)
    }
}

impl Default for ModuleEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn engine(root: &Path) -> ModuleEngine {
        ModuleEngine::new(EngineConfig::new(root))
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_engine_is_send_sync() {
        assert_send_sync::<ModuleEngine>();
    }

    #[tokio::test]
    async fn test_parse_module_caches() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("a.ts");
        fs::write(&file, "export const a = 1").unwrap();

        let engine = engine(temp_dir.path());
        let first = engine.parse_module(&file).await.unwrap();
        let second = engine.parse_module(&file).await.unwrap();

        assert_eq!(first, second);
        let stats = engine.stats();
        assert_eq!(stats.parses, 1);
        assert_eq!(stats.parse_hits, 1);
    }

    #[tokio::test]
    async fn test_parse_module_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(temp_dir.path());
        assert!(engine
            .parse_module(&temp_dir.path().join("nope.ts"))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_resolution_revalidated_after_delete() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("main.ts"), "").unwrap();
        fs::write(root.join("x.ts"), "").unwrap();

        let engine = engine(root);
        let main = root.join("main.ts");
        assert!(engine.resolve("./x", &main).await.is_some());

        fs::remove_file(root.join("x.ts")).unwrap();
        assert!(engine.resolve("./x", &main).await.is_none());
        assert_eq!(engine.stats().cached_resolutions, 0);
    }

    #[tokio::test]
    async fn test_tsconfig_invalidation_reloads_aliases() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::create_dir_all(root.join("lib")).unwrap();
        fs::write(root.join("src/util.ts"), "export const fromSrc = 1").unwrap();
        fs::write(root.join("lib/util.ts"), "export const fromLib = 1").unwrap();
        fs::write(root.join("main.ts"), "").unwrap();
        fs::write(
            root.join("tsconfig.json"),
            r#"{ "compilerOptions": { "paths": { "~/*": ["src/*"] } } }"#,
        )
        .unwrap();

        let engine = engine(root);
        let main = root.join("main.ts");
        let before = engine.resolve_and_extract("~/util", &main).await.unwrap();
        assert!(before.find_export("fromSrc").is_some());

        fs::write(
            root.join("tsconfig.json"),
            r#"{ "compilerOptions": { "paths": { "~/*": ["lib/*"] } } }"#,
        )
        .unwrap();
        engine.invalidate(&root.join("tsconfig.json"));

        let after = engine.resolve_and_extract("~/util", &main).await.unwrap();
        assert!(after.find_export("fromLib").is_some());
    }

    #[tokio::test]
    async fn test_concurrent_cold_parses_agree() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_path_buf();
        fs::write(root.join("lib.ts"), "export function run(a: number): void {}").unwrap();
        fs::write(root.join("main.ts"), "export * from './lib'").unwrap();

        let engine = Arc::new(engine(&root));
        let main = root.join("main.ts");

        let first = {
            let engine = Arc::clone(&engine);
            let main = main.clone();
            tokio::spawn(async move { engine.parse_module(&main).await })
        };
        let second = {
            let engine = Arc::clone(&engine);
            let main = main.clone();
            tokio::spawn(async move { engine.parse_module(&main).await })
        };

        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.export_names(), vec!["run"]);

        // main and lib, each parsed once or twice depending on interleaving
        let parses = engine.stats().parses;
        assert!((2..=4).contains(&parses));
    }
}
