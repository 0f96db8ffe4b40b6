//! Specifier → file resolution.
//!
//! Relative specifiers (including path aliases) are joined and probed with the
//! configured extensions. Package specifiers go through [`PackageLocator`] and
//! the package's `package.json`.

pub mod node_modules;
pub mod package;
pub mod probe;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::workspace::AliasMap;

pub use node_modules::{PackageDir, PackageLocator};
pub use package::PackageJson;
pub use probe::normalize_path;

/// How a specifier is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecifierKind {
    /// `./x`, `../x`, `/abs`, `@/x` or an alias key
    Relative,
    /// Bare package name, optionally scoped and with a sub-path
    Package,
}

impl SpecifierKind {
    pub fn classify(specifier: &str, aliases: &AliasMap) -> Self {
        if specifier.starts_with('.')
            || specifier.starts_with('/')
            || specifier.starts_with("@/")
            || aliases.matches(specifier)
        {
            SpecifierKind::Relative
        } else {
            SpecifierKind::Package
        }
    }
}

/// A resolved module file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolvedLocation {
    pub absolute_path: PathBuf,
    /// `node_modules` of the package the file belongs to; bare imports inside
    /// the file are searched there first
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_node_modules: Option<PathBuf>,
}

impl ResolvedLocation {
    pub fn new(absolute_path: PathBuf, package_node_modules: Option<PathBuf>) -> Self {
        Self {
            absolute_path,
            package_node_modules,
        }
    }
}

/// Stateless resolution rules plus the package directory memo.
#[derive(Debug)]
pub struct PathResolver {
    config: EngineConfig,
    packages: PackageLocator,
}

impl PathResolver {
    pub fn new(config: EngineConfig) -> Self {
        let packages = PackageLocator::new(config.project_root.clone());
        Self { config, packages }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Drops memoized package directories.
    pub fn clear(&self) {
        self.packages.clear();
    }

    pub async fn resolve(
        &self,
        aliases: &AliasMap,
        specifier: &str,
        referencing_file: &Path,
        package_context: Option<&Path>,
    ) -> Option<ResolvedLocation> {
        if specifier.is_empty() {
            return None;
        }

        match SpecifierKind::classify(specifier, aliases) {
            SpecifierKind::Relative => {
                let absolute_path = self.resolve_relative(aliases, specifier, referencing_file).await?;
                Some(ResolvedLocation::new(
                    absolute_path,
                    package_context.map(Path::to_path_buf),
                ))
            }
            SpecifierKind::Package => {
                self.resolve_package(specifier, referencing_file, package_context)
                    .await
            }
        }
    }

    async fn resolve_relative(
        &self,
        aliases: &AliasMap,
        specifier: &str,
        referencing_file: &Path,
    ) -> Option<PathBuf> {
        let (rewritten, aliased) = match aliases.substitute(specifier) {
            Some(rewritten) => (rewritten, true),
            None => (specifier.to_string(), false),
        };

        let rewritten = Path::new(&rewritten);
        let joined = if rewritten.is_absolute() {
            rewritten.to_path_buf()
        } else if aliased {
            aliases.base_dir().join(rewritten)
        } else {
            referencing_file.parent()?.join(rewritten)
        };

        probe::probe_module(&normalize_path(&joined), &self.config.extensions).await
    }

    async fn resolve_package(
        &self,
        specifier: &str,
        referencing_file: &Path,
        package_context: Option<&Path>,
    ) -> Option<ResolvedLocation> {
        let package = self
            .packages
            .locate(specifier, package_context, referencing_file)
            .await?;

        let manifest = match PackageJson::load(&package.dir).await {
            Ok(manifest) => manifest,
            Err(e) => {
                tracing::debug!("Unusable manifest in {}: {}", package.dir.display(), e);
                return None;
            }
        };

        let subpath = specifier
            .strip_prefix(package.name.as_str())
            .map(|rest| rest.trim_start_matches('/'))
            .filter(|rest| !rest.is_empty());

        let entry =
            package::select_entry(&manifest, &package.dir, subpath, &self.config.extensions)
                .await?;

        Some(ResolvedLocation::new(
            entry,
            Some(package.dir.join("node_modules")),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn resolver(root: &Path) -> PathResolver {
        PathResolver::new(EngineConfig::new(root))
    }

    #[test]
    fn test_classify() {
        let aliases = AliasMap::new("/p").with_alias("~", "src");
        assert_eq!(SpecifierKind::classify("./a", &aliases), SpecifierKind::Relative);
        assert_eq!(SpecifierKind::classify("../a", &aliases), SpecifierKind::Relative);
        assert_eq!(SpecifierKind::classify("/abs/a", &aliases), SpecifierKind::Relative);
        assert_eq!(SpecifierKind::classify("@/a", &aliases), SpecifierKind::Relative);
        assert_eq!(SpecifierKind::classify("~/a", &aliases), SpecifierKind::Relative);
        assert_eq!(SpecifierKind::classify("~", &aliases), SpecifierKind::Relative);
        assert_eq!(SpecifierKind::classify("@vue/shared", &aliases), SpecifierKind::Package);
        assert_eq!(SpecifierKind::classify("lodash/fp", &aliases), SpecifierKind::Package);
    }

    #[tokio::test]
    async fn test_resolve_relative_with_extension() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join("src/x.ts"), "export const x = 1").unwrap();

        let location = resolver(root)
            .resolve(&AliasMap::new(root), "./x", &root.join("src/main.ts"), None)
            .await
            .unwrap();
        assert_eq!(location.absolute_path, root.join("src/x.ts"));
        assert_eq!(location.package_node_modules, None);
    }

    #[tokio::test]
    async fn test_resolve_parent_directory() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("src/deep")).unwrap();
        fs::write(root.join("src/util.js"), "").unwrap();

        let location = resolver(root)
            .resolve(&AliasMap::new(root), "../util", &root.join("src/deep/a.ts"), None)
            .await
            .unwrap();
        assert_eq!(location.absolute_path, root.join("src/util.js"));
    }

    #[tokio::test]
    async fn test_resolve_alias_against_base_dir() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("src/components")).unwrap();
        fs::write(root.join("src/components/Button.tsx"), "").unwrap();

        let aliases = AliasMap::new(root).with_alias("@", "src");
        let location = resolver(root)
            .resolve(&aliases, "@/components/Button", &root.join("pages/index.ts"), None)
            .await
            .unwrap();
        assert_eq!(location.absolute_path, root.join("src/components/Button.tsx"));
    }

    #[tokio::test]
    async fn test_resolve_keeps_package_context() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("b.d.ts"), "").unwrap();

        let context = root.join("node_modules");
        let location = resolver(root)
            .resolve(&AliasMap::new(root), "./b.d.ts", &root.join("a.d.ts"), Some(&context))
            .await
            .unwrap();
        assert_eq!(location.package_node_modules, Some(context));
    }

    #[tokio::test]
    async fn test_resolve_package_sets_node_modules_context() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let pkg = root.join("node_modules/@scope/ui");
        fs::create_dir_all(pkg.join("dist")).unwrap();
        fs::write(pkg.join("package.json"), r#"{ "types": "dist/index.d.ts" }"#).unwrap();
        fs::write(pkg.join("dist/index.d.ts"), "").unwrap();

        let location = resolver(root)
            .resolve(&AliasMap::new(root), "@scope/ui", &root.join("a.ts"), None)
            .await
            .unwrap();
        assert_eq!(location.absolute_path, pkg.join("dist/index.d.ts"));
        assert_eq!(location.package_node_modules, Some(pkg.join("node_modules")));
    }

    #[tokio::test]
    async fn test_resolve_missing() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let r = resolver(root);
        let aliases = AliasMap::new(root);
        assert!(r.resolve(&aliases, "./nope", &root.join("a.ts"), None).await.is_none());
        assert!(r.resolve(&aliases, "nope", &root.join("a.ts"), None).await.is_none());
        assert!(r.resolve(&aliases, "", &root.join("a.ts"), None).await.is_none());
    }
}
