//! `package.json` entry-point selection.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use crate::error::{LensError, Result};

use super::probe;

/// The manifest fields that decide a package's entry point.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageJson {
    pub name: Option<String>,
    pub types: Option<String>,
    pub typings: Option<String>,
    pub module: Option<String>,
    pub main: Option<String>,
    #[serde(default)]
    pub exports: Option<Value>,
}

impl PackageJson {
    pub fn parse(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| LensError::Parse(format!("Invalid package.json: {}", e)))
    }

    pub async fn load(package_dir: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(package_dir.join("package.json")).await?;
        Self::parse(&content)
    }

    /// `exports["./<subpath>"]` types condition.
    pub fn subpath_types(&self, subpath: &str) -> Option<&str> {
        let key = format!("./{}", subpath);
        let target = self.exports.as_ref()?.as_object()?.get(&key)?;
        types_condition(target)
    }

    pub fn has_subpath_export(&self, subpath: &str) -> bool {
        let key = format!("./{}", subpath);
        self.exports
            .as_ref()
            .and_then(|e| e.as_object())
            .map_or(false, |e| e.contains_key(&key))
    }

    /// Main entry: `types`, `typings`, `module`, `main`, `exports.types`,
    /// `exports.default`, then `exports["."]`.
    pub fn main_entry(&self) -> Option<&str> {
        let fields = [&self.types, &self.typings, &self.module, &self.main];
        if let Some(entry) = fields.into_iter().flatten().find(|s| !s.is_empty()) {
            return Some(entry.as_str());
        }

        let exports = self.exports.as_ref()?;
        if let Some(entry) = exports.as_str() {
            return Some(entry);
        }
        let exports = exports.as_object()?;
        ["types", "default"]
            .iter()
            .find_map(|field| exports.get(*field).and_then(|v| v.as_str()))
            .or_else(|| exports.get(".").and_then(root_export))
    }
}

/// A `types` string, directly or under `import`/`require` conditions.
fn types_condition(target: &Value) -> Option<&str> {
    let target = target.as_object()?;
    if let Some(types) = target.get("types").and_then(|v| v.as_str()) {
        return Some(types);
    }
    ["import", "require"].iter().find_map(|condition| {
        target
            .get(*condition)
            .and_then(|v| v.get("types"))
            .and_then(|v| v.as_str())
    })
}

fn root_export(target: &Value) -> Option<&str> {
    if let Some(entry) = target.as_str() {
        return Some(entry);
    }
    types_condition(target).or_else(|| {
        ["import", "default", "require"]
            .iter()
            .find_map(|condition| target.get(*condition).and_then(|v| v.as_str()))
    })
}

/// Selects the file a package specifier points at.
///
/// With a sub-path, `exports["./sub"]` decides (falling back to `dist/<sub>.d.ts`),
/// and a root-level `<sub>.d.ts` is used when the key is absent. Everything else
/// goes through [`PackageJson::main_entry`]. The chosen entry must exist.
pub async fn select_entry(
    manifest: &PackageJson,
    package_dir: &Path,
    subpath: Option<&str>,
    extensions: &[String],
) -> Option<PathBuf> {
    let mut entry: Option<PathBuf> = None;

    if let Some(subpath) = subpath {
        if manifest.has_subpath_export(subpath) {
            entry = match manifest.subpath_types(subpath) {
                Some(types) => Some(package_dir.join(types)),
                None => {
                    let dist = package_dir.join("dist").join(format!("{}.d.ts", subpath));
                    probe::is_file(&dist).await.then_some(dist)
                }
            };
        } else {
            let declaration = package_dir.join(format!("{}.d.ts", subpath));
            if probe::is_file(&declaration).await {
                return Some(probe::normalize_path(&declaration));
            }
        }
    }

    let entry = match entry {
        Some(entry) => entry,
        None => package_dir.join(manifest.main_entry()?),
    };

    probe::probe_module(&probe::normalize_path(&entry), extensions).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_EXTENSIONS;
    use std::fs;
    use tempfile::TempDir;

    fn default_exts() -> Vec<String> {
        DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_main_entry_priority() {
        let pkg = PackageJson::parse(
            r#"{ "name": "a", "main": "lib/index.js", "module": "es/index.js", "typings": "index.d.ts" }"#,
        )
        .unwrap();
        assert_eq!(pkg.main_entry(), Some("index.d.ts"));
    }

    #[test]
    fn test_main_entry_from_exports() {
        let pkg = PackageJson::parse(r#"{ "exports": { "default": "./index.mjs" } }"#).unwrap();
        assert_eq!(pkg.main_entry(), Some("./index.mjs"));

        let pkg = PackageJson::parse(
            r#"{ "exports": { ".": { "types": "./dist/index.d.ts", "import": "./dist/index.mjs" } } }"#,
        )
        .unwrap();
        assert_eq!(pkg.main_entry(), Some("./dist/index.d.ts"));
    }

    #[test]
    fn test_main_entry_missing() {
        let pkg = PackageJson::parse(r#"{ "name": "empty" }"#).unwrap();
        assert_eq!(pkg.main_entry(), None);
    }

    #[test]
    fn test_subpath_types_nested_conditions() {
        let pkg = PackageJson::parse(
            r#"{ "exports": { "./client": { "import": { "types": "./client.d.mts" } } } }"#,
        )
        .unwrap();
        assert_eq!(pkg.subpath_types("client"), Some("./client.d.mts"));
        assert_eq!(pkg.subpath_types("server"), None);
    }

    #[test]
    fn test_parse_invalid_manifest() {
        assert!(PackageJson::parse("{ broken").is_err());
    }

    #[tokio::test]
    async fn test_select_subpath_export_types() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        fs::write(dir.join("debounce.d.ts"), "").unwrap();
        let pkg = PackageJson::parse(
            r#"{ "main": "index.js", "exports": { "./debounce": { "types": "./debounce.d.ts" } } }"#,
        )
        .unwrap();

        let entry = select_entry(&pkg, dir, Some("debounce"), &default_exts()).await;
        assert_eq!(entry, Some(dir.join("debounce.d.ts")));
    }

    #[tokio::test]
    async fn test_select_subpath_dist_fallback() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        fs::create_dir_all(dir.join("dist")).unwrap();
        fs::write(dir.join("dist/server.d.ts"), "").unwrap();
        let pkg = PackageJson::parse(r#"{ "exports": { "./server": "./dist/server.js" } }"#).unwrap();

        let entry = select_entry(&pkg, dir, Some("server"), &default_exts()).await;
        assert_eq!(entry, Some(dir.join("dist/server.d.ts")));
    }

    #[tokio::test]
    async fn test_select_root_declaration_without_exports() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        fs::write(dir.join("fp.d.ts"), "").unwrap();
        let pkg = PackageJson::parse(r#"{ "main": "index.js" }"#).unwrap();

        let entry = select_entry(&pkg, dir, Some("fp"), &default_exts()).await;
        assert_eq!(entry, Some(dir.join("fp.d.ts")));
    }

    #[tokio::test]
    async fn test_select_main_probes_extensions() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        fs::create_dir_all(dir.join("lib")).unwrap();
        fs::write(dir.join("lib/index.js"), "").unwrap();
        let pkg = PackageJson::parse(r#"{ "main": "./lib" }"#).unwrap();

        let entry = select_entry(&pkg, dir, None, &default_exts()).await;
        assert_eq!(entry, Some(dir.join("lib/index.js")));
    }

    #[tokio::test]
    async fn test_select_missing_entry_file() {
        let temp_dir = TempDir::new().unwrap();
        let pkg = PackageJson::parse(r#"{ "main": "gone.js" }"#).unwrap();
        assert!(select_entry(&pkg, temp_dir.path(), None, &default_exts()).await.is_none());
    }
}
