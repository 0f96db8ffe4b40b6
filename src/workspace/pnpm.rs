//! pnpm content-addressed store lookup.
//!
//! pnpm keeps packages under `node_modules/.pnpm/<name+with+plus>@<version>/node_modules/<name>`.
//! The version comes from the store's `lock.yaml`.

use std::path::{Path, PathBuf};

use regex::Regex;

use crate::error::Result;

/// `<project_root>/node_modules/.pnpm`
pub fn store_dir(project_root: &Path) -> PathBuf {
    project_root.join("node_modules").join(".pnpm")
}

/// Finds the locked version of `name` in lockfile content.
///
/// Matches lines such as `/lodash@4.17.21:` or `'@scope/pkg@1.0.0(react@18.2.0)':`.
/// Peer-dependency suffixes in parentheses are dropped.
pub fn locked_version(lock_content: &str, name: &str) -> Option<String> {
    let pattern = format!(r#"(?m)^\s*['"]?/?{}@([^:\s'"]+)['"]?:"#, regex::escape(name));
    let re = Regex::new(&pattern).ok()?;
    let captured = re.captures(lock_content)?.get(1)?.as_str();

    let version = captured.split('(').next().unwrap_or(captured);
    if version.is_empty() {
        None
    } else {
        Some(version.to_string())
    }
}

/// Glob pattern matching the store directories of `name@version`.
pub fn store_pattern(store: &Path, name: &str, version: &str) -> String {
    let prefix = format!("{}@{}", name.replace('/', "+"), version);
    let store = glob::Pattern::escape(&store.to_string_lossy());
    format!(
        "{}/{}*/node_modules/{}",
        store,
        glob::Pattern::escape(&prefix),
        glob::Pattern::escape(name)
    )
}

fn first_dir_match(pattern: &str) -> Result<Option<PathBuf>> {
    let options = glob::MatchOptions {
        require_literal_leading_dot: false,
        ..Default::default()
    };
    let mut matches: Vec<PathBuf> = glob::glob_with(pattern, options)?
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_dir())
        .collect();
    matches.sort();
    Ok(matches.into_iter().next())
}

/// Locates `name` in the pnpm store of `project_root`.
pub async fn find_in_store(project_root: &Path, name: &str) -> Option<PathBuf> {
    let store = store_dir(project_root);
    let lock = store.join("lock.yaml");

    let content = tokio::fs::read_to_string(&lock).await.ok()?;
    let version = locked_version(&content, name)?;
    let pattern = store_pattern(&store, name, &version);
    tracing::trace!("pnpm store glob {}", pattern);

    match scan_store(pattern).await {
        Ok(dir) => dir,
        Err(e) => {
            tracing::debug!("pnpm store lookup for {} failed: {}", name, e);
            None
        }
    }
}

async fn scan_store(pattern: String) -> Result<Option<PathBuf>> {
    tokio::task::spawn_blocking(move || first_dir_match(&pattern)).await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const LOCK: &str = r#"
lockfileVersion: '6.0'

packages:

  /lodash@4.17.21:
    resolution: {integrity: sha512-abc}
    dev: false

  '@vue/shared@3.4.21(typescript@5.3.3)':
    resolution: {integrity: sha512-def}
"#;

    #[test]
    fn test_locked_version_plain() {
        assert_eq!(locked_version(LOCK, "lodash"), Some("4.17.21".into()));
    }

    #[test]
    fn test_locked_version_scoped_with_peer_suffix() {
        assert_eq!(locked_version(LOCK, "@vue/shared"), Some("3.4.21".into()));
    }

    #[test]
    fn test_locked_version_missing() {
        assert_eq!(locked_version(LOCK, "react"), None);
        // no partial-name matches
        assert_eq!(locked_version(LOCK, "dash"), None);
    }

    #[test]
    fn test_store_pattern_replaces_scope_slash() {
        let pattern = store_pattern(Path::new("/p/node_modules/.pnpm"), "@vue/shared", "3.4.21");
        assert_eq!(
            pattern,
            "/p/node_modules/.pnpm/@vue+shared@3.4.21*/node_modules/@vue/shared"
        );
    }

    #[tokio::test]
    async fn test_find_in_store() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_dir(temp_dir.path());
        let pkg = store.join("lodash@4.17.21/node_modules/lodash");
        fs::create_dir_all(&pkg).unwrap();
        fs::write(store.join("lock.yaml"), LOCK).unwrap();

        let found = find_in_store(temp_dir.path(), "lodash").await;
        assert_eq!(found, Some(pkg));
    }

    #[tokio::test]
    async fn test_find_in_store_without_lockfile() {
        let temp_dir = TempDir::new().unwrap();
        assert_eq!(find_in_store(temp_dir.path(), "lodash").await, None);
    }
}
