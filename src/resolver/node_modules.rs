//! Package directory search.
//!
//! Order: the referencing module's package context, `<root>/node_modules`, the
//! pnpm store, `<root>/node_modules/@types`, the nearest workspace
//! `node_modules` above the referencing file, then the specifier with its last
//! segment dropped.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::workspace::pnpm;
use crate::BoxFuture;

use super::probe;

/// A package directory together with the package name that located it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDir {
    pub dir: PathBuf,
    /// Leading part of the specifier that names the package
    pub name: String,
}

impl PackageDir {
    fn new(dir: PathBuf, name: &str) -> Self {
        Self {
            dir,
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MemoKey {
    context: Option<PathBuf>,
    name: String,
    search_root: PathBuf,
}

/// A directory holding a `package.json`.
pub async fn is_package_dir(dir: &Path) -> bool {
    probe::is_dir(dir).await && probe::is_file(&dir.join("package.json")).await
}

/// `a/b/c` → `a/b`
fn parent_name(name: &str) -> Option<&str> {
    name.rsplit_once('/')
        .map(|(parent, _)| parent)
        .filter(|parent| !parent.is_empty())
}

/// Closest `node_modules` directory above `file`, strictly below `stop_at`.
async fn nearest_node_modules(file: &Path, stop_at: &Path) -> Option<PathBuf> {
    let mut dir = file.parent();
    while let Some(current) = dir {
        if current == stop_at || !current.starts_with(stop_at) {
            break;
        }
        let candidate = current.join("node_modules");
        if probe::is_dir(&candidate).await {
            return Some(candidate);
        }
        dir = current.parent();
    }
    None
}

/// Finds package directories, memoizing hits per (context, name, search root).
#[derive(Debug)]
pub struct PackageLocator {
    project_root: PathBuf,
    memo: Mutex<HashMap<MemoKey, PackageDir>>,
}

impl PackageLocator {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            memo: Mutex::new(HashMap::new()),
        }
    }

    pub async fn locate(
        &self,
        name: &str,
        context: Option<&Path>,
        referencing_file: &Path,
    ) -> Option<PackageDir> {
        let mut visited_workspaces = HashSet::new();
        self.search(
            name,
            context,
            &self.project_root,
            referencing_file,
            &mut visited_workspaces,
        )
        .await
    }

    pub fn clear(&self) {
        if let Ok(mut memo) = self.memo.lock() {
            memo.clear();
        }
    }

    pub fn memo_len(&self) -> usize {
        self.memo.lock().map(|m| m.len()).unwrap_or(0)
    }

    fn memo_get(&self, key: &MemoKey) -> Option<PackageDir> {
        self.memo.lock().ok()?.get(key).cloned()
    }

    fn memo_put(&self, key: MemoKey, found: PackageDir) {
        if let Ok(mut memo) = self.memo.lock() {
            memo.insert(key, found);
        }
    }

    fn search<'a>(
        &'a self,
        name: &'a str,
        context: Option<&'a Path>,
        search_root: &'a Path,
        referencing_file: &'a Path,
        visited_workspaces: &'a mut HashSet<PathBuf>,
    ) -> BoxFuture<'a, Option<PackageDir>> {
        Box::pin(async move {
            let key = MemoKey {
                context: context.map(Path::to_path_buf),
                name: name.to_string(),
                search_root: search_root.to_path_buf(),
            };

            if let Some(hit) = self.memo_get(&key) {
                if is_package_dir(&hit.dir).await {
                    return Some(hit);
                }
            }

            let found = self
                .search_uncached(name, context, search_root, referencing_file, visited_workspaces)
                .await;
            if let Some(found) = &found {
                tracing::trace!("package {} -> {}", name, found.dir.display());
                self.memo_put(key, found.clone());
            }
            found
        })
    }

    async fn search_uncached(
        &self,
        name: &str,
        context: Option<&Path>,
        search_root: &Path,
        referencing_file: &Path,
        visited_workspaces: &mut HashSet<PathBuf>,
    ) -> Option<PackageDir> {
        if let Some(context) = context {
            let candidate = context.join(name);
            if is_package_dir(&candidate).await {
                return Some(PackageDir::new(candidate, name));
            }
        }

        let candidate = search_root.join("node_modules").join(name);
        if is_package_dir(&candidate).await {
            return Some(PackageDir::new(candidate, name));
        }

        if let Some(candidate) = pnpm::find_in_store(&self.project_root, name).await {
            if is_package_dir(&candidate).await {
                return Some(PackageDir::new(candidate, name));
            }
        }

        let candidate = search_root.join("node_modules").join("@types").join(name);
        if is_package_dir(&candidate).await {
            return Some(PackageDir::new(candidate, name));
        }

        if let Some(node_modules) = nearest_node_modules(referencing_file, &self.project_root).await
        {
            if visited_workspaces.insert(node_modules.clone()) {
                if let Some(workspace) = node_modules.parent().map(Path::to_path_buf) {
                    tracing::trace!("retrying {} in workspace {}", name, workspace.display());
                    let found = self
                        .search(name, context, &workspace, referencing_file, visited_workspaces)
                        .await;
                    if found.is_some() {
                        return found;
                    }
                    if let Some(parent) = parent_name(name) {
                        let found = self
                            .search(parent, context, &workspace, referencing_file, visited_workspaces)
                            .await;
                        if found.is_some() {
                            return found;
                        }
                    }
                }
            }
        }

        let parent = parent_name(name)?;
        self.search(parent, context, search_root, referencing_file, visited_workspaces)
            .await
    }
}
