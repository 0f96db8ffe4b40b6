//! Soft filesystem probing.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

pub async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

pub async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

/// `path` with `suffix` appended to its final component (`./x` + `.ts` → `./x.ts`).
pub fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw: OsString = path.as_os_str().to_owned();
    raw.push(suffix);
    PathBuf::from(raw)
}

/// Lexically normalizes `.` and `..` components without touching the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => normalized.push(".."),
            },
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Probes `path` as a module: the exact file, then each extension appended,
/// then `index.<ext>` inside it as a directory.
pub async fn probe_module(path: &Path, extensions: &[String]) -> Option<PathBuf> {
    if is_file(path).await {
        return Some(path.to_path_buf());
    }

    for ext in extensions {
        let candidate = append_suffix(path, ext);
        tracing::trace!("probe {}", candidate.display());
        if is_file(&candidate).await {
            return Some(candidate);
        }
    }

    for ext in extensions {
        let candidate = path.join(format!("index{}", ext));
        tracing::trace!("probe {}", candidate.display());
        if is_file(&candidate).await {
            return Some(candidate);
        }
    }

    None
}
