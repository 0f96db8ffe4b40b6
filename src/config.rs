//! Engine configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Suffixes probed when a specifier names a file without its extension.
pub const DEFAULT_EXTENSIONS: &[&str] = &[".ts", ".js", ".tsx", ".jsx"];

/// Settings shared by the resolver and the extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Project root: where tsconfig/jsconfig, `node_modules` and the pnpm store live
    pub project_root: PathBuf,
    /// Extension suffixes probed for extension-less paths, in priority order
    pub extensions: Vec<String>,
}

impl EngineConfig {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let extensions: Vec<String> = extensions
            .into_iter()
            .map(Into::into)
            .map(|ext| {
                if ext.starts_with('.') {
                    ext
                } else {
                    format!(".{}", ext)
                }
            })
            .collect();
        if !extensions.is_empty() {
            self.extensions = extensions;
        }
        self
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        let root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::new(root)
    }
}
