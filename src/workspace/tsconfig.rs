//! Path aliases from `tsconfig.json` / `jsconfig.json`.

use std::path::{Path, PathBuf};

use crate::error::Result;

/// Config files consulted for `compilerOptions.paths`, in priority order.
pub const CONFIG_FILES: &[&str] = &["tsconfig.json", "jsconfig.json"];

/// Ordered alias pattern → target prefix mapping, wildcards stripped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasMap {
    entries: Vec<(String, String)>,
    base_dir: PathBuf,
}

impl AliasMap {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            entries: Vec::new(),
            base_dir: base_dir.into(),
        }
    }

    pub fn with_alias(mut self, key: impl Into<String>, target: impl Into<String>) -> Self {
        self.insert(key.into(), target.into());
        self
    }

    fn insert(&mut self, key: String, target: String) {
        if let Some(existing) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            existing.1 = target;
        } else {
            self.entries.push((key, target));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Directory alias targets are resolved against (`baseUrl`, else the project root).
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Whether some alias key prefixes `specifier` on a path-segment boundary.
    pub fn matches(&self, specifier: &str) -> bool {
        self.entries.iter().any(|(key, _)| key_prefixes(key, specifier))
    }

    /// Applies every alias whose key prefixes the specifier, in declaration order.
    /// Returns `None` when no alias fired.
    pub fn substitute(&self, specifier: &str) -> Option<String> {
        let mut current = specifier.to_string();
        let mut fired = false;

        for (key, target) in &self.entries {
            if !key_prefixes(key, &current) {
                continue;
            }
            let rest = current[key.len()..].trim_start_matches('/');
            current = if target.is_empty() {
                rest.to_string()
            } else if rest.is_empty() {
                target.clone()
            } else {
                format!("{}/{}", target.trim_end_matches('/'), rest)
            };
            fired = true;
        }

        fired.then_some(current)
    }
}

fn key_prefixes(key: &str, specifier: &str) -> bool {
    if key.is_empty() || !specifier.starts_with(key) {
        return false;
    }
    key.ends_with('/')
        || specifier.len() == key.len()
        || specifier[key.len()..].starts_with('/')
}

/// Removes `/**` and `/*` wildcard suffixes from a paths key or target.
pub fn strip_wildcards(pattern: &str) -> String {
    let stripped = pattern.replace("/**", "").replace("/*", "");
    if stripped == "*" {
        String::new()
    } else {
        stripped
    }
}

/// Loads the alias table of a project. Any failure yields an empty map.
pub async fn load_aliases(project_root: &Path) -> AliasMap {
    for name in CONFIG_FILES {
        let path = project_root.join(name);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            continue;
        }

        return match tokio::fs::read_to_string(&path).await {
            Ok(content) => match parse_aliases(&content, project_root) {
                Ok(map) => {
                    tracing::debug!("Loaded {} path aliases from {}", map.len(), path.display());
                    map
                }
                Err(e) => {
                    tracing::debug!("Ignoring unparsable {}: {}", path.display(), e);
                    AliasMap::new(project_root)
                }
            },
            Err(e) => {
                tracing::debug!("Cannot read {}: {}", path.display(), e);
                AliasMap::new(project_root)
            }
        };
    }

    AliasMap::new(project_root)
}

/// Parses `compilerOptions.paths` (and `baseUrl`) from config file content.
pub fn parse_aliases(content: &str, project_root: &Path) -> Result<AliasMap> {
    let json: serde_json::Value = serde_json::from_str(&strip_jsonc(content))?;
    let options = json.get("compilerOptions");

    let base_dir = options
        .and_then(|o| o.get("baseUrl"))
        .and_then(|v| v.as_str())
        .map(|base| project_root.join(base))
        .unwrap_or_else(|| project_root.to_path_buf());

    let mut map = AliasMap::new(base_dir);

    let Some(paths) = options
        .and_then(|o| o.get("paths"))
        .and_then(|v| v.as_object())
    else {
        return Ok(map);
    };

    for (key, value) in paths {
        let target = match value {
            serde_json::Value::Array(candidates) => candidates.first().and_then(|v| v.as_str()),
            serde_json::Value::String(s) => Some(s.as_str()),
            _ => None,
        };
        let Some(target) = target else {
            continue;
        };

        let key = strip_wildcards(key);
        if key.is_empty() {
            continue;
        }
        map.insert(key, strip_wildcards(target));
    }

    Ok(map)
}

/// Drops comments and trailing commas so tsconfig content parses as plain JSON.
fn strip_jsonc(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;
    let mut escape = false;

    while let Some(ch) = chars.next() {
        if in_string {
            out.push(ch);
            if escape {
                escape = false;
            } else if ch == '\\' {
                escape = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => {
                in_string = true;
                out.push(ch);
            }
            '/' if chars.peek() == Some(&'/') => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
            }
            ',' => {
                let rest: String = chars.clone().take_while(|c| c.is_whitespace()).collect();
                let next = chars.clone().nth(rest.chars().count());
                if !matches!(next, Some('}') | Some(']')) {
                    out.push(ch);
                }
            }
            _ => out.push(ch),
        }
    }

    out
}
