//! Turns an [`ExtractedModule`] into a finished [`ModuleParseResult`].
//!
//! Linking splices `export *` targets in place and replaces alias entries
//! with the declarations they name, loading other modules through the engine
//! as needed. The [`Trail`] of modules currently being linked stops cycles.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::cache::CachedModule;
use crate::extract::{ExportSlot, ExtractedModule};
use crate::model::{Declaration, ExportEntry, ExtractMode, ImportEntry, ModuleParseResult};
use crate::resolver::ResolvedLocation;

use super::ModuleEngine;

static WORD_RUN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9_$]+").expect("valid word regex"));

/// Modules currently being linked, outermost first.
#[derive(Debug, Default)]
pub struct Trail {
    stack: Vec<PathBuf>,
    /// Shallowest stack index a cycle was cut at since the last frame began
    lowest_cut: Option<usize>,
}

/// Handle for one module on the [`Trail`].
#[derive(Debug)]
pub struct Frame {
    depth: usize,
    saved_cut: Option<usize>,
}

impl Trail {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes `path`, or records a cut and returns `None` if it is already
    /// being linked.
    pub fn enter(&mut self, path: &Path) -> Option<Frame> {
        if let Some(index) = self.stack.iter().position(|p| p == path) {
            tracing::debug!("Re-export cycle cut at {}", path.display());
            self.lowest_cut = Some(self.lowest_cut.map_or(index, |cut| cut.min(index)));
            return None;
        }

        self.stack.push(path.to_path_buf());
        Some(Frame {
            depth: self.stack.len() - 1,
            saved_cut: self.lowest_cut.take(),
        })
    }

    /// Pops `frame` and reports whether its result is complete. A result is
    /// incomplete when a cycle was cut at a module enclosing it.
    pub fn leave(&mut self, frame: Frame) -> bool {
        self.stack.truncate(frame.depth);
        let complete = !matches!(self.lowest_cut, Some(cut) if cut < frame.depth);
        self.lowest_cut = match (self.lowest_cut, frame.saved_cut) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        complete
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}

/// Links one module. Returns the result and every module path it was built from.
pub async fn link(
    engine: &ModuleEngine,
    module: ExtractedModule,
    location: &ResolvedLocation,
    trail: &mut Trail,
) -> CachedModule {
    let mut linker = Linker {
        engine,
        location,
        module: &module,
        dependencies: Vec::new(),
    };

    let mut exports: Vec<ExportEntry> = Vec::with_capacity(module.slots.len());
    for slot in &module.slots {
        match slot {
            ExportSlot::Entry(entry) if entry.declaration.is_alias() => {
                exports.push(linker.resolve_alias(entry, trail).await);
            }
            ExportSlot::Entry(entry) => exports.push(entry.clone()),
            ExportSlot::ReexportAll { specifier } => {
                if let Some(target) = linker.load(specifier, ExtractMode::ExportsOnly, trail).await {
                    exports.extend(target.exports.iter().cloned());
                }
            }
        }
    }

    let mut dependencies = linker.dependencies;
    dependencies.sort();
    dependencies.dedup();
    dependencies.retain(|d| *d != location.absolute_path);

    CachedModule::new(
        ModuleParseResult {
            exports: dedup_exports(exports),
            imports: module.imports.clone(),
            scoped: module.scoped.clone(),
        },
        dependencies,
    )
}

/// First entry per exported name wins; defaults are deduplicated separately.
fn dedup_exports(exports: Vec<ExportEntry>) -> Vec<ExportEntry> {
    let mut seen: HashSet<(bool, String)> = HashSet::new();
    exports
        .into_iter()
        .filter(|entry| seen.insert((entry.is_default, entry.exported_name().to_string())))
        .collect()
}

struct Linker<'a> {
    engine: &'a ModuleEngine,
    location: &'a ResolvedLocation,
    module: &'a ExtractedModule,
    dependencies: Vec<PathBuf>,
}

impl<'a> Linker<'a> {
    /// Resolves `specifier` against this module and loads the target.
    async fn load(
        &mut self,
        specifier: &str,
        mode: ExtractMode,
        trail: &mut Trail,
    ) -> Option<Arc<ModuleParseResult>> {
        let target = self
            .engine
            .resolve_in(
                specifier,
                &self.location.absolute_path,
                self.location.package_node_modules.as_deref(),
            )
            .await?;

        self.dependencies.push(target.absolute_path.clone());
        let loaded = self.engine.load(&target, mode, trail).await?;
        self.dependencies.extend(loaded.dependencies.iter().cloned());
        Some(loaded.result)
    }

    async fn resolve_alias(&mut self, entry: &ExportEntry, trail: &mut Trail) -> ExportEntry {
        let Declaration::Alias { target, from } = &entry.declaration else {
            return entry.clone();
        };

        let found = match from {
            Some(specifier) => {
                let module = self.load(specifier, ExtractMode::Full, trail).await;
                module.and_then(|m| lookup_export(&m, target).cloned())
            }
            None => self.find_target(target, trail).await,
        };

        match found {
            Some(found) => apply_envelope(entry, found),
            None => {
                tracing::debug!(
                    "Unresolved export {} in {}",
                    entry.exported_name(),
                    self.location.absolute_path.display()
                );
                entry.clone()
            }
        }
    }

    /// Looks `name` up among scoped declarations, then imports.
    async fn find_target(&mut self, name: &str, trail: &mut Trail) -> Option<ExportEntry> {
        let module = self.module;
        let mut visited: HashSet<&str> = HashSet::new();
        let mut current = name;

        loop {
            if !visited.insert(current) {
                return None;
            }

            if let Some(scoped) = module.scoped.iter().find(|s| s.name == current) {
                match &scoped.declaration {
                    Declaration::Alias { target, from: None } => {
                        current = target.as_str();
                        continue;
                    }
                    declaration => return Some(ExportEntry::new(&scoped.name, declaration.clone())),
                }
            }

            if let Some(import) = module.imports.iter().find(|i| i.local_name == current) {
                return self.import_binding(import, trail).await;
            }

            // `export function f() {}` followed by `export { f as g }`
            return module
                .entries()
                .find(|e| e.name == current && !e.declaration.is_alias())
                .cloned();
        }
    }

    async fn import_binding(&mut self, import: &ImportEntry, trail: &mut Trail) -> Option<ExportEntry> {
        if import.is_namespace {
            return Some(ExportEntry::new(
                &import.local_name,
                Declaration::NamespaceReexport {
                    specifier: import.source.clone(),
                },
            ));
        }

        let module = self.load(&import.source, ExtractMode::Full, trail).await?;
        if import.is_default {
            module.default_export().cloned()
        } else {
            module.find_export(import.lookup_name()).cloned()
        }
    }
}

fn lookup_export<'m>(module: &'m ModuleParseResult, name: &str) -> Option<&'m ExportEntry> {
    if name == "default" {
        module.default_export()
    } else {
        module.find_export(name)
    }
}

/// Carries the alias entry's export shape over the resolved declaration.
fn apply_envelope(entry: &ExportEntry, mut found: ExportEntry) -> ExportEntry {
    found.is_default = entry.is_default;
    found.alias = entry.alias.clone();

    if !entry.is_default {
        let external = entry.exported_name();
        if external != found.name {
            // anonymous defaults have no binding in their source to rename
            if found.name != "default" {
                if let Some(source) = found.declaration.source_mut() {
                    *source = replace_word(source, &found.name, external);
                }
            }
            found.name = external.to_string();
        }
    }
    found
}

/// Replaces whole-word occurrences of `from` in `text`.
pub fn replace_word(text: &str, from: &str, to: &str) -> String {
    let is_word = WORD_RUN_RE
        .find(from)
        .is_some_and(|m| m.start() == 0 && m.end() == from.len());
    if from.is_empty() {
        return text.to_string();
    }
    if !is_word {
        return text.replace(from, to);
    }

    WORD_RUN_RE
        .replace_all(text, |caps: &regex::Captures| {
            if &caps[0] == from {
                to.to_string()
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trail_cut_taints_inner_frames_only() {
        let mut trail = Trail::new();
        let a = trail.enter(Path::new("/p/a.ts")).unwrap();
        let b = trail.enter(Path::new("/p/b.ts")).unwrap();
        assert!(trail.enter(Path::new("/p/a.ts")).is_none());

        assert!(!trail.leave(b));
        assert!(trail.leave(a));
        assert_eq!(trail.depth(), 0);
    }

    #[test]
    fn test_trail_without_cycle_is_complete() {
        let mut trail = Trail::new();
        let a = trail.enter(Path::new("/p/a.ts")).unwrap();
        let b = trail.enter(Path::new("/p/b.ts")).unwrap();
        assert!(trail.leave(b));
        let c = trail.enter(Path::new("/p/c.ts")).unwrap();
        assert!(trail.leave(c));
        assert!(trail.leave(a));
    }

    #[test]
    fn test_trail_self_cycle() {
        let mut trail = Trail::new();
        let a = trail.enter(Path::new("/p/a.ts")).unwrap();
        assert!(trail.enter(Path::new("/p/a.ts")).is_none());
        assert!(trail.leave(a));
    }

    #[test]
    fn test_replace_word() {
        assert_eq!(replace_word("const a = () => a", "a", "b"), "const b = () => b");
        assert_eq!(replace_word("const abc = a", "a", "b"), "const abc = b");
        assert_eq!(replace_word("a,a", "a", "b"), "b,b");
        assert_eq!(replace_word("$a = a$", "a", "b"), "$a = a$");
    }

    #[test]
    fn test_replace_word_adjacent_and_embedded() {
        assert_eq!(replace_word("a+a-a", "a", "b"), "b+b-b");
        assert_eq!(replace_word("fooBar(foo, foo_1)", "foo", "x"), "fooBar(x, foo_1)");
        assert_eq!(replace_word("foo", "foo", "foo2"), "foo2");
        assert_eq!(replace_word("a.b", "a.b", "c"), "c");
        assert_eq!(replace_word("const a = 1", "", "b"), "const a = 1");
    }

    #[test]
    fn test_apply_envelope_renames() {
        let alias = ExportEntry::new(
            "a",
            Declaration::Alias {
                target: "a".to_string(),
                from: None,
            },
        )
        .with_alias("b");
        let found = ExportEntry::new("a", Declaration::variable_source("const a = 1"));

        let linked = apply_envelope(&alias, found);
        assert_eq!(linked.name, "b");
        assert_eq!(linked.exported_name(), "b");
        assert_eq!(linked.source(), Some("const b = 1"));
        assert!(!linked.is_default);
    }

    #[test]
    fn test_apply_envelope_default_keeps_target_name() {
        let alias = ExportEntry::new(
            "Widget",
            Declaration::Alias {
                target: "Widget".to_string(),
                from: None,
            },
        )
        .as_default();
        let found = ExportEntry::new(
            "Widget",
            Declaration::Class {
                source: "class Widget {}".to_string(),
            },
        );

        let linked = apply_envelope(&alias, found);
        assert_eq!(linked.name, "Widget");
        assert!(linked.is_default);
        assert_eq!(linked.kind_tags(), vec!["class", "default"]);
    }

    #[test]
    fn test_dedup_first_wins() {
        let exports = vec![
            ExportEntry::new("a", Declaration::variable_source("1")),
            ExportEntry::new("a", Declaration::variable_source("2")),
            ExportEntry::new("a", Declaration::variable_source("3")).as_default(),
        ];
        let deduped = dedup_exports(exports);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].source(), Some("1"));
        assert!(deduped[1].is_default);
    }
}
