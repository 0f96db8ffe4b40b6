pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod import_source;
pub mod languages;
pub mod model;
pub mod resolver;
pub mod watcher;
pub mod workspace;

use std::future::Future;
use std::pin::Pin;

pub use cache::{CacheStats, CachedModule, ParseCache, ResolutionCache, ResolutionKey};
pub use config::{EngineConfig, DEFAULT_EXTENSIONS};
pub use engine::ModuleEngine;
pub use error::{LensError, Result};
pub use extract::{ExportSlot, ExtractedModule, ModuleExtractor, Parser};
pub use import_source::{import_source, ImportSource, Position};
pub use languages::{LanguageGrammar, LanguageRegistry};
pub use model::{
    DeclKind, Declaration, ExportEntry, ExtractMode, ImportEntry, ModuleParseResult, ScopedEntry,
    Signature,
};
pub use resolver::{PathResolver, ResolvedLocation, SpecifierKind};
pub use watcher::{FileEvent, FileWatcher};
pub use workspace::{load_aliases, parse_aliases, AliasMap};

/// Boxed future for recursive async lookups.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
