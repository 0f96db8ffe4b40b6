//! Engine caches: module parse results and specifier resolutions.

pub mod parse;
pub mod resolution;

use serde::Serialize;

pub use parse::{CachedModule, ParseCache};
pub use resolution::{ResolutionCache, ResolutionKey};

/// Counters for both caches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub parse_hits: u64,
    pub parse_misses: u64,
    /// Extractor runs, cold or after a content change
    pub parses: u64,
    pub cached_modules: usize,
    pub resolution_hits: u64,
    pub resolution_misses: u64,
    pub cached_resolutions: usize,
}

impl CacheStats {
    pub fn collect(parse: &ParseCache, resolution: &ResolutionCache) -> Self {
        Self {
            parse_hits: parse.hits(),
            parse_misses: parse.misses(),
            parses: parse.parses(),
            cached_modules: parse.len(),
            resolution_hits: resolution.hits(),
            resolution_misses: resolution.misses(),
            cached_resolutions: resolution.len(),
        }
    }
}
