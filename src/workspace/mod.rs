//! Project-level inputs read by the resolver.
//!
//! - `tsconfig.json` / `jsconfig.json` path aliases
//! - the pnpm content-addressed store

pub mod pnpm;
pub mod tsconfig;

pub use tsconfig::{load_aliases, parse_aliases, AliasMap};
