//! Static export extraction.
//!
//! `.json` modules are read as data, `.vue` components contribute their
//! `<script>` blocks, everything else goes through tree-sitter.

pub mod extractor;
pub mod json;
pub mod parser;
pub mod vue;

use std::path::Path;

use crate::error::Result;
use crate::languages::LanguageRegistry;
use crate::model::ExtractMode;

pub use extractor::{ExportExtractor, ExportSlot, ExtractedModule};
pub use parser::{ParsedFile, Parser};

pub struct ModuleExtractor {
    parser: Parser,
}

impl ModuleExtractor {
    pub fn new(registry: LanguageRegistry) -> Self {
        Self {
            parser: Parser::new(registry),
        }
    }

    pub fn parser(&self) -> &Parser {
        &self.parser
    }

    /// Extracts the unlinked tables of a module from its content.
    ///
    /// Fails only for unsupported file types. Content tree-sitter cannot parse
    /// at all yields an empty module.
    pub fn extract(&self, path: &Path, content: &str, mode: ExtractMode) -> Result<ExtractedModule> {
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if extension == "json" {
            return Ok(json::extract_json(content));
        }

        let grammar = self.parser.grammar_for_file(path)?;
        let script;
        let source = if extension == "vue" {
            script = vue::script_source(content);
            script.as_str()
        } else {
            content
        };

        match self.parser.parse_source(source, grammar) {
            Ok(parsed) => Ok(ExportExtractor::new(&parsed, mode).extract()),
            Err(e) => {
                tracing::debug!("Parse of {} failed: {}", path.display(), e);
                Ok(ExtractedModule::default())
            }
        }
    }
}

impl Default for ModuleExtractor {
    fn default() -> Self {
        Self::new(LanguageRegistry::new())
    }
}
