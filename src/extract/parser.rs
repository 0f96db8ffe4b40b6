use std::path::Path;
use std::sync::Arc;

use crate::error::{LensError, Result};
use crate::languages::{LanguageGrammar, LanguageRegistry};

pub struct Parser {
    registry: LanguageRegistry,
}

impl Parser {
    pub fn new(registry: LanguageRegistry) -> Self {
        Self { registry }
    }

    pub fn grammar_for_file(&self, path: &Path) -> Result<Arc<dyn LanguageGrammar>> {
        self.registry
            .get_for_file(path)
            .ok_or_else(|| LensError::UnsupportedLanguage(path.display().to_string()))
    }

    pub fn grammar_for_language_id(&self, language_id: &str) -> Option<Arc<dyn LanguageGrammar>> {
        self.registry.get_for_language_id(language_id)
    }

    /// Parses `source`. tree-sitter recovers from syntax errors, so an `Err`
    /// here means the parser itself could not run.
    pub fn parse_source(&self, source: &str, grammar: Arc<dyn LanguageGrammar>) -> Result<ParsedFile> {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&grammar.language())
            .map_err(|e| LensError::Parse(e.to_string()))?;

        let tree = parser
            .parse(source, None)
            .ok_or_else(|| LensError::Parse("Failed to parse source".to_string()))?;

        Ok(ParsedFile {
            tree,
            source: source.to_string(),
            language: grammar.name().to_string(),
        })
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new(LanguageRegistry::new())
    }
}

pub struct ParsedFile {
    pub tree: tree_sitter::Tree,
    pub source: String,
    pub language: String,
}

impl ParsedFile {
    pub fn root_node(&self) -> tree_sitter::Node<'_> {
        self.tree.root_node()
    }

    pub fn source_bytes(&self) -> &[u8] {
        self.source.as_bytes()
    }

    pub fn node_text(&self, node: &tree_sitter::Node) -> &str {
        node.utf8_text(self.source_bytes()).unwrap_or("")
    }
}
