//! Finds the import statement under an editor cursor.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tree_sitter::Node;

use crate::extract::extractor::{find_child, first_named_child, unquote};
use crate::extract::parser::Parser;
use crate::extract::vue;

static IMPORT_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"import(\s+)from\s+['"]([^"']+)['"]"#).expect("valid import line regex")
});

/// Zero-based line and character, as editors report cursors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    /// UTF-16 code unit offset within the line
    pub character: usize,
}

impl Position {
    pub fn new(line: usize, character: usize) -> Self {
        Self { line, character }
    }
}

/// The import under the cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSource {
    /// Statement text before the specifier, or the bound name of a `require`
    pub imports_text: String,
    pub specifier: String,
    /// Whether the cursor is inside the specifier string
    pub in_specifier: bool,
}

/// Byte offset of `position` in `text`. `character` counts UTF-16 code units;
/// offsets past the end of the line clamp to the line end.
pub fn offset_at(text: &str, position: Position) -> Option<usize> {
    let mut line_start = 0;
    for _ in 0..position.line {
        line_start += text[line_start..].find('\n')? + 1;
    }
    let line_end = text[line_start..]
        .find('\n')
        .map_or(text.len(), |i| line_start + i);
    let line = &text[line_start..line_end];

    let mut units = 0;
    for (i, c) in line.char_indices() {
        if units >= position.character {
            return Some(line_start + i);
        }
        units += c.len_utf16();
    }
    Some(line_end)
}

/// Locates the `import` (or `const x = require("y")`) statement containing
/// `position`. Vue documents only search their `<script>` blocks. When no
/// statement matches, the cursor line is tried against a plain
/// `import ... from "x"` pattern.
pub fn import_source(
    parser: &Parser,
    text: &str,
    language_id: &str,
    position: Position,
) -> Option<ImportSource> {
    let offset = offset_at(text, position)?;

    let found = if language_id == "vue" {
        locate_in_vue(parser, text, offset)
    } else {
        locate_in_module(parser, text, language_id, offset)
    };

    found.or_else(|| {
        let line = text.lines().nth(position.line)?;
        line_fallback(line)
    })
}

fn locate_in_module(
    parser: &Parser,
    text: &str,
    language_id: &str,
    offset: usize,
) -> Option<ImportSource> {
    let grammar = parser
        .grammar_for_language_id(language_id)
        .or_else(|| parser.grammar_for_language_id("typescriptreact"))?;
    let parsed = match parser.parse_source(text, grammar) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::debug!("Import lookup parse failed: {}", e);
            return None;
        }
    };

    let root = parsed.root_node();
    let mut cursor = root.walk();
    for statement in root.named_children(&mut cursor) {
        let found = match statement.kind() {
            "import_statement" if contains(statement, offset, 0) => {
                import_statement(text, statement, offset, 0)
            }
            "lexical_declaration" | "variable_declaration" => require_call(text, statement, offset),
            _ => None,
        };
        if found.is_some() {
            return found;
        }
    }
    None
}

fn locate_in_vue(parser: &Parser, text: &str, offset: usize) -> Option<ImportSource> {
    let grammar = parser.grammar_for_language_id("vue")?;

    for block in vue::script_blocks(text) {
        let parsed = match parser.parse_source(block.content, grammar.clone()) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::debug!("Vue script parse failed: {}", e);
                continue;
            }
        };

        let root = parsed.root_node();
        let mut cursor = root.walk();
        for statement in root.named_children(&mut cursor) {
            if statement.kind() != "import_statement" {
                continue;
            }
            let start = statement.start_byte() + block.offset;
            let end = statement.end_byte() + block.offset;
            if start < offset && offset < end {
                return import_statement(text, statement, offset, block.offset);
            }
        }
    }
    None
}

/// `import ... from "x"` whose byte range, shifted by `base`, holds `offset`.
fn import_statement(text: &str, statement: Node, offset: usize, base: usize) -> Option<ImportSource> {
    let source = statement.child_by_field_name("source")?;
    let start = statement.start_byte() + base;
    let source_start = source.start_byte() + base;
    let source_end = source.end_byte() + base;

    Some(ImportSource {
        imports_text: text.get(start..source_start)?.to_string(),
        specifier: unquote(text.get(source_start..source_end)?).to_string(),
        in_specifier: contains(source, offset, base),
    })
}

/// `const x = require("y")`, checked on the first declarator only.
fn require_call(text: &str, statement: Node, offset: usize) -> Option<ImportSource> {
    let declarator = find_child(statement, "variable_declarator")?;
    if !contains(declarator, offset, 0) {
        return None;
    }

    let call = declarator.child_by_field_name("value")?;
    if call.kind() != "call_expression" {
        return None;
    }
    let callee = call.child_by_field_name("function")?;
    if callee.kind() != "identifier" || text.get(callee.byte_range())? != "require" {
        return None;
    }
    let argument = first_named_child(call.child_by_field_name("arguments")?)?;
    if argument.kind() != "string" {
        return None;
    }

    let name = declarator.child_by_field_name("name")?;
    Some(ImportSource {
        imports_text: text.get(name.byte_range())?.to_string(),
        specifier: unquote(text.get(argument.byte_range())?).to_string(),
        in_specifier: contains(argument, offset, 0),
    })
}

fn line_fallback(line: &str) -> Option<ImportSource> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let caps = IMPORT_LINE_RE.captures(line)?;
    Some(ImportSource {
        imports_text: caps.get(0)?.as_str().to_string(),
        specifier: caps.get(2)?.as_str().to_string(),
        in_specifier: false,
    })
}

fn contains(node: Node, offset: usize, base: usize) -> bool {
    node.start_byte() + base <= offset && offset <= node.end_byte() + base
}
