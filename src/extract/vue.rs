//! Vue single-file components: only `<script>` blocks are parsed.

use once_cell::sync::Lazy;
use regex::Regex;

static SCRIPT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<script[^>]*>(.*?)</script>").expect("valid script regex"));

/// A `<script>` body and its byte offset in the component text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptBlock<'a> {
    pub offset: usize,
    pub content: &'a str,
}

pub fn script_blocks(text: &str) -> Vec<ScriptBlock<'_>> {
    SCRIPT_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|body| ScriptBlock {
            offset: body.start(),
            content: body.as_str(),
        })
        .collect()
}

/// All `<script>` bodies joined, for export extraction.
pub fn script_source(text: &str) -> String {
    script_blocks(text)
        .iter()
        .map(|block| block.content)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPONENT: &str = r#"<template>
  <div>{{ msg }}</div>
</template>

<script lang="ts">
export const name = 'Hello'
</script>

<script setup lang="ts">
import { ref } from 'vue'
const msg = ref('hi')
</script>
"#;

    #[test]
    fn test_script_blocks_offsets() {
        let blocks = script_blocks(COMPONENT);
        assert_eq!(blocks.len(), 2);
        for block in &blocks {
            assert_eq!(&COMPONENT[block.offset..block.offset + block.content.len()], block.content);
        }
        assert!(blocks[0].content.contains("export const name"));
        assert!(blocks[1].content.contains("import { ref }"));
    }

    #[test]
    fn test_script_source_joins_blocks() {
        let source = script_source(COMPONENT);
        assert!(source.contains("export const name"));
        assert!(source.contains("const msg"));
        assert!(!source.contains("<template>"));
    }

    #[test]
    fn test_no_script() {
        assert!(script_blocks("<template><div/></template>").is_empty());
        assert_eq!(script_source("<template/>"), "");
    }
}
