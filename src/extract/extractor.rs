//! Top-level statement walker.
//!
//! Walks the statements of a parsed module once and records exports, imports
//! and scoped declarations. Nothing here touches the filesystem: bindings that
//! point at other modules are left as [`Declaration::Alias`] entries and
//! [`ExportSlot::ReexportAll`] markers for the linker.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use tree_sitter::Node;

use crate::model::{
    Declaration, ExportEntry, ExtractMode, ImportEntry, ModuleParseResult, ScopedEntry, Signature,
};

use super::parser::ParsedFile;

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z_$][A-Za-z0-9_$]*").expect("valid identifier regex"));

/// One position in a module's export list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportSlot {
    Entry(ExportEntry),
    /// `export * from "<specifier>"`, replaced by the target's exports when linked
    ReexportAll { specifier: String },
}

/// Unlinked extraction output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedModule {
    pub slots: Vec<ExportSlot>,
    pub imports: Vec<ImportEntry>,
    pub scoped: Vec<ScopedEntry>,
}

impl ExtractedModule {
    pub fn entries(&self) -> impl Iterator<Item = &ExportEntry> {
        self.slots.iter().filter_map(|slot| match slot {
            ExportSlot::Entry(entry) => Some(entry),
            ExportSlot::ReexportAll { .. } => None,
        })
    }

    /// Whether linking can change anything.
    pub fn needs_linking(&self) -> bool {
        self.slots.iter().any(|slot| match slot {
            ExportSlot::Entry(entry) => entry.declaration.is_alias(),
            ExportSlot::ReexportAll { .. } => true,
        })
    }

    /// The module as-is, with `export *` markers dropped.
    pub fn into_unlinked(self) -> ModuleParseResult {
        let exports = self
            .slots
            .into_iter()
            .filter_map(|slot| match slot {
                ExportSlot::Entry(entry) => Some(entry),
                ExportSlot::ReexportAll { .. } => None,
            })
            .collect();
        ModuleParseResult {
            exports,
            imports: self.imports,
            scoped: self.scoped,
        }
    }
}

pub struct ExportExtractor<'a> {
    parsed: &'a ParsedFile,
    mode: ExtractMode,
    module: ExtractedModule,
}

impl<'a> ExportExtractor<'a> {
    pub fn new(parsed: &'a ParsedFile, mode: ExtractMode) -> Self {
        Self {
            parsed,
            mode,
            module: ExtractedModule::default(),
        }
    }

    pub fn extract(mut self) -> ExtractedModule {
        let root = self.parsed.root_node();
        let mut cursor = root.walk();
        for statement in root.named_children(&mut cursor) {
            self.visit_statement(statement);
        }
        attach_type_slices(&mut self.module);
        self.module
    }

    fn text(&self, node: Node<'a>) -> &'a str {
        self.parsed.node_text(&node)
    }

    fn field_text(&self, node: Node<'a>, field: &str) -> Option<&'a str> {
        node.child_by_field_name(field).map(|n| self.text(n))
    }

    /// Identifier or quoted module name (`declare module "x"`, `export { "a-b" as c }`).
    fn name_of(&self, node: Node<'a>) -> String {
        unquote(self.text(node)).to_string()
    }

    fn visit_statement(&mut self, node: Node<'a>) {
        match node.kind() {
            "import_statement" => {
                if self.mode.includes_imports() {
                    self.visit_import(node);
                }
            }
            "export_statement" => self.visit_export(node),
            "function_declaration" | "generator_function_declaration" | "function_signature" => {
                if let Some(name) = self.field_text(node, "name") {
                    let sig = self.signature_of(node);
                    self.push_scoped(name, Declaration::Function(sig));
                }
            }
            "class_declaration" | "abstract_class_declaration" => {
                self.push_named_source(node, |source| Declaration::Class { source }, false);
            }
            "interface_declaration" => {
                self.push_named_source(node, |source| Declaration::Interface { source }, false);
            }
            "type_alias_declaration" => {
                self.push_named_source(node, |source| Declaration::TypeAlias { source }, false);
            }
            "enum_declaration" => {
                self.push_named_source(node, |source| Declaration::Enum { source }, false);
            }
            "lexical_declaration" | "variable_declaration" => {
                for (name, declaration) in self.variables_of(node) {
                    self.push_scoped(&name, declaration);
                }
            }
            "internal_module" | "module" => self.visit_namespace(node),
            "ambient_declaration" => {
                if let Some(inner) = first_named_child(node) {
                    self.visit_statement(inner);
                }
            }
            "expression_statement" => self.visit_expression_statement(node),
            _ => {}
        }
    }

    // ========================================================================
    // Imports
    // ========================================================================

    fn visit_import(&mut self, node: Node<'a>) {
        let source = node.child_by_field_name("source").map(|s| self.name_of(s));

        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "import_clause" => {
                    if let Some(source) = &source {
                        self.visit_import_clause(child, source);
                    }
                }
                "import_require_clause" => {
                    let local = find_child(child, "identifier").map(|n| self.text(n));
                    let required = child.child_by_field_name("source").map(|s| self.name_of(s));
                    if let (Some(local), Some(required)) = (local, required) {
                        self.module
                            .imports
                            .push(ImportEntry::default_import(local, required));
                    }
                }
                _ => {}
            }
        }
    }

    fn visit_import_clause(&mut self, clause: Node<'a>, source: &str) {
        let mut cursor = clause.walk();
        for child in clause.named_children(&mut cursor) {
            match child.kind() {
                "identifier" => {
                    let local = self.text(child);
                    self.module
                        .imports
                        .push(ImportEntry::default_import(local, source));
                }
                "namespace_import" => {
                    if let Some(local) = find_child(child, "identifier") {
                        let local = self.text(local);
                        self.module.imports.push(ImportEntry::namespace(local, source));
                    }
                }
                "named_imports" => {
                    let mut inner = child.walk();
                    for specifier in child.named_children(&mut inner) {
                        if specifier.kind() != "import_specifier" {
                            continue;
                        }
                        let Some(name) = specifier.child_by_field_name("name") else {
                            continue;
                        };
                        let imported = self.name_of(name);
                        let local = specifier
                            .child_by_field_name("alias")
                            .map(|a| self.name_of(a))
                            .unwrap_or_else(|| imported.clone());
                        self.module
                            .imports
                            .push(ImportEntry::named(imported, local, source));
                    }
                }
                _ => {}
            }
        }
    }

    // ========================================================================
    // Exports
    // ========================================================================

    fn visit_export(&mut self, node: Node<'a>) {
        let source = node.child_by_field_name("source").map(|s| self.name_of(s));
        let is_default = has_token(node, "default");

        if let Some(declaration) = node.child_by_field_name("declaration") {
            if is_default {
                self.export_default_declaration(declaration);
            } else {
                self.export_declaration(declaration);
            }
            return;
        }

        if is_default {
            if let Some(value) = node.child_by_field_name("value") {
                self.export_default_value(value);
            }
            return;
        }

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "export_clause" => self.visit_export_clause(child, source.as_deref()),
                "namespace_export" => {
                    let name = last_named_child(child).map(|n| self.name_of(n));
                    if let (Some(name), Some(specifier)) = (name, source.clone()) {
                        self.push_export(ExportEntry::new(
                            name,
                            Declaration::NamespaceReexport { specifier },
                        ));
                    }
                }
                "*" => {
                    if let Some(specifier) = source.clone() {
                        self.module
                            .slots
                            .push(ExportSlot::ReexportAll { specifier });
                    }
                }
                _ => {}
            }
        }
    }

    fn visit_export_clause(&mut self, clause: Node<'a>, source: Option<&str>) {
        let mut cursor = clause.walk();
        for specifier in clause.named_children(&mut cursor) {
            if specifier.kind() != "export_specifier" {
                continue;
            }
            let Some(name) = specifier.child_by_field_name("name") else {
                continue;
            };
            let name = self.name_of(name);
            let mut entry = ExportEntry::new(
                name.clone(),
                Declaration::Alias {
                    target: name.clone(),
                    from: source.map(str::to_string),
                },
            );
            match specifier.child_by_field_name("alias") {
                Some(alias) => entry = entry.with_alias(self.name_of(alias)),
                None if name == "default" => entry = entry.as_default(),
                None => {}
            }
            self.push_export(entry);
        }
    }

    /// `export <declaration>`
    fn export_declaration(&mut self, declaration: Node<'a>) {
        match declaration.kind() {
            "function_declaration" | "generator_function_declaration" | "function_signature" => {
                if let Some(name) = self.field_text(declaration, "name") {
                    let sig = self.signature_of(declaration);
                    self.push_function(name, sig);
                }
            }
            "class_declaration" | "abstract_class_declaration" => {
                self.push_named_source(declaration, |source| Declaration::Class { source }, true);
            }
            "interface_declaration" => {
                self.push_named_source(declaration, |source| Declaration::Interface { source }, true);
            }
            "type_alias_declaration" => {
                self.push_named_source(declaration, |source| Declaration::TypeAlias { source }, true);
            }
            "enum_declaration" => {
                self.push_named_source(declaration, |source| Declaration::Enum { source }, true);
            }
            "internal_module" | "module" => {
                self.push_named_source(declaration, |source| Declaration::Namespace { source }, true);
                self.lift_members(declaration);
            }
            "lexical_declaration" | "variable_declaration" => {
                for (name, decl) in self.variables_of(declaration) {
                    self.push_export(ExportEntry::new(name, decl));
                }
            }
            "ambient_declaration" => {
                if let Some(inner) = first_named_child(declaration) {
                    self.export_declaration(inner);
                }
            }
            _ => {}
        }
    }

    /// `export default <declaration>`
    fn export_default_declaration(&mut self, declaration: Node<'a>) {
        let name = self
            .field_text(declaration, "name")
            .map(unquote)
            .unwrap_or("default")
            .to_string();
        let source = self.text(declaration).to_string();

        let decl = match declaration.kind() {
            "function_declaration" | "generator_function_declaration" | "function_signature" => {
                Declaration::Function(self.signature_of(declaration))
            }
            "class_declaration" | "abstract_class_declaration" => Declaration::Class { source },
            "interface_declaration" => Declaration::Interface { source },
            kind => Declaration::Variable {
                expression_kind: Some(kind.to_string()),
                annotation: None,
                source: Some(source),
            },
        };
        self.push_export(ExportEntry::new(name, decl).as_default());
    }

    /// `export default <expression>`
    fn export_default_value(&mut self, value: Node<'a>) {
        let value = unwrap_parens(value);
        let source = self.text(value).to_string();
        let named = self.field_text(value, "name").map(str::to_string);

        let entry = match value.kind() {
            "arrow_function" => ExportEntry::new(
                "default",
                Declaration::ArrowFunction(self.signature_of(value).with_source(source)),
            ),
            "function_expression" | "function" | "generator_function" => ExportEntry::new(
                named.unwrap_or_else(|| "default".to_string()),
                Declaration::Function(self.signature_of(value).with_source(source)),
            ),
            "class" => ExportEntry::new(
                named.unwrap_or_else(|| "default".to_string()),
                Declaration::Class { source },
            ),
            "identifier" => ExportEntry::new(
                source.clone(),
                Declaration::Alias {
                    target: source,
                    from: None,
                },
            ),
            kind => ExportEntry::new(
                "default",
                Declaration::Variable {
                    expression_kind: Some(kind.to_string()),
                    annotation: None,
                    source: Some(source),
                },
            ),
        };
        self.push_export(entry.as_default());
    }

    // ========================================================================
    // Namespaces and CommonJS
    // ========================================================================

    /// A non-exported `namespace X {}` or `declare module "x" {}`: recorded as
    /// scoped, and its directly exported members are lifted into the module.
    fn visit_namespace(&mut self, node: Node<'a>) {
        if let Some(name) = node.child_by_field_name("name") {
            let name = self.name_of(name);
            let source = self.text(node).to_string();
            self.push_scoped(&name, Declaration::Namespace { source });
        }
        self.lift_members(node);
    }

    /// Lifts the directly exported members of a namespace body, one level deep.
    fn lift_members(&mut self, node: Node<'a>) {
        let Some(body) = node.child_by_field_name("body") else {
            return;
        };
        let mut cursor = body.walk();
        for member in body.named_children(&mut cursor) {
            if member.kind() != "export_statement" {
                continue;
            }
            if let Some(declaration) = member.child_by_field_name("declaration") {
                self.export_declaration(declaration);
            }
        }
    }

    fn visit_expression_statement(&mut self, node: Node<'a>) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "internal_module" => self.visit_namespace(child),
                "assignment_expression" => self.visit_module_exports(child),
                _ => {}
            }
        }
    }

    /// `module.exports = { key: value, ... }`. Only the first property is taken.
    fn visit_module_exports(&mut self, assignment: Node<'a>) {
        let Some(left) = assignment.child_by_field_name("left") else {
            return;
        };
        let target: String = self.text(left).split_whitespace().collect();
        if target != "module.exports" {
            return;
        }
        let Some(object) = assignment.child_by_field_name("right") else {
            return;
        };
        if object.kind() != "object" {
            return;
        }

        let mut cursor = object.walk();
        let first = object
            .named_children(&mut cursor)
            .find(|n| n.kind() != "comment");
        let Some(property) = first else {
            return;
        };

        let entry = match property.kind() {
            "pair" => {
                let key = property.child_by_field_name("key").map(|k| self.name_of(k));
                let value = property.child_by_field_name("value");
                match (key, value) {
                    (Some(key), Some(value)) => {
                        let source = self.text(property).to_string();
                        Some(ExportEntry::new(key, self.classify_value(value, None, source)))
                    }
                    _ => None,
                }
            }
            "shorthand_property_identifier" => {
                let name = self.text(property);
                Some(ExportEntry::new(
                    name,
                    Declaration::Alias {
                        target: name.to_string(),
                        from: None,
                    },
                ))
            }
            "method_definition" => self.field_text(property, "name").map(|name| {
                let sig = self.signature_of(property);
                ExportEntry::new(name, Declaration::Function(sig))
            }),
            _ => None,
        };

        if let Some(entry) = entry {
            self.push_export(entry);
        }
    }

    // ========================================================================
    // Declarations
    // ========================================================================

    fn signature_of(&self, callable: Node<'a>) -> Signature {
        let params = match callable.child_by_field_name("parameters") {
            Some(params) => {
                let mut cursor = params.walk();
                params
                    .named_children(&mut cursor)
                    .filter(|p| p.kind() != "comment")
                    .map(|p| self.text(p))
                    .collect::<Vec<_>>()
                    .join(", ")
            }
            None => self
                .field_text(callable, "parameter")
                .unwrap_or_default()
                .to_string(),
        };
        let return_type = self
            .field_text(callable, "return_type")
            .map(strip_annotation)
            .unwrap_or_default();
        Signature::new(params, return_type)
    }

    /// Named declarators of a `const`/`let`/`var` statement. Destructuring
    /// patterns are skipped.
    fn variables_of(&self, statement: Node<'a>) -> Vec<(String, Declaration)> {
        let source = self.text(statement).to_string();
        let mut cursor = statement.walk();
        statement
            .named_children(&mut cursor)
            .filter(|n| n.kind() == "variable_declarator")
            .filter_map(|declarator| {
                let name = declarator.child_by_field_name("name")?;
                if name.kind() != "identifier" {
                    return None;
                }
                let annotation = self.field_text(declarator, "type").map(strip_annotation);
                let declaration = match declarator.child_by_field_name("value") {
                    Some(value) => self.classify_value(value, annotation, source.clone()),
                    None => Declaration::Variable {
                        expression_kind: None,
                        annotation,
                        source: Some(source.clone()),
                    },
                };
                Some((self.text(name).to_string(), declaration))
            })
            .collect()
    }

    fn classify_value(
        &self,
        value: Node<'a>,
        annotation: Option<String>,
        source: String,
    ) -> Declaration {
        let value = unwrap_parens(value);
        match value.kind() {
            "identifier" => Declaration::Alias {
                target: self.text(value).to_string(),
                from: None,
            },
            "arrow_function" | "function_expression" | "function" | "generator_function" => {
                Declaration::ArrowFunction(self.signature_of(value).with_source(source))
            }
            kind => Declaration::Variable {
                expression_kind: Some(kind.to_string()),
                annotation,
                source: Some(source),
            },
        }
    }

    fn push_named_source(
        &mut self,
        node: Node<'a>,
        build: impl FnOnce(String) -> Declaration,
        exported: bool,
    ) {
        let Some(name) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.name_of(name);
        let declaration = build(self.text(node).to_string());
        if exported {
            self.push_export(ExportEntry::new(name, declaration));
        } else {
            self.push_scoped(&name, declaration);
        }
    }

    fn push_scoped(&mut self, name: &str, declaration: Declaration) {
        self.module.scoped.push(ScopedEntry::new(name, declaration));
    }

    fn push_export(&mut self, entry: ExportEntry) {
        self.module.slots.push(ExportSlot::Entry(entry));
    }

    /// Folds overload signatures of the same exported function into one entry.
    fn push_function(&mut self, name: &str, sig: Signature) {
        for slot in self.module.slots.iter_mut() {
            let ExportSlot::Entry(entry) = slot else {
                continue;
            };
            if entry.name != name || entry.is_default || entry.alias.is_some() {
                continue;
            }
            if let Declaration::Function(existing) = &mut entry.declaration {
                existing.merge_overload(&sig);
                return;
            }
        }
        self.push_export(ExportEntry::new(name, Declaration::Function(sig)));
    }
}

/// Attaches the source of same-module types named in each callable's signature.
fn attach_type_slices(module: &mut ExtractedModule) {
    let mut types: HashMap<String, String> = HashMap::new();
    let declared = module
        .scoped
        .iter()
        .map(|s| (&s.name, &s.declaration))
        .chain(module.entries().map(|e| (&e.name, &e.declaration)));
    for (name, declaration) in declared {
        if !declaration.kind().is_type_like() {
            continue;
        }
        if let Some(source) = declaration.source() {
            types.entry(name.clone()).or_insert_with(|| source.to_string());
        }
    }
    if types.is_empty() {
        return;
    }

    for slot in module.slots.iter_mut() {
        let ExportSlot::Entry(entry) = slot else {
            continue;
        };
        let Some(sig) = entry.declaration.signature() else {
            continue;
        };
        let haystack = format!("{} {}", sig.params, sig.return_type);
        let mut slices: Vec<String> = Vec::new();
        for ident in IDENTIFIER_RE.find_iter(&haystack) {
            let ident = ident.as_str();
            if ident == entry.name {
                continue;
            }
            if let Some(source) = types.get(ident) {
                if !slices.contains(source) {
                    slices.push(source.clone());
                }
            }
        }
        entry.extra_type_slices = slices;
    }
}

pub(crate) fn unquote(text: &str) -> &str {
    text.trim_matches(|c| c == '\'' || c == '"' || c == '`')
}

/// `: Foo` → `Foo`
fn strip_annotation(text: &str) -> String {
    let trimmed = text.trim_start();
    trimmed.strip_prefix(':').unwrap_or(trimmed).trim().to_string()
}

fn has_token(node: Node, kind: &str) -> bool {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).any(|c| c.kind() == kind);
    found
}

pub(crate) fn find_child<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    let mut cursor = node.walk();
    let found = node.named_children(&mut cursor).find(|c| c.kind() == kind);
    found
}

pub(crate) fn first_named_child(node: Node) -> Option<Node> {
    let mut cursor = node.walk();
    let found = node.named_children(&mut cursor).find(|c| c.kind() != "comment");
    found
}

fn last_named_child(node: Node) -> Option<Node> {
    let mut cursor = node.walk();
    let found = node.named_children(&mut cursor).last();
    found
}

fn unwrap_parens(mut node: Node) -> Node {
    while node.kind() == "parenthesized_expression" {
        match first_named_child(node) {
            Some(inner) => node = inner,
            None => break,
        }
    }
    node
}
