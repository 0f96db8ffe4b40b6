//! Symbol tables produced by the extractor.
//!
//! An [`ExportEntry`] is a shared envelope (name, alias, default flag) around a
//! [`Declaration`], the kind-specific payload. Imports and scoped declarations
//! are kept next to the exports only as lookup targets for alias resolution.

use serde::{Deserialize, Serialize};

/// Structural kind of a declaration.
///
/// Whether an entry is a default export is tracked separately on
/// [`ExportEntry::is_default`], since a declaration can be both a function and
/// the default export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclKind {
    Function,
    ArrowFunction,
    Class,
    Interface,
    TypeAlias,
    Enum,
    Namespace,
    Variable,
    Json,
}

impl DeclKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeclKind::Function => "function",
            DeclKind::ArrowFunction => "arrow_function",
            DeclKind::Class => "class",
            DeclKind::Interface => "interface",
            DeclKind::TypeAlias => "type_alias",
            DeclKind::Enum => "enum",
            DeclKind::Namespace => "namespace",
            DeclKind::Variable => "variable",
            DeclKind::Json => "json",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "function" => Some(DeclKind::Function),
            "arrow_function" => Some(DeclKind::ArrowFunction),
            "class" => Some(DeclKind::Class),
            "interface" => Some(DeclKind::Interface),
            "type_alias" => Some(DeclKind::TypeAlias),
            "enum" => Some(DeclKind::Enum),
            "namespace" => Some(DeclKind::Namespace),
            "variable" => Some(DeclKind::Variable),
            "json" => Some(DeclKind::Json),
            _ => None,
        }
    }

    /// Kinds whose source text is worth attaching to a callable's hover.
    pub fn is_type_like(&self) -> bool {
        matches!(
            self,
            DeclKind::Interface | DeclKind::TypeAlias | DeclKind::Enum | DeclKind::Class
        )
    }
}

/// Parameter list and return type of a callable, as source text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub params: String,
    pub return_type: String,
    /// Declaring statement, kept for arrow functions and function expressions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Signature {
    pub fn new(params: impl Into<String>, return_type: impl Into<String>) -> Self {
        Self {
            params: params.into(),
            return_type: return_type.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Folds another overload signature into this one.
    pub fn merge_overload(&mut self, other: &Signature) {
        self.params = format!("{} | {}", self.params, other.params);
        self.return_type = format!("{} | {}", self.return_type, other.return_type);
    }
}

/// Kind-specific payload of an export or scoped declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Declaration {
    Function(Signature),
    ArrowFunction(Signature),
    Class {
        source: String,
    },
    Interface {
        source: String,
    },
    TypeAlias {
        source: String,
    },
    Enum {
        source: String,
    },
    Namespace {
        source: String,
    },
    /// A variable or bare identifier.
    Variable {
        /// Syntax kind of the initializer (`number`, `object`, `call_expression`, ...)
        #[serde(skip_serializing_if = "Option::is_none")]
        expression_kind: Option<String>,
        /// Declared type for annotation-only declarations
        #[serde(skip_serializing_if = "Option::is_none")]
        annotation: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        source: Option<String>,
    },
    /// Alias-only entry naming another binding, pending resolution.
    Alias {
        target: String,
        /// Module the binding is re-exported from (`export { x } from "m"`)
        #[serde(skip_serializing_if = "Option::is_none")]
        from: Option<String>,
    },
    /// `export * as ns from "m"`
    NamespaceReexport { specifier: String },
    /// Top-level value of a JSON module, pretty-printed.
    Json { value: String },
}

impl Declaration {
    pub fn variable_source(source: impl Into<String>) -> Self {
        Declaration::Variable {
            expression_kind: None,
            annotation: None,
            source: Some(source.into()),
        }
    }

    pub fn kind(&self) -> DeclKind {
        match self {
            Declaration::Function(_) => DeclKind::Function,
            Declaration::ArrowFunction(_) => DeclKind::ArrowFunction,
            Declaration::Class { .. } => DeclKind::Class,
            Declaration::Interface { .. } => DeclKind::Interface,
            Declaration::TypeAlias { .. } => DeclKind::TypeAlias,
            Declaration::Enum { .. } => DeclKind::Enum,
            Declaration::Namespace { .. } | Declaration::NamespaceReexport { .. } => {
                DeclKind::Namespace
            }
            Declaration::Variable { .. } | Declaration::Alias { .. } => DeclKind::Variable,
            Declaration::Json { .. } => DeclKind::Json,
        }
    }

    pub fn signature(&self) -> Option<&Signature> {
        match self {
            Declaration::Function(sig) | Declaration::ArrowFunction(sig) => Some(sig),
            _ => None,
        }
    }

    pub fn signature_mut(&mut self) -> Option<&mut Signature> {
        match self {
            Declaration::Function(sig) | Declaration::ArrowFunction(sig) => Some(sig),
            _ => None,
        }
    }

    /// Source slice used for hover/detail rendering.
    pub fn source(&self) -> Option<&str> {
        match self {
            Declaration::Class { source }
            | Declaration::Interface { source }
            | Declaration::TypeAlias { source }
            | Declaration::Enum { source }
            | Declaration::Namespace { source } => Some(source),
            Declaration::Variable { source, .. } => source.as_deref(),
            Declaration::Function(sig) | Declaration::ArrowFunction(sig) => sig.source.as_deref(),
            Declaration::Json { value } => Some(value),
            _ => None,
        }
    }

    pub fn source_mut(&mut self) -> Option<&mut String> {
        match self {
            Declaration::Class { source }
            | Declaration::Interface { source }
            | Declaration::TypeAlias { source }
            | Declaration::Enum { source }
            | Declaration::Namespace { source } => Some(source),
            Declaration::Variable { source, .. } => source.as_mut(),
            Declaration::Function(sig) | Declaration::ArrowFunction(sig) => sig.source.as_mut(),
            Declaration::Json { value } => Some(value),
            _ => None,
        }
    }

    pub fn is_alias(&self) -> bool {
        matches!(self, Declaration::Alias { .. })
    }
}

/// One exported symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportEntry {
    /// Display name. Before linking this is the local binding name.
    pub name: String,
    /// External name from `export { local as alias }`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub is_default: bool,
    pub declaration: Declaration,
    /// Source of local types referenced by a callable's signature
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_type_slices: Vec<String>,
}

impl ExportEntry {
    pub fn new(name: impl Into<String>, declaration: Declaration) -> Self {
        Self {
            name: name.into(),
            alias: None,
            is_default: false,
            declaration,
            extra_type_slices: Vec::new(),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        let alias = alias.into();
        if alias == "default" {
            self.is_default = true;
        }
        self.alias = Some(alias);
        self
    }

    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    /// Name importers see: the alias when one is set, otherwise the name.
    /// A `default` alias is not a name, the entry is reached as the default export.
    pub fn exported_name(&self) -> &str {
        match self.alias.as_deref() {
            Some(alias) if alias != "default" => alias,
            _ => &self.name,
        }
    }

    pub fn kind(&self) -> DeclKind {
        self.declaration.kind()
    }

    /// Structural kind tag, followed by `"default"` for default exports.
    pub fn kind_tags(&self) -> Vec<&'static str> {
        let mut tags = vec![self.kind().as_str()];
        if self.is_default {
            tags.push("default");
        }
        tags
    }

    pub fn signature(&self) -> Option<&Signature> {
        self.declaration.signature()
    }

    pub fn source(&self) -> Option<&str> {
        self.declaration.source()
    }
}

/// One binding a module imports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportEntry {
    /// Name the binding has inside the importing module
    pub local_name: String,
    /// Name exported by the source module, when it differs from a default import
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imported_name: Option<String>,
    pub is_default: bool,
    pub is_namespace: bool,
    /// Specifier as written in the import statement
    pub source: String,
}

impl ImportEntry {
    pub fn default_import(local: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            local_name: local.into(),
            imported_name: None,
            is_default: true,
            is_namespace: false,
            source: source.into(),
        }
    }

    pub fn named(
        imported: impl Into<String>,
        local: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            local_name: local.into(),
            imported_name: Some(imported.into()),
            is_default: false,
            is_namespace: false,
            source: source.into(),
        }
    }

    pub fn namespace(local: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            local_name: local.into(),
            imported_name: None,
            is_default: false,
            is_namespace: true,
            source: source.into(),
        }
    }

    /// Name to look up in the source module's exports.
    pub fn lookup_name(&self) -> &str {
        self.imported_name.as_deref().unwrap_or(&self.local_name)
    }
}

/// A top-level declaration that is not exported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopedEntry {
    pub name: String,
    pub declaration: Declaration,
}

impl ScopedEntry {
    pub fn new(name: impl Into<String>, declaration: Declaration) -> Self {
        Self {
            name: name.into(),
            declaration,
        }
    }
}

/// Export, import and scoped tables of one module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleParseResult {
    pub exports: Vec<ExportEntry>,
    pub imports: Vec<ImportEntry>,
    pub scoped: Vec<ScopedEntry>,
}

impl ModuleParseResult {
    pub fn find_export(&self, name: &str) -> Option<&ExportEntry> {
        self.exports.iter().find(|e| e.exported_name() == name)
    }

    pub fn default_export(&self) -> Option<&ExportEntry> {
        self.exports.iter().find(|e| e.is_default)
    }

    pub fn named_exports(&self) -> impl Iterator<Item = &ExportEntry> {
        self.exports.iter().filter(|e| !e.is_default)
    }

    pub fn export_names(&self) -> Vec<&str> {
        self.exports.iter().map(|e| e.exported_name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.exports.is_empty() && self.imports.is_empty() && self.scoped.is_empty()
    }
}

/// How much of a module to extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExtractMode {
    /// Exports, imports and scoped declarations
    Full,
    /// Skip import statements; used when following `export *`
    ExportsOnly,
}

impl ExtractMode {
    pub fn includes_imports(&self) -> bool {
        matches!(self, ExtractMode::Full)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags_default() {
        let entry = ExportEntry::new("run", Declaration::Function(Signature::default())).as_default();
        assert_eq!(entry.kind_tags(), vec!["function", "default"]);
    }

    #[test]
    fn test_kind_tags_named() {
        let entry = ExportEntry::new("foo", Declaration::variable_source("foo = 1"));
        assert_eq!(entry.kind_tags(), vec!["variable"]);
    }

    #[test]
    fn test_default_alias_marks_default() {
        let entry = ExportEntry::new(
            "a",
            Declaration::Alias {
                target: "a".into(),
                from: None,
            },
        )
        .with_alias("default");

        assert!(entry.is_default);
        assert_eq!(entry.exported_name(), "a");
    }

    #[test]
    fn test_exported_name_prefers_alias() {
        let entry = ExportEntry::new(
            "a",
            Declaration::Alias {
                target: "a".into(),
                from: None,
            },
        )
        .with_alias("b");
        assert_eq!(entry.exported_name(), "b");
        assert!(!entry.is_default);
    }

    #[test]
    fn test_merge_overload() {
        let mut sig = Signature::new("a: string", "string");
        sig.merge_overload(&Signature::new("a: number", "number"));
        assert_eq!(sig.params, "a: string | a: number");
        assert_eq!(sig.return_type, "string | number");
    }

    #[test]
    fn test_alias_kind_is_variable() {
        let decl = Declaration::Alias {
            target: "x".into(),
            from: None,
        };
        assert_eq!(decl.kind(), DeclKind::Variable);
        assert!(decl.is_alias());
    }

    #[test]
    fn test_decl_kind_round_trip_names() {
        for kind in [DeclKind::Function, DeclKind::TypeAlias, DeclKind::Json] {
            assert_eq!(DeclKind::from_str(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_import_lookup_name() {
        let named = ImportEntry::named("x", "y", "./m");
        assert_eq!(named.lookup_name(), "x");
        let default = ImportEntry::default_import("z", "./m");
        assert_eq!(default.lookup_name(), "z");
    }
}
