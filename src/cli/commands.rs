use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use export_lens::import_source::{import_source, Position};
use export_lens::{EngineConfig, ExportEntry, FileWatcher, ModuleEngine, ModuleParseResult};

#[derive(Parser)]
#[command(name = "export-lens")]
#[command(about = "Resolve TypeScript/JavaScript imports and list what they export")]
#[command(version)]
#[command(after_long_help = r#"
EXAMPLES:
    # Where does an import point?
    export-lens resolve lodash/debounce --from src/main.ts

    # Exports of a module, by specifier or by path
    export-lens exports ./utils --from src/main.ts
    export-lens exports src/utils.ts

    # Import statement under a cursor (zero-based line and character)
    export-lens import-at src/main.ts --line 3 --character 12 --exports

    # Keep modules warm and report export changes
    export-lens watch src/index.ts src/api.ts

    # JSON output, debug logging
    export-lens --format json --verbose exports src/index.ts
"#)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Project root (tsconfig/jsconfig, node_modules)
    #[arg(long, global = true, default_value = ".")]
    pub root: PathBuf,

    /// Extensions probed for extension-less specifiers, in order
    #[arg(long = "ext", global = true, value_delimiter = ',')]
    pub extensions: Vec<String>,

    /// Output format: text or json
    #[arg(long, global = true, default_value = "text")]
    pub format: String,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve a specifier to a file
    Resolve {
        /// Import specifier as written in source
        specifier: String,

        /// File containing the import
        #[arg(long)]
        from: PathBuf,
    },

    /// List the exports of a module
    Exports {
        /// Module path, or a specifier when --from is given
        target: String,

        /// Resolve `target` as a specifier imported by this file
        #[arg(long)]
        from: Option<PathBuf>,
    },

    /// Show the import statement at a cursor position
    ImportAt {
        /// Document to inspect
        file: PathBuf,

        /// Zero-based line
        #[arg(long)]
        line: usize,

        /// Zero-based character within the line
        #[arg(long, default_value = "0")]
        character: usize,

        /// Editor language id; inferred from the extension when omitted
        #[arg(long)]
        language_id: Option<String>,

        /// Also list the exports of the imported module
        #[arg(long)]
        exports: bool,
    },

    /// Watch the project and report export changes of the given modules
    Watch {
        /// Modules to keep warm
        files: Vec<PathBuf>,
    },
}

impl Cli {
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let root = self
            .root
            .canonicalize()
            .with_context(|| format!("project root {} not found", self.root.display()))?;
        Ok(EngineConfig::new(root).with_extensions(self.extensions.iter().cloned()))
    }

    pub fn json(&self) -> bool {
        self.format == "json"
    }
}

/// Editor language id for a document path.
pub fn language_id_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()).unwrap_or("") {
        "ts" | "mts" | "cts" => "typescript",
        "tsx" => "typescriptreact",
        "jsx" => "javascriptreact",
        "vue" => "vue",
        _ => "javascript",
    }
}

fn absolute(engine: &ModuleEngine, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| engine.config().project_root().to_path_buf())
            .join(path)
    }
}

pub async fn resolve(engine: &ModuleEngine, specifier: &str, from: &Path, json: bool) -> Result<()> {
    let from = absolute(engine, from);
    let Some(location) = engine.resolve(specifier, &from).await else {
        bail!("Cannot resolve {} from {}", specifier, from.display());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&location)?);
    } else {
        println!("{}", location.absolute_path.display());
        if let Some(ref node_modules) = location.package_node_modules {
            println!("  package context: {}", node_modules.display());
        }
    }
    Ok(())
}

pub async fn exports(
    engine: &ModuleEngine,
    target: &str,
    from: Option<&Path>,
    json: bool,
) -> Result<()> {
    let module = match from {
        Some(from) => {
            let from = absolute(engine, from);
            engine.resolve_and_extract(target, &from).await
        }
        None => engine.parse_module(&absolute(engine, Path::new(target))).await,
    };
    let Some(module) = module else {
        bail!("No module found for {}", target);
    };

    print_module(&module, json)?;
    tracing::debug!("{:?}", engine.stats());
    Ok(())
}

pub async fn import_at(
    engine: &ModuleEngine,
    file: &Path,
    position: Position,
    language_id: Option<&str>,
    with_exports: bool,
    json: bool,
) -> Result<()> {
    let file = absolute(engine, file);
    let text = tokio::fs::read_to_string(&file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let language_id = language_id.unwrap_or_else(|| language_id_for(&file));

    let Some(found) = import_source(engine.extractor().parser(), &text, language_id, position) else {
        bail!("No import at {}:{}:{}", file.display(), position.line, position.character);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&found)?);
    } else {
        println!("Specifier: {}", found.specifier);
        println!("Imports: {}", found.imports_text.trim());
        println!("Cursor in specifier: {}", found.in_specifier);
    }

    if with_exports {
        match engine.resolve_and_extract(&found.specifier, &file).await {
            Some(module) => print_module(&module, json)?,
            None => println!("Unresolved: {}", found.specifier),
        }
    }
    Ok(())
}

pub async fn watch(engine: Arc<ModuleEngine>, files: &[PathBuf], json: bool) -> Result<()> {
    let files: Vec<PathBuf> = files.iter().map(|f| absolute(&engine, f)).collect();
    for file in &files {
        match engine.parse_module(file).await {
            Some(module) => println!("{}: {} exports", file.display(), module.exports.len()),
            None => println!("{}: not a module", file.display()),
        }
    }

    let root = engine.config().project_root().to_path_buf();
    let extensions = engine.config().extensions.clone();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    // notify delivers on a std channel; bridge it off the runtime
    let watcher = FileWatcher::new(&root, &extensions)?;
    tokio::task::spawn_blocking(move || loop {
        if let Some(events) = watcher.recv() {
            if tx.send(events).is_err() {
                break;
            }
        }
    });

    println!("Watching {} for changes...", root.display());
    while let Some(events) = rx.recv().await {
        engine.apply_file_events(&events);
        for event in &events {
            tracing::info!("Changed: {}", event.path().display());
        }

        for file in &files {
            if let Some(module) = engine.parse_module(file).await {
                if json {
                    println!("{}", serde_json::to_string(&module.export_names())?);
                } else {
                    println!("{}: {}", file.display(), module.export_names().join(", "));
                }
            }
        }
    }
    Ok(())
}

fn print_module(module: &ModuleParseResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&module.exports)?);
        return Ok(());
    }

    if module.exports.is_empty() {
        println!("No exports");
        return Ok(());
    }

    println!("Exports ({}):", module.exports.len());
    for entry in &module.exports {
        println!("  {}", describe(entry));
    }
    Ok(())
}

fn describe(entry: &ExportEntry) -> String {
    let mut line = format!("{} [{}]", entry.exported_name(), entry.kind_tags().join(", "));
    if let Some(sig) = entry.signature() {
        line.push_str(&format!(" ({}){}", sig.params, return_suffix(&sig.return_type)));
    }
    line
}

fn return_suffix(return_type: &str) -> String {
    if return_type.is_empty() {
        String::new()
    } else {
        format!(": {}", return_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use export_lens::{Declaration, Signature};

    #[test]
    fn test_language_id_for() {
        assert_eq!(language_id_for(Path::new("a.ts")), "typescript");
        assert_eq!(language_id_for(Path::new("a.tsx")), "typescriptreact");
        assert_eq!(language_id_for(Path::new("a.vue")), "vue");
        assert_eq!(language_id_for(Path::new("a.mjs")), "javascript");
    }

    #[test]
    fn test_describe() {
        let entry = ExportEntry::new(
            "run",
            Declaration::Function(Signature::new("a: number", "void")),
        )
        .as_default();
        assert_eq!(describe(&entry), "run [function, default] (a: number): void");

        let value = ExportEntry::new("x", Declaration::variable_source("const x = 1"));
        assert_eq!(describe(&value), "x [variable]");
    }

    #[test]
    fn test_cli_parses_global_options() {
        let cli = Cli::parse_from([
            "export-lens",
            "--ext",
            "ts,tsx",
            "exports",
            "./a",
            "--from",
            "src/main.ts",
            "--format",
            "json",
        ]);
        assert_eq!(cli.extensions, vec!["ts", "tsx"]);
        assert!(cli.json());
        assert!(matches!(cli.command, Commands::Exports { .. }));
    }
}
