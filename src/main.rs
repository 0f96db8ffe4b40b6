mod cli;

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands};
use export_lens::{ModuleEngine, Position};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "export_lens=debug"
    } else {
        "export_lens=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let engine = Arc::new(ModuleEngine::new(cli.engine_config()?));
    let json = cli.json();

    match cli.command {
        Commands::Resolve { ref specifier, ref from } => {
            cli::resolve(&engine, specifier, from, json).await?;
        }
        Commands::Exports { ref target, ref from } => {
            cli::exports(&engine, target, from.as_deref(), json).await?;
        }
        Commands::ImportAt {
            ref file,
            line,
            character,
            ref language_id,
            exports,
        } => {
            cli::import_at(
                &engine,
                file,
                Position::new(line, character),
                language_id.as_deref(),
                exports,
                json,
            )
            .await?;
        }
        Commands::Watch { ref files } => {
            cli::watch(Arc::clone(&engine), files, json).await?;
        }
    }

    Ok(())
}
