//! Affinity CLI
//!
//! Main entry point for the affinity command-line tool.
//! Builds a chunked embedding store from entity records and ranks entities
//! by similarity to a set of followed entities.

mod commands;

use affinity_core::{config::AppConfig, logging};
use anyhow::Context;
use clap::{Parser, Subcommand};
use commands::{CleanCommand, RecommendCommand, StatsCommand, VectorizeCommand, VerifyCommand};
use std::path::PathBuf;

/// Affinity - resumable embedding store and similarity ranking
#[derive(Parser, Debug)]
#[command(name = "affinity")]
#[command(about = "Resumable embedding store and similarity ranking", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "AFFINITY_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "AFFINITY_CONFIG")]
    config: Option<PathBuf>,

    /// Store directory (default: <workspace>/.affinity/store)
    #[arg(short, long, global = true, env = "AFFINITY_STORE")]
    store: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// Embedding provider (mock, ollama)
    #[arg(short, long, global = true, env = "AFFINITY_PROVIDER")]
    provider: Option<String>,

    /// Embedding model identifier
    #[arg(short, long, global = true, env = "AFFINITY_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Embed entities that are not in the store yet
    Vectorize(VectorizeCommand),

    /// Rank stored entities by similarity to a set of entities
    Recommend(RecommendCommand),

    /// Show store statistics
    Stats(StatsCommand),

    /// Check store invariants
    Verify(VerifyCommand),

    /// Delete the store
    Clean(CleanCommand),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    let mut config = AppConfig::load().context("Failed to load configuration")?;
    if let Some(path) = &cli.config {
        config = config.merge_yaml(path)?;
    }

    let config = config.with_overrides(
        cli.workspace,
        cli.config,
        cli.store,
        cli.provider,
        cli.model,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );

    logging::init_logging(config.log_level.as_deref(), config.no_color)?;

    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Store: {:?}", config.store_dir());
    tracing::debug!(
        "Embedding: {}/{} ({} dims)",
        config.embedding.provider,
        config.embedding.model,
        config.embedding.dimensions
    );

    let command_name = match &cli.command {
        Commands::Vectorize(_) => "vectorize",
        Commands::Recommend(_) => "recommend",
        Commands::Stats(_) => "stats",
        Commands::Verify(_) => "verify",
        Commands::Clean(_) => "clean",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    let result = match cli.command {
        Commands::Vectorize(cmd) => cmd.execute(&config).await,
        Commands::Recommend(cmd) => cmd.execute(&config),
        Commands::Stats(cmd) => cmd.execute(&config),
        Commands::Verify(cmd) => cmd.execute(&config),
        Commands::Clean(cmd) => cmd.execute(&config),
    };

    match &result {
        Ok(_) => tracing::debug!("Command completed successfully"),
        Err(e) if e.is_retryable() => {
            tracing::error!("Command failed: {}. Re-run to resume from the last commit.", e)
        }
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result.with_context(|| format!("affinity {} failed", command_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_recommend_entities() {
        let cli = Cli::try_parse_from([
            "affinity",
            "--store",
            "/tmp/store",
            "recommend",
            "--entity",
            "a",
            "b",
            "-n",
            "5",
        ])
        .unwrap();

        assert_eq!(cli.store, Some(PathBuf::from("/tmp/store")));
        match cli.command {
            Commands::Recommend(cmd) => {
                assert_eq!(cmd.entity, vec!["a", "b"]);
                assert_eq!(cmd.num_recommend, 5);
                assert!(!cmd.include_followed);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_user_file_conflicts_with_entity() {
        let result = Cli::try_parse_from([
            "affinity",
            "recommend",
            "--user-file",
            "me.json",
            "--entity",
            "a",
        ]);
        assert!(result.is_err());
    }
}
