//! Vectorize command handler.

use super::print_json;
use affinity_core::{config::AppConfig, AppError, AppResult};
use affinity_store::{DirectoryFeatures, ProgressEvent, ProgressReporter, VectorizeOptions};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

/// Embed entity records into the store, resuming any earlier run
#[derive(Args, Debug)]
pub struct VectorizeCommand {
    /// Directory of entity records (`<entity>.json`)
    #[arg(long, env = "AFFINITY_SOURCE")]
    pub source: Option<PathBuf>,

    /// Entities per chunk
    #[arg(long, env = "AFFINITY_CHUNK_CAPACITY")]
    pub chunk_size: Option<usize>,

    /// Discard the store and re-embed every entity
    #[arg(long)]
    pub force_revectorize: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl VectorizeCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing vectorize command");

        let source = self
            .source
            .clone()
            .or_else(|| config.source_dir.clone())
            .ok_or_else(|| {
                AppError::Config(
                    "No source directory: pass --source or set store.source in config.yaml"
                        .to_string(),
                )
            })?;

        let mut config = config.clone();
        if let Some(size) = self.chunk_size {
            config.chunk_capacity = size;
        }
        config.validate()?;

        let provider = affinity_store::create_provider(&config.embedding).await?;
        let features = DirectoryFeatures::new(&source);
        let progress = if config.verbose && !self.json {
            ProgressReporter::new(Arc::new(|event: ProgressEvent| {
                eprintln!("{}", event.format_simple())
            }))
        } else {
            ProgressReporter::noop()
        };

        let options = VectorizeOptions {
            store_dir: config.store_dir(),
            chunk_capacity: config.chunk_capacity,
            force_reset: self.force_revectorize,
        };

        let stats =
            affinity_store::vectorize(options, provider.as_ref(), &features, &progress).await?;

        if self.json {
            print_json(&stats)?;
        } else {
            if let Some(recovered) = &stats.recovered {
                println!("Recovered interrupted batch: {}", recovered);
            }
            println!(
                "Vectorized {} entities into {} chunks ({} already stored) in {:.2}s",
                stats.entities_embedded,
                stats.chunks_written,
                stats.already_indexed,
                stats.duration_secs
            );
        }

        Ok(())
    }
}
