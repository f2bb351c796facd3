//! Stats command handler.

use super::print_json;
use affinity_core::{config::AppConfig, AppResult};
use clap::Args;

/// Show store statistics
#[derive(Args, Debug)]
pub struct StatsCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatsCommand {
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing stats command");

        let stats = affinity_store::stats(&config.store_dir())?;

        if self.json {
            return print_json(&stats);
        }

        println!("Store: {}", stats.store_dir.display());
        println!("  Entities: {}", stats.entities);
        println!("  Chunks: {}", stats.chunks);
        if let Some(fill) = stats.last_chunk_fill {
            println!("  Last chunk fill: {}", fill);
        }
        if let Some(dim) = stats.dimension {
            println!("  Dimension: {}", dim);
        }
        if let (Some(provider), Some(model)) = (&stats.provider, &stats.model) {
            println!("  Model: {}/{}", provider, model);
        }
        if let Some(created) = stats.created_at {
            println!("  Created: {}", created);
        }
        println!("  Disk size: {} bytes", stats.disk_bytes);
        if stats.pending_commit {
            println!("  Pending commit: yes (run vectorize to recover)");
        }

        Ok(())
    }
}
