//! Clean command handler.

use affinity_core::{config::AppConfig, AppResult};
use clap::Args;

/// Delete the store directory
#[derive(Args, Debug)]
pub struct CleanCommand {}

impl CleanCommand {
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let store_dir = config.store_dir();
        tracing::info!("Executing clean command for {:?}", store_dir);

        affinity_store::clean(&store_dir)?;
        println!("Store {} cleaned", store_dir.display());

        Ok(())
    }
}
