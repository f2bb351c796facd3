//! Verify command handler.

use super::print_json;
use affinity_core::{config::AppConfig, AppError, AppResult};
use clap::Args;

/// Check store invariants without changing anything
#[derive(Args, Debug)]
pub struct VerifyCommand {
    /// Capacity to check chunks against (default: configured chunk capacity)
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl VerifyCommand {
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing verify command");

        let capacity = self.chunk_size.unwrap_or(config.chunk_capacity);
        let report = affinity_store::verify(&config.store_dir(), capacity)?;

        if self.json {
            print_json(&report)?;
        } else {
            println!(
                "Checked {} chunks, {} entities",
                report.chunks_checked, report.entities_checked
            );
            for violation in &report.violations {
                println!("  - {}", violation);
            }
        }

        if report.is_ok() {
            Ok(())
        } else {
            Err(AppError::Consistency(format!(
                "{} invariant violations",
                report.violations.len()
            )))
        }
    }
}
