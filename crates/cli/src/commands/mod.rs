//! Command handlers for the Affinity CLI.
//!
//! Each subcommand lives in its own module. Data goes to stdout, logs to stderr.

pub mod clean;
pub mod recommend;
pub mod stats;
pub mod vectorize;
pub mod verify;

// Re-export command types for convenience
pub use clean::CleanCommand;
pub use recommend::RecommendCommand;
pub use stats::StatsCommand;
pub use vectorize::VectorizeCommand;
pub use verify::VerifyCommand;

use affinity_core::AppResult;
use serde::Serialize;

/// Print a value as pretty JSON on stdout.
pub(crate) fn print_json<T: Serialize>(value: &T) -> AppResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
