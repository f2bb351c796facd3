//! Recommend command handler.

use super::print_json;
use affinity_core::{config::AppConfig, AppError, AppResult};
use affinity_store::load_followers;
use clap::Args;
use std::path::PathBuf;

/// Rank stored entities by similarity to the entities a user follows
#[derive(Args, Debug)]
pub struct RecommendCommand {
    /// User record with a `followers` list
    #[arg(long, conflicts_with = "entity")]
    pub user_file: Option<PathBuf>,

    /// Entity ids to aggregate (repeatable)
    #[arg(long, num_args = 1..)]
    pub entity: Vec<String>,

    /// Number of results to print
    #[arg(short = 'n', long, default_value = "10")]
    pub num_recommend: usize,

    /// Keep the query entities in the ranking
    #[arg(long)]
    pub include_followed: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl RecommendCommand {
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let (user, entities) = match &self.user_file {
            Some(path) => {
                let followers = load_followers(path)?;
                (followers.screen_name, followers.entities)
            }
            None => (None, self.entity.clone()),
        };

        if entities.is_empty() {
            return Err(AppError::Config(
                "Nothing to query: pass --user-file or at least one --entity".to_string(),
            ));
        }

        tracing::info!(
            "Executing recommend command for {} entities{}",
            entities.len(),
            user.as_deref().map(|u| format!(" (user {})", u)).unwrap_or_default()
        );

        let sims = affinity_store::recommend(&config.store_dir(), &entities)?;
        let exclude: &[String] = if self.include_followed { &[] } else { &entities };
        let ranked = sims.ranked(Some(self.num_recommend), exclude);

        if self.json {
            print_json(&serde_json::json!({
                "user": user,
                "query": entities,
                "scanned": sims.len(),
                "recommendations": ranked,
            }))?;
        } else if ranked.is_empty() {
            println!("No recommendations (scanned {} entities)", sims.len());
        } else {
            for (rank, item) in ranked.iter().enumerate() {
                println!("{:>3}. {:<32} {:.4}", rank + 1, item.entity, item.score);
            }
        }

        Ok(())
    }
}
