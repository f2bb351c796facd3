//! Chunked, resumable embedding store.
//!
//! Entity vectors live in fixed-capacity chunk files tracked by a durable
//! entity → chunk index. Ingestion can be interrupted and re-run at any
//! point; queries aggregate entity vectors and score them against the whole
//! store.

pub mod chunk;
pub mod commit;
pub mod driver;
pub mod embeddings;
pub mod features;
pub mod fsio;
pub mod index;
pub mod layout;
pub mod planner;
pub mod progress;
pub mod query;
pub mod state;
pub mod types;
pub mod verify;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use embeddings::{create_provider, EmbeddingConfig, EmbeddingProvider};
pub use features::{load_followers, DirectoryFeatures, FeatureProvider, FeatureSet, StaticFeatures};
pub use progress::{ProgressEvent, ProgressReporter};
pub use query::{recommend, QueryCache, RankedEntity, Similarities};
pub use types::{StoreStats, VectorizeOptions, VectorizeStats, VerifyReport};
pub use verify::verify;

use affinity_core::{AppError, AppResult};
use chrono::Utc;
use commit::{CommitMarker, Recovery};
use driver::VectorizationDriver;
use index::ChunkIndex;
use layout::StoreLayout;
use state::StoreState;
use std::path::Path;
use std::time::Instant;

/// Embed every entity of `features` that the store does not hold yet.
///
/// Resumes where an earlier run stopped: entities already in the index are
/// skipped and an under-capacity last chunk is topped up first. With
/// `force_reset` the store directory is wiped and everything is re-embedded.
pub async fn vectorize(
    options: VectorizeOptions,
    provider: &dyn EmbeddingProvider,
    features: &dyn FeatureProvider,
    progress: &ProgressReporter,
) -> AppResult<VectorizeStats> {
    let start = Instant::now();

    if options.chunk_capacity == 0 {
        return Err(AppError::Config(
            "Chunk capacity must be greater than zero".to_string(),
        ));
    }

    tracing::info!(
        "Starting vectorize into {:?} (capacity {}, provider {}/{})",
        options.store_dir,
        options.chunk_capacity,
        provider.provider_name(),
        provider.model_name()
    );

    let features = features.load_features()?;
    let layout = StoreLayout::new(&options.store_dir);

    if options.force_reset {
        tracing::info!("Force reset requested, discarding existing store");
        clean(&options.store_dir)?;
    }
    layout.ensure()?;

    // Refuse a model of another dimension before any invocation
    let current = EmbeddingConfig::from_provider(provider);
    let fingerprint = EmbeddingConfig::load(&layout)?;
    if let Some(stored) = &fingerprint {
        stored.validate_consistency(&current)?;
    }

    let mut index = ChunkIndex::load(&layout)?;
    let recovery = commit::recover_pending_commit(&layout, &mut index)?;

    let state = StoreState::inspect(&layout, &index, options.chunk_capacity)?;
    if let Some(dim) = state.dimension {
        if dim != provider.dimensions() {
            return Err(AppError::Consistency(format!(
                "Store holds {}-dimensional vectors but provider '{}' produces {}",
                dim,
                provider.provider_name(),
                provider.dimensions()
            )));
        }
    }

    let plan = planner::plan_batches(
        &features,
        &index,
        state,
        options.chunk_capacity,
        options.force_reset,
    )?;
    progress.plan(plan.pending, plan.batches.len());

    let mut stats = VectorizeStats {
        pending: plan.pending,
        already_indexed: plan.already_indexed,
        batches: plan.batches.len(),
        recovered: (recovery != Recovery::Clean).then(|| format!("{:?}", recovery)),
        ..Default::default()
    };

    if plan.is_empty() {
        tracing::info!(
            "Store is up to date: {} entities already indexed",
            plan.already_indexed
        );
        stats.duration_secs = start.elapsed().as_secs_f64();
        return Ok(stats);
    }

    if fingerprint.is_none() {
        EmbeddingConfig {
            created_at: Some(Utc::now()),
            ..current
        }
        .save(&layout)?;
    }

    let driver =
        VectorizationDriver::new(&layout, provider, progress, provider.dimensions());
    let outcome = driver.run(plan, &mut index).await?;

    stats.chunks_written = outcome.batches_committed;
    stats.entities_embedded = outcome.entities_embedded;
    stats.model_invocations = outcome.model_invocations;
    stats.duration_secs = start.elapsed().as_secs_f64();

    tracing::info!(
        "Vectorize completed: {} entities in {} chunks ({} skipped) in {:.2}s",
        stats.entities_embedded,
        stats.chunks_written,
        stats.already_indexed,
        stats.duration_secs
    );

    Ok(stats)
}

/// Remove the store directory. A missing store is not an error.
pub fn clean(store_dir: &Path) -> AppResult<()> {
    if !store_dir.exists() {
        tracing::debug!("Nothing to clean at {:?}", store_dir);
        return Ok(());
    }

    tracing::info!("Cleaning store {:?}", store_dir);
    std::fs::remove_dir_all(store_dir)?;
    Ok(())
}

/// Get statistics for a store.
pub fn stats(store_dir: &Path) -> AppResult<StoreStats> {
    let layout = StoreLayout::new(store_dir);
    if !layout.exists() {
        return Err(AppError::Config(format!(
            "Store does not exist: {:?}. Run 'affinity vectorize' first.",
            store_dir
        )));
    }

    let index = ChunkIndex::load(&layout)?;
    let fingerprint = EmbeddingConfig::load(&layout)?;

    let (last_chunk_fill, dimension) = match index.max_chunk_id() {
        Some(last_id) => {
            let fill = chunk::ChunkMeta::read(&layout, last_id)?.map(|m| m.len());
            let dim = chunk::read_vectors(&layout, last_id)?.map(|m| m.dim());
            (fill, dim)
        }
        None => (None, None),
    };

    Ok(StoreStats {
        store_dir: store_dir.to_path_buf(),
        entities: index.len(),
        chunks: index.max_chunk_id().map_or(0, |id| id + 1),
        last_chunk_fill,
        dimension: dimension.or(fingerprint.as_ref().map(|f| f.dimensions)),
        provider: fingerprint.as_ref().map(|f| f.provider.clone()),
        model: fingerprint.as_ref().map(|f| f.model.clone()),
        created_at: fingerprint.and_then(|f| f.created_at),
        disk_bytes: layout.disk_bytes()?,
        pending_commit: CommitMarker::read(&layout)?.is_some(),
    })
}
