//! Vectorization driver.
//!
//! Runs a [`BatchPlan`] batch by batch: embed, normalize, write the chunk,
//! then commit its entities to the index. The first failing batch halts the
//! run; every batch before it stays committed.

use crate::chunk::matrix::{l2_norm, l2_normalize};
use crate::chunk::{Chunk, ChunkMeta, Matrix};
use crate::commit::{self, CommitMarker};
use crate::embeddings::EmbeddingProvider;
use crate::index::ChunkIndex;
use crate::layout::StoreLayout;
use crate::planner::{Batch, BatchPlan};
use crate::progress::ProgressReporter;
use affinity_core::{AppError, AppResult};
use tracing::instrument;

/// Counters of one driver run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriveOutcome {
    pub batches_committed: usize,
    pub entities_embedded: usize,
    pub model_invocations: usize,
}

/// Writes planned batches into the store.
pub struct VectorizationDriver<'a> {
    layout: &'a StoreLayout,
    provider: &'a dyn EmbeddingProvider,
    progress: &'a ProgressReporter,
    /// Dimension every vector must have.
    dimension: usize,
}

impl<'a> VectorizationDriver<'a> {
    pub fn new(
        layout: &'a StoreLayout,
        provider: &'a dyn EmbeddingProvider,
        progress: &'a ProgressReporter,
        dimension: usize,
    ) -> Self {
        Self {
            layout,
            provider,
            progress,
            dimension,
        }
    }

    /// Run every batch of `plan` in order, updating `index` as batches commit.
    ///
    /// An empty plan returns immediately without touching the model.
    pub async fn run(&self, plan: BatchPlan, index: &mut ChunkIndex) -> AppResult<DriveOutcome> {
        let mut outcome = DriveOutcome::default();
        let total = plan.batches.len() as u64;

        for (n, batch) in plan.batches.into_iter().enumerate() {
            let chunk_id = batch.chunk_id;
            let size = batch.len();
            self.progress.embed(n as u64 + 1, total, chunk_id, size);

            if let Err(e) = self.commit_batch(batch, index, &mut outcome).await {
                tracing::error!(
                    chunk_id,
                    batch = n + 1,
                    committed = outcome.batches_committed,
                    "Batch failed, halting vectorization: {}",
                    e
                );
                return Err(AppError::in_batch(chunk_id, e));
            }

            outcome.batches_committed += 1;
            outcome.entities_embedded += size;
            self.progress.commit(n as u64 + 1, total, chunk_id);
        }

        Ok(outcome)
    }

    #[instrument(
        skip(self, batch, index, outcome),
        fields(chunk_id = batch.chunk_id, size = batch.len(), carry_forward = batch.is_carry_forward())
    )]
    async fn commit_batch(
        &self,
        batch: Batch,
        index: &mut ChunkIndex,
        outcome: &mut DriveOutcome,
    ) -> AppResult<()> {
        outcome.model_invocations += 1;
        let raw = self.provider.embed_batch(&batch.features).await?;
        let vectors = self.normalized_matrix(raw, batch.len())?;

        let Batch {
            chunk_id,
            entity_ids,
            features,
            carry,
        } = batch;

        let chunk = match carry {
            Some(mut prior) => {
                prior.extend(entity_ids.clone(), features, &vectors)?;
                prior
            }
            None => Chunk::new(
                ChunkMeta {
                    id: chunk_id,
                    entities: entity_ids.clone(),
                    features,
                },
                vectors,
            )?,
        };

        // Phase 0: announce the post-batch contents of the chunk
        CommitMarker {
            chunk_id,
            entities: chunk.meta().entities.clone(),
        }
        .write(self.layout)?;

        // Phase 1: replace the chunk files
        if let Err(e) = chunk.write(self.layout) {
            self.undo_partial_write(index);
            return Err(e);
        }

        // Phase 2: commit the entities
        let snapshot = index.clone();
        index.assign(&entity_ids, chunk_id);
        if let Err(e) = index.persist(self.layout) {
            *index = snapshot;
            return Err(e);
        }
        CommitMarker::clear(self.layout)?;

        tracing::debug!(chunk_id, rows = chunk.len(), "Committed chunk");
        Ok(())
    }

    /// Check the model output and L2-normalize every row.
    fn normalized_matrix(&self, raw: Vec<Vec<f32>>, expected: usize) -> AppResult<Matrix> {
        if raw.len() != expected {
            return Err(AppError::Consistency(format!(
                "Provider '{}' returned {} vectors for {} texts",
                self.provider.provider_name(),
                raw.len(),
                expected
            )));
        }

        let mut rows = Vec::with_capacity(raw.len());
        for mut vector in raw {
            if vector.len() != self.dimension {
                return Err(AppError::Consistency(format!(
                    "Provider '{}' returned a {}-dimensional vector, store dimension is {}",
                    self.provider.provider_name(),
                    vector.len(),
                    self.dimension
                )));
            }
            if l2_norm(&vector) == 0.0 {
                return Err(AppError::Embedding(format!(
                    "Provider '{}' returned a zero vector, which cannot be normalized",
                    self.provider.provider_name()
                )));
            }
            l2_normalize(&mut vector);
            rows.push(vector);
        }

        Matrix::from_rows(rows, self.dimension)
    }

    /// Bring the chunk files back to their pre-batch state after a failed write.
    fn undo_partial_write(&self, index: &mut ChunkIndex) {
        match commit::recover_pending_commit(self.layout, index) {
            Ok(recovery) => tracing::warn!(?recovery, "Reverted partially written chunk"),
            Err(e) => tracing::warn!(
                "Could not revert partial chunk write, the next run will retry: {}",
                e
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::providers::mock::MockProvider;
    use crate::features::FeatureSet;
    use crate::planner::plan_batches;
    use crate::state::StoreState;
    use tempfile::TempDir;

    fn features(ids: &[&str]) -> FeatureSet {
        ids.iter().map(|id| (*id, format!("posts about {}", id))).collect()
    }

    #[tokio::test]
    async fn test_run_commits_every_batch() {
        let temp = TempDir::new().unwrap();
        let layout = StoreLayout::new(temp.path());
        layout.ensure().unwrap();
        let provider = MockProvider::new(16);
        let progress = ProgressReporter::noop();
        let mut index = ChunkIndex::new();

        let plan = plan_batches(
            &features(&["a", "b", "c"]),
            &index,
            StoreState::empty(),
            2,
            false,
        )
        .unwrap();
        let driver = VectorizationDriver::new(&layout, &provider, &progress, 16);
        let outcome = driver.run(plan, &mut index).await.unwrap();

        assert_eq!(outcome.batches_committed, 2);
        assert_eq!(outcome.entities_embedded, 3);
        assert_eq!(outcome.model_invocations, 2);
        assert_eq!(index.get("c"), Some(1));
        assert!(CommitMarker::read(&layout).unwrap().is_none());
        assert_eq!(ChunkIndex::load(&layout).unwrap(), index);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_halts_before_write() {
        let temp = TempDir::new().unwrap();
        let layout = StoreLayout::new(temp.path());
        layout.ensure().unwrap();
        let provider = MockProvider::new(8);
        let progress = ProgressReporter::noop();
        let mut index = ChunkIndex::new();

        let plan =
            plan_batches(&features(&["a"]), &index, StoreState::empty(), 2, false).unwrap();
        let driver = VectorizationDriver::new(&layout, &provider, &progress, 16);
        let err = driver.run(plan, &mut index).await.unwrap_err();

        match err {
            AppError::Batch { chunk_id, source } => {
                assert_eq!(chunk_id, 0);
                assert!(matches!(*source, AppError::Consistency(_)));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(index.is_empty());
        assert!(!layout.chunk_vectors_path(0).exists());
    }
}
