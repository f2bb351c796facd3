//! Resumable batch planner.
//!
//! Decides which entities still need vectors and how to pack them into
//! chunks. An under-capacity last chunk left by a previous run is topped up
//! before any new chunk is opened.

use crate::chunk::Chunk;
use crate::features::FeatureSet;
use crate::index::ChunkIndex;
use crate::state::StoreState;
use affinity_core::{AppError, AppResult};

/// One unit of work: the entities that will land in chunk `chunk_id`.
#[derive(Debug, Clone)]
pub struct Batch {
    pub chunk_id: u32,
    pub entity_ids: Vec<String>,
    pub features: Vec<String>,
    /// Prior contents of the chunk when this batch tops it up.
    pub carry: Option<Chunk>,
}

impl Batch {
    /// This batch extends an existing chunk instead of creating one.
    pub fn is_carry_forward(&self) -> bool {
        self.carry.is_some()
    }

    pub fn len(&self) -> usize {
        self.entity_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entity_ids.is_empty()
    }

    /// Entity list of the chunk once this batch is written.
    pub fn final_entities(&self) -> Vec<String> {
        let mut entities = self
            .carry
            .as_ref()
            .map(|c| c.meta().entities.clone())
            .unwrap_or_default();
        entities.extend(self.entity_ids.iter().cloned());
        entities
    }
}

/// Ordered batches for one run.
#[derive(Debug, Clone, Default)]
pub struct BatchPlan {
    pub batches: Vec<Batch>,
    /// Entities that need vectors.
    pub pending: usize,
    /// Entities skipped because the index already has them.
    pub already_indexed: usize,
}

impl BatchPlan {
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}

/// Plan the batches of a vectorization run.
///
/// With `force_reset` the index and state are ignored and numbering restarts
/// at chunk 0; the caller must have discarded the old chunk files.
pub fn plan_batches(
    features: &FeatureSet,
    index: &ChunkIndex,
    state: StoreState,
    capacity: usize,
    force_reset: bool,
) -> AppResult<BatchPlan> {
    if capacity == 0 {
        return Err(AppError::Config(
            "Chunk capacity must be greater than zero".to_string(),
        ));
    }

    let (pending, state): (Vec<(&str, &str)>, StoreState) = if force_reset {
        (features.iter().collect(), StoreState::empty())
    } else {
        let pending = features
            .iter()
            .filter(|(entity, _)| !index.contains(entity))
            .collect();
        (pending, state)
    };
    let already_indexed = features.len() - pending.len();

    if pending.is_empty() {
        tracing::debug!("No pending entities; nothing to plan");
        return Ok(BatchPlan {
            batches: Vec::new(),
            pending: 0,
            already_indexed,
        });
    }

    // First batch: fill the incomplete tail chunk, or open the next chunk.
    let (first_id, first_size, carry) = match (state.tail, state.last_chunk) {
        (Some(tail), _) if tail.len() < capacity => {
            let room = capacity - tail.len();
            (tail.id(), room, Some(tail))
        }
        (Some(tail), _) => (tail.id() + 1, capacity, None),
        (None, Some(last)) => (last.id + 1, capacity, None),
        (None, None) => (0, capacity, None),
    };

    let mut batches = Vec::new();
    let mut remaining = pending.as_slice();

    let take = first_size.min(remaining.len());
    let (head, rest) = remaining.split_at(take);
    batches.push(make_batch(first_id, head, carry));
    remaining = rest;

    let mut next_id = first_id + 1;
    for group in remaining.chunks(capacity) {
        batches.push(make_batch(next_id, group, None));
        next_id += 1;
    }

    tracing::info!(
        pending = pending.len(),
        already_indexed,
        batches = batches.len(),
        first_chunk = first_id,
        carry_forward = batches[0].is_carry_forward(),
        "Planned vectorization batches"
    );

    Ok(BatchPlan {
        pending: pending.len(),
        already_indexed,
        batches,
    })
}

fn make_batch(chunk_id: u32, items: &[(&str, &str)], carry: Option<Chunk>) -> Batch {
    Batch {
        chunk_id,
        entity_ids: items.iter().map(|(e, _)| e.to_string()).collect(),
        features: items.iter().map(|(_, f)| f.to_string()).collect(),
        carry,
    }
}
