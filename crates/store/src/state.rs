//! Store-state descriptor.
//!
//! Computed once per run from the index and the most recent chunk, then
//! handed to the planner. Nothing downstream probes the filesystem to
//! rediscover where the previous run stopped.

use crate::chunk::Chunk;
use crate::embeddings::EmbeddingConfig;
use crate::index::ChunkIndex;
use crate::layout::StoreLayout;
use affinity_core::{AppError, AppResult};
use chrono::{DateTime, Utc};
use std::time::SystemTime;

/// Id and entity count of the most recently created chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastChunk {
    pub id: u32,
    pub fill: usize,
}

/// Where the store stands before planning.
#[derive(Debug, Clone)]
pub struct StoreState {
    /// The store holds at least one committed entity.
    pub exists: bool,
    /// Chunk ids in use: `max(index) + 1`, gaps included.
    pub chunk_count: u32,
    pub last_chunk: Option<LastChunk>,
    /// Dimension established by the stored vectors.
    pub dimension: Option<usize>,
    /// The last chunk, loaded, when it is below capacity and must be topped up.
    pub tail: Option<Chunk>,
}

impl StoreState {
    /// State of an empty (or force-reset) store.
    pub fn empty() -> Self {
        Self {
            exists: false,
            chunk_count: 0,
            last_chunk: None,
            dimension: None,
            tail: None,
        }
    }

    /// Inspect the most recent chunk named by the index.
    pub fn inspect(layout: &StoreLayout, index: &ChunkIndex, capacity: usize) -> AppResult<Self> {
        let Some(last_id) = index.max_chunk_id() else {
            return Ok(Self::empty());
        };

        let chunk = Chunk::load(layout, last_id)?.ok_or_else(|| {
            AppError::Consistency(format!(
                "Index references chunk {} but its files are missing",
                last_id
            ))
        })?;

        // Every entity of the last chunk must already be committed to it.
        for entity in &chunk.meta().entities {
            if index.get(entity) != Some(last_id) {
                return Err(AppError::Consistency(format!(
                    "Chunk {} lists '{}' but the index does not point it there",
                    last_id, entity
                )));
            }
        }

        let fill = chunk.len();
        if fill > capacity {
            tracing::warn!(
                "Chunk {} holds {} entities, more than the configured capacity {}",
                last_id,
                fill,
                capacity
            );
        }

        let dimension = Some(chunk.dim());
        let tail = (fill < capacity).then_some(chunk);

        let state = Self {
            exists: true,
            chunk_count: last_id + 1,
            last_chunk: Some(LastChunk { id: last_id, fill }),
            dimension,
            tail,
        };

        tracing::debug!(
            chunk_count = state.chunk_count,
            last_fill = fill,
            incomplete = state.tail.is_some(),
            "Inspected store state"
        );
        Ok(state)
    }

    /// The last chunk is under capacity and will be topped up.
    pub fn is_incomplete(&self) -> bool {
        self.tail.is_some()
    }
}

/// Identifies a committed version of the store.
///
/// Every committed batch adds index entries or rewrites the index file, so a
/// cached query result is valid only while the generation is unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreGeneration {
    pub index_len: usize,
    pub max_chunk_id: Option<u32>,
    pub index_modified: Option<SystemTime>,
    /// Fingerprint creation time; changes whenever the store is rebuilt
    pub created_at: Option<DateTime<Utc>>,
}

impl StoreGeneration {
    pub fn of(layout: &StoreLayout, index: &ChunkIndex) -> Self {
        let index_modified = std::fs::metadata(layout.index_path())
            .and_then(|m| m.modified())
            .ok();
        let created_at = EmbeddingConfig::load(layout)
            .ok()
            .flatten()
            .and_then(|fingerprint| fingerprint.created_at);
        Self {
            index_len: index.len(),
            max_chunk_id: index.max_chunk_id(),
            index_modified,
            created_at,
        }
    }
}
