//! Write-ahead commit marker and crash recovery.
//!
//! Each batch commits in two phases:
//!
//! 1. `commit.json` records the chunk id and its full post-batch entity list,
//!    then the chunk files are replaced (vectors, then metadata).
//! 2. The index is persisted and the marker removed.
//!
//! A marker found at startup means the previous writer died mid-batch.
//! [`recover_pending_commit`] inspects the chunk files and either rolls the
//! batch forward into the index or rolls the chunk back to its prior version.

use crate::chunk::{self, ChunkMeta};
use crate::fsio;
use crate::index::ChunkIndex;
use crate::layout::StoreLayout;
use affinity_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// An in-flight batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitMarker {
    pub chunk_id: u32,
    pub entities: Vec<String>,
}

impl CommitMarker {
    pub fn read(layout: &StoreLayout) -> AppResult<Option<Self>> {
        let path = layout.commit_marker_path();
        match fsio::read_optional(&path)? {
            Some(bytes) => {
                let marker = serde_json::from_slice(&bytes).map_err(|e| {
                    AppError::Serialization(format!("Failed to parse {:?}: {}", path, e))
                })?;
                Ok(Some(marker))
            }
            None => Ok(None),
        }
    }

    pub fn write(&self, layout: &StoreLayout) -> AppResult<()> {
        fsio::write_atomic(&layout.commit_marker_path(), &serde_json::to_vec(self)?)
    }

    pub fn clear(layout: &StoreLayout) -> AppResult<()> {
        fsio::remove_if_exists(&layout.commit_marker_path())
    }
}

/// What recovery did with a leftover marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recovery {
    /// No marker: the last run finished cleanly.
    Clean,
    /// Chunk files were complete; their entities were added to the index.
    RolledForward { chunk_id: u32, entities: usize },
    /// The vector file was ahead of the metadata; it was cut back to `rows`.
    RolledBack { chunk_id: u32, rows: usize },
    /// The chunk files were never touched; the marker was dropped.
    Discarded { chunk_id: u32 },
}

/// Reconcile the store with a marker left by an interrupted batch.
pub fn recover_pending_commit(layout: &StoreLayout, index: &mut ChunkIndex) -> AppResult<Recovery> {
    let Some(marker) = CommitMarker::read(layout)? else {
        return Ok(Recovery::Clean);
    };
    let chunk_id = marker.chunk_id;

    tracing::warn!(
        chunk_id,
        entities = marker.entities.len(),
        "Found pending commit marker from an interrupted run"
    );

    let meta = ChunkMeta::read(layout, chunk_id)?;
    let vectors = chunk::read_vectors(layout, chunk_id)?;

    let recovery = match (meta, vectors) {
        // Phase 1 finished: the chunk is exactly what the batch meant to write.
        (Some(meta), Some(vectors)) if meta.entities == marker.entities => {
            if vectors.rows() != meta.len() {
                return Err(AppError::Consistency(format!(
                    "Chunk {} metadata lists {} entities but vector file holds {} rows",
                    chunk_id,
                    meta.len(),
                    vectors.rows()
                )));
            }
            let snapshot = index.clone();
            index.assign(&meta.entities, chunk_id);
            if let Err(e) = index.persist(layout) {
                *index = snapshot;
                return Err(e);
            }
            Recovery::RolledForward {
                chunk_id,
                entities: meta.len(),
            }
        }

        // Died between the two renames of a top-up: drop the extra rows.
        (Some(meta), Some(mut vectors)) if vectors.rows() > meta.len() => {
            vectors.truncate_rows(meta.len());
            chunk::write_vectors(layout, chunk_id, &vectors)?;
            Recovery::RolledBack {
                chunk_id,
                rows: meta.len(),
            }
        }

        // Died between the two renames of a brand-new chunk.
        (None, Some(_)) => {
            fsio::remove_if_exists(&layout.chunk_vectors_path(chunk_id))?;
            Recovery::RolledBack { chunk_id, rows: 0 }
        }

        _ => Recovery::Discarded { chunk_id },
    };

    CommitMarker::clear(layout)?;
    tracing::info!("Recovered interrupted batch: {:?}", recovery);
    Ok(recovery)
}
