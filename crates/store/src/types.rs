//! Store operation option and result types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Options for the vectorize operation.
#[derive(Debug, Clone)]
pub struct VectorizeOptions {
    /// Store directory
    pub store_dir: PathBuf,

    /// Maximum entities per chunk
    pub chunk_capacity: usize,

    /// Discard the store and re-embed every entity
    pub force_reset: bool,
}

/// Statistics from a vectorize operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VectorizeStats {
    /// Entities that needed vectors at the start of the run
    pub pending: usize,

    /// Entities skipped because they were already indexed
    pub already_indexed: usize,

    /// Batches in the plan
    pub batches: usize,

    /// Chunk files written (new chunks and top-ups)
    pub chunks_written: usize,

    pub entities_embedded: usize,

    /// Calls to the embedding model
    pub model_invocations: usize,

    /// Interrupted batch found and repaired at startup, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovered: Option<String>,

    /// Duration in seconds
    pub duration_secs: f64,
}

/// Statistics for a store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub store_dir: PathBuf,

    /// Entities in the index
    pub entities: usize,

    /// Chunk ids in use (`max + 1`)
    pub chunks: u32,

    /// Entity count of the most recent chunk
    pub last_chunk_fill: Option<usize>,

    /// Vector dimension
    pub dimension: Option<usize>,

    pub provider: Option<String>,
    pub model: Option<String>,

    /// When the store was first filled
    pub created_at: Option<DateTime<Utc>>,

    /// Size of the store directory in bytes
    pub disk_bytes: u64,

    /// An interrupted batch is waiting for recovery
    pub pending_commit: bool,
}

/// Result of checking a store's invariants.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerifyReport {
    pub chunks_checked: usize,
    pub entities_checked: usize,

    /// One line per violated invariant
    pub violations: Vec<String>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }

    pub(crate) fn violation(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("Store invariant violated: {}", message);
        self.violations.push(message);
    }
}
