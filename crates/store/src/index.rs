//! Chunk index: the durable mapping from entity-id to owning chunk id.
//!
//! The index is the commit point of the store. An entity counts as vectorized
//! only once the index file that names its chunk has been persisted.

use crate::fsio;
use crate::layout::StoreLayout;
use affinity_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Entity-id to chunk-id mapping, persisted as `index.json`.
///
/// Backed by a `BTreeMap` so serialization is stable: persisting an unchanged
/// index produces identical bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkIndex {
    entries: BTreeMap<String, u32>,
}

impl ChunkIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the index. A missing file yields an empty index (fresh store).
    pub fn load(layout: &StoreLayout) -> AppResult<Self> {
        let path = layout.index_path();
        let Some(bytes) = fsio::read_optional(&path)? else {
            tracing::debug!("No index at {:?}, starting empty", path);
            return Ok(Self::new());
        };

        let index: Self = serde_json::from_slice(&bytes).map_err(|e| {
            AppError::Serialization(format!("Failed to parse index {:?}: {}", path, e))
        })?;

        tracing::debug!("Loaded index with {} entities", index.len());
        Ok(index)
    }

    /// Atomically replace the index file.
    pub fn persist(&self, layout: &StoreLayout) -> AppResult<()> {
        let json = serde_json::to_vec_pretty(self)?;
        fsio::write_atomic(&layout.index_path(), &json)?;
        tracing::debug!("Persisted index with {} entities", self.len());
        Ok(())
    }

    pub fn get(&self, entity: &str) -> Option<u32> {
        self.entries.get(entity).copied()
    }

    pub fn contains(&self, entity: &str) -> bool {
        self.entries.contains_key(entity)
    }

    /// Point every entity at `chunk_id`.
    pub fn assign<S: AsRef<str>>(&mut self, entities: &[S], chunk_id: u32) {
        for entity in entities {
            self.entries.insert(entity.as_ref().to_string(), chunk_id);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Highest chunk id referenced, i.e. the most recently created chunk.
    pub fn max_chunk_id(&self) -> Option<u32> {
        self.entries.values().copied().max()
    }

    /// Distinct chunk ids referenced by the index.
    pub fn chunk_ids(&self) -> BTreeSet<u32> {
        self.entries.values().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> + '_ {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_is_empty() {
        let temp = TempDir::new().unwrap();
        let layout = StoreLayout::new(temp.path());
        let index = ChunkIndex::load(&layout).unwrap();
        assert!(index.is_empty());
        assert_eq!(index.max_chunk_id(), None);
    }

    #[test]
    fn test_persist_and_load() {
        let temp = TempDir::new().unwrap();
        let layout = StoreLayout::new(temp.path());

        let mut index = ChunkIndex::new();
        index.assign(&["alice", "bob"], 0);
        index.assign(&["carol"], 1);
        index.persist(&layout).unwrap();

        let loaded = ChunkIndex::load(&layout).unwrap();
        assert_eq!(loaded, index);
        assert_eq!(loaded.get("carol"), Some(1));
        assert_eq!(loaded.max_chunk_id(), Some(1));
        assert_eq!(loaded.chunk_ids().into_iter().collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn test_persist_is_stable() {
        let temp = TempDir::new().unwrap();
        let layout = StoreLayout::new(temp.path());

        let mut index = ChunkIndex::new();
        index.assign(&["zed", "amy", "max"], 0);
        index.persist(&layout).unwrap();
        let first = std::fs::read(layout.index_path()).unwrap();

        ChunkIndex::load(&layout).unwrap().persist(&layout).unwrap();
        let second = std::fs::read(layout.index_path()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_corrupt_index_is_error() {
        let temp = TempDir::new().unwrap();
        let layout = StoreLayout::new(temp.path());
        std::fs::write(layout.index_path(), "{not json").unwrap();
        assert!(matches!(
            ChunkIndex::load(&layout),
            Err(AppError::Serialization(_))
        ));
    }
}
