//! Chunk metadata file (`chunk_info_NNNN.json`).

use crate::fsio;
use crate::layout::StoreLayout;
use affinity_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Metadata of one chunk.
///
/// `entities[i]` owns row `i` of the chunk's vector matrix. `features` keeps
/// the text each vector was computed from, for audit; it is parallel to
/// `entities` when present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub id: u32,
    pub entities: Vec<String>,
    #[serde(default)]
    pub features: Vec<String>,
}

impl ChunkMeta {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            entities: Vec::new(),
            features: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Read the metadata of `chunk_id`, or `None` if the file does not exist.
    pub fn read(layout: &StoreLayout, chunk_id: u32) -> AppResult<Option<Self>> {
        let path = layout.chunk_info_path(chunk_id);
        let Some(bytes) = fsio::read_optional(&path)? else {
            return Ok(None);
        };

        let meta: Self = serde_json::from_slice(&bytes).map_err(|e| {
            AppError::Serialization(format!("Failed to parse {:?}: {}", path, e))
        })?;

        if meta.id != chunk_id {
            return Err(AppError::Consistency(format!(
                "{:?} declares chunk id {}",
                path, meta.id
            )));
        }
        if !meta.features.is_empty() && meta.features.len() != meta.entities.len() {
            return Err(AppError::Consistency(format!(
                "Chunk {} lists {} entities but {} feature texts",
                chunk_id,
                meta.entities.len(),
                meta.features.len()
            )));
        }

        Ok(Some(meta))
    }

    pub fn write(&self, layout: &StoreLayout) -> AppResult<()> {
        let json = serde_json::to_vec_pretty(self)?;
        fsio::write_atomic(&layout.chunk_info_path(self.id), &json)
    }
}
