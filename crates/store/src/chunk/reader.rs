//! Read-side view of a chunk with an entity position index.

use super::{read_vectors, Chunk, ChunkMeta};
use crate::layout::StoreLayout;
use affinity_core::{AppError, AppResult};
use std::collections::HashMap;

/// A loaded chunk plus an `entity-id -> row` map built once at load time.
#[derive(Debug)]
pub struct LoadedChunk {
    chunk: Chunk,
    positions: HashMap<String, usize>,
}

impl LoadedChunk {
    /// Build the position index. Duplicate entities are a consistency error.
    pub fn new(chunk: Chunk) -> AppResult<Self> {
        let mut positions = HashMap::with_capacity(chunk.len());
        for (row, entity) in chunk.meta().entities.iter().enumerate() {
            if positions.insert(entity.clone(), row).is_some() {
                return Err(AppError::Consistency(format!(
                    "Entity '{}' appears more than once in chunk {}",
                    entity,
                    chunk.id()
                )));
            }
        }
        Ok(Self { chunk, positions })
    }

    /// Load chunk `chunk_id`; `None` when it has no files.
    ///
    /// A top-up replaces the vector file before the metadata file, so a
    /// reader can see trailing rows the metadata does not list yet. Only the
    /// rows the metadata lists are kept. Fewer rows than entities is still an
    /// error.
    pub fn open(layout: &StoreLayout, chunk_id: u32) -> AppResult<Option<Self>> {
        let meta = ChunkMeta::read(layout, chunk_id)?;
        let vectors = read_vectors(layout, chunk_id)?;

        let chunk = match (meta, vectors) {
            (None, None) => return Ok(None),
            (Some(meta), Some(mut vectors)) => {
                if vectors.rows() > meta.len() {
                    tracing::debug!(
                        chunk_id,
                        listed = meta.len(),
                        rows = vectors.rows(),
                        "Ignoring uncommitted trailing rows"
                    );
                    vectors.truncate_rows(meta.len());
                }
                Chunk::new(meta, vectors)?
            }
            // One file without the other: let the strict loader report it
            _ => match Chunk::load(layout, chunk_id)? {
                Some(chunk) => chunk,
                None => return Ok(None),
            },
        };
        Self::new(chunk).map(Some)
    }

    /// Load a chunk the index says must exist.
    pub fn open_required(layout: &StoreLayout, chunk_id: u32) -> AppResult<Self> {
        Self::open(layout, chunk_id)?.ok_or_else(|| {
            AppError::Consistency(format!(
                "Index references chunk {} but its files are missing",
                chunk_id
            ))
        })
    }

    pub fn id(&self) -> u32 {
        self.chunk.id()
    }

    pub fn dim(&self) -> usize {
        self.chunk.dim()
    }

    pub fn chunk(&self) -> &Chunk {
        &self.chunk
    }

    pub fn entities(&self) -> &[String] {
        &self.chunk.meta().entities
    }

    pub fn row_of(&self, entity: &str) -> Option<usize> {
        self.positions.get(entity).copied()
    }

    /// Vector of an entity the index places in this chunk.
    pub fn vector_of(&self, entity: &str) -> AppResult<&[f32]> {
        let row = self.row_of(entity).ok_or_else(|| {
            AppError::Consistency(format!(
                "Index places '{}' in chunk {} but the chunk does not list it",
                entity,
                self.id()
            ))
        })?;
        Ok(self.chunk.vectors().row(row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{write_vectors, Matrix};
    use tempfile::TempDir;

    fn chunk(entities: &[&str]) -> Chunk {
        let rows = (0..entities.len())
            .map(|i| {
                let mut v = vec![0.0; 4];
                v[i % 4] = 1.0;
                v
            })
            .collect();
        Chunk::new(
            ChunkMeta {
                id: 0,
                entities: entities.iter().map(|e| e.to_string()).collect(),
                features: Vec::new(),
            },
            Matrix::from_rows(rows, 4).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_positions() {
        let loaded = LoadedChunk::new(chunk(&["a", "b", "c"])).unwrap();
        assert_eq!(loaded.row_of("c"), Some(2));
        assert_eq!(loaded.vector_of("b").unwrap(), &[0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_missing_entity_is_hard_error() {
        let loaded = LoadedChunk::new(chunk(&["a", "b"])).unwrap();
        assert_eq!(loaded.row_of("zzz"), None);
        assert!(matches!(
            loaded.vector_of("zzz"),
            Err(AppError::Consistency(_))
        ));
    }

    #[test]
    fn test_duplicate_entity_rejected() {
        assert!(LoadedChunk::new(chunk(&["a", "a"])).is_err());
    }

    #[test]
    fn test_open_drops_trailing_unlisted_rows() {
        let temp = TempDir::new().unwrap();
        let layout = StoreLayout::new(temp.path());
        let listed = chunk(&["a", "b"]);
        listed.write(&layout).unwrap();

        let mut grown = listed.vectors().clone();
        grown.push_row(&[0.0, 0.0, 0.0, 1.0]).unwrap();
        write_vectors(&layout, 0, &grown).unwrap();

        let loaded = LoadedChunk::open(&layout, 0).unwrap().unwrap();
        assert_eq!(loaded.entities(), &["a", "b"]);
        assert_eq!(loaded.chunk().vectors().rows(), 2);
        assert_eq!(loaded.vector_of("b").unwrap(), &[0.0, 1.0, 0.0, 0.0]);

        // Writers still see the mismatch
        assert!(matches!(
            Chunk::load(&layout, 0),
            Err(AppError::Consistency(_))
        ));
    }

    #[test]
    fn test_open_rejects_missing_rows() {
        let temp = TempDir::new().unwrap();
        let layout = StoreLayout::new(temp.path());
        chunk(&["a", "b"]).write(&layout).unwrap();
        write_vectors(&layout, 0, &Matrix::from_rows(vec![vec![1.0, 0.0, 0.0, 0.0]], 4).unwrap())
            .unwrap();

        assert!(matches!(
            LoadedChunk::open(&layout, 0),
            Err(AppError::Consistency(_))
        ));
    }
}
