//! Chunks: immutable storage units of entity vectors.
//!
//! A chunk is a metadata file plus a vector matrix file sharing one id.
//! The only mutation ever applied to a written chunk is a top-up of the most
//! recent, under-capacity chunk, which rewrites both files in place.

pub mod matrix;
pub mod metadata;
pub mod reader;

pub use matrix::Matrix;
pub use metadata::ChunkMeta;
pub use reader::LoadedChunk;

use crate::fsio;
use crate::layout::StoreLayout;
use affinity_core::{AppError, AppResult};

/// Chunk metadata together with its vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    meta: ChunkMeta,
    vectors: Matrix,
}

impl Chunk {
    /// Pair metadata with vectors, enforcing one row per entity.
    pub fn new(meta: ChunkMeta, vectors: Matrix) -> AppResult<Self> {
        if meta.len() != vectors.rows() {
            return Err(AppError::Consistency(format!(
                "Chunk {} lists {} entities but holds {} vectors",
                meta.id,
                meta.len(),
                vectors.rows()
            )));
        }
        Ok(Self { meta, vectors })
    }

    pub fn id(&self) -> u32 {
        self.meta.id
    }

    pub fn len(&self) -> usize {
        self.meta.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meta.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.vectors.dim()
    }

    pub fn meta(&self) -> &ChunkMeta {
        &self.meta
    }

    pub fn vectors(&self) -> &Matrix {
        &self.vectors
    }

    /// Append entities after the existing rows, keeping prior rows first.
    pub fn extend(
        &mut self,
        entities: Vec<String>,
        features: Vec<String>,
        vectors: &Matrix,
    ) -> AppResult<()> {
        if entities.len() != vectors.rows() {
            return Err(AppError::Consistency(format!(
                "Cannot extend chunk {} with {} entities and {} vectors",
                self.id(),
                entities.len(),
                vectors.rows()
            )));
        }
        self.vectors.append(vectors)?;

        // Keep the audit column parallel even if the prior version had none
        if self.meta.features.len() != self.meta.entities.len() {
            self.meta.features = vec![String::new(); self.meta.entities.len()];
        }
        self.meta.entities.extend(entities);
        self.meta.features.extend(features);
        Ok(())
    }

    /// Load chunk `chunk_id`. Returns `None` when neither file exists.
    pub fn load(layout: &StoreLayout, chunk_id: u32) -> AppResult<Option<Self>> {
        let meta = ChunkMeta::read(layout, chunk_id)?;
        let vectors = read_vectors(layout, chunk_id)?;

        match (meta, vectors) {
            (None, None) => Ok(None),
            (Some(meta), Some(vectors)) => Self::new(meta, vectors).map(Some),
            (Some(_), None) => Err(AppError::Consistency(format!(
                "Chunk {} has metadata but no vector file",
                chunk_id
            ))),
            (None, Some(_)) => Err(AppError::Consistency(format!(
                "Chunk {} has a vector file but no metadata",
                chunk_id
            ))),
        }
    }

    /// Write both files, each atomically.
    ///
    /// Vectors go first: if the process dies between the two renames the
    /// matrix has extra trailing rows that recovery can truncate away.
    pub fn write(&self, layout: &StoreLayout) -> AppResult<()> {
        let bytes = self.vectors.to_bytes()?;
        fsio::write_atomic(&layout.chunk_vectors_path(self.id()), &bytes)?;
        self.meta.write(layout)?;

        tracing::debug!(
            chunk_id = self.id(),
            entities = self.len(),
            dim = self.dim(),
            "Wrote chunk"
        );
        Ok(())
    }
}

/// Read the vector matrix of `chunk_id`, or `None` if the file does not exist.
pub fn read_vectors(layout: &StoreLayout, chunk_id: u32) -> AppResult<Option<Matrix>> {
    match fsio::read_optional(&layout.chunk_vectors_path(chunk_id))? {
        Some(bytes) => Matrix::from_bytes(&bytes).map(Some),
        None => Ok(None),
    }
}

/// Replace only the vector file of `chunk_id`.
pub fn write_vectors(layout: &StoreLayout, chunk_id: u32, vectors: &Matrix) -> AppResult<()> {
    fsio::write_atomic(&layout.chunk_vectors_path(chunk_id), &vectors.to_bytes()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn meta(id: u32, entities: &[&str]) -> ChunkMeta {
        ChunkMeta {
            id,
            entities: entities.iter().map(|e| e.to_string()).collect(),
            features: entities.iter().map(|e| format!("text of {}", e)).collect(),
        }
    }

    #[test]
    fn test_new_enforces_row_count() {
        let vectors = Matrix::from_rows(vec![vec![1.0, 0.0]], 2).unwrap();
        let result = Chunk::new(meta(0, &["a", "b"]), vectors);
        assert!(matches!(result, Err(AppError::Consistency(_))));
    }

    #[test]
    fn test_write_and_load() {
        let temp = TempDir::new().unwrap();
        let layout = StoreLayout::new(temp.path());

        let vectors = Matrix::from_rows(vec![vec![1.0, 0.0], vec![0.0, 1.0]], 2).unwrap();
        let chunk = Chunk::new(meta(0, &["a", "b"]), vectors).unwrap();
        chunk.write(&layout).unwrap();

        let loaded = Chunk::load(&layout, 0).unwrap().unwrap();
        assert_eq!(loaded, chunk);
        assert!(Chunk::load(&layout, 1).unwrap().is_none());
    }

    #[test]
    fn test_extend_keeps_prior_rows_first() {
        let vectors = Matrix::from_rows(vec![vec![1.0, 0.0]], 2).unwrap();
        let mut chunk = Chunk::new(meta(1, &["c"]), vectors).unwrap();

        let more = Matrix::from_rows(vec![vec![0.0, 1.0]], 2).unwrap();
        chunk
            .extend(vec!["d".to_string()], vec!["text of d".to_string()], &more)
            .unwrap();

        assert_eq!(chunk.meta().entities, vec!["c", "d"]);
        assert_eq!(chunk.meta().features.len(), 2);
        assert_eq!(chunk.vectors().row(0), &[1.0, 0.0]);
        assert_eq!(chunk.vectors().row(1), &[0.0, 1.0]);
    }

    #[test]
    fn test_half_written_chunk_is_consistency_error() {
        let temp = TempDir::new().unwrap();
        let layout = StoreLayout::new(temp.path());
        meta(2, &["x"]).write(&layout).unwrap();

        assert!(matches!(
            Chunk::load(&layout, 2),
            Err(AppError::Consistency(_))
        ));
    }
}
