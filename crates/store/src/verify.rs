//! Offline invariant check of a store.
//!
//! Reads every chunk on disk and cross-checks it against the index. Problems
//! are collected into a [`VerifyReport`]; nothing is repaired.

use crate::chunk::matrix::l2_norm;
use crate::chunk::Chunk;
use crate::commit::CommitMarker;
use crate::embeddings::EmbeddingConfig;
use crate::index::ChunkIndex;
use crate::layout::StoreLayout;
use crate::types::VerifyReport;
use affinity_core::{AppError, AppResult};
use std::collections::HashMap;
use std::path::Path;

/// Stored rows must be unit length within this tolerance.
const NORM_TOLERANCE: f32 = 1e-4;

/// Check the capacity invariant, index completeness in both directions,
/// unit norms and a uniform dimension.
///
/// Only I/O failures and a missing store are returned as errors; everything
/// else is reported as a violation.
pub fn verify(store_dir: &Path, capacity: usize) -> AppResult<VerifyReport> {
    let layout = StoreLayout::new(store_dir);
    if !layout.exists() {
        return Err(AppError::Config(format!(
            "Store does not exist: {:?}",
            store_dir
        )));
    }

    let mut report = VerifyReport::default();

    if let Some(marker) = CommitMarker::read(&layout)? {
        report.violation(format!(
            "Pending commit marker for chunk {}; run vectorize to recover",
            marker.chunk_id
        ));
    }

    let index = match ChunkIndex::load(&layout) {
        Ok(index) => index,
        Err(e) => {
            report.violation(format!("Index unreadable: {}", e));
            return Ok(report);
        }
    };

    let fingerprint = EmbeddingConfig::load(&layout).ok().flatten();
    let mut dimension = fingerprint.map(|f| f.dimensions);

    let chunk_ids = layout.chunk_ids_on_disk()?;
    let last_id = chunk_ids.last().copied();
    // entity -> chunk ids listing it
    let mut listed: HashMap<String, Vec<u32>> = HashMap::new();

    for &chunk_id in &chunk_ids {
        let chunk = match Chunk::load(&layout, chunk_id) {
            Ok(Some(chunk)) => chunk,
            Ok(None) => continue,
            Err(e) => {
                report.violation(format!("Chunk {}: {}", chunk_id, e));
                continue;
            }
        };
        report.chunks_checked += 1;

        let fill = chunk.len();
        if Some(chunk_id) == last_id {
            if fill > capacity {
                report.violation(format!(
                    "Last chunk {} holds {} entities, capacity is {}",
                    chunk_id, fill, capacity
                ));
            }
        } else if fill != capacity {
            report.violation(format!(
                "Chunk {} holds {} entities but is not the last chunk (capacity {})",
                chunk_id, fill, capacity
            ));
        }

        match dimension {
            Some(dim) if dim != chunk.dim() => report.violation(format!(
                "Chunk {} has dimension {}, store dimension is {}",
                chunk_id,
                chunk.dim(),
                dim
            )),
            Some(_) => {}
            None => dimension = Some(chunk.dim()),
        }

        for (row, entity) in chunk.meta().entities.iter().enumerate() {
            report.entities_checked += 1;
            listed.entry(entity.clone()).or_default().push(chunk_id);

            let norm = l2_norm(chunk.vectors().row(row));
            if (norm - 1.0).abs() > NORM_TOLERANCE {
                report.violation(format!(
                    "Entity '{}' in chunk {} has norm {:.6}",
                    entity, chunk_id, norm
                ));
            }

            match index.get(entity) {
                Some(owner) if owner == chunk_id => {}
                Some(owner) => report.violation(format!(
                    "Chunk {} lists '{}' but the index places it in chunk {}",
                    chunk_id, entity, owner
                )),
                None => report.violation(format!(
                    "Chunk {} lists '{}' but the index does not",
                    chunk_id, entity
                )),
            }
        }
    }

    for (entity, chunk_id) in index.iter() {
        match listed.get(entity).map(Vec::as_slice) {
            None | Some([]) => report.violation(format!(
                "Index places '{}' in chunk {} but no chunk lists it",
                entity, chunk_id
            )),
            Some([_]) => {}
            Some(owners) => report.violation(format!(
                "'{}' is listed by {} chunks: {:?}",
                entity,
                owners.len(),
                owners
            )),
        }
    }

    tracing::info!(
        chunks = report.chunks_checked,
        entities = report.entities_checked,
        violations = report.violations.len(),
        "Verified store {:?}",
        store_dir
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{ChunkMeta, Matrix};
    use tempfile::TempDir;

    fn commit(layout: &StoreLayout, index: &mut ChunkIndex, id: u32, entities: &[&str]) {
        let rows = entities.iter().map(|_| vec![0.6, 0.8]).collect();
        let meta = ChunkMeta {
            id,
            entities: entities.iter().map(|e| e.to_string()).collect(),
            features: Vec::new(),
        };
        Chunk::new(meta, Matrix::from_rows(rows, 2).unwrap())
            .unwrap()
            .write(layout)
            .unwrap();
        index.assign(entities, id);
        index.persist(layout).unwrap();
    }

    #[test]
    fn test_healthy_store() {
        let temp = TempDir::new().unwrap();
        let layout = StoreLayout::new(temp.path());
        let mut index = ChunkIndex::new();
        commit(&layout, &mut index, 0, &["a", "b"]);
        commit(&layout, &mut index, 1, &["c"]);

        let report = verify(temp.path(), 2).unwrap();
        assert!(report.is_ok(), "{:?}", report.violations);
        assert_eq!(report.chunks_checked, 2);
        assert_eq!(report.entities_checked, 3);
    }

    #[test]
    fn test_reports_short_middle_chunk_and_unindexed_entity() {
        let temp = TempDir::new().unwrap();
        let layout = StoreLayout::new(temp.path());
        let mut index = ChunkIndex::new();
        commit(&layout, &mut index, 0, &["a"]);
        commit(&layout, &mut index, 1, &["b", "c"]);

        let mut partial = ChunkIndex::new();
        partial.assign(&["a", "b"], 0);
        partial.assign(&["b"], 1);
        partial.persist(&layout).unwrap();

        let report = verify(temp.path(), 2).unwrap();
        assert!(!report.is_ok());
        assert!(report.violations.iter().any(|v| v.contains("not the last chunk")));
        assert!(report.violations.iter().any(|v| v.contains("'c' but the index does not")));
    }

    #[test]
    fn test_reports_zero_row() {
        let temp = TempDir::new().unwrap();
        let layout = StoreLayout::new(temp.path());
        let meta = ChunkMeta {
            id: 0,
            entities: vec!["a".to_string(), "b".to_string()],
            features: Vec::new(),
        };
        Chunk::new(meta, Matrix::from_rows(vec![vec![0.6, 0.8], vec![0.0, 0.0]], 2).unwrap())
            .unwrap()
            .write(&layout)
            .unwrap();
        let mut index = ChunkIndex::new();
        index.assign(&["a", "b"], 0);
        index.persist(&layout).unwrap();

        let report = verify(temp.path(), 2).unwrap();
        assert_eq!(report.violations.len(), 1);
        assert!(report.violations[0].contains("'b' in chunk 0 has norm"));
    }

    #[test]
    fn test_missing_store_is_config_error() {
        let temp = TempDir::new().unwrap();
        let result = verify(&temp.path().join("none"), 2);
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
