//! Runs that start from a store left behind by an interrupted batch.

use super::{features, run, CountingProvider};
use crate::chunk::{self, Chunk, ChunkMeta, Matrix};
use crate::commit::CommitMarker;
use crate::index::ChunkIndex;
use crate::layout::StoreLayout;
use crate::{recommend, verify};
use tempfile::TempDir;

const DIM: usize = 16;

/// Store with chunk 0 = [A, B] and chunk 1 = [C], capacity 2.
async fn base_store(temp: &TempDir) -> StoreLayout {
    run(temp.path(), &features(&["A", "B", "C"]), &CountingProvider::new(DIM), 2)
        .await
        .unwrap();
    StoreLayout::new(temp.path())
}

/// Chunk 1 as the top-up with D would have written it.
fn topped_up(layout: &StoreLayout) -> Chunk {
    let mut chunk = Chunk::load(layout, 1).unwrap().unwrap();
    let mut d = vec![0.0; DIM];
    d[0] = 1.0;
    chunk
        .extend(
            vec!["D".to_string()],
            vec!["D text".to_string()],
            &Matrix::from_rows(vec![d], DIM).unwrap(),
        )
        .unwrap();
    chunk
}

fn marker_for_top_up(layout: &StoreLayout) {
    CommitMarker {
        chunk_id: 1,
        entities: vec!["C".to_string(), "D".to_string()],
    }
    .write(layout)
    .unwrap();
}

#[tokio::test]
async fn test_crash_before_index_update_rolls_forward() {
    let temp = TempDir::new().unwrap();
    let layout = base_store(&temp).await;

    marker_for_top_up(&layout);
    topped_up(&layout).write(&layout).unwrap();

    let provider = CountingProvider::new(DIM);
    let stats = run(temp.path(), &features(&["A", "B", "C", "D"]), &provider, 2)
        .await
        .unwrap();

    assert!(stats.recovered.as_deref().unwrap().contains("RolledForward"));
    assert_eq!(provider.calls(), 0);
    assert_eq!(ChunkIndex::load(&layout).unwrap().get("D"), Some(1));
    assert_eq!(ChunkMeta::read(&layout, 1).unwrap().unwrap().entities, vec!["C", "D"]);
    assert!(verify(temp.path(), 2).unwrap().is_ok());
}

#[tokio::test]
async fn test_crash_between_file_renames_rolls_back() {
    let temp = TempDir::new().unwrap();
    let layout = base_store(&temp).await;

    marker_for_top_up(&layout);
    chunk::write_vectors(&layout, 1, topped_up(&layout).vectors()).unwrap();

    let provider = CountingProvider::new(DIM);
    let stats = run(temp.path(), &features(&["A", "B", "C", "D"]), &provider, 2)
        .await
        .unwrap();

    assert!(stats.recovered.as_deref().unwrap().contains("RolledBack"));
    assert_eq!(provider.calls(), 1);

    // No duplicate row for D
    let chunk = Chunk::load(&layout, 1).unwrap().unwrap();
    assert_eq!(chunk.meta().entities, vec!["C", "D"]);
    assert_eq!(chunk.vectors().rows(), 2);
    assert!(verify(temp.path(), 2).unwrap().is_ok());
}

#[tokio::test]
async fn test_crash_before_chunk_write_discards_marker() {
    let temp = TempDir::new().unwrap();
    let layout = base_store(&temp).await;
    let chunk1 = std::fs::read(layout.chunk_vectors_path(1)).unwrap();

    marker_for_top_up(&layout);
    let report = verify(temp.path(), 2).unwrap();
    assert!(report.violations.iter().any(|v| v.contains("Pending commit marker")));
    assert!(crate::stats(temp.path()).unwrap().pending_commit);

    let provider = CountingProvider::new(DIM);
    let stats = run(temp.path(), &features(&["A", "B", "C"]), &provider, 2)
        .await
        .unwrap();

    assert!(stats.recovered.as_deref().unwrap().contains("Discarded"));
    assert_eq!(provider.calls(), 0);
    assert_eq!(std::fs::read(layout.chunk_vectors_path(1)).unwrap(), chunk1);
    assert!(CommitMarker::read(&layout).unwrap().is_none());
}

#[tokio::test]
async fn test_reader_ignores_uncommitted_rows() {
    let temp = TempDir::new().unwrap();
    let layout = base_store(&temp).await;

    marker_for_top_up(&layout);
    topped_up(&layout).write(&layout).unwrap();

    let sims = recommend(temp.path(), &["A"]).unwrap();
    assert_eq!(sims.entities, vec!["A", "B", "C"]);
    assert!(sims.get("D").is_none());
}

#[tokio::test]
async fn test_reader_tolerates_vectors_ahead_of_metadata() {
    let temp = TempDir::new().unwrap();
    let layout = base_store(&temp).await;
    let before = recommend(temp.path(), &["A"]).unwrap();

    // Crash between the vector rename and the metadata rename
    marker_for_top_up(&layout);
    chunk::write_vectors(&layout, 1, topped_up(&layout).vectors()).unwrap();

    let during = recommend(temp.path(), &["A"]).unwrap();
    assert_eq!(during.entities, vec!["A", "B", "C"]);
    assert_eq!(during.sims, before.sims);

    let from_c = recommend(temp.path(), &["C"]).unwrap();
    assert_eq!(from_c.get("C").map(|s| (s - 1.0).abs() < 1e-5), Some(true));
    assert!(from_c.get("D").is_none());
}
