//! Query path: aggregate query vector and similarity scan.
//!
//! A query is a list of entity-ids. Their stored vectors are summed and
//! normalized into one preference vector, which is then scored against every
//! stored row. Ranking is left to the caller ([`Similarities::ranked`]).

use crate::chunk::matrix::{dot, l2_norm};
use crate::chunk::LoadedChunk;
use crate::index::ChunkIndex;
use crate::layout::StoreLayout;
use crate::progress::ProgressReporter;
use crate::state::StoreGeneration;
use affinity_core::{AppError, AppResult};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Build the normalized sum of the vectors of `entity_ids`.
///
/// Ids missing from the index are skipped. An id the index places in a chunk
/// that does not list it is a consistency error. Each chunk is loaded once.
pub fn build_query_vector<S: AsRef<str>>(
    layout: &StoreLayout,
    index: &ChunkIndex,
    entity_ids: &[S],
) -> AppResult<Vec<f32>> {
    let mut by_chunk: BTreeMap<u32, Vec<&str>> = BTreeMap::new();
    let mut skipped = 0usize;
    for id in entity_ids {
        let id = id.as_ref();
        match index.get(id) {
            Some(chunk_id) => by_chunk.entry(chunk_id).or_default().push(id),
            None => skipped += 1,
        }
    }

    if by_chunk.is_empty() {
        return Err(AppError::EmptyQuery(format!(
            "none of the {} requested entities are in the store",
            entity_ids.len()
        )));
    }

    let mut sum: Option<Vec<f32>> = None;
    for (chunk_id, ids) in &by_chunk {
        let chunk = LoadedChunk::open_required(layout, *chunk_id)?;
        let acc = sum.get_or_insert_with(|| vec![0.0; chunk.dim()]);
        if acc.len() != chunk.dim() {
            return Err(AppError::Consistency(format!(
                "Chunk {} holds {}-dimensional vectors, expected {}",
                chunk_id,
                chunk.dim(),
                acc.len()
            )));
        }

        for id in ids {
            let row = chunk.vector_of(id)?;
            for (a, x) in acc.iter_mut().zip(row) {
                *a += x;
            }
        }
    }

    let mut query = sum.unwrap_or_default();
    let norm = l2_norm(&query);
    if norm == 0.0 {
        return Err(AppError::EmptyQuery(
            "the vectors of the requested entities sum to zero".to_string(),
        ));
    }
    query.iter_mut().for_each(|x| *x /= norm);

    tracing::debug!(
        resolved = entity_ids.len() - skipped,
        skipped,
        chunks = by_chunk.len(),
        "Built aggregate query vector"
    );
    Ok(query)
}

/// Score `query` against every committed row of the store.
///
/// Chunk ids with no index entries are gaps and are skipped. Rows present in
/// a chunk but absent from the index belong to an uncommitted top-up and are
/// ignored.
pub fn scan_similarities(
    layout: &StoreLayout,
    index: &ChunkIndex,
    query: &[f32],
    progress: &ProgressReporter,
) -> AppResult<Similarities> {
    let mut result = Similarities::default();
    let Some(max_id) = index.max_chunk_id() else {
        return Ok(result);
    };
    let indexed = index.chunk_ids();
    let total = indexed.len() as u64;
    let mut scanned = 0u64;

    for chunk_id in 0..=max_id {
        if !indexed.contains(&chunk_id) {
            tracing::debug!(chunk_id, "Skipping chunk id with no index entries");
            continue;
        }

        let chunk = LoadedChunk::open_required(layout, chunk_id)?;
        if chunk.dim() != query.len() {
            return Err(AppError::Consistency(format!(
                "Chunk {} holds {}-dimensional vectors but the query has {}",
                chunk_id,
                chunk.dim(),
                query.len()
            )));
        }

        let vectors = chunk.chunk().vectors();
        for (row, entity) in chunk.entities().iter().enumerate() {
            match index.get(entity) {
                Some(owner) if owner == chunk_id => {
                    let score = dot(query, vectors.row(row)).clamp(-1.0, 1.0);
                    result.entities.push(entity.clone());
                    result.sims.push(score);
                }
                Some(owner) => {
                    return Err(AppError::Consistency(format!(
                        "Chunk {} lists '{}' but the index places it in chunk {}",
                        chunk_id, entity, owner
                    )));
                }
                None => {
                    tracing::debug!(chunk_id, entity = %entity, "Ignoring uncommitted row");
                }
            }
        }

        scanned += 1;
        progress.scan(scanned, total, chunk_id);
    }

    Ok(result)
}

/// Similarity of every stored entity to a query, in chunk then row order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Similarities {
    pub entities: Vec<String>,
    pub sims: Vec<f32>,
}

/// One row of a ranked result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedEntity {
    pub entity: String,
    pub score: f32,
}

impl Similarities {
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Score of one entity.
    pub fn get(&self, entity: &str) -> Option<f32> {
        self.entities
            .iter()
            .position(|e| e == entity)
            .map(|i| self.sims[i])
    }

    /// Sort descending by score (ties by entity-id), drop `exclude`, keep `top_n`.
    pub fn ranked<S: AsRef<str>>(&self, top_n: Option<usize>, exclude: &[S]) -> Vec<RankedEntity> {
        let exclude: HashSet<&str> = exclude.iter().map(AsRef::as_ref).collect();

        let mut ranked: Vec<RankedEntity> = self
            .entities
            .iter()
            .zip(&self.sims)
            .filter(|(entity, _)| !exclude.contains(entity.as_str()))
            .map(|(entity, score)| RankedEntity {
                entity: entity.clone(),
                score: *score,
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.entity.cmp(&b.entity))
        });

        if let Some(n) = top_n {
            ranked.truncate(n);
        }
        ranked
    }
}

/// Score every stored entity against the aggregate of `entity_ids`.
pub fn recommend<S: AsRef<str>>(store_dir: &Path, entity_ids: &[S]) -> AppResult<Similarities> {
    let layout = StoreLayout::new(store_dir);
    let index = ChunkIndex::load(&layout)?;
    recommend_with_index(&layout, &index, entity_ids)
}

fn recommend_with_index<S: AsRef<str>>(
    layout: &StoreLayout,
    index: &ChunkIndex,
    entity_ids: &[S],
) -> AppResult<Similarities> {
    let query = build_query_vector(layout, index, entity_ids)?;
    scan_similarities(layout, index, &query, &ProgressReporter::noop())
}

/// Caller-owned cache of query results.
///
/// Entries are keyed by the exact ordered id list and stamped with the store
/// generation they were computed at. A lookup whose generation differs from
/// the current one recomputes.
#[derive(Debug, Default)]
pub struct QueryCache {
    entries: HashMap<(PathBuf, Vec<String>), (StoreGeneration, Similarities)>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every cached result.
    pub fn invalidate(&mut self) {
        self.entries.clear();
    }

    /// Like [`recommend`], reusing a cached result while the store is unchanged.
    pub fn recommend<S: AsRef<str>>(
        &mut self,
        store_dir: &Path,
        entity_ids: &[S],
    ) -> AppResult<Similarities> {
        let layout = StoreLayout::new(store_dir);
        let index = ChunkIndex::load(&layout)?;
        let generation = StoreGeneration::of(&layout, &index);
        let key = (
            store_dir.to_path_buf(),
            entity_ids.iter().map(|s| s.as_ref().to_string()).collect::<Vec<_>>(),
        );

        if let Some((cached_at, result)) = self.entries.get(&key) {
            if *cached_at == generation {
                tracing::debug!(entities = key.1.len(), "Query cache hit");
                return Ok(result.clone());
            }
        }

        let result = recommend_with_index(&layout, &index, entity_ids)?;
        self.entries.insert(key, (generation, result.clone()));
        Ok(result)
    }
}
