//! Store-level tests: full vectorize/query runs against a temp directory.

mod recovery;

use crate::embeddings::providers::mock::MockProvider;
use crate::embeddings::EmbeddingProvider;
use crate::features::{FeatureSet, StaticFeatures};
use crate::progress::ProgressReporter;
use crate::types::{VectorizeOptions, VectorizeStats};
use affinity_core::{AppError, AppResult};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Mock provider that counts model invocations.
#[derive(Debug)]
pub(crate) struct CountingProvider {
    inner: MockProvider,
    calls: AtomicUsize,
}

impl CountingProvider {
    pub(crate) fn new(dimensions: usize) -> Self {
        Self {
            inner: MockProvider::new(dimensions),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for CountingProvider {
    fn provider_name(&self) -> &str {
        self.inner.provider_name()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.embed_batch(texts).await
    }
}

/// Mock provider whose `fail_on`-th call (1-based) errors.
#[derive(Debug)]
pub(crate) struct FailingProvider {
    inner: MockProvider,
    fail_on: usize,
    calls: AtomicUsize,
}

impl FailingProvider {
    pub(crate) fn new(dimensions: usize, fail_on: usize) -> Self {
        Self {
            inner: MockProvider::new(dimensions),
            fail_on,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for FailingProvider {
    fn provider_name(&self) -> &str {
        self.inner.provider_name()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_on {
            return Err(AppError::Embedding("model unavailable".to_string()));
        }
        self.inner.embed_batch(texts).await
    }
}

/// Provider that reads the vector straight from the text: `"1,0,0"`.
#[derive(Debug)]
pub(crate) struct LiteralProvider {
    dimensions: usize,
}

impl LiteralProvider {
    pub(crate) fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for LiteralProvider {
    fn provider_name(&self) -> &str {
        "literal"
    }

    fn model_name(&self) -> &str {
        "csv"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        texts
            .iter()
            .map(|text| {
                text.split(',')
                    .map(|x| {
                        x.trim()
                            .parse::<f32>()
                            .map_err(|e| AppError::Embedding(e.to_string()))
                    })
                    .collect()
            })
            .collect()
    }
}

pub(crate) fn features(ids: &[&str]) -> StaticFeatures {
    StaticFeatures(
        ids.iter()
            .map(|id| (*id, format!("{} writes about topic {}", id, id)))
            .collect::<FeatureSet>(),
    )
}

pub(crate) async fn run(
    store_dir: &Path,
    features: &StaticFeatures,
    provider: &dyn EmbeddingProvider,
    capacity: usize,
) -> AppResult<VectorizeStats> {
    let options = VectorizeOptions {
        store_dir: store_dir.to_path_buf(),
        chunk_capacity: capacity,
        force_reset: false,
    };
    crate::vectorize(options, provider, features, &ProgressReporter::noop()).await
}

/// Every file of the store with its bytes.
pub(crate) fn snapshot(store_dir: &Path) -> BTreeMap<String, Vec<u8>> {
    std::fs::read_dir(store_dir)
        .unwrap()
        .map(|entry| {
            let entry = entry.unwrap();
            (
                entry.file_name().to_string_lossy().into_owned(),
                std::fs::read(entry.path()).unwrap(),
            )
        })
        .collect()
}
