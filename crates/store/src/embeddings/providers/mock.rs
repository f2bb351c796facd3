//! Deterministic offline embedding provider.

use crate::embeddings::provider::EmbeddingProvider;
use affinity_core::AppResult;

/// Mock provider for tests and offline runs.
///
/// Hashes overlapping character trigrams into buckets. Works on text without
/// word boundaries (e.g. Chinese posts) because it never splits on
/// whitespace. Output is *not* normalized; the store normalizes every vector
/// before writing it. Every input, empty text included, yields a non-zero
/// vector.
#[derive(Debug)]
pub struct MockProvider {
    dimensions: usize,
}

impl MockProvider {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0; self.dimensions];
        if self.dimensions == 0 {
            return embedding;
        }

        let chars: Vec<char> = text
            .chars()
            .flat_map(char::to_lowercase)
            .filter(|c| !c.is_whitespace())
            .collect();

        // Short and empty inputs still get a signal from their whole content
        if chars.len() < 3 {
            embedding[bucket(&chars, self.dimensions)] += 1.0;
        }

        for window in chars.windows(3) {
            embedding[bucket(window, self.dimensions)] += 1.0;
        }

        embedding
    }
}

/// FNV-1a over the chars of `gram`, reduced to a bucket index.
fn bucket(gram: &[char], dimensions: usize) -> usize {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for c in gram {
        hash ^= *c as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    (hash % dimensions as u64) as usize
}

#[async_trait::async_trait]
impl EmbeddingProvider for MockProvider {
    fn provider_name(&self) -> &str {
        "mock"
    }

    fn model_name(&self) -> &str {
        "trigram-v1"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}
