//! Embedding fingerprint of a store (`store.yaml`).

use crate::embeddings::EmbeddingProvider;
use crate::fsio;
use crate::layout::StoreLayout;
use affinity_core::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which model produced the vectors of a store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingConfig {
    /// Provider name: "mock", "ollama"
    pub provider: String,

    /// Model identifier (provider-specific)
    pub model: String,

    /// Embedding vector dimensions
    pub dimensions: usize,

    /// When the store was first filled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl EmbeddingConfig {
    /// Fingerprint of a live provider.
    pub fn from_provider(provider: &dyn EmbeddingProvider) -> Self {
        Self {
            provider: provider.provider_name().to_string(),
            model: provider.model_name().to_string(),
            dimensions: provider.dimensions(),
            created_at: None,
        }
    }

    /// Load the store's fingerprint, if one was recorded.
    pub fn load(layout: &StoreLayout) -> AppResult<Option<Self>> {
        let path = layout.fingerprint_path();
        let Some(bytes) = fsio::read_optional(&path)? else {
            return Ok(None);
        };

        let config = serde_yaml::from_slice(&bytes).map_err(|e| {
            AppError::Serialization(format!("Failed to parse {:?}: {}", path, e))
        })?;
        Ok(Some(config))
    }

    pub fn save(&self, layout: &StoreLayout) -> AppResult<()> {
        let yaml = serde_yaml::to_string(self)?;
        fsio::write_atomic(&layout.fingerprint_path(), yaml.as_bytes())?;
        tracing::debug!(
            "Recorded store fingerprint: provider={}, model={}, dimensions={}",
            self.provider,
            self.model,
            self.dimensions
        );
        Ok(())
    }

    /// Check that `other` can write into a store fingerprinted by `self`.
    ///
    /// A dimension change is fatal. A different provider or model name with
    /// the same dimension is allowed but logged.
    pub fn validate_consistency(&self, other: &Self) -> AppResult<()> {
        if self.dimensions != other.dimensions {
            return Err(AppError::Consistency(format!(
                "Dimension mismatch: store holds {}-dimensional vectors, provider '{}' produces {}",
                self.dimensions, other.provider, other.dimensions
            )));
        }

        if self.provider != other.provider || self.model != other.model {
            tracing::warn!(
                "Store was built with {}/{} but this run uses {}/{}",
                self.provider,
                self.model,
                other.provider,
                other.model
            );
        }

        Ok(())
    }
}
