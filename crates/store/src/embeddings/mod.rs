//! Embedding model integration.
//!
//! The store treats the model as an opaque `texts -> vectors` function behind
//! [`EmbeddingProvider`]. Each store records which model filled it so that
//! vectors from incompatible models are never mixed.

pub mod config;
pub mod provider;
pub mod providers;

pub use config::EmbeddingConfig;
pub use provider::{create_provider, EmbeddingProvider};
