//! Built-in embedding providers.

pub mod mock;
pub mod ollama;
