//! Error types for the Affinity workspace.
//!
//! One enum covers every failure category of the embedding store: bad
//! configuration, store inconsistencies, empty queries, storage I/O and
//! failures of the external embedding model.

use thiserror::Error;

/// Unified error type for Affinity.
///
/// All fallible functions return `Result<T, AppError>`.
/// Lower layers never swallow errors; they are propagated to the caller.
#[derive(Error, Debug)]
pub enum AppError {
    /// Invalid or missing configuration (bad source dir, capacity of zero, ...)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The index and the chunk files disagree, or a vector has the wrong dimension
    #[error("Consistency error: {0}")]
    Consistency(String),

    /// An aggregate query resolved to zero stored vectors
    #[error("Empty query: {0}")]
    EmptyQuery(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Embedding model errors
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A vectorization batch failed; earlier batches stay committed
    #[error("Batch for chunk {chunk_id} failed: {source}")]
    Batch {
        chunk_id: u32,
        #[source]
        source: Box<AppError>,
    },

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Wrap an error with the id of the chunk whose batch produced it.
    pub fn in_batch(chunk_id: u32, source: AppError) -> Self {
        AppError::Batch {
            chunk_id,
            source: Box::new(source),
        }
    }

    /// Fatal errors must not be retried: the input or the store needs attention first.
    pub fn is_fatal(&self) -> bool {
        match self {
            AppError::Config(_) | AppError::Consistency(_) | AppError::Serialization(_) => true,
            AppError::Batch { source, .. } => source.is_fatal(),
            _ => false,
        }
    }

    /// Re-running the same command after a retryable error resumes from the last commit.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Io(_) | AppError::Embedding(_) => true,
            AppError::Batch { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_error_names_chunk() {
        let err = AppError::in_batch(3, AppError::Embedding("timeout".to_string()));
        let msg = err.to_string();
        assert!(msg.contains("chunk 3"));
        assert!(msg.contains("timeout"));
    }

    #[test]
    fn test_classification() {
        assert!(AppError::Consistency("x".to_string()).is_fatal());
        assert!(AppError::Config("x".to_string()).is_fatal());
        assert!(!AppError::EmptyQuery("x".to_string()).is_fatal());

        let io = AppError::from(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
        assert!(io.is_retryable());
        assert!(AppError::in_batch(0, io).is_retryable());
        assert!(AppError::in_batch(1, AppError::Consistency("x".to_string())).is_fatal());
    }

    #[test]
    fn test_serde_json_conversion() {
        let err: AppError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, AppError::Serialization(_)));
    }
}
