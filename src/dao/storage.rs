use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached or failed the call.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// Human-readable reason.
        message: String,
        /// Underlying error.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// A partial update targeted a document that does not exist.
    #[error("document `{key}` does not exist")]
    MissingDocument {
        /// Document key.
        key: String,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// Construct a missing-document error for `key`.
    pub fn missing_document(key: impl Into<String>) -> Self {
        StorageError::MissingDocument { key: key.into() }
    }
}
