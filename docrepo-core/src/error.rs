//! Error types and result types for repository operations.
//!
//! Every fallible operation returns [`DocumentStoreResult<T>`]. Absence is never an
//! error: lookups return `Option`/empty vectors and unmatched updates return `false`/`0`.
//! Failures reported by a backend driver are carried through as [`DocumentStoreError::Backend`]
//! with the driver's own message, unclassified.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when interacting with a document store.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// Serialization/deserialization error when converting between document formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during store initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// A document with the given ID already exists in the collection.
    /// The first argument is the document ID, the second is the collection name.
    #[error("Document {0} already exists in collection {1}")]
    DocumentAlreadyExists(String, String),
    /// The document violates structural constraints (not a document, altered `_id`, ...).
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// A filter, update, projection or pipeline could not be translated or interpreted.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    /// The supplied session handle does not belong to the backend it was used with.
    #[error("Invalid session: {0}")]
    InvalidSession(String),
    /// The operation was cancelled through its cancellation token before it completed.
    #[error("Operation cancelled")]
    Cancelled,
    /// An error reported by the underlying storage driver, message kept verbatim.
    #[error("Backend error: {0}")]
    Backend(String),
    /// An unknown error occurred.
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl DocumentStoreError {
    /// Returns `true` when this error is the result of a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DocumentStoreError::Cancelled)
    }
}

/// A specialized `Result` type for document store operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}
