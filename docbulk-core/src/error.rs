// docbulk-core/src/error.rs
// Error taxonomy: validation aborts a run, everything else degrades to a tally

use crate::operation::OperationKind;
use thiserror::Error;

/// Failure to locate or edit a value inside a document's extracted fields.
///
/// Always scoped to a single document: the runner counts it as a failure
/// and moves on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("path not found: '{path}'")]
    PathNotFound { path: String },

    #[error("index {index} out of range at '{path}' (length {len})")]
    IndexOutOfRange {
        path: String,
        index: usize,
        len: usize,
    },

    #[error("type mismatch at '{path}': expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },
}

/// Malformed bulk operation payload. Raised before any collaborator call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{kind}: payload must not be empty")]
    EmptyPayload { kind: OperationKind },

    #[error("{kind}: {reason}")]
    InvalidPayload { kind: OperationKind, reason: String },

    #[error("{kind}: duplicate metadata key '{key}'")]
    DuplicateMetadataKey { kind: OperationKind, key: String },

    #[error("{kind}: {source}")]
    InvalidPath {
        kind: OperationKind,
        #[source]
        source: PathError,
    },
}

/// Errors reported by the document listing/update collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("network error: {0}")]
    Network(String),

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("limit {requested} exceeds maximum page size {max}")]
    LimitExceeded { requested: usize, max: usize },

    #[error("update rejected: {0}")]
    Rejected(String),
}

#[derive(Error, Debug)]
pub enum BulkError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("path error: {0}")]
    Path(#[from] PathError),

    #[error("service error: {0}")]
    Service(#[from] ServiceError),

    #[error("invalid runner state: expected {expected}, found {actual}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BulkError>;
