// docbulk-core/src/lib.rs
// Path-addressable JSON edits and bulk document operations

pub mod config;
pub mod cursor;
pub mod document;
pub mod error;
pub mod filter;
pub mod mutation;
pub mod operation;
pub mod path;
pub mod runner;
pub mod service;
pub mod value_utils;

// Public exports
pub use config::BulkConfig;
pub use cursor::{fetch_page, BatchCursor, Page};
pub use document::{Document, DocumentPatch};
pub use error::{BulkError, PathError, Result, ServiceError, ValidationError};
pub use filter::{
    decode_metadata_pairs, encode_metadata_pairs, parse_metadata_search, FilterSpec,
};
pub use operation::{Mutation, OperationCatalog, OperationKind, PendingOperation};
pub use path::{tokenize, Location, PathToken, ResolveMode};
pub use runner::{
    BatchProgress, BulkObserver, BulkOperationRunner, BulkSummary, CancellationToken,
    NoopObserver, RunState, StepOutcome,
};
pub use service::{DocumentPage, DocumentService, MemoryDocumentService, MAX_PAGE_SIZE};
