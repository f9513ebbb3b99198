// service/traits.rs
//! Collaborator abstraction for document listing and updates
//!
//! The bulk runner never talks to a backend directly. It consumes exactly two
//! calls, expressed as the [`DocumentService`] trait:
//!
//! ```text
//! DocumentService trait
//!   ├── MemoryDocumentService (tests and the CLI, optional JSON file backing)
//!   └── any REST/database client implementing list + update
//! ```

use crate::document::{Document, DocumentPatch};
use crate::error::ServiceError;
use crate::filter::FilterSpec;
use serde::{Deserialize, Serialize};

/// Largest `limit` a listing call may request
pub const MAX_PAGE_SIZE: usize = 100;

/// One page of listing results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPage {
    pub items: Vec<Document>,

    /// Number of documents matching the filter overall, ignoring skip/limit
    pub total_matched: usize,
}

/// Document listing/update collaborator
///
/// Implementations take `&self`; those holding mutable state use interior
/// locking so a service can be shared with a UI thread while a run is in
/// progress.
pub trait DocumentService {
    /// List documents matching `filter`, skipping `skip` and returning at
    /// most `limit` items
    ///
    /// # Errors
    ///
    /// `ServiceError::LimitExceeded` when `limit > MAX_PAGE_SIZE`; any
    /// transport failure as `ServiceError::Network`.
    fn list(
        &self,
        filter: &FilterSpec,
        skip: usize,
        limit: usize,
    ) -> Result<DocumentPage, ServiceError>;

    /// Replace the supplied fields of one document
    ///
    /// Fields left as `None` in the patch are untouched. Returns the stored
    /// document after the update.
    fn update(&self, id: &str, patch: &DocumentPatch) -> Result<Document, ServiceError>;
}

impl<S: DocumentService + ?Sized> DocumentService for &S {
    fn list(
        &self,
        filter: &FilterSpec,
        skip: usize,
        limit: usize,
    ) -> Result<DocumentPage, ServiceError> {
        (**self).list(filter, skip, limit)
    }

    fn update(&self, id: &str, patch: &DocumentPatch) -> Result<Document, ServiceError> {
        (**self).update(id, patch)
    }
}

impl<S: DocumentService + ?Sized> DocumentService for Box<S> {
    fn list(
        &self,
        filter: &FilterSpec,
        skip: usize,
        limit: usize,
    ) -> Result<DocumentPage, ServiceError> {
        (**self).list(filter, skip, limit)
    }

    fn update(&self, id: &str, patch: &DocumentPatch) -> Result<Document, ServiceError> {
        (**self).update(id, patch)
    }
}
