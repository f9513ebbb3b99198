// service/memory_service.rs
//! In-memory document service
//!
//! Implements [`DocumentService`] over a `Vec<Document>` kept in insertion
//! order, so skip/limit paging is deterministic. Used by the test suite and
//! by the CLI, which loads and saves the store as a JSON array file.
//!
//! # Architecture
//!
//! ```text
//! MemoryDocumentService (DocumentService implementation)
//!      ↓
//! RwLock<Vec<Document>> (documents in insertion order)
//! ```

use crate::document::{Document, DocumentPatch};
use crate::error::{BulkError, Result, ServiceError};
use crate::filter::FilterSpec;
use crate::service::traits::{DocumentPage, DocumentService, MAX_PAGE_SIZE};
use chrono::Utc;
use parking_lot::RwLock;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// Call counters, mostly useful in tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceStats {
    pub list_calls: usize,
    pub update_calls: usize,
}

/// In-memory document store
#[derive(Debug, Default)]
pub struct MemoryDocumentService {
    documents: RwLock<Vec<Document>>,
    list_calls: AtomicUsize,
    update_calls: AtomicUsize,
}

impl MemoryDocumentService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_documents(documents: Vec<Document>) -> Self {
        MemoryDocumentService {
            documents: RwLock::new(documents),
            ..Default::default()
        }
    }

    /// Load a store from a JSON array of documents
    ///
    /// Documents without an `id` get a generated UUID, which is written back
    /// on the next save.
    pub fn load_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let mut documents: Vec<Document> = serde_json::from_str(&content)?;
        let generated = documents
            .iter_mut()
            .map(Document::ensure_id)
            .filter(|assigned| *assigned)
            .count();
        if generated > 0 {
            debug!(generated, "assigned ids to documents without one");
        }
        Ok(Self::with_documents(documents))
    }

    /// Write the store back as a pretty-printed JSON array
    pub fn save_json_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(&*self.documents.read())?;
        fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Add a document, rejecting duplicate ids
    pub fn insert(&self, document: Document) -> Result<()> {
        let mut documents = self.documents.write();
        if documents.iter().any(|d| d.id == document.id) {
            return Err(BulkError::Service(ServiceError::Rejected(format!(
                "duplicate document id '{}'",
                document.id
            ))));
        }
        documents.push(document);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Document> {
        self.documents.read().iter().find(|d| d.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }

    /// Snapshot of every stored document
    pub fn documents(&self) -> Vec<Document> {
        self.documents.read().clone()
    }

    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            list_calls: self.list_calls.load(Ordering::Relaxed),
            update_calls: self.update_calls.load(Ordering::Relaxed),
        }
    }
}

impl DocumentService for MemoryDocumentService {
    fn list(
        &self,
        filter: &FilterSpec,
        skip: usize,
        limit: usize,
    ) -> std::result::Result<DocumentPage, ServiceError> {
        self.list_calls.fetch_add(1, Ordering::Relaxed);

        if limit > MAX_PAGE_SIZE {
            return Err(ServiceError::LimitExceeded {
                requested: limit,
                max: MAX_PAGE_SIZE,
            });
        }

        let documents = self.documents.read();
        let matching: Vec<&Document> = documents.iter().filter(|d| filter.matches(d)).collect();
        let total_matched = matching.len();
        let items = matching
            .into_iter()
            .skip(skip)
            .take(limit)
            .cloned()
            .collect();

        Ok(DocumentPage {
            items,
            total_matched,
        })
    }

    fn update(
        &self,
        id: &str,
        patch: &DocumentPatch,
    ) -> std::result::Result<Document, ServiceError> {
        self.update_calls.fetch_add(1, Ordering::Relaxed);

        let mut documents = self.documents.write();
        let document = documents
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| ServiceError::NotFound(id.to_string()))?;

        patch.apply_to(document);
        document.modified_at = Some(Utc::now());
        Ok(document.clone())
    }
}
