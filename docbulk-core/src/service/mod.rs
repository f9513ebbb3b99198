// docbulk-core/src/service/mod.rs
//! The two collaborator calls the core depends on, plus an in-memory backend

pub mod memory_service;
pub mod traits;

pub use memory_service::MemoryDocumentService;
pub use traits::{DocumentPage, DocumentService, MAX_PAGE_SIZE};
