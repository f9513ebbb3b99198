// docbulk-core/src/cursor.rs
// Sequential skip/limit paging over the listing collaborator

use crate::document::Document;
use crate::error::ServiceError;
use crate::filter::FilterSpec;
use crate::service::{DocumentService, MAX_PAGE_SIZE};
use tracing::debug;

/// One fetched page
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub items: Vec<Document>,
    /// Fewer than `page_size` items came back
    pub is_last: bool,
}

/// Fetch a single page starting at `skip`
pub fn fetch_page<S: DocumentService + ?Sized>(
    service: &S,
    filter: &FilterSpec,
    skip: usize,
    page_size: usize,
) -> Result<Page, ServiceError> {
    let page = service.list(filter, skip, page_size)?;
    let is_last = page.items.len() < page_size;
    Ok(Page {
        items: page.items,
        is_last,
    })
}

/// Pages through every document matching a filter, one page at a time
///
/// Pages are fetched strictly in order. Skip/limit paging is not stable
/// against concurrent edits, so fetching pages in parallel could skip or
/// repeat documents.
pub struct BatchCursor<'a, S: DocumentService + ?Sized> {
    service: &'a S,
    filter: &'a FilterSpec,
    page_size: usize,
    skip: usize,
    pages_fetched: usize,
    finished: bool,
}

impl<'a, S: DocumentService + ?Sized> BatchCursor<'a, S> {
    /// `page_size` is clamped to `1..=MAX_PAGE_SIZE`
    pub fn new(service: &'a S, filter: &'a FilterSpec, page_size: usize) -> Self {
        BatchCursor {
            service,
            filter,
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
            skip: 0,
            pages_fetched: 0,
            finished: false,
        }
    }

    /// Fetch the next page, or `None` once the last page has been returned
    pub fn next_page(&mut self) -> Result<Option<Page>, ServiceError> {
        if self.finished {
            return Ok(None);
        }

        let page = fetch_page(self.service, self.filter, self.skip, self.page_size)?;
        self.pages_fetched += 1;
        self.skip += page.items.len();
        self.finished = page.is_last;

        debug!(
            page = self.pages_fetched,
            items = page.items.len(),
            skip = self.skip,
            is_last = page.is_last,
            "fetched page"
        );

        Ok(Some(page))
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Offset the next page will start at
    pub fn position(&self) -> usize {
        self.skip
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::MemoryDocumentService;

    fn service_with(count: usize) -> MemoryDocumentService {
        MemoryDocumentService::with_documents(
            (0..count)
                .map(|i| Document::new(format!("d{:03}", i), "doc"))
                .collect(),
        )
    }

    #[test]
    fn test_pages_of_250() {
        let service = service_with(250);
        let filter = FilterSpec::new();
        let mut cursor = BatchCursor::new(&service, &filter, 100);

        let mut sizes = Vec::new();
        while let Some(page) = cursor.next_page().unwrap() {
            sizes.push(page.items.len());
        }

        assert_eq!(sizes, vec![100, 100, 50]);
        assert!(cursor.is_finished());
        assert_eq!(cursor.position(), 250);
        assert_eq!(service.stats().list_calls, 3);
    }

    #[test]
    fn test_exact_multiple_ends_with_empty_page() {
        let service = service_with(200);
        let filter = FilterSpec::new();
        let mut cursor = BatchCursor::new(&service, &filter, 100);

        let mut sizes = Vec::new();
        while let Some(page) = cursor.next_page().unwrap() {
            sizes.push(page.items.len());
        }
        assert_eq!(sizes, vec![100, 100, 0]);
    }

    #[test]
    fn test_page_size_is_clamped() {
        let service = service_with(1);
        let filter = FilterSpec::new();
        assert_eq!(BatchCursor::new(&service, &filter, 500).page_size(), 100);
        assert_eq!(BatchCursor::new(&service, &filter, 0).page_size(), 1);
    }

    #[test]
    fn test_fetch_page_is_last() {
        let service = service_with(5);
        let filter = FilterSpec::new();
        assert!(!fetch_page(&service, &filter, 0, 5).unwrap().is_last);
        assert!(fetch_page(&service, &filter, 0, 6).unwrap().is_last);
        assert!(fetch_page(&service, &filter, 3, 5).unwrap().is_last);
    }
}
