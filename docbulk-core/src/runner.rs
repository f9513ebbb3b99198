// docbulk-core/src/runner.rs
//! Bulk operation runner
//!
//! Drives one bulk operation through its lifecycle:
//!
//! ```text
//! Idle → Counting → AwaitingConfirmation → Applying → Completed
//!                        │                     ├──→ Cancelled
//!                        └──→ Idle (declined)  └──→ Failed (page fetch error)
//! ```
//!
//! Execution is strictly sequential. [`BulkOperationRunner::step`] handles
//! exactly one document and returns, which is where the host gets to update
//! a progress display and where cancellation is sampled. A cancellation
//! request never interrupts a commit that is already in flight; it only
//! prevents further documents and page fetches.

use crate::config::BulkConfig;
use crate::cursor::BatchCursor;
use crate::document::Document;
use crate::error::{BulkError, Result};
use crate::filter::FilterSpec;
use crate::operation::{Mutation, OperationCatalog, PendingOperation};
use crate::service::DocumentService;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Counting,
    AwaitingConfirmation,
    Applying,
    Completed,
    Cancelled,
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Counting => "counting",
            RunState::AwaitingConfirmation => "awaiting-confirmation",
            RunState::Applying => "applying",
            RunState::Completed => "completed",
            RunState::Cancelled => "cancelled",
            RunState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Cancelled | RunState::Failed
        )
    }
}

/// Running tally for one bulk run
///
/// `succeeded + failed == processed <= total_matched` holds at every
/// observation point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProgress {
    pub total_matched: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: bool,
}

impl BatchProgress {
    fn new(total_matched: usize) -> Self {
        BatchProgress {
            total_matched,
            ..Default::default()
        }
    }

    pub fn remaining(&self) -> usize {
        self.total_matched.saturating_sub(self.processed)
    }

    pub fn is_consistent(&self) -> bool {
        self.succeeded + self.failed == self.processed && self.processed <= self.total_matched
    }
}

/// Final outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkSummary {
    pub total_matched: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: bool,
}

impl BulkSummary {
    /// The filter matched nothing, so no confirmation or apply phase ran
    pub fn nothing_to_do(&self) -> bool {
        self.total_matched == 0
    }
}

impl From<&BatchProgress> for BulkSummary {
    fn from(progress: &BatchProgress) -> Self {
        BulkSummary {
            total_matched: progress.total_matched,
            succeeded: progress.succeeded,
            failed: progress.failed,
            cancelled: progress.cancelled,
        }
    }
}

/// Advisory cancellation flag owned by the host
///
/// Clones share the flag, so a token can be handed to a signal handler,
/// another thread or an observer before the run is requested.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Receives progress and completion from a run
pub trait BulkObserver {
    /// Called after every processed document, and once more with the final tally
    fn on_progress(&mut self, _progress: &BatchProgress) {}

    /// Called once when the run reaches a terminal state; hosts refresh their
    /// document views here
    fn on_finished(&mut self, _summary: &BulkSummary) {}
}

/// Observer that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl BulkObserver for NoopObserver {}

/// Result of one [`BulkOperationRunner::step`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// One document was handled; more may follow
    Processed(BatchProgress),
    /// The run reached a terminal state
    Finished(BulkSummary),
}

pub struct BulkOperationRunner<'a, S: DocumentService + ?Sized> {
    service: &'a S,
    config: BulkConfig,
    state: RunState,
    filter: Option<&'a FilterSpec>,
    pending: Option<PendingOperation>,
    mutation: Option<Mutation>,
    cursor: Option<BatchCursor<'a, S>>,
    page: VecDeque<Document>,
    progress: BatchProgress,
    summary: Option<BulkSummary>,
    cancel: Option<CancellationToken>,
}

impl<'a, S: DocumentService + ?Sized> BulkOperationRunner<'a, S> {
    pub fn new(service: &'a S, config: BulkConfig) -> Self {
        BulkOperationRunner {
            service,
            config,
            state: RunState::Idle,
            filter: None,
            pending: None,
            mutation: None,
            cursor: None,
            page: VecDeque::new(),
            progress: BatchProgress::default(),
            summary: None,
            cancel: None,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn progress(&self) -> &BatchProgress {
        &self.progress
    }

    /// Summary of the last finished run
    pub fn summary(&self) -> Option<&BulkSummary> {
        self.summary.as_ref()
    }

    /// The operation waiting for confirmation
    pub fn pending(&self) -> Option<&PendingOperation> {
        self.pending.as_ref()
    }

    /// Validate `pending`, count matches for `filter`, and wait for confirmation
    ///
    /// `cancel` is sampled for the rest of the run. Returns
    /// `AwaitingConfirmation`, or `Completed` when nothing matches.
    ///
    /// # Errors
    ///
    /// `BulkError::Validation` for a malformed payload, before any collaborator
    /// call. A failed count leaves the runner `Idle`.
    pub fn request<O: BulkObserver + ?Sized>(
        &mut self,
        filter: &'a FilterSpec,
        pending: PendingOperation,
        cancel: CancellationToken,
        observer: &mut O,
    ) -> Result<RunState> {
        if self.state != RunState::Idle && !self.state.is_terminal() {
            return Err(self.invalid_state("idle"));
        }
        self.reset();

        let mutation = OperationCatalog::build(&pending)?;
        self.cancel = Some(cancel);

        self.state = RunState::Counting;
        let total_matched = match self.service.list(filter, 0, 1) {
            Ok(page) => page.total_matched,
            Err(e) => {
                warn!(error = %e, "failed to count matching documents");
                self.state = RunState::Idle;
                return Err(e.into());
            }
        };

        info!(
            operation = %pending.kind,
            total_matched,
            "counted matching documents"
        );

        self.progress = BatchProgress::new(total_matched);
        if total_matched == 0 {
            self.finish(RunState::Completed, observer);
            return Ok(self.state);
        }

        self.filter = Some(filter);
        self.pending = Some(pending);
        self.mutation = Some(mutation);
        self.state = RunState::AwaitingConfirmation;
        Ok(self.state)
    }

    /// Start applying the pending operation
    pub fn confirm(&mut self) -> Result<()> {
        if self.state != RunState::AwaitingConfirmation {
            return Err(self.invalid_state("awaiting-confirmation"));
        }
        let (Some(filter), Some(pending)) = (self.filter, self.pending.take()) else {
            return Err(self.invalid_state("awaiting-confirmation"));
        };

        info!(
            operation = %pending.kind,
            total_matched = self.progress.total_matched,
            page_size = self.config.page_size,
            "applying bulk operation"
        );

        self.cursor = Some(BatchCursor::new(self.service, filter, self.config.page_size));
        self.state = RunState::Applying;
        Ok(())
    }

    /// Drop the pending operation without side effects
    pub fn decline(&mut self) -> Result<()> {
        if self.state != RunState::AwaitingConfirmation {
            return Err(self.invalid_state("awaiting-confirmation"));
        }
        debug!("bulk operation declined");
        self.reset();
        Ok(())
    }

    /// Handle one document
    ///
    /// Fetches the next page when the current one is used up. Returns
    /// `Finished` once the run reaches a terminal state.
    ///
    /// # Errors
    ///
    /// `BulkError::Service` when a page fetch fails; the runner is then
    /// `Failed` and the observer has been told. Per-document failures are
    /// never errors here, they only increment `failed`.
    pub fn step<O: BulkObserver + ?Sized>(&mut self, observer: &mut O) -> Result<StepOutcome> {
        if self.state != RunState::Applying {
            return Err(self.invalid_state("applying"));
        }

        if self.is_cancelled() {
            return Ok(self.finish(RunState::Cancelled, observer));
        }
        if self.progress.processed >= self.progress.total_matched {
            return Ok(self.finish(RunState::Completed, observer));
        }

        if self.page.is_empty() {
            // No new page fetch once cancellation is requested
            if self.is_cancelled() {
                return Ok(self.finish(RunState::Cancelled, observer));
            }
            let fetched = match self.cursor.as_mut() {
                Some(cursor) if !cursor.is_finished() => cursor.next_page(),
                _ => Ok(None),
            };
            match fetched {
                Ok(Some(page)) => self.page.extend(page.items),
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, processed = self.progress.processed, "page fetch failed");
                    self.finish(RunState::Failed, observer);
                    return Err(e.into());
                }
            }
            if self.page.is_empty() {
                return Ok(self.finish(RunState::Completed, observer));
            }
        }

        if let Some(document) = self.page.pop_front() {
            self.process_document(document)?;
        }
        observer.on_progress(&self.progress);
        self.log_progress();

        let exhausted = self.page.is_empty()
            && self.cursor.as_ref().map_or(true, |cursor| cursor.is_finished());

        if self.is_cancelled() {
            Ok(self.finish(RunState::Cancelled, observer))
        } else if exhausted || self.progress.processed >= self.progress.total_matched {
            Ok(self.finish(RunState::Completed, observer))
        } else {
            Ok(StepOutcome::Processed(self.progress))
        }
    }

    /// Step until the run finishes
    pub fn run<O: BulkObserver + ?Sized>(&mut self, observer: &mut O) -> Result<BulkSummary> {
        loop {
            if let StepOutcome::Finished(summary) = self.step(observer)? {
                return Ok(summary);
            }
        }
    }

    fn process_document(&mut self, document: Document) -> Result<()> {
        let mutation = self
            .mutation
            .as_ref()
            .ok_or(BulkError::InvalidState {
                expected: "applying",
                actual: "no mutation",
            })?;

        let id = document.id.clone();
        let outcome = match mutation.apply_owned(document) {
            Ok(patch) => {
                trace!(document_id = %id, "committing document");
                self.service.update(&id, &patch).map_err(BulkError::from)
            }
            Err(e) => Err(BulkError::from(e)),
        };

        match outcome {
            Ok(_) => self.progress.succeeded += 1,
            Err(e) => {
                warn!(document_id = %id, error = %e, "document update failed");
                self.progress.failed += 1;
            }
        }
        self.progress.processed += 1;
        Ok(())
    }

    fn log_progress(&self) {
        let interval = self.config.progress_log_interval;
        if interval > 0 && self.progress.processed % interval == 0 {
            info!(
                processed = self.progress.processed,
                total_matched = self.progress.total_matched,
                succeeded = self.progress.succeeded,
                failed = self.progress.failed,
                "bulk progress"
            );
        }
    }

    fn finish<O: BulkObserver + ?Sized>(&mut self, state: RunState, observer: &mut O) -> StepOutcome {
        self.state = state;
        self.progress.cancelled = state == RunState::Cancelled;
        self.cursor = None;
        self.page.clear();
        self.mutation = None;
        self.pending = None;
        self.filter = None;

        let summary = BulkSummary::from(&self.progress);
        self.summary = Some(summary);

        info!(
            state = state.as_str(),
            total_matched = summary.total_matched,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "bulk operation finished"
        );

        observer.on_progress(&self.progress);
        observer.on_finished(&summary);
        StepOutcome::Finished(summary)
    }

    fn reset(&mut self) {
        self.state = RunState::Idle;
        self.filter = None;
        self.pending = None;
        self.mutation = None;
        self.cursor = None;
        self.page.clear();
        self.progress = BatchProgress::default();
        self.summary = None;
        self.cancel = None;
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map_or(false, CancellationToken::is_cancelled)
    }

    fn invalid_state(&self, expected: &'static str) -> BulkError {
        BulkError::InvalidState {
            expected,
            actual: self.state.as_str(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::OperationKind;
    use crate::service::MemoryDocumentService;
    use serde_json::json;

    fn service_with(count: usize) -> MemoryDocumentService {
        MemoryDocumentService::with_documents(
            (0..count)
                .map(|i| Document::new(format!("d{:03}", i), "doc"))
                .collect(),
        )
    }

    #[test]
    fn test_progress_consistency() {
        let mut progress = BatchProgress::new(3);
        assert!(progress.is_consistent());
        progress.processed = 2;
        progress.succeeded = 1;
        assert!(!progress.is_consistent());
        progress.failed = 1;
        assert!(progress.is_consistent());
        assert_eq!(progress.remaining(), 1);
    }

    #[test]
    fn test_token_clones_share_flag() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_token_from_declined_run_does_not_leak() {
        let service = service_with(3);
        let filter = FilterSpec::new();
        let mut runner = BulkOperationRunner::new(&service, BulkConfig::default());
        let pending = PendingOperation::new(OperationKind::AddTags, json!(["a"]));

        let first = CancellationToken::new();
        runner
            .request(&filter, pending.clone(), first.clone(), &mut NoopObserver)
            .unwrap();
        first.cancel();
        runner.decline().unwrap();

        runner
            .request(&filter, pending, CancellationToken::new(), &mut NoopObserver)
            .unwrap();
        runner.confirm().unwrap();
        let summary = runner.run(&mut NoopObserver).unwrap();
        assert_eq!(summary.succeeded, 3);
        assert!(!summary.cancelled);
    }

    #[test]
    fn test_invalid_transitions() {
        let service = service_with(1);
        let mut runner = BulkOperationRunner::new(&service, BulkConfig::default());
        assert!(matches!(
            runner.confirm(),
            Err(BulkError::InvalidState { actual: "idle", .. })
        ));
        assert!(runner.decline().is_err());
        assert!(runner.step(&mut NoopObserver).is_err());
    }
}
