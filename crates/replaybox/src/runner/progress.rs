//! Progress callback for reporting batch progress.
//!
//! This module provides a trait for receiving progress events while cases run.

use crate::model::{BatchCounts, CaseReport, RunId};

/// Event emitted during a batch for progress tracking.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Batch has started.
    BatchStarted {
        /// Unique run identifier.
        run_id: RunId,
        /// Number of cases in the batch.
        total_cases: usize,
    },
    /// A case has started.
    CaseStarted {
        /// Case name.
        name: String,
        /// Position in the batch (1-based, discovery order).
        case_index: usize,
    },
    /// A case has been judged.
    CaseFinished {
        /// Full report for the case.
        report: CaseReport,
    },
    /// Batch has completed.
    BatchFinished {
        /// Unique run identifier.
        run_id: RunId,
        /// Outcome totals.
        counts: BatchCounts,
        /// Total duration in milliseconds.
        duration_ms: u64,
    },
}

/// Trait for receiving progress events during execution.
///
/// Events may arrive from several worker threads when cases run in parallel.
pub trait ProgressCallback: Send + Sync {
    /// Called for each progress event.
    fn on_progress(&self, event: &ProgressEvent);
}

/// A no-op progress callback that discards all events.
pub struct NoopProgress;

impl ProgressCallback for NoopProgress {
    fn on_progress(&self, _event: &ProgressEvent) {}
}

/// A progress callback that collects events for testing.
#[derive(Default)]
pub struct CollectingProgress {
    events: std::sync::Mutex<Vec<ProgressEvent>>,
}

impl CollectingProgress {
    /// Create a new collecting progress callback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Collected events so far.
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl ProgressCallback for CollectingProgress {
    fn on_progress(&self, event: &ProgressEvent) {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(event.clone());
    }
}
