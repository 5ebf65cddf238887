//! Progress reporting: the run state machine and its observer trait.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events while the pipeline walks the pages.
//!
//! Every run moves through
//!
//! ```text
//! Idle ──▶ Reading ──▶ (Rendering | Copying, page i of n)* ──▶ Finalizing ──▶ Done
//!            │                    │                                │
//!            └────────────────────┴──────────▶ Errored / Cancelled ◀┘
//! ```
//!
//! `Done`, `Errored` and `Cancelled` are absorbing. Page events are
//! emitted strictly in page order because pages are processed one at a
//! time, so `current` never decreases within a run.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdfpress::{Phase, PipelineConfig, PipelineProgressCallback};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl PipelineProgressCallback for Printer {
//!     fn on_progress(&self, phase: Phase, current: usize, total: usize) {
//!         eprintln!("{phase}: {current}/{total}");
//!     }
//! }
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(Arc::new(Printer))
//!     .build()
//!     .unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Stage of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    /// Decoding the input document(s).
    Reading,
    /// Rasterising, encoding and embedding one page (compress).
    Rendering,
    /// Structurally copying one page (split, merge).
    Copying,
    /// Serialising the output document(s).
    Finalizing,
    Done,
    Errored,
    Cancelled,
}

impl Phase {
    /// Absorbing states: no transition leaves them.
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Done | Phase::Errored | Phase::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Reading => "reading",
            Phase::Rendering => "rendering",
            Phase::Copying => "copying",
            Phase::Finalizing => "finalizing",
            Phase::Done => "done",
            Phase::Errored => "errored",
            Phase::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a run's progress.
///
/// `current_page` is the 1-indexed page being processed (0 before the first
/// page); `total_pages` is 0 until the input has been decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineProgress {
    pub current_page: usize,
    pub total_pages: usize,
    pub phase: Phase,
}

impl Default for PipelineProgress {
    fn default() -> Self {
        Self {
            current_page: 0,
            total_pages: 0,
            phase: Phase::Idle,
        }
    }
}

/// Called by the pipeline as it processes each page.
///
/// Implementations must be `Send + Sync`: the pipeline runs on a blocking
/// worker thread, not on the caller's thread. All methods have default
/// no-op implementations so callers only override what they care about.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called once the input is decoded and the page total is known.
    fn on_run_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called on every phase transition.
    fn on_phase(&self, phase: Phase) {
        let _ = phase;
    }

    /// Called once per page, before the page is processed.
    ///
    /// # Arguments
    /// * `phase`   — `Rendering` (compress) or `Copying` (split, merge)
    /// * `current` — 1-indexed position of the page within the run
    /// * `total`   — total pages in the run
    fn on_progress(&self, phase: Phase, current: usize, total: usize) {
        let _ = (phase, current, total);
    }

    /// Called when a page's output is committed.
    ///
    /// `output_bytes` is the size of the encoded image (compress) or of the
    /// single-page document (split); 0 for merge, where nothing is
    /// serialised per page.
    fn on_page_complete(&self, page_num: usize, total_pages: usize, output_bytes: usize) {
        let _ = (page_num, total_pages, output_bytes);
    }

    /// Called when a page fails.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once when the run reaches `Done`.
    fn on_run_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;

/// Owns a run's [`PipelineProgress`] and forwards changes to the observer.
///
/// Created fresh for every invocation, so progress is reset per run.
pub(crate) struct ProgressTracker {
    progress: PipelineProgress,
    callback: Option<ProgressCallback>,
}

impl ProgressTracker {
    pub(crate) fn new(callback: Option<ProgressCallback>) -> Self {
        Self {
            progress: PipelineProgress::default(),
            callback,
        }
    }

    pub(crate) fn snapshot(&self) -> PipelineProgress {
        self.progress
    }

    /// Move to `phase`. Transitions out of a terminal phase are ignored.
    pub(crate) fn transition(&mut self, phase: Phase) {
        if self.progress.phase.is_terminal() {
            debug!(from = %self.progress.phase, to = %phase, "ignoring transition out of terminal phase");
            return;
        }
        if self.progress.phase == phase {
            return;
        }
        self.progress.phase = phase;
        if let Some(ref cb) = self.callback {
            cb.on_phase(phase);
        }
    }

    pub(crate) fn set_total(&mut self, total_pages: usize) {
        self.progress.total_pages = total_pages;
        if let Some(ref cb) = self.callback {
            cb.on_run_start(total_pages);
        }
    }

    /// Announce the page at 0-indexed run position `position`.
    pub(crate) fn page(&mut self, phase: Phase, position: usize) {
        self.transition(phase);
        self.progress.current_page = self.progress.current_page.max(position + 1);
        if let Some(ref cb) = self.callback {
            cb.on_progress(phase, self.progress.current_page, self.progress.total_pages);
        }
    }

    pub(crate) fn page_complete(&self, page_num: usize, output_bytes: usize) {
        if let Some(ref cb) = self.callback {
            cb.on_page_complete(page_num, self.progress.total_pages, output_bytes);
        }
    }

    pub(crate) fn page_error(&self, page_num: usize, error: &str) {
        if let Some(ref cb) = self.callback {
            cb.on_page_error(page_num, self.progress.total_pages, error);
        }
    }

    pub(crate) fn finish(&mut self, success_count: usize) {
        self.transition(Phase::Done);
        if self.progress.phase != Phase::Done {
            return;
        }
        if let Some(ref cb) = self.callback {
            cb.on_run_complete(self.progress.total_pages, success_count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        phases: Mutex<Vec<Phase>>,
        pages: Mutex<Vec<(usize, usize)>>,
        completed: Mutex<Option<(usize, usize)>>,
    }

    impl PipelineProgressCallback for Recorder {
        fn on_phase(&self, phase: Phase) {
            self.phases.lock().unwrap().push(phase);
        }

        fn on_progress(&self, _phase: Phase, current: usize, total: usize) {
            self.pages.lock().unwrap().push((current, total));
        }

        fn on_run_complete(&self, total_pages: usize, success_count: usize) {
            *self.completed.lock().unwrap() = Some((total_pages, success_count));
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_run_start(5);
        cb.on_phase(Phase::Reading);
        cb.on_progress(Phase::Rendering, 1, 5);
        cb.on_page_complete(1, 5, 42);
        cb.on_page_error(2, 5, "some error");
        cb.on_run_complete(5, 4);
    }

    #[test]
    fn tracker_walks_the_state_machine() {
        let rec = Arc::new(Recorder::default());
        let mut t = ProgressTracker::new(Some(rec.clone() as ProgressCallback));
        assert_eq!(t.snapshot().phase, Phase::Idle);

        t.transition(Phase::Reading);
        t.set_total(3);
        for i in 0..3 {
            t.page(Phase::Rendering, i);
        }
        t.transition(Phase::Finalizing);
        t.finish(3);

        assert_eq!(
            *rec.phases.lock().unwrap(),
            vec![Phase::Reading, Phase::Rendering, Phase::Finalizing, Phase::Done]
        );
        assert_eq!(*rec.pages.lock().unwrap(), vec![(1, 3), (2, 3), (3, 3)]);
        assert_eq!(*rec.completed.lock().unwrap(), Some((3, 3)));
        assert_eq!(
            t.snapshot(),
            PipelineProgress {
                current_page: 3,
                total_pages: 3,
                phase: Phase::Done
            }
        );
    }

    #[test]
    fn terminal_phases_absorb() {
        let mut t = ProgressTracker::new(None);
        t.transition(Phase::Reading);
        t.transition(Phase::Errored);
        t.transition(Phase::Finalizing);
        t.finish(0);
        assert_eq!(t.snapshot().phase, Phase::Errored);
    }

    #[test]
    fn current_page_never_decreases() {
        let mut t = ProgressTracker::new(None);
        t.set_total(4);
        t.page(Phase::Copying, 2);
        t.page(Phase::Copying, 0);
        assert_eq!(t.snapshot().current_page, 3);
    }

    #[test]
    fn phase_display() {
        assert_eq!(Phase::Finalizing.to_string(), "finalizing");
        assert!(Phase::Cancelled.is_terminal());
        assert!(!Phase::Rendering.is_terminal());
    }
}
