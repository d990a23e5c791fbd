//! Progress reporting hooks.
//!
//! The library stays silent on stdout; callers that want live feedback (the
//! CLI's progress bar, a GUI, tests) register a callback and render it
//! however they like. All methods have empty default bodies so implementors
//! override only what they care about.

use std::sync::Arc;

/// Callback invoked by the orchestrator as documents move through the run.
///
/// Implementations must be thread-safe: chunk workers may complete on any
/// tokio worker thread.
pub trait RunProgress: Send + Sync {
    /// Called once, after discovery, with the number of documents to process.
    fn on_run_start(&self, _total_documents: usize) {}

    /// Called when a document begins processing (1-indexed position).
    fn on_document_start(&self, _document: &str, _index: usize, _total: usize) {}

    /// Called when a document reaches `Done`.
    fn on_document_done(&self, _document: &str, _cards: usize) {}

    /// Called when a document ends `Errored`.
    fn on_document_error(&self, _document: &str, _error: &str) {}

    /// Called after lifecycle finalisation, before the summary is returned.
    fn on_run_complete(&self, _processed: usize, _errored: usize) {}
}

/// Shared handle to a progress callback.
pub type ProgressCallback = Arc<dyn RunProgress>;
