//! Per-document outcomes and the aggregated run summary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Lifecycle stage of a source document.
///
/// Advanced exclusively by the orchestrator; `Done` and `Errored` are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentStage {
    /// Discovered in the raw input directory, not yet sanitized.
    Raw,
    /// Renamed and moved into the slides directory; ready for processing.
    Sanitized,
    /// Page range split into chunk spans.
    Chunked,
    /// Chunks are being submitted to the extraction backend.
    Extracting,
    /// All cards extracted and the per-document deck written.
    Done,
    /// A document-scoped failure ended processing for this document.
    Errored,
}

impl fmt::Display for DocumentStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DocumentStage::Raw => "raw",
            DocumentStage::Sanitized => "sanitized",
            DocumentStage::Chunked => "chunked",
            DocumentStage::Extracting => "extracting",
            DocumentStage::Done => "done",
            DocumentStage::Errored => "errored",
        };
        f.write_str(s)
    }
}

/// Final record for one processed document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    /// Document identifier (sanitized file stem).
    pub document: String,
    /// Terminal stage: `Done` or `Errored`.
    pub stage: DocumentStage,
    /// Number of cards extracted (0 when errored).
    pub cards: usize,
    /// Human-readable failure, when errored. Full detail lives in the sink.
    pub error: Option<String>,
}

impl RunOutcome {
    pub fn done(document: impl Into<String>, cards: usize) -> Self {
        Self {
            document: document.into(),
            stage: DocumentStage::Done,
            cards,
            error: None,
        }
    }

    pub fn errored(document: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            document: document.into(),
            stage: DocumentStage::Errored,
            cards: 0,
            error: Some(error.into()),
        }
    }
}

/// Aggregated result of one pipeline run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    /// One outcome per discovered document, in processing order.
    pub outcomes: Vec<RunOutcome>,
    /// Final location of the master deck, when a merge was requested and
    /// succeeded.
    pub master_deck: Option<PathBuf>,
    /// Run-level failures (merge, archival) collected after every document
    /// was attempted.
    pub run_errors: Vec<String>,
}

impl RunSummary {
    /// Count of documents that reached `Done`.
    pub fn processed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.stage == DocumentStage::Done)
            .count()
    }

    /// Count of documents that ended `Errored`.
    pub fn errored(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.stage == DocumentStage::Errored)
            .count()
    }

    /// Total cards extracted across all documents.
    pub fn total_cards(&self) -> usize {
        self.outcomes.iter().map(|o| o.cards).sum()
    }

    /// True when the process should exit non-zero: any document errored, or
    /// a run-level failure occurred.
    pub fn is_failure(&self) -> bool {
        self.errored() > 0 || !self.run_errors.is_empty()
    }
}
