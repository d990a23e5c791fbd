//! Error types for the deckforge library.
//!
//! Two distinct error layers reflect two distinct failure scopes:
//!
//! * [`DeckforgeError`] — **Run-level**: the run cannot proceed at all
//!   (missing prompt, unconfigured backend, unusable workspace), or a
//!   finalisation step failed after every document was attempted (merge,
//!   archival moves). Returned as `Err(DeckforgeError)` from [`crate::run`]
//!   for setup failures; merge/lifecycle failures are carried in
//!   [`crate::outcome::RunSummary::run_errors`] instead so the per-document
//!   outcomes survive.
//!
//! * [`DocumentError`] — **Document-scoped**: one document failed (corrupt
//!   PDF, unsatisfiable chunk bounds, extraction exhausted its retries) but
//!   its siblings are fine. Folded into that document's
//!   [`crate::outcome::RunOutcome`]; never aborts the run.
//!
//! [`ConversionError`] is narrower still — one malformed card inside an
//! otherwise healthy document. The card is dropped and logged; the
//! document's other cards are unaffected.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal and run-level errors.
#[derive(Debug, Error)]
pub enum DeckforgeError {
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The named prompt file does not exist.
    #[error("Prompt file not found: '{path}'\nPlace a .txt prompt in the workspace prompts/ directory.")]
    PromptNotFound { path: PathBuf },

    /// The selected backend has no credential configured.
    #[error("Extraction backend '{backend}' is not configured.\n{hint}")]
    BackendNotConfigured { backend: String, hint: String },

    /// A workspace directory or file could not be created or read.
    #[error("Workspace error at '{path}': {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Chunk planning failed: no chunk count can cover the document within the
/// configured page bounds.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkingError {
    /// The document has no pages.
    #[error("Document has no pages to chunk")]
    EmptyDocument,

    /// No integer chunk count satisfies the MIN bound for this page count.
    #[error(
        "Cannot split {pages} pages into chunks of {min}\u{2013}{max} pages: \
         {count} chunk(s) would leave a chunk below {min} pages"
    )]
    UnsatisfiableBounds {
        pages: usize,
        min: usize,
        max: usize,
        count: usize,
    },
}

/// A non-fatal error scoped to a single document.
///
/// Recorded against the document's outcome; the orchestrator proceeds to the
/// next document.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The PDF could not be loaded or split.
    #[error("Cannot read PDF: {detail}")]
    UnreadablePdf { detail: String },

    /// Chunk planning failed for this document's page count.
    #[error(transparent)]
    Chunking(#[from] ChunkingError),

    /// Extraction gave up: a fatal failure, or retries exhausted. Both
    /// arrive here in the same shape.
    #[error("Extraction failed after {attempts} attempt(s): {detail}")]
    ExtractionFailed { attempts: u32, detail: String },

    /// An intermediate artifact (chunk PDF, card JSON, per-document deck)
    /// could not be written.
    #[error("Failed to write '{path}': {source}")]
    ArtifactWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One malformed card inside an otherwise valid response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Malformed card: {reason}")]
pub struct ConversionError {
    pub reason: String,
}

/// Master-deck assembly failed.
#[derive(Debug, Error)]
pub enum MergeError {
    /// Every document produced an empty deck; there is nothing to merge.
    #[error("No deck rows to merge: every processed document produced an empty deck")]
    NoRows,

    /// The master deck file could not be written.
    #[error("Failed to write master deck '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// An archival move or cleanup failed.
///
/// Moves refuse to overwrite: an existing destination is an error, not a
/// replace.
#[derive(Debug, Error)]
pub enum FileLifecycleError {
    /// The destination of an archival move already exists.
    #[error("Archive destination already exists: '{dest}' (refusing to overwrite)")]
    DestinationExists { dest: PathBuf },

    /// The file to archive is gone.
    #[error("Missing source for archival move: '{src}'")]
    MissingSource { src: PathBuf },

    /// The rename itself failed.
    #[error("Failed to move '{src}' to '{dest}': {source}")]
    Move {
        src: PathBuf,
        dest: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Deleting an intermediate artifact failed.
    #[error("Failed to delete '{path}': {source}")]
    Delete {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsatisfiable_bounds_display() {
        let e = ChunkingError::UnsatisfiableBounds {
            pages: 45,
            min: 25,
            max: 40,
            count: 2,
        };
        let msg = e.to_string();
        assert!(msg.contains("45 pages"), "got: {msg}");
        assert!(msg.contains("2 chunk(s)"), "got: {msg}");
    }

    #[test]
    fn extraction_failed_display() {
        let e = DocumentError::ExtractionFailed {
            attempts: 4,
            detail: "rate limited".into(),
        };
        assert!(e.to_string().contains("4 attempt(s)"));
        assert!(e.to_string().contains("rate limited"));
    }

    #[test]
    fn destination_exists_display() {
        let e = FileLifecycleError::DestinationExists {
            dest: PathBuf::from("/w/slides/done/deck.pdf"),
        };
        assert!(e.to_string().contains("refusing to overwrite"));
    }
}
