//! # deckforge
//!
//! Turn slide-deck PDFs into importable flashcard decks using LLM
//! extraction.
//!
//! ## Why this crate?
//!
//! Hand-writing flashcards from lecture slides is slow and lossy. This crate
//! batch-drives a whole directory of decks through an AI extraction backend
//! and produces one importable master deck, with per-document failure
//! isolation so a single corrupt PDF or rate-limited call never costs the
//! rest of the batch.
//!
//! ## Pipeline Overview
//!
//! ```text
//! raw/
//!  │
//!  ├─ 1. Sanitize  fold diacritics, rename into slides/
//!  ├─ 2. Chunk     split page range into bounded spans (lopdf)
//!  ├─ 3. Extract   one backend call per chunk, fixed-delay retry
//!  ├─ 4. Transform cards → tagged, escaped deck rows
//!  ├─ 5. Merge     per-document decks → master deck (optional)
//!  └─ 6. Archive   run-mode flags decide what moves, what is deleted
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use deckforge::{run, BackendKind, RunConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Credential read from GEMINI_API_KEY / CLAUDE_API_KEY
//!     let config = RunConfig::builder("./workspace")
//!         .backend(BackendKind::Gemini)
//!         .prompt("qa_cloze")
//!         .merge(Some("master".into()))
//!         .build()?;
//!     let summary = run(&config).await?;
//!     println!("{} processed, {} errored", summary.processed(), summary.errored());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `deckforge` binary (clap + anyhow + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! deckforge = { version = "0.1", default-features = false }
//! ```
//!
//! ## Run-mode flags
//!
//! Three orthogonal switches control final artifact placement: `--compare`
//! leaves every file where it is for repeatable comparison runs,
//! `--no-cleanup` archives intermediate card JSON instead of deleting it,
//! and `--merge` keeps only the master deck. The full transition table lives
//! in [`lifecycle`].

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backend;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod outcome;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod run;
pub mod sanitize;
pub mod sink;
pub mod workspace;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backend::{ClaudeBackend, ExtractError, ExtractedCard, ExtractionBackend, GeminiBackend};
pub use config::{BackendKind, RunConfig, RunConfigBuilder};
pub use error::{
    ChunkingError, ConversionError, DeckforgeError, DocumentError, FileLifecycleError, MergeError,
};
pub use outcome::{DocumentStage, RunOutcome, RunSummary};
pub use progress::{ProgressCallback, RunProgress};
pub use run::run;
pub use workspace::Workspace;
