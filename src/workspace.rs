//! Workspace directory layout.
//!
//! Every stage of the pipeline has a fixed home under one workspace root:
//!
//! ```text
//! <root>/
//!   raw/           incoming documents, pre-sanitization
//!   slides/        sanitized inputs (the pipeline reads here)
//!   slides/done/   archived inputs
//!   cards/         per-document extracted-card JSON (intermediate)
//!   cards/done/    archived intermediates (kept only with --no-cleanup)
//!   decks/         per-document decks and the master deck
//!   decks/done/    archived decks
//!   errors/        errors.log (append-only sink)
//!   prompts/       prompt .txt files
//! ```
//!
//! Keeping the layout in one type means the lifecycle manager, the
//! orchestrator, and the tests all agree on where an artifact lives at each
//! stage — there is exactly one function per location.

use crate::error::DeckforgeError;
use std::path::{Path, PathBuf};

/// Handle to the workspace root and its stage directories.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn raw(&self) -> PathBuf {
        self.root.join("raw")
    }

    pub fn slides(&self) -> PathBuf {
        self.root.join("slides")
    }

    pub fn slides_done(&self) -> PathBuf {
        self.slides().join("done")
    }

    pub fn cards(&self) -> PathBuf {
        self.root.join("cards")
    }

    pub fn cards_done(&self) -> PathBuf {
        self.cards().join("done")
    }

    pub fn decks(&self) -> PathBuf {
        self.root.join("decks")
    }

    pub fn decks_done(&self) -> PathBuf {
        self.decks().join("done")
    }

    pub fn errors(&self) -> PathBuf {
        self.root.join("errors")
    }

    pub fn prompts(&self) -> PathBuf {
        self.root.join("prompts")
    }

    /// Intermediate card JSON for one document.
    pub fn card_json(&self, document: &str) -> PathBuf {
        self.cards().join(format!("{document}.json"))
    }

    /// Per-document deck file.
    pub fn deck(&self, document: &str) -> PathBuf {
        self.decks().join(format!("{document}.csv"))
    }

    /// Create every stage directory that does not exist yet.
    pub fn ensure(&self) -> Result<(), DeckforgeError> {
        for dir in [
            self.raw(),
            self.slides(),
            self.slides_done(),
            self.cards(),
            self.cards_done(),
            self.decks(),
            self.decks_done(),
            self.errors(),
            self.prompts(),
        ] {
            std::fs::create_dir_all(&dir).map_err(|source| DeckforgeError::Workspace {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// List PDF files directly inside `dir`, sorted case-insensitively.
    ///
    /// Subdirectories (including `done/`) are skipped, so archived documents
    /// are never rediscovered as inputs.
    pub fn list_pdfs(&self, dir: &Path) -> Result<Vec<PathBuf>, DeckforgeError> {
        let entries = std::fs::read_dir(dir).map_err(|source| DeckforgeError::Workspace {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
                        .unwrap_or(false)
            })
            .collect();

        files.sort_by_key(|path| {
            path.file_name()
                .map(|name| name.to_string_lossy().to_lowercase())
                .unwrap_or_default()
        });
        Ok(files)
    }
}
