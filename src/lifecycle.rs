//! File lifecycle: archival moves and cleanup at run end.
//!
//! Three orthogonal run-mode flags decide where a document's files end up
//! once its extraction is finalized:
//!
//! | compare | no_cleanup | merge | input doc → | card JSON → | deck → |
//! |---------|------------|-------|-------------|-------------|--------|
//! | true    | –          | –     | unchanged   | unchanged   | unchanged |
//! | false   | false      | false | slides/done | deleted     | decks/done |
//! | false   | false      | true  | slides/done | deleted     | deleted |
//! | false   | true       | false | slides/done | cards/done  | decks/done |
//! | false   | true       | true  | slides/done | cards/done  | deleted |
//!
//! Compare mode leaves everything in place so repeated runs see identical
//! inputs. When a merge was requested, only the master deck survives; the
//! per-document decks are redundant copies of its rows.
//!
//! Moves are single renames, atomic for one document, and refuse to
//! overwrite: an existing destination is a [`FileLifecycleError`], as is a
//! missing source. Finalisation runs strictly after all of a document's
//! extraction is done, so a document is never read and archived at the same
//! time.

use crate::error::FileLifecycleError;
use crate::workspace::Workspace;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// The run-mode flags driving the transition table.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunMode {
    /// Leave every file untouched.
    pub compare: bool,
    /// Archive intermediates instead of deleting them.
    pub no_cleanup: bool,
    /// A master deck was produced; per-document decks are disposable.
    pub merge_requested: bool,
}

/// Applies the transition table to one document at a time.
pub struct FileLifecycleManager<'a> {
    workspace: &'a Workspace,
    mode: RunMode,
}

impl<'a> FileLifecycleManager<'a> {
    pub fn new(workspace: &'a Workspace, mode: RunMode) -> Self {
        Self { workspace, mode }
    }

    /// Archive / clean up one successfully processed document.
    ///
    /// `source` is the document's current path in the slides directory.
    pub fn finalize_document(
        &self,
        document: &str,
        source: &Path,
    ) -> Result<(), FileLifecycleError> {
        if self.mode.compare {
            debug!("{document}: compare mode, leaving files in place");
            return Ok(());
        }

        // Input document is always archived.
        self.archive(source, &self.workspace.slides_done())?;

        // Intermediate card JSON: archived or deleted.
        let card_json = self.workspace.card_json(document);
        if self.mode.no_cleanup {
            self.archive(&card_json, &self.workspace.cards_done())?;
        } else {
            remove(&card_json)?;
        }

        // Per-document deck: redundant once merged into a master.
        let deck = self.workspace.deck(document);
        if self.mode.merge_requested {
            remove(&deck)?;
        } else {
            self.archive(&deck, &self.workspace.decks_done())?;
        }

        info!("{document}: archived");
        Ok(())
    }

    /// Move the master deck into the deck archive, returning its final path.
    pub fn finalize_master(&self, master: &Path) -> Result<PathBuf, FileLifecycleError> {
        if self.mode.compare {
            return Ok(master.to_path_buf());
        }
        self.archive(master, &self.workspace.decks_done())?;
        let file_name = master
            .file_name()
            .ok_or_else(|| FileLifecycleError::MissingSource {
                src: master.to_path_buf(),
            })?;
        Ok(self.workspace.decks_done().join(file_name))
    }

    /// Rename `src` into `dest_dir`, keeping the file name.
    fn archive(&self, src: &Path, dest_dir: &Path) -> Result<(), FileLifecycleError> {
        if !src.exists() {
            return Err(FileLifecycleError::MissingSource {
                src: src.to_path_buf(),
            });
        }
        let file_name = src
            .file_name()
            .ok_or_else(|| FileLifecycleError::MissingSource {
                src: src.to_path_buf(),
            })?;
        let dest = dest_dir.join(file_name);
        if dest.exists() {
            return Err(FileLifecycleError::DestinationExists { dest });
        }
        std::fs::rename(src, &dest).map_err(|source| FileLifecycleError::Move {
            src: src.to_path_buf(),
            dest,
            source,
        })
    }
}

fn remove(path: &Path) -> Result<(), FileLifecycleError> {
    if !path.exists() {
        // Nothing to clean.
        return Ok(());
    }
    std::fs::remove_file(path).map_err(|source| FileLifecycleError::Delete {
        path: path.to_path_buf(),
        source,
    })
}
