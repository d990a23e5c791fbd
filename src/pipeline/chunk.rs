//! Chunk planning and materialization.
//!
//! Large documents are split into bounded, contiguous page ranges so each
//! extraction call fits the backend's token budget. Planning is pure
//! arithmetic over `(page_count, min, max)`; materialization writes each
//! span as a standalone PDF via lopdf.
//!
//! ## Invariants
//!
//! The spans of one document tile `[1, page_count]` exactly — no gaps, no
//! overlaps, increasing page order. Every span holds between `min` and `max`
//! pages, except a document of `max` pages or fewer, which is always a
//! single span. Span order is preserved end-to-end into deck-row order.

use crate::error::{ChunkingError, DocumentError};
use lopdf::Document;
use std::path::Path;

/// A contiguous, non-overlapping page sub-range of one document.
///
/// Pages are 1-indexed and the range is inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
    /// Position in the document's chunk sequence, starting at 0. Results
    /// are reassembled by this index, never by completion order.
    pub index: usize,
    pub start_page: usize,
    pub end_page: usize,
}

impl ChunkSpan {
    pub fn page_count(&self) -> usize {
        self.end_page - self.start_page + 1
    }
}

/// Plan the chunk spans for a document of `pages` pages.
///
/// A document of `max` pages or fewer is one span. Otherwise the page range
/// is divided into `ceil(pages / max)` spans whose sizes differ by at most
/// one page; when even that distribution drops a span below `min`, no
/// integer chunk count can work and planning fails.
pub fn plan_chunks(
    pages: usize,
    min: usize,
    max: usize,
) -> Result<Vec<ChunkSpan>, ChunkingError> {
    debug_assert!(min >= 1 && min <= max, "bounds validated at startup");

    if pages == 0 {
        return Err(ChunkingError::EmptyDocument);
    }
    if pages <= max {
        return Ok(vec![ChunkSpan {
            index: 0,
            start_page: 1,
            end_page: pages,
        }]);
    }

    let count = pages.div_ceil(max);
    let base = pages / count;
    let remainder = pages % count;

    // The smallest span gets `base` pages; if that violates the floor there
    // is no valid split for this page count.
    if base < min {
        return Err(ChunkingError::UnsatisfiableBounds {
            pages,
            min,
            max,
            count,
        });
    }

    let mut spans = Vec::with_capacity(count);
    let mut start = 1;
    for index in 0..count {
        // Front-load the extra pages from the remainder.
        let size = if index < remainder { base + 1 } else { base };
        spans.push(ChunkSpan {
            index,
            start_page: start,
            end_page: start + size - 1,
        });
        start += size;
    }
    Ok(spans)
}

/// Count the pages of a PDF on disk.
pub fn page_count(path: &Path) -> Result<usize, DocumentError> {
    let doc = Document::load(path).map_err(|err| DocumentError::UnreadablePdf {
        detail: format!("'{}': {err}", path.display()),
    })?;
    Ok(doc.get_pages().len())
}

/// Write the pages of `span` from `source` into a standalone PDF at `dest`.
///
/// Loads a fresh copy of the source and deletes every page outside the span,
/// so the chunk carries its own object table and opens anywhere.
pub fn write_chunk(source: &Path, span: &ChunkSpan, dest: &Path) -> Result<(), DocumentError> {
    let mut doc = Document::load(source).map_err(|err| DocumentError::UnreadablePdf {
        detail: format!("'{}': {err}", source.display()),
    })?;

    let total = doc.get_pages().len();
    let delete: Vec<u32> = (1..=total as u32)
        .filter(|&page| (page as usize) < span.start_page || (page as usize) > span.end_page)
        .collect();

    doc.delete_pages(&delete);
    doc.prune_objects();
    doc.save(dest).map_err(|err| DocumentError::ArtifactWrite {
        path: dest.to_path_buf(),
        source: std::io::Error::other(err),
    })?;
    Ok(())
}
