//! Master-deck assembly.
//!
//! Concatenates the per-document deck rows — in document-processing order —
//! under a single header. The merge is a pure function of its inputs, so
//! identical inputs produce byte-identical output; tests rely on that
//! idempotence. Writing is separate from assembling and never overwrites an
//! existing master: a name collision gets a `_2`, `_3`, … suffix instead.

use crate::error::MergeError;
use crate::pipeline::transform::{render_row, DeckRow, DECK_HEADER};
use std::path::{Path, PathBuf};
use tracing::info;

/// Assemble the master-deck content from per-document row lists.
///
/// Document order is preserved exactly as given; rows within a document keep
/// their extraction order. Fails when no document contributed any rows.
pub fn merge_rows(decks: &[(String, Vec<DeckRow>)]) -> Result<String, MergeError> {
    let total: usize = decks.iter().map(|(_, rows)| rows.len()).sum();
    if total == 0 {
        return Err(MergeError::NoRows);
    }

    let mut out = String::with_capacity(total * 64);
    out.push_str(DECK_HEADER);
    out.push('\n');
    for (_, rows) in decks {
        for row in rows {
            out.push_str(&render_row(row));
            out.push('\n');
        }
    }
    info!(
        "merged {} row(s) from {} document(s)",
        total,
        decks.iter().filter(|(_, rows)| !rows.is_empty()).count()
    );
    Ok(out)
}

/// Normalize the requested output name: append `.csv` when missing.
pub fn master_file_name(output_name: &str) -> String {
    if output_name.to_lowercase().ends_with(".csv") {
        output_name.to_string()
    } else {
        format!("{output_name}.csv")
    }
}

/// First free path for `filename` in `dir`, suffixing `_2`, `_3`, … before
/// the extension when the name is taken.
pub fn unique_output_path(dir: &Path, filename: &str) -> PathBuf {
    let candidate = dir.join(filename);
    if !candidate.exists() {
        return candidate;
    }

    let stem = Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_string());
    let ext = Path::new(filename)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut counter = 2;
    loop {
        let candidate = dir.join(format!("{stem}_{counter}{ext}"));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// Write the assembled master deck into `dir` and return its path.
pub fn write_master(dir: &Path, output_name: &str, content: &str) -> Result<PathBuf, MergeError> {
    let path = unique_output_path(dir, &master_file_name(output_name));
    std::fs::write(&path, content).map_err(|source| MergeError::Write {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}
