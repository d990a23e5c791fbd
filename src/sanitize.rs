//! Filename sanitization: raw/ → slides/.
//!
//! Slide decks arrive named by lecturers — diacritics, Turkish characters,
//! spaces. Those names leak into deck tags and trip up shell tooling, so
//! incoming documents are renamed to plain ASCII-ish stems before the
//! pipeline sees them. A per-file failure skips that file and logs it; the
//! rest of the batch proceeds.

use crate::sink::{ErrorSink, SinkRecord};
use crate::workspace::Workspace;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Map one character to its sanitized replacement, or pass it through.
///
/// Covers the Turkish set plus the Latin-1/Latin-Extended diacritics that
/// show up in practice. Combining marks (U+0300–U+036F) are dropped so
/// decomposed input loses its accents the same way precomposed input does.
fn map_char(ch: char) -> Option<char> {
    let mapped = match ch {
        'ç' | 'ć' | 'č' => 'c',
        'Ç' | 'Ć' | 'Č' => 'C',
        'ğ' => 'g',
        'Ğ' => 'G',
        'ı' | 'í' | 'ì' | 'î' | 'ï' => 'i',
        'İ' | 'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
        'ö' | 'ó' | 'ò' | 'ô' | 'õ' | 'ø' => 'o',
        'Ö' | 'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ø' => 'O',
        'ş' | 'ś' | 'š' => 's',
        'Ş' | 'Ś' | 'Š' => 'S',
        'ü' | 'ú' | 'ù' | 'û' => 'u',
        'Ü' | 'Ú' | 'Ù' | 'Û' => 'U',
        'ä' | 'á' | 'à' | 'â' | 'ã' | 'å' => 'a',
        'Ä' | 'Á' | 'À' | 'Â' | 'Ã' | 'Å' => 'A',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'ñ' | 'ń' => 'n',
        'Ñ' | 'Ń' => 'N',
        'ý' | 'ÿ' => 'y',
        'Ý' => 'Y',
        'ž' | 'ź' | 'ż' => 'z',
        'Ž' | 'Ź' | 'Ż' => 'Z',
        ' ' => '_',
        '\u{0300}'..='\u{036F}' => return None,
        other => other,
    };
    Some(mapped)
}

/// Sanitize a file stem: fold diacritics, replace spaces with underscores.
pub fn sanitize_name(name: &str) -> String {
    name.chars().filter_map(map_char).collect()
}

/// First free path for `filename` in `dir`, suffixing `_2`, `_3`, … before
/// the extension when the name is taken.
pub fn unique_path(dir: &Path, filename: &str) -> PathBuf {
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

/// Sanitize and move every PDF in `raw/` into `slides/`.
///
/// Returns the number of documents moved. Per-file move failures are logged
/// to the sink and skipped.
pub fn run(workspace: &Workspace, sink: &ErrorSink) -> Result<usize, crate::error::DeckforgeError> {
    let raw_files = workspace.list_pdfs(&workspace.raw())?;
    info!("sanitizer: {} raw document(s)", raw_files.len());

    let mut moved = 0;
    for path in raw_files {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        let target = unique_path(&workspace.slides(), &format!("{}{ext}", sanitize_name(&stem)));
        match std::fs::rename(&path, &target) {
            Ok(()) => {
                info!(
                    "sanitizer: {} -> {}",
                    file_name,
                    target.file_name().unwrap_or_default().to_string_lossy()
                );
                moved += 1;
            }
            Err(err) => {
                warn!("sanitizer: could not move {file_name}: {err}");
                sink.append(
                    SinkRecord::new("sanitizer", format!("Move to slides failed: {err}"))
                        .document(file_name),
                );
            }
        }
    }
    Ok(moved)
}
