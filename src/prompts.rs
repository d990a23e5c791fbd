//! Prompt-file loading.
//!
//! Prompts live as plain `.txt` files in the workspace prompts directory so
//! they can be edited and versioned without touching code. The pipeline
//! loads exactly one per run; which one is a CLI choice.

use crate::error::DeckforgeError;
use std::path::Path;

/// Load a prompt by name, appending `.txt` when the extension is missing.
pub fn load_prompt(dir: &Path, name: &str) -> Result<String, DeckforgeError> {
    let file_name = if name.ends_with(".txt") {
        name.to_string()
    } else {
        format!("{name}.txt")
    };
    let path = dir.join(file_name);

    if !path.exists() {
        return Err(DeckforgeError::PromptNotFound { path });
    }
    std::fs::read_to_string(&path).map_err(|source| DeckforgeError::Workspace { path, source })
}

/// Sorted stems of every `.txt` prompt in `dir`, for CLI discovery.
pub fn list_prompts(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file() && path.extension().map(|e| e == "txt").unwrap_or(false)
        })
        .filter_map(|path| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .collect();
    names.sort();
    names
}
