//! Pipeline orchestration: the full sanitize → chunk → extract → transform →
//! merge/archive sequence.
//!
//! ## Failure isolation
//!
//! Every document is processed inside its own error boundary: a corrupt PDF,
//! an unsatisfiable chunk split, or an extraction that exhausts its retries
//! marks *that* document `Errored` and the loop moves on. Only setup
//! failures (missing prompt, unconfigured backend, unusable workspace)
//! abort the run before documents are attempted, and merge/archival
//! failures are collected into [`RunSummary::run_errors`] *after* every
//! document has been attempted — a bad document or a full archive never
//! costs the rest of the batch.

use crate::backend::{self, ExtractionBackend};
use crate::config::RunConfig;
use crate::error::{DeckforgeError, DocumentError};
use crate::lifecycle::{FileLifecycleManager, RunMode};
use crate::outcome::{DocumentStage, RunOutcome, RunSummary};
use crate::pipeline::chunk;
use crate::pipeline::extract::{self, RetryPolicy};
use crate::pipeline::merge;
use crate::pipeline::transform::{self, DeckRow};
use crate::sanitize;
use crate::sink::{ErrorSink, SinkRecord};
use crate::workspace::Workspace;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// One input document moving through the pipeline.
///
/// The stage is advanced exclusively here, in the orchestrator; components
/// receive the document's data but never touch its state.
#[derive(Debug)]
struct SourceDocument {
    id: String,
    path: PathBuf,
    page_count: usize,
    stage: DocumentStage,
}

impl SourceDocument {
    /// A document found in the slides directory has already been sanitized.
    fn discovered(path: PathBuf) -> Self {
        let id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            id,
            path,
            page_count: 0,
            stage: DocumentStage::Sanitized,
        }
    }

    fn advance(&mut self, stage: DocumentStage) {
        debug!("{}: {} -> {}", self.id, self.stage, stage);
        self.stage = stage;
    }
}

/// Execute one full pipeline run.
///
/// Returns `Err` only for setup failures; per-document and run-level
/// finalisation failures are reported through the summary. Callers decide
/// exit status via [`RunSummary::is_failure`].
pub async fn run(config: &RunConfig) -> Result<RunSummary, DeckforgeError> {
    let started = Instant::now();
    let workspace = Workspace::new(&config.root);
    workspace.ensure()?;

    let sink = ErrorSink::open(&workspace.errors()).map_err(|source| {
        DeckforgeError::Workspace {
            path: workspace.errors(),
            source,
        }
    })?;

    // ── Setup: prompt and backend ────────────────────────────────────────
    let prompt = match crate::prompts::load_prompt(&workspace.prompts(), &config.prompt) {
        Ok(text) => text,
        Err(err) => {
            sink.append(SinkRecord::new("orchestrator", err.to_string()).prompt(&config.prompt));
            return Err(err);
        }
    };

    let backend = match resolve_backend(config) {
        Ok(backend) => backend,
        Err(err) => {
            sink.append(SinkRecord::new("orchestrator", err.to_string()));
            return Err(err);
        }
    };
    info!(
        "run: backend={}, prompt={}, workspace={}",
        backend.name(),
        config.prompt,
        workspace.root().display()
    );

    // ── Sanitize raw inputs ──────────────────────────────────────────────
    if !config.skip_sanitize {
        let moved = sanitize::run(&workspace, &sink)?;
        debug!("sanitizer moved {moved} document(s)");
    }

    // ── Discover documents ───────────────────────────────────────────────
    let inputs = workspace.list_pdfs(&workspace.slides())?;
    info!("run: {} document(s) to process", inputs.len());
    if let Some(cb) = &config.progress {
        cb.on_run_start(inputs.len());
    }

    // ── Per-document processing ──────────────────────────────────────────
    let total = inputs.len();
    let mut outcomes: Vec<RunOutcome> = Vec::with_capacity(total);
    let mut decks: Vec<(String, Vec<DeckRow>)> = Vec::new();
    let mut finalize_paths: Vec<(String, PathBuf)> = Vec::new();

    for (index, path) in inputs.into_iter().enumerate() {
        let mut document = SourceDocument::discovered(path);
        info!(
            "({}/{}) processing {}",
            index + 1,
            total,
            document.id
        );
        if let Some(cb) = &config.progress {
            cb.on_document_start(&document.id, index + 1, total);
        }

        match process_document(&workspace, &backend, &prompt, config, &sink, &mut document).await
        {
            Ok((rows, cards)) => {
                document.advance(DocumentStage::Done);
                if let Some(cb) = &config.progress {
                    cb.on_document_done(&document.id, cards);
                }
                finalize_paths.push((document.id.clone(), document.path.clone()));
                outcomes.push(RunOutcome::done(&document.id, cards));
                decks.push((document.id, rows));
            }
            Err(err) => {
                document.advance(DocumentStage::Errored);
                warn!("{}: {err}", document.id);
                sink.append(
                    SinkRecord::new("orchestrator", err.to_string())
                        .document(&document.id)
                        .prompt(&config.prompt),
                );
                if let Some(cb) = &config.progress {
                    cb.on_document_error(&document.id, &err.to_string());
                }
                outcomes.push(RunOutcome::errored(&document.id, err.to_string()));
            }
        }
    }

    let mut run_errors: Vec<String> = Vec::new();

    // ── Merge ────────────────────────────────────────────────────────────
    // Runs before lifecycle finalisation so per-document decks are only
    // deleted once their rows live in a master deck.
    let mut master: Option<PathBuf> = None;
    let mut merge_succeeded = false;
    if let Some(output_name) = &config.merge {
        match merge::merge_rows(&decks)
            .and_then(|content| merge::write_master(&workspace.decks(), output_name, &content))
        {
            Ok(path) => {
                info!("master deck written to {}", path.display());
                master = Some(path);
                merge_succeeded = true;
            }
            Err(err) => {
                warn!("merge failed: {err}");
                sink.append(SinkRecord::new("merge", err.to_string()));
                run_errors.push(err.to_string());
            }
        }
    }

    // ── Lifecycle finalisation ───────────────────────────────────────────
    // A failed merge downgrades deck disposal to archival: per-document
    // decks are the only surviving copy of their rows at that point.
    let mode = RunMode {
        compare: config.compare_mode,
        no_cleanup: config.no_cleanup,
        merge_requested: merge_succeeded,
    };
    let lifecycle = FileLifecycleManager::new(&workspace, mode);

    for (id, path) in &finalize_paths {
        if let Err(err) = lifecycle.finalize_document(id, path) {
            warn!("{id}: {err}");
            sink.append(SinkRecord::new("lifecycle", err.to_string()).document(id));
            run_errors.push(err.to_string());
        }
    }
    if let Some(path) = master.take() {
        match lifecycle.finalize_master(&path) {
            Ok(final_path) => master = Some(final_path),
            Err(err) => {
                warn!("master deck: {err}");
                sink.append(SinkRecord::new("lifecycle", err.to_string()));
                run_errors.push(err.to_string());
                master = Some(path);
            }
        }
    }

    let summary = RunSummary {
        outcomes,
        master_deck: master,
        run_errors,
    };
    info!(
        "run complete: {} processed, {} errored, {} card(s), {:.1}s",
        summary.processed(),
        summary.errored(),
        summary.total_cards(),
        started.elapsed().as_secs_f64()
    );
    if let Some(cb) = &config.progress {
        cb.on_run_complete(summary.processed(), summary.errored());
    }
    Ok(summary)
}

/// Resolve the extraction backend, most-specific first: a pre-built override
/// (tests, custom middleware), else the factory for the configured kind.
fn resolve_backend(config: &RunConfig) -> Result<Arc<dyn ExtractionBackend>, DeckforgeError> {
    if let Some(backend) = &config.backend_override {
        return Ok(Arc::clone(backend));
    }
    backend::create_backend(config.backend, config.model.as_deref())
}

/// Drive one document through chunk → extract → transform, writing its card
/// JSON and per-document deck.
async fn process_document(
    workspace: &Workspace,
    backend: &Arc<dyn ExtractionBackend>,
    prompt: &str,
    config: &RunConfig,
    sink: &ErrorSink,
    document: &mut SourceDocument,
) -> Result<(Vec<DeckRow>, usize), DocumentError> {
    // Page counting loads the PDF; lopdf is synchronous, keep it off the
    // async workers.
    let path = document.path.clone();
    document.page_count = tokio::task::spawn_blocking(move || chunk::page_count(&path))
        .await
        .map_err(|err| DocumentError::UnreadablePdf {
            detail: format!("page counter task failed: {err}"),
        })??;

    let spans = chunk::plan_chunks(
        document.page_count,
        config.chunk_min_pages,
        config.chunk_max_pages,
    )?;
    document.advance(DocumentStage::Chunked);
    debug!(
        "{}: {} page(s) in {} chunk(s)",
        document.id,
        document.page_count,
        spans.len()
    );

    document.advance(DocumentStage::Extracting);
    let cards = extract::extract_document(
        backend,
        &document.id,
        &document.path,
        &spans,
        prompt,
        &config.prompt,
        RetryPolicy {
            max_retries: config.max_retries,
            delay: config.retry_delay,
        },
        sink,
        config.chunk_concurrency,
    )
    .await?;
    info!("{}: extracted {} card(s)", document.id, cards.len());

    // Intermediate artifact: the raw card batch as JSON.
    let card_json = workspace.card_json(&document.id);
    let payload = serde_json::to_string_pretty(&cards).unwrap_or_else(|_| "[]".to_string());
    std::fs::write(&card_json, payload).map_err(|source| DocumentError::ArtifactWrite {
        path: card_json.clone(),
        source,
    })?;

    // Transform cards to deck rows. A malformed card is logged and skipped;
    // its siblings survive.
    let mut rows = Vec::with_capacity(cards.len());
    for (i, card) in cards.iter().enumerate() {
        match transform::to_deck_row(card, &config.tag_prefix, &document.id) {
            Ok(row) => rows.push(row),
            Err(err) => {
                warn!("{}: card {} dropped: {err}", document.id, i + 1);
                sink.append(
                    SinkRecord::new("transform", format!("Card {}: {err}", i + 1))
                        .document(&document.id)
                        .prompt(&config.prompt),
                );
            }
        }
    }

    let deck_path = workspace.deck(&document.id);
    transform::write_deck(&deck_path, &rows).map_err(|source| DocumentError::ArtifactWrite {
        path: deck_path,
        source,
    })?;

    Ok((rows, cards.len()))
}
