//! Extraction driving: bounded retry around backend calls, and per-document
//! chunk scheduling.
//!
//! ## Retry Strategy
//!
//! Transient failures (429, 5xx, timeouts) are retried up to
//! `max_retries` times with a **fixed** delay between attempts. Fixed rather
//! than exponential is deliberate: the worst-case stall per chunk is
//! `max_retries × retry_delay`, easy to budget against a rate-limited
//! credential, and the delay is a single config knob callers can override.
//! Fatal failures return immediately; exhausting retries produces an error
//! with the same shape as a fatal one.
//!
//! Every failed attempt is appended to the error sink with full context
//! before the next attempt starts — by the time a chunk is given up on, the
//! sink already tells the whole story.

use crate::backend::{ExtractError, ExtractedCard, ExtractionBackend};
use crate::error::DocumentError;
use crate::pipeline::chunk::{self, ChunkSpan};
use crate::sink::{ErrorSink, SinkRecord};
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Bounded fixed-delay retry over one extraction call.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the initial attempt; `max_retries + 1` attempts total.
    pub max_retries: u32,
    /// Fixed pause between attempts.
    pub delay: Duration,
}

/// Terminal failure of a retried operation: either a fatal classification or
/// an exhausted transient one. Shape is identical either way.
#[derive(Debug)]
pub struct RetryExhausted {
    /// Attempts actually made.
    pub attempts: u32,
    /// The last failure observed.
    pub last: ExtractError,
}

impl RetryPolicy {
    /// Drive `op` until it succeeds, fails fatally, or runs out of retries.
    ///
    /// `on_failure` is invoked for every failed attempt (attempt numbers are
    /// 1-based) before any delay or return — the hook the orchestrator uses
    /// to append sink records.
    pub async fn attempt<T, F, Fut>(
        &self,
        mut op: F,
        mut on_failure: impl FnMut(u32, &ExtractError),
    ) -> Result<T, RetryExhausted>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ExtractError>>,
    {
        let mut last: Option<ExtractError> = None;
        let mut attempts = 0;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                debug!(
                    "retry {}/{} after {:?}",
                    attempt, self.max_retries, self.delay
                );
                sleep(self.delay).await;
            }

            attempts = attempt + 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    on_failure(attempts, &err);
                    let fatal = !err.is_transient();
                    last = Some(err);
                    if fatal {
                        break;
                    }
                }
            }
        }

        Err(RetryExhausted {
            attempts,
            last: last.unwrap_or(ExtractError::Fatal {
                detail: "no attempt was made".into(),
                raw_response: None,
            }),
        })
    }
}

/// Extract every chunk of one document and concatenate the results in span
/// order.
///
/// Single-span documents are submitted as-is; multi-span documents are first
/// materialized as standalone chunk PDFs in a temp directory that lives for
/// the duration of the call. Chunk calls run through a bounded concurrent
/// stream (`concurrency` ≥ 1); results are reassembled by span index, so
/// completion order never affects card order. Any chunk failing terminally
/// fails the document.
#[allow(clippy::too_many_arguments)]
pub async fn extract_document(
    backend: &Arc<dyn ExtractionBackend>,
    document_id: &str,
    source: &Path,
    spans: &[ChunkSpan],
    prompt: &str,
    prompt_name: &str,
    policy: RetryPolicy,
    sink: &ErrorSink,
    concurrency: usize,
) -> Result<Vec<ExtractedCard>, DocumentError> {
    // Materialize chunk files. The temp dir must outlive all extraction
    // calls, so it is held here rather than inside the per-chunk future.
    let (_chunk_dir, chunk_paths) = materialize_chunks(document_id, source, spans).await?;

    let results: Vec<(usize, Result<Vec<ExtractedCard>, RetryExhausted>)> =
        stream::iter(spans.iter().zip(chunk_paths.iter()))
            .map(|(span, path)| {
                let backend = Arc::clone(backend);
                let span = *span;
                let path = path.clone();
                async move {
                    let result = policy
                        .attempt(
                            || {
                                let backend = Arc::clone(&backend);
                                let path = path.clone();
                                async move { backend.extract(&path, prompt).await }
                            },
                            |attempt, err| {
                                warn!(
                                    "{}: chunk {} attempt {} failed: {err}",
                                    document_id, span.index, attempt
                                );
                                let mut record = SinkRecord::new(
                                    backend.name(),
                                    format!(
                                        "Chunk {} (pages {}\u{2013}{}), attempt {}: {err}",
                                        span.index, span.start_page, span.end_page, attempt
                                    ),
                                )
                                .document(document_id)
                                .prompt(prompt_name);
                                if let Some(raw) = err.raw_response() {
                                    record = record.raw_response(raw);
                                }
                                sink.append(record);
                            },
                        )
                        .await;
                    (span.index, result)
                }
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;

    // Reassemble by span index regardless of completion order.
    let mut results = results;
    results.sort_by_key(|(index, _)| *index);

    let mut cards = Vec::new();
    for (_, result) in results {
        match result {
            Ok(batch) => cards.extend(batch),
            Err(exhausted) => {
                return Err(DocumentError::ExtractionFailed {
                    attempts: exhausted.attempts,
                    detail: exhausted.last.to_string(),
                });
            }
        }
    }
    Ok(cards)
}

/// Write the chunk PDFs for a multi-span document; a single-span document is
/// submitted without a rewrite.
///
/// Returns the temp dir (kept alive by the caller) and one path per span.
async fn materialize_chunks(
    document_id: &str,
    source: &Path,
    spans: &[ChunkSpan],
) -> Result<(Option<tempfile::TempDir>, Vec<PathBuf>), DocumentError> {
    if spans.len() == 1 {
        return Ok((None, vec![source.to_path_buf()]));
    }

    let dir = tempfile::tempdir().map_err(|err| DocumentError::ArtifactWrite {
        path: std::env::temp_dir(),
        source: err,
    })?;

    let mut paths = Vec::with_capacity(spans.len());
    for span in spans {
        let dest = dir
            .path()
            .join(format!("{document_id}_chunk_{:02}.pdf", span.index));
        let source = source.to_path_buf();
        let span = *span;
        let dest_clone = dest.clone();
        // lopdf is synchronous and CPU-bound; keep it off the async workers.
        tokio::task::spawn_blocking(move || chunk::write_chunk(&source, &span, &dest_clone))
            .await
            .map_err(|err| DocumentError::UnreadablePdf {
                detail: format!("chunk writer task failed: {err}"),
            })??;
        paths.push(dest);
    }
    Ok((Some(dir), paths))
}
