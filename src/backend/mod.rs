//! Extraction backends: one variant per AI provider.
//!
//! A backend turns one chunk PDF plus a prompt into a batch of
//! [`ExtractedCard`]s. Variants differ only in request/response marshalling
//! and in how they classify failures; the orchestrator never knows which one
//! is active. Adding a provider means implementing [`ExtractionBackend`] and
//! registering it in [`create_backend`] — nothing else changes.
//!
//! ## Failure classification
//!
//! Backends classify every failure as [`ExtractError::Transient`] (worth
//! retrying: 429, 5xx, timeouts, connection resets) or
//! [`ExtractError::Fatal`] (retrying cannot help: bad credentials, other
//! 4xx, a response with no parseable card array). The retry policy in
//! [`crate::pipeline::extract`] acts on that classification; it never
//! inspects provider-specific detail.

mod claude;
mod gemini;

pub use claude::ClaudeBackend;
pub use gemini::GeminiBackend;

use crate::config::BackendKind;
use crate::error::DeckforgeError;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Per-request timeout. Extraction of a 40-page chunk can run for minutes on
/// a busy model, so this is far above interactive-API norms.
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

/// One question/answer unit as returned by a backend.
///
/// Lenient on optional fields: a card missing `context` or `importance`
/// still parses. A card missing `content` parses to an empty string and is
/// rejected later by the transform, so one bad card never fails the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedCard {
    /// Card front/body; may embed cloze markup (`{{c1::...}}`).
    #[serde(default)]
    pub content: String,
    /// Extra context shown on the answer side.
    #[serde(default)]
    pub context: String,
    /// Importance classification token (e.g. "high_yield").
    #[serde(default)]
    pub importance: String,
}

/// Classified extraction failure.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Worth retrying: rate limits, 5xx, network timeouts.
    #[error("Transient backend failure: {detail}")]
    Transient {
        detail: String,
        raw_response: Option<String>,
    },

    /// Retrying cannot help: bad credentials, malformed response payloads.
    #[error("Fatal backend failure: {detail}")]
    Fatal {
        detail: String,
        raw_response: Option<String>,
    },
}

impl ExtractError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ExtractError::Transient { .. })
    }

    pub fn raw_response(&self) -> Option<&str> {
        match self {
            ExtractError::Transient { raw_response, .. }
            | ExtractError::Fatal { raw_response, .. } => raw_response.as_deref(),
        }
    }
}

/// Capability contract implemented by every provider variant.
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    /// Short provider name used in logs and sink records.
    fn name(&self) -> &str;

    /// Submit one chunk PDF with the given prompt and return the extracted
    /// cards in response order.
    async fn extract(&self, chunk: &Path, prompt: &str)
        -> Result<Vec<ExtractedCard>, ExtractError>;
}

/// Instantiate the configured backend, reading its credential and model from
/// the environment.
///
/// * Gemini: `GEMINI_API_KEY` (required), `GEMINI_MODEL` (optional)
/// * Claude: `CLAUDE_API_KEY` (required), `CLAUDE_MODEL` (optional)
///
/// `model` overrides the environment model when set.
pub fn create_backend(
    kind: BackendKind,
    model: Option<&str>,
) -> Result<Arc<dyn ExtractionBackend>, DeckforgeError> {
    match kind {
        BackendKind::Gemini => {
            let api_key = require_env("GEMINI_API_KEY", kind)?;
            let model = model
                .map(str::to_string)
                .or_else(|| env_non_empty("GEMINI_MODEL"))
                .unwrap_or_else(|| gemini::DEFAULT_MODEL.to_string());
            Ok(Arc::new(GeminiBackend::new(api_key, model)))
        }
        BackendKind::Claude => {
            let api_key = require_env("CLAUDE_API_KEY", kind)?;
            let model = model
                .map(str::to_string)
                .or_else(|| env_non_empty("CLAUDE_MODEL"))
                .unwrap_or_else(|| claude::DEFAULT_MODEL.to_string());
            Ok(Arc::new(ClaudeBackend::new(api_key, model)))
        }
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn require_env(key: &str, kind: BackendKind) -> Result<String, DeckforgeError> {
    env_non_empty(key).ok_or_else(|| DeckforgeError::BackendNotConfigured {
        backend: kind.to_string(),
        hint: format!("Set {key} in the environment or a .env file."),
    })
}

// ── Shared marshalling helpers ───────────────────────────────────────────

/// Classify an HTTP status: 429 and 5xx are transient, everything else that
/// reached us as an error status is fatal.
pub(crate) fn transient_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Map a reqwest transport error. Timeouts and connection failures are
/// transient; anything else (request construction, redirect loops) is fatal.
pub(crate) fn classify_transport(backend: &str, err: reqwest::Error) -> ExtractError {
    let detail = format!("{backend} request failed: {err}");
    if err.is_timeout() || err.is_connect() {
        ExtractError::Transient {
            detail,
            raw_response: None,
        }
    } else if err.is_body() || err.is_decode() {
        ExtractError::Fatal {
            detail,
            raw_response: None,
        }
    } else {
        // Remaining transport-level failures (connection reset mid-response
        // and friends) are worth one more try.
        ExtractError::Transient {
            detail,
            raw_response: None,
        }
    }
}

/// Build an error from a non-success HTTP response.
pub(crate) fn classify_response(
    backend: &str,
    status: reqwest::StatusCode,
    body: String,
) -> ExtractError {
    let detail = format!("{backend} returned HTTP {status}");
    if transient_status(status) {
        ExtractError::Transient {
            detail,
            raw_response: Some(body),
        }
    } else {
        ExtractError::Fatal {
            detail,
            raw_response: Some(body),
        }
    }
}

static RE_CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)```(?:json)?\s*(.*?)\s*```").unwrap());

/// Remove Markdown code fences when the payload is wrapped in one.
fn strip_code_fences(text: &str) -> &str {
    if !text.contains("```") {
        return text;
    }
    match RE_CODE_FENCE.captures(text) {
        Some(caps) => caps.get(1).map(|m| m.as_str()).unwrap_or(text),
        None => text,
    }
}

/// Extract the card array from a raw model response.
///
/// Models wrap JSON in fences, prepend prose, or append commentary despite
/// instructions not to. This scans for the first position where a JSON value
/// parses, ignores anything after it, and requires that value to be an
/// array. A valid non-array value (an object envelope, say) or no JSON at
/// all is a fatal failure — resending the same chunk would get the same
/// shape back.
pub(crate) fn parse_card_payload(
    backend: &str,
    raw: &str,
) -> Result<Vec<ExtractedCard>, ExtractError> {
    let cleaned = strip_code_fences(raw).trim_start_matches('\u{feff}').trim();

    for (index, ch) in cleaned.char_indices() {
        if ch != '[' && ch != '{' {
            continue;
        }
        let mut stream =
            serde_json::Deserializer::from_str(&cleaned[index..]).into_iter::<serde_json::Value>();
        let Some(Ok(value)) = stream.next() else {
            continue;
        };
        if !value.is_array() {
            return Err(ExtractError::Fatal {
                detail: format!("{backend} response JSON is not a card array"),
                raw_response: Some(raw.to_string()),
            });
        }
        return serde_json::from_value(value).map_err(|err| ExtractError::Fatal {
            detail: format!("{backend} card array has unexpected shape: {err}"),
            raw_response: Some(raw.to_string()),
        });
    }

    Err(ExtractError::Fatal {
        detail: format!("{backend} response contains no JSON card array"),
        raw_response: Some(raw.to_string()),
    })
}
