//! Gemini extraction backend.
//!
//! Sends the chunk PDF as an inline base64 part alongside the prompt text in
//! a single `generateContent` call. Inline upload keeps the marshalling to
//! one request per chunk; chunk sizing already caps payloads well under the
//! inline limit.

use super::{
    classify_response, classify_transport, parse_card_payload, ExtractError, ExtractedCard,
    ExtractionBackend, REQUEST_TIMEOUT,
};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

pub(crate) const DEFAULT_MODEL: &str = "gemini-2.5-pro";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Gemini `generateContent` backend.
pub struct GeminiBackend {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiBackend {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http,
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point at a different endpoint (proxies, tests).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

impl GenerateContentResponse {
    /// First candidate's concatenated text parts.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl ExtractionBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn extract(
        &self,
        chunk: &Path,
        prompt: &str,
    ) -> Result<Vec<ExtractedCard>, ExtractError> {
        let pdf_bytes = tokio::fs::read(chunk).await.map_err(|err| ExtractError::Fatal {
            detail: format!("gemini cannot read chunk '{}': {err}", chunk.display()),
            raw_response: None,
        })?;
        debug!(
            "gemini: submitting {} ({} KiB)",
            chunk.display(),
            pdf_bytes.len() / 1024
        );

        let body = json!({
            "contents": [{
                "parts": [
                    {
                        "inline_data": {
                            "mime_type": "application/pdf",
                            "data": BASE64.encode(&pdf_bytes),
                        }
                    },
                    { "text": prompt },
                ]
            }]
        });

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );

        let start = Instant::now();
        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| classify_transport("gemini", err))?;

        let status = response.status();
        let raw = response
            .text()
            .await
            .map_err(|err| classify_transport("gemini", err))?;

        if !status.is_success() {
            return Err(classify_response("gemini", status, raw));
        }

        let parsed: GenerateContentResponse =
            serde_json::from_str(&raw).map_err(|err| ExtractError::Fatal {
                detail: format!("gemini response envelope did not parse: {err}"),
                raw_response: Some(raw.clone()),
            })?;

        let cards = parse_card_payload("gemini", &parsed.text())?;
        info!(
            "gemini: {} card(s) from {} in {:.1}s",
            cards.len(),
            chunk.display(),
            start.elapsed().as_secs_f64()
        );
        Ok(cards)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn chunk_file(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let path = dir.path().join("chunk_01.pdf");
        std::fs::write(&path, b"%PDF-1.5 test bytes").unwrap();
        path
    }

    fn envelope(text: &str) -> serde_json::Value {
        json!({
            "candidates": [{
                "content": { "parts": [{ "text": text }] }
            }]
        })
    }

    #[tokio::test]
    async fn extracts_cards_from_fenced_payload() {
        let server = MockServer::start_async().await;
        let tmp = tempfile::tempdir().unwrap();
        let chunk = chunk_file(&tmp);

        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1beta/models/gemini-2.5-pro:generateContent")
                    .header("x-goog-api-key", "key-123");
                then.status(200).json_body(envelope(
                    "```json\n[{\"content\":\"What is X?\",\"importance\":\"high\"}]\n```",
                ));
            })
            .await;

        let backend =
            GeminiBackend::new("key-123", DEFAULT_MODEL).with_base_url(server.base_url());
        let cards = backend.extract(&chunk, "extract cards").await.unwrap();

        mock.assert_async().await;
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].content, "What is X?");
        assert_eq!(cards[0].importance, "high");
    }

    #[tokio::test]
    async fn rate_limit_is_transient() {
        let server = MockServer::start_async().await;
        let tmp = tempfile::tempdir().unwrap();
        let chunk = chunk_file(&tmp);

        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(429).body("quota exceeded");
            })
            .await;

        let backend = GeminiBackend::new("k", DEFAULT_MODEL).with_base_url(server.base_url());
        let err = backend.extract(&chunk, "p").await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(err.raw_response(), Some("quota exceeded"));
    }

    #[tokio::test]
    async fn bad_credentials_are_fatal() {
        let server = MockServer::start_async().await;
        let tmp = tempfile::tempdir().unwrap();
        let chunk = chunk_file(&tmp);

        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(403).body("invalid key");
            })
            .await;

        let backend = GeminiBackend::new("k", DEFAULT_MODEL).with_base_url(server.base_url());
        let err = backend.extract(&chunk, "p").await.unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn prose_only_response_is_fatal() {
        let server = MockServer::start_async().await;
        let tmp = tempfile::tempdir().unwrap();
        let chunk = chunk_file(&tmp);

        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200)
                    .json_body(envelope("I was unable to read this document."));
            })
            .await;

        let backend = GeminiBackend::new("k", DEFAULT_MODEL).with_base_url(server.base_url());
        let err = backend.extract(&chunk, "p").await.unwrap_err();
        assert!(!err.is_transient());
    }
}
