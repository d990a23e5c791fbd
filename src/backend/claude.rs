//! Claude extraction backend.
//!
//! Sends the chunk PDF as a base64 `document` content block followed by the
//! prompt text in one messages-API call. Non-streaming: card batches are
//! small enough that buffering the whole response is simpler than stitching
//! stream deltas back together.

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

pub(crate) const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 64_000;

/// Anthropic messages-API backend.
pub struct ClaudeBackend {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl ClaudeBackend {
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
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

impl MessagesResponse {
    fn text(&self) -> String {
        self.content
            .iter()
            .map(|block| block.text.as_str())
            .collect::<Vec<_>>()
            .join("")
    }
}

#[async_trait]
impl ExtractionBackend for ClaudeBackend {
    fn name(&self) -> &str {
        "claude"
    }

    async fn extract(
        &self,
        chunk: &Path,
        prompt: &str,
    ) -> Result<Vec<ExtractedCard>, ExtractError> {
        let pdf_bytes = tokio::fs::read(chunk).await.map_err(|err| ExtractError::Fatal {
            detail: format!("claude cannot read chunk '{}': {err}", chunk.display()),
            raw_response: None,
        })?;
        debug!(
            "claude: submitting {} ({} KiB)",
            chunk.display(),
            pdf_bytes.len() / 1024
        );

        let body = json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "messages": [{
                "role": "user",
                "content": [
                    {
                        "type": "document",
                        "source": {
                            "type": "base64",
                            "media_type": "application/pdf",
                            "data": BASE64.encode(&pdf_bytes),
                        }
                    },
                    { "type": "text", "text": prompt },
                ]
            }]
        });

        let start = Instant::now();
        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|err| classify_transport("claude", err))?;

        let status = response.status();
        let raw = response
            .text()
            .await
            .map_err(|err| classify_transport("claude", err))?;

        if !status.is_success() {
            return Err(classify_response("claude", status, raw));
        }

        let parsed: MessagesResponse =
            serde_json::from_str(&raw).map_err(|err| ExtractError::Fatal {
                detail: format!("claude response envelope did not parse: {err}"),
                raw_response: Some(raw.clone()),
            })?;

        let cards = parse_card_payload("claude", &parsed.text())?;
        info!(
            "claude: {} card(s) from {} in {:.1}s",
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

    #[tokio::test]
    async fn extracts_cards_and_sends_version_header() {
        let server = MockServer::start_async().await;
        let tmp = tempfile::tempdir().unwrap();
        let chunk = chunk_file(&tmp);

        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/messages")
                    .header("x-api-key", "sk-test")
                    .header("anthropic-version", ANTHROPIC_VERSION);
                then.status(200).json_body(json!({
                    "content": [
                        { "type": "text", "text": "[{\"content\":\"Q?\",\"context\":\"slide 2\",\"importance\":\"low\"}]" }
                    ]
                }));
            })
            .await;

        let backend = ClaudeBackend::new("sk-test", DEFAULT_MODEL).with_base_url(server.base_url());
        let cards = backend.extract(&chunk, "extract").await.unwrap();

        mock.assert_async().await;
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].context, "slide 2");
    }

    #[tokio::test]
    async fn overloaded_is_transient() {
        let server = MockServer::start_async().await;
        let tmp = tempfile::tempdir().unwrap();
        let chunk = chunk_file(&tmp);

        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(529).body("overloaded");
            })
            .await;

        let backend = ClaudeBackend::new("k", DEFAULT_MODEL).with_base_url(server.base_url());
        let err = backend.extract(&chunk, "p").await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn auth_failure_is_fatal() {
        let server = MockServer::start_async().await;
        let tmp = tempfile::tempdir().unwrap();
        let chunk = chunk_file(&tmp);

        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(401).body("{\"error\":\"authentication_error\"}");
            })
            .await;

        let backend = ClaudeBackend::new("bad", DEFAULT_MODEL).with_base_url(server.base_url());
        let err = backend.extract(&chunk, "p").await.unwrap_err();
        assert!(!err.is_transient());
    }
}
