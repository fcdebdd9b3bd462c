//! Gemini generative-model backend implementation.

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use reverie_core::{Error, GenerationBackend, MediaPart, Result, TranscriptionBackend};

/// Default Gemini API endpoint.
pub const DEFAULT_GEMINI_URL: &str = reverie_core::defaults::GEMINI_BASE_URL;

/// Default generation model.
pub const DEFAULT_GEN_MODEL: &str = reverie_core::defaults::GEMINI_MODEL;

/// Timeout for generation requests (seconds).
pub const GEN_TIMEOUT_SECS: u64 = reverie_core::defaults::GEN_TIMEOUT_SECS;

/// Timeout for transcription requests (seconds). Audio uploads are slower
/// to process than text prompts, so transcription gets a longer budget.
pub const TRANSCRIBE_TIMEOUT_SECS: u64 = reverie_core::defaults::TRANSCRIBE_TIMEOUT_SECS;

/// Gemini inference backend.
///
/// Talks to the `generateContent` REST endpoint. Text-only prompts and
/// prompts with inline media (images, audio) go through the same request
/// shape, so a single backend covers both analysis and transcription.
#[derive(Debug)]
pub struct GeminiBackend {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout_secs: u64,
    transcribe_timeout_secs: u64,
}

impl GeminiBackend {
    /// Create a new backend with an explicit API key and default settings.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_config(
            DEFAULT_GEMINI_URL.to_string(),
            api_key.into(),
            DEFAULT_GEN_MODEL.to_string(),
        )
    }

    /// Create a new backend with custom configuration.
    pub fn with_config(base_url: String, api_key: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("Gemini API key is empty".to_string()));
        }

        let timeout_secs = std::env::var("GEMINI_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(GEN_TIMEOUT_SECS);
        let transcribe_timeout_secs = std::env::var("GEMINI_TRANSCRIBE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(TRANSCRIBE_TIMEOUT_SECS);

        // Timeouts are set per request; the client carries no global cap.
        let client = Client::builder()
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!("Initializing Gemini backend: url={}, model={}", base_url, model);

        Ok(Self {
            client,
            base_url,
            api_key,
            model,
            timeout_secs,
            transcribe_timeout_secs,
        })
    }

    /// Create from environment variables.
    ///
    /// `GEMINI_API_KEY` is required; `GEMINI_BASE_URL` and `GEMINI_MODEL`
    /// override the defaults.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var(reverie_core::defaults::ENV_GEMINI_API_KEY)
            .map_err(|_| Error::Config("GEMINI_API_KEY is not set".to_string()))?;
        let base_url = std::env::var(reverie_core::defaults::ENV_GEMINI_BASE_URL)
            .unwrap_or_else(|_| DEFAULT_GEMINI_URL.to_string());
        let model = std::env::var(reverie_core::defaults::ENV_GEMINI_MODEL)
            .unwrap_or_else(|_| DEFAULT_GEN_MODEL.to_string());

        Self::with_config(base_url, api_key, model)
    }

    /// The configured model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    async fn generate_internal(
        &self,
        prompt: &str,
        media: &[MediaPart],
        timeout_secs: u64,
    ) -> Result<String> {
        let start = Instant::now();

        debug!(
            prompt_len = prompt.len(),
            media_parts = media.len(),
            "Starting generation"
        );

        let mut parts = vec![RequestPart::text(prompt)];
        for part in media {
            parts.push(RequestPart::inline(&part.mime_type, &part.data));
        }

        let request = GenerateContentRequest {
            contents: vec![Content { parts }],
        };

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .timeout(Duration::from_secs(timeout_secs))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Inference(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Inference(format!(
                "Gemini returned {}: {}",
                status, body
            )));
        }

        let result: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| Error::Inference(format!("Failed to parse response: {}", e)))?;

        let content = result
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .and_then(|p| p.text)
            .ok_or_else(|| Error::Inference("Empty response from model".to_string()))?;

        let elapsed = start.elapsed().as_millis() as u64;
        debug!(
            response_len = content.len(),
            duration_ms = elapsed,
            "Generation complete"
        );
        if elapsed > 30000 {
            warn!(
                duration_ms = elapsed,
                prompt_len = prompt.len(),
                slow = true,
                "Slow generation operation"
            );
        }
        Ok(content)
    }
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    async fn generate_with_media(&self, prompt: &str, media: &[MediaPart]) -> Result<String> {
        self.generate_internal(prompt, media, self.timeout_secs).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl TranscriptionBackend for GeminiBackend {
    async fn transcribe(&self, audio: &[u8], mime_type: &str) -> Result<String> {
        let media = [MediaPart {
            mime_type: mime_type.to_string(),
            data: audio.to_vec(),
        }];
        self.generate_internal(crate::TRANSCRIPTION_PROMPT, &media, self.transcribe_timeout_secs)
            .await
            .map(|text| text.trim().to_string())
            .map_err(|e| Error::Transcription(e.to_string()))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
struct RequestPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(rename = "inline_data", skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

impl RequestPart {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            inline_data: None,
        }
    }

    fn inline(mime_type: &str, data: &[u8]) -> Self {
        Self {
            text: None,
            inline_data: Some(InlineData {
                mime_type: mime_type.to_string(),
                data: base64::engine::general_purpose::STANDARD.encode(data),
            }),
        }
    }
}

#[derive(Debug, Serialize)]
struct InlineData {
    #[serde(rename = "mime_type")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend_for(server: &MockServer) -> GeminiBackend {
        GeminiBackend::with_config(
            server.uri(),
            "test-key".to_string(),
            "gemini-2.5-flash".to_string(),
        )
        .unwrap()
    }

    fn candidate_response(text: &str) -> serde_json::Value {
        json!({
            "candidates": [
                { "content": { "parts": [ { "text": text } ] } }
            ]
        })
    }

    #[test]
    fn test_transcription_gets_longer_timeout_than_generation() {
        let backend = GeminiBackend::with_config(
            "http://localhost".to_string(),
            "test-key".to_string(),
            "gemini-2.5-flash".to_string(),
        )
        .unwrap();
        assert_eq!(backend.timeout_secs, GEN_TIMEOUT_SECS);
        assert_eq!(backend.transcribe_timeout_secs, TRANSCRIBE_TIMEOUT_SECS);
        assert!(backend.transcribe_timeout_secs > backend.timeout_secs);
    }

    #[test]
    fn test_empty_api_key_rejected() {
        let err = GeminiBackend::new("").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_generate_returns_first_candidate_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
            .and(query_param("key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(candidate_response("Score: 7")))
            .mount(&server)
            .await;

        let backend = backend_for(&server);
        let text = backend.generate("rate this").await.unwrap();
        assert_eq!(text, "Score: 7");
    }

    #[tokio::test]
    async fn test_generate_no_candidates_is_inference_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
            .mount(&server)
            .await;

        let backend = backend_for(&server);
        let err = backend.generate("rate this").await.unwrap_err();
        assert!(matches!(err, Error::Inference(_)));
    }

    #[tokio::test]
    async fn test_generate_http_error_includes_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota exceeded"))
            .mount(&server)
            .await;

        let backend = backend_for(&server);
        let err = backend.generate("rate this").await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("429"), "unexpected error: {}", msg);
    }

    #[tokio::test]
    async fn test_transcribe_trims_and_wraps_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(candidate_response("  hello from the voice memo \n")),
            )
            .mount(&server)
            .await;

        let backend = backend_for(&server);
        let text = backend.transcribe(b"fake-audio", "audio/webm").await.unwrap();
        assert_eq!(text, "hello from the voice memo");
    }

    #[tokio::test]
    async fn test_transcribe_failure_maps_to_transcription_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let backend = backend_for(&server);
        let err = backend.transcribe(b"fake-audio", "audio/webm").await.unwrap_err();
        assert!(matches!(err, Error::Transcription(_)));
    }
}
