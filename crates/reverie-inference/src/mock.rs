//! Mock backends for deterministic testing.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use reverie_inference::mock::MockBackend;
//!
//! let backend = MockBackend::new()
//!     .with_fixed_response("Score: 7\nTitle: t\n...")
//!     .with_transcription("hello world");
//! ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use reverie_core::{Error, GenerationBackend, MediaPart, Result, TranscriptionBackend};

/// Deterministic generation/transcription backend for tests.
#[derive(Clone)]
pub struct MockBackend {
    config: Arc<MockConfig>,
    call_log: Arc<Mutex<Vec<MockCall>>>,
}

#[derive(Debug, Clone)]
struct MockConfig {
    // Matched as substrings of the prompt; first match wins.
    response_mappings: HashMap<String, String>,
    default_response: String,
    transcription: String,
    fail_generation: bool,
    fail_transcription: bool,
}

/// A recorded call, for assertions on what the backend was asked.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub operation: String,
    pub input_len: usize,
    pub media_parts: usize,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            response_mappings: HashMap::new(),
            default_response: "Mock response".to_string(),
            transcription: "mock transcription".to_string(),
            fail_generation: false,
            fail_transcription: false,
        }
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            config: Arc::new(MockConfig::default()),
            call_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Set the response returned when no mapping matches.
    pub fn with_fixed_response(mut self, response: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).default_response = response.into();
        self
    }

    /// Return `output` whenever the prompt contains `needle`.
    pub fn with_response_mapping(
        mut self,
        needle: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Arc::make_mut(&mut self.config)
            .response_mappings
            .insert(needle.into(), output.into());
        self
    }

    /// Set the text returned for all transcription requests.
    pub fn with_transcription(mut self, text: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).transcription = text.into();
        self
    }

    /// Make all generation calls fail with an inference error.
    pub fn with_generation_failure(mut self) -> Self {
        Arc::make_mut(&mut self.config).fail_generation = true;
        self
    }

    /// Make all transcription calls fail with a transcription error.
    pub fn with_transcription_failure(mut self) -> Self {
        Arc::make_mut(&mut self.config).fail_transcription = true;
        self
    }

    /// Get all logged calls for assertion.
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.call_log.lock().unwrap().clone()
    }

    pub fn generate_call_count(&self) -> usize {
        self.get_calls()
            .iter()
            .filter(|c| c.operation == "generate")
            .count()
    }

    pub fn transcribe_call_count(&self) -> usize {
        self.get_calls()
            .iter()
            .filter(|c| c.operation == "transcribe")
            .count()
    }

    fn log(&self, operation: &str, input_len: usize, media_parts: usize) {
        self.call_log.lock().unwrap().push(MockCall {
            operation: operation.to_string(),
            input_len,
            media_parts,
        });
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationBackend for MockBackend {
    async fn generate_with_media(&self, prompt: &str, media: &[MediaPart]) -> Result<String> {
        self.log("generate", prompt.len(), media.len());

        if self.config.fail_generation {
            return Err(Error::Inference("mock generation failure".to_string()));
        }

        for (needle, output) in &self.config.response_mappings {
            if prompt.contains(needle.as_str()) {
                return Ok(output.clone());
            }
        }
        Ok(self.config.default_response.clone())
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

#[async_trait]
impl TranscriptionBackend for MockBackend {
    async fn transcribe(&self, audio: &[u8], _mime_type: &str) -> Result<String> {
        self.log("transcribe", audio.len(), 1);

        if self.config.fail_transcription {
            return Err(Error::Transcription("mock transcription failure".to_string()));
        }
        Ok(self.config.transcription.clone())
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixed_response_and_call_log() {
        let backend = MockBackend::new().with_fixed_response("Score: 7");
        let out = backend.generate("anything").await.unwrap();
        assert_eq!(out, "Score: 7");
        assert_eq!(backend.generate_call_count(), 1);
    }

    #[tokio::test]
    async fn test_response_mapping_matches_substring() {
        let backend = MockBackend::new()
            .with_fixed_response("default")
            .with_response_mapping("dog ride sharing", "Score: 9");
        let out = backend
            .generate("Analyze this: dog ride sharing for busy owners")
            .await
            .unwrap();
        assert_eq!(out, "Score: 9");
    }

    #[tokio::test]
    async fn test_failure_modes() {
        let backend = MockBackend::new().with_generation_failure();
        assert!(matches!(
            backend.generate("x").await.unwrap_err(),
            Error::Inference(_)
        ));

        let backend = MockBackend::new().with_transcription_failure();
        assert!(matches!(
            backend.transcribe(b"a", "audio/webm").await.unwrap_err(),
            Error::Transcription(_)
        ));
    }

    #[tokio::test]
    async fn test_transcription_returns_configured_text() {
        let backend = MockBackend::new().with_transcription("hello");
        assert_eq!(backend.transcribe(b"a", "audio/webm").await.unwrap(), "hello");
        assert_eq!(backend.transcribe_call_count(), 1);
    }
}
