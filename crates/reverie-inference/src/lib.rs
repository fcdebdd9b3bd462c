//! # reverie-inference
//!
//! Generative model backends and prompt/response handling for reverie.
//!
//! This crate provides:
//! - Gemini backend (text generation, vision, audio transcription)
//! - The canonical idea-analysis prompt and its labeled-line parser
//! - The dream storytelling prompt and its JSON parser
//! - A deterministic mock backend for tests (feature `mock`)
//!
//! # Example
//!
//! ```rust,no_run
//! use reverie_inference::GeminiBackend;
//! use reverie_core::GenerationBackend;
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = GeminiBackend::from_env().unwrap();
//!     let response = backend.generate("Say hello").await.unwrap();
//!     println!("{response}");
//! }
//! ```

pub mod analysis;
pub mod gemini;
pub mod story;

// Mock backend for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export core types
pub use reverie_core::*;

pub use analysis::{
    idea_analysis_prompt, idea_analysis_prompt_with_image, parse_idea_analysis,
    AnalysisParseError, TRANSCRIPTION_PROMPT,
};
pub use gemini::GeminiBackend;
pub use story::{dream_story_prompt, parse_dream_story, DreamStory, StoryParseError};

#[cfg(any(test, feature = "mock"))]
pub use mock::MockBackend;
