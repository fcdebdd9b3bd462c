//! Dream storytelling prompt and response parsing.

use serde::Deserialize;
use thiserror::Error;

/// Build the storytelling prompt for a dream description.
pub fn dream_story_prompt(dream_text: &str) -> String {
    format!(
        r#"You are a creative storyteller. Based on the dream description provided below, generate a JSON object with two fields:
1.  `title`: A concise and engaging title for the dream (under 10 words).
2.  `story`: A short, cohesive, and imaginative story (around 100-300 words) based on the dream description. Capture the mood and key elements.

--- DREAM DESCRIPTION START ---
{dream_text}
--- DREAM DESCRIPTION END ---

Provide only the JSON object in your response."#
    )
}

/// A parsed storytelling response. The title is optional; the story is not.
#[derive(Debug, Clone, PartialEq)]
pub struct DreamStory {
    pub title: Option<String>,
    pub story: String,
}

#[derive(Debug, Error, PartialEq)]
pub enum StoryParseError {
    #[error("response is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("response has no story field")]
    MissingStory,
}

#[derive(Deserialize)]
struct RawStory {
    title: Option<String>,
    story: Option<String>,
}

/// Parse the model's JSON response, tolerating a markdown code fence
/// around the object.
pub fn parse_dream_story(response: &str) -> Result<DreamStory, StoryParseError> {
    let cleaned = strip_json_fence(response.trim());

    let raw: RawStory = serde_json::from_str(cleaned)
        .map_err(|e| StoryParseError::InvalidJson(e.to_string()))?;

    let story = raw
        .story
        .filter(|s| !s.trim().is_empty())
        .ok_or(StoryParseError::MissingStory)?;
    let title = raw.title.filter(|t| !t.trim().is_empty());

    Ok(DreamStory { title, story })
}

fn strip_json_fence(text: &str) -> &str {
    let mut inner = text;
    if let Some(rest) = inner.strip_prefix("```json") {
        inner = rest;
    } else if let Some(rest) = inner.strip_prefix("```") {
        inner = rest;
    }
    if let Some(rest) = inner.strip_suffix("```") {
        inner = rest;
    }
    inner.trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let parsed =
            parse_dream_story(r#"{"title": "Flight", "story": "I was flying."}"#).unwrap();
        assert_eq!(parsed.title.as_deref(), Some("Flight"));
        assert_eq!(parsed.story, "I was flying.");
    }

    #[test]
    fn test_parse_fenced_json() {
        let response = "```json\n{\"title\": \"Flight\", \"story\": \"I was flying.\"}\n```";
        let parsed = parse_dream_story(response).unwrap();
        assert_eq!(parsed.story, "I was flying.");
    }

    #[test]
    fn test_missing_title_is_allowed() {
        let parsed = parse_dream_story(r#"{"story": "Just a story."}"#).unwrap();
        assert!(parsed.title.is_none());
        assert_eq!(parsed.story, "Just a story.");
    }

    #[test]
    fn test_empty_title_treated_as_absent() {
        let parsed = parse_dream_story(r#"{"title": "", "story": "s"}"#).unwrap();
        assert!(parsed.title.is_none());
    }

    #[test]
    fn test_missing_story_is_an_error() {
        assert_eq!(
            parse_dream_story(r#"{"title": "No story here"}"#).unwrap_err(),
            StoryParseError::MissingStory
        );
    }

    #[test]
    fn test_non_json_is_an_error() {
        assert!(matches!(
            parse_dream_story("Once upon a time..."),
            Err(StoryParseError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_prompt_fences_dream_text() {
        let prompt = dream_story_prompt("falling through clouds");
        assert!(prompt
            .contains("--- DREAM DESCRIPTION START ---\nfalling through clouds\n--- DREAM DESCRIPTION END ---"));
    }
}
