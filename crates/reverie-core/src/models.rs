//! Core data models for reverie records and jobs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::defaults;

// =============================================================================
// IDEAS
// =============================================================================

/// Lifecycle status of an idea record.
///
/// `Failed` is an explicit terminal state carrying a structured cause in
/// `Idea::failure`, distinct from `Analyzed`, so consumers never have to
/// string-match a sentinel title to detect pipeline failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdeaStatus {
    Pending,
    Analyzing,
    Analyzed,
    Failed,
}

impl IdeaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdeaStatus::Pending => "pending",
            IdeaStatus::Analyzing => "analyzing",
            IdeaStatus::Analyzed => "analyzed",
            IdeaStatus::Failed => "failed",
        }
    }

    /// Parse from the database text representation. Unknown values map to
    /// `Pending` so a bad row degrades to "needs processing" rather than
    /// poisoning a whole list query.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "analyzing" => IdeaStatus::Analyzing,
            "analyzed" => IdeaStatus::Analyzed,
            "failed" => IdeaStatus::Failed,
            _ => IdeaStatus::Pending,
        }
    }
}

/// Structured analysis produced by the idea pipeline.
///
/// The serde aliases accept the camelCase field names used by the legacy
/// webhook completion channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdeaAnalysis {
    /// Score in [1.0, 10.0]; decimals allowed.
    pub score: f64,
    /// Short 3-5 word summary of the idea's essence.
    pub title: String,
    /// Brief summary of the idea itself.
    pub summary: String,
    /// Explanation of the score against the rubric.
    pub reasoning: String,
    /// Assessment of practical/technical feasibility.
    pub feasibility: String,
    /// Existing similar concepts, products, or initiatives.
    #[serde(alias = "similarIdeas")]
    pub similar_ideas: String,
}

/// Structured cause persisted when a pipeline run fails.
///
/// Written alongside `status = failed`; replaces the original sentinel
/// "Analysis Failed" payload so failure is machine-readable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisFailure {
    /// The model returned no text at all.
    EmptyResponse,
    /// A required labeled line was absent from the model output.
    MissingField { field: String },
    /// The `Score:` line was non-numeric or out of [1, 10].
    InvalidScore { raw: String },
    /// The model call itself failed (network, non-2xx, decode).
    Inference { message: String },
    /// The transcription sub-step failed.
    Transcription { message: String },
}

impl AnalysisFailure {
    /// Build an inference failure, truncating the message to the persisted cap.
    pub fn inference(message: impl AsRef<str>) -> Self {
        AnalysisFailure::Inference {
            message: truncate_chars(message.as_ref(), defaults::FAILURE_MESSAGE_MAX_CHARS),
        }
    }

    /// Build a transcription failure, truncating the message to the persisted cap.
    pub fn transcription(message: impl AsRef<str>) -> Self {
        AnalysisFailure::Transcription {
            message: truncate_chars(message.as_ref(), defaults::FAILURE_MESSAGE_MAX_CHARS),
        }
    }
}

impl std::fmt::Display for AnalysisFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisFailure::EmptyResponse => write!(f, "empty response from model"),
            AnalysisFailure::MissingField { field } => write!(f, "missing field: {}", field),
            AnalysisFailure::InvalidScore { raw } => write!(f, "invalid score: {}", raw),
            AnalysisFailure::Inference { message } => write!(f, "inference failed: {}", message),
            AnalysisFailure::Transcription { message } => {
                write!(f, "transcription failed: {}", message)
            }
        }
    }
}

/// Truncate a string to at most `max` characters (not bytes).
fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// A persisted idea record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Idea {
    pub id: Uuid,
    pub owner_id: Uuid,
    /// Free text; may be empty when the idea was captured as audio.
    pub content: String,
    pub image_id: Option<Uuid>,
    pub audio_id: Option<Uuid>,
    /// Speech-to-text output persisted by the transcription job.
    pub transcription: Option<String>,
    pub status: IdeaStatus,
    /// Ordering key; creation timestamp millis by default, mutable via move.
    pub position: f64,
    /// Lease counter guarding pipeline writes against stale jobs.
    pub generation: i64,
    pub analysis: Option<IdeaAnalysis>,
    pub failure: Option<AnalysisFailure>,
    pub created_at: DateTime<Utc>,
}

impl Idea {
    /// Combined analyzable text: stored content plus transcription.
    ///
    /// The no-speech sentinel transcript counts as empty.
    pub fn combined_text(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        let content = self.content.trim();
        if !content.is_empty() {
            parts.push(content);
        }
        if let Some(t) = self.transcription.as_deref() {
            let t = t.trim();
            if !t.is_empty() && t != defaults::NO_SPEECH_SENTINEL {
                parts.push(t);
            }
        }
        parts.join("\n\n")
    }
}

/// Request to create a new idea.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateIdeaRequest {
    pub owner_id: Uuid,
    pub content: String,
    pub image_id: Option<Uuid>,
    pub audio_id: Option<Uuid>,
}

// =============================================================================
// DREAMS
// =============================================================================

/// Lifecycle status of a dream record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DreamStatus {
    Pending,
    Storified,
    Failed,
}

impl DreamStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DreamStatus::Pending => "pending",
            DreamStatus::Storified => "storified",
            DreamStatus::Failed => "failed",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "storified" => DreamStatus::Storified,
            "failed" => DreamStatus::Failed,
            _ => DreamStatus::Pending,
        }
    }
}

/// A persisted dream record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dream {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub content: String,
    pub status: DreamStatus,
    pub position: f64,
    pub generation: i64,
    /// Generated story text, present iff status = storified.
    pub story: Option<String>,
    /// Generated story title; optional even on success.
    pub story_title: Option<String>,
    pub failure: Option<AnalysisFailure>,
    pub created_at: DateTime<Utc>,
}

/// Request to create a new dream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDreamRequest {
    pub owner_id: Uuid,
    pub content: String,
}

// =============================================================================
// MEDIA
// =============================================================================

/// Kind of an uploaded media blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Audio,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Audio => "audio",
        }
    }

    /// Classify an upload by its MIME type.
    pub fn from_mime(mime: &str) -> Option<Self> {
        if mime.starts_with("image/") {
            Some(MediaKind::Image)
        } else if mime.starts_with("audio/") {
            Some(MediaKind::Audio)
        } else {
            None
        }
    }
}

/// An uploaded media blob (image or audio) stored inline.
#[derive(Debug, Clone)]
pub struct Media {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub kind: MediaKind,
    pub mime_type: String,
    pub data: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// JOBS
// =============================================================================

/// Type of a pipeline job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Speech-to-text pass over an idea's audio attachment.
    IdeaTranscription,
    /// Full idea analysis (prompt → model → parse → persist).
    IdeaAnalysis,
    /// Dream story generation.
    DreamStory,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::IdeaTranscription => "idea_transcription",
            JobType::IdeaAnalysis => "idea_analysis",
            JobType::DreamStory => "dream_story",
        }
    }
}

/// Execution status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "running" => JobStatus::Running,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            _ => JobStatus::Pending,
        }
    }
}

/// A queued unit of pipeline work for one record.
///
/// `generation` snapshots the record's lease counter at schedule time; the
/// handler's final write is conditional on it, so a job scheduled before a
/// user edit can never overwrite newer state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub record_id: Uuid,
    pub job_type: JobType,
    pub status: JobStatus,
    pub generation: i64,
    pub payload: Option<JsonValue>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idea_with(content: &str, transcription: Option<&str>) -> Idea {
        Idea {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            content: content.to_string(),
            image_id: None,
            audio_id: None,
            transcription: transcription.map(String::from),
            status: IdeaStatus::Pending,
            position: 0.0,
            generation: 0,
            analysis: None,
            failure: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_idea_status_round_trip() {
        for status in [
            IdeaStatus::Pending,
            IdeaStatus::Analyzing,
            IdeaStatus::Analyzed,
            IdeaStatus::Failed,
        ] {
            assert_eq!(IdeaStatus::from_str_lossy(status.as_str()), status);
        }
    }

    #[test]
    fn test_idea_status_unknown_degrades_to_pending() {
        assert_eq!(IdeaStatus::from_str_lossy("bogus"), IdeaStatus::Pending);
    }

    #[test]
    fn test_dream_status_round_trip() {
        for status in [
            DreamStatus::Pending,
            DreamStatus::Storified,
            DreamStatus::Failed,
        ] {
            assert_eq!(DreamStatus::from_str_lossy(status.as_str()), status);
        }
    }

    #[test]
    fn test_combined_text_content_only() {
        let idea = idea_with("Uber for dogs", None);
        assert_eq!(idea.combined_text(), "Uber for dogs");
    }

    #[test]
    fn test_combined_text_joins_transcription() {
        let idea = idea_with("notes", Some("spoken part"));
        assert_eq!(idea.combined_text(), "notes\n\nspoken part");
    }

    #[test]
    fn test_combined_text_ignores_no_speech_sentinel() {
        let idea = idea_with("", Some(defaults::NO_SPEECH_SENTINEL));
        assert_eq!(idea.combined_text(), "");
    }

    #[test]
    fn test_combined_text_whitespace_only_is_empty() {
        let idea = idea_with("   \n ", None);
        assert_eq!(idea.combined_text(), "");
    }

    #[test]
    fn test_analysis_failure_inference_truncates() {
        let long = "x".repeat(2000);
        match AnalysisFailure::inference(&long) {
            AnalysisFailure::Inference { message } => {
                assert_eq!(message.chars().count(), defaults::FAILURE_MESSAGE_MAX_CHARS);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_analysis_failure_serde_tagging() {
        let failure = AnalysisFailure::MissingField {
            field: "Feasibility".to_string(),
        };
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["kind"], "missing_field");
        assert_eq!(json["field"], "Feasibility");

        let back: AnalysisFailure = serde_json::from_value(json).unwrap();
        assert_eq!(back, failure);
    }

    #[test]
    fn test_idea_analysis_accepts_camel_case_alias() {
        let json = serde_json::json!({
            "score": 7.5,
            "title": "Dog ride sharing",
            "summary": "Transport for pets",
            "reasoning": "Novel but niche",
            "feasibility": "Straightforward",
            "similarIdeas": "Existing pet taxis"
        });
        let analysis: IdeaAnalysis = serde_json::from_value(json).unwrap();
        assert_eq!(analysis.similar_ideas, "Existing pet taxis");
        assert_eq!(analysis.score, 7.5);
    }

    #[test]
    fn test_media_kind_from_mime() {
        assert_eq!(MediaKind::from_mime("image/png"), Some(MediaKind::Image));
        assert_eq!(MediaKind::from_mime("audio/webm"), Some(MediaKind::Audio));
        assert_eq!(MediaKind::from_mime("application/pdf"), None);
    }

    #[test]
    fn test_job_type_strings_unique() {
        let strs = [
            JobType::IdeaTranscription.as_str(),
            JobType::IdeaAnalysis.as_str(),
            JobType::DreamStory.as_str(),
        ];
        let set: std::collections::HashSet<_> = strs.iter().collect();
        assert_eq!(set.len(), strs.len());
    }
}
