//! Repository and inference backend traits.
//!
//! Repositories abstract the Postgres layer so job handlers and the API can
//! be exercised against fakes. Inference traits put the seam between the
//! pipeline and the external generative model: the backend is constructed
//! once at startup and injected into handlers, never ambient global state.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    AnalysisFailure, CreateDreamRequest, CreateIdeaRequest, Dream, Idea, IdeaAnalysis, Job,
    JobType, Media, MediaKind,
};

// =============================================================================
// RECORD REPOSITORIES
// =============================================================================

/// Persistence operations for idea records.
///
/// The `generation` parameters implement the stale-job lease: writes only
/// apply when the record's generation still equals the value snapshotted at
/// job-schedule time, and return `false` when the write was dropped (record
/// deleted or superseded).
#[async_trait]
pub trait IdeaRepository: Send + Sync {
    async fn insert(&self, req: CreateIdeaRequest) -> Result<Uuid>;

    async fn get(&self, id: Uuid) -> Result<Option<Idea>>;

    /// All ideas for one owner, position descending (newest first).
    async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<Idea>>;

    /// Update free text content. Does not touch status; re-evaluation of an
    /// idea is an explicit user action.
    async fn update_content(&self, id: Uuid, content: &str) -> Result<()>;

    /// Move the idea to a new ordering position.
    async fn set_position(&self, id: Uuid, position: f64) -> Result<()>;

    /// Reset for re-analysis: status analyzing, analysis/failure cleared,
    /// generation bumped. Returns the new generation to stamp on the job.
    async fn begin_reanalysis(&self, id: Uuid) -> Result<i64>;

    /// Persist the transcription produced by the speech-to-text job.
    async fn set_transcription(&self, id: Uuid, text: &str, generation: i64) -> Result<bool>;

    /// Persist a successful analysis and mark the idea analyzed.
    async fn complete_analysis(
        &self,
        id: Uuid,
        analysis: &IdeaAnalysis,
        generation: i64,
    ) -> Result<bool>;

    /// Mark the idea analyzed with no analysis payload (empty-input policy).
    async fn complete_empty(&self, id: Uuid, generation: i64) -> Result<bool>;

    /// Mark the idea failed with a structured cause.
    async fn fail_analysis(
        &self,
        id: Uuid,
        failure: &AnalysisFailure,
        generation: i64,
    ) -> Result<bool>;

    /// Unconditional analysis write used by the legacy webhook completion
    /// channel. Bypasses the generation guard by design.
    async fn force_analysis(&self, id: Uuid, analysis: &IdeaAnalysis) -> Result<bool>;

    /// Hard delete, no tombstone.
    async fn delete(&self, id: Uuid) -> Result<()>;
}

/// Persistence operations for dream records.
#[async_trait]
pub trait DreamRepository: Send + Sync {
    async fn insert(&self, req: CreateDreamRequest) -> Result<Uuid>;

    async fn get(&self, id: Uuid) -> Result<Option<Dream>>;

    /// All dreams for one owner, position descending (newest first).
    async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<Dream>>;

    /// Replace content and reset for re-generation: status pending,
    /// story/title/failure cleared, generation bumped. Returns the new
    /// generation to stamp on the job.
    async fn reset_content(&self, id: Uuid, content: &str) -> Result<i64>;

    /// Persist a generated story and mark the dream storified.
    async fn complete_story(
        &self,
        id: Uuid,
        story: &str,
        title: Option<&str>,
        generation: i64,
    ) -> Result<bool>;

    /// Mark the dream failed with a structured cause.
    async fn fail_story(&self, id: Uuid, failure: &AnalysisFailure, generation: i64)
        -> Result<bool>;

    /// Hard delete, no tombstone.
    async fn delete(&self, id: Uuid) -> Result<()>;
}

/// Persistence for uploaded media blobs (inline storage).
#[async_trait]
pub trait MediaRepository: Send + Sync {
    async fn insert(
        &self,
        owner_id: Uuid,
        kind: MediaKind,
        mime_type: &str,
        data: &[u8],
    ) -> Result<Uuid>;

    async fn get(&self, id: Uuid) -> Result<Option<Media>>;
}

// =============================================================================
// JOB QUEUE
// =============================================================================

/// Queueing and claiming of pipeline jobs.
///
/// "Schedule soon, off the request path": queueing returns immediately and
/// the worker claims jobs out of band. No automatic retry; a failed job is
/// terminal until the user re-triggers processing.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Enqueue a job for a record at the given generation.
    async fn queue(
        &self,
        record_id: Uuid,
        job_type: JobType,
        generation: i64,
        payload: Option<JsonValue>,
    ) -> Result<Uuid>;

    /// Claim the oldest pending job of one of the given types, marking it
    /// running. Concurrent workers never claim the same job.
    async fn claim_next_for_types(&self, job_types: &[JobType]) -> Result<Option<Job>>;

    /// Mark a job completed.
    async fn complete(&self, id: Uuid) -> Result<()>;

    /// Mark a job failed with an error message.
    async fn fail(&self, id: Uuid, error: &str) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<Job>>;

    /// Number of pending jobs across all types.
    async fn pending_count(&self) -> Result<i64>;
}

// =============================================================================
// INFERENCE BACKENDS
// =============================================================================

/// A binary part attached to a multimodal generation request.
#[derive(Debug, Clone)]
pub struct MediaPart {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// Backend for single-shot text generation, optionally multimodal.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate text for a prompt. No streaming, no multi-turn.
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_with_media(prompt, &[]).await
    }

    /// Generate text for a prompt with inline binary attachments (images).
    async fn generate_with_media(&self, prompt: &str, media: &[MediaPart]) -> Result<String>;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

/// Backend for transcribing audio to text.
#[async_trait]
pub trait TranscriptionBackend: Send + Sync {
    /// Transcribe audio data, returning the plain transcript text.
    async fn transcribe(&self, audio_data: &[u8], mime_type: &str) -> Result<String>;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}
