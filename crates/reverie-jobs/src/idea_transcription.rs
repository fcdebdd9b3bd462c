//! Handler for transcribing an idea's audio recording.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use reverie_core::{
    AnalysisFailure, IdeaRepository, JobRepository, JobType, MediaRepository, TranscriptionBackend,
};
use reverie_db::Database;

use crate::handler::{JobContext, JobHandler, JobResult};

/// Transcribes an idea's audio attachment, then queues the analysis job.
///
/// Stale jobs (record deleted or generation advanced) are treated as
/// success with no effect; the analysis job is only queued when the
/// transcription write actually applied.
pub struct IdeaTranscriptionHandler {
    db: Database,
    backend: Arc<dyn TranscriptionBackend>,
}

impl IdeaTranscriptionHandler {
    pub fn new(db: Database, backend: Arc<dyn TranscriptionBackend>) -> Self {
        Self { db, backend }
    }

    async fn transcribe(&self, ctx: &JobContext) -> Result<JobResult, reverie_core::Error> {
        let idea_id = ctx.record_id();
        let generation = ctx.generation();

        let Some(idea) = self.db.ideas.get(idea_id).await? else {
            debug!(idea_id = %idea_id, "Idea deleted before transcription, skipping");
            return Ok(JobResult::Success);
        };
        if idea.generation != generation {
            debug!(
                idea_id = %idea_id,
                job_generation = generation,
                record_generation = idea.generation,
                "Stale transcription job, skipping"
            );
            return Ok(JobResult::Success);
        }

        let Some(audio_id) = idea.audio_id else {
            warn!(idea_id = %idea_id, "Transcription job for idea without audio");
            return Ok(JobResult::Success);
        };
        let audio = self
            .db
            .media
            .get(audio_id)
            .await?
            .ok_or(reverie_core::Error::MediaNotFound(audio_id))?;

        let transcript = self
            .backend
            .transcribe(&audio.data, &audio.mime_type)
            .await?;

        let applied = self
            .db
            .ideas
            .set_transcription(idea_id, &transcript, generation)
            .await?;
        if !applied {
            info!(idea_id = %idea_id, "Dropped stale transcription result");
            return Ok(JobResult::Success);
        }

        info!(
            idea_id = %idea_id,
            transcript_len = transcript.len(),
            "Transcription stored, queueing analysis"
        );
        self.db
            .jobs
            .queue(idea_id, JobType::IdeaAnalysis, generation, None)
            .await?;

        Ok(JobResult::Success)
    }
}

#[async_trait]
impl JobHandler for IdeaTranscriptionHandler {
    fn job_type(&self) -> JobType {
        JobType::IdeaTranscription
    }

    async fn execute(&self, ctx: JobContext) -> JobResult {
        let idea_id = ctx.record_id();
        let generation = ctx.generation();

        match self.transcribe(&ctx).await {
            Ok(result) => result,
            Err(e) => {
                let failure = AnalysisFailure::transcription(e.to_string());
                if let Err(store_err) = self
                    .db
                    .ideas
                    .fail_analysis(idea_id, &failure, generation)
                    .await
                {
                    warn!(
                        idea_id = %idea_id,
                        error = %store_err,
                        "Failed to record transcription failure"
                    );
                }
                JobResult::Failed(e.to_string())
            }
        }
    }
}
