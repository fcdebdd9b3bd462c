//! Handler for analyzing an idea against the evaluation rubric.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use reverie_core::{
    AnalysisFailure, GenerationBackend, Idea, IdeaRepository, MediaPart, MediaRepository,
};
use reverie_db::Database;
use reverie_inference::{
    idea_analysis_prompt, idea_analysis_prompt_with_image, parse_idea_analysis, AnalysisParseError,
};

use crate::handler::{JobContext, JobHandler, JobResult};

/// Evaluates an idea with the generative model and stores the result.
///
/// Empty input (no text, no transcription, no image) short-circuits to
/// analyzed-with-no-analysis without a model call. Parse and inference
/// failures are persisted on the record as a structured cause; the job
/// reports failure but never panics the worker.
pub struct IdeaAnalysisHandler {
    db: Database,
    backend: Arc<dyn GenerationBackend>,
}

/// What a failed attempt should write to the record, paired with the
/// job-level error message.
enum Outcome {
    Stored,
    Skipped,
    Failed(AnalysisFailure),
}

impl IdeaAnalysisHandler {
    pub fn new(db: Database, backend: Arc<dyn GenerationBackend>) -> Self {
        Self { db, backend }
    }

    async fn analyze(
        &self,
        idea: &Idea,
        generation: i64,
    ) -> Result<Outcome, reverie_core::Error> {
        let text = idea.combined_text();
        let has_image = idea.image_id.is_some();

        if text.is_empty() && !has_image {
            debug!(idea_id = %idea.id, "Nothing to analyze, marking analyzed without analysis");
            self.db.ideas.complete_empty(idea.id, generation).await?;
            return Ok(Outcome::Skipped);
        }

        let mut media = Vec::new();
        if let Some(image_id) = idea.image_id {
            let image = self
                .db
                .media
                .get(image_id)
                .await?
                .ok_or(reverie_core::Error::MediaNotFound(image_id))?;
            media.push(MediaPart {
                mime_type: image.mime_type,
                data: image.data,
            });
        }
        let prompt = if has_image {
            idea_analysis_prompt_with_image(&text)
        } else {
            idea_analysis_prompt(&text)
        };

        let response = match self.backend.generate_with_media(&prompt, &media).await {
            Ok(r) => r,
            Err(e) => return Ok(Outcome::Failed(AnalysisFailure::inference(e.to_string()))),
        };
        if response.trim().is_empty() {
            return Ok(Outcome::Failed(AnalysisFailure::EmptyResponse));
        }

        let analysis = match parse_idea_analysis(&response) {
            Ok(a) => a,
            Err(e) => return Ok(Outcome::Failed(parse_failure(e))),
        };

        let applied = self
            .db
            .ideas
            .complete_analysis(idea.id, &analysis, generation)
            .await?;
        if !applied {
            info!(idea_id = %idea.id, "Dropped stale analysis result");
        } else {
            info!(idea_id = %idea.id, score = analysis.score, "Analysis stored");
        }
        Ok(Outcome::Stored)
    }
}

fn parse_failure(err: AnalysisParseError) -> AnalysisFailure {
    match err {
        AnalysisParseError::MissingField(field) => AnalysisFailure::MissingField {
            field: field.to_string(),
        },
        AnalysisParseError::InvalidScore(raw) => AnalysisFailure::InvalidScore { raw },
    }
}

#[async_trait]
impl JobHandler for IdeaAnalysisHandler {
    fn job_type(&self) -> reverie_core::JobType {
        reverie_core::JobType::IdeaAnalysis
    }

    async fn execute(&self, ctx: JobContext) -> JobResult {
        let idea_id = ctx.record_id();
        let generation = ctx.generation();

        let idea = match self.db.ideas.get(idea_id).await {
            Ok(Some(idea)) => idea,
            Ok(None) => {
                debug!(idea_id = %idea_id, "Idea deleted before analysis, skipping");
                return JobResult::Success;
            }
            Err(e) => return JobResult::Failed(e.to_string()),
        };
        if idea.generation != generation {
            debug!(
                idea_id = %idea_id,
                job_generation = generation,
                record_generation = idea.generation,
                "Stale analysis job, skipping"
            );
            return JobResult::Success;
        }

        match self.analyze(&idea, generation).await {
            Ok(Outcome::Stored) | Ok(Outcome::Skipped) => JobResult::Success,
            Ok(Outcome::Failed(failure)) => {
                let message = failure.to_string();
                if let Err(e) = self
                    .db
                    .ideas
                    .fail_analysis(idea_id, &failure, generation)
                    .await
                {
                    warn!(idea_id = %idea_id, error = %e, "Failed to record analysis failure");
                }
                JobResult::Failed(message)
            }
            Err(e) => JobResult::Failed(e.to_string()),
        }
    }
}
