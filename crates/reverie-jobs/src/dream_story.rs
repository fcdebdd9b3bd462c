//! Handler for turning a dream description into a short story.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use reverie_core::{AnalysisFailure, DreamRepository, GenerationBackend};
use reverie_db::Database;
use reverie_inference::{dream_story_prompt, parse_dream_story, StoryParseError};

use crate::handler::{JobContext, JobHandler, JobResult};

/// Generates a `{title, story}` pair for a dream and stores it.
pub struct DreamStoryHandler {
    db: Database,
    backend: Arc<dyn GenerationBackend>,
}

impl DreamStoryHandler {
    pub fn new(db: Database, backend: Arc<dyn GenerationBackend>) -> Self {
        Self { db, backend }
    }
}

fn story_failure(err: StoryParseError) -> AnalysisFailure {
    match err {
        StoryParseError::InvalidJson(message) => AnalysisFailure::inference(message),
        StoryParseError::MissingStory => AnalysisFailure::MissingField {
            field: "story".to_string(),
        },
    }
}

#[async_trait]
impl JobHandler for DreamStoryHandler {
    fn job_type(&self) -> reverie_core::JobType {
        reverie_core::JobType::DreamStory
    }

    async fn execute(&self, ctx: JobContext) -> JobResult {
        let dream_id = ctx.record_id();
        let generation = ctx.generation();

        let dream = match self.db.dreams.get(dream_id).await {
            Ok(Some(dream)) => dream,
            Ok(None) => {
                debug!(dream_id = %dream_id, "Dream deleted before storytelling, skipping");
                return JobResult::Success;
            }
            Err(e) => return JobResult::Failed(e.to_string()),
        };
        if dream.generation != generation {
            debug!(
                dream_id = %dream_id,
                job_generation = generation,
                record_generation = dream.generation,
                "Stale story job, skipping"
            );
            return JobResult::Success;
        }
        if dream.content.trim().is_empty() {
            warn!(dream_id = %dream_id, "Dream has no content, skipping");
            return JobResult::Success;
        }

        let prompt = dream_story_prompt(&dream.content);
        let failure = match self.backend.generate(&prompt).await {
            Ok(response) if response.trim().is_empty() => Some(AnalysisFailure::EmptyResponse),
            Ok(response) => match parse_dream_story(&response) {
                Ok(story) => {
                    let applied = match self
                        .db
                        .dreams
                        .complete_story(dream_id, &story.story, story.title.as_deref(), generation)
                        .await
                    {
                        Ok(applied) => applied,
                        Err(e) => return JobResult::Failed(e.to_string()),
                    };
                    if applied {
                        info!(
                            dream_id = %dream_id,
                            story_len = story.story.len(),
                            has_title = story.title.is_some(),
                            "Story stored"
                        );
                    } else {
                        info!(dream_id = %dream_id, "Dropped stale story result");
                    }
                    None
                }
                Err(e) => Some(story_failure(e)),
            },
            Err(e) => Some(AnalysisFailure::inference(e.to_string())),
        };

        match failure {
            None => JobResult::Success,
            Some(failure) => {
                let message = failure.to_string();
                if let Err(e) = self
                    .db
                    .dreams
                    .fail_story(dream_id, &failure, generation)
                    .await
                {
                    warn!(dream_id = %dream_id, error = %e, "Failed to record story failure");
                }
                JobResult::Failed(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_story_failure_mapping() {
        assert_eq!(
            story_failure(StoryParseError::MissingStory),
            AnalysisFailure::MissingField {
                field: "story".to_string()
            }
        );
        assert!(matches!(
            story_failure(StoryParseError::InvalidJson("bad".to_string())),
            AnalysisFailure::Inference { .. }
        ));
    }
}
