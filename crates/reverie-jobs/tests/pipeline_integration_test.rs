//! End-to-end pipeline handler tests against a live Postgres.
//!
//! Ignored by default; run with:
//!
//! ```sh
//! DATABASE_URL=postgres://localhost/reverie_test cargo test -p reverie-jobs -- --ignored
//! ```

use std::sync::Arc;

use reverie_core::{
    AnalysisFailure, CreateDreamRequest, CreateIdeaRequest, DreamRepository, DreamStatus,
    IdeaRepository, IdeaStatus, JobRepository, JobType, MediaKind, MediaRepository,
};
use reverie_db::Database;
use reverie_inference::MockBackend;
use reverie_jobs::{
    DreamStoryHandler, IdeaAnalysisHandler, IdeaTranscriptionHandler, JobContext, JobHandler,
    JobResult,
};
use uuid::Uuid;

async fn connect() -> Database {
    dotenvy::dotenv().ok();
    let url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://localhost/reverie_test".to_string());
    Database::connect(&url).await.expect("test database")
}

const GOOD_ANALYSIS: &str = "Score: 8\n\
    Title: Solar Microgrids\n\
    Summary: Community-owned solar microgrids.\n\
    Reasoning: High impact, proven tech.\n\
    Feasibility: Deployable today.\n\
    Similar Ideas: Rural electrification programs.";

async fn create_idea(db: &Database, content: &str) -> Uuid {
    db.ideas
        .insert(CreateIdeaRequest {
            owner_id: Uuid::new_v4(),
            content: content.to_string(),
            image_id: None,
            audio_id: None,
        })
        .await
        .unwrap()
}

async fn claimed_job(db: &Database, job_type: JobType, record_id: Uuid) -> reverie_core::Job {
    loop {
        let job = db
            .jobs
            .claim_next_for_types(&[job_type])
            .await
            .unwrap()
            .expect("queued job");
        if job.record_id == record_id {
            return job;
        }
    }
}

#[tokio::test]
#[ignore]
async fn test_analysis_job_stores_parsed_analysis() {
    let db = connect().await;
    let idea_id = create_idea(&db, "community solar microgrids").await;
    db.jobs
        .queue(idea_id, JobType::IdeaAnalysis, 0, None)
        .await
        .unwrap();

    let backend = Arc::new(MockBackend::new().with_fixed_response(GOOD_ANALYSIS));
    let handler = IdeaAnalysisHandler::new(db.clone(), backend.clone());

    let job = claimed_job(&db, JobType::IdeaAnalysis, idea_id).await;
    let result = handler.execute(JobContext::new(job)).await;
    assert!(matches!(result, JobResult::Success));
    assert_eq!(backend.generate_call_count(), 1);

    let idea = db.ideas.get(idea_id).await.unwrap().unwrap();
    assert_eq!(idea.status, IdeaStatus::Analyzed);
    let analysis = idea.analysis.expect("analysis stored");
    assert_eq!(analysis.score, 8.0);
    assert_eq!(analysis.title, "Solar Microgrids");
    assert!(idea.failure.is_none());
}

#[tokio::test]
#[ignore]
async fn test_analysis_job_persists_structured_failure_on_bad_output() {
    let db = connect().await;
    let idea_id = create_idea(&db, "an idea the model mangles").await;
    db.jobs
        .queue(idea_id, JobType::IdeaAnalysis, 0, None)
        .await
        .unwrap();

    let backend = Arc::new(MockBackend::new().with_fixed_response("I refuse to use the format."));
    let handler = IdeaAnalysisHandler::new(db.clone(), backend);

    let job = claimed_job(&db, JobType::IdeaAnalysis, idea_id).await;
    let result = handler.execute(JobContext::new(job)).await;
    assert!(matches!(result, JobResult::Failed(_)));

    let idea = db.ideas.get(idea_id).await.unwrap().unwrap();
    assert_eq!(idea.status, IdeaStatus::Failed);
    assert_eq!(
        idea.failure,
        Some(AnalysisFailure::MissingField {
            field: "Score".to_string()
        })
    );
    assert!(idea.analysis.is_none());
}

#[tokio::test]
#[ignore]
async fn test_analysis_job_short_circuits_empty_input() {
    let db = connect().await;
    let owner = Uuid::new_v4();
    let audio_id = db
        .media
        .insert(owner, MediaKind::Audio, "audio/webm", b"fake")
        .await
        .unwrap();
    let idea_id = db
        .ideas
        .insert(CreateIdeaRequest {
            owner_id: owner,
            content: String::new(),
            image_id: None,
            audio_id: Some(audio_id),
        })
        .await
        .unwrap();

    // Sentinel transcript means there is nothing to analyze.
    db.ideas
        .set_transcription(idea_id, "[no speech detected]", 0)
        .await
        .unwrap();
    db.jobs
        .queue(idea_id, JobType::IdeaAnalysis, 0, None)
        .await
        .unwrap();

    let backend = Arc::new(MockBackend::new());
    let handler = IdeaAnalysisHandler::new(db.clone(), backend.clone());

    let job = claimed_job(&db, JobType::IdeaAnalysis, idea_id).await;
    let result = handler.execute(JobContext::new(job)).await;
    assert!(matches!(result, JobResult::Success));
    // No model call for empty input.
    assert_eq!(backend.generate_call_count(), 0);

    let idea = db.ideas.get(idea_id).await.unwrap().unwrap();
    assert_eq!(idea.status, IdeaStatus::Analyzed);
    assert!(idea.analysis.is_none());
}

#[tokio::test]
#[ignore]
async fn test_transcription_job_stores_transcript_and_queues_analysis() {
    let db = connect().await;
    let owner = Uuid::new_v4();
    let audio_id = db
        .media
        .insert(owner, MediaKind::Audio, "audio/webm", b"fake-audio")
        .await
        .unwrap();
    let idea_id = db
        .ideas
        .insert(CreateIdeaRequest {
            owner_id: owner,
            content: String::new(),
            image_id: None,
            audio_id: Some(audio_id),
        })
        .await
        .unwrap();
    db.jobs
        .queue(idea_id, JobType::IdeaTranscription, 0, None)
        .await
        .unwrap();

    let backend = Arc::new(MockBackend::new().with_transcription("an app that plants trees"));
    let handler = IdeaTranscriptionHandler::new(db.clone(), backend);

    let job = claimed_job(&db, JobType::IdeaTranscription, idea_id).await;
    let result = handler.execute(JobContext::new(job)).await;
    assert!(matches!(result, JobResult::Success));

    let idea = db.ideas.get(idea_id).await.unwrap().unwrap();
    assert_eq!(idea.transcription.as_deref(), Some("an app that plants trees"));

    // A follow-up analysis job was queued at the same generation.
    let analysis_job = claimed_job(&db, JobType::IdeaAnalysis, idea_id).await;
    assert_eq!(analysis_job.generation, 0);
}

#[tokio::test]
#[ignore]
async fn test_dream_story_success_and_failure() {
    let db = connect().await;
    let owner = Uuid::new_v4();

    // Success path
    let dream_id = db
        .dreams
        .insert(CreateDreamRequest {
            owner_id: owner,
            content: "flying over a glass city".to_string(),
        })
        .await
        .unwrap();
    db.jobs
        .queue(dream_id, JobType::DreamStory, 0, None)
        .await
        .unwrap();

    let backend = Arc::new(MockBackend::new().with_fixed_response(
        "```json\n{\"title\": \"Glass City\", \"story\": \"The city shimmered below.\"}\n```",
    ));
    let handler = DreamStoryHandler::new(db.clone(), backend);

    let job = claimed_job(&db, JobType::DreamStory, dream_id).await;
    assert!(matches!(
        handler.execute(JobContext::new(job)).await,
        JobResult::Success
    ));

    let dream = db.dreams.get(dream_id).await.unwrap().unwrap();
    assert_eq!(dream.status, DreamStatus::Storified);
    assert_eq!(dream.story.as_deref(), Some("The city shimmered below."));
    assert_eq!(dream.story_title.as_deref(), Some("Glass City"));

    // Failure path: model returns prose instead of JSON
    let dream_id = db
        .dreams
        .insert(CreateDreamRequest {
            owner_id: owner,
            content: "falling forever".to_string(),
        })
        .await
        .unwrap();
    db.jobs
        .queue(dream_id, JobType::DreamStory, 0, None)
        .await
        .unwrap();

    let backend = Arc::new(MockBackend::new().with_fixed_response("Once upon a time..."));
    let handler = DreamStoryHandler::new(db.clone(), backend);

    let job = claimed_job(&db, JobType::DreamStory, dream_id).await;
    assert!(matches!(
        handler.execute(JobContext::new(job)).await,
        JobResult::Failed(_)
    ));

    let dream = db.dreams.get(dream_id).await.unwrap().unwrap();
    assert_eq!(dream.status, DreamStatus::Failed);
    assert!(dream.failure.is_some());
    assert!(dream.story.is_none());
}

#[tokio::test]
#[ignore]
async fn test_stale_job_is_skipped_without_model_call() {
    let db = connect().await;
    let idea_id = create_idea(&db, "original wording").await;
    db.jobs
        .queue(idea_id, JobType::IdeaAnalysis, 0, None)
        .await
        .unwrap();

    // User re-triggers before the worker gets to the original job.
    db.ideas.begin_reanalysis(idea_id).await.unwrap();

    let backend = Arc::new(MockBackend::new().with_fixed_response(GOOD_ANALYSIS));
    let handler = IdeaAnalysisHandler::new(db.clone(), backend.clone());

    let job = claimed_job(&db, JobType::IdeaAnalysis, idea_id).await;
    assert_eq!(job.generation, 0);
    assert!(matches!(
        handler.execute(JobContext::new(job)).await,
        JobResult::Success
    ));
    assert_eq!(backend.generate_call_count(), 0);

    let idea = db.ideas.get(idea_id).await.unwrap().unwrap();
    assert_eq!(idea.status, IdeaStatus::Analyzing);
    assert!(idea.analysis.is_none());
}
