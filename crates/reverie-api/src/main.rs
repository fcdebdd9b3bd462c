//! reverie-api - HTTP API server for reverie

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequestParts, Path, State},
    http::{header, request::Parts, HeaderMap, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use reverie_core::{
    CreateDreamRequest, CreateIdeaRequest, Dream, DreamRepository, GenerationBackend, Idea,
    IdeaAnalysis, IdeaRepository, JobRepository, JobType, MediaKind, MediaRepository,
    TranscriptionBackend,
};
use reverie_db::Database;
use reverie_inference::GeminiBackend;
use reverie_jobs::{
    DreamStoryHandler, IdeaAnalysisHandler, IdeaTranscriptionHandler, JobWorker, WorkerConfig,
};

// =============================================================================
// REQUEST ID (UUIDv7)
// =============================================================================

/// Generates time-ordered UUIDv7 request correlation IDs.
#[derive(Clone, Default)]
struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    db: Database,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with configurable output
    //
    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file (optional, enables file logging)
    //   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
    //   RUST_LOG    - standard env filter (default: "reverie_api=debug,tower_http=debug")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "reverie_api=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(env_filter);

    // Optionally create a file appender with daily rotation
    let _file_guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("reverie-api.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer().with_writer(non_blocking);
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            } else {
                layer = layer.with_ansi(false); // no ANSI in files
            }
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        // Console-only output
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    // Get configuration from environment
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://localhost/reverie".to_string());
    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| reverie_core::defaults::SERVER_PORT.to_string())
        .parse()
        .unwrap_or(reverie_core::defaults::SERVER_PORT);
    let media_max_bytes: usize = std::env::var("MEDIA_MAX_BYTES")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(reverie_core::defaults::MEDIA_MAX_BYTES);

    // Connect to database
    info!("Connecting to database...");
    let db = Database::connect(&database_url).await?;
    info!("Database connected");

    // Run pending database migrations on startup
    info!("Running database migrations...");
    db.migrate().await?;
    info!("Database migrations complete");

    // Inference backend is required even when the worker is disabled, so a
    // missing GEMINI_API_KEY fails at startup rather than on the first job.
    let backend = Arc::new(GeminiBackend::from_env()?);
    info!(model = backend.model(), "Inference backend initialized");

    // Create and start job worker
    let worker_enabled = std::env::var("WORKER_ENABLED")
        .map(|v| v != "false" && v != "0")
        .unwrap_or(true);

    let _worker_handle = if worker_enabled {
        info!("Starting job worker...");
        let worker = JobWorker::new(db.clone(), WorkerConfig::from_env());

        let generation: Arc<dyn GenerationBackend> = backend.clone();
        let transcription: Arc<dyn TranscriptionBackend> = backend.clone();

        worker
            .register_handler(IdeaTranscriptionHandler::new(db.clone(), transcription))
            .await;
        worker
            .register_handler(IdeaAnalysisHandler::new(db.clone(), generation.clone()))
            .await;
        worker
            .register_handler(DreamStoryHandler::new(db.clone(), generation))
            .await;

        let handle = worker.start();
        info!("Job worker started");
        Some(handle)
    } else {
        info!("Job worker disabled");
        None
    };

    // Create app state
    let state = AppState { db };

    // Build router
    let app = Router::new()
        // Health check
        .route("/health", get(health_check))
        // Ideas
        .route("/api/v1/ideas", post(create_idea).get(list_ideas))
        .route(
            "/api/v1/ideas/:id",
            get(get_idea).patch(update_idea).delete(delete_idea),
        )
        .route("/api/v1/ideas/:id/reanalyze", post(reanalyze_idea))
        .route("/api/v1/ideas/:id/move", post(move_idea))
        // Dreams
        .route("/api/v1/dreams", post(create_dream).get(list_dreams))
        .route(
            "/api/v1/dreams/:id",
            get(get_dream).patch(update_dream).delete(delete_dream),
        )
        // Media
        .route("/api/v1/media", post(upload_media))
        .route("/api/v1/media/:id", get(get_media))
        // Compatibility webhook for externally-computed analyses
        .route("/gemini-analysis", post(gemini_analysis_webhook))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer({
            let cors = CorsLayer::new()
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PATCH,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers(Any);
            match parse_allowed_origins() {
                Some(origins) => cors.allow_origin(AllowOrigin::list(origins)),
                None => cors.allow_origin(Any),
            }
        })
        .layer(RequestBodyLimitLayer::new(media_max_bytes))
        .with_state(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Parse `CORS_ALLOWED_ORIGINS` (comma-separated). None means allow any.
fn parse_allowed_origins() -> Option<Vec<axum::http::HeaderValue>> {
    let raw = std::env::var("CORS_ALLOWED_ORIGINS").ok()?;
    let origins: Vec<_> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect();
    if origins.is_empty() {
        None
    } else {
        Some(origins)
    }
}

// =============================================================================
// AUTH
// =============================================================================

/// The authenticated owner id, injected by the fronting auth layer as an
/// `X-User-Id` header. Authentication itself is delegated.
#[derive(Debug, Clone, Copy)]
struct AuthUser(Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Missing X-User-Id header".to_string()))?;
        let id = Uuid::parse_str(value)
            .map_err(|_| ApiError::Unauthorized("Invalid X-User-Id header".to_string()))?;
        Ok(AuthUser(id))
    }
}

// =============================================================================
// HEALTH
// =============================================================================

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// =============================================================================
// IDEAS
// =============================================================================

#[derive(Debug, Deserialize)]
struct CreateIdeaBody {
    #[serde(default)]
    content: String,
    image_id: Option<Uuid>,
    audio_id: Option<Uuid>,
}

/// An idea as returned by the API: the record plus resolved media URLs.
#[derive(Debug, Serialize)]
struct IdeaView {
    #[serde(flatten)]
    idea: Idea,
    image_url: Option<String>,
    audio_url: Option<String>,
}

impl From<Idea> for IdeaView {
    fn from(idea: Idea) -> Self {
        let image_url = idea.image_id.map(media_url);
        let audio_url = idea.audio_id.map(media_url);
        Self {
            idea,
            image_url,
            audio_url,
        }
    }
}

fn media_url(id: Uuid) -> String {
    format!("/api/v1/media/{}", id)
}

/// Validate the create-idea body: empty content is only acceptable when the
/// idea is captured as an image or audio recording.
fn validate_idea_body(body: &CreateIdeaBody) -> Result<(), ApiError> {
    if body.content.trim().is_empty() && body.image_id.is_none() && body.audio_id.is_none() {
        return Err(ApiError::BadRequest(
            "Content is required unless an image or audio recording is attached".to_string(),
        ));
    }
    Ok(())
}

async fn create_idea(
    State(state): State<AppState>,
    AuthUser(owner_id): AuthUser,
    Json(body): Json<CreateIdeaBody>,
) -> Result<impl IntoResponse, ApiError> {
    validate_idea_body(&body)?;

    // Referenced media must exist, belong to the caller, and match the slot
    // it is attached to.
    for (media_id, expected_kind) in [
        (body.image_id, MediaKind::Image),
        (body.audio_id, MediaKind::Audio),
    ] {
        let Some(media_id) = media_id else { continue };
        let media = state
            .db
            .media
            .get(media_id)
            .await?
            .ok_or_else(|| ApiError::BadRequest(format!("Media {} not found", media_id)))?;
        if media.owner_id != owner_id {
            return Err(ApiError::Forbidden("Media belongs to another user".to_string()));
        }
        if media.kind != expected_kind {
            return Err(ApiError::BadRequest(format!(
                "Media {} is {}, expected {}",
                media_id,
                media.kind.as_str(),
                expected_kind.as_str()
            )));
        }
    }

    let id = state
        .db
        .ideas
        .insert(CreateIdeaRequest {
            owner_id,
            content: body.content,
            image_id: body.image_id,
            audio_id: body.audio_id,
        })
        .await?;

    // Audio ideas go through transcription first; the transcription handler
    // queues the analysis job once the transcript is stored.
    let job_type = if body.audio_id.is_some() {
        JobType::IdeaTranscription
    } else {
        JobType::IdeaAnalysis
    };
    state.db.jobs.queue(id, job_type, 0, None).await?;

    info!(idea_id = %id, ?job_type, "Idea created");
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": id }))))
}

async fn list_ideas(
    State(state): State<AppState>,
    AuthUser(owner_id): AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let ideas = state.db.ideas.list_by_owner(owner_id).await?;
    let views: Vec<IdeaView> = ideas.into_iter().map(IdeaView::from).collect();
    Ok(Json(views))
}

/// Load an idea and verify the caller owns it.
async fn owned_idea(state: &AppState, id: Uuid, caller: Uuid) -> Result<Idea, ApiError> {
    let idea = state
        .db
        .ideas
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Idea {} not found", id)))?;
    if idea.owner_id != caller {
        return Err(ApiError::Forbidden("Not your idea".to_string()));
    }
    Ok(idea)
}

async fn get_idea(
    State(state): State<AppState>,
    AuthUser(owner_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let idea = owned_idea(&state, id, owner_id).await?;
    Ok(Json(IdeaView::from(idea)))
}

#[derive(Debug, Deserialize)]
struct UpdateIdeaBody {
    content: String,
}

async fn update_idea(
    State(state): State<AppState>,
    AuthUser(owner_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateIdeaBody>,
) -> Result<impl IntoResponse, ApiError> {
    owned_idea(&state, id, owner_id).await?;
    // Content edits do not re-trigger analysis; that is an explicit action.
    state.db.ideas.update_content(id, &body.content).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn reanalyze_idea(
    State(state): State<AppState>,
    AuthUser(owner_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    owned_idea(&state, id, owner_id).await?;

    // Bump the generation so any in-flight older job's writes are dropped,
    // then queue exactly one analysis job at the new generation.
    let generation = state.db.ideas.begin_reanalysis(id).await?;
    state
        .db
        .jobs
        .queue(id, JobType::IdeaAnalysis, generation, None)
        .await?;

    info!(idea_id = %id, generation, "Idea reanalysis queued");
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "id": id, "generation": generation })),
    ))
}

#[derive(Debug, Deserialize)]
struct MoveIdeaBody {
    position: f64,
}

async fn move_idea(
    State(state): State<AppState>,
    AuthUser(owner_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<MoveIdeaBody>,
) -> Result<impl IntoResponse, ApiError> {
    owned_idea(&state, id, owner_id).await?;
    state.db.ideas.set_position(id, body.position).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_idea(
    State(state): State<AppState>,
    AuthUser(owner_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    owned_idea(&state, id, owner_id).await?;
    state.db.ideas.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// DREAMS
// =============================================================================

#[derive(Debug, Deserialize)]
struct CreateDreamBody {
    content: String,
}

async fn create_dream(
    State(state): State<AppState>,
    AuthUser(owner_id): AuthUser,
    Json(body): Json<CreateDreamBody>,
) -> Result<impl IntoResponse, ApiError> {
    if body.content.trim().is_empty() {
        return Err(ApiError::BadRequest("Content is required".to_string()));
    }

    let id = state
        .db
        .dreams
        .insert(CreateDreamRequest {
            owner_id,
            content: body.content,
        })
        .await?;
    state.db.jobs.queue(id, JobType::DreamStory, 0, None).await?;

    info!(dream_id = %id, "Dream created");
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": id }))))
}

async fn list_dreams(
    State(state): State<AppState>,
    AuthUser(owner_id): AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let dreams = state.db.dreams.list_by_owner(owner_id).await?;
    Ok(Json(dreams))
}

/// Load a dream and verify the caller owns it.
async fn owned_dream(state: &AppState, id: Uuid, caller: Uuid) -> Result<Dream, ApiError> {
    let dream = state
        .db
        .dreams
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Dream {} not found", id)))?;
    if dream.owner_id != caller {
        return Err(ApiError::Forbidden("Not your dream".to_string()));
    }
    Ok(dream)
}

async fn get_dream(
    State(state): State<AppState>,
    AuthUser(owner_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let dream = owned_dream(&state, id, owner_id).await?;
    Ok(Json(dream))
}

#[derive(Debug, Deserialize)]
struct UpdateDreamBody {
    content: String,
}

async fn update_dream(
    State(state): State<AppState>,
    AuthUser(owner_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateDreamBody>,
) -> Result<impl IntoResponse, ApiError> {
    if body.content.trim().is_empty() {
        return Err(ApiError::BadRequest("Content is required".to_string()));
    }
    owned_dream(&state, id, owner_id).await?;

    // Editing a dream resets it to pending and queues exactly one story job
    // at the bumped generation.
    let generation = state.db.dreams.reset_content(id, &body.content).await?;
    state
        .db
        .jobs
        .queue(id, JobType::DreamStory, generation, None)
        .await?;

    info!(dream_id = %id, generation, "Dream updated, story queued");
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "id": id, "generation": generation })),
    ))
}

async fn delete_dream(
    State(state): State<AppState>,
    AuthUser(owner_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    owned_dream(&state, id, owner_id).await?;
    state.db.dreams.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// MEDIA
// =============================================================================

async fn upload_media(
    State(state): State<AppState>,
    AuthUser(owner_id): AuthUser,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let mime_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("Content-Type header is required".to_string()))?;
    let kind = MediaKind::from_mime(mime_type)
        .ok_or_else(|| ApiError::BadRequest(format!("Unsupported media type: {}", mime_type)))?;
    if body.is_empty() {
        return Err(ApiError::BadRequest("Empty media upload".to_string()));
    }

    let id = state
        .db
        .media
        .insert(owner_id, kind, mime_type, &body[..])
        .await?;

    info!(media_id = %id, ?kind, size_bytes = body.len(), "Media uploaded");
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "id": id, "url": media_url(id) })),
    ))
}

async fn get_media(
    State(state): State<AppState>,
    AuthUser(owner_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let media = state
        .db
        .media
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Media {} not found", id)))?;
    if media.owner_id != owner_id {
        return Err(ApiError::Forbidden("Not your media".to_string()));
    }

    Ok(([(header::CONTENT_TYPE, media.mime_type)], media.data))
}

// =============================================================================
// GEMINI ANALYSIS WEBHOOK
// =============================================================================

/// Body accepted by the `/gemini-analysis` compatibility webhook. The field
/// names follow the original camelCase contract; snake_case is also accepted.
#[derive(Debug, Deserialize)]
struct GeminiAnalysisBody {
    #[serde(alias = "ideaId")]
    idea_id: Option<Uuid>,
    analysis: Option<IdeaAnalysis>,
}

/// Alternate completion channel: an external caller supplies a finished
/// analysis and the idea is patched to analyzed regardless of its current
/// pipeline state.
async fn gemini_analysis_webhook(
    State(state): State<AppState>,
    Json(body): Json<GeminiAnalysisBody>,
) -> Result<impl IntoResponse, ApiError> {
    let (Some(idea_id), Some(analysis)) = (body.idea_id, body.analysis) else {
        return Err(ApiError::BadRequest(
            "Missing ideaId or analysis".to_string(),
        ));
    };

    let applied = state.db.ideas.force_analysis(idea_id, &analysis).await?;
    if !applied {
        warn!(idea_id = %idea_id, "Webhook analysis for unknown idea");
        return Err(ApiError::Internal(format!("Idea {} not found", idea_id)));
    }

    info!(idea_id = %idea_id, "Webhook analysis stored");
    Ok(Json(serde_json::json!({ "success": true })))
}

// =============================================================================
// ERROR HANDLING
// =============================================================================

#[derive(Debug)]
enum ApiError {
    Database(reverie_core::Error),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl From<reverie_core::Error> for ApiError {
    fn from(err: reverie_core::Error) -> Self {
        match &err {
            reverie_core::Error::NotFound(msg) => ApiError::NotFound(msg.clone()),
            reverie_core::Error::IdeaNotFound(id) => {
                ApiError::NotFound(format!("Idea {} not found", id))
            }
            reverie_core::Error::DreamNotFound(id) => {
                ApiError::NotFound(format!("Dream {} not found", id))
            }
            reverie_core::Error::MediaNotFound(id) => {
                ApiError::NotFound(format!("Media {} not found", id))
            }
            reverie_core::Error::InvalidInput(msg) => ApiError::BadRequest(msg.clone()),
            _ => ApiError::Database(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::Database(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
