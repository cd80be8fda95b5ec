//! HTTP handlers
//!
//! Endpoints:
//! - GET    /health                    — liveness plus refresh counters
//! - GET    /api/v1/taxonomy           — categories and folders
//! - POST   /api/v1/ingest             — classify and route free text
//! - GET    /api/v1/memories           — semantic search (`q`) or listing (`folder`)
//! - POST   /api/v1/memories           — file a memory explicitly
//! - GET    /api/v1/memories/:id       — one memory
//! - PATCH  /api/v1/memories/:id       — partial update
//! - GET    /api/v1/folders            — folders with counts
//! - GET    /api/v1/events             — calendar events in a window
//! - POST   /api/v1/events             — schedule an event explicitly
//! - POST   /api/v1/advice             — advice over the caller's memories
//! - GET    /api/v1/search             — memories and events matching `q`
//! - GET    /api/v1/chats/:id          — chat transcript
//! - PUT    /api/v1/audio/:id          — register a finished transcript
//!
//! Every `/api/v1` route reads the caller from the `x-user-id` header.

use super::error::ApiError;
use crate::assistant::Assistant;
use crate::error::Error;
use crate::memory::{Id, MemoryPatch, NewMemoryRequest, SearchQuery};
use crate::router::IngestRequest;
use crate::services::{AdviceService, NewEvent};
use crate::taxonomy::TAXONOMY;
use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Header carrying the caller's numeric id
pub const USER_HEADER: &str = "x-user-id";

/// Caller identity taken from [`USER_HEADER`]
#[derive(Debug, Clone, Copy)]
pub struct UserId(pub Id);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for UserId {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_HEADER)
            .ok_or_else(|| Error::PermissionDenied(format!("missing {} header", USER_HEADER)))?;
        value
            .to_str()
            .ok()
            .and_then(|v| v.parse::<Id>().ok())
            .map(UserId)
            .ok_or_else(|| Error::PermissionDenied(format!("invalid {} header", USER_HEADER)).into())
    }
}

/// Create the API router
pub fn api_router(assistant: Assistant) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/taxonomy", get(taxonomy))
        .route("/api/v1/ingest", post(ingest))
        .route("/api/v1/memories", get(search_memories).post(create_memory))
        .route("/api/v1/memories/:id", get(get_memory).patch(update_memory))
        .route("/api/v1/folders", get(list_folders))
        .route("/api/v1/events", get(list_events).post(create_event))
        .route("/api/v1/advice", post(advise))
        .route("/api/v1/search", get(search))
        .route("/api/v1/chats/:id", get(get_chat))
        .route("/api/v1/audio/:id", put(register_audio))
        .with_state(assistant)
}

// =============================================================================
// Request types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IngestBody {
    #[serde(default)]
    text: String,
    audio_id: Option<String>,
    chat_id: Option<Id>,
}

#[derive(Debug, Deserialize)]
struct EventsQuery {
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventBody {
    title: String,
    description: Option<String>,
    #[serde(alias = "starts_at")]
    starts_at: DateTime<Utc>,
    #[serde(alias = "ends_at")]
    ends_at: Option<DateTime<Utc>>,
    tz: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AdviceBody {
    query: String,
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AudioBody {
    transcript: Option<String>,
    summary: Option<String>,
    #[serde(default)]
    next_steps: Vec<String>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    backend: String,
    remote: bool,
    refresh: crate::memory::RefreshStats,
}

fn parse_id(raw: &str) -> Result<Id, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::bad_request(format!("invalid id: {}", raw)))
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /health
async fn health_check(State(assistant): State<Assistant>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        backend: assistant.store().backend_name().to_string(),
        remote: assistant.is_remote(),
        refresh: assistant.store().refresh_stats(),
    })
}

/// GET /api/v1/taxonomy
async fn taxonomy() -> impl IntoResponse {
    Json(TAXONOMY)
}

/// POST /api/v1/ingest
async fn ingest(
    State(assistant): State<Assistant>,
    UserId(owner): UserId,
    Json(body): Json<IngestBody>,
) -> Result<impl IntoResponse, ApiError> {
    let response = assistant
        .router()
        .ingest(IngestRequest {
            owner_id: owner,
            text: body.text,
            audio_id: body.audio_id,
            chat_id: body.chat_id,
        })
        .await?;
    Ok(Json(response))
}

/// GET /api/v1/memories
async fn search_memories(
    State(assistant): State<Assistant>,
    UserId(owner): UserId,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(assistant.store().search(owner, query).await?))
}

/// POST /api/v1/memories
async fn create_memory(
    State(assistant): State<Assistant>,
    UserId(owner): UserId,
    Json(request): Json<NewMemoryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let memory = assistant
        .store()
        .create(owner, &request.folder, &request.title, &request.content)
        .await?;
    Ok((StatusCode::CREATED, Json(memory)))
}

/// GET /api/v1/memories/:id
async fn get_memory(
    State(assistant): State<Assistant>,
    UserId(owner): UserId,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(assistant.store().find_one(owner, id).await?))
}

/// PATCH /api/v1/memories/:id
async fn update_memory(
    State(assistant): State<Assistant>,
    UserId(owner): UserId,
    Path(id): Path<String>,
    Json(patch): Json<MemoryPatch>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(assistant.store().update(owner, id, patch).await?))
}

/// GET /api/v1/folders
async fn list_folders(
    State(assistant): State<Assistant>,
    UserId(owner): UserId,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(assistant.store().folders(owner).await?))
}

/// GET /api/v1/events
async fn list_events(
    State(assistant): State<Assistant>,
    UserId(owner): UserId,
    Query(query): Query<EventsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let items = assistant.calendar().list(owner, query.from, query.to).await?;
    Ok(Json(serde_json::json!({ "items": items })))
}

/// POST /api/v1/events
async fn create_event(
    State(assistant): State<Assistant>,
    UserId(owner): UserId,
    Json(body): Json<EventBody>,
) -> Result<impl IntoResponse, ApiError> {
    let title = body.title.trim();
    if title.is_empty() {
        return Err(ApiError::bad_request("title must not be empty"));
    }
    if body.ends_at.map_or(false, |end| end < body.starts_at) {
        return Err(ApiError::bad_request("endsAt is before startsAt"));
    }
    if let Some(tz) = &body.tz {
        tz.parse::<chrono_tz::Tz>()
            .map_err(|_| ApiError::bad_request(format!("unknown timezone: {}", tz)))?;
    }

    let event = assistant
        .calendar()
        .create(
            owner,
            NewEvent {
                title: title.to_string(),
                description: body.description.filter(|d| !d.trim().is_empty()),
                starts_at: body.starts_at,
                ends_at: body.ends_at,
                tz: body.tz,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(event)))
}

/// POST /api/v1/advice
async fn advise(
    State(assistant): State<Assistant>,
    UserId(owner): UserId,
    Json(body): Json<AdviceBody>,
) -> Result<impl IntoResponse, ApiError> {
    let query = body.query.trim();
    if query.is_empty() {
        return Err(ApiError::bad_request("query must not be empty"));
    }
    Ok(Json(assistant.advisor().answer(owner, query).await?))
}

/// GET /api/v1/search
async fn search(
    State(assistant): State<Assistant>,
    UserId(owner): UserId,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(assistant.search().search(owner, &params.q).await?))
}

/// GET /api/v1/chats/:id
async fn get_chat(
    State(assistant): State<Assistant>,
    UserId(owner): UserId,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(assistant.chats().get(owner, id).await?))
}

/// PUT /api/v1/audio/:id
async fn register_audio(
    State(assistant): State<Assistant>,
    UserId(owner): UserId,
    Path(reference): Path<String>,
    Json(body): Json<AudioBody>,
) -> impl IntoResponse {
    assistant
        .audio()
        .register(owner, &reference, body.transcript, body.summary, body.next_steps)
        .await;
    StatusCode::NO_CONTENT
}
