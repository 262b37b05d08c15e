use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    middleware::request_id::RequestId,
    models::{
        highlight::{self, Segment},
        Record,
    },
    services::SearchSnapshot,
};

use super::{AppState, Session};

/// Longest query text accepted from the search bar, in bytes
pub const MAX_QUERY_BYTES: usize = 512;

// Request/Response types

#[derive(Debug, Serialize)]
pub struct SessionCreatedResponse {
    pub id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub snapshot: SearchSnapshot,
}

#[derive(Debug, Deserialize)]
pub struct SetQueryRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct LoadMoreResponse {
    pub requested: bool,
}

/// What a renderer needs to draw one row
#[derive(Debug, Serialize)]
pub struct RowResponse {
    pub index: usize,
    pub object_id: Option<String>,
    pub title: Option<String>,
    pub title_highlighted: Option<String>,
    pub title_segments: Vec<Segment>,
    pub year: Option<i32>,
    pub rating: Option<u32>,
    pub image_url: Option<String>,
    /// Whether showing this row prefetched the next page
    pub load_more_requested: bool,
}

impl RowResponse {
    fn new(index: usize, record: &Record, load_more_requested: bool) -> Self {
        let title_segments = record
            .highlighted_title()
            .map(|markup| {
                highlight::segments(markup, highlight::DEFAULT_PRE_TAG, highlight::DEFAULT_POST_TAG)
            })
            .unwrap_or_default();

        Self {
            index,
            object_id: record.object_id().map(str::to_string),
            title: record.title().map(str::to_string),
            title_highlighted: record.highlighted_title().map(str::to_string),
            title_segments,
            year: record.year(),
            rating: record.rating(),
            image_url: record.image_url().map(|u| u.to_string()),
            load_more_requested,
        }
    }
}

// Handlers

/// Health check endpoint
pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// Open a search session and run its first load
pub async fn create_session(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
) -> (StatusCode, Json<SessionCreatedResponse>) {
    let (id, _) = state.open_session().await;

    tracing::info!(request_id = %request_id, session = %id, "Search session opened");

    (StatusCode::CREATED, Json(SessionCreatedResponse { id }))
}

/// Current read model of a session
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<SessionResponse>> {
    let session = find_session(&state, &id).await?;

    Ok(Json(SessionResponse {
        id,
        created_at: session.created_at,
        snapshot: session.controller.snapshot(),
    }))
}

/// Search bar edit
pub async fn set_query(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
    Json(request): Json<SetQueryRequest>,
) -> AppResult<StatusCode> {
    if request.text.len() > MAX_QUERY_BYTES {
        return Err(AppError::InvalidInput(format!(
            "Query text exceeds {} bytes",
            MAX_QUERY_BYTES
        )));
    }

    let session = find_session(&state, &id).await?;

    tracing::info!(
        request_id = %request_id,
        session = %id,
        query = %request.text,
        "Query updated"
    );

    session.controller.set_query_text(request.text);
    Ok(StatusCode::ACCEPTED)
}

/// Explicit request for the next page
pub async fn load_more(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<LoadMoreResponse>> {
    let session = find_session(&state, &id).await?;
    let requested = session.controller.load_more();
    Ok(Json(LoadMoreResponse { requested }))
}

/// Row view; prefetches the next page when the row is near the end
pub async fn get_row(
    State(state): State<AppState>,
    Path((id, index)): Path<(Uuid, usize)>,
) -> AppResult<Json<RowResponse>> {
    let session = find_session(&state, &id).await?;
    let record = session
        .controller
        .item(index)
        .ok_or_else(|| AppError::NotFound(format!("Row {} not loaded", index)))?;

    let load_more_requested = session.controller.row_appeared(index);
    Ok(Json(RowResponse::new(index, &record, load_more_requested)))
}

/// Row image fetched through the image loader
pub async fn get_row_image(
    State(state): State<AppState>,
    Path((id, index)): Path<(Uuid, usize)>,
) -> AppResult<impl IntoResponse> {
    let session = find_session(&state, &id).await?;
    let record = session
        .controller
        .item(index)
        .ok_or_else(|| AppError::NotFound(format!("Row {} not loaded", index)))?;
    let url = record
        .image_url()
        .ok_or_else(|| AppError::NotFound(format!("Row {} has no image", index)))?;

    let image = state.image_loader.resolve_image(&url).await?;
    let content_type = image
        .content_type
        .unwrap_or_else(|| "application/octet-stream".to_string());

    Ok(([(header::CONTENT_TYPE, content_type)], image.bytes))
}

/// Tear down a session
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    if state.close_session(&id).await {
        tracing::info!(session = %id, "Search session closed");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Session {}", id)))
    }
}

async fn find_session(state: &AppState, id: &Uuid) -> AppResult<Session> {
    state
        .session(id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Session {}", id)))
}
