//! Source (map layer) endpoints
//!
//! - GET    /api/sources                 layer list with status indicators
//! - POST   /api/sources                 register a followed user's map
//! - DELETE /api/sources/:id             forget a followed user's map
//! - POST   /api/sources/:id/activate    show a layer
//! - POST   /api/sources/:id/deactivate  hide a layer
//!
//! `:id` is either `me` or a followed user's UUID.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use placemap_common::events::SourceStatus;
use placemap_common::SourceId;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// POST /api/sources request
#[derive(Debug, Deserialize)]
pub struct RegisterSourceRequest {
    pub source_id: SourceId,
    pub display_name: String,
}

#[derive(Debug, Serialize)]
pub struct DeactivateResponse {
    pub source_id: SourceId,
    pub deactivated: bool,
}

fn parse_source_id(raw: &str) -> ApiResult<SourceId> {
    Ok(raw.parse::<SourceId>()?)
}

fn status_of(state: &AppState, source_id: &SourceId) -> ApiResult<SourceStatus> {
    state
        .session
        .statuses()
        .into_iter()
        .find(|s| s.source_id == *source_id)
        .ok_or_else(|| ApiError::NotFound(format!("Unknown source: {}", source_id)))
}

/// GET /api/sources
pub async fn list_sources(State(state): State<AppState>) -> Json<Vec<SourceStatus>> {
    Json(state.session.statuses())
}

/// POST /api/sources
///
/// 201 when newly registered, 200 when an existing source was renamed.
pub async fn register_source(
    State(state): State<AppState>,
    Json(request): Json<RegisterSourceRequest>,
) -> ApiResult<(StatusCode, Json<SourceStatus>)> {
    let display_name = request.display_name.trim();
    if display_name.is_empty() {
        return Err(ApiError::BadRequest("display_name must not be empty".to_string()));
    }

    let added = state
        .session
        .register_source(request.source_id, display_name)
        .await?;
    if added {
        info!(source_id = %request.source_id, "Registered source via API");
    }

    let code = if added { StatusCode::CREATED } else { StatusCode::OK };
    Ok((code, Json(status_of(&state, &request.source_id)?)))
}

/// DELETE /api/sources/:id
pub async fn forget_source(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let source_id = parse_source_id(&id)?;
    state.session.forget_source(source_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/sources/:id/activate
///
/// 202: loading continues in the background; watch `/events` or poll
/// `/api/sources` for the outcome.
pub async fn activate_source(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<SourceStatus>)> {
    let source_id = parse_source_id(&id)?;
    state.session.activate_source(source_id).await?;
    Ok((StatusCode::ACCEPTED, Json(status_of(&state, &source_id)?)))
}

/// POST /api/sources/:id/deactivate
pub async fn deactivate_source(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeactivateResponse>> {
    let source_id = parse_source_id(&id)?;
    let deactivated = state.session.deactivate_source(source_id).await?;
    Ok(Json(DeactivateResponse {
        source_id,
        deactivated,
    }))
}

/// Build source routes
pub fn source_routes() -> Router<AppState> {
    Router::new()
        .route("/api/sources", get(list_sources).post(register_source))
        .route("/api/sources/:id", delete(forget_source))
        .route("/api/sources/:id/activate", post(activate_source))
        .route("/api/sources/:id/deactivate", post(deactivate_source))
}
