//! Filter endpoints

use axum::{extract::State, routing::get, Json, Router};
use placemap_layers::FilterSpec;

use crate::error::ApiResult;
use crate::AppState;

/// GET /api/filter
pub async fn get_filter(State(state): State<AppState>) -> Json<FilterSpec> {
    Json(state.session.filter())
}

/// PUT /api/filter
///
/// Replaces the whole filter. The merged list is refiltered before this
/// returns, so a following `GET /api/places` sees the result.
pub async fn put_filter(
    State(state): State<AppState>,
    Json(spec): Json<FilterSpec>,
) -> ApiResult<Json<FilterSpec>> {
    state.session.set_filter_spec(spec).await?;
    Ok(Json(state.session.filter()))
}

/// Build filter routes
pub fn filter_routes() -> Router<AppState> {
    Router::new().route("/api/filter", get(get_filter).put(put_filter))
}
