//! Session lifecycle endpoints

use axum::{extract::State, http::StatusCode, routing::post, Router};
use tracing::info;

use crate::error::ApiResult;
use crate::AppState;

/// POST /api/session/logout
///
/// Drops followed layers and cached classifications; the user's own layer
/// returns to inactive.
pub async fn logout(State(state): State<AppState>) -> ApiResult<StatusCode> {
    state.session.logout().await?;
    info!("Session logged out via API");
    Ok(StatusCode::NO_CONTENT)
}

/// Build session routes
pub fn session_routes() -> Router<AppState> {
    Router::new().route("/api/session/logout", post(logout))
}
