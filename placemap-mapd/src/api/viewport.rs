//! Viewport endpoint
//!
//! The map view posts its visible region as often as it likes; the session
//! debounces before anything reloads.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// POST /api/viewport request (map region: center plus span in degrees)
#[derive(Debug, Deserialize)]
pub struct ViewportRequest {
    pub center_lat: f64,
    pub center_lng: f64,
    pub lat_delta: f64,
    pub lng_delta: f64,
}

impl ViewportRequest {
    fn validate(&self) -> ApiResult<()> {
        let values = [self.center_lat, self.center_lng, self.lat_delta, self.lng_delta];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ApiError::BadRequest("viewport values must be finite".to_string()));
        }
        if !(-90.0..=90.0).contains(&self.center_lat) {
            return Err(ApiError::BadRequest(format!(
                "center_lat out of range: {}",
                self.center_lat
            )));
        }
        if !(-180.0..=180.0).contains(&self.center_lng) {
            return Err(ApiError::BadRequest(format!(
                "center_lng out of range: {}",
                self.center_lng
            )));
        }
        Ok(())
    }
}

/// POST /api/viewport
pub async fn report_viewport(
    State(state): State<AppState>,
    Json(request): Json<ViewportRequest>,
) -> ApiResult<StatusCode> {
    request.validate()?;
    state.session.on_viewport_changed(
        request.center_lat,
        request.center_lng,
        request.lat_delta,
        request.lng_delta,
    )?;
    Ok(StatusCode::ACCEPTED)
}

/// Build viewport routes
pub fn viewport_routes() -> Router<AppState> {
    Router::new().route("/api/viewport", post(report_viewport))
}
