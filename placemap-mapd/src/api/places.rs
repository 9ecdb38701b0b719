//! Merged place list endpoint

use axum::{extract::State, routing::get, Json, Router};
use placemap_common::{BoundingBox, Place};
use serde::Serialize;

use crate::AppState;

/// GET /api/places response
#[derive(Debug, Serialize)]
pub struct PlacesResponse {
    pub revision: u64,
    pub viewport: Option<BoundingBox>,
    /// Places across active layers before filtering
    pub merged_count: usize,
    pub visible_count: usize,
    /// True while any layer is still loading
    pub loading: bool,
    pub places: Vec<Place>,
}

/// GET /api/places
pub async fn get_places(State(state): State<AppState>) -> Json<PlacesResponse> {
    let snapshot = state.session.snapshot();

    Json(PlacesResponse {
        revision: snapshot.revision,
        viewport: snapshot.viewport,
        merged_count: snapshot.merged_count(),
        visible_count: snapshot.visible_count(),
        loading: !snapshot.is_settled(),
        places: snapshot.places.as_ref().clone(),
    })
}

/// Build places routes
pub fn places_routes() -> Router<AppState> {
    Router::new().route("/api/places", get(get_places))
}
