//! placemap-mapd library
//!
//! Local HTTP/SSE transport for one [`MapSession`]: map front-ends toggle
//! layers, report viewport changes and set filters here, and read the merged
//! place list back.

use axum::Router;
use placemap_layers::MapSession;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod error;

pub use error::{ApiError, ApiResult};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<MapSession>,
    pub startup_time: Instant,
}

impl AppState {
    pub fn new(session: Arc<MapSession>) -> Self {
        Self {
            session,
            startup_time: Instant::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::health_routes())
        .merge(api::source_routes())
        .merge(api::viewport_routes())
        .merge(api::filter_routes())
        .merge(api::places_routes())
        .merge(api::session_routes())
        .route("/events", get(api::event_stream))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
