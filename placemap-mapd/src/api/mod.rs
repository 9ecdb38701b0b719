//! HTTP API handlers for placemap-mapd

pub mod filter;
pub mod health;
pub mod places;
pub mod session;
pub mod sources;
pub mod sse;
pub mod viewport;

pub use filter::filter_routes;
pub use health::health_routes;
pub use places::places_routes;
pub use session::session_routes;
pub use sources::source_routes;
pub use sse::event_stream;
pub use viewport::viewport_routes;
