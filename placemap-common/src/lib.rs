//! # Placemap Common Library
//!
//! Shared code for the placemap crates including:
//! - Domain model (sources, places, tags, collections)
//! - Bounding box geometry for map viewports
//! - Event types (MapEvent enum) and the EventBus
//! - Bootstrap configuration loading
//! - Common error type

pub mod config;
pub mod error;
pub mod events;
pub mod geo;
pub mod model;

pub use error::{Error, Result};
pub use geo::BoundingBox;
pub use model::{Classification, Place, SourceId};
