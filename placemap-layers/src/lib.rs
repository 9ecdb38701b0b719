//! # Placemap Layers
//!
//! Adaptive multi-source map data loading.
//!
//! **Components:**
//! - `api`: backend seam ([`PlaceApi`]) and its HTTP client
//! - `classifier`: Eager/Paged classification with a session cache
//! - `loader`: full and bounding-box place loads, normalized to `Place`
//! - `composer`: per-source state machine and merged collection
//! - `debounce`: viewport change debouncing
//! - `filter`: tag/collection/text filter stage
//! - `session`: [`MapSession`] facade used by map front-ends

pub mod api;
pub mod classifier;
pub mod composer;
pub mod debounce;
pub mod error;
pub mod filter;
pub mod loader;
pub mod session;

pub use api::{ApiError, HttpPlaceApi, PlaceApi};
pub use classifier::{ClassificationCache, SourceClassifier, SourceProfile};
pub use composer::{ComposerHandle, LayerComposer, MapSnapshot};
pub use error::{LayerError, Result};
pub use filter::{FilterSpec, TagMatchMode};
pub use session::MapSession;
