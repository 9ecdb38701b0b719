//! Backend API seam
//!
//! The map layer core consumes three backend operations per source. They are
//! expressed as the [`PlaceApi`] trait so the composer can run against the
//! reqwest-backed [`HttpPlaceApi`] or an in-memory implementation.
//!
//! The two place listings return different wire shapes: the full listing
//! carries complete tag and list records ([`EagerPlace`]), while the
//! bounding-box listing is compact and names tags only ([`PagedPlace`]).
//! The loader normalizes both into [`placemap_common::Place`].

mod http;

pub use http::HttpPlaceApi;

use placemap_common::model::SourceMetadata;
use placemap_common::{BoundingBox, SourceId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Backend client errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not authorized: {0}")]
    Forbidden(String),

    #[error("API error {0}: {1}")]
    Status(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Tag record as returned by the full place listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireTag {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

/// List (collection) record as returned by the full place listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireList {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

/// Full place record from `getAllPlaces`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EagerPlace {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub tags: Vec<WireTag>,
    #[serde(default)]
    pub lists: Vec<WireList>,
}

/// Compact place record from `getPlacesInBounds`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PagedPlace {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub category: String,
    /// Tag names only; ids and colors come from the source's tag catalog
    #[serde(default)]
    pub tag_names: Vec<String>,
    #[serde(default)]
    pub list_ids: Vec<Uuid>,
}

/// Backend operations consumed by the classifier and loader
#[async_trait::async_trait]
pub trait PlaceApi: Send + Sync {
    /// Total place count plus tag and collection catalogs for a source
    async fn source_metadata(&self, source_id: &SourceId) -> Result<SourceMetadata, ApiError>;

    /// Every place owned by a source (eager sources only)
    async fn all_places(&self, source_id: &SourceId) -> Result<Vec<EagerPlace>, ApiError>;

    /// At most `limit` places of a source inside `bbox` (paged sources only)
    async fn places_in_bounds(
        &self,
        source_id: &SourceId,
        bbox: &BoundingBox,
        limit: usize,
    ) -> Result<Vec<PagedPlace>, ApiError>;
}
