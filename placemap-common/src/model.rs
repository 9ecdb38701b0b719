//! Domain model shared by the map layer core and its transports
//!
//! A [`SourceId`] names one place-owning identity that can be shown as a map
//! layer: the signed-in user or one of the users they follow. Places loaded
//! from any source are normalized into the canonical [`Place`] shape before
//! they reach the composer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::Error;

/// Identity of a place-owning map layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SourceId {
    /// The signed-in user
    Me,
    /// A followed user
    User(Uuid),
}

impl SourceId {
    pub fn is_me(&self) -> bool {
        matches!(self, SourceId::Me)
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceId::Me => f.write_str("me"),
            SourceId::User(id) => write!(f, "{}", id),
        }
    }
}

impl FromStr for SourceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("me") {
            return Ok(SourceId::Me);
        }
        Uuid::parse_str(trimmed)
            .map(SourceId::User)
            .map_err(|e| Error::InvalidInput(format!("Invalid source id '{}': {}", s, e)))
    }
}

impl TryFrom<String> for SourceId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SourceId> for String {
    fn from(id: SourceId) -> Self {
        id.to_string()
    }
}

/// Load strategy chosen for a source from its total place count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Metadata not (yet) fetched, or the fetch failed
    #[default]
    Unclassified,
    /// Whole place set fetched once
    Eager,
    /// Places fetched per visible bounding box
    Paged,
}

impl Classification {
    /// Classify a source with `total_place_count` places.
    ///
    /// Counts at or above `large_threshold` are paged.
    pub fn for_count(total_place_count: u64, large_threshold: u64) -> Self {
        if total_place_count >= large_threshold {
            Classification::Paged
        } else {
            Classification::Eager
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Unclassified => "unclassified",
            Classification::Eager => "eager",
            Classification::Paged => "paged",
        }
    }
}

/// Tag attached to a place
///
/// Paged responses only carry tag names, so `id` and `color` are optional
/// and filled in from the source's tag catalog when the name is known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagRef {
    pub id: Option<Uuid>,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

impl TagRef {
    /// Name key used when tag identity can only be compared by name
    pub fn name_key(&self) -> String {
        normalize_tag_name(&self.name)
    }
}

/// Case- and whitespace-insensitive tag name key
pub fn normalize_tag_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Collection (list) a place belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionRef {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

/// Canonical point of interest as seen by the composer and filter stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub id: Uuid,
    /// Source this place was loaded from
    pub owner: SourceId,
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
    pub tags: Vec<TagRef>,
    #[serde(default)]
    pub collections: Vec<CollectionRef>,
}

/// Tag catalog entry from a source's metadata summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagSummary {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub usage_count: u64,
}

/// Collection catalog entry from a source's metadata summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSummary {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub place_count: u64,
}

/// Lightweight per-source metadata used for classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SourceMetadata {
    pub total_place_count: u64,
    #[serde(default)]
    pub tags: Vec<TagSummary>,
    #[serde(default)]
    pub collections: Vec<CollectionSummary>,
}

impl SourceMetadata {
    /// Find a catalog tag by name, ignoring case and surrounding whitespace
    pub fn tag_by_name(&self, name: &str) -> Option<&TagSummary> {
        let key = normalize_tag_name(name);
        self.tags.iter().find(|t| normalize_tag_name(&t.name) == key)
    }
}
