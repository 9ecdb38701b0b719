//! Place source loader
//!
//! Fetches one source's places with the strategy its classification calls
//! for and normalizes the wire records into canonical [`Place`]s:
//! - ownership is stamped with the source id
//! - duplicate ids within the source are dropped (first occurrence wins)
//! - paged results are clipped to the requested box and capped at `limit`
//! - paged tag names are matched against the source's tag catalog to
//!   recover tag ids and colors
//!
//! The loader never touches the merged collection; failures are returned
//! to the composer as per-source [`LayerError::Load`] values.

use placemap_common::model::{CollectionRef, SourceMetadata, TagRef};
use placemap_common::{BoundingBox, Classification, Place, SourceId};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::api::{EagerPlace, PagedPlace, PlaceApi};
use crate::classifier::SourceProfile;
use crate::error::{LayerError, Result};

/// Loads place lists for classified sources
pub struct PlaceSourceLoader {
    api: Arc<dyn PlaceApi>,
}

impl PlaceSourceLoader {
    pub fn new(api: Arc<dyn PlaceApi>) -> Self {
        Self { api }
    }

    /// Load the complete place set of an Eager source
    pub async fn load_eager(&self, profile: &SourceProfile) -> Result<Vec<Place>> {
        require(profile, Classification::Eager, "load_eager")?;
        let source_id = profile.source_id;

        let records = self.api.all_places(&source_id).await.map_err(|e| {
            warn!(source_id = %source_id, error = %e, "Full place load failed");
            LayerError::Load {
                source_id,
                reason: e.to_string(),
            }
        })?;

        let places = normalize_eager(source_id, records);
        debug!(source_id = %source_id, count = places.len(), "Loaded eager source");
        Ok(places)
    }

    /// Load at most `limit` places of a Paged source inside `bbox`
    ///
    /// Without a known viewport there is nothing to page by, so the result
    /// is empty and no request is made.
    pub async fn load_paged(
        &self,
        profile: &SourceProfile,
        bbox: Option<&BoundingBox>,
        limit: usize,
    ) -> Result<Vec<Place>> {
        require(profile, Classification::Paged, "load_paged")?;
        let source_id = profile.source_id;

        let Some(bbox) = bbox else {
            debug!(source_id = %source_id, "No viewport yet, paged load skipped");
            return Ok(Vec::new());
        };

        let records = self
            .api
            .places_in_bounds(&source_id, bbox, limit)
            .await
            .map_err(|e| {
                warn!(source_id = %source_id, error = %e, "Paged place load failed");
                LayerError::Load {
                    source_id,
                    reason: e.to_string(),
                }
            })?;

        let places = normalize_paged(source_id, records, &profile.metadata, bbox, limit);
        debug!(source_id = %source_id, count = places.len(), limit, "Loaded paged source");
        Ok(places)
    }
}

fn require(profile: &SourceProfile, expected: Classification, operation: &'static str) -> Result<()> {
    if profile.classification == expected {
        Ok(())
    } else {
        Err(LayerError::StrategyMismatch {
            source_id: profile.source_id,
            actual: profile.classification,
            operation,
        })
    }
}

/// Normalize full place records
pub fn normalize_eager(owner: SourceId, records: Vec<EagerPlace>) -> Vec<Place> {
    let places = records.into_iter().map(|record| Place {
        id: record.id,
        owner,
        name: record.name,
        address: record.address,
        latitude: record.latitude,
        longitude: record.longitude,
        category: record.category,
        notes: record.notes,
        tags: record
            .tags
            .into_iter()
            .map(|t| TagRef {
                id: Some(t.id),
                name: t.name,
                color: t.color,
            })
            .collect(),
        collections: record
            .lists
            .into_iter()
            .map(|l| CollectionRef {
                id: l.id,
                name: l.name,
                color: l.color,
            })
            .collect(),
    });

    dedupe_by_id(places)
}

/// Normalize compact place records against the source's catalogs
pub fn normalize_paged(
    owner: SourceId,
    records: Vec<PagedPlace>,
    metadata: &SourceMetadata,
    bbox: &BoundingBox,
    limit: usize,
) -> Vec<Place> {
    let received = records.len();

    let places = records
        .into_iter()
        .filter(|record| bbox.contains(record.latitude, record.longitude))
        .map(|record| Place {
            id: record.id,
            owner,
            name: record.name,
            address: record.address,
            latitude: record.latitude,
            longitude: record.longitude,
            category: record.category,
            notes: String::new(),
            tags: record
                .tag_names
                .into_iter()
                .map(|name| match metadata.tag_by_name(&name) {
                    Some(tag) => TagRef {
                        id: Some(tag.id),
                        name,
                        color: tag.color.clone(),
                    },
                    None => TagRef {
                        id: None,
                        name,
                        color: None,
                    },
                })
                .collect(),
            collections: record
                .list_ids
                .into_iter()
                .filter_map(|id| {
                    metadata
                        .collections
                        .iter()
                        .find(|c| c.id == id)
                        .map(|c| CollectionRef {
                            id: c.id,
                            name: c.name.clone(),
                            color: c.color.clone(),
                        })
                })
                .collect(),
        });

    let mut places = dedupe_by_id(places);
    places.truncate(limit);

    if places.len() < received {
        debug!(
            source_id = %owner,
            received,
            kept = places.len(),
            "Dropped out-of-box, duplicate or over-limit paged records"
        );
    }

    places
}

fn dedupe_by_id(places: impl Iterator<Item = Place>) -> Vec<Place> {
    let mut seen = HashSet::new();
    places.filter(|p| seen.insert(p.id)).collect()
}
