//! Source classification
//!
//! Each source's metadata is fetched once per session and the source is
//! classified as Eager or Paged against the large-map threshold. The result
//! is held in a [`ClassificationCache`] owned by the session; it is cleared
//! on logout and entries are dropped when a followed user is forgotten.
//!
//! The cache keeps one `OnceCell` per source, so concurrent and repeated
//! `classify` calls share a single metadata request. A failed request leaves
//! the cell empty and the next call retries.

use placemap_common::model::SourceMetadata;
use placemap_common::{Classification, SourceId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::api::PlaceApi;
use crate::error::{LayerError, Result};

/// Classification outcome for one source
#[derive(Debug, Clone, PartialEq)]
pub struct SourceProfile {
    pub source_id: SourceId,
    pub classification: Classification,
    /// Metadata the classification was computed from; the tag catalog is
    /// used to enrich paged results, which only carry tag names
    pub metadata: Arc<SourceMetadata>,
}

impl SourceProfile {
    pub fn total_place_count(&self) -> u64 {
        self.metadata.total_place_count
    }

    pub fn is_paged(&self) -> bool {
        self.classification == Classification::Paged
    }
}

/// Session-scoped classification cache
#[derive(Default)]
pub struct ClassificationCache {
    entries: Mutex<HashMap<SourceId, Arc<OnceCell<SourceProfile>>>>,
}

impl ClassificationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached profile, if this source was classified successfully
    pub fn get(&self, source_id: &SourceId) -> Option<SourceProfile> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(source_id).and_then(|cell| cell.get().cloned())
    }

    /// Drop one source's entry (unfollow)
    pub fn forget(&self, source_id: &SourceId) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(source_id);
    }

    /// Drop every entry (logout)
    pub fn clear(&self) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.clear();
    }

    /// Number of sources with a completed classification
    pub fn len(&self) -> usize {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.values().filter(|cell| cell.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cell(&self, source_id: &SourceId) -> Arc<OnceCell<SourceProfile>> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(entries.entry(*source_id).or_default())
    }
}

/// Classifies sources by total place count
pub struct SourceClassifier {
    api: Arc<dyn PlaceApi>,
    cache: Arc<ClassificationCache>,
    large_threshold: u64,
    metadata_requests: AtomicU64,
}

impl SourceClassifier {
    pub fn new(api: Arc<dyn PlaceApi>, cache: Arc<ClassificationCache>, large_threshold: u64) -> Self {
        Self {
            api,
            cache,
            large_threshold,
            metadata_requests: AtomicU64::new(0),
        }
    }

    pub fn cache(&self) -> &Arc<ClassificationCache> {
        &self.cache
    }

    pub fn large_threshold(&self) -> u64 {
        self.large_threshold
    }

    /// Metadata requests issued so far by this classifier
    pub fn metadata_requests(&self) -> u64 {
        self.metadata_requests.load(Ordering::Relaxed)
    }

    /// Classify a source, issuing at most one metadata request per session
    pub async fn classify(&self, source_id: &SourceId) -> Result<SourceProfile> {
        let cell = self.cache.cell(source_id);

        if let Some(profile) = cell.get() {
            debug!(source_id = %source_id, classification = ?profile.classification, "Classification cache hit");
            return Ok(profile.clone());
        }

        let profile = cell
            .get_or_try_init(|| async {
                self.metadata_requests.fetch_add(1, Ordering::Relaxed);

                let metadata = self.api.source_metadata(source_id).await.map_err(|e| {
                    warn!(source_id = %source_id, error = %e, "Source metadata request failed");
                    LayerError::Classification {
                        source_id: *source_id,
                        reason: e.to_string(),
                    }
                })?;

                let classification =
                    Classification::for_count(metadata.total_place_count, self.large_threshold);

                info!(
                    source_id = %source_id,
                    total_place_count = metadata.total_place_count,
                    classification = classification.as_str(),
                    "Classified source"
                );

                Ok::<_, LayerError>(SourceProfile {
                    source_id: *source_id,
                    classification,
                    metadata: Arc::new(metadata),
                })
            })
            .await?;

        Ok(profile.clone())
    }
}
