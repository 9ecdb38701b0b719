//! Map session facade
//!
//! [`MapSession`] wires the classifier, loader, composer and viewport
//! debouncer together for one signed-in user and exposes the operations a
//! map UI drives. The classification cache lives here for the lifetime of
//! the session and is cleared on logout.

use placemap_common::config::LoaderSettings;
use placemap_common::events::{EventBus, MapEvent, SourceStatus};
use placemap_common::{BoundingBox, Place, SourceId};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::api::PlaceApi;
use crate::classifier::{ClassificationCache, SourceClassifier};
use crate::composer::{ComposerHandle, LayerComposer, MapSnapshot};
use crate::debounce::ViewportDebouncer;
use crate::error::{LayerError, Result};
use crate::filter::{FilterSpec, TagMatchMode};
use crate::loader::PlaceSourceLoader;

/// One user's map session
pub struct MapSession {
    composer: ComposerHandle,
    cache: Arc<ClassificationCache>,
    classifier: Arc<SourceClassifier>,
    viewport_tx: mpsc::UnboundedSender<BoundingBox>,
    event_bus: EventBus,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl MapSession {
    /// Start the composer and debouncer tasks
    ///
    /// Must be called from within a tokio runtime. Both tasks stop when
    /// `shutdown` is cancelled.
    pub fn start(
        api: Arc<dyn PlaceApi>,
        settings: &LoaderSettings,
        event_bus: EventBus,
        shutdown: CancellationToken,
    ) -> Self {
        let cache = Arc::new(ClassificationCache::new());
        let classifier = Arc::new(SourceClassifier::new(
            Arc::clone(&api),
            Arc::clone(&cache),
            settings.large_threshold,
        ));
        let loader = Arc::new(PlaceSourceLoader::new(api));

        let (composer, composer_task) = LayerComposer::spawn(
            Arc::clone(&classifier),
            loader,
            settings.paged_limit,
            event_bus.clone(),
            shutdown.clone(),
        );

        let (viewport_tx, viewport_rx) = mpsc::unbounded_channel();
        let sink = composer.clone();
        let debouncer_task = ViewportDebouncer::new(settings.debounce(), settings.viewport_epsilon_deg)
            .spawn(viewport_rx, shutdown.clone(), move |bbox| {
                if sink.viewport_changed(bbox).is_err() {
                    debug!("Composer stopped, settled viewport dropped");
                }
            });

        info!(
            large_threshold = settings.large_threshold,
            paged_limit = settings.paged_limit,
            debounce_ms = settings.debounce_ms,
            "Map session started"
        );

        Self {
            composer,
            cache,
            classifier,
            viewport_tx,
            event_bus,
            shutdown,
            tasks: vec![composer_task, debouncer_task],
        }
    }

    pub async fn activate_source(&self, source_id: SourceId) -> Result<()> {
        self.composer.activate(source_id).await
    }

    /// Returns false if the source was not active
    pub async fn deactivate_source(&self, source_id: SourceId) -> Result<bool> {
        self.composer.deactivate(source_id).await
    }

    /// Raw region change from the map view
    ///
    /// Debounced before it reaches the composer.
    pub fn on_viewport_changed(
        &self,
        center_lat: f64,
        center_lng: f64,
        lat_delta: f64,
        lng_delta: f64,
    ) -> Result<()> {
        let bbox = BoundingBox::from_region(center_lat, center_lng, lat_delta, lng_delta);
        self.on_viewport_box(bbox)
    }

    pub fn on_viewport_box(&self, bbox: BoundingBox) -> Result<()> {
        self.viewport_tx
            .send(bbox)
            .map_err(|_| LayerError::SessionClosed)
    }

    pub async fn set_filter(
        &self,
        selected_tag_ids: Vec<Uuid>,
        mode: TagMatchMode,
        query_text: impl Into<String>,
    ) -> Result<()> {
        self.composer
            .set_tag_filter(selected_tag_ids, mode, query_text.into())
            .await
    }

    /// Replace the whole filter, including the collection selection
    pub async fn set_filter_spec(&self, spec: FilterSpec) -> Result<()> {
        self.composer.set_filter(spec).await
    }

    pub fn filter(&self) -> FilterSpec {
        self.composer.snapshot().filter
    }

    /// Current merged and filtered place list
    pub fn merged_and_filtered(&self) -> Arc<Vec<Place>> {
        self.composer.snapshot().places
    }

    pub fn statuses(&self) -> Vec<SourceStatus> {
        self.composer.snapshot().sources
    }

    pub fn snapshot(&self) -> MapSnapshot {
        self.composer.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<MapSnapshot> {
        self.composer.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<MapEvent> {
        self.event_bus.subscribe()
    }

    /// Follow: make a user's map available as a layer
    pub async fn register_source(&self, source_id: SourceId, display_name: impl Into<String>) -> Result<bool> {
        self.composer.register_source(source_id, display_name).await
    }

    /// Unfollow: drop the layer and its cached classification
    pub async fn forget_source(&self, source_id: SourceId) -> Result<()> {
        self.composer.forget_source(source_id).await
    }

    /// Drop followed sources and every cached classification
    pub async fn logout(&self) -> Result<()> {
        self.composer.reset().await
    }

    pub fn classification_cache(&self) -> &Arc<ClassificationCache> {
        &self.cache
    }

    /// Metadata requests issued during this session
    pub fn metadata_requests(&self) -> u64 {
        self.classifier.metadata_requests()
    }

    pub fn is_closed(&self) -> bool {
        self.composer.is_closed() || self.shutdown.is_cancelled()
    }

    /// Stop background tasks and wait for them to exit
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for task in self.tasks {
            let _ = task.await;
        }
        info!("Map session stopped");
    }
}
