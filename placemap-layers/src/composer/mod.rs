//! Layer Composer
//!
//! One tokio task owns the [`LayerBook`] and applies every transition in
//! arrival order from a single command queue. UI operations and network
//! completions share that queue, so per-source state is never mutated
//! concurrently. Classification and load requests run as their own tasks
//! (concurrently across sources) and post their result back tagged with
//! the generation they were issued under.
//!
//! After each command the merged collection is recomposed from scratch if
//! anything it depends on changed, filtered, and published as a new
//! [`MapSnapshot`] on a watch channel.

mod state;

pub use state::{Effect, LayerBook, SourceEntry, ME_DISPLAY_NAME};

use chrono::Utc;
use placemap_common::events::{EventBus, MapEvent, SourceStatus};
use placemap_common::model::SourceMetadata;
use placemap_common::{BoundingBox, Place, SourceId};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::classifier::{SourceClassifier, SourceProfile};
use crate::error::{LayerError, Result};
use crate::filter::{filter_places, FilterSpec, TagCatalog, TagMatchMode};
use crate::loader::PlaceSourceLoader;

/// Published composition state
#[derive(Debug, Clone, Default)]
pub struct MapSnapshot {
    /// Incremented on every recomposition
    pub revision: u64,
    pub viewport: Option<BoundingBox>,
    pub filter: FilterSpec,
    /// Every active source's places, before filtering
    pub merged: Arc<Vec<Place>>,
    /// Merged collection after the filter stage
    pub places: Arc<Vec<Place>>,
    pub sources: Vec<SourceStatus>,
    /// Responses rejected as stale so far
    pub discarded_responses: u64,
}

impl MapSnapshot {
    pub fn merged_count(&self) -> usize {
        self.merged.len()
    }

    pub fn visible_count(&self) -> usize {
        self.places.len()
    }

    pub fn source(&self, source_id: &SourceId) -> Option<&SourceStatus> {
        self.sources.iter().find(|s| s.source_id == *source_id)
    }

    /// True when no source has a request outstanding
    pub fn is_settled(&self) -> bool {
        self.sources.iter().all(|s| !s.is_loading)
    }
}

enum Command {
    Register {
        source_id: SourceId,
        display_name: String,
        reply: oneshot::Sender<bool>,
    },
    Forget {
        source_id: SourceId,
        reply: oneshot::Sender<Result<()>>,
    },
    Activate {
        source_id: SourceId,
        reply: oneshot::Sender<Result<()>>,
    },
    Deactivate {
        source_id: SourceId,
        reply: oneshot::Sender<Result<bool>>,
    },
    ViewportChanged(BoundingBox),
    SetFilter {
        spec: FilterSpec,
        reply: oneshot::Sender<()>,
    },
    /// Tag and text selection; the collection selection is kept
    SetTagFilter {
        tag_ids: Vec<Uuid>,
        mode: TagMatchMode,
        query: String,
        reply: oneshot::Sender<()>,
    },
    Reset {
        reply: oneshot::Sender<()>,
    },
    Classified {
        source_id: SourceId,
        generation: u64,
        result: Result<SourceProfile>,
    },
    Loaded {
        source_id: SourceId,
        generation: u64,
        result: Result<Vec<Place>>,
    },
}

/// Composer task state
pub struct LayerComposer {
    book: LayerBook,
    filter: FilterSpec,
    filter_dirty: bool,
    revision: u64,
    classifier: Arc<SourceClassifier>,
    loader: Arc<PlaceSourceLoader>,
    paged_limit: usize,
    event_bus: EventBus,
    snapshot_tx: watch::Sender<MapSnapshot>,
    completions: mpsc::WeakUnboundedSender<Command>,
}

impl LayerComposer {
    /// Start the composer task
    ///
    /// The task runs until `shutdown` is cancelled or every
    /// [`ComposerHandle`] is dropped and no request is outstanding.
    pub fn spawn(
        classifier: Arc<SourceClassifier>,
        loader: Arc<PlaceSourceLoader>,
        paged_limit: usize,
        event_bus: EventBus,
        shutdown: CancellationToken,
    ) -> (ComposerHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let book = LayerBook::new();

        let initial = MapSnapshot {
            sources: book.statuses(),
            ..MapSnapshot::default()
        };
        let (snapshot_tx, snapshot_rx) = watch::channel(initial);

        let composer = Self {
            book,
            filter: FilterSpec::default(),
            filter_dirty: false,
            revision: 0,
            classifier,
            loader,
            paged_limit,
            event_bus,
            snapshot_tx,
            completions: command_tx.downgrade(),
        };

        let task = tokio::spawn(composer.run(command_rx, shutdown));
        let handle = ComposerHandle {
            command_tx,
            snapshot_rx,
        };
        (handle, task)
    }

    async fn run(mut self, mut command_rx: mpsc::UnboundedReceiver<Command>, shutdown: CancellationToken) {
        info!("Layer composer started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Layer composer shutting down");
                    break;
                }

                command = command_rx.recv() => {
                    let Some(command) = command else {
                        debug!("Command queue closed, layer composer exiting");
                        break;
                    };
                    self.handle(command);
                    self.flush();
                }
            }
        }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Register {
                source_id,
                display_name,
                reply,
            } => {
                let added = self.book.register(source_id, display_name);
                if added {
                    info!(source_id = %source_id, "Source registered");
                }
                self.flush();
                let _ = reply.send(added);
            }

            Command::Forget { source_id, reply } => {
                let result = self.book.forget(&source_id);
                if result.is_ok() {
                    self.classifier.cache().forget(&source_id);
                    info!(source_id = %source_id, "Source forgotten");
                    self.event_bus.emit_lossy(MapEvent::SourceForgotten {
                        source_id,
                        timestamp: Utc::now(),
                    });
                }
                self.flush();
                let _ = reply.send(result);
            }

            Command::Activate { source_id, reply } => {
                let result = self.book.activate(&source_id).map(|effects| {
                    debug!(source_id = %source_id, requests = effects.len(), "Source activated");
                    self.dispatch(effects);
                });
                self.flush();
                let _ = reply.send(result);
            }

            Command::Deactivate { source_id, reply } => {
                let result = self.book.deactivate(&source_id);
                if let Ok(true) = result {
                    debug!(source_id = %source_id, "Source deactivated");
                }
                self.flush();
                let _ = reply.send(result);
            }

            Command::ViewportChanged(bbox) => {
                let effects = self.book.viewport_changed(bbox);
                debug!(?bbox, reloads = effects.len(), "Viewport changed");
                self.dispatch(effects);
                self.event_bus.emit_lossy(MapEvent::ViewportSettled {
                    bbox,
                    timestamp: Utc::now(),
                });
            }

            Command::SetFilter { spec, reply } => {
                self.replace_filter(spec);
                self.flush();
                let _ = reply.send(());
            }

            Command::SetTagFilter {
                tag_ids,
                mode,
                query,
                reply,
            } => {
                let spec = FilterSpec::new(tag_ids, mode, query)
                    .with_collections(self.filter.collection_ids.clone());
                self.replace_filter(spec);
                self.flush();
                let _ = reply.send(());
            }

            Command::Reset { reply } => {
                self.book.reset();
                self.classifier.cache().clear();
                info!("Map session reset");
                self.event_bus.emit_lossy(MapEvent::SessionReset {
                    timestamp: Utc::now(),
                });
                self.flush();
                let _ = reply.send(());
            }

            Command::Classified {
                source_id,
                generation,
                result,
            } => match self.book.classified(&source_id, generation, result) {
                Ok(effects) => self.dispatch(effects),
                Err(e) => {
                    debug!(source_id = %source_id, generation, reason = %e, "Discarded classification response");
                    self.record_discard();
                }
            },

            Command::Loaded {
                source_id,
                generation,
                result,
            } => {
                if let Err(e) = self.book.loaded(&source_id, generation, result) {
                    debug!(source_id = %source_id, generation, reason = %e, "Discarded load response");
                    self.record_discard();
                }
            }
        }
    }

    fn replace_filter(&mut self, spec: FilterSpec) {
        if spec != self.filter {
            self.filter = spec;
            self.filter_dirty = true;
        }
    }

    /// Discards do not change composition; only the counter is republished
    fn record_discard(&self) {
        let discarded = self.book.stale_discarded();
        self.snapshot_tx
            .send_modify(|snapshot| snapshot.discarded_responses = discarded);
    }

    /// Issue requests; each posts its completion back to the queue
    fn dispatch(&self, effects: Vec<Effect>) {
        for effect in effects {
            let Some(completions) = self.completions.upgrade() else {
                warn!("Command queue closed, request not issued");
                return;
            };
            let source_id = effect.source_id();
            let generation = effect.generation();

            match effect {
                Effect::Classify { .. } => {
                    let classifier = Arc::clone(&self.classifier);
                    tokio::spawn(async move {
                        let result = classifier.classify(&source_id).await;
                        let _ = completions.send(Command::Classified {
                            source_id,
                            generation,
                            result,
                        });
                    });
                }
                Effect::LoadEager { profile, .. } => {
                    let loader = Arc::clone(&self.loader);
                    tokio::spawn(async move {
                        let result = loader.load_eager(&profile).await;
                        let _ = completions.send(Command::Loaded {
                            source_id,
                            generation,
                            result,
                        });
                    });
                }
                Effect::LoadPaged { profile, bbox, .. } => {
                    let loader = Arc::clone(&self.loader);
                    let limit = self.paged_limit;
                    tokio::spawn(async move {
                        let result = loader.load_paged(&profile, Some(&bbox), limit).await;
                        let _ = completions.send(Command::Loaded {
                            source_id,
                            generation,
                            result,
                        });
                    });
                }
            }
        }
    }

    /// Emit status events and republish if composition inputs changed
    fn flush(&mut self) {
        for status in self.book.take_changed() {
            self.event_bus.emit_lossy(MapEvent::SourceStatusChanged {
                status,
                timestamp: Utc::now(),
            });
        }

        let book_dirty = self.book.take_dirty();
        let filter_dirty = std::mem::take(&mut self.filter_dirty);
        if !book_dirty && !filter_dirty {
            return;
        }

        let merged = self.book.compose();
        let catalogs: Vec<&SourceMetadata> = self
            .book
            .active_profiles()
            .into_iter()
            .map(|p| p.metadata.as_ref())
            .collect();
        let catalog = TagCatalog::build(&merged, &catalogs);
        let places = filter_places(&merged, &self.filter, &catalog);

        self.revision += 1;
        let snapshot = MapSnapshot {
            revision: self.revision,
            viewport: self.book.viewport(),
            filter: self.filter.clone(),
            merged: Arc::new(merged),
            places: Arc::new(places),
            sources: self.book.statuses(),
            discarded_responses: self.book.stale_discarded(),
        };

        debug!(
            revision = snapshot.revision,
            merged = snapshot.merged_count(),
            visible = snapshot.visible_count(),
            "Recomposed merged collection"
        );

        self.event_bus.emit_lossy(MapEvent::CollectionRecomposed {
            revision: snapshot.revision,
            merged_count: snapshot.merged_count(),
            visible_count: snapshot.visible_count(),
            timestamp: Utc::now(),
        });
        self.snapshot_tx.send_replace(snapshot);
    }
}

/// Cloneable handle for driving the composer
#[derive(Clone)]
pub struct ComposerHandle {
    command_tx: mpsc::UnboundedSender<Command>,
    snapshot_rx: watch::Receiver<MapSnapshot>,
}

impl ComposerHandle {
    fn send(&self, command: Command) -> Result<()> {
        self.command_tx
            .send(command)
            .map_err(|_| LayerError::SessionClosed)
    }

    async fn request<T>(&self, command: Command, reply_rx: oneshot::Receiver<T>) -> Result<T> {
        self.send(command)?;
        reply_rx.await.map_err(|_| LayerError::SessionClosed)
    }

    /// Register a source; returns true if it was not registered before
    pub async fn register_source(&self, source_id: SourceId, display_name: impl Into<String>) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        let command = Command::Register {
            source_id,
            display_name: display_name.into(),
            reply,
        };
        self.request(command, rx).await
    }

    pub async fn forget_source(&self, source_id: SourceId) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Forget { source_id, reply }, rx).await?
    }

    /// Select a source; loading continues in the background
    pub async fn activate(&self, source_id: SourceId) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Activate { source_id, reply }, rx).await?
    }

    /// Deselect a source; returns false if it was not active
    pub async fn deactivate(&self, source_id: SourceId) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Deactivate { source_id, reply }, rx).await?
    }

    /// Deliver a settled viewport
    pub fn viewport_changed(&self, bbox: BoundingBox) -> Result<()> {
        self.send(Command::ViewportChanged(bbox))
    }

    /// Replace the filter; the snapshot is republished before this returns
    pub async fn set_filter(&self, spec: FilterSpec) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::SetFilter { spec, reply }, rx).await
    }

    /// Replace tags, mode and query, keeping the current collection selection
    pub async fn set_tag_filter(
        &self,
        tag_ids: Vec<Uuid>,
        mode: TagMatchMode,
        query: String,
    ) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        let command = Command::SetTagFilter {
            tag_ids,
            mode,
            query,
            reply,
        };
        self.request(command, rx).await
    }

    pub async fn reset(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Reset { reply }, rx).await
    }

    pub fn subscribe(&self) -> watch::Receiver<MapSnapshot> {
        self.snapshot_rx.clone()
    }

    pub fn snapshot(&self) -> MapSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.command_tx.is_closed()
    }
}
