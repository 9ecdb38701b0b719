//! Scripted backend for session tests
//!
//! `ScriptedApi` serves per-source metadata and place lists from memory,
//! counts calls per source, and can hold bounding-box requests on a gate
//! until the test releases them.

#![allow(dead_code)]

use placemap_common::config::LoaderSettings;
use placemap_common::events::EventBus;
use placemap_common::model::SourceMetadata;
use placemap_common::{BoundingBox, SourceId};
use placemap_layers::api::{ApiError, EagerPlace, PagedPlace, PlaceApi};
use placemap_layers::{MapSession, MapSnapshot};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Requests served per source
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CallCounts {
    pub metadata: usize,
    pub all_places: usize,
    pub in_bounds: usize,
}

impl CallCounts {
    pub fn total(&self) -> usize {
        self.metadata + self.all_places + self.in_bounds
    }
}

#[derive(Debug, Default, Clone)]
struct Script {
    metadata: SourceMetadata,
    eager: Vec<EagerPlace>,
    paged: Vec<PagedPlace>,
    fail_metadata: bool,
    fail_loads: bool,
}

#[derive(Default)]
struct Inner {
    scripts: HashMap<SourceId, Script>,
    calls: HashMap<SourceId, CallCounts>,
    bounds_gates: VecDeque<oneshot::Receiver<()>>,
}

#[derive(Default)]
pub struct ScriptedApi {
    inner: Mutex<Inner>,
}

impl ScriptedApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Small source served by the full listing
    pub fn add_eager(&self, source_id: SourceId, places: Vec<EagerPlace>) {
        let mut inner = self.inner.lock().unwrap();
        inner.scripts.insert(
            source_id,
            Script {
                metadata: SourceMetadata {
                    total_place_count: places.len() as u64,
                    ..SourceMetadata::default()
                },
                eager: places,
                ..Script::default()
            },
        );
    }

    /// Large source served by bounding box; `total` is what the summary reports
    pub fn add_paged(&self, source_id: SourceId, total: u64, places: Vec<PagedPlace>) {
        let mut inner = self.inner.lock().unwrap();
        inner.scripts.insert(
            source_id,
            Script {
                metadata: SourceMetadata {
                    total_place_count: total,
                    ..SourceMetadata::default()
                },
                paged: places,
                ..Script::default()
            },
        );
    }

    pub fn set_metadata(&self, source_id: SourceId, metadata: SourceMetadata) {
        let mut inner = self.inner.lock().unwrap();
        inner.scripts.entry(source_id).or_default().metadata = metadata;
    }

    pub fn fail_metadata(&self, source_id: SourceId, fail: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.scripts.entry(source_id).or_default().fail_metadata = fail;
    }

    pub fn fail_loads(&self, source_id: SourceId, fail: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.scripts.entry(source_id).or_default().fail_loads = fail;
    }

    /// Hold the next bounding-box request until the returned sender fires
    ///
    /// Gates are taken in request order.
    pub fn gate_bounds(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.inner.lock().unwrap().bounds_gates.push_back(rx);
        tx
    }

    pub fn calls(&self, source_id: SourceId) -> CallCounts {
        let inner = self.inner.lock().unwrap();
        inner.calls.get(&source_id).copied().unwrap_or_default()
    }

    fn script(&self, source_id: &SourceId, count: impl FnOnce(&mut CallCounts)) -> Result<Script, ApiError> {
        let mut inner = self.inner.lock().unwrap();
        count(inner.calls.entry(*source_id).or_default());
        inner
            .scripts
            .get(source_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(source_id.to_string()))
    }
}

#[async_trait::async_trait]
impl PlaceApi for ScriptedApi {
    async fn source_metadata(&self, source_id: &SourceId) -> Result<SourceMetadata, ApiError> {
        let script = self.script(source_id, |c| c.metadata += 1)?;
        if script.fail_metadata {
            return Err(ApiError::Network("connection refused".to_string()));
        }
        Ok(script.metadata)
    }

    async fn all_places(&self, source_id: &SourceId) -> Result<Vec<EagerPlace>, ApiError> {
        let script = self.script(source_id, |c| c.all_places += 1)?;
        if script.fail_loads {
            return Err(ApiError::Status(503, "unavailable".to_string()));
        }
        Ok(script.eager)
    }

    async fn places_in_bounds(
        &self,
        source_id: &SourceId,
        bbox: &BoundingBox,
        limit: usize,
    ) -> Result<Vec<PagedPlace>, ApiError> {
        let script = self.script(source_id, |c| c.in_bounds += 1)?;
        let gate = self.inner.lock().unwrap().bounds_gates.pop_front();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if script.fail_loads {
            return Err(ApiError::Status(503, "unavailable".to_string()));
        }
        Ok(script
            .paged
            .into_iter()
            .filter(|p| bbox.contains(p.latitude, p.longitude))
            .take(limit)
            .collect())
    }
}

pub fn eager_places(n: usize, latitude: f64, longitude: f64) -> Vec<EagerPlace> {
    (0..n)
        .map(|i| EagerPlace {
            id: Uuid::new_v4(),
            name: format!("Eager {}", i),
            address: format!("{} Main St", i),
            latitude,
            longitude,
            category: "cafe".to_string(),
            notes: String::new(),
            tags: vec![],
            lists: vec![],
        })
        .collect()
}

pub fn paged_places(n: usize, latitude: f64, longitude: f64) -> Vec<PagedPlace> {
    (0..n)
        .map(|i| PagedPlace {
            id: Uuid::new_v4(),
            name: format!("Paged {}", i),
            address: String::new(),
            latitude,
            longitude,
            category: "restaurant".to_string(),
            tag_names: vec![],
            list_ids: vec![],
        })
        .collect()
}

pub fn start_session(api: Arc<ScriptedApi>) -> MapSession {
    MapSession::start(
        api,
        &LoaderSettings::default(),
        EventBus::new(256),
        CancellationToken::new(),
    )
}

/// Wait until the published snapshot satisfies `pred`
///
/// Panics after ten (virtual) seconds.
pub async fn wait_for<F>(session: &MapSession, mut pred: F) -> MapSnapshot
where
    F: FnMut(&MapSnapshot) -> bool,
{
    let mut rx = session.subscribe();
    let result = tokio::time::timeout(Duration::from_secs(10), rx.wait_for(|s| pred(s))).await;
    match result {
        Ok(Ok(snapshot)) => MapSnapshot::clone(&snapshot),
        Ok(Err(_)) => panic!("map session closed while waiting"),
        Err(_) => panic!("timed out waiting; sources: {:?}", session.statuses()),
    }
}

/// Let spawned work and timers run
pub async fn settle(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}
