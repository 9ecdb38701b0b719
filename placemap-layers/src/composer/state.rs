//! Per-source layer state
//!
//! [`LayerBook`] owns the state map the composer task mutates. It performs
//! no I/O: each transition returns the [`Effect`]s (network requests) the
//! caller must issue, tagged with the generation the response has to match.
//!
//! Generation rules:
//! - every issued request bumps the source's generation
//! - deactivation, reset and forget bump it too, so in-flight responses for
//!   a source nobody is looking at anymore are rejected
//! - a completion is applied only if its generation equals the current one
//! - a re-registered source resumes above every generation a dropped entry
//!   ever issued, so pre-forget responses cannot match its new requests

use placemap_common::events::{SourcePhase, SourceStatus};
use placemap_common::{BoundingBox, Classification, Place, SourceId};
use std::sync::Arc;
use tracing::debug;

use crate::classifier::SourceProfile;
use crate::error::{LayerError, Result};

/// Display name used for the signed-in user's own layer
pub const ME_DISPLAY_NAME: &str = "My places";

/// Network request the composer must issue after a transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Classify {
        source_id: SourceId,
        generation: u64,
    },
    LoadEager {
        profile: SourceProfile,
        generation: u64,
    },
    LoadPaged {
        profile: SourceProfile,
        bbox: BoundingBox,
        generation: u64,
    },
}

impl Effect {
    pub fn source_id(&self) -> SourceId {
        match self {
            Effect::Classify { source_id, .. } => *source_id,
            Effect::LoadEager { profile, .. } | Effect::LoadPaged { profile, .. } => {
                profile.source_id
            }
        }
    }

    pub fn generation(&self) -> u64 {
        match self {
            Effect::Classify { generation, .. }
            | Effect::LoadEager { generation, .. }
            | Effect::LoadPaged { generation, .. } => *generation,
        }
    }
}

/// State of one registered source
#[derive(Debug, Clone)]
pub struct SourceEntry {
    pub source_id: SourceId,
    pub display_name: String,
    pub phase: SourcePhase,
    /// Set once classification succeeded; `None` means Unclassified
    pub profile: Option<SourceProfile>,
    /// Most recent successfully loaded place list
    pub places: Arc<Vec<Place>>,
    pub generation: u64,
    pub last_error: Option<String>,
}

impl SourceEntry {
    fn new(source_id: SourceId, display_name: String, generation: u64) -> Self {
        Self {
            source_id,
            display_name,
            phase: SourcePhase::Inactive,
            profile: None,
            places: Arc::new(Vec::new()),
            generation,
            last_error: None,
        }
    }

    pub fn classification(&self) -> Classification {
        self.profile
            .as_ref()
            .map_or(Classification::Unclassified, |p| p.classification)
    }

    pub fn status(&self) -> SourceStatus {
        SourceStatus {
            source_id: self.source_id,
            display_name: self.display_name.clone(),
            classification: self.classification(),
            total_place_count: self.profile.as_ref().map(SourceProfile::total_place_count),
            phase: self.phase,
            is_loading: self.phase.is_loading(),
            has_error: self.phase == SourcePhase::Failed,
            place_count: self.places.len(),
            last_error: self.last_error.clone(),
        }
    }

    fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    fn load_effect(&mut self, profile: SourceProfile, viewport: Option<BoundingBox>) -> Option<Effect> {
        match profile.classification {
            Classification::Eager => Some(Effect::LoadEager {
                profile,
                generation: self.next_generation(),
            }),
            Classification::Paged => viewport.map(|bbox| Effect::LoadPaged {
                profile,
                bbox,
                generation: self.next_generation(),
            }),
            Classification::Unclassified => None,
        }
    }

    fn loaded_phase(&self) -> SourcePhase {
        match self.classification() {
            Classification::Paged => SourcePhase::PagedLoaded,
            _ => SourcePhase::EagerLoaded,
        }
    }
}

/// Per-source state map, in registration order
#[derive(Debug)]
pub struct LayerBook {
    entries: Vec<SourceEntry>,
    viewport: Option<BoundingBox>,
    /// Composition inputs changed since the last `take_dirty`
    dirty: bool,
    changed: Vec<SourceId>,
    stale_discarded: u64,
    /// Highest generation held by any dropped entry
    retired_generation: u64,
}

impl Default for LayerBook {
    fn default() -> Self {
        Self::new()
    }
}

impl LayerBook {
    /// New book with only the signed-in user's layer registered
    pub fn new() -> Self {
        Self {
            entries: vec![SourceEntry::new(SourceId::Me, ME_DISPLAY_NAME.to_string(), 0)],
            viewport: None,
            dirty: false,
            changed: Vec::new(),
            stale_discarded: 0,
            retired_generation: 0,
        }
    }

    pub fn viewport(&self) -> Option<BoundingBox> {
        self.viewport
    }

    pub fn entry(&self, source_id: &SourceId) -> Option<&SourceEntry> {
        self.entries.iter().find(|e| e.source_id == *source_id)
    }

    pub fn entries(&self) -> &[SourceEntry] {
        &self.entries
    }

    /// Responses rejected by the generation check so far
    pub fn stale_discarded(&self) -> u64 {
        self.stale_discarded
    }

    fn entry_mut(&mut self, source_id: &SourceId) -> Result<&mut SourceEntry> {
        self.entries
            .iter_mut()
            .find(|e| e.source_id == *source_id)
            .ok_or(LayerError::UnknownSource(*source_id))
    }

    fn touch(&mut self, source_id: SourceId) {
        self.dirty = true;
        if !self.changed.contains(&source_id) {
            self.changed.push(source_id);
        }
    }

    /// Register a source, or rename it if already registered
    ///
    /// Returns true when the source is new.
    pub fn register(&mut self, source_id: SourceId, display_name: impl Into<String>) -> bool {
        let display_name = display_name.into();
        if let Ok(entry) = self.entry_mut(&source_id) {
            if entry.display_name != display_name {
                entry.display_name = display_name;
                self.touch(source_id);
            }
            return false;
        }

        self.entries
            .push(SourceEntry::new(source_id, display_name, self.retired_generation));
        self.touch(source_id);
        true
    }

    /// Drop a followed source entirely
    pub fn forget(&mut self, source_id: &SourceId) -> Result<()> {
        if *source_id == SourceId::Me {
            return Err(LayerError::PinnedSource(*source_id));
        }
        let index = self
            .entries
            .iter()
            .position(|e| e.source_id == *source_id)
            .ok_or(LayerError::UnknownSource(*source_id))?;

        let entry = self.entries.remove(index);
        self.retired_generation = self.retired_generation.max(entry.generation);
        self.changed.retain(|id| id != source_id);
        self.dirty = true;
        Ok(())
    }

    /// Select a source
    ///
    /// - Inactive, or Failed before classification: classify again
    /// - Failed after classification: retry the load
    /// - any other phase: already active, nothing to do
    pub fn activate(&mut self, source_id: &SourceId) -> Result<Vec<Effect>> {
        let viewport = self.viewport;
        let entry = self.entry_mut(source_id)?;

        let effect = match (entry.phase, entry.profile.clone()) {
            (SourcePhase::Inactive, _) | (SourcePhase::Failed, None) => {
                entry.phase = SourcePhase::Classifying;
                Some(Effect::Classify {
                    source_id: *source_id,
                    generation: entry.next_generation(),
                })
            }
            (SourcePhase::Failed, Some(profile)) => match entry.load_effect(profile, viewport) {
                Some(effect) => {
                    entry.phase = SourcePhase::Reloading;
                    Some(effect)
                }
                None => {
                    // Paged with no viewport yet: settle empty
                    entry.phase = SourcePhase::PagedLoaded;
                    entry.last_error = None;
                    None
                }
            },
            _ => return Ok(Vec::new()),
        };

        self.touch(*source_id);
        Ok(effect.into_iter().collect())
    }

    /// Deselect a source; its places leave the next composition
    ///
    /// Returns false when the source was already inactive.
    pub fn deactivate(&mut self, source_id: &SourceId) -> Result<bool> {
        let entry = self.entry_mut(source_id)?;
        if entry.phase == SourcePhase::Inactive {
            return Ok(false);
        }

        entry.phase = SourcePhase::Inactive;
        entry.next_generation();
        entry.places = Arc::new(Vec::new());
        entry.last_error = None;

        self.touch(*source_id);
        Ok(true)
    }

    fn check_current(&mut self, source_id: &SourceId, generation: u64) -> Result<()> {
        let Some((current, active)) = self
            .entry(source_id)
            .map(|entry| (entry.generation, entry.phase.is_active()))
        else {
            self.stale_discarded += 1;
            return Err(LayerError::UnknownSource(*source_id));
        };

        // Inactive means deactivated since the request was issued
        if !active || generation != current {
            self.stale_discarded += 1;
            return Err(LayerError::StaleResponse {
                source_id: *source_id,
                generation,
                current,
            });
        }
        Ok(())
    }

    /// Apply a classification result
    pub fn classified(
        &mut self,
        source_id: &SourceId,
        generation: u64,
        result: Result<SourceProfile>,
    ) -> Result<Vec<Effect>> {
        self.check_current(source_id, generation)?;
        let viewport = self.viewport;
        let entry = self.entry_mut(source_id)?;

        let effect = match result {
            Ok(profile) => {
                entry.profile = Some(profile.clone());
                let effect = entry.load_effect(profile, viewport);
                if effect.is_none() {
                    entry.phase = SourcePhase::PagedLoaded;
                    entry.places = Arc::new(Vec::new());
                    entry.last_error = None;
                }
                effect
            }
            Err(e) => {
                entry.phase = SourcePhase::Failed;
                entry.profile = None;
                entry.last_error = Some(e.to_string());
                None
            }
        };

        self.touch(*source_id);
        Ok(effect.into_iter().collect())
    }

    /// Apply a load result; the place list is replaced wholesale on success
    /// and retained on failure
    pub fn loaded(
        &mut self,
        source_id: &SourceId,
        generation: u64,
        result: Result<Vec<Place>>,
    ) -> Result<()> {
        self.check_current(source_id, generation)?;
        let entry = self.entry_mut(source_id)?;

        match result {
            Ok(places) => {
                entry.places = Arc::new(places);
                entry.phase = entry.loaded_phase();
                entry.last_error = None;
            }
            Err(e) => {
                entry.phase = SourcePhase::Failed;
                entry.last_error = Some(e.to_string());
            }
        }

        self.touch(*source_id);
        Ok(())
    }

    /// Record a settled viewport and reload what depends on it
    ///
    /// Paged sources reload into the new box. Eager sources ignore the
    /// event unless their last load failed, in which case it is retried.
    /// Sources that never classified are only retried by activation.
    pub fn viewport_changed(&mut self, bbox: BoundingBox) -> Vec<Effect> {
        self.viewport = Some(bbox);
        self.dirty = true;

        let mut effects = Vec::new();
        let mut touched = Vec::new();

        for entry in &mut self.entries {
            let Some(profile) = entry.profile.clone() else {
                continue;
            };
            let reload = match (entry.phase, profile.classification) {
                (SourcePhase::Inactive, _) => false,
                (_, Classification::Paged) => true,
                (SourcePhase::Failed, Classification::Eager) => true,
                _ => false,
            };
            if !reload {
                continue;
            }

            if let Some(effect) = entry.load_effect(profile, Some(bbox)) {
                // First load after classification stays in Classifying
                if entry.phase != SourcePhase::Classifying {
                    entry.phase = SourcePhase::Reloading;
                }
                debug!(
                    source_id = %entry.source_id,
                    generation = entry.generation,
                    "Reload issued for viewport change"
                );
                effects.push(effect);
                touched.push(entry.source_id);
            }
        }

        for source_id in touched {
            self.touch(source_id);
        }
        effects
    }

    /// Logout: drop followed sources and return `Me` to Inactive
    ///
    /// The viewport is kept; it describes the map, not the account.
    pub fn reset(&mut self) {
        let retired = self
            .entries
            .iter()
            .filter(|e| e.source_id != SourceId::Me)
            .map(|e| e.generation)
            .max()
            .unwrap_or(0);
        self.retired_generation = self.retired_generation.max(retired);

        self.entries.retain(|e| e.source_id == SourceId::Me);
        if self.entries.is_empty() {
            self.entries.push(SourceEntry::new(
                SourceId::Me,
                ME_DISPLAY_NAME.to_string(),
                self.retired_generation,
            ));
        }
        for entry in &mut self.entries {
            entry.phase = SourcePhase::Inactive;
            entry.profile = None;
            entry.places = Arc::new(Vec::new());
            entry.last_error = None;
            entry.next_generation();
        }
        self.changed.clear();
        self.touch(SourceId::Me);
    }

    /// Merged collection: every active source's current list, concatenated
    /// in registration order
    pub fn compose(&self) -> Vec<Place> {
        let total = self
            .entries
            .iter()
            .filter(|e| e.phase.is_active())
            .map(|e| e.places.len())
            .sum();

        let mut merged = Vec::with_capacity(total);
        for entry in self.entries.iter().filter(|e| e.phase.is_active()) {
            merged.extend(entry.places.iter().cloned());
        }
        merged
    }

    /// Metadata of every active, classified source
    pub fn active_profiles(&self) -> Vec<&SourceProfile> {
        self.entries
            .iter()
            .filter(|e| e.phase.is_active())
            .filter_map(|e| e.profile.as_ref())
            .collect()
    }

    pub fn statuses(&self) -> Vec<SourceStatus> {
        self.entries.iter().map(SourceEntry::status).collect()
    }

    /// True (once) if anything affecting composition changed
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Statuses of sources touched since the last call
    pub fn take_changed(&mut self) -> Vec<SourceStatus> {
        let changed = std::mem::take(&mut self.changed);
        changed
            .iter()
            .filter_map(|id| self.entry(id))
            .map(SourceEntry::status)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use placemap_common::model::SourceMetadata;
    use uuid::Uuid;

    fn profile(source_id: SourceId, classification: Classification, total: u64) -> SourceProfile {
        SourceProfile {
            source_id,
            classification,
            metadata: Arc::new(SourceMetadata {
                total_place_count: total,
                ..SourceMetadata::default()
            }),
        }
    }

    fn places(owner: SourceId, n: usize) -> Vec<Place> {
        (0..n)
            .map(|i| Place {
                id: Uuid::new_v4(),
                owner,
                name: format!("place {}", i),
                address: String::new(),
                latitude: 0.0,
                longitude: 0.0,
                category: String::new(),
                notes: String::new(),
                tags: vec![],
                collections: vec![],
            })
            .collect()
    }

    fn bbox(lat: f64) -> BoundingBox {
        BoundingBox::from_region(lat, 0.0, 1.0, 1.0)
    }

    fn only(effects: Vec<Effect>) -> Effect {
        assert_eq!(effects.len(), 1, "expected one effect, got {:?}", effects);
        effects.into_iter().next().unwrap()
    }

    #[test]
    fn test_new_book_has_inactive_me() {
        let book = LayerBook::new();
        let statuses = book.statuses();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].source_id, SourceId::Me);
        assert_eq!(statuses[0].phase, SourcePhase::Inactive);
        assert_eq!(statuses[0].classification, Classification::Unclassified);
    }

    #[test]
    fn test_eager_activation_flow() {
        let mut book = LayerBook::new();
        let me = SourceId::Me;

        let classify = only(book.activate(&me).unwrap());
        assert!(matches!(classify, Effect::Classify { .. }));
        assert_eq!(book.entry(&me).unwrap().phase, SourcePhase::Classifying);

        let load = only(
            book.classified(&me, classify.generation(), Ok(profile(me, Classification::Eager, 40)))
                .unwrap(),
        );
        assert!(matches!(load, Effect::LoadEager { .. }));
        assert_eq!(book.entry(&me).unwrap().phase, SourcePhase::Classifying);

        book.loaded(&me, load.generation(), Ok(places(me, 40))).unwrap();
        let status = &book.statuses()[0];
        assert_eq!(status.phase, SourcePhase::EagerLoaded);
        assert_eq!(status.place_count, 40);
        assert_eq!(status.total_place_count, Some(40));
        assert_eq!(book.compose().len(), 40);
    }

    #[test]
    fn test_paged_without_viewport_settles_empty() {
        let mut book = LayerBook::new();
        let user = SourceId::User(Uuid::new_v4());
        book.register(user, "Ana");

        let classify = only(book.activate(&user).unwrap());
        let effects = book
            .classified(&user, classify.generation(), Ok(profile(user, Classification::Paged, 5000)))
            .unwrap();

        assert!(effects.is_empty());
        assert_eq!(book.entry(&user).unwrap().phase, SourcePhase::PagedLoaded);
        assert!(book.compose().is_empty());

        let load = only(book.viewport_changed(bbox(0.0)));
        assert!(matches!(load, Effect::LoadPaged { .. }));
        assert_eq!(book.entry(&user).unwrap().phase, SourcePhase::Reloading);
    }

    #[test]
    fn test_out_of_order_paged_responses() {
        let mut book = LayerBook::new();
        let user = SourceId::User(Uuid::new_v4());
        book.register(user, "Ana");
        book.viewport_changed(bbox(0.0));

        let classify = only(book.activate(&user).unwrap());
        let first = only(
            book.classified(&user, classify.generation(), Ok(profile(user, Classification::Paged, 5000)))
                .unwrap(),
        );
        let second = only(book.viewport_changed(bbox(10.0)));
        assert!(second.generation() > first.generation());

        // Newer response lands first
        book.loaded(&user, second.generation(), Ok(places(user, 2))).unwrap();
        assert_eq!(book.compose().len(), 2);

        // Older response arrives late and is discarded
        let err = book
            .loaded(&user, first.generation(), Ok(places(user, 7)))
            .unwrap_err();
        assert!(matches!(err, LayerError::StaleResponse { .. }));
        assert_eq!(book.compose().len(), 2);
        assert_eq!(book.stale_discarded(), 1);
    }

    #[test]
    fn test_stale_while_revalidate_keeps_places() {
        let mut book = LayerBook::new();
        let user = SourceId::User(Uuid::new_v4());
        book.register(user, "Ana");
        book.viewport_changed(bbox(0.0));

        let classify = only(book.activate(&user).unwrap());
        let load = only(
            book.classified(&user, classify.generation(), Ok(profile(user, Classification::Paged, 5000)))
                .unwrap(),
        );
        book.loaded(&user, load.generation(), Ok(places(user, 3))).unwrap();

        let reload = only(book.viewport_changed(bbox(5.0)));
        assert_eq!(book.entry(&user).unwrap().phase, SourcePhase::Reloading);
        assert_eq!(book.compose().len(), 3, "last-known list shown while reloading");

        book.loaded(
            &user,
            reload.generation(),
            Err(LayerError::Load {
                source_id: user,
                reason: "timeout".to_string(),
            }),
        )
        .unwrap();

        let status = book.entry(&user).unwrap().status();
        assert_eq!(status.phase, SourcePhase::Failed);
        assert!(status.has_error);
        assert_eq!(book.compose().len(), 3, "failure retains last-known list");

        // A later viewport change retries
        let retry = only(book.viewport_changed(bbox(6.0)));
        assert!(matches!(retry, Effect::LoadPaged { .. }));
    }

    #[test]
    fn test_eager_ignores_viewport_changes() {
        let mut book = LayerBook::new();
        let me = SourceId::Me;
        let classify = only(book.activate(&me).unwrap());
        let load = only(
            book.classified(&me, classify.generation(), Ok(profile(me, Classification::Eager, 40)))
                .unwrap(),
        );
        book.loaded(&me, load.generation(), Ok(places(me, 40))).unwrap();

        for i in 0..10 {
            assert!(book.viewport_changed(bbox(i as f64)).is_empty());
        }
        assert_eq!(book.entry(&me).unwrap().phase, SourcePhase::EagerLoaded);
    }

    #[test]
    fn test_deactivate_drops_places_and_rejects_inflight() {
        let mut book = LayerBook::new();
        let me = SourceId::Me;
        let classify = only(book.activate(&me).unwrap());
        let load = only(
            book.classified(&me, classify.generation(), Ok(profile(me, Classification::Eager, 3)))
                .unwrap(),
        );

        assert!(book.deactivate(&me).unwrap());
        assert!(book.compose().is_empty());

        let err = book.loaded(&me, load.generation(), Ok(places(me, 3))).unwrap_err();
        assert!(matches!(err, LayerError::StaleResponse { .. }));
        assert!(book.compose().is_empty());

        assert!(!book.deactivate(&me).unwrap(), "second deactivate is a no-op");
    }

    #[test]
    fn test_classification_failure_then_reactivation() {
        let mut book = LayerBook::new();
        let me = SourceId::Me;
        let classify = only(book.activate(&me).unwrap());

        let effects = book
            .classified(
                &me,
                classify.generation(),
                Err(LayerError::Classification {
                    source_id: me,
                    reason: "offline".to_string(),
                }),
            )
            .unwrap();
        assert!(effects.is_empty());

        let status = &book.statuses()[0];
        assert_eq!(status.phase, SourcePhase::Failed);
        assert_eq!(status.classification, Classification::Unclassified);
        assert!(book.compose().is_empty());

        // Viewport changes do not retry classification
        assert!(book.viewport_changed(bbox(1.0)).is_empty());

        let retry = only(book.activate(&me).unwrap());
        assert!(matches!(retry, Effect::Classify { .. }));
    }

    #[test]
    fn test_activate_is_noop_when_active() {
        let mut book = LayerBook::new();
        only(book.activate(&SourceId::Me).unwrap());
        assert!(book.activate(&SourceId::Me).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_and_pinned_sources() {
        let mut book = LayerBook::new();
        let stranger = SourceId::User(Uuid::new_v4());

        assert_eq!(
            book.activate(&stranger).unwrap_err(),
            LayerError::UnknownSource(stranger)
        );
        assert_eq!(
            book.forget(&SourceId::Me).unwrap_err(),
            LayerError::PinnedSource(SourceId::Me)
        );
    }

    #[test]
    fn test_compose_preserves_owners_and_registration_order() {
        let mut book = LayerBook::new();
        let me = SourceId::Me;
        let user = SourceId::User(Uuid::new_v4());
        book.register(user, "Ana");
        book.viewport_changed(bbox(0.0));

        let c1 = only(book.activate(&me).unwrap());
        let c2 = only(book.activate(&user).unwrap());
        let l2 = only(
            book.classified(&user, c2.generation(), Ok(profile(user, Classification::Paged, 5000)))
                .unwrap(),
        );
        let l1 = only(
            book.classified(&me, c1.generation(), Ok(profile(me, Classification::Eager, 3)))
                .unwrap(),
        );
        book.loaded(&user, l2.generation(), Ok(places(user, 2))).unwrap();
        book.loaded(&me, l1.generation(), Ok(places(me, 3))).unwrap();

        let merged = book.compose();
        assert_eq!(merged.len(), 5);
        assert!(merged[..3].iter().all(|p| p.owner == me));
        assert!(merged[3..].iter().all(|p| p.owner == user));
    }

    #[test]
    fn test_forget_and_reset() {
        let mut book = LayerBook::new();
        let user = SourceId::User(Uuid::new_v4());
        assert!(book.register(user, "Ana"));
        assert!(!book.register(user, "Ana B."));
        assert_eq!(book.entry(&user).unwrap().display_name, "Ana B.");

        let classify = only(book.activate(&user).unwrap());
        book.forget(&user).unwrap();
        let err = book
            .classified(&user, classify.generation(), Ok(profile(user, Classification::Eager, 1)))
            .unwrap_err();
        assert_eq!(err, LayerError::UnknownSource(user));

        book.register(user, "Ana");
        book.viewport_changed(bbox(3.0));
        only(book.activate(&SourceId::Me).unwrap());
        book.reset();

        assert_eq!(book.entries().len(), 1);
        assert_eq!(book.entries()[0].phase, SourcePhase::Inactive);
        assert_eq!(book.viewport(), Some(bbox(3.0)));
    }

    #[test]
    fn test_reregistered_source_rejects_pre_forget_responses() {
        let mut book = LayerBook::new();
        let user = SourceId::User(Uuid::new_v4());
        book.register(user, "Ana");

        let old_classify = only(book.activate(&user).unwrap());
        let old_load = only(
            book.classified(&user, old_classify.generation(), Ok(profile(user, Classification::Eager, 7)))
                .unwrap(),
        );
        book.forget(&user).unwrap();

        book.register(user, "Ana");
        let new_classify = only(book.activate(&user).unwrap());
        assert!(new_classify.generation() > old_load.generation());

        // Pre-forget classification resolving late is not applied
        assert!(book
            .classified(&user, old_classify.generation(), Ok(profile(user, Classification::Eager, 7)))
            .is_err());
        assert_eq!(book.entry(&user).unwrap().phase, SourcePhase::Classifying);

        let new_load = only(
            book.classified(&user, new_classify.generation(), Ok(profile(user, Classification::Eager, 3)))
                .unwrap(),
        );
        book.loaded(&user, new_load.generation(), Ok(places(user, 3))).unwrap();

        let err = book
            .loaded(&user, old_load.generation(), Ok(places(user, 7)))
            .unwrap_err();
        assert!(matches!(err, LayerError::StaleResponse { .. }));
        assert_eq!(book.compose().len(), 3);
        assert_eq!(book.stale_discarded(), 2);
    }

    #[test]
    fn test_reset_rejects_inflight_after_reactivation() {
        let mut book = LayerBook::new();
        let me = SourceId::Me;
        let user = SourceId::User(Uuid::new_v4());
        book.register(user, "Ana");

        let classify = only(book.activate(&me).unwrap());
        let old_load = only(
            book.classified(&me, classify.generation(), Ok(profile(me, Classification::Eager, 4)))
                .unwrap(),
        );
        let user_classify = only(book.activate(&user).unwrap());
        book.reset();

        let reclassify = only(book.activate(&me).unwrap());
        let new_load = only(
            book.classified(&me, reclassify.generation(), Ok(profile(me, Classification::Eager, 2)))
                .unwrap(),
        );
        book.loaded(&me, new_load.generation(), Ok(places(me, 2))).unwrap();

        assert!(book.loaded(&me, old_load.generation(), Ok(places(me, 4))).is_err());
        assert_eq!(book.compose().len(), 2);

        // A followed source dropped by logout and followed again starts fresh
        book.register(user, "Ana");
        let again = only(book.activate(&user).unwrap());
        assert!(again.generation() > user_classify.generation());
        assert!(book
            .classified(&user, user_classify.generation(), Ok(profile(user, Classification::Eager, 1)))
            .is_err());
    }

    #[test]
    fn test_take_dirty_and_changed() {
        let mut book = LayerBook::new();
        assert!(!book.take_dirty());

        book.activate(&SourceId::Me).unwrap();
        assert!(book.take_dirty());
        assert!(!book.take_dirty());

        let changed = book.take_changed();
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].phase, SourcePhase::Classifying);
        assert!(changed[0].is_loading);
        assert!(book.take_changed().is_empty());
    }
}
