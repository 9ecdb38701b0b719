//! Event types for the placemap event system
//!
//! Provides shared event definitions and the EventBus used by the map layer
//! core and the daemon's SSE stream.

mod layer_types;

pub use layer_types::{SourcePhase, SourceStatus};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::geo::BoundingBox;
use crate::model::SourceId;

/// Placemap event types
///
/// Events are broadcast via EventBus and can be serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MapEvent {
    /// A source's load phase or indicator flags changed
    ///
    /// Triggers:
    /// - SSE: Update layer toggle spinner / error badge
    SourceStatusChanged {
        status: SourceStatus,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The merged place collection was rebuilt
    ///
    /// Triggers:
    /// - SSE: Clients re-fetch `/api/places`
    CollectionRecomposed {
        /// Monotonic snapshot revision
        revision: u64,
        /// Places across all active sources before filtering
        merged_count: usize,
        /// Places left after the filter stage
        visible_count: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A debounced viewport change reached the composer
    ViewportSettled {
        bbox: BoundingBox,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A followed source was removed from the session (unfollow)
    SourceForgotten {
        source_id: SourceId,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Session state was cleared (logout)
    SessionReset {
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl MapEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &str {
        match self {
            MapEvent::SourceStatusChanged { .. } => "SourceStatusChanged",
            MapEvent::CollectionRecomposed { .. } => "CollectionRecomposed",
            MapEvent::ViewportSettled { .. } => "ViewportSettled",
            MapEvent::SourceForgotten { .. } => "SourceForgotten",
            MapEvent::SessionReset { .. } => "SessionReset",
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use placemap_common::events::{EventBus, MapEvent};
///
/// let event_bus = EventBus::new(100);
/// let _rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(MapEvent::SessionReset {
///     timestamp: chrono::Utc::now(),
/// });
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<MapEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<MapEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: MapEvent,
    ) -> Result<usize, broadcast::error::SendError<MapEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: MapEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_bus_delivers_to_subscriber() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();

        let count = bus
            .emit(MapEvent::SessionReset {
                timestamp: chrono::Utc::now(),
            })
            .expect("one subscriber should be listening");
        assert_eq!(count, 1);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "SessionReset");
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
        assert!(bus
            .emit(MapEvent::SessionReset {
                timestamp: chrono::Utc::now(),
            })
            .is_err());

        // Lossy emit never fails
        bus.emit_lossy(MapEvent::SessionReset {
            timestamp: chrono::Utc::now(),
        });
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = MapEvent::CollectionRecomposed {
            revision: 7,
            merged_count: 5,
            visible_count: 3,
            timestamp: chrono::Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "CollectionRecomposed");
        assert_eq!(json["revision"], 7);
        assert_eq!(json["visible_count"], 3);
    }

    #[test]
    fn test_phase_flags() {
        assert!(SourcePhase::Classifying.is_loading());
        assert!(SourcePhase::Reloading.is_loading());
        assert!(!SourcePhase::Failed.is_loading());
        assert!(!SourcePhase::Inactive.is_active());
        assert!(SourcePhase::Failed.is_active());
    }
}
