//! Error types for the map layer core
//!
//! Failures are scoped to one source. None of these variants invalidates the
//! merged collection or the state of any other source.

use placemap_common::{Classification, SourceId};
use thiserror::Error;

/// Map layer error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LayerError {
    /// Metadata request for a source failed; the source stays unclassified
    #[error("Classification failed for source {source_id}: {reason}")]
    Classification { source_id: SourceId, reason: String },

    /// Place load for a source failed
    #[error("Load failed for source {source_id}: {reason}")]
    Load { source_id: SourceId, reason: String },

    /// Response for a superseded or cancelled request (internal bookkeeping)
    #[error("Stale response for source {source_id}: generation {generation}, current {current}")]
    StaleResponse {
        source_id: SourceId,
        generation: u64,
        current: u64,
    },

    /// Loader called with the wrong strategy for the source's classification
    #[error("Source {source_id} is {actual:?}; {operation} is not valid for it")]
    StrategyMismatch {
        source_id: SourceId,
        actual: Classification,
        operation: &'static str,
    },

    /// Source was never registered with the session
    #[error("Unknown source: {0}")]
    UnknownSource(SourceId),

    /// The signed-in user's own layer cannot be unregistered
    #[error("Source {0} cannot be forgotten")]
    PinnedSource(SourceId),

    /// The composer task has stopped
    #[error("Map session is closed")]
    SessionClosed,
}

/// Convenience Result type using LayerError
pub type Result<T> = std::result::Result<T, LayerError>;
