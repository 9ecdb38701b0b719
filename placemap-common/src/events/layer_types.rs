//! Layer-related type definitions
//!
//! Supporting types for per-source load lifecycle and UI status indicators.

use serde::{Deserialize, Serialize};

use crate::model::{Classification, SourceId};

/// Load lifecycle phase of one source
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "PascalCase")]
pub enum SourcePhase {
    /// Not selected; contributes nothing
    Inactive,
    /// Metadata request (and the first load after it) in flight
    Classifying,
    /// Full place set loaded
    EagerLoaded,
    /// Places for the current viewport loaded
    PagedLoaded,
    /// Refresh in flight; last-known places still shown
    Reloading,
    /// Last request failed; last-known places (if any) still shown
    Failed,
}

impl SourcePhase {
    /// True while a request issued for this source is outstanding
    pub fn is_loading(&self) -> bool {
        matches!(self, SourcePhase::Classifying | SourcePhase::Reloading)
    }

    /// True for every phase except Inactive
    pub fn is_active(&self) -> bool {
        !matches!(self, SourcePhase::Inactive)
    }
}

impl std::fmt::Display for SourcePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourcePhase::Inactive => write!(f, "Inactive"),
            SourcePhase::Classifying => write!(f, "Classifying"),
            SourcePhase::EagerLoaded => write!(f, "EagerLoaded"),
            SourcePhase::PagedLoaded => write!(f, "PagedLoaded"),
            SourcePhase::Reloading => write!(f, "Reloading"),
            SourcePhase::Failed => write!(f, "Failed"),
        }
    }
}

/// Per-source indicator state for UI layer toggles
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceStatus {
    pub source_id: SourceId,
    pub display_name: String,
    pub classification: Classification,
    /// Total place count reported by the source's metadata (None until classified)
    pub total_place_count: Option<u64>,
    pub phase: SourcePhase,
    pub is_loading: bool,
    pub has_error: bool,
    /// Places this source currently contributes to the merged collection
    pub place_count: usize,
    /// Last failure message, cleared by the next successful load
    pub last_error: Option<String>,
}
