//! Common data model shared by every component (see spec §3.1).

mod filters;
mod memory_unit;

pub use filters::{AdvancedFilters, MemoryFilters, SortBy, SortOrder};
pub use memory_unit::{
    CodeImport, CodeUnitMetadata, ContextLevel, Lifecycle, MemoryCategory, MemoryUnit, Provenance,
    Scope,
};

use serde::{Deserialize, Serialize};

/// A scored retrieval hit: a stored unit plus the score it was ranked by.
///
/// The score's meaning depends on the retrieval path that produced it:
/// raw cosine similarity for a pure semantic search, or the composite score
/// (§4.4) once usage/recency re-ranking has run. Callers should not assume
/// which without checking how the result was obtained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredMemory {
    pub memory: MemoryUnit,
    pub score: f32,
}

/// A page of results plus the total count matching the filter, for
/// `list_memories` (§4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
}
