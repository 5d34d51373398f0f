//! Payload filter shapes accepted by the `VectorStore` contract (§4.1, §6.2).

use super::memory_unit::{ContextLevel, MemoryCategory, Scope};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Equality/range/any-match filters applied by the store during `retrieve`
/// and `list`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryFilters {
    pub context_level: Option<ContextLevel>,
    pub scope: Option<Scope>,
    pub project_name: Option<String>,
    pub category: Option<MemoryCategory>,
    pub min_importance: Option<f32>,
    pub max_importance: Option<f32>,
    /// ANY-match: a unit passes if it carries at least one of these tags.
    pub tags: Vec<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

/// Exclusion filters layered on top of [`MemoryFilters`] (§4.1 "advanced
/// exclusions").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdvancedFilters {
    pub exclude_ids: Vec<uuid::Uuid>,
    pub exclude_tags: Vec<String>,
    pub exclude_project_names: Vec<String>,
}

/// Sort key for `list_memories` (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    CreatedAt,
    UpdatedAt,
    Importance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Ascending,
    Descending,
}
