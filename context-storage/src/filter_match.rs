//! Shared predicate for matching a stored [`MemoryUnit`] against a
//! [`MemoryFilters`] payload filter. Every store operation that scans
//! memories (`retrieve`, `list`, `count`, `get_indexed_files`,
//! `list_indexed_units`) goes through this one function so the filter
//! semantics can't drift between operations.

use context_core::types::{MemoryFilters, MemoryUnit};

#[must_use]
pub(crate) fn matches(memory: &MemoryUnit, filters: &MemoryFilters) -> bool {
    if let Some(level) = filters.context_level {
        if memory.context_level != level {
            return false;
        }
    }
    if let Some(scope) = filters.scope {
        if memory.scope != scope {
            return false;
        }
    }
    if let Some(project) = &filters.project_name {
        if memory.project_name.as_deref() != Some(project.as_str()) {
            return false;
        }
    }
    if let Some(category) = filters.category {
        if memory.category != category {
            return false;
        }
    }
    if let Some(min) = filters.min_importance {
        if memory.importance < min {
            return false;
        }
    }
    if let Some(max) = filters.max_importance {
        if memory.importance > max {
            return false;
        }
    }
    if !filters.tags.is_empty() && !filters.tags.iter().any(|t| memory.tags.contains(t)) {
        return false;
    }
    if let Some(from) = filters.date_from {
        if memory.created_at < from {
            return false;
        }
    }
    if let Some(to) = filters.date_to {
        if memory.created_at > to {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use context_core::types::{
        ContextLevel, Lifecycle, MemoryCategory, Provenance, Scope,
    };
    use std::collections::{BTreeMap, BTreeSet};
    use uuid::Uuid;

    fn sample() -> MemoryUnit {
        MemoryUnit {
            id: Uuid::new_v4(),
            content: "some content here".to_string(),
            category: MemoryCategory::Fact,
            context_level: ContextLevel::ProjectContext,
            scope: Scope::Project,
            project_name: Some("demo".to_string()),
            importance: 0.5,
            tags: BTreeSet::from(["alpha".to_string()]),
            metadata: BTreeMap::new(),
            lifecycle_state: Lifecycle::Active,
            embedding_model: "hash-v1".to_string(),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
            last_accessed: chrono::Utc::now(),
            provenance: Provenance::default(),
            code_metadata: None,
        }
    }

    #[test]
    fn project_mismatch_excludes() {
        let memory = sample();
        let filters = MemoryFilters {
            project_name: Some("other".to_string()),
            ..Default::default()
        };
        assert!(!matches(&memory, &filters));
    }

    #[test]
    fn tag_any_match_includes_when_one_tag_overlaps() {
        let memory = sample();
        let filters = MemoryFilters {
            tags: vec!["alpha".to_string(), "beta".to_string()],
            ..Default::default()
        };
        assert!(matches(&memory, &filters));
    }

    #[test]
    fn importance_range_excludes_below_minimum() {
        let memory = sample();
        let filters = MemoryFilters {
            min_importance: Some(0.9),
            ..Default::default()
        };
        assert!(!matches(&memory, &filters));
    }
}
