//! Cross-project consent registry (spec §4.8).

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// Backing contract for consent state, so `context-storage` can persist it
/// alongside everything else while `context-core` stays storage-agnostic.
#[async_trait]
pub trait ConsentRegistry: Send + Sync {
    /// Record that `project` opts in to being searched from other projects.
    async fn opt_in(&self, project: &str);

    /// Record that `project` opts out.
    async fn opt_out(&self, project: &str);

    /// Whether `project` is currently opted in. Absent projects default to
    /// `true` (§4.8: consent is opt-out, not opt-in, to match the original
    /// single-project-by-default behavior).
    async fn is_opted_in(&self, project: &str) -> bool;

    /// Every project with an explicit opt-in recorded.
    async fn list_opted_in(&self) -> Vec<String>;
}

/// In-memory consent registry. `context-storage` provides a durable
/// implementation of the same trait backed by a table.
#[derive(Default)]
pub struct InMemoryConsentRegistry {
    opted_out: RwLock<HashSet<String>>,
    explicit_opt_in: RwLock<HashSet<String>>,
}

impl InMemoryConsentRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConsentRegistry for InMemoryConsentRegistry {
    async fn opt_in(&self, project: &str) {
        self.opted_out.write().expect("lock poisoned").remove(project);
        self.explicit_opt_in
            .write()
            .expect("lock poisoned")
            .insert(project.to_string());
    }

    async fn opt_out(&self, project: &str) {
        self.explicit_opt_in.write().expect("lock poisoned").remove(project);
        self.opted_out.write().expect("lock poisoned").insert(project.to_string());
    }

    async fn is_opted_in(&self, project: &str) -> bool {
        !self.opted_out.read().expect("lock poisoned").contains(project)
    }

    async fn list_opted_in(&self) -> Vec<String> {
        let mut projects: Vec<String> = self
            .explicit_opt_in
            .read()
            .expect("lock poisoned")
            .iter()
            .cloned()
            .collect();
        projects.sort();
        projects
    }
}

/// Resolve the set of projects a `search_all_projects` call may touch:
/// `current_project` is always included; the rest is gated by consent
/// unless `search_all` bypasses it entirely (an operator escape hatch, not
/// exposed to the default tool surface — §4.8).
pub async fn searchable_projects(
    registry: &dyn ConsentRegistry,
    current_project: &str,
    candidate_projects: &[String],
    search_all: bool,
) -> Vec<String> {
    let mut allowed: HashMap<String, ()> = HashMap::new();
    allowed.insert(current_project.to_string(), ());
    for project in candidate_projects {
        if project == current_project {
            continue;
        }
        if search_all || registry.is_opted_in(project).await {
            allowed.insert(project.clone(), ());
        }
    }
    let mut projects: Vec<String> = allowed.into_keys().collect();
    projects.sort();
    projects
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn absent_project_defaults_to_opted_in() {
        let registry = InMemoryConsentRegistry::new();
        assert!(registry.is_opted_in("new-project").await);
    }

    #[tokio::test]
    async fn opt_out_then_opt_in_round_trips() {
        let registry = InMemoryConsentRegistry::new();
        registry.opt_out("proj-a").await;
        assert!(!registry.is_opted_in("proj-a").await);
        registry.opt_in("proj-a").await;
        assert!(registry.is_opted_in("proj-a").await);
    }

    #[tokio::test]
    async fn searchable_projects_always_includes_current() {
        let registry = InMemoryConsentRegistry::new();
        registry.opt_out("other").await;
        let projects = searchable_projects(
            &registry,
            "current",
            &["other".to_string()],
            false,
        )
        .await;
        assert_eq!(projects, vec!["current".to_string()]);
    }

    #[tokio::test]
    async fn search_all_bypasses_consent() {
        let registry = InMemoryConsentRegistry::new();
        registry.opt_out("other").await;
        let projects = searchable_projects(
            &registry,
            "current",
            &["other".to_string()],
            true,
        )
        .await;
        assert_eq!(projects, vec!["current".to_string(), "other".to_string()]);
    }
}
