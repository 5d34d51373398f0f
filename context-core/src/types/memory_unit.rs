//! [`MemoryUnit`] and the `CodeUnit` specialization (spec §3.1).

use crate::constants::{MAX_CONTENT_LEN, MAX_TAG_LEN, MIN_CONTENT_LEN};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Free-form category bucket for a [`MemoryUnit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryCategory {
    Preference,
    Fact,
    Event,
    Workflow,
    Context,
    Code,
}

/// Coarse classification bucket that gates which specialized retrieval paths
/// surface a memory (see GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContextLevel {
    UserPreference,
    ProjectContext,
    SessionState,
}

impl ContextLevel {
    /// Auto-classify a context level from keywords in `content`, per §4.9's
    /// `store_memory` rule. Falls back to `ProjectContext`.
    #[must_use]
    pub fn classify(content: &str) -> Self {
        let lower = content.to_lowercase();
        const PREFERENCE_KEYWORDS: [&str; 5] = ["prefer", "like", "style", "always", "never"];
        const SESSION_KEYWORDS: [&str; 2] = ["currently", "working on"];
        if PREFERENCE_KEYWORDS.iter().any(|k| lower.contains(k)) {
            ContextLevel::UserPreference
        } else if SESSION_KEYWORDS.iter().any(|k| lower.contains(k)) || lower.contains("debugging")
        {
            ContextLevel::SessionState
        } else {
            ContextLevel::ProjectContext
        }
    }
}

/// Either global (all projects) or bound to a single named project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Global,
    Project,
}

/// `ACTIVE` units participate in retrieval; `ARCHIVED` units are retained
/// but excluded from default queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Active,
    Archived,
}

/// Source and confidence of a memory's content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub source: String,
    pub confidence: f32,
    pub verified: bool,
}

impl Default for Provenance {
    fn default() -> Self {
        Self {
            source: "user".to_string(),
            confidence: 1.0,
            verified: false,
        }
    }
}

/// A single import statement captured alongside a code unit (§3.1 `imports`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeImport {
    pub module: String,
    pub items: Vec<String>,
    /// `"import"` or `"from_import"`.
    pub import_type: String,
    pub line: u32,
    /// Whether the import uses a relative (leading-dot) path.
    pub relative: bool,
}

/// The `metadata` shape carried by a `CodeUnit` (§3.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeUnitMetadata {
    pub file_path: String,
    pub language: String,
    pub unit_type: String,
    pub unit_name: String,
    pub signature: String,
    pub start_line: u32,
    pub end_line: u32,
    pub imports: Vec<CodeImport>,
    pub file_size: u64,
    pub last_modified: DateTime<Utc>,
    pub content_hash: String,
}

impl CodeUnitMetadata {
    /// The deterministic id described in §3.1: re-extracting the same unit
    /// from an unchanged file yields the same id, so upserts are idempotent.
    #[must_use]
    pub fn deterministic_id(&self, project_name: &str) -> Uuid {
        let mut hasher = Sha256::new();
        hasher.update(project_name.as_bytes());
        hasher.update(b"\0");
        hasher.update(self.file_path.as_bytes());
        hasher.update(b"\0");
        hasher.update(self.unit_type.as_bytes());
        hasher.update(b"\0");
        hasher.update(self.unit_name.as_bytes());
        hasher.update(b"\0");
        hasher.update(self.start_line.to_le_bytes());
        let digest = hasher.finalize();
        Uuid::new_v8(digest[..16].try_into().unwrap_or([0u8; 16]))
    }
}

/// The atomic unit of semantic storage (spec §3.1).
///
/// A `CodeUnit` is simply a `MemoryUnit` with `category = Code`,
/// `scope = Project`, `context_level = ProjectContext`, a `"code"` tag, and a
/// `code_metadata` payload populated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryUnit {
    pub id: Uuid,
    pub content: String,
    pub category: MemoryCategory,
    pub context_level: ContextLevel,
    pub scope: Scope,
    pub project_name: Option<String>,
    pub importance: f32,
    pub tags: BTreeSet<String>,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub lifecycle_state: Lifecycle,
    pub embedding_model: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub provenance: Provenance,
    /// Populated iff `category == Code`; the typed view of `metadata`.
    pub code_metadata: Option<CodeUnitMetadata>,
}

impl MemoryUnit {
    /// Validate the invariants from §3.1 / §8 boundary behaviours.
    ///
    /// # Errors
    /// Returns `Error::Validation` if `content` length or `importance` are
    /// out of range, a tag exceeds the length cap, or `scope = Project`
    /// without a `project_name`.
    pub fn validate(&self) -> Result<()> {
        let len = self.content.chars().count();
        if !(MIN_CONTENT_LEN..=MAX_CONTENT_LEN).contains(&len) {
            return Err(Error::validation(format!(
                "content length {len} outside [{MIN_CONTENT_LEN}, {MAX_CONTENT_LEN}]"
            )));
        }
        if !(0.0..=1.0).contains(&self.importance) {
            return Err(Error::validation(format!(
                "importance {} outside [0, 1]",
                self.importance
            )));
        }
        if let Some(bad) = self.tags.iter().find(|t| t.len() > MAX_TAG_LEN) {
            return Err(Error::validation(format!(
                "tag '{bad}' exceeds {MAX_TAG_LEN} chars"
            )));
        }
        if self.scope == Scope::Project && self.project_name.is_none() {
            return Err(Error::validation(
                "project_name is required when scope = project".to_string(),
            ));
        }
        Ok(())
    }

    /// Build a `CodeUnit`-shaped `MemoryUnit` from extracted code metadata.
    #[must_use]
    pub fn new_code_unit(
        project_name: &str,
        content: String,
        meta: CodeUnitMetadata,
        embedding_model: &str,
        importance: f32,
    ) -> Self {
        let now = Utc::now();
        let id = meta.deterministic_id(project_name);
        let mut tags = BTreeSet::new();
        tags.insert("code".to_string());
        let metadata = serde_json::to_value(&meta)
            .ok()
            .and_then(|v| v.as_object().cloned())
            .map(|m| m.into_iter().collect())
            .unwrap_or_default();
        Self {
            id,
            content,
            category: MemoryCategory::Code,
            context_level: ContextLevel::ProjectContext,
            scope: Scope::Project,
            project_name: Some(project_name.to_string()),
            importance,
            tags,
            metadata,
            lifecycle_state: Lifecycle::Active,
            embedding_model: embedding_model.to_string(),
            created_at: now,
            updated_at: now,
            last_accessed: now,
            provenance: Provenance {
                source: "indexer".to_string(),
                confidence: 1.0,
                verified: false,
            },
            code_metadata: Some(meta),
        }
    }

    /// True if this unit satisfies the `CodeUnit` shape (§3.1).
    #[must_use]
    pub fn is_code_unit(&self) -> bool {
        self.category == MemoryCategory::Code
            && self.scope == Scope::Project
            && self.context_level == ContextLevel::ProjectContext
            && self.tags.contains("code")
    }
}

impl PartialEq for MemoryCategory {
    fn eq(&self, other: &Self) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}
impl Eq for MemoryCategory {}

impl PartialEq for ContextLevel {
    fn eq(&self, other: &Self) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}
impl Eq for ContextLevel {}

impl PartialEq for Scope {
    fn eq(&self, other: &Self) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}
impl Eq for Scope {}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MemoryUnit {
        MemoryUnit {
            id: Uuid::new_v4(),
            content: "User prefers Python".to_string(),
            category: MemoryCategory::Preference,
            context_level: ContextLevel::UserPreference,
            scope: Scope::Global,
            project_name: None,
            importance: 0.8,
            tags: BTreeSet::new(),
            metadata: BTreeMap::new(),
            lifecycle_state: Lifecycle::Active,
            embedding_model: "test-model".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_accessed: Utc::now(),
            provenance: Provenance::default(),
            code_metadata: None,
        }
    }

    #[test]
    fn rejects_empty_content() {
        let mut m = sample();
        m.content = String::new();
        assert!(m.validate().is_err());
    }

    #[test]
    fn rejects_oversized_content() {
        let mut m = sample();
        m.content = "a".repeat(MAX_CONTENT_LEN + 1);
        assert!(m.validate().is_err());
    }

    #[test]
    fn rejects_importance_out_of_range() {
        let mut m = sample();
        m.importance = 1.5;
        assert!(m.validate().is_err());
    }

    #[test]
    fn requires_project_name_for_project_scope() {
        let mut m = sample();
        m.scope = Scope::Project;
        m.project_name = None;
        assert!(m.validate().is_err());
        m.project_name = Some("demo".to_string());
        assert!(m.validate().is_ok());
    }

    #[test]
    fn classify_context_level_from_keywords() {
        assert_eq!(
            ContextLevel::classify("I always prefer tabs over spaces"),
            ContextLevel::UserPreference
        );
        assert_eq!(
            ContextLevel::classify("currently working on the auth module"),
            ContextLevel::SessionState
        );
        assert_eq!(
            ContextLevel::classify("the billing service talks to Stripe"),
            ContextLevel::ProjectContext
        );
    }

    #[test]
    fn deterministic_code_id_is_stable() {
        let meta = CodeUnitMetadata {
            file_path: "src/lib.rs".to_string(),
            language: "rust".to_string(),
            unit_type: "function".to_string(),
            unit_name: "parse".to_string(),
            signature: "fn parse() -> Result<()>".to_string(),
            start_line: 10,
            end_line: 20,
            imports: vec![],
            file_size: 100,
            last_modified: Utc::now(),
            content_hash: "abc".to_string(),
        };
        let id1 = meta.deterministic_id("demo");
        let id2 = meta.deterministic_id("demo");
        assert_eq!(id1, id2);
        let id3 = meta.deterministic_id("other-project");
        assert_ne!(id1, id3);
    }
}
