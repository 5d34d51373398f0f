//! The abstract `VectorStore` backend contract (spec §4.1, §6.2).
//!
//! Every concrete backend (an embedded `redb` store, a remote ANN service,
//! an in-memory store used in tests) implements this trait. The orchestrator
//! and every other component talk only to `dyn VectorStore`, never to a
//! concrete backend, so storage can be swapped without touching retrieval
//! logic.

use crate::error::Result;
use crate::types::{MemoryFilters, MemoryUnit, Page, ScoredMemory, SortBy, SortOrder};
use async_trait::async_trait;
use uuid::Uuid;

/// Unified vector storage backend trait (§4.1, §6.2).
///
/// Implementations MUST:
/// - clamp returned similarity scores to `[0, 1]` before returning them
///   (§9 Design Notes: clamp at the store boundary, never again downstream);
/// - treat `store` as an idempotent upsert keyed by `memory.id`;
/// - return `Ok(false)`/`Ok(None)` for missing ids on mutating/point-read
///   operations rather than raising an error (§4.1 Failure semantics).
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Upsert a unit with its vector. Idempotent for a given `memory.id`.
    ///
    /// # Errors
    /// Returns `Error::Storage` if the backend write fails.
    async fn store(&self, memory: MemoryUnit, vector: Vec<f32>) -> Result<Uuid>;

    /// Approximate nearest-neighbour search by cosine similarity under a
    /// payload filter. Returned scores are clamped to `[0, 1]`.
    ///
    /// # Errors
    /// Returns `Error::Retrieval` if the backend read fails.
    async fn retrieve(
        &self,
        query_vector: &[f32],
        filters: &MemoryFilters,
        limit: usize,
    ) -> Result<Vec<ScoredMemory>>;

    /// Point lookup by id.
    ///
    /// # Errors
    /// Returns `Error::Retrieval` if the backend read fails.
    async fn retrieve_by_id(&self, id: Uuid) -> Result<Option<MemoryUnit>>;

    /// Partially update a stored unit. When `content` changes without a
    /// `new_vector`, the on-disk vector is left untouched; when `new_vector`
    /// is `Some`, it atomically replaces the old vector alongside the
    /// payload update.
    ///
    /// # Errors
    /// Returns `Error::Storage` if the backend write fails. Returns
    /// `Ok(false)` (not an error) if `id` is absent.
    async fn update(
        &self,
        id: Uuid,
        fields: serde_json::Value,
        new_vector: Option<Vec<f32>>,
    ) -> Result<bool>;

    /// Delete a unit by id. Returns `Ok(false)` if absent.
    ///
    /// # Errors
    /// Returns `Error::Storage` if the backend write fails.
    async fn delete(&self, id: Uuid) -> Result<bool>;

    /// Delete every `CodeUnit` belonging to `project`. Returns the count
    /// deleted.
    ///
    /// # Errors
    /// Returns `Error::Storage` if the backend write fails.
    async fn delete_code_units_by_project(&self, project: &str) -> Result<usize>;

    /// Paginated listing with sort and total count (§4.1).
    ///
    /// # Errors
    /// Returns `Error::Validation` if `limit == 0`, `limit > 100`, or
    /// `offset < 0`. Returns `Error::Retrieval` on backend failure.
    async fn list(
        &self,
        filters: &MemoryFilters,
        sort_by: SortBy,
        sort_order: SortOrder,
        limit: usize,
        offset: usize,
    ) -> Result<Page<MemoryUnit>>;

    /// Full-scan count matching a filter.
    ///
    /// # Errors
    /// Returns `Error::Retrieval` if the backend read fails.
    async fn count(&self, filters: &MemoryFilters) -> Result<usize>;

    /// Cheap liveness probe for `get_status`.
    async fn health_check(&self) -> bool;

    /// Every distinct `(project_name, file_path)` currently indexed, for
    /// `get_indexed_files`.
    ///
    /// # Errors
    /// Returns `Error::Retrieval` if the backend read fails.
    async fn get_indexed_files(&self, project: &str) -> Result<Vec<String>>;

    /// Metadata-only projection of every code unit in a project, for
    /// `list_indexed_units`, without pulling full content/vectors.
    ///
    /// # Errors
    /// Returns `Error::Retrieval` if the backend read fails.
    async fn list_indexed_units(&self, project: &str) -> Result<Vec<MemoryUnit>>;
}

/// Extension operations on [`VectorStore`] that are convenient to implement
/// generically over the trait's primitive operations (merge/dedup/migrate).
/// Kept as a separate trait so a backend only needs the primitives above to
/// satisfy [`VectorStore`]; a blanket impl below provides these for free.
#[async_trait]
pub trait VectorStoreExt: VectorStore {
    /// Group stored memories (optionally scoped to a project) into clusters
    /// whose pairwise cosine similarity is `>= threshold`.
    ///
    /// This re-embeds nothing; it compares the vectors already stored by
    /// re-querying each memory's own content as the probe (an O(n) self-join
    /// over the project scope, acceptable for the moderate corpus sizes this
    /// engine targets).
    async fn find_duplicate_memories(
        &self,
        project: Option<&str>,
        threshold: f32,
        self_vectors: &dyn Fn(&MemoryUnit) -> Option<Vec<f32>>,
    ) -> Result<Vec<Vec<Uuid>>> {
        let filters = MemoryFilters {
            project_name: project.map(str::to_string),
            ..Default::default()
        };
        let page = self
            .list(
                &filters,
                SortBy::CreatedAt,
                SortOrder::Ascending,
                crate::constants::MAX_LIST_LIMIT,
                0,
            )
            .await?;
        let mut groups: Vec<Vec<Uuid>> = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for a in &page.items {
            if seen.contains(&a.id) {
                continue;
            }
            let Some(va) = self_vectors(a) else { continue };
            let mut group = vec![a.id];
            for b in &page.items {
                if a.id == b.id || seen.contains(&b.id) {
                    continue;
                }
                let Some(vb) = self_vectors(b) else { continue };
                if cosine_similarity(&va, &vb) >= threshold {
                    group.push(b.id);
                }
            }
            if group.len() > 1 {
                for id in &group {
                    seen.insert(*id);
                }
                groups.push(group);
            }
        }
        Ok(groups)
    }
}

impl<T: VectorStore + ?Sized> VectorStoreExt for T {}

/// Cosine similarity between two equal-length vectors, clamped to `[0, 1]`.
///
/// Negative cosine similarities (dissimilar/opposite vectors) are clamped up
/// to `0.0` per the store-boundary clamping rule (§9 Design Notes).
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_identical_vectors_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_orthogonal_is_zero() {
        assert!((cosine_similarity(&[1.0, 0.0], &[0.0, 1.0])).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_opposite_clamps_to_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]), 0.0);
    }

    #[test]
    fn cosine_similarity_mismatched_length_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
    }
}
