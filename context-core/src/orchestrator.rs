//! The Retrieval Orchestrator (C13): the engine's public surface, tying
//! every other component together (spec §4.9).

use crate::config::EngineConfig;
use crate::consent::{searchable_projects, ConsentRegistry};
use crate::dependency_graph::DependencyGraph;
use crate::embeddings::{EmbeddingCache, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::feedback::{self, FeedbackStore, QualityMetrics};
use crate::git_history::{self, CommitStore};
use crate::graph_export::{self, ExportFilter};
use crate::indexing::{IndexReport, IndexRequest, Indexer};
use crate::quality::{self, QualityFlag};
use crate::search::{fuse, Bm25Config, Bm25Index};
use crate::session::{ConversationTracker, QueryExpander};
use crate::store::{cosine_similarity, VectorStore, VectorStoreExt};
use crate::types::{
    ContextLevel, Lifecycle, MemoryCategory, MemoryFilters, MemoryUnit, Page, Provenance, Scope,
    ScoredMemory, SortBy, SortOrder,
};
use crate::usage::{UsageBackingStore, UsageTracker, UsageWeights};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// `search_mode` parameter (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    Semantic,
    Keyword,
    Hybrid,
}

/// Advisory quality bucket attached to a result set (§4.9). Never affects
/// ranking — computed after the final order is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultQualityBucket {
    Excellent,
    Good,
    Moderate,
    Low,
}

impl ResultQualityBucket {
    fn from_max_score(max_score: f32) -> Self {
        if max_score >= 0.85 {
            Self::Excellent
        } else if max_score >= 0.70 {
            Self::Good
        } else if max_score >= 0.55 {
            Self::Moderate
        } else {
            Self::Low
        }
    }
}

/// Response envelope for `retrieve_memories` / `search_code` (§4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResponse {
    pub results: Vec<ScoredMemory>,
    pub search_mode: SearchMode,
    pub quality_bucket: ResultQualityBucket,
    pub matched_keywords: Vec<String>,
    pub interpretation: String,
}

/// Extra narrowing applied only by `search_code` (§4.9).
#[derive(Debug, Clone, Default)]
pub struct CodeSearchOptions {
    pub file_pattern: Option<String>,
    pub language: Option<String>,
    pub quality_filters: Option<QualityFilters>,
    pub include_quality: bool,
}

#[derive(Debug, Clone, Default)]
pub struct QualityFilters {
    pub min_complexity: Option<u32>,
    pub max_complexity: Option<u32>,
    pub has_duplicates: Option<bool>,
    pub long_functions_only: bool,
    pub maintainability_min: Option<f32>,
}

/// Wraps `RetrievalOrchestrator::list` results with per-row quality metrics
/// when `include_quality` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeSearchResult {
    pub memory: MemoryUnit,
    pub score: f32,
    pub quality: Option<quality::QualityMetrics>,
}

/// "near-duplicate" / "similar" interpretation text for `find_similar_code`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarCodeMatch {
    pub memory: MemoryUnit,
    pub score: f32,
    pub interpretation: &'static str,
}

/// Engine-wide snapshot for `get_status` (§6.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub read_only_mode: bool,
    pub vector_store_healthy: bool,
    pub embedding_cache_entries: usize,
    pub embedding_cache_hits: u64,
    pub embedding_cache_misses: u64,
    pub usage_pending_entries: usize,
    pub active_sessions: usize,
}

/// The public operation surface (§4.9), constructed once per process and
/// shared behind an `Arc` across every transport (MCP tool handlers, a
/// CLI, whatever is layered on top).
pub struct RetrievalOrchestrator {
    config: parking_lot::RwLock<EngineConfig>,
    store: Arc<dyn VectorStore>,
    embedding_cache: Arc<EmbeddingCache>,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    usage_tracker: Arc<UsageTracker>,
    usage_backing_store: Arc<dyn UsageBackingStore>,
    conversation_tracker: Arc<ConversationTracker>,
    consent_registry: Arc<dyn ConsentRegistry>,
    feedback_store: Arc<dyn FeedbackStore>,
    commit_store: Option<Arc<dyn CommitStore>>,
    indexer: Option<Arc<dyn Indexer>>,
}

impl RetrievalOrchestrator {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn VectorStore>,
        embedding_cache: Arc<EmbeddingCache>,
        embedding_provider: Arc<dyn EmbeddingProvider>,
        usage_tracker: Arc<UsageTracker>,
        usage_backing_store: Arc<dyn UsageBackingStore>,
        conversation_tracker: Arc<ConversationTracker>,
        consent_registry: Arc<dyn ConsentRegistry>,
        feedback_store: Arc<dyn FeedbackStore>,
        commit_store: Option<Arc<dyn CommitStore>>,
        indexer: Option<Arc<dyn Indexer>>,
    ) -> Self {
        Self {
            config: parking_lot::RwLock::new(config),
            store,
            embedding_cache,
            embedding_provider,
            usage_tracker,
            usage_backing_store,
            conversation_tracker,
            consent_registry,
            feedback_store,
            commit_store,
            indexer,
        }
    }

    fn ensure_writable(&self, operation: &str) -> Result<()> {
        if self.config.read().read_only_mode {
            crate::security::log_project_event(
                crate::security::SecurityEventType::ReadOnlyViolation,
                "",
                format!("rejected {operation} while read-only"),
            );
            return Err(Error::read_only(operation.to_string()));
        }
        Ok(())
    }

    /// Current effective configuration, for `get_status` and callers that
    /// want to branch on e.g. `hybrid_search_enabled`.
    #[must_use]
    pub fn config(&self) -> EngineConfig {
        self.config.read().clone()
    }

    /// `store_memory` (§4.9).
    ///
    /// # Errors
    /// `Error::ReadOnly` in read-only mode; `Error::Validation` if the
    /// resulting unit fails [`MemoryUnit::validate`]; propagates embedding
    /// and storage errors.
    #[allow(clippy::too_many_arguments)]
    pub async fn store_memory(
        &self,
        content: String,
        category: MemoryCategory,
        scope: Scope,
        project_name: Option<String>,
        importance: f32,
        tags: BTreeSet<String>,
        metadata: BTreeMap<String, serde_json::Value>,
        context_level: Option<ContextLevel>,
    ) -> Result<Uuid> {
        self.ensure_writable("store_memory")?;
        let now = Utc::now();
        let memory = MemoryUnit {
            id: Uuid::new_v4(),
            context_level: context_level.unwrap_or_else(|| ContextLevel::classify(&content)),
            category,
            scope,
            project_name,
            importance,
            tags,
            metadata,
            lifecycle_state: Lifecycle::Active,
            embedding_model: self.embedding_provider.model_id().to_string(),
            created_at: now,
            updated_at: now,
            last_accessed: now,
            provenance: Provenance::default(),
            code_metadata: None,
            content: content.clone(),
        };
        memory.validate()?;
        let vector = self
            .embedding_cache
            .get_or_embed(&content, self.embedding_provider.as_ref())
            .await?;
        self.store.store(memory, vector).await
    }

    async fn usage_stats_for(&self, id: Uuid) -> Result<Option<crate::usage::UsageStats>> {
        if let Some(pending) = self.usage_tracker.peek_pending(id) {
            return Ok(Some(pending));
        }
        self.usage_backing_store.get_usage_stats(id).await
    }

    async fn record_usage(&self, id: Uuid, score: f32) {
        if let Some(batch) = self.usage_tracker.record_usage(id, score) {
            if let Err(err) = self.usage_backing_store.batch_update_usage(batch).await {
                tracing::warn!(error = %err, "usage batch flush failed");
            }
        }
    }

    fn annotate(results: &[ScoredMemory], query: &str) -> (ResultQualityBucket, Vec<String>, String) {
        let max_score = results.iter().map(|r| r.score).fold(0.0f32, f32::max);
        let bucket = ResultQualityBucket::from_max_score(max_score);
        let query_tokens: Vec<&str> = query.split_whitespace().filter(|t| t.len() >= 3).collect();
        let top3: Vec<&ScoredMemory> = results.iter().take(3).collect();
        let mut matched: Vec<String> = Vec::new();
        for token in query_tokens {
            let lower = token.to_lowercase();
            if top3.iter().any(|r| r.memory.content.to_lowercase().contains(&lower)) {
                matched.push(token.to_string());
            }
        }
        let interpretation = format!(
            "{} result(s), quality={:?}, {} query term(s) matched in the top hits",
            results.len(),
            bucket,
            matched.len()
        );
        (bucket, matched, interpretation)
    }

    /// `retrieve_memories` (§4.9).
    ///
    /// # Errors
    /// Propagates embedding/storage errors.
    pub async fn retrieve_memories(
        &self,
        query: &str,
        limit: usize,
        filters: MemoryFilters,
        session_id: Option<Uuid>,
        search_mode: SearchMode,
    ) -> Result<RetrievalResponse> {
        let config = self.config();

        let effective_query = match session_id {
            Some(sid) if config.query_expansion => self
                .conversation_tracker
                .recent_queries(sid)
                .map(|recent| QueryExpander::expand(query, &recent))
                .unwrap_or_else(|| query.to_string()),
            _ => query.to_string(),
        };

        let fetch_limit = if session_id.is_some() {
            limit * config.dedup_fetch_multiplier.max(1)
        } else {
            limit
        };

        let query_vector = self
            .embedding_cache
            .get_or_embed(&effective_query, self.embedding_provider.as_ref())
            .await?;
        let dense = self.store.retrieve(&query_vector, &filters, fetch_limit.max(limit)).await?;

        let effective_mode = if search_mode == SearchMode::Hybrid && !config.hybrid_search_enabled {
            SearchMode::Semantic
        } else {
            search_mode
        };

        let mut results = if effective_mode == SearchMode::Hybrid {
            self.hybrid_rerank(dense, &effective_query, &config)
        } else {
            dense
        };

        if let Some(sid) = session_id {
            if let Some(shown) = self.conversation_tracker.shown_ids(sid) {
                results.retain(|r| !shown.contains(&r.memory.id));
            }
        }
        results.truncate(limit);

        self.composite_rerank(&mut results, &config).await;

        for r in &results {
            self.record_usage(r.memory.id, r.score).await;
        }
        if let Some(sid) = session_id {
            let ids: Vec<Uuid> = results.iter().map(|r| r.memory.id).collect();
            self.conversation_tracker.track_query(sid, query, &ids);
        }

        let (quality_bucket, matched_keywords, interpretation) = Self::annotate(&results, query);
        Ok(RetrievalResponse {
            results,
            search_mode: effective_mode,
            quality_bucket,
            matched_keywords,
            interpretation,
        })
    }

    fn hybrid_rerank(&self, dense: Vec<ScoredMemory>, query: &str, config: &EngineConfig) -> Vec<ScoredMemory> {
        let docs: Vec<(Uuid, String)> = dense.iter().map(|r| (r.memory.id, r.memory.content.clone())).collect();
        let bm25 = Bm25Index::build(&docs, Bm25Config { k1: config.bm25_k1, b: config.bm25_b });
        let dense_scores: Vec<(Uuid, f32)> = dense.iter().map(|r| (r.memory.id, r.score)).collect();
        let fused = fuse(&dense_scores, &bm25, query, config.hybrid_fusion_method, config.hybrid_alpha, 50);
        let fused_order: std::collections::HashMap<Uuid, f32> = fused.into_iter().collect();
        let mut reordered: Vec<ScoredMemory> = dense
            .into_iter()
            .map(|mut r| {
                if let Some(&score) = fused_order.get(&r.memory.id) {
                    r.score = score;
                }
                r
            })
            .collect();
        reordered.sort_by(|a, b| b.score.total_cmp(&a.score));
        reordered
    }

    async fn composite_rerank(&self, results: &mut Vec<ScoredMemory>, config: &EngineConfig) {
        let weights = UsageWeights {
            w_similarity: config.ranking_weight_similarity,
            w_recency: config.ranking_weight_recency,
            w_usage: config.ranking_weight_usage,
            halflife_hours: config.recency_decay_halflife_days * 24.0,
            max_use: 1000.0,
        };
        let tracker = UsageTracker::new(usize::MAX, weights);
        for r in results.iter_mut() {
            let stats = self.usage_stats_for(r.memory.id).await.unwrap_or(None);
            let (last_used, use_count) = stats
                .map(|s| (Some(s.last_used), s.use_count))
                .unwrap_or((None, 0));
            r.score = tracker.composite_score(r.score.clamp(0.0, 1.0), r.memory.created_at, last_used, use_count);
        }
        results.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.memory.created_at.cmp(&a.memory.created_at))
        });
    }

    /// # Errors
    /// Propagates storage errors.
    pub async fn delete_memory(&self, id: Uuid) -> Result<bool> {
        self.ensure_writable("delete_memory")?;
        self.store.delete(id).await
    }

    /// `update_memory`: when `new_content` is `Some` and `regenerate_embedding`
    /// is true, a fresh vector is computed; otherwise the stored vector is
    /// left untouched (§4.1).
    ///
    /// # Errors
    /// Propagates embedding/storage errors.
    pub async fn update_memory(
        &self,
        id: Uuid,
        fields: serde_json::Value,
        new_content: Option<&str>,
        regenerate_embedding: bool,
    ) -> Result<bool> {
        self.ensure_writable("update_memory")?;
        let new_vector = match (new_content, regenerate_embedding) {
            (Some(content), true) => {
                Some(self.embedding_cache.get_or_embed(content, self.embedding_provider.as_ref()).await?)
            }
            _ => None,
        };
        self.store.update(id, fields, new_vector).await
    }

    /// # Errors
    /// Propagates storage errors.
    pub async fn get_memory_by_id(&self, id: Uuid) -> Result<Option<MemoryUnit>> {
        self.store.retrieve_by_id(id).await
    }

    /// # Errors
    /// Propagates storage errors.
    pub async fn list_memories(
        &self,
        filters: MemoryFilters,
        sort_by: SortBy,
        sort_order: SortOrder,
        limit: usize,
        offset: usize,
    ) -> Result<Page<MemoryUnit>> {
        self.store.list(&filters, sort_by, sort_order, limit, offset).await
    }

    /// `export_memories(filters)`: a MemoryUnit-only round trip (no
    /// embedding re-derivation on import, per §9 Design Notes' resolution of
    /// the dual export/import contract open question).
    ///
    /// # Errors
    /// Propagates storage errors.
    pub async fn export_memories(&self, filters: MemoryFilters) -> Result<Vec<MemoryUnit>> {
        let page = self
            .store
            .list(&filters, SortBy::CreatedAt, SortOrder::Ascending, crate::constants::MAX_LIST_LIMIT, 0)
            .await?;
        let mut items = page.items;
        let mut offset = items.len();
        while offset < page.total {
            let next = self
                .store
                .list(&filters, SortBy::CreatedAt, SortOrder::Ascending, crate::constants::MAX_LIST_LIMIT, offset)
                .await?;
            if next.items.is_empty() {
                break;
            }
            offset += next.items.len();
            items.extend(next.items);
        }
        crate::security::log_project_event(
            crate::security::SecurityEventType::ExportPerformed,
            filters.project_name.as_deref().unwrap_or(""),
            format!("exported {} units", items.len()),
        );
        Ok(items)
    }

    /// `import_memories(units, conflict_mode)`. `overwrite` upserts every
    /// unit as-is (re-embedding its content); `skip_existing` leaves any id
    /// already present untouched.
    ///
    /// # Errors
    /// Propagates embedding/storage errors.
    pub async fn import_memories(&self, units: Vec<MemoryUnit>, overwrite: bool) -> Result<usize> {
        self.ensure_writable("import_memories")?;
        let mut imported = 0usize;
        for unit in units {
            if !overwrite && self.store.retrieve_by_id(unit.id).await?.is_some() {
                continue;
            }
            unit.validate()?;
            let vector = self
                .embedding_cache
                .get_or_embed(&unit.content, self.embedding_provider.as_ref())
                .await?;
            self.store.store(unit, vector).await?;
            imported += 1;
        }
        crate::security::log_project_event(
            crate::security::SecurityEventType::ImportPerformed,
            "",
            format!("imported {imported} units"),
        );
        Ok(imported)
    }

    /// `migrate_memory_scope(id, new_project?)`.
    ///
    /// # Errors
    /// Propagates storage errors.
    pub async fn migrate_memory_scope(&self, id: Uuid, new_project: Option<String>) -> Result<bool> {
        self.ensure_writable("migrate_memory_scope")?;
        let scope = if new_project.is_some() { Scope::Project } else { Scope::Global };
        let fields = serde_json::json!({ "scope": scope, "project_name": new_project });
        self.store.update(id, fields, None).await
    }

    /// `bulk_reclassify(new_level, filters) → count` (§4.1
    /// `bulk_update_context_level`).
    ///
    /// # Errors
    /// Propagates storage errors.
    pub async fn bulk_reclassify(&self, new_level: ContextLevel, filters: MemoryFilters) -> Result<usize> {
        self.ensure_writable("bulk_reclassify")?;
        let page = self
            .store
            .list(&filters, SortBy::CreatedAt, SortOrder::Ascending, crate::constants::MAX_LIST_LIMIT, 0)
            .await?;
        let mut updated = 0usize;
        for unit in page.items {
            let fields = serde_json::json!({ "context_level": new_level });
            if self.store.update(unit.id, fields, None).await? {
                updated += 1;
            }
        }
        crate::security::log_project_event(
            crate::security::SecurityEventType::BulkOperationExecuted,
            filters.project_name.as_deref().unwrap_or(""),
            format!("bulk_reclassify updated {updated} units"),
        );
        Ok(updated)
    }

    /// `find_duplicate_memories(project?, threshold)`.
    ///
    /// # Errors
    /// Propagates embedding/storage errors.
    pub async fn find_duplicate_memories(&self, project: Option<&str>, threshold: f32) -> Result<Vec<Vec<Uuid>>> {
        let filters = MemoryFilters { project_name: project.map(str::to_string), ..Default::default() };
        let page = self
            .store
            .list(&filters, SortBy::CreatedAt, SortOrder::Ascending, crate::constants::MAX_LIST_LIMIT, 0)
            .await?;

        let mut vectors = std::collections::HashMap::with_capacity(page.items.len());
        for unit in &page.items {
            let vector = self.embedding_cache.get_or_embed(&unit.content, self.embedding_provider.as_ref()).await?;
            vectors.insert(unit.id, vector);
        }

        self.store
            .find_duplicate_memories(project, threshold, &|memory: &MemoryUnit| vectors.get(&memory.id).cloned())
            .await
    }

    /// `merge_memories(ids, keep_id?)`: combine content/tags/metadata into
    /// one unit, delete the others (§4.1).
    ///
    /// # Errors
    /// `Error::Validation` if `ids` is empty or `keep_id` is not among
    /// `ids`. Propagates storage errors.
    pub async fn merge_memories(&self, ids: &[Uuid], keep_id: Option<Uuid>) -> Result<Uuid> {
        self.ensure_writable("merge_memories")?;
        if ids.is_empty() {
            return Err(Error::validation("merge_memories requires at least one id"));
        }
        let keep = keep_id.unwrap_or(ids[0]);
        if !ids.contains(&keep) {
            return Err(Error::validation("keep_id must be one of the merged ids"));
        }
        let mut merged_content = String::new();
        let mut merged_tags = BTreeSet::new();
        let mut merged_metadata = BTreeMap::new();
        for id in ids {
            let Some(unit) = self.store.retrieve_by_id(*id).await? else { continue };
            if !merged_content.is_empty() {
                merged_content.push('\n');
            }
            merged_content.push_str(&unit.content);
            merged_tags.extend(unit.tags);
            merged_metadata.extend(unit.metadata);
        }
        let fields = serde_json::json!({ "content": merged_content, "tags": merged_tags, "metadata": merged_metadata });
        let vector = self
            .embedding_cache
            .get_or_embed(&merged_content, self.embedding_provider.as_ref())
            .await?;
        self.store.update(keep, fields, Some(vector)).await?;
        for id in ids {
            if *id != keep {
                self.store.delete(*id).await?;
            }
        }
        Ok(keep)
    }

    /// `search_code` (§4.9): code-scoped hybrid/semantic retrieval plus
    /// file-pattern/language filtering, dedup by
    /// `(file_path, start_line, unit_name)`, and optional quality filters.
    ///
    /// # Errors
    /// Propagates embedding/storage errors.
    pub async fn search_code(
        &self,
        query: &str,
        project: Option<&str>,
        limit: usize,
        search_mode: SearchMode,
        options: CodeSearchOptions,
    ) -> Result<Vec<CodeSearchResult>> {
        let filters = MemoryFilters {
            category: Some(MemoryCategory::Code),
            project_name: project.map(str::to_string),
            ..Default::default()
        };
        let response = self.retrieve_memories(query, limit * 3, filters, None, search_mode).await?;

        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for r in response.results {
            let Some(meta) = &r.memory.code_metadata else { continue };
            if let Some(pattern) = &options.file_pattern {
                if !meta.file_path.contains(pattern.as_str()) {
                    continue;
                }
            }
            if let Some(language) = &options.language {
                if &meta.language != language {
                    continue;
                }
            }
            let dedup_key = (meta.file_path.clone(), meta.start_line, meta.unit_name.clone());
            if !seen.insert(dedup_key) {
                continue;
            }

            let computed_quality = if options.include_quality {
                Some(quality::analyze(&r.memory.content, 0, meta.signature.contains("///"), &[], &[]))
            } else {
                None
            };

            if let Some(filters) = &options.quality_filters {
                if let Some(q) = &computed_quality {
                    if !Self::passes_quality_filters(q, filters) {
                        continue;
                    }
                } else if filters.min_complexity.is_some()
                    || filters.max_complexity.is_some()
                    || filters.has_duplicates.is_some()
                    || filters.long_functions_only
                    || filters.maintainability_min.is_some()
                {
                    continue;
                }
            }

            out.push(CodeSearchResult { memory: r.memory, score: r.score, quality: computed_quality });
            if out.len() >= limit {
                break;
            }
        }
        Ok(out)
    }

    fn passes_quality_filters(q: &quality::QualityMetrics, filters: &QualityFilters) -> bool {
        if let Some(min) = filters.min_complexity {
            if q.cyclomatic_complexity < min {
                return false;
            }
        }
        if let Some(max) = filters.max_complexity {
            if q.cyclomatic_complexity > max {
                return false;
            }
        }
        if let Some(want_dupes) = filters.has_duplicates {
            let flags = quality::quality_flags(q);
            if flags.contains(&QualityFlag::PossibleDuplicate) != want_dupes {
                return false;
            }
        }
        if filters.long_functions_only && q.line_count <= 100 {
            return false;
        }
        if let Some(min_maintainability) = filters.maintainability_min {
            if q.maintainability_index < min_maintainability {
                return false;
            }
        }
        true
    }

    /// `find_similar_code(snippet, …)` (§4.9). Similarity bands are advisory
    /// text only, never filtering.
    ///
    /// # Errors
    /// Propagates embedding/storage errors.
    pub async fn find_similar_code(
        &self,
        snippet: &str,
        project: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SimilarCodeMatch>> {
        let vector = self.embedding_cache.get_or_embed(snippet, self.embedding_provider.as_ref()).await?;
        let filters = MemoryFilters {
            category: Some(MemoryCategory::Code),
            project_name: project.map(str::to_string),
            ..Default::default()
        };
        let hits = self.store.retrieve(&vector, &filters, limit).await?;
        Ok(hits
            .into_iter()
            .map(|r| {
                let interpretation = if r.score >= crate::constants::NEAR_DUPLICATE_THRESHOLD {
                    "near-duplicate"
                } else if r.score >= crate::constants::SIMILAR_CODE_THRESHOLD {
                    "similar"
                } else {
                    "related"
                };
                SimilarCodeMatch { memory: r.memory, score: r.score, interpretation }
            })
            .collect())
    }

    /// `search_all_projects` (§4.9): consent-gated fan-out over
    /// `search_code`, merged by descending score, tagged with source project.
    ///
    /// # Errors
    /// Propagates embedding/storage/consent errors.
    pub async fn search_all_projects(
        &self,
        query: &str,
        current_project: &str,
        candidate_projects: &[String],
        limit: usize,
        search_all: bool,
    ) -> Result<Vec<(String, CodeSearchResult)>> {
        let projects = searchable_projects(
            self.consent_registry.as_ref(),
            current_project,
            candidate_projects,
            search_all,
        )
        .await;

        let mut merged: Vec<(String, CodeSearchResult)> = Vec::new();
        for project in &projects {
            let hits = self
                .search_code(query, Some(project), limit, SearchMode::Hybrid, CodeSearchOptions::default())
                .await?;
            merged.extend(hits.into_iter().map(|h| (project.clone(), h)));
        }
        merged.sort_by(|a, b| b.1.score.total_cmp(&a.1.score));
        merged.truncate(limit);

        crate::security::log_project_event(
            crate::security::SecurityEventType::CrossProjectAccessGranted,
            current_project,
            format!("searched {} project(s)", projects.len()),
        );
        Ok(merged)
    }

    /// # Errors
    /// Never fails; kept `Result`-shaped for symmetry with every other tool
    /// operation and to allow a future backing-store-checked implementation.
    pub async fn opt_in_cross_project(&self, project: &str) -> Result<()> {
        self.consent_registry.opt_in(project).await;
        crate::security::log_project_event(crate::security::SecurityEventType::ConsentChanged, project, "opted in");
        Ok(())
    }

    /// # Errors
    /// See [`Self::opt_in_cross_project`].
    pub async fn opt_out_cross_project(&self, project: &str) -> Result<()> {
        self.consent_registry.opt_out(project).await;
        crate::security::log_project_event(crate::security::SecurityEventType::ConsentChanged, project, "opted out");
        Ok(())
    }

    #[must_use]
    pub async fn list_opted_in_projects(&self) -> Vec<String> {
        self.consent_registry.list_opted_in().await
    }

    /// `submit_search_feedback`.
    ///
    /// # Errors
    /// Propagates storage errors.
    pub async fn submit_search_feedback(&self, memory_id: Uuid, query: &str, helpful: bool) -> Result<()> {
        feedback::submit_search_feedback(self.feedback_store.as_ref(), memory_id, query, helpful).await
    }

    /// `get_quality_metrics`.
    ///
    /// # Errors
    /// Propagates storage errors.
    pub async fn get_quality_metrics(&self, memory_id: Option<Uuid>) -> Result<QualityMetrics> {
        feedback::get_quality_metrics(self.feedback_store.as_ref(), memory_id).await
    }

    /// Build the dependency graph for `project` on demand from its stored
    /// `CodeUnit`s (§4.7).
    ///
    /// # Errors
    /// Propagates storage errors.
    pub async fn build_dependency_graph(&self, project: &str) -> Result<DependencyGraph> {
        let units = self.store.list_indexed_units(project).await?;
        let mut by_file: std::collections::HashMap<String, Vec<crate::types::CodeImport>> = std::collections::HashMap::new();
        for unit in &units {
            let Some(meta) = &unit.code_metadata else { continue };
            by_file.entry(meta.file_path.clone()).or_default().extend(meta.imports.clone());
        }
        let files: std::collections::HashSet<String> = by_file.keys().cloned().collect();
        let mut graph = DependencyGraph::new();
        graph.ingest(&by_file, |source, import| resolve_import(source, import, &files));
        Ok(graph)
    }

    /// `get_file_dependencies`.
    ///
    /// # Errors
    /// Propagates storage errors.
    pub async fn get_file_dependencies(&self, project: &str, file: &str) -> Result<std::collections::HashSet<String>> {
        Ok(self.build_dependency_graph(project).await?.get_dependencies(file))
    }

    /// `get_file_dependents`.
    ///
    /// # Errors
    /// Propagates storage errors.
    pub async fn get_file_dependents(&self, project: &str, file: &str) -> Result<std::collections::HashSet<String>> {
        Ok(self.build_dependency_graph(project).await?.get_dependents(file))
    }

    /// `find_dependency_path`.
    ///
    /// # Errors
    /// Propagates storage errors.
    pub async fn find_dependency_path(
        &self,
        project: &str,
        source: &str,
        target: &str,
        max_depth: usize,
    ) -> Result<Option<Vec<String>>> {
        Ok(self.build_dependency_graph(project).await?.find_path(source, target, max_depth))
    }

    /// `get_dependency_stats`: file count, edge count, and circular groups.
    ///
    /// # Errors
    /// Propagates storage errors.
    pub async fn get_dependency_stats(&self, project: &str) -> Result<DependencyStats> {
        let graph = self.build_dependency_graph(project).await?;
        let files = graph.all_files();
        let edges: usize = files.iter().map(|f| graph.get_dependencies(f).len()).sum();
        let circular_groups = graph.detect_circular_dependencies();
        Ok(DependencyStats { file_count: files.len(), edge_count: edges, circular_group_count: circular_groups.len() })
    }

    /// `get_dependency_graph`: export in the requested format (§4.7).
    ///
    /// # Errors
    /// Propagates storage errors.
    pub async fn get_dependency_graph(&self, project: &str, format: GraphFormat, filter: ExportFilter) -> Result<String> {
        let graph = self.build_dependency_graph(project).await?;
        Ok(match format {
            GraphFormat::Dot => graph_export::export_dot(&graph, &filter),
            GraphFormat::Json => serde_json::to_string(&graph_export::export_json(&graph, &filter))
                .unwrap_or_default(),
            GraphFormat::Mermaid => graph_export::export_mermaid(&graph, &filter),
        })
    }

    /// `index_codebase` / `reindex_project` (§4.6, §6.1). Both tool names
    /// map to the same indexing pass; the distinction is purely in how a
    /// transport names the operation for an already-known project.
    ///
    /// # Errors
    /// `Error::Validation` if no indexer is configured. Propagates the
    /// indexer's storage errors.
    pub async fn index_codebase(&self, request: IndexRequest) -> Result<IndexReport> {
        self.ensure_writable("index_codebase")?;
        let Some(indexer) = &self.indexer else {
            return Err(Error::validation("no indexer configured for this engine"));
        };
        indexer.index(request).await
    }

    /// `get_indexed_files`.
    ///
    /// # Errors
    /// Propagates storage errors.
    pub async fn get_indexed_files(&self, project: &str) -> Result<Vec<String>> {
        self.store.get_indexed_files(project).await
    }

    /// `list_indexed_units`.
    ///
    /// # Errors
    /// Propagates storage errors.
    pub async fn list_indexed_units(&self, project: &str) -> Result<Vec<MemoryUnit>> {
        self.store.list_indexed_units(project).await
    }

    /// `start_conversation_session`.
    #[must_use]
    pub fn start_conversation_session(&self, description: Option<String>) -> Uuid {
        self.conversation_tracker.start_session(description)
    }

    /// `end_conversation_session`.
    #[must_use]
    pub fn end_conversation_session(&self, session_id: Uuid) -> bool {
        self.conversation_tracker.end_session(session_id)
    }

    /// `list_conversation_sessions`.
    #[must_use]
    pub fn list_conversation_sessions(&self) -> Vec<crate::session::Session> {
        self.conversation_tracker.list_sessions()
    }

    /// `search_git_history` (passes through to `search_git_commits`).
    ///
    /// # Errors
    /// `Error::Validation` if no commit store is configured; otherwise
    /// propagates its error.
    pub async fn search_git_history(&self, query: &str, limit: usize) -> Result<Vec<git_history::Commit>> {
        self.require_commit_store()?.search_git_commits(Some(query), None, None, None, limit).await
    }

    /// `index_git_history` (§4.9): store pre-collected commit/file-change
    /// records — the engine does not shell out to `git` itself.
    ///
    /// # Errors
    /// `Error::Validation` if no commit store is configured; otherwise
    /// propagates its error.
    pub async fn index_git_history(
        &self,
        commits: Vec<git_history::Commit>,
        changes: Vec<git_history::FileChange>,
    ) -> Result<(usize, usize)> {
        self.ensure_writable("index_git_history")?;
        let store = self.require_commit_store()?;
        let commits_stored = store.store_git_commits(commits).await?;
        let changes_stored = store.store_git_file_changes(changes).await?;
        Ok((commits_stored, changes_stored))
    }

    /// # Errors
    /// `Error::Validation` if no commit store is configured; otherwise
    /// propagates its error.
    pub async fn show_function_evolution(&self, file_path: &str, function_name: &str, limit: usize) -> Result<Vec<git_history::Commit>> {
        git_history::show_function_evolution(self.require_commit_store()?.as_ref(), file_path, function_name, limit).await
    }

    /// # Errors
    /// See [`Self::show_function_evolution`].
    pub async fn get_change_frequency(&self, path: &str, limit: usize) -> Result<Vec<(String, usize)>> {
        git_history::get_change_frequency(self.require_commit_store()?.as_ref(), path, limit).await
    }

    /// # Errors
    /// See [`Self::show_function_evolution`].
    pub async fn get_churn_hotspots(&self, candidate_paths: &[String], limit: usize) -> Result<Vec<(String, u32)>> {
        git_history::get_churn_hotspots(self.require_commit_store()?.as_ref(), candidate_paths, limit).await
    }

    /// # Errors
    /// See [`Self::show_function_evolution`].
    pub async fn get_recent_changes(&self, path: &str, limit: usize) -> Result<Vec<git_history::FileChange>> {
        git_history::get_recent_changes(self.require_commit_store()?.as_ref(), path, limit).await
    }

    /// # Errors
    /// See [`Self::show_function_evolution`].
    pub async fn blame_search(&self, path: &str, query: &str, limit: usize) -> Result<Vec<git_history::Commit>> {
        git_history::blame_search(self.require_commit_store()?.as_ref(), path, query, limit).await
    }

    /// # Errors
    /// See [`Self::show_function_evolution`].
    pub async fn get_code_authors(&self, path: &str) -> Result<Vec<(String, String, usize)>> {
        git_history::get_code_authors(self.require_commit_store()?.as_ref(), path).await
    }

    fn require_commit_store(&self) -> Result<&Arc<dyn CommitStore>> {
        self.commit_store
            .as_ref()
            .ok_or_else(|| Error::validation("no commit/file-change store configured for this engine"))
    }

    /// `get_status` (§6.1).
    pub async fn get_status(&self) -> EngineStatus {
        let (hits, misses) = self.embedding_cache.hit_stats();
        EngineStatus {
            read_only_mode: self.config().read_only_mode,
            vector_store_healthy: self.store.health_check().await,
            embedding_cache_entries: self.embedding_cache.len(),
            embedding_cache_hits: hits,
            embedding_cache_misses: misses,
            usage_pending_entries: self.usage_tracker.pending_len(),
            active_sessions: self.conversation_tracker.list_sessions().len(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DependencyStats {
    pub file_count: usize,
    pub edge_count: usize,
    pub circular_group_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphFormat {
    Dot,
    Json,
    Mermaid,
}

/// Resolve a raw import to an in-project file, per §4.7: for a relative
/// (leading-dot) module path, walk up one parent per extra leading dot from
/// `source`'s directory, then append the dotted path with `/` separators
/// and try known extensions / `index`/`__init__` conventions. Absolute
/// (non-relative) imports that don't match any known project file are
/// treated as external and discarded.
fn resolve_import(
    source: &str,
    import: &crate::types::CodeImport,
    known_files: &std::collections::HashSet<String>,
) -> Option<String> {
    const EXTENSIONS: &[&str] = &[".py", ".js", ".ts", ".jsx", ".tsx", ".rs", ".go", ".rb", ".java"];
    let source_dir = PathBuf::from(source).parent().map(PathBuf::from).unwrap_or_default();

    let base_dir = if import.relative {
        let leading_dots = import.module.chars().take_while(|c| *c == '.').count();
        let mut dir = source_dir;
        for _ in 1..leading_dots {
            dir = dir.parent().map(PathBuf::from).unwrap_or_default();
        }
        dir
    } else {
        PathBuf::new()
    };

    let module_path = import.module.trim_start_matches('.').replace('.', "/");
    let candidate_base = base_dir.join(&module_path);

    for ext in EXTENSIONS {
        let candidate = format!("{}{ext}", candidate_base.to_string_lossy());
        if known_files.contains(&candidate) {
            return Some(candidate);
        }
    }
    for index_name in ["__init__", "index", "mod"] {
        for ext in EXTENSIONS {
            let candidate = candidate_base.join(format!("{index_name}{ext}"));
            let candidate = candidate.to_string_lossy().to_string();
            if known_files.contains(&candidate) {
                return Some(candidate);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consent::InMemoryConsentRegistry;
    use crate::embeddings::HashEmbeddingProvider;
    use crate::usage::UsageStats;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Default)]
    struct InMemoryStore {
        items: Mutex<HashMap<Uuid, (MemoryUnit, Vec<f32>)>>,
    }

    #[async_trait]
    impl VectorStore for InMemoryStore {
        async fn store(&self, memory: MemoryUnit, vector: Vec<f32>) -> Result<Uuid> {
            let id = memory.id;
            self.items.lock().insert(id, (memory, vector));
            Ok(id)
        }

        async fn retrieve(&self, query_vector: &[f32], filters: &MemoryFilters, limit: usize) -> Result<Vec<ScoredMemory>> {
            let items = self.items.lock();
            let mut scored: Vec<ScoredMemory> = items
                .values()
                .filter(|(m, _)| filters.project_name.is_none() || m.project_name == filters.project_name)
                .filter(|(m, _)| filters.category.is_none() || Some(m.category) == filters.category)
                .map(|(m, v)| ScoredMemory { memory: m.clone(), score: cosine_similarity(query_vector, v) })
                .collect();
            scored.sort_by(|a, b| b.score.total_cmp(&a.score));
            scored.truncate(limit);
            Ok(scored)
        }

        async fn retrieve_by_id(&self, id: Uuid) -> Result<Option<MemoryUnit>> {
            Ok(self.items.lock().get(&id).map(|(m, _)| m.clone()))
        }

        async fn update(&self, id: Uuid, fields: serde_json::Value, new_vector: Option<Vec<f32>>) -> Result<bool> {
            let mut items = self.items.lock();
            let Some((memory, vector)) = items.get_mut(&id) else { return Ok(false) };
            if let Some(obj) = fields.as_object() {
                if let Some(content) = obj.get("content").and_then(|v| v.as_str()) {
                    memory.content = content.to_string();
                }
            }
            if let Some(v) = new_vector {
                *vector = v;
            }
            Ok(true)
        }

        async fn delete(&self, id: Uuid) -> Result<bool> {
            Ok(self.items.lock().remove(&id).is_some())
        }

        async fn delete_code_units_by_project(&self, project: &str) -> Result<usize> {
            let mut items = self.items.lock();
            let before = items.len();
            items.retain(|_, (m, _)| m.project_name.as_deref() != Some(project));
            Ok(before - items.len())
        }

        async fn list(&self, filters: &MemoryFilters, _sort_by: SortBy, _sort_order: SortOrder, limit: usize, offset: usize) -> Result<Page<MemoryUnit>> {
            let items = self.items.lock();
            let mut all: Vec<MemoryUnit> = items
                .values()
                .filter(|(m, _)| filters.project_name.is_none() || m.project_name == filters.project_name)
                .map(|(m, _)| m.clone())
                .collect();
            all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            let total = all.len();
            let page = all.into_iter().skip(offset).take(limit).collect();
            Ok(Page { items: page, total })
        }

        async fn count(&self, _filters: &MemoryFilters) -> Result<usize> {
            Ok(self.items.lock().len())
        }

        async fn health_check(&self) -> bool {
            true
        }

        async fn get_indexed_files(&self, _project: &str) -> Result<Vec<String>> {
            Ok(vec![])
        }

        async fn list_indexed_units(&self, project: &str) -> Result<Vec<MemoryUnit>> {
            Ok(self
                .items
                .lock()
                .values()
                .filter(|(m, _)| m.project_name.as_deref() == Some(project))
                .map(|(m, _)| m.clone())
                .collect())
        }
    }

    #[derive(Default)]
    struct InMemoryUsageBackingStore {
        stats: Mutex<HashMap<Uuid, UsageStats>>,
    }

    #[async_trait]
    impl UsageBackingStore for InMemoryUsageBackingStore {
        async fn batch_update_usage(&self, batch: Vec<(Uuid, UsageStats)>) -> Result<()> {
            self.stats.lock().extend(batch);
            Ok(())
        }

        async fn get_usage_stats(&self, id: Uuid) -> Result<Option<UsageStats>> {
            Ok(self.stats.lock().get(&id).cloned())
        }
    }

    #[derive(Default)]
    struct NoopFeedbackStore;

    #[async_trait]
    impl FeedbackStore for NoopFeedbackStore {
        async fn record_feedback(&self, _feedback: feedback::SearchFeedback) -> Result<()> {
            Ok(())
        }

        async fn feedback_for(&self, _memory_id: Option<Uuid>) -> Result<Vec<feedback::SearchFeedback>> {
            Ok(vec![])
        }
    }

    fn build_orchestrator() -> RetrievalOrchestrator {
        RetrievalOrchestrator::new(
            EngineConfig::default(),
            Arc::new(InMemoryStore::default()),
            Arc::new(EmbeddingCache::new(100, chrono::Duration::hours(1))),
            Arc::new(HashEmbeddingProvider::new("hash-v1")),
            Arc::new(UsageTracker::new(1000, UsageWeights::default())),
            Arc::new(InMemoryUsageBackingStore::default()),
            Arc::new(ConversationTracker::default()),
            Arc::new(InMemoryConsentRegistry::new()),
            Arc::new(NoopFeedbackStore),
            None,
            None,
        )
    }

    #[tokio::test]
    async fn store_then_retrieve_round_trips() {
        let orchestrator = build_orchestrator();
        orchestrator
            .store_memory(
                "I prefer tabs over spaces".to_string(),
                MemoryCategory::Preference,
                Scope::Global,
                None,
                0.8,
                BTreeSet::new(),
                BTreeMap::new(),
                None,
            )
            .await
            .unwrap();
        let response = orchestrator
            .retrieve_memories("tabs spaces preference", 5, MemoryFilters::default(), None, SearchMode::Semantic)
            .await
            .unwrap();
        assert_eq!(response.results.len(), 1);
    }

    #[tokio::test]
    async fn read_only_mode_rejects_store_memory() {
        let orchestrator = build_orchestrator();
        orchestrator.config.write().read_only_mode = true;
        let result = orchestrator
            .store_memory(
                "won't be written".to_string(),
                MemoryCategory::Fact,
                Scope::Global,
                None,
                0.5,
                BTreeSet::new(),
                BTreeMap::new(),
                None,
            )
            .await;
        assert!(matches!(result, Err(Error::ReadOnly(_))));
    }

    #[tokio::test]
    async fn session_dedup_hides_previously_shown_results() {
        let orchestrator = build_orchestrator();
        let id_a = orchestrator
            .store_memory(
                "working on the authentication module".to_string(),
                MemoryCategory::Context,
                Scope::Global,
                None,
                0.7,
                BTreeSet::new(),
                BTreeMap::new(),
                None,
            )
            .await
            .unwrap();
        orchestrator
            .store_memory(
                "working on the billing module".to_string(),
                MemoryCategory::Context,
                Scope::Global,
                None,
                0.7,
                BTreeSet::new(),
                BTreeMap::new(),
                None,
            )
            .await
            .unwrap();

        let session = orchestrator.start_conversation_session(None);
        let first = orchestrator
            .retrieve_memories("working on module", 1, MemoryFilters::default(), Some(session), SearchMode::Semantic)
            .await
            .unwrap();
        assert_eq!(first.results.len(), 1);
        let first_id = first.results[0].memory.id;

        let second = orchestrator
            .retrieve_memories("working on module", 1, MemoryFilters::default(), Some(session), SearchMode::Semantic)
            .await
            .unwrap();
        assert_eq!(second.results.len(), 1);
        assert_ne!(second.results[0].memory.id, first_id);
        let _ = id_a;
    }

    #[tokio::test]
    async fn merge_memories_combines_content_and_deletes_the_rest() {
        let orchestrator = build_orchestrator();
        let a = orchestrator
            .store_memory("part one".to_string(), MemoryCategory::Fact, Scope::Global, None, 0.5, BTreeSet::new(), BTreeMap::new(), None)
            .await
            .unwrap();
        let b = orchestrator
            .store_memory("part two".to_string(), MemoryCategory::Fact, Scope::Global, None, 0.5, BTreeSet::new(), BTreeMap::new(), None)
            .await
            .unwrap();

        let merged = orchestrator.merge_memories(&[a, b], Some(a)).await.unwrap();
        assert_eq!(merged, a);
        assert!(orchestrator.get_memory_by_id(b).await.unwrap().is_none());
        let kept = orchestrator.get_memory_by_id(a).await.unwrap().unwrap();
        assert!(kept.content.contains("part one") && kept.content.contains("part two"));
    }

    #[tokio::test]
    async fn export_then_import_round_trips_ids_and_content() {
        let orchestrator = build_orchestrator();
        orchestrator
            .store_memory("exportable fact".to_string(), MemoryCategory::Fact, Scope::Global, None, 0.5, BTreeSet::new(), BTreeMap::new(), None)
            .await
            .unwrap();
        let exported = orchestrator.export_memories(MemoryFilters::default()).await.unwrap();
        assert_eq!(exported.len(), 1);

        let fresh = build_orchestrator();
        let imported = fresh.import_memories(exported.clone(), true).await.unwrap();
        assert_eq!(imported, 1);
        let round_tripped = fresh.get_memory_by_id(exported[0].id).await.unwrap().unwrap();
        assert_eq!(round_tripped.content, exported[0].content);
    }
}
