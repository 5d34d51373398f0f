//! `VectorStore` implementation over a `redb` database.
//!
//! `retrieve`/`list`/`count` are a full table scan filtered in memory —
//! the same tradeoff the teacher's `query_episodes_by_metadata` makes, and
//! acceptable at the moderate corpus sizes this engine targets (§9 Design
//! Notes: "a remote ANN service" is the upgrade path if that changes).

use crate::filter_match;
use crate::tables::{with_db_timeout, MEMORIES_TABLE, VECTORS_TABLE};
use crate::RedbStore;
use async_trait::async_trait;
use context_core::error::Error;
use context_core::store::{cosine_similarity, VectorStore};
use context_core::types::{CodeUnitMetadata, ContextLevel, Lifecycle, MemoryCategory, MemoryFilters, MemoryUnit, Page, Provenance, Scope, ScoredMemory, SortBy, SortOrder};
use redb::ReadableTable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Payloads over this size are logged; they are still stored, but a
/// consistently large payload usually means a caller is storing whole
/// files instead of extracted units.
const LARGE_PAYLOAD_BYTES: usize = 100_000;

/// On-disk row shape for a [`MemoryUnit`].
///
/// `postcard` is not self-describing and rejects `serde_json::Value`'s
/// `deserialize_any` dispatch, so `MemoryUnit.metadata` (a free-form
/// `BTreeMap<String, Value>`) can't round-trip through it directly. This
/// row carries that field pre-encoded as JSON bytes instead, and every
/// other field goes through postcard as before.
#[derive(Serialize, Deserialize)]
struct StoredMemoryUnit {
    id: Uuid,
    content: String,
    category: MemoryCategory,
    context_level: ContextLevel,
    scope: Scope,
    project_name: Option<String>,
    importance: f32,
    tags: BTreeSet<String>,
    metadata_json: Vec<u8>,
    lifecycle_state: Lifecycle,
    embedding_model: String,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
    last_accessed: chrono::DateTime<chrono::Utc>,
    provenance: Provenance,
    code_metadata: Option<CodeUnitMetadata>,
}

fn serialize_memory(memory: &MemoryUnit) -> context_core::Result<Vec<u8>> {
    let metadata_json = serde_json::to_vec(&memory.metadata)
        .map_err(|e| Error::storage(format!("failed to encode memory metadata: {e}"), "report this as a bug"))?;
    let row = StoredMemoryUnit {
        id: memory.id,
        content: memory.content.clone(),
        category: memory.category,
        context_level: memory.context_level,
        scope: memory.scope,
        project_name: memory.project_name.clone(),
        importance: memory.importance,
        tags: memory.tags.clone(),
        metadata_json,
        lifecycle_state: memory.lifecycle_state,
        embedding_model: memory.embedding_model.clone(),
        created_at: memory.created_at,
        updated_at: memory.updated_at,
        last_accessed: memory.last_accessed,
        provenance: memory.provenance.clone(),
        code_metadata: memory.code_metadata.clone(),
    };
    postcard::to_allocvec(&row)
        .map_err(|e| Error::storage(format!("failed to serialize memory unit: {e}"), "report this as a bug"))
}

fn deserialize_memory(bytes: &[u8]) -> context_core::Result<MemoryUnit> {
    let row: StoredMemoryUnit = postcard::from_bytes(bytes).map_err(|e| {
        Error::storage(format!("failed to deserialize memory unit: {e}"), "the on-disk format may be from an incompatible version")
    })?;
    let metadata = serde_json::from_slice(&row.metadata_json)
        .map_err(|e| Error::storage(format!("failed to decode memory metadata: {e}"), "the on-disk format may be from an incompatible version"))?;
    Ok(MemoryUnit {
        id: row.id,
        content: row.content,
        category: row.category,
        context_level: row.context_level,
        scope: row.scope,
        project_name: row.project_name,
        importance: row.importance,
        tags: row.tags,
        metadata,
        lifecycle_state: row.lifecycle_state,
        embedding_model: row.embedding_model,
        created_at: row.created_at,
        updated_at: row.updated_at,
        last_accessed: row.last_accessed,
        provenance: row.provenance,
        code_metadata: row.code_metadata,
    })
}

fn serialize_vector(vector: &[f32]) -> context_core::Result<Vec<u8>> {
    postcard::to_allocvec(vector)
        .map_err(|e| Error::storage(format!("failed to serialize embedding: {e}"), "report this as a bug"))
}

fn deserialize_vector(bytes: &[u8]) -> context_core::Result<Vec<f32>> {
    postcard::from_bytes(bytes)
        .map_err(|e| Error::storage(format!("failed to deserialize embedding: {e}"), "the on-disk format may be from an incompatible version"))
}

#[async_trait]
impl VectorStore for RedbStore {
    async fn store(&self, memory: MemoryUnit, vector: Vec<f32>) -> context_core::Result<Uuid> {
        let id = memory.id;
        let memory_bytes = serialize_memory(&memory)?;
        if memory_bytes.len() > LARGE_PAYLOAD_BYTES {
            warn!(memory_id = %id, bytes = memory_bytes.len(), "storing an unusually large memory payload");
        }
        let vector_bytes = serialize_vector(&vector)?;
        let db = Arc::clone(&self.db);
        let key = id.to_string();
        with_db_timeout(move || {
            let write_txn = db.begin_write().map_err(|e| {
                Error::storage(format!("failed to begin write transaction: {e}"), "retry the request")
            })?;
            {
                let mut memories = write_txn
                    .open_table(MEMORIES_TABLE)
                    .map_err(|e| Error::storage(format!("failed to open memories table: {e}"), "retry the request"))?;
                memories
                    .insert(key.as_str(), memory_bytes.as_slice())
                    .map_err(|e| Error::storage(format!("failed to insert memory: {e}"), "retry the request"))?;
                let mut vectors = write_txn
                    .open_table(VECTORS_TABLE)
                    .map_err(|e| Error::storage(format!("failed to open vectors table: {e}"), "retry the request"))?;
                vectors
                    .insert(key.as_str(), vector_bytes.as_slice())
                    .map_err(|e| Error::storage(format!("failed to insert vector: {e}"), "retry the request"))?;
            }
            write_txn
                .commit()
                .map_err(|e| Error::storage(format!("failed to commit transaction: {e}"), "retry the request"))?;
            Ok::<(), Error>(())
        })
        .await?;
        Ok(id)
    }

    async fn retrieve(
        &self,
        query_vector: &[f32],
        filters: &MemoryFilters,
        limit: usize,
    ) -> context_core::Result<Vec<ScoredMemory>> {
        let query_vector = query_vector.to_vec();
        let filters = filters.clone();
        let db = Arc::clone(&self.db);
        with_db_timeout(move || {
            let read_txn = db.begin_read().map_err(|e| {
                Error::retrieval(format!("failed to begin read transaction: {e}"), "retry the request")
            })?;
            let memories = read_txn
                .open_table(MEMORIES_TABLE)
                .map_err(|e| Error::retrieval(format!("failed to open memories table: {e}"), "retry the request"))?;
            let vectors = read_txn
                .open_table(VECTORS_TABLE)
                .map_err(|e| Error::retrieval(format!("failed to open vectors table: {e}"), "retry the request"))?;

            let mut scored = Vec::new();
            let iter = memories
                .iter()
                .map_err(|e| Error::retrieval(format!("failed to iterate memories: {e}"), "retry the request"))?;
            for entry in iter {
                let (key, value) = entry
                    .map_err(|e| Error::retrieval(format!("failed to read memory entry: {e}"), "retry the request"))?;
                let memory = deserialize_memory(value.value())?;
                if !filter_match::matches(&memory, &filters) {
                    continue;
                }
                let Some(vector_guard) = vectors.get(key.value()).map_err(|e| {
                    Error::retrieval(format!("failed to read vector entry: {e}"), "retry the request")
                })?
                else {
                    continue;
                };
                let vector = deserialize_vector(vector_guard.value())?;
                let score = cosine_similarity(&query_vector, &vector);
                scored.push(ScoredMemory { memory, score });
            }
            scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
            scored.truncate(limit);
            Ok(scored)
        })
        .await
    }

    async fn retrieve_by_id(&self, id: Uuid) -> context_core::Result<Option<MemoryUnit>> {
        let db = Arc::clone(&self.db);
        let key = id.to_string();
        with_db_timeout(move || {
            let read_txn = db.begin_read().map_err(|e| {
                Error::retrieval(format!("failed to begin read transaction: {e}"), "retry the request")
            })?;
            let memories = read_txn
                .open_table(MEMORIES_TABLE)
                .map_err(|e| Error::retrieval(format!("failed to open memories table: {e}"), "retry the request"))?;
            match memories
                .get(key.as_str())
                .map_err(|e| Error::retrieval(format!("failed to get memory: {e}"), "retry the request"))?
            {
                Some(guard) => Ok(Some(deserialize_memory(guard.value())?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn update(
        &self,
        id: Uuid,
        fields: serde_json::Value,
        new_vector: Option<Vec<f32>>,
    ) -> context_core::Result<bool> {
        let db = Arc::clone(&self.db);
        let key = id.to_string();
        with_db_timeout(move || {
            let write_txn = db.begin_write().map_err(|e| {
                Error::storage(format!("failed to begin write transaction: {e}"), "retry the request")
            })?;
            let updated = {
                let mut memories = write_txn
                    .open_table(MEMORIES_TABLE)
                    .map_err(|e| Error::storage(format!("failed to open memories table: {e}"), "retry the request"))?;
                let existing = match memories
                    .get(key.as_str())
                    .map_err(|e| Error::storage(format!("failed to get memory: {e}"), "retry the request"))?
                {
                    Some(guard) => deserialize_memory(guard.value())?,
                    None => return Ok::<bool, Error>(false),
                };
                let mut merged = serde_json::to_value(&existing).map_err(|e| {
                    Error::storage(format!("failed to encode memory for merge: {e}"), "report this as a bug")
                })?;
                if let (Some(target), Some(patch)) = (merged.as_object_mut(), fields.as_object()) {
                    for (k, v) in patch {
                        target.insert(k.clone(), v.clone());
                    }
                    target.insert(
                        "updated_at".to_string(),
                        serde_json::to_value(chrono::Utc::now()).unwrap_or(serde_json::Value::Null),
                    );
                }
                let new_memory: MemoryUnit = serde_json::from_value(merged).map_err(|e| {
                    Error::storage(format!("failed to decode merged memory: {e}"), "check the update payload shape")
                })?;
                let bytes = serialize_memory(&new_memory)?;
                memories
                    .insert(key.as_str(), bytes.as_slice())
                    .map_err(|e| Error::storage(format!("failed to insert memory: {e}"), "retry the request"))?;
                true
            };
            if updated {
                if let Some(vector) = &new_vector {
                    let mut vectors = write_txn
                        .open_table(VECTORS_TABLE)
                        .map_err(|e| Error::storage(format!("failed to open vectors table: {e}"), "retry the request"))?;
                    let bytes = serialize_vector(vector)?;
                    vectors
                        .insert(key.as_str(), bytes.as_slice())
                        .map_err(|e| Error::storage(format!("failed to insert vector: {e}"), "retry the request"))?;
                }
            }
            write_txn
                .commit()
                .map_err(|e| Error::storage(format!("failed to commit transaction: {e}"), "retry the request"))?;
            Ok(updated)
        })
        .await
    }

    async fn delete(&self, id: Uuid) -> context_core::Result<bool> {
        let db = Arc::clone(&self.db);
        let key = id.to_string();
        with_db_timeout(move || {
            let write_txn = db.begin_write().map_err(|e| {
                Error::storage(format!("failed to begin write transaction: {e}"), "retry the request")
            })?;
            let existed = {
                let mut memories = write_txn
                    .open_table(MEMORIES_TABLE)
                    .map_err(|e| Error::storage(format!("failed to open memories table: {e}"), "retry the request"))?;
                memories
                    .remove(key.as_str())
                    .map_err(|e| Error::storage(format!("failed to remove memory: {e}"), "retry the request"))?
                    .is_some()
            };
            {
                let mut vectors = write_txn
                    .open_table(VECTORS_TABLE)
                    .map_err(|e| Error::storage(format!("failed to open vectors table: {e}"), "retry the request"))?;
                vectors
                    .remove(key.as_str())
                    .map_err(|e| Error::storage(format!("failed to remove vector: {e}"), "retry the request"))?;
            }
            write_txn
                .commit()
                .map_err(|e| Error::storage(format!("failed to commit transaction: {e}"), "retry the request"))?;
            Ok(existed)
        })
        .await
    }

    async fn delete_code_units_by_project(&self, project: &str) -> context_core::Result<usize> {
        let project = project.to_string();
        let db = Arc::clone(&self.db);
        with_db_timeout(move || {
            let write_txn = db.begin_write().map_err(|e| {
                Error::storage(format!("failed to begin write transaction: {e}"), "retry the request")
            })?;
            let mut to_delete = Vec::new();
            {
                let memories = write_txn
                    .open_table(MEMORIES_TABLE)
                    .map_err(|e| Error::storage(format!("failed to open memories table: {e}"), "retry the request"))?;
                let iter = memories
                    .iter()
                    .map_err(|e| Error::storage(format!("failed to iterate memories: {e}"), "retry the request"))?;
                for entry in iter {
                    let (key, value) = entry.map_err(|e| {
                        Error::storage(format!("failed to read memory entry: {e}"), "retry the request")
                    })?;
                    let memory = deserialize_memory(value.value())?;
                    if memory.is_code_unit() && memory.project_name.as_deref() == Some(project.as_str()) {
                        to_delete.push(key.value().to_string());
                    }
                }
            }
            {
                let mut memories = write_txn
                    .open_table(MEMORIES_TABLE)
                    .map_err(|e| Error::storage(format!("failed to open memories table: {e}"), "retry the request"))?;
                let mut vectors = write_txn
                    .open_table(VECTORS_TABLE)
                    .map_err(|e| Error::storage(format!("failed to open vectors table: {e}"), "retry the request"))?;
                for key in &to_delete {
                    memories
                        .remove(key.as_str())
                        .map_err(|e| Error::storage(format!("failed to remove memory: {e}"), "retry the request"))?;
                    vectors
                        .remove(key.as_str())
                        .map_err(|e| Error::storage(format!("failed to remove vector: {e}"), "retry the request"))?;
                }
            }
            write_txn
                .commit()
                .map_err(|e| Error::storage(format!("failed to commit transaction: {e}"), "retry the request"))?;
            Ok(to_delete.len())
        })
        .await
    }

    async fn list(
        &self,
        filters: &MemoryFilters,
        sort_by: SortBy,
        sort_order: SortOrder,
        limit: usize,
        offset: usize,
    ) -> context_core::Result<Page<MemoryUnit>> {
        if limit == 0 || limit > context_core::constants::MAX_LIST_LIMIT {
            return Err(Error::validation(format!(
                "limit must be in 1..={}, got {limit}",
                context_core::constants::MAX_LIST_LIMIT
            )));
        }
        let filters = filters.clone();
        let db = Arc::clone(&self.db);
        with_db_timeout(move || {
            let read_txn = db.begin_read().map_err(|e| {
                Error::retrieval(format!("failed to begin read transaction: {e}"), "retry the request")
            })?;
            let memories = read_txn
                .open_table(MEMORIES_TABLE)
                .map_err(|e| Error::retrieval(format!("failed to open memories table: {e}"), "retry the request"))?;
            let mut matched = Vec::new();
            let iter = memories
                .iter()
                .map_err(|e| Error::retrieval(format!("failed to iterate memories: {e}"), "retry the request"))?;
            for entry in iter {
                let (_, value) = entry
                    .map_err(|e| Error::retrieval(format!("failed to read memory entry: {e}"), "retry the request"))?;
                let memory = deserialize_memory(value.value())?;
                if filter_match::matches(&memory, &filters) {
                    matched.push(memory);
                }
            }
            sort_memories(&mut matched, sort_by, sort_order);
            let total = matched.len();
            let items = matched.into_iter().skip(offset).take(limit).collect();
            Ok(Page { items, total })
        })
        .await
    }

    async fn count(&self, filters: &MemoryFilters) -> context_core::Result<usize> {
        let filters = filters.clone();
        let db = Arc::clone(&self.db);
        with_db_timeout(move || {
            let read_txn = db.begin_read().map_err(|e| {
                Error::retrieval(format!("failed to begin read transaction: {e}"), "retry the request")
            })?;
            let memories = read_txn
                .open_table(MEMORIES_TABLE)
                .map_err(|e| Error::retrieval(format!("failed to open memories table: {e}"), "retry the request"))?;
            let mut count = 0usize;
            let iter = memories
                .iter()
                .map_err(|e| Error::retrieval(format!("failed to iterate memories: {e}"), "retry the request"))?;
            for entry in iter {
                let (_, value) = entry
                    .map_err(|e| Error::retrieval(format!("failed to read memory entry: {e}"), "retry the request"))?;
                let memory = deserialize_memory(value.value())?;
                if filter_match::matches(&memory, &filters) {
                    count += 1;
                }
            }
            Ok(count)
        })
        .await
    }

    async fn health_check(&self) -> bool {
        self.is_healthy().await
    }

    async fn get_indexed_files(&self, project: &str) -> context_core::Result<Vec<String>> {
        let project = project.to_string();
        let db = Arc::clone(&self.db);
        with_db_timeout(move || {
            let read_txn = db.begin_read().map_err(|e| {
                Error::retrieval(format!("failed to begin read transaction: {e}"), "retry the request")
            })?;
            let memories = read_txn
                .open_table(MEMORIES_TABLE)
                .map_err(|e| Error::retrieval(format!("failed to open memories table: {e}"), "retry the request"))?;
            let mut files = std::collections::BTreeSet::new();
            let iter = memories
                .iter()
                .map_err(|e| Error::retrieval(format!("failed to iterate memories: {e}"), "retry the request"))?;
            for entry in iter {
                let (_, value) = entry
                    .map_err(|e| Error::retrieval(format!("failed to read memory entry: {e}"), "retry the request"))?;
                let memory = deserialize_memory(value.value())?;
                if memory.project_name.as_deref() == Some(project.as_str()) {
                    if let Some(meta) = &memory.code_metadata {
                        files.insert(meta.file_path.clone());
                    }
                }
            }
            Ok(files.into_iter().collect())
        })
        .await
    }

    async fn list_indexed_units(&self, project: &str) -> context_core::Result<Vec<MemoryUnit>> {
        let project = project.to_string();
        let db = Arc::clone(&self.db);
        with_db_timeout(move || {
            let read_txn = db.begin_read().map_err(|e| {
                Error::retrieval(format!("failed to begin read transaction: {e}"), "retry the request")
            })?;
            let memories = read_txn
                .open_table(MEMORIES_TABLE)
                .map_err(|e| Error::retrieval(format!("failed to open memories table: {e}"), "retry the request"))?;
            let mut units = Vec::new();
            let iter = memories
                .iter()
                .map_err(|e| Error::retrieval(format!("failed to iterate memories: {e}"), "retry the request"))?;
            for entry in iter {
                let (_, value) = entry
                    .map_err(|e| Error::retrieval(format!("failed to read memory entry: {e}"), "retry the request"))?;
                let memory = deserialize_memory(value.value())?;
                if memory.is_code_unit() && memory.project_name.as_deref() == Some(project.as_str()) {
                    units.push(memory);
                }
            }
            Ok(units)
        })
        .await
    }
}

fn sort_memories(memories: &mut [MemoryUnit], sort_by: SortBy, sort_order: SortOrder) {
    memories.sort_by(|a, b| {
        let ordering = match sort_by {
            SortBy::CreatedAt => a.created_at.cmp(&b.created_at),
            SortBy::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            SortBy::Importance => a.importance.partial_cmp(&b.importance).unwrap_or(std::cmp::Ordering::Equal),
        };
        match sort_order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use context_core::types::{ContextLevel, Lifecycle, MemoryCategory, Provenance, Scope};
    use std::collections::{BTreeMap, BTreeSet};

    fn sample_memory(content: &str) -> MemoryUnit {
        let now = chrono::Utc::now();
        MemoryUnit {
            id: Uuid::new_v4(),
            content: content.to_string(),
            category: MemoryCategory::Fact,
            context_level: ContextLevel::ProjectContext,
            scope: Scope::Global,
            project_name: None,
            importance: 0.5,
            tags: BTreeSet::new(),
            metadata: BTreeMap::new(),
            lifecycle_state: Lifecycle::Active,
            embedding_model: "hash-v1".to_string(),
            created_at: now,
            updated_at: now,
            last_accessed: now,
            provenance: Provenance::default(),
            code_metadata: None,
        }
    }

    #[tokio::test]
    async fn store_then_retrieve_by_id_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbStore::open(&dir.path().join("test.redb")).await.unwrap();
        let memory = sample_memory("hello world");
        let id = store.store(memory.clone(), vec![1.0, 0.0, 0.0]).await.unwrap();
        let fetched = store.retrieve_by_id(id).await.unwrap().unwrap();
        assert_eq!(fetched.content, "hello world");
    }

    #[tokio::test]
    async fn retrieve_ranks_by_cosine_similarity() {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbStore::open(&dir.path().join("test.redb")).await.unwrap();
        store.store(sample_memory("close"), vec![1.0, 0.0]).await.unwrap();
        store.store(sample_memory("far"), vec![0.0, 1.0]).await.unwrap();
        let results = store
            .retrieve(&[1.0, 0.0], &MemoryFilters::default(), 10)
            .await
            .unwrap();
        assert_eq!(results[0].memory.content, "close");
    }

    #[tokio::test]
    async fn delete_removes_memory_and_vector() {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbStore::open(&dir.path().join("test.redb")).await.unwrap();
        let id = store.store(sample_memory("gone soon"), vec![1.0]).await.unwrap();
        assert!(store.delete(id).await.unwrap());
        assert!(store.retrieve_by_id(id).await.unwrap().is_none());
        assert!(!store.delete(id).await.unwrap());
    }

    #[tokio::test]
    async fn update_merges_fields_and_bumps_updated_at() {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbStore::open(&dir.path().join("test.redb")).await.unwrap();
        let memory = sample_memory("original");
        let id = store.store(memory.clone(), vec![1.0]).await.unwrap();
        let updated = store
            .update(id, serde_json::json!({"importance": 0.9}), None)
            .await
            .unwrap();
        assert!(updated);
        let fetched = store.retrieve_by_id(id).await.unwrap().unwrap();
        assert!((fetched.importance - 0.9).abs() < 1e-6);
        assert!(fetched.updated_at > memory.updated_at);
    }

    #[tokio::test]
    async fn list_respects_limit_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbStore::open(&dir.path().join("test.redb")).await.unwrap();
        let result = store
            .list(&MemoryFilters::default(), SortBy::CreatedAt, SortOrder::Ascending, 0, 0)
            .await;
        assert!(result.is_err());
    }
}
