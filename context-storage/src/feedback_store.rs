//! `FeedbackStore` implementation: durable search-feedback records backing
//! `submit_search_feedback` / `get_quality_metrics` (§4.9).

use crate::tables::{with_db_timeout, FEEDBACK_TABLE};
use crate::RedbStore;
use async_trait::async_trait;
use context_core::error::Error;
use context_core::feedback::{FeedbackStore, SearchFeedback};
use redb::ReadableTable;
use std::sync::Arc;
use uuid::Uuid;

pub struct RedbFeedbackStore {
    store: RedbStore,
}

impl RedbFeedbackStore {
    #[must_use]
    pub fn new(store: RedbStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl FeedbackStore for RedbFeedbackStore {
    async fn record_feedback(&self, feedback: SearchFeedback) -> context_core::Result<()> {
        let db = Arc::clone(&self.store.db);
        let record_id = Uuid::new_v4().to_string();
        with_db_timeout(move || {
            let bytes = postcard::to_allocvec(&feedback).map_err(|e| {
                Error::storage(format!("failed to serialize feedback: {e}"), "report this as a bug")
            })?;
            let write_txn = db.begin_write().map_err(|e| {
                Error::storage(format!("failed to begin write transaction: {e}"), "retry the request")
            })?;
            {
                let mut table = write_txn
                    .open_table(FEEDBACK_TABLE)
                    .map_err(|e| Error::storage(format!("failed to open feedback table: {e}"), "retry the request"))?;
                table
                    .insert(record_id.as_str(), bytes.as_slice())
                    .map_err(|e| Error::storage(format!("failed to insert feedback: {e}"), "retry the request"))?;
            }
            write_txn
                .commit()
                .map_err(|e| Error::storage(format!("failed to commit transaction: {e}"), "retry the request"))?;
            Ok::<(), Error>(())
        })
        .await
    }

    async fn feedback_for(&self, memory_id: Option<Uuid>) -> context_core::Result<Vec<SearchFeedback>> {
        let db = Arc::clone(&self.store.db);
        with_db_timeout(move || {
            let read_txn = db.begin_read().map_err(|e| {
                Error::retrieval(format!("failed to begin read transaction: {e}"), "retry the request")
            })?;
            let table = read_txn
                .open_table(FEEDBACK_TABLE)
                .map_err(|e| Error::retrieval(format!("failed to open feedback table: {e}"), "retry the request"))?;
            let mut records = Vec::new();
            let iter = table
                .iter()
                .map_err(|e| Error::retrieval(format!("failed to iterate feedback table: {e}"), "retry the request"))?;
            for entry in iter {
                let (_, value) = entry
                    .map_err(|e| Error::retrieval(format!("failed to read feedback entry: {e}"), "retry the request"))?;
                let record: SearchFeedback = postcard::from_bytes(value.value()).map_err(|e| {
                    Error::retrieval(format!("failed to deserialize feedback: {e}"), "the on-disk format may be from an incompatible version")
                })?;
                if memory_id.is_none_or(|id| record.memory_id == id) {
                    records.push(record);
                }
            }
            Ok(records)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn records_filter_by_memory_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbStore::open(&dir.path().join("feedback.redb")).await.unwrap();
        let feedback_store = RedbFeedbackStore::new(store);
        let id_a = Uuid::new_v4();
        let id_b = Uuid::new_v4();
        feedback_store
            .record_feedback(SearchFeedback {
                memory_id: id_a,
                query: "q1".to_string(),
                helpful: true,
                submitted_at: Utc::now(),
            })
            .await
            .unwrap();
        feedback_store
            .record_feedback(SearchFeedback {
                memory_id: id_b,
                query: "q2".to_string(),
                helpful: false,
                submitted_at: Utc::now(),
            })
            .await
            .unwrap();
        let for_a = feedback_store.feedback_for(Some(id_a)).await.unwrap();
        assert_eq!(for_a.len(), 1);
        let all = feedback_store.feedback_for(None).await.unwrap();
        assert_eq!(all.len(), 2);
    }
}
