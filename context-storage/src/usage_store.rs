//! `UsageBackingStore` implementation: the durable sink the write-behind
//! `UsageTracker` flushes its batches into (§4.4).

use crate::tables::{with_db_timeout, USAGE_TABLE};
use crate::RedbStore;
use async_trait::async_trait;
use context_core::error::Error;
use context_core::usage::{UsageBackingStore, UsageStats};
use redb::ReadableTable;
use std::sync::Arc;
use uuid::Uuid;

pub struct RedbUsageBackingStore {
    store: RedbStore,
}

impl RedbUsageBackingStore {
    #[must_use]
    pub fn new(store: RedbStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl UsageBackingStore for RedbUsageBackingStore {
    async fn batch_update_usage(&self, batch: Vec<(Uuid, UsageStats)>) -> context_core::Result<()> {
        let db = Arc::clone(&self.store.db);
        with_db_timeout(move || {
            let write_txn = db.begin_write().map_err(|e| {
                Error::storage(format!("failed to begin write transaction: {e}"), "retry the request")
            })?;
            {
                let mut table = write_txn
                    .open_table(USAGE_TABLE)
                    .map_err(|e| Error::storage(format!("failed to open usage table: {e}"), "retry the request"))?;
                for (id, stats) in batch {
                    let bytes = postcard::to_allocvec(&stats).map_err(|e| {
                        Error::storage(format!("failed to serialize usage stats: {e}"), "report this as a bug")
                    })?;
                    table
                        .insert(id.to_string().as_str(), bytes.as_slice())
                        .map_err(|e| Error::storage(format!("failed to insert usage stats: {e}"), "retry the request"))?;
                }
            }
            write_txn
                .commit()
                .map_err(|e| Error::storage(format!("failed to commit transaction: {e}"), "retry the request"))?;
            Ok::<(), Error>(())
        })
        .await
    }

    async fn get_usage_stats(&self, id: Uuid) -> context_core::Result<Option<UsageStats>> {
        let db = Arc::clone(&self.store.db);
        let key = id.to_string();
        with_db_timeout(move || {
            let read_txn = db.begin_read().map_err(|e| {
                Error::retrieval(format!("failed to begin read transaction: {e}"), "retry the request")
            })?;
            let table = read_txn
                .open_table(USAGE_TABLE)
                .map_err(|e| Error::retrieval(format!("failed to open usage table: {e}"), "retry the request"))?;
            match table
                .get(key.as_str())
                .map_err(|e| Error::retrieval(format!("failed to get usage stats: {e}"), "retry the request"))?
            {
                Some(guard) => {
                    let stats = postcard::from_bytes(guard.value()).map_err(|e| {
                        Error::retrieval(format!("failed to deserialize usage stats: {e}"), "the on-disk format may be from an incompatible version")
                    })?;
                    Ok(Some(stats))
                }
                None => Ok(None),
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn batch_update_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbStore::open(&dir.path().join("usage.redb")).await.unwrap();
        let backing = RedbUsageBackingStore::new(store);
        let id = Uuid::new_v4();
        let stats = UsageStats {
            first_seen: Utc::now(),
            last_used: Utc::now(),
            use_count: 3,
            last_search_score: 0.8,
        };
        backing.batch_update_usage(vec![(id, stats.clone())]).await.unwrap();
        let fetched = backing.get_usage_stats(id).await.unwrap().unwrap();
        assert_eq!(fetched.use_count, 3);
    }

    #[tokio::test]
    async fn missing_id_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbStore::open(&dir.path().join("usage.redb")).await.unwrap();
        let backing = RedbUsageBackingStore::new(store);
        assert!(backing.get_usage_stats(Uuid::new_v4()).await.unwrap().is_none());
    }
}
