//! Durable spill-over for the in-memory embedding cache (§4.2), so cached
//! vectors survive process restarts instead of re-embedding from scratch on
//! every cold start. Snapshots are `postcard`-encoded and `lz4_flex`-compressed,
//! the same pairing the teacher's cache-persistence module uses for its own
//! on-disk snapshots.

use crate::tables::EMBEDDING_CACHE_TABLE;
use crate::RedbStore;
use context_core::embeddings::CachePersistence;
use redb::ReadableTable;
use tracing::warn;

/// `CachePersistence` backed by the same `redb` database as everything
/// else in this crate.
pub struct RedbCachePersistence {
    store: RedbStore,
}

impl RedbCachePersistence {
    #[must_use]
    pub fn new(store: RedbStore) -> Self {
        Self { store }
    }
}

impl CachePersistence for RedbCachePersistence {
    fn load(&self, key: &str) -> Option<Vec<f32>> {
        let read_txn = match self.store.db.begin_read() {
            Ok(txn) => txn,
            Err(err) => {
                warn!(error = %err, "embedding cache persistence read transaction failed");
                return None;
            }
        };
        let table = match read_txn.open_table(EMBEDDING_CACHE_TABLE) {
            Ok(table) => table,
            Err(err) => {
                warn!(error = %err, "embedding cache table open failed");
                return None;
            }
        };
        let bytes = match table.get(key) {
            Ok(Some(guard)) => guard.value().to_vec(),
            Ok(None) => return None,
            Err(err) => {
                warn!(error = %err, "embedding cache persistence read failed");
                return None;
            }
        };
        let decompressed = match lz4_flex::decompress_size_prepended(&bytes) {
            Ok(data) => data,
            Err(err) => {
                warn!(error = %err, "embedding cache entry failed to decompress, discarding");
                return None;
            }
        };
        match postcard::from_bytes(&decompressed) {
            Ok(vector) => Some(vector),
            Err(err) => {
                warn!(error = %err, "embedding cache entry failed to deserialize, discarding");
                None
            }
        }
    }

    fn save(&self, key: &str, vector: &[f32]) {
        let serialized = match postcard::to_allocvec(vector) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(error = %err, "embedding cache entry failed to serialize, not persisted");
                return;
            }
        };
        let compressed = lz4_flex::compress_prepend_size(&serialized);
        let write_txn = match self.store.db.begin_write() {
            Ok(txn) => txn,
            Err(err) => {
                warn!(error = %err, "embedding cache persistence write transaction failed");
                return;
            }
        };
        {
            let mut table = match write_txn.open_table(EMBEDDING_CACHE_TABLE) {
                Ok(table) => table,
                Err(err) => {
                    warn!(error = %err, "embedding cache table open failed");
                    return;
                }
            };
            if let Err(err) = table.insert(key, compressed.as_slice()) {
                warn!(error = %err, "embedding cache persistence insert failed");
                return;
            }
        }
        if let Err(err) = write_txn.commit() {
            warn!(error = %err, "embedding cache persistence commit failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbStore::open(&dir.path().join("cache.redb")).await.unwrap();
        let persistence = RedbCachePersistence::new(store);
        persistence.save("key-a", &[1.0, 2.0, 3.0]);
        let loaded = persistence.load("key-a");
        assert_eq!(loaded, Some(vec![1.0, 2.0, 3.0]));
    }

    #[tokio::test]
    async fn missing_key_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbStore::open(&dir.path().join("cache.redb")).await.unwrap();
        let persistence = RedbCachePersistence::new(store);
        assert_eq!(persistence.load("absent"), None);
    }
}
