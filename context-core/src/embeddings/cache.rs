//! Content-hashed, size-bounded, TTL-aware embedding cache (§3.1, §4.2).

use super::provider::EmbeddingProvider;
use crate::error::Result;
use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::Arc;

/// `(sha256(text), model_id) -> vector` plus creation time (§3.1).
#[derive(Debug, Clone)]
struct CacheEntry {
    vector: Vec<f32>,
    created_at: DateTime<Utc>,
}

/// Trait for a durable backing store the cache can spill to, so cached
/// vectors survive process restarts. `InMemoryEmbeddingCache`-only use
/// (tests, the default) passes `None`.
pub trait CachePersistence: Send + Sync {
    fn load(&self, key: &str) -> Option<Vec<f32>>;
    fn save(&self, key: &str, vector: &[f32]);
}

/// The shared embedding cache. All callers — including the orchestrator,
/// which must never call the provider directly for query embedding — go
/// through [`EmbeddingCache::get_or_embed`].
pub struct EmbeddingCache {
    lru: Mutex<LruCache<String, CacheEntry>>,
    ttl: Duration,
    persistence: Option<Arc<dyn CachePersistence>>,
    hits: std::sync::atomic::AtomicU64,
    misses: std::sync::atomic::AtomicU64,
}

impl EmbeddingCache {
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            lru: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN),
            )),
            ttl,
            persistence: None,
            hits: std::sync::atomic::AtomicU64::new(0),
            misses: std::sync::atomic::AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn with_persistence(mut self, persistence: Arc<dyn CachePersistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    fn key(text: &str, model_id: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        let digest = hasher.finalize();
        format!("{}:{model_id}", hex(&digest))
    }

    /// Look up `text` under `model_id`; on a cold or expired entry, embed
    /// via `provider`, store, and return the fresh vector.
    ///
    /// # Errors
    /// Propagates `provider.embed`'s error on a cache miss.
    ///
    /// Concurrent cold misses for the same key may each call the provider
    /// once and both succeed (§5): the last write to the LRU wins, and both
    /// callers get a valid vector either way.
    pub async fn get_or_embed(
        &self,
        text: &str,
        provider: &dyn EmbeddingProvider,
    ) -> Result<Vec<f32>> {
        let key = Self::key(text, provider.model_id());
        if let Some(vector) = self.peek(&key) {
            self.hits.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            return Ok(vector);
        }
        if let Some(persistence) = &self.persistence {
            if let Some(vector) = persistence.load(&key) {
                self.insert(key.clone(), vector.clone());
                self.hits.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                return Ok(vector);
            }
        }
        self.misses.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let vector = provider.embed(text).await?;
        self.insert(key.clone(), vector.clone());
        if let Some(persistence) = &self.persistence {
            persistence.save(&key, &vector);
        }
        Ok(vector)
    }

    fn peek(&self, key: &str) -> Option<Vec<f32>> {
        let mut lru = self.lru.lock();
        let entry = lru.get(key)?;
        if Utc::now() - entry.created_at > self.ttl {
            lru.pop(key);
            return None;
        }
        Some(entry.vector.clone())
    }

    fn insert(&self, key: String, vector: Vec<f32>) {
        self.lru.lock().put(
            key,
            CacheEntry {
                vector,
                created_at: Utc::now(),
            },
        );
    }

    /// Current number of entries held in the in-memory LRU.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lru.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(hits, misses)` since creation, for `get_status`.
    #[must_use]
    pub fn hit_stats(&self) -> (u64, u64) {
        (
            self.hits.load(std::sync::atomic::Ordering::Relaxed),
            self.misses.load(std::sync::atomic::Ordering::Relaxed),
        )
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::provider::HashEmbeddingProvider;

    #[tokio::test]
    async fn repeat_query_is_a_cache_hit() {
        let cache = EmbeddingCache::new(100, Duration::hours(1));
        let provider = HashEmbeddingProvider::new("hash-v1");
        let a = cache.get_or_embed("preferred language", &provider).await.unwrap();
        let (_, misses_before) = cache.hit_stats();
        let b = cache.get_or_embed("preferred language", &provider).await.unwrap();
        let (hits_after, misses_after) = cache.hit_stats();
        assert_eq!(a, b);
        assert_eq!(misses_before, misses_after);
        assert!(hits_after >= 1);
    }

    #[tokio::test]
    async fn different_models_get_distinct_cache_entries() {
        let cache = EmbeddingCache::new(100, Duration::hours(1));
        let p1 = HashEmbeddingProvider::new("model-a");
        let p2 = HashEmbeddingProvider::new("model-b");
        cache.get_or_embed("same text", &p1).await.unwrap();
        cache.get_or_embed("same text", &p2).await.unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn expired_entry_is_recomputed() {
        let cache = EmbeddingCache::new(100, Duration::milliseconds(1));
        let provider = HashEmbeddingProvider::new("hash-v1");
        cache.get_or_embed("some text", &provider).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let (_, misses_before) = cache.hit_stats();
        cache.get_or_embed("some text", &provider).await.unwrap();
        let (_, misses_after) = cache.hit_stats();
        assert_eq!(misses_after, misses_before + 1);
    }
}
