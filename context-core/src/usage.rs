//! Usage tracking: batched write-behind accumulator + composite scoring
//! (spec §4.4).

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Per-`MemoryUnit` usage accumulator (§3.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageStats {
    pub first_seen: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
    pub use_count: u64,
    pub last_search_score: f32,
}

/// Weights and decay parameters for the composite score (§4.4, §6.5).
#[derive(Debug, Clone, Copy)]
pub struct UsageWeights {
    pub w_similarity: f32,
    pub w_recency: f32,
    pub w_usage: f32,
    pub halflife_hours: f32,
    pub max_use: f32,
}

impl Default for UsageWeights {
    fn default() -> Self {
        Self {
            w_similarity: 0.6,
            w_recency: 0.2,
            w_usage: 0.2,
            halflife_hours: 7.0 * 24.0,
            max_use: 1000.0,
        }
    }
}

/// Backing store the usage tracker flushes batches into (§3.2, §6.4).
#[async_trait]
pub trait UsageBackingStore: Send + Sync {
    /// Apply a batch of `(id, UsageStats)` updates atomically as a unit.
    ///
    /// # Errors
    /// Returns `Error::Storage` if the batch write fails.
    async fn batch_update_usage(&self, batch: Vec<(Uuid, UsageStats)>) -> Result<()>;

    /// Fetch the durably-flushed stats for one id, if any.
    ///
    /// # Errors
    /// Returns `Error::Retrieval` if the read fails.
    async fn get_usage_stats(&self, id: Uuid) -> Result<Option<UsageStats>>;
}

/// In-memory pending map + write-behind flush (§4.4, §5, §9 Design Notes).
///
/// The pending map is guarded by a single lock for the batched-update
/// critical section; the lock is released before the backing-store RPC runs
/// so a flush never holds the lock across an `.await`.
pub struct UsageTracker {
    pending: Mutex<HashMap<Uuid, UsageStats>>,
    batch_size: usize,
    weights: UsageWeights,
}

impl UsageTracker {
    #[must_use]
    pub fn new(batch_size: usize, weights: UsageWeights) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            batch_size,
            weights,
        }
    }

    /// Record one usage event, coalescing into the pending map.
    ///
    /// Returns the batch to flush if the pending map has reached
    /// `batch_size`, so the caller can flush outside any lock.
    pub fn record_usage(&self, memory_id: Uuid, score: f32) -> Option<Vec<(Uuid, UsageStats)>> {
        let now = Utc::now();
        let mut pending = self.pending.lock();
        pending
            .entry(memory_id)
            .and_modify(|stats| {
                stats.use_count += 1;
                stats.last_used = now;
                stats.last_search_score = score;
            })
            .or_insert(UsageStats {
                first_seen: now,
                last_used: now,
                use_count: 1,
                last_search_score: score,
            });
        if pending.len() >= self.batch_size {
            Some(pending.drain().collect())
        } else {
            None
        }
    }

    /// Record a batch of usage events in one call (§4.4 `record_batch`).
    pub fn record_batch(&self, items: &[(Uuid, f32)]) -> Option<Vec<(Uuid, UsageStats)>> {
        let now = Utc::now();
        let mut pending = self.pending.lock();
        for (memory_id, score) in items {
            pending
                .entry(*memory_id)
                .and_modify(|stats| {
                    stats.use_count += 1;
                    stats.last_used = now;
                    stats.last_search_score = *score;
                })
                .or_insert(UsageStats {
                    first_seen: now,
                    last_used: now,
                    use_count: 1,
                    last_search_score: *score,
                });
        }
        if pending.len() >= self.batch_size {
            Some(pending.drain().collect())
        } else {
            None
        }
    }

    /// Currently-pending (not-yet-flushed) stats for `id`, if any.
    #[must_use]
    pub fn peek_pending(&self, id: Uuid) -> Option<UsageStats> {
        self.pending.lock().get(&id).cloned()
    }

    /// Number of entries awaiting flush, for `get_status`.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Drain the entire pending map unconditionally — used for the
    /// interval-driven flush tick and for the mandatory final flush on
    /// shutdown (§4.4, §9 Design Notes).
    pub fn drain(&self) -> Vec<(Uuid, UsageStats)> {
        self.pending.lock().drain().collect()
    }

    /// Compute the composite re-ranking score (§4.4).
    ///
    /// `sim` must already be clamped to `[0, 1]` by the store boundary; this
    /// function composes afterwards and clamps only the final result, per
    /// the ordering fixed in §9 Design Notes.
    #[must_use]
    pub fn composite_score(
        &self,
        sim: f32,
        created_at: DateTime<Utc>,
        last_used: Option<DateTime<Utc>>,
        use_count: u64,
    ) -> f32 {
        let w = &self.weights;
        let anchor = last_used.unwrap_or(created_at);
        let age_hours = (Utc::now() - anchor).num_milliseconds() as f32 / 3_600_000.0;
        let recency = 2f32.powf(-age_hours.max(0.0) / w.halflife_hours.max(0.001));
        let usage = (((use_count as f32) + 1.0).ln() / (w.max_use + 1.0).ln()).min(1.0);
        (w.w_similarity * sim + w.w_recency * recency + w.w_usage * usage).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn pending_entry_accumulates_use_count() {
        let tracker = UsageTracker::new(100, UsageWeights::default());
        let id = Uuid::new_v4();
        tracker.record_usage(id, 0.8);
        tracker.record_usage(id, 0.9);
        let stats = tracker.peek_pending(id).unwrap();
        assert_eq!(stats.use_count, 2);
        assert_eq!(stats.last_search_score, 0.9);
    }

    #[test]
    fn flush_triggers_at_batch_size() {
        let tracker = UsageTracker::new(2, UsageWeights::default());
        assert!(tracker.record_usage(Uuid::new_v4(), 0.5).is_none());
        let flushed = tracker.record_usage(Uuid::new_v4(), 0.5);
        assert!(flushed.is_some());
        assert_eq!(tracker.pending_len(), 0);
    }

    #[test]
    fn composite_score_is_monotonic_in_each_term() {
        let tracker = UsageTracker::new(100, UsageWeights::default());
        let now = Utc::now();
        let low_sim = tracker.composite_score(0.1, now, Some(now), 0);
        let high_sim = tracker.composite_score(0.9, now, Some(now), 0);
        assert!(high_sim > low_sim);

        let stale = tracker.composite_score(0.5, now - Duration::days(60), Some(now - Duration::days(60)), 0);
        let fresh = tracker.composite_score(0.5, now, Some(now), 0);
        assert!(fresh > stale);

        let unused = tracker.composite_score(0.5, now, Some(now), 0);
        let heavily_used = tracker.composite_score(0.5, now, Some(now), 500);
        assert!(heavily_used > unused);
    }

    #[test]
    fn zero_weight_eliminates_term_effect() {
        let weights = UsageWeights {
            w_similarity: 1.0,
            w_recency: 0.0,
            w_usage: 0.0,
            ..UsageWeights::default()
        };
        let tracker = UsageTracker::new(100, weights);
        let now = Utc::now();
        let a = tracker.composite_score(0.42, now, Some(now), 0);
        let b = tracker.composite_score(0.42, now - Duration::days(400), Some(now - Duration::days(400)), 999);
        assert!((a - b).abs() < 1e-5);
    }

    #[test]
    fn composite_score_dominance_scenario_s6() {
        // S6: identical text/similarity; M1 heavily used and recent, M2 cold and stale.
        let tracker = UsageTracker::new(100, UsageWeights::default());
        let now = Utc::now();
        let m1 = tracker.composite_score(0.7, now, Some(now), 1000);
        let m2 = tracker.composite_score(0.7, now - Duration::days(30), Some(now - Duration::days(30)), 0);
        assert!(m1 > m2);
    }
}
