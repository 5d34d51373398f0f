//! Auto-indexing file watcher (§4.13): debounces filesystem events under a
//! watched project root and dispatches a targeted re-index through
//! [`Indexer::index_files`].

use context_core::error::Result;
use context_core::indexing::Indexer;
use notify_debouncer_full::{new_debouncer, DebounceEventResult, Debouncer, RecommendedCache};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Tuning for debounce/batch windows (§4.13).
#[derive(Debug, Clone, Copy)]
pub struct WatcherConfig {
    pub debounce_ms: u64,
    pub batch_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self { debounce_ms: 500, batch_ms: 2_000 }
    }
}

/// Watches one project root and feeds changed files to `indexer` in
/// debounced batches, so rapid saves during active editing don't each
/// trigger their own re-index pass.
pub struct AutoIndexService {
    project_name: String,
    root: PathBuf,
    config: WatcherConfig,
    indexer: Arc<dyn Indexer>,
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl AutoIndexService {
    #[must_use]
    pub fn new(
        project_name: impl Into<String>,
        root: PathBuf,
        config: WatcherConfig,
        indexer: Arc<dyn Indexer>,
    ) -> Self {
        Self { project_name: project_name.into(), root, config, indexer, shutdown_tx: None }
    }

    /// Start the background watch task. Safe to call at most once per
    /// instance; a second call replaces the prior shutdown handle without
    /// stopping the earlier task, so callers should `stop` first.
    ///
    /// # Errors
    /// Returns an error if the underlying OS file watcher can't be created.
    pub fn start(&mut self) -> Result<()> {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        self.shutdown_tx = Some(shutdown_tx);

        let project_name = self.project_name.clone();
        let root = self.root.clone();
        let indexer = self.indexer.clone();
        let debounce_duration = Duration::from_millis(self.config.debounce_ms);
        let batch_duration = Duration::from_millis(self.config.batch_ms);

        tokio::spawn(async move {
            let (event_tx, mut event_rx) = mpsc::channel::<DebounceEventResult>(1000);

            let watcher_result: std::result::Result<
                Debouncer<notify::RecommendedWatcher, RecommendedCache>,
                _,
            > = new_debouncer(debounce_duration, None, move |result| {
                let _ = event_tx.blocking_send(result);
            });

            let mut debouncer = match watcher_result {
                Ok(d) => d,
                Err(e) => {
                    error!(error = %e, "failed to create file watcher");
                    return;
                }
            };
            if let Err(e) = debouncer.watch(&root, notify::RecursiveMode::Recursive) {
                error!(error = %e, root = %root.display(), "failed to watch project root");
                return;
            }
            info!(project = %project_name, root = %root.display(), "auto-index watcher started");

            let mut pending: std::collections::HashSet<PathBuf> = std::collections::HashSet::new();
            let mut batch_timer = tokio::time::interval(batch_duration);

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!(project = %project_name, "auto-index watcher received shutdown");
                        break;
                    }
                    Some(result) = event_rx.recv() => {
                        match result {
                            Ok(events) => {
                                for event in events {
                                    for path in &event.paths {
                                        if crate::walker::is_indexable(path) {
                                            pending.insert(path.clone());
                                        }
                                    }
                                }
                            }
                            Err(errors) => {
                                for e in errors {
                                    warn!(project = %project_name, error = %e, "watch error");
                                }
                            }
                        }
                    }
                    _ = batch_timer.tick() => {
                        if !pending.is_empty() {
                            let files: Vec<PathBuf> = pending.drain().collect();
                            debug!(project = %project_name, count = files.len(), "dispatching debounced re-index");
                            if let Err(e) = indexer.index_files(&project_name, &files, false).await {
                                error!(project = %project_name, error = %e, "auto re-index failed");
                            }
                        }
                    }
                }
            }
            info!(project = %project_name, "auto-index watcher stopped");
        });

        Ok(())
    }

    /// Signal the background task to stop. A no-op if it was never started.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use context_core::indexing::{IndexReport, IndexRequest};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingIndexer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Indexer for CountingIndexer {
        async fn index(&self, _request: IndexRequest) -> Result<IndexReport> {
            unreachable!("not exercised by watcher tests")
        }
        async fn index_files(
            &self,
            _project_name: &str,
            _files: &[PathBuf],
            _bypass_cache: bool,
        ) -> Result<IndexReport> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(IndexReport {
                files_indexed: 1,
                units_indexed: 1,
                units_deleted: 0,
                total_time_s: 0.0,
                languages_histogram: HashMap::new(),
            })
        }
    }

    #[tokio::test]
    async fn start_and_stop_does_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let indexer = Arc::new(CountingIndexer { calls: AtomicUsize::new(0) });
        let mut service = AutoIndexService::new(
            "demo",
            dir.path().to_path_buf(),
            WatcherConfig { debounce_ms: 10, batch_ms: 20 },
            indexer,
        );
        service.start().unwrap();
        service.stop().await;
    }
}
