//! The indexer contract the orchestrator drives `index_codebase` /
//! `reindex_project` through (§4.6). The concrete implementation — file
//! walking, AST parsing, embedding, upsert — lives in `context-index`;
//! `context-core` only needs the shape of its input/output to expose the
//! orchestrator operations without a crate-level dependency cycle.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Parameters for one indexing pass (§4.6).
#[derive(Debug, Clone)]
pub struct IndexRequest {
    pub root: PathBuf,
    pub project_name: String,
    pub recursive: bool,
    pub bypass_cache: bool,
    pub clear_existing: bool,
}

/// Result of one indexing pass (§4.6 return shape).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexReport {
    pub files_indexed: usize,
    pub units_indexed: usize,
    pub units_deleted: usize,
    pub total_time_s: f64,
    pub languages_histogram: HashMap<String, usize>,
}

/// Driven by `index_codebase` (full pass) and `reindex_project` (same
/// operation, named separately in the tool surface for an existing
/// project) and by the auto-indexing service (§4.13) for targeted re-index.
#[async_trait]
pub trait Indexer: Send + Sync {
    /// Run a full or incremental indexing pass over `request`.
    ///
    /// # Errors
    /// Returns `Error::Storage` if an upsert batch fails; a single file's
    /// parse failure is logged and skipped rather than propagated.
    async fn index(&self, request: IndexRequest) -> Result<IndexReport>;

    /// Re-index only the given files (used by the file-watcher's debounced
    /// dispatch, §4.13), without a full directory walk.
    ///
    /// # Errors
    /// Returns `Error::Storage` if an upsert batch fails.
    async fn index_files(
        &self,
        project_name: &str,
        files: &[PathBuf],
        bypass_cache: bool,
    ) -> Result<IndexReport>;
}
