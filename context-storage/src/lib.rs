//! `redb`-backed implementations of every storage contract `context-core`
//! defines: [`context_core::store::VectorStore`],
//! [`context_core::embeddings::CachePersistence`],
//! [`context_core::usage::UsageBackingStore`],
//! [`context_core::consent::ConsentRegistry`],
//! [`context_core::feedback::FeedbackStore`], and
//! [`context_core::git_history::CommitStore`].
//!
//! A single [`RedbStore`] opens one `redb::Database` file and every table
//! this crate needs; each trait impl lives in its own module and borrows
//! the shared `Arc<Database>`, mirroring how the rest of the engine treats
//! storage as a set of narrow collaborators rather than one God object.

mod cache_persistence;
mod commit_store;
mod consent_store;
mod feedback_store;
mod filter_match;
mod tables;
mod usage_store;
mod vector_store;

pub use cache_persistence::RedbCachePersistence;
pub use commit_store::RedbCommitStore;
pub use consent_store::RedbConsentRegistry;
pub use feedback_store::RedbFeedbackStore;
pub use usage_store::RedbUsageBackingStore;
pub use vector_store::RedbVectorStore;

use context_core::Error;
use redb::Database;
use std::path::Path;
use std::sync::Arc;
use tables::{
    with_db_timeout, COMMITS_TABLE, CONSENT_TABLE, EMBEDDING_CACHE_TABLE, FEEDBACK_TABLE,
    FILE_CHANGES_TABLE, MEMORIES_TABLE, USAGE_TABLE, VECTORS_TABLE,
};
use tracing::info;

/// A single open `redb` database shared by every store impl in this crate.
/// Cheap to clone: internally just an `Arc<Database>`.
#[derive(Clone)]
pub struct RedbStore {
    pub(crate) db: Arc<Database>,
}

impl RedbStore {
    /// Open (or create) the database at `path` and ensure every table this
    /// crate uses exists.
    ///
    /// # Errors
    /// Returns `Error::Storage` if the file cannot be opened/created or a
    /// table fails to initialize.
    pub async fn open(path: &Path) -> context_core::Result<Self> {
        info!(path = %path.display(), "opening redb store");
        let path_buf = path.to_path_buf();
        let db = with_db_timeout(move || {
            Database::create(&path_buf)
                .map_err(|e| Error::storage(format!("failed to open redb database: {e}"), "check file permissions and disk space at the configured data_dir"))
        })
        .await?;
        let store = Self { db: Arc::new(db) };
        store.initialize_tables().await?;
        Ok(store)
    }

    async fn initialize_tables(&self) -> context_core::Result<()> {
        let db = Arc::clone(&self.db);
        with_db_timeout(move || {
            let write_txn = db.begin_write().map_err(|e| {
                Error::storage(format!("failed to begin write transaction: {e}"), "retry the request")
            })?;
            {
                write_txn.open_table(MEMORIES_TABLE).map_err(open_table_err("memories"))?;
                write_txn.open_table(VECTORS_TABLE).map_err(open_table_err("vectors"))?;
                write_txn.open_table(USAGE_TABLE).map_err(open_table_err("usage"))?;
                write_txn.open_table(CONSENT_TABLE).map_err(open_table_err("consent"))?;
                write_txn.open_table(FEEDBACK_TABLE).map_err(open_table_err("feedback"))?;
                write_txn.open_table(COMMITS_TABLE).map_err(open_table_err("commits"))?;
                write_txn.open_table(FILE_CHANGES_TABLE).map_err(open_table_err("file_changes"))?;
                write_txn
                    .open_table(EMBEDDING_CACHE_TABLE)
                    .map_err(open_table_err("embedding_cache"))?;
            }
            write_txn.commit().map_err(|e| {
                Error::storage(format!("failed to commit transaction: {e}"), "retry the request")
            })?;
            Ok::<(), Error>(())
        })
        .await?;
        info!("redb tables initialized");
        Ok(())
    }

    /// Cheap liveness probe: a read transaction that opens the memories
    /// table, used by `VectorStore::health_check`.
    pub(crate) async fn is_healthy(&self) -> bool {
        let db = Arc::clone(&self.db);
        with_db_timeout(move || {
            let read_txn = db
                .begin_read()
                .map_err(|e| Error::storage(format!("health check read failed: {e}"), "n/a"))?;
            read_txn
                .open_table(MEMORIES_TABLE)
                .map_err(|e| Error::storage(format!("health check table open failed: {e}"), "n/a"))?;
            Ok::<(), Error>(())
        })
        .await
        .is_ok()
    }
}

fn open_table_err(name: &'static str) -> impl FnOnce(redb::TableError) -> Error {
    move |e| Error::storage(format!("failed to open {name} table: {e}"), "retry the request")
}
