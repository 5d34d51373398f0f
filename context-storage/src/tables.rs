//! redb table definitions and the blocking-transaction timeout wrapper
//! shared by every store implementation in this crate.

use context_core::Error;
use redb::TableDefinition;
use std::time::Duration;

pub(crate) const MEMORIES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("memories");
pub(crate) const VECTORS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("vectors");
pub(crate) const USAGE_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("usage");
pub(crate) const CONSENT_TABLE: TableDefinition<&str, u8> = TableDefinition::new("consent");
pub(crate) const FEEDBACK_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("feedback");
pub(crate) const COMMITS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("commits");
pub(crate) const FILE_CHANGES_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("file_changes");
pub(crate) const EMBEDDING_CACHE_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("embedding_cache");

/// Every long-running `redb` transaction in this crate runs behind
/// `spawn_blocking` with this timeout, so a wedged disk degrades a single
/// request instead of hanging the whole engine.
const DB_OPERATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Run a blocking redb transaction off the async runtime's worker threads,
/// bounded by [`DB_OPERATION_TIMEOUT`].
pub(crate) async fn with_db_timeout<T, F>(operation: F) -> context_core::Result<T>
where
    F: FnOnce() -> context_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::time::timeout(DB_OPERATION_TIMEOUT, tokio::task::spawn_blocking(operation)).await
    {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(Error::storage(
            format!("task join error: {join_err}"),
            "retry the request; if this persists the process may be shutting down",
        )),
        Err(_) => Err(Error::storage(
            format!("database operation timed out after {DB_OPERATION_TIMEOUT:?}"),
            "check disk health; a wedged redb file handle may need the process restarted",
        )),
    }
}
