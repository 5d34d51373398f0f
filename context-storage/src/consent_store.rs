//! `ConsentRegistry` implementation: durable cross-project opt-in/opt-out
//! state (§4.8), so consent survives a restart rather than resetting to the
//! opt-out-by-default behavior every time the engine boots.

use crate::tables::{with_db_timeout, CONSENT_TABLE};
use crate::RedbStore;
use async_trait::async_trait;
use context_core::consent::ConsentRegistry;
use context_core::error::Error;
use redb::ReadableTable;
use std::sync::Arc;
use tracing::warn;

const OPTED_OUT: u8 = 0;
const OPTED_IN: u8 = 1;

pub struct RedbConsentRegistry {
    store: RedbStore,
}

impl RedbConsentRegistry {
    #[must_use]
    pub fn new(store: RedbStore) -> Self {
        Self { store }
    }

    async fn set(&self, project: &str, value: u8) {
        let db = Arc::clone(&self.store.db);
        let project = project.to_string();
        let result = with_db_timeout(move || {
            let write_txn = db.begin_write().map_err(|e| {
                Error::storage(format!("failed to begin write transaction: {e}"), "retry the request")
            })?;
            {
                let mut table = write_txn
                    .open_table(CONSENT_TABLE)
                    .map_err(|e| Error::storage(format!("failed to open consent table: {e}"), "retry the request"))?;
                table
                    .insert(project.as_str(), value)
                    .map_err(|e| Error::storage(format!("failed to insert consent entry: {e}"), "retry the request"))?;
            }
            write_txn
                .commit()
                .map_err(|e| Error::storage(format!("failed to commit transaction: {e}"), "retry the request"))?;
            Ok::<(), Error>(())
        })
        .await;
        if let Err(err) = result {
            warn!(error = %err, "consent state write failed");
        }
    }
}

#[async_trait]
impl ConsentRegistry for RedbConsentRegistry {
    async fn opt_in(&self, project: &str) {
        self.set(project, OPTED_IN).await;
    }

    async fn opt_out(&self, project: &str) {
        self.set(project, OPTED_OUT).await;
    }

    async fn is_opted_in(&self, project: &str) -> bool {
        let db = Arc::clone(&self.store.db);
        let project = project.to_string();
        with_db_timeout(move || {
            let read_txn = db.begin_read().map_err(|e| {
                Error::retrieval(format!("failed to begin read transaction: {e}"), "retry the request")
            })?;
            let table = read_txn
                .open_table(CONSENT_TABLE)
                .map_err(|e| Error::retrieval(format!("failed to open consent table: {e}"), "retry the request"))?;
            let value = table
                .get(project.as_str())
                .map_err(|e| Error::retrieval(format!("failed to get consent entry: {e}"), "retry the request"))?
                .map(|guard| guard.value());
            Ok::<bool, Error>(value != Some(OPTED_OUT))
        })
        .await
        .unwrap_or(true)
    }

    async fn list_opted_in(&self) -> Vec<String> {
        let db = Arc::clone(&self.store.db);
        with_db_timeout(move || {
            let read_txn = db.begin_read().map_err(|e| {
                Error::retrieval(format!("failed to begin read transaction: {e}"), "retry the request")
            })?;
            let table = read_txn
                .open_table(CONSENT_TABLE)
                .map_err(|e| Error::retrieval(format!("failed to open consent table: {e}"), "retry the request"))?;
            let mut projects = Vec::new();
            let iter = table
                .iter()
                .map_err(|e| Error::retrieval(format!("failed to iterate consent table: {e}"), "retry the request"))?;
            for entry in iter {
                let (key, value) = entry
                    .map_err(|e| Error::retrieval(format!("failed to read consent entry: {e}"), "retry the request"))?;
                if value.value() == OPTED_IN {
                    projects.push(key.value().to_string());
                }
            }
            projects.sort();
            Ok::<Vec<String>, Error>(projects)
        })
        .await
        .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn absent_project_defaults_to_opted_in() {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbStore::open(&dir.path().join("consent.redb")).await.unwrap();
        let registry = RedbConsentRegistry::new(store);
        assert!(registry.is_opted_in("new-project").await);
    }

    #[tokio::test]
    async fn opt_out_persists_and_opt_in_reverses_it() {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbStore::open(&dir.path().join("consent.redb")).await.unwrap();
        let registry = RedbConsentRegistry::new(store);
        registry.opt_out("proj-a").await;
        assert!(!registry.is_opted_in("proj-a").await);
        registry.opt_in("proj-a").await;
        assert!(registry.is_opted_in("proj-a").await);
        assert_eq!(registry.list_opted_in().await, vec!["proj-a".to_string()]);
    }
}
