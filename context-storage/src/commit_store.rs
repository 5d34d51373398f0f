//! `CommitStore` implementation: durable commit and file-change history
//! backing the git-history tool surface (§4.9, §6.3).

use crate::tables::{with_db_timeout, COMMITS_TABLE, FILE_CHANGES_TABLE};
use crate::RedbStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use context_core::error::Error;
use context_core::git_history::{Commit, CommitStore, FileChange};
use redb::ReadableTable;
use std::sync::Arc;
use uuid::Uuid;

pub struct RedbCommitStore {
    store: RedbStore,
}

impl RedbCommitStore {
    #[must_use]
    pub fn new(store: RedbStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CommitStore for RedbCommitStore {
    async fn search_git_commits(
        &self,
        query: Option<&str>,
        author: Option<&str>,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
        limit: usize,
    ) -> context_core::Result<Vec<Commit>> {
        let query = query.map(str::to_lowercase);
        let author = author.map(str::to_lowercase);
        let db = Arc::clone(&self.store.db);
        with_db_timeout(move || {
            let read_txn = db.begin_read().map_err(|e| {
                Error::retrieval(format!("failed to begin read transaction: {e}"), "retry the request")
            })?;
            let table = read_txn
                .open_table(COMMITS_TABLE)
                .map_err(|e| Error::retrieval(format!("failed to open commits table: {e}"), "retry the request"))?;
            let mut matched = Vec::new();
            let iter = table
                .iter()
                .map_err(|e| Error::retrieval(format!("failed to iterate commits table: {e}"), "retry the request"))?;
            for entry in iter {
                let (_, value) = entry
                    .map_err(|e| Error::retrieval(format!("failed to read commit entry: {e}"), "retry the request"))?;
                let commit: Commit = postcard::from_bytes(value.value()).map_err(|e| {
                    Error::retrieval(format!("failed to deserialize commit: {e}"), "the on-disk format may be from an incompatible version")
                })?;
                if let Some(q) = &query {
                    if !commit.message.to_lowercase().contains(q.as_str()) {
                        continue;
                    }
                }
                if let Some(a) = &author {
                    if !commit.author_name.to_lowercase().contains(a.as_str())
                        && !commit.author_email.to_lowercase().contains(a.as_str())
                    {
                        continue;
                    }
                }
                if let Some(since) = since {
                    if commit.author_date < since {
                        continue;
                    }
                }
                if let Some(until) = until {
                    if commit.author_date > until {
                        continue;
                    }
                }
                matched.push(commit);
            }
            matched.sort_by(|a, b| b.author_date.cmp(&a.author_date));
            matched.truncate(limit);
            Ok(matched)
        })
        .await
    }

    async fn get_commits_by_file(&self, path: &str, limit: usize) -> context_core::Result<Vec<Commit>> {
        let changed = self.get_file_changes(path, limit.max(1) * 4).await?;
        let hashes: std::collections::HashSet<String> =
            changed.into_iter().map(|c| c.commit_hash).collect();
        let db = Arc::clone(&self.store.db);
        with_db_timeout(move || {
            let read_txn = db.begin_read().map_err(|e| {
                Error::retrieval(format!("failed to begin read transaction: {e}"), "retry the request")
            })?;
            let table = read_txn
                .open_table(COMMITS_TABLE)
                .map_err(|e| Error::retrieval(format!("failed to open commits table: {e}"), "retry the request"))?;
            let mut commits = Vec::new();
            for hash in &hashes {
                if let Some(guard) = table
                    .get(hash.as_str())
                    .map_err(|e| Error::retrieval(format!("failed to get commit: {e}"), "retry the request"))?
                {
                    let commit: Commit = postcard::from_bytes(guard.value()).map_err(|e| {
                        Error::retrieval(format!("failed to deserialize commit: {e}"), "the on-disk format may be from an incompatible version")
                    })?;
                    commits.push(commit);
                }
            }
            commits.sort_by(|a, b| b.author_date.cmp(&a.author_date));
            commits.truncate(limit);
            Ok(commits)
        })
        .await
    }

    async fn store_git_commits(&self, commits: Vec<Commit>) -> context_core::Result<usize> {
        let count = commits.len();
        let db = Arc::clone(&self.store.db);
        with_db_timeout(move || {
            let write_txn = db.begin_write().map_err(|e| {
                Error::storage(format!("failed to begin write transaction: {e}"), "retry the request")
            })?;
            {
                let mut table = write_txn
                    .open_table(COMMITS_TABLE)
                    .map_err(|e| Error::storage(format!("failed to open commits table: {e}"), "retry the request"))?;
                for commit in &commits {
                    let bytes = postcard::to_allocvec(commit).map_err(|e| {
                        Error::storage(format!("failed to serialize commit: {e}"), "report this as a bug")
                    })?;
                    table
                        .insert(commit.hash.as_str(), bytes.as_slice())
                        .map_err(|e| Error::storage(format!("failed to insert commit: {e}"), "retry the request"))?;
                }
            }
            write_txn
                .commit()
                .map_err(|e| Error::storage(format!("failed to commit transaction: {e}"), "retry the request"))?;
            Ok::<usize, Error>(count)
        })
        .await
    }

    async fn store_git_file_changes(&self, changes: Vec<FileChange>) -> context_core::Result<usize> {
        let count = changes.len();
        let db = Arc::clone(&self.store.db);
        with_db_timeout(move || {
            let write_txn = db.begin_write().map_err(|e| {
                Error::storage(format!("failed to begin write transaction: {e}"), "retry the request")
            })?;
            {
                let mut table = write_txn
                    .open_table(FILE_CHANGES_TABLE)
                    .map_err(|e| Error::storage(format!("failed to open file_changes table: {e}"), "retry the request"))?;
                for change in &changes {
                    let bytes = postcard::to_allocvec(change).map_err(|e| {
                        Error::storage(format!("failed to serialize file change: {e}"), "report this as a bug")
                    })?;
                    table
                        .insert(change.id.to_string().as_str(), bytes.as_slice())
                        .map_err(|e| Error::storage(format!("failed to insert file change: {e}"), "retry the request"))?;
                }
            }
            write_txn
                .commit()
                .map_err(|e| Error::storage(format!("failed to commit transaction: {e}"), "retry the request"))?;
            Ok::<usize, Error>(count)
        })
        .await
    }

    async fn get_file_changes(&self, path: &str, limit: usize) -> context_core::Result<Vec<FileChange>> {
        let path = path.to_string();
        let db = Arc::clone(&self.store.db);
        with_db_timeout(move || {
            let read_txn = db.begin_read().map_err(|e| {
                Error::retrieval(format!("failed to begin read transaction: {e}"), "retry the request")
            })?;
            let table = read_txn
                .open_table(FILE_CHANGES_TABLE)
                .map_err(|e| Error::retrieval(format!("failed to open file_changes table: {e}"), "retry the request"))?;
            let mut matched = Vec::new();
            let iter = table
                .iter()
                .map_err(|e| Error::retrieval(format!("failed to iterate file_changes table: {e}"), "retry the request"))?;
            for entry in iter {
                let (_, value) = entry
                    .map_err(|e| Error::retrieval(format!("failed to read file change entry: {e}"), "retry the request"))?;
                let change: FileChange = postcard::from_bytes(value.value()).map_err(|e| {
                    Error::retrieval(format!("failed to deserialize file change: {e}"), "the on-disk format may be from an incompatible version")
                })?;
                if change.file_path == path {
                    matched.push(change);
                }
            }
            matched.truncate(limit);
            Ok(matched)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use context_core::git_history::{ChangeType, CommitStats};

    fn sample_commit(hash: &str, message: &str) -> Commit {
        Commit {
            hash: hash.to_string(),
            author_name: "alice".to_string(),
            author_email: "alice@example.com".to_string(),
            author_date: Utc::now(),
            message: message.to_string(),
            branch_names: vec!["main".to_string()],
            tags: vec![],
            parent_hashes: vec![],
            stats: CommitStats::default(),
            message_embedding: None,
        }
    }

    #[tokio::test]
    async fn search_filters_by_message_substring() {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbStore::open(&dir.path().join("commits.redb")).await.unwrap();
        let commit_store = RedbCommitStore::new(store);
        commit_store
            .store_git_commits(vec![
                sample_commit("c1", "rewrite parser"),
                sample_commit("c2", "bump dependency"),
            ])
            .await
            .unwrap();
        let hits = commit_store
            .search_git_commits(Some("parser"), None, None, None, 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].hash, "c1");
    }

    #[tokio::test]
    async fn file_changes_filter_by_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbStore::open(&dir.path().join("commits.redb")).await.unwrap();
        let commit_store = RedbCommitStore::new(store);
        commit_store
            .store_git_file_changes(vec![FileChange {
                id: Uuid::new_v4(),
                commit_hash: "c1".to_string(),
                file_path: "src/lib.rs".to_string(),
                change_type: ChangeType::Modified,
                lines_added: 5,
                lines_deleted: 1,
                diff_content: None,
                diff_embedding: None,
            }])
            .await
            .unwrap();
        let changes = commit_store.get_file_changes("src/lib.rs", 10).await.unwrap();
        assert_eq!(changes.len(), 1);
        let none = commit_store.get_file_changes("src/other.rs", 10).await.unwrap();
        assert!(none.is_empty());
    }
}
