//! Commit/file-change store contract and the git-history orchestrator
//! pass-throughs built on it (spec §4.9, §6.3).
//!
//! None of these operations mutate project code; they read and write an
//! external history store the engine treats as a collaborator, mirroring
//! how [`crate::store::VectorStore`] is treated as a collaborator for
//! memory payloads.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One recorded commit (§6.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    pub hash: String,
    pub author_name: String,
    pub author_email: String,
    pub author_date: DateTime<Utc>,
    pub message: String,
    pub branch_names: Vec<String>,
    pub tags: Vec<String>,
    pub parent_hashes: Vec<String>,
    pub stats: CommitStats,
    pub message_embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CommitStats {
    pub files_changed: u32,
    pub insertions: u32,
    pub deletions: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
    Renamed,
}

/// One file touched by a commit (§6.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChange {
    pub id: uuid::Uuid,
    pub commit_hash: String,
    pub file_path: String,
    pub change_type: ChangeType,
    pub lines_added: u32,
    pub lines_deleted: u32,
    pub diff_content: Option<String>,
    pub diff_embedding: Option<Vec<f32>>,
}

/// External history store contract (§6.3).
#[async_trait]
pub trait CommitStore: Send + Sync {
    /// # Errors
    /// Returns `Error::Retrieval` if the backend read fails.
    async fn search_git_commits(
        &self,
        query: Option<&str>,
        author: Option<&str>,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Commit>>;

    /// # Errors
    /// Returns `Error::Retrieval` if the backend read fails.
    async fn get_commits_by_file(&self, path: &str, limit: usize) -> Result<Vec<Commit>>;

    /// # Errors
    /// Returns `Error::Storage` if the backend write fails.
    async fn store_git_commits(&self, commits: Vec<Commit>) -> Result<usize>;

    /// # Errors
    /// Returns `Error::Storage` if the backend write fails.
    async fn store_git_file_changes(&self, changes: Vec<FileChange>) -> Result<usize>;

    /// All file changes recorded for `path`, newest first, for churn/blame
    /// style queries.
    ///
    /// # Errors
    /// Returns `Error::Retrieval` if the backend read fails.
    async fn get_file_changes(&self, path: &str, limit: usize) -> Result<Vec<FileChange>>;
}

/// `show_function_evolution`: every commit touching `file_path` whose
/// message or diff mentions `function_name`, newest first.
///
/// # Errors
/// Propagates the backing store's error.
pub async fn show_function_evolution(
    store: &dyn CommitStore,
    file_path: &str,
    function_name: &str,
    limit: usize,
) -> Result<Vec<Commit>> {
    let commits = store.get_commits_by_file(file_path, limit.max(1) * 4).await?;
    let matching: Vec<Commit> = commits
        .into_iter()
        .filter(|c| c.message.contains(function_name))
        .take(limit)
        .collect();
    Ok(matching)
}

/// `(file_path, change_count)` pairs, descending by count, for the files
/// touched most often within the commits of `path`'s own history (a proxy
/// for "what does this file tend to change alongside").
///
/// # Errors
/// Propagates the backing store's error.
pub async fn get_change_frequency(
    store: &dyn CommitStore,
    path: &str,
    limit: usize,
) -> Result<Vec<(String, usize)>> {
    let changes = store.get_file_changes(path, 10_000).await?;
    let mut counted: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    for change in changes {
        *counted.entry(change.commit_hash).or_insert(0) += 1;
    }
    let mut pairs: Vec<(String, usize)> = counted.into_iter().collect();
    pairs.sort_by(|a, b| b.1.cmp(&a.1));
    pairs.truncate(limit);
    Ok(pairs)
}

/// `get_churn_hotspots`: files ranked by total lines-added + lines-deleted
/// across their recorded history.
///
/// # Errors
/// Propagates the backing store's error.
pub async fn get_churn_hotspots(
    store: &dyn CommitStore,
    candidate_paths: &[String],
    limit: usize,
) -> Result<Vec<(String, u32)>> {
    let mut hotspots = Vec::with_capacity(candidate_paths.len());
    for path in candidate_paths {
        let changes = store.get_file_changes(path, 10_000).await?;
        let churn: u32 = changes.iter().map(|c| c.lines_added + c.lines_deleted).sum();
        hotspots.push((path.clone(), churn));
    }
    hotspots.sort_by(|a, b| b.1.cmp(&a.1));
    hotspots.truncate(limit);
    Ok(hotspots)
}

/// `get_recent_changes`: the most recent file changes across `path`,
/// newest first.
///
/// # Errors
/// Propagates the backing store's error.
pub async fn get_recent_changes(store: &dyn CommitStore, path: &str, limit: usize) -> Result<Vec<FileChange>> {
    store.get_file_changes(path, limit).await
}

/// `blame_search`: commits touching `path` whose author name/email or
/// message matches `query` (case-insensitive substring).
///
/// # Errors
/// Propagates the backing store's error.
pub async fn blame_search(
    store: &dyn CommitStore,
    path: &str,
    query: &str,
    limit: usize,
) -> Result<Vec<Commit>> {
    let lower = query.to_lowercase();
    let commits = store.get_commits_by_file(path, limit.max(1) * 4).await?;
    Ok(commits
        .into_iter()
        .filter(|c| {
            c.author_name.to_lowercase().contains(&lower)
                || c.author_email.to_lowercase().contains(&lower)
                || c.message.to_lowercase().contains(&lower)
        })
        .take(limit)
        .collect())
}

/// `get_code_authors`: distinct `(author_name, author_email)` pairs that
/// have touched `path`, with their commit counts, descending.
///
/// # Errors
/// Propagates the backing store's error.
pub async fn get_code_authors(store: &dyn CommitStore, path: &str) -> Result<Vec<(String, String, usize)>> {
    let commits = store.get_commits_by_file(path, 10_000).await?;
    let mut counted: std::collections::HashMap<(String, String), usize> = std::collections::HashMap::new();
    for commit in commits {
        *counted.entry((commit.author_name, commit.author_email)).or_insert(0) += 1;
    }
    let mut authors: Vec<(String, String, usize)> =
        counted.into_iter().map(|((name, email), count)| (name, email, count)).collect();
    authors.sort_by(|a, b| b.2.cmp(&a.2));
    Ok(authors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct InMemoryCommitStore {
        commits: Mutex<Vec<Commit>>,
        changes: Mutex<Vec<FileChange>>,
    }

    #[async_trait]
    impl CommitStore for InMemoryCommitStore {
        async fn search_git_commits(
            &self,
            _query: Option<&str>,
            _author: Option<&str>,
            _since: Option<DateTime<Utc>>,
            _until: Option<DateTime<Utc>>,
            limit: usize,
        ) -> Result<Vec<Commit>> {
            Ok(self.commits.lock().iter().take(limit).cloned().collect())
        }

        async fn get_commits_by_file(&self, _path: &str, limit: usize) -> Result<Vec<Commit>> {
            Ok(self.commits.lock().iter().take(limit).cloned().collect())
        }

        async fn store_git_commits(&self, commits: Vec<Commit>) -> Result<usize> {
            let n = commits.len();
            self.commits.lock().extend(commits);
            Ok(n)
        }

        async fn store_git_file_changes(&self, changes: Vec<FileChange>) -> Result<usize> {
            let n = changes.len();
            self.changes.lock().extend(changes);
            Ok(n)
        }

        async fn get_file_changes(&self, path: &str, limit: usize) -> Result<Vec<FileChange>> {
            Ok(self
                .changes
                .lock()
                .iter()
                .filter(|c| c.file_path == path)
                .take(limit)
                .cloned()
                .collect())
        }
    }

    fn sample_commit(hash: &str, author: &str, message: &str) -> Commit {
        Commit {
            hash: hash.to_string(),
            author_name: author.to_string(),
            author_email: format!("{author}@example.com"),
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
    async fn function_evolution_filters_by_message_mention() {
        let store = InMemoryCommitStore::default();
        store
            .store_git_commits(vec![
                sample_commit("c1", "alice", "rewrite parse_query for speed"),
                sample_commit("c2", "bob", "unrelated cleanup"),
            ])
            .await
            .unwrap();
        let evolution = show_function_evolution(&store, "src/query.rs", "parse_query", 10)
            .await
            .unwrap();
        assert_eq!(evolution.len(), 1);
        assert_eq!(evolution[0].hash, "c1");
    }

    #[tokio::test]
    async fn blame_search_matches_author_and_message() {
        let store = InMemoryCommitStore::default();
        store
            .store_git_commits(vec![sample_commit("c1", "alice", "fix bug")])
            .await
            .unwrap();
        let hits = blame_search(&store, "src/lib.rs", "alice", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn churn_hotspots_rank_by_total_lines_changed() {
        let store = InMemoryCommitStore::default();
        store
            .store_git_file_changes(vec![
                FileChange {
                    id: Uuid::new_v4(),
                    commit_hash: "c1".to_string(),
                    file_path: "src/hot.rs".to_string(),
                    change_type: ChangeType::Modified,
                    lines_added: 100,
                    lines_deleted: 50,
                    diff_content: None,
                    diff_embedding: None,
                },
                FileChange {
                    id: Uuid::new_v4(),
                    commit_hash: "c2".to_string(),
                    file_path: "src/cold.rs".to_string(),
                    change_type: ChangeType::Modified,
                    lines_added: 1,
                    lines_deleted: 0,
                    diff_content: None,
                    diff_embedding: None,
                },
            ])
            .await
            .unwrap();
        let hotspots = get_churn_hotspots(&store, &["src/hot.rs".to_string(), "src/cold.rs".to_string()], 10)
            .await
            .unwrap();
        assert_eq!(hotspots[0].0, "src/hot.rs");
    }
}
