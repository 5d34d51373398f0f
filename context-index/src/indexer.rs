//! `IncrementalIndexer`: the concrete [`Indexer`] driving `index_codebase` /
//! `reindex_project` and the auto-indexing service's targeted re-index
//! (§4.6).

use crate::parser::{extract_imports, ParsedFile, SourceParser};
use crate::walker::FileWalker;
use async_trait::async_trait;
use context_core::embeddings::{EmbeddingCache, EmbeddingProvider};
use context_core::error::Result;
use context_core::indexing::{IndexRequest, Indexer};
use context_core::store::VectorStore;
use context_core::types::{CodeUnitMetadata, MemoryFilters, MemoryUnit};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

/// What's currently stored for one file: its content hash (to decide
/// whether to skip re-indexing) and the ids of every unit extracted from
/// it last time (to reap whichever of them the new extraction drops).
#[derive(Default, Clone)]
struct ExistingFileState {
    content_hash: String,
    unit_ids: Vec<Uuid>,
}

/// Walks a project directory (or re-indexes a targeted file list), parses
/// each file into code units, embeds them through the shared cache, and
/// upserts into the vector store keyed by each unit's deterministic id.
pub struct IncrementalIndexer {
    store: Arc<dyn VectorStore>,
    cache: Arc<EmbeddingCache>,
    provider: Arc<dyn EmbeddingProvider>,
    parser: Arc<dyn SourceParser>,
}

impl IncrementalIndexer {
    #[must_use]
    pub fn new(
        store: Arc<dyn VectorStore>,
        cache: Arc<EmbeddingCache>,
        provider: Arc<dyn EmbeddingProvider>,
        parser: Arc<dyn SourceParser>,
    ) -> Self {
        Self { store, cache, provider, parser }
    }

    fn content_hash(source: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        hasher.finalize().iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Parse and (re-)store every unit in `path`, then reap whichever ids
    /// `prior_unit_ids` held for this file that the new extraction no
    /// longer produced (§4.6 step 6: a modified file can drop or rename
    /// units, and their old deterministic ids must not linger).
    ///
    /// Returns `(units_indexed, units_deleted)`.
    async fn index_one_file(
        &self,
        project_name: &str,
        path: &Path,
        bypass_cache: bool,
        histogram: &mut HashMap<String, usize>,
        prior_unit_ids: &[Uuid],
    ) -> Result<(usize, usize)> {
        let source = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "skipping unreadable file");
                return Ok((0, 0));
            }
        };
        let Some(ParsedFile { language, units }) = self.parser.parse_source_file(path, &source)
        else {
            warn!(file = %path.display(), "skipping file with no recognized parser");
            return Ok((0, 0));
        };
        let imports = extract_imports(&language, &source);
        let content_hash = Self::content_hash(&source);
        let file_size = source.len() as u64;
        let last_modified = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .map(chrono::DateTime::<chrono::Utc>::from)
            .unwrap_or_else(|_| chrono::Utc::now());
        let file_path = path.to_string_lossy().to_string();

        *histogram.entry(language.clone()).or_insert(0) += 1;

        let mut indexed = 0;
        let mut fresh_ids = HashSet::new();
        for unit in units {
            let meta = CodeUnitMetadata {
                file_path: file_path.clone(),
                language: language.clone(),
                unit_type: unit.unit_type.clone(),
                unit_name: unit.name.clone(),
                signature: unit.signature.clone(),
                start_line: unit.start_line,
                end_line: unit.end_line,
                // Imports are file-scoped; attach them only to the
                // whole-file "module" unit so dependency-graph aggregation
                // (§4.7) doesn't double-count the same edge per sub-unit.
                imports: if unit.unit_type == "module" { imports.clone() } else { Vec::new() },
                file_size,
                last_modified,
                content_hash: content_hash.clone(),
            };
            let importance = if unit.has_documentation { 0.6 } else { 0.4 };
            let memory = MemoryUnit::new_code_unit(
                project_name,
                unit.content,
                meta,
                self.provider.model_id(),
                importance,
            );
            memory.validate()?;
            fresh_ids.insert(memory.id);

            let vector = if bypass_cache {
                self.provider.embed(&memory.content).await?
            } else {
                self.cache.get_or_embed(&memory.content, self.provider.as_ref()).await?
            };
            self.store.store(memory, vector).await?;
            indexed += 1;
        }

        let mut deleted = 0;
        for prior_id in prior_unit_ids {
            if !fresh_ids.contains(prior_id) && self.store.delete(*prior_id).await? {
                deleted += 1;
            }
        }
        Ok((indexed, deleted))
    }

    /// Delete every currently-stored unit whose `file_path` is no longer
    /// present under `live_files` (a file deleted or moved out of the walk).
    async fn reap_stale_files(&self, project_name: &str, live_files: &HashSet<String>) -> Result<usize> {
        let existing = self.store.list_indexed_units(project_name).await?;
        let mut deleted = 0;
        for unit in existing {
            let Some(meta) = &unit.code_metadata else { continue };
            if !live_files.contains(&meta.file_path) && self.store.delete(unit.id).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// One pass over every stored unit in the project, grouped by file:
    /// each file's content hash (to skip unchanged files) and the ids of
    /// every unit currently stored for it (to reap stale ones after a
    /// re-index).
    async fn existing_file_state(&self, project_name: &str) -> Result<HashMap<String, ExistingFileState>> {
        let existing = self.store.list_indexed_units(project_name).await?;
        let mut by_file: HashMap<String, ExistingFileState> = HashMap::new();
        for unit in existing {
            if let Some(meta) = unit.code_metadata {
                let state = by_file.entry(meta.file_path).or_default();
                state.content_hash = meta.content_hash;
                state.unit_ids.push(unit.id);
            }
        }
        Ok(by_file)
    }
}

#[async_trait]
impl Indexer for IncrementalIndexer {
    async fn index(&self, request: IndexRequest) -> Result<context_core::indexing::IndexReport> {
        let started = Instant::now();
        let files = if request.recursive {
            FileWalker::new(&request.root).walk()
        } else {
            top_level_indexable_files(&request.root)
        };
        let live_files: HashSet<String> =
            files.iter().map(|p| p.to_string_lossy().to_string()).collect();

        let mut units_deleted = if request.clear_existing {
            self.store.delete_code_units_by_project(&request.project_name).await?
        } else {
            self.reap_stale_files(&request.project_name, &live_files).await?
        };

        let existing_state = if request.clear_existing {
            HashMap::new()
        } else {
            self.existing_file_state(&request.project_name).await?
        };

        let mut histogram = HashMap::new();
        let mut units_indexed = 0;
        let mut files_indexed = 0;
        for path in &files {
            let file_path = path.to_string_lossy().to_string();
            let prior_state = existing_state.get(&file_path);
            if !request.bypass_cache {
                if let (Ok(source), Some(state)) = (std::fs::read_to_string(path), prior_state) {
                    if Self::content_hash(&source) == state.content_hash {
                        debug!(file = %file_path, "unchanged, skipping re-index");
                        continue;
                    }
                }
            }
            let prior_unit_ids = prior_state.map(|s| s.unit_ids.as_slice()).unwrap_or_default();
            match self
                .index_one_file(&request.project_name, path, request.bypass_cache, &mut histogram, prior_unit_ids)
                .await
            {
                Ok((indexed, reaped)) => {
                    if indexed > 0 {
                        files_indexed += 1;
                    }
                    units_indexed += indexed;
                    units_deleted += reaped;
                }
                Err(e) => warn!(file = %file_path, error = %e, "failed to index file"),
            }
        }

        Ok(context_core::indexing::IndexReport {
            files_indexed,
            units_indexed,
            units_deleted,
            total_time_s: started.elapsed().as_secs_f64(),
            languages_histogram: histogram,
        })
    }

    async fn index_files(
        &self,
        project_name: &str,
        files: &[PathBuf],
        bypass_cache: bool,
    ) -> Result<context_core::indexing::IndexReport> {
        let started = Instant::now();
        let mut histogram = HashMap::new();
        let mut units_indexed = 0;
        let mut files_indexed = 0;
        let mut units_deleted = 0;
        let existing_state = self.existing_file_state(project_name).await?;

        for path in files {
            let file_path = path.to_string_lossy().to_string();
            if !path.exists() {
                // A watcher-reported deletion: remove every unit for this file.
                if let Some(state) = existing_state.get(&file_path) {
                    for unit_id in &state.unit_ids {
                        if self.store.delete(*unit_id).await? {
                            units_deleted += 1;
                        }
                    }
                }
                continue;
            }
            let prior_unit_ids =
                existing_state.get(&file_path).map(|s| s.unit_ids.as_slice()).unwrap_or_default();
            match self
                .index_one_file(project_name, path, bypass_cache, &mut histogram, prior_unit_ids)
                .await
            {
                Ok((indexed, reaped)) => {
                    if indexed > 0 {
                        files_indexed += 1;
                    }
                    units_indexed += indexed;
                    units_deleted += reaped;
                }
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "failed to index file");
                    return Err(e);
                }
            }
        }

        Ok(context_core::indexing::IndexReport {
            files_indexed,
            units_indexed,
            units_deleted,
            total_time_s: started.elapsed().as_secs_f64(),
            languages_histogram: histogram,
        })
    }
}

fn top_level_indexable_files(root: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(root)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|e| e.path())
                .filter(|p| p.is_file() && crate::walker::is_indexable(p))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::RegexSourceParser;
    use context_core::embeddings::HashEmbeddingProvider;
    use context_core::types::{Page, ScoredMemory, SortBy, SortOrder};
    use chrono::Duration;
    use std::sync::Mutex as StdMutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct InMemoryStore {
        units: StdMutex<HashMap<Uuid, MemoryUnit>>,
    }

    #[async_trait]
    impl VectorStore for InMemoryStore {
        async fn store(&self, memory: MemoryUnit, _vector: Vec<f32>) -> Result<Uuid> {
            let id = memory.id;
            self.units.lock().unwrap().insert(id, memory);
            Ok(id)
        }
        async fn retrieve(
            &self,
            _query_vector: &[f32],
            _filters: &MemoryFilters,
            _limit: usize,
        ) -> Result<Vec<ScoredMemory>> {
            Ok(Vec::new())
        }
        async fn retrieve_by_id(&self, id: Uuid) -> Result<Option<MemoryUnit>> {
            Ok(self.units.lock().unwrap().get(&id).cloned())
        }
        async fn update(
            &self,
            _id: Uuid,
            _fields: serde_json::Value,
            _new_vector: Option<Vec<f32>>,
        ) -> Result<bool> {
            Ok(false)
        }
        async fn delete(&self, id: Uuid) -> Result<bool> {
            Ok(self.units.lock().unwrap().remove(&id).is_some())
        }
        async fn delete_code_units_by_project(&self, project: &str) -> Result<usize> {
            let mut units = self.units.lock().unwrap();
            let before = units.len();
            units.retain(|_, m| m.project_name.as_deref() != Some(project));
            Ok(before - units.len())
        }
        async fn list(
            &self,
            _filters: &MemoryFilters,
            _sort_by: SortBy,
            _sort_order: SortOrder,
            _limit: usize,
            _offset: usize,
        ) -> Result<Page<MemoryUnit>> {
            let items: Vec<_> = self.units.lock().unwrap().values().cloned().collect();
            let total = items.len();
            Ok(Page { items, total })
        }
        async fn count(&self, _filters: &MemoryFilters) -> Result<usize> {
            Ok(self.units.lock().unwrap().len())
        }
        async fn health_check(&self) -> bool {
            true
        }
        async fn get_indexed_files(&self, project: &str) -> Result<Vec<String>> {
            Ok(self
                .units
                .lock()
                .unwrap()
                .values()
                .filter(|m| m.project_name.as_deref() == Some(project))
                .filter_map(|m| m.code_metadata.as_ref().map(|c| c.file_path.clone()))
                .collect())
        }
        async fn list_indexed_units(&self, project: &str) -> Result<Vec<MemoryUnit>> {
            Ok(self
                .units
                .lock()
                .unwrap()
                .values()
                .filter(|m| m.project_name.as_deref() == Some(project))
                .cloned()
                .collect())
        }
    }

    fn test_indexer() -> (Arc<InMemoryStore>, IncrementalIndexer) {
        let store = Arc::new(InMemoryStore::default());
        let cache = Arc::new(EmbeddingCache::new(100, Duration::hours(1)));
        let provider = Arc::new(HashEmbeddingProvider::new("hash-v1"));
        let parser: Arc<dyn SourceParser> = Arc::new(RegexSourceParser::new());
        let indexer = IncrementalIndexer::new(store.clone(), cache, provider, parser);
        (store, indexer)
    }

    #[tokio::test]
    async fn indexes_a_small_python_project() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), "def foo():\n    pass\n").unwrap();
        let (store, indexer) = test_indexer();

        let report = indexer
            .index(IndexRequest {
                root: dir.path().to_path_buf(),
                project_name: "demo".to_string(),
                recursive: true,
                bypass_cache: false,
                clear_existing: false,
            })
            .await
            .unwrap();

        assert_eq!(report.files_indexed, 1);
        assert!(report.units_indexed >= 2); // module unit + foo
        assert_eq!(store.units.lock().unwrap().len(), report.units_indexed);
    }

    #[tokio::test]
    async fn reindex_with_no_changes_skips_unchanged_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), "def foo():\n    pass\n").unwrap();
        let (_store, indexer) = test_indexer();
        let request = || IndexRequest {
            root: dir.path().to_path_buf(),
            project_name: "demo".to_string(),
            recursive: true,
            bypass_cache: false,
            clear_existing: false,
        };
        indexer.index(request()).await.unwrap();
        let second = indexer.index(request()).await.unwrap();
        assert_eq!(second.files_indexed, 0);
    }

    #[tokio::test]
    async fn clear_existing_deletes_prior_units_first() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), "def foo():\n    pass\n").unwrap();
        let (store, indexer) = test_indexer();
        indexer
            .index(IndexRequest {
                root: dir.path().to_path_buf(),
                project_name: "demo".to_string(),
                recursive: true,
                bypass_cache: false,
                clear_existing: false,
            })
            .await
            .unwrap();
        let before = store.units.lock().unwrap().len();
        assert!(before > 0);

        let report = indexer
            .index(IndexRequest {
                root: dir.path().to_path_buf(),
                project_name: "demo".to_string(),
                recursive: true,
                bypass_cache: true,
                clear_existing: true,
            })
            .await
            .unwrap();
        assert_eq!(report.units_deleted, before);
    }

    #[tokio::test]
    async fn deleting_a_file_reaps_its_stale_units_on_next_pass() {
        let dir = tempfile::tempdir().unwrap();
        let file_a = dir.path().join("a.py");
        let file_b = dir.path().join("b.py");
        std::fs::write(&file_a, "def foo():\n    pass\n").unwrap();
        std::fs::write(&file_b, "def bar():\n    pass\n").unwrap();
        let (store, indexer) = test_indexer();
        let request = || IndexRequest {
            root: dir.path().to_path_buf(),
            project_name: "demo".to_string(),
            recursive: true,
            bypass_cache: false,
            clear_existing: false,
        };
        indexer.index(request()).await.unwrap();
        std::fs::remove_file(&file_b).unwrap();
        let report = indexer.index(request()).await.unwrap();
        assert!(report.units_deleted > 0);
        assert!(store
            .units
            .lock()
            .unwrap()
            .values()
            .all(|m| m.code_metadata.as_ref().unwrap().file_path != file_b.to_string_lossy()));
    }

    #[tokio::test]
    async fn removing_a_function_from_a_modified_file_reaps_its_old_unit() {
        let dir = tempfile::tempdir().unwrap();
        let file_a = dir.path().join("a.py");
        std::fs::write(&file_a, "def foo():\n    pass\n\ndef bar():\n    pass\n").unwrap();
        let (store, indexer) = test_indexer();
        let request = || IndexRequest {
            root: dir.path().to_path_buf(),
            project_name: "demo".to_string(),
            recursive: true,
            bypass_cache: false,
            clear_existing: false,
        };
        indexer.index(request()).await.unwrap();
        assert!(store
            .units
            .lock()
            .unwrap()
            .values()
            .any(|m| m.code_metadata.as_ref().is_some_and(|c| c.unit_name == "bar")));

        // `bar` is removed and the file content changes, so its old
        // deterministic-id unit must be reaped, not left orphaned.
        std::fs::write(&file_a, "def foo():\n    pass\n").unwrap();
        let report = indexer.index(request()).await.unwrap();
        assert!(report.units_deleted > 0);
        assert!(store
            .units
            .lock()
            .unwrap()
            .values()
            .all(|m| !m.code_metadata.as_ref().is_some_and(|c| c.unit_name == "bar")));
    }

    #[tokio::test]
    async fn index_files_reindexes_only_the_given_targets() {
        let dir = tempfile::tempdir().unwrap();
        let file_a = dir.path().join("a.py");
        std::fs::write(&file_a, "def foo():\n    pass\n").unwrap();
        let (_store, indexer) = test_indexer();
        let report = indexer.index_files("demo", &[file_a.clone()], false).await.unwrap();
        assert_eq!(report.files_indexed, 1);
    }
}
