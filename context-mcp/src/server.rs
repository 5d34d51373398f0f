//! Dispatches `tools/call` requests to [`RetrievalOrchestrator`] operations.

use anyhow::{anyhow, Context as _, Result as AnyResult};
use context_core::indexing::IndexRequest;
use context_core::orchestrator::{
    CodeSearchOptions, GraphFormat, QualityFilters, RetrievalOrchestrator, SearchMode,
};
use context_core::types::{
    ContextLevel, MemoryCategory, MemoryFilters, MemoryUnit, Scope, SortBy, SortOrder,
};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use uuid::Uuid;

/// Thin wrapper around the orchestrator for the MCP transport: every tool
/// call deserializes its JSON `arguments`, invokes one orchestrator
/// operation, and serializes the result back to JSON.
pub struct ContextMcpServer {
    engine: Arc<RetrievalOrchestrator>,
}

impl ContextMcpServer {
    #[must_use]
    pub fn new(engine: Arc<RetrievalOrchestrator>) -> Self {
        Self { engine }
    }

    /// Dispatch one `tools/call` invocation.
    ///
    /// # Errors
    /// Returns an error if `arguments` don't match the tool's expected
    /// shape, the tool name is unknown, or the underlying operation fails.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> AnyResult<Value> {
        match name {
            "store_memory" => self.store_memory(arguments).await,
            "retrieve_memories" => self.retrieve_memories(arguments).await,
            "delete_memory" => self.delete_memory(arguments).await,
            "get_memory_by_id" => self.get_memory_by_id(arguments).await,
            "update_memory" => self.update_memory(arguments).await,
            "list_memories" => self.list_memories(arguments).await,
            "export_memories" => self.export_memories(arguments).await,
            "import_memories" => self.import_memories(arguments).await,
            "migrate_memory_scope" => self.migrate_memory_scope(arguments).await,
            "bulk_reclassify" => self.bulk_reclassify(arguments).await,
            "find_duplicate_memories" => self.find_duplicate_memories(arguments).await,
            "merge_memories" => self.merge_memories(arguments).await,
            "search_code" => self.search_code(arguments).await,
            "find_similar_code" => self.find_similar_code(arguments).await,
            "search_all_projects" => self.search_all_projects(arguments).await,
            "opt_in_cross_project" => self.opt_in_cross_project(arguments).await,
            "opt_out_cross_project" => self.opt_out_cross_project(arguments).await,
            "list_opted_in_projects" => Ok(json!(self.engine.list_opted_in_projects().await)),
            "index_codebase" | "reindex_project" => self.index_codebase(arguments).await,
            "get_file_dependencies" => self.get_file_dependencies(arguments).await,
            "get_file_dependents" => self.get_file_dependents(arguments).await,
            "find_dependency_path" => self.find_dependency_path(arguments).await,
            "get_dependency_stats" => self.get_dependency_stats(arguments).await,
            "get_dependency_graph" => self.get_dependency_graph(arguments).await,
            "start_conversation_session" => self.start_conversation_session(arguments),
            "end_conversation_session" => self.end_conversation_session(arguments),
            "list_conversation_sessions" => Ok(json!(self.engine.list_conversation_sessions())),
            "submit_search_feedback" => self.submit_search_feedback(arguments).await,
            "get_quality_metrics" => self.get_quality_metrics(arguments).await,
            "get_indexed_files" => self.get_indexed_files(arguments).await,
            "list_indexed_units" => self.list_indexed_units(arguments).await,
            "get_status" => Ok(serde_json::to_value(self.engine.get_status().await)?),
            "search_git_history" => self.search_git_history(arguments).await,
            "index_git_history" => self.index_git_history(arguments).await,
            "show_function_evolution" => self.show_function_evolution(arguments).await,
            "get_change_frequency" => self.get_change_frequency(arguments).await,
            "get_churn_hotspots" => self.get_churn_hotspots(arguments).await,
            "get_recent_changes" => self.get_recent_changes(arguments).await,
            "blame_search" => self.blame_search(arguments).await,
            "get_code_authors" => self.get_code_authors(arguments).await,
            other => Err(anyhow!("unknown tool '{other}'")),
        }
    }

    async fn store_memory(&self, args: Value) -> AnyResult<Value> {
        let content = require_str(&args, "content")?;
        let category = parse_category(require_str(&args, "category")?)?;
        let scope = match args.get("scope").and_then(Value::as_str) {
            Some("project") => Scope::Project,
            _ => Scope::Global,
        };
        let project_name = args.get("project_name").and_then(Value::as_str).map(str::to_string);
        let importance = args.get("importance").and_then(Value::as_f64).unwrap_or(0.5) as f32;
        let tags: BTreeSet<String> = args
            .get("tags")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        let context_level =
            args.get("context_level").and_then(Value::as_str).map(parse_context_level).transpose()?;

        let id = self
            .engine
            .store_memory(
                content.to_string(),
                category,
                scope,
                project_name,
                importance,
                tags,
                BTreeMap::new(),
                context_level,
            )
            .await?;
        Ok(json!({ "id": id }))
    }

    async fn retrieve_memories(&self, args: Value) -> AnyResult<Value> {
        let query = require_str(&args, "query")?;
        let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(10) as usize;
        let filters = build_filters(&args);
        let session_id = optional_uuid(&args, "session_id")?;
        let search_mode = parse_search_mode(args.get("search_mode").and_then(Value::as_str));
        let response = self.engine.retrieve_memories(query, limit, filters, session_id, search_mode).await?;
        Ok(serde_json::to_value(response)?)
    }

    async fn delete_memory(&self, args: Value) -> AnyResult<Value> {
        let id = require_uuid(&args, "id")?;
        Ok(json!({ "deleted": self.engine.delete_memory(id).await? }))
    }

    async fn get_memory_by_id(&self, args: Value) -> AnyResult<Value> {
        let id = require_uuid(&args, "id")?;
        Ok(serde_json::to_value(self.engine.get_memory_by_id(id).await?)?)
    }

    async fn update_memory(&self, args: Value) -> AnyResult<Value> {
        let id = require_uuid(&args, "id")?;
        let fields = args.get("fields").cloned().unwrap_or_else(|| json!({}));
        let new_content = args.get("new_content").and_then(Value::as_str);
        let regenerate = args.get("regenerate_embedding").and_then(Value::as_bool).unwrap_or(false);
        Ok(json!({ "updated": self.engine.update_memory(id, fields, new_content, regenerate).await? }))
    }

    async fn list_memories(&self, args: Value) -> AnyResult<Value> {
        let filters = build_filters(&args);
        let sort_by = match args.get("sort_by").and_then(Value::as_str) {
            Some("updated_at") => SortBy::UpdatedAt,
            Some("importance") => SortBy::Importance,
            _ => SortBy::CreatedAt,
        };
        let sort_order = match args.get("sort_order").and_then(Value::as_str) {
            Some("ascending") => SortOrder::Ascending,
            _ => SortOrder::Descending,
        };
        let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(20) as usize;
        let offset = args.get("offset").and_then(Value::as_u64).unwrap_or(0) as usize;
        let page = self.engine.list_memories(filters, sort_by, sort_order, limit, offset).await?;
        Ok(serde_json::to_value(page)?)
    }

    async fn export_memories(&self, args: Value) -> AnyResult<Value> {
        let filters = build_filters(&args);
        Ok(serde_json::to_value(self.engine.export_memories(filters).await?)?)
    }

    async fn import_memories(&self, args: Value) -> AnyResult<Value> {
        let units_json = args.get("units").cloned().unwrap_or_else(|| json!([]));
        let units: Vec<MemoryUnit> = serde_json::from_value(units_json).context("invalid `units`")?;
        let overwrite = args.get("overwrite").and_then(Value::as_bool).unwrap_or(false);
        Ok(json!({ "imported": self.engine.import_memories(units, overwrite).await? }))
    }

    async fn migrate_memory_scope(&self, args: Value) -> AnyResult<Value> {
        let id = require_uuid(&args, "id")?;
        let new_project = args.get("new_project").and_then(Value::as_str).map(str::to_string);
        Ok(json!({ "migrated": self.engine.migrate_memory_scope(id, new_project).await? }))
    }

    async fn bulk_reclassify(&self, args: Value) -> AnyResult<Value> {
        let new_level = parse_context_level(require_str(&args, "new_level")?)?;
        let filters = build_filters(&args);
        Ok(json!({ "reclassified": self.engine.bulk_reclassify(new_level, filters).await? }))
    }

    async fn find_duplicate_memories(&self, args: Value) -> AnyResult<Value> {
        let project = args.get("project_name").and_then(Value::as_str);
        let threshold = args.get("threshold").and_then(Value::as_f64).unwrap_or(0.95) as f32;
        Ok(serde_json::to_value(self.engine.find_duplicate_memories(project, threshold).await?)?)
    }

    async fn merge_memories(&self, args: Value) -> AnyResult<Value> {
        let ids = require_uuid_array(&args, "ids")?;
        let keep_id = optional_uuid(&args, "keep_id")?;
        Ok(json!({ "merged_id": self.engine.merge_memories(&ids, keep_id).await? }))
    }

    async fn search_code(&self, args: Value) -> AnyResult<Value> {
        let query = require_str(&args, "query")?;
        let project = args.get("project_name").and_then(Value::as_str);
        let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(10) as usize;
        let search_mode = parse_search_mode(args.get("search_mode").and_then(Value::as_str));
        let quality_filters = QualityFilters {
            min_complexity: args.get("min_complexity").and_then(Value::as_u64).map(|v| v as u32),
            max_complexity: args.get("max_complexity").and_then(Value::as_u64).map(|v| v as u32),
            has_duplicates: args.get("has_duplicates").and_then(Value::as_bool),
            long_functions_only: args.get("long_functions_only").and_then(Value::as_bool).unwrap_or(false),
            maintainability_min: args.get("maintainability_min").and_then(Value::as_f64).map(|v| v as f32),
        };
        let include_quality = args.get("include_quality").and_then(Value::as_bool).unwrap_or(false);
        let has_quality_filter = quality_filters.min_complexity.is_some()
            || quality_filters.max_complexity.is_some()
            || quality_filters.has_duplicates.is_some()
            || quality_filters.long_functions_only
            || quality_filters.maintainability_min.is_some();
        let options = CodeSearchOptions {
            file_pattern: args.get("file_pattern").and_then(Value::as_str).map(str::to_string),
            language: args.get("language").and_then(Value::as_str).map(str::to_string),
            quality_filters: has_quality_filter.then_some(quality_filters),
            include_quality,
        };
        let results = self.engine.search_code(query, project, limit, search_mode, options).await?;
        Ok(serde_json::to_value(results)?)
    }

    async fn find_similar_code(&self, args: Value) -> AnyResult<Value> {
        let snippet = require_str(&args, "snippet")?;
        let project = args.get("project_name").and_then(Value::as_str);
        let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(10) as usize;
        Ok(serde_json::to_value(self.engine.find_similar_code(snippet, project, limit).await?)?)
    }

    async fn search_all_projects(&self, args: Value) -> AnyResult<Value> {
        let query = require_str(&args, "query")?;
        let current_project = require_str(&args, "current_project")?;
        let candidates: Vec<String> = args
            .get("candidate_projects")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(10) as usize;
        let search_all = args.get("search_all").and_then(Value::as_bool).unwrap_or(false);
        let results = self
            .engine
            .search_all_projects(query, current_project, &candidates, limit, search_all)
            .await?;
        Ok(serde_json::to_value(results)?)
    }

    async fn opt_in_cross_project(&self, args: Value) -> AnyResult<Value> {
        let project = require_str(&args, "project_name")?;
        self.engine.opt_in_cross_project(project).await?;
        Ok(json!({ "ok": true }))
    }

    async fn opt_out_cross_project(&self, args: Value) -> AnyResult<Value> {
        let project = require_str(&args, "project_name")?;
        self.engine.opt_out_cross_project(project).await?;
        Ok(json!({ "ok": true }))
    }

    async fn index_codebase(&self, args: Value) -> AnyResult<Value> {
        let root = require_str(&args, "root")?;
        let project_name = require_str(&args, "project_name")?.to_string();
        let recursive = args.get("recursive").and_then(Value::as_bool).unwrap_or(true);
        let bypass_cache = args.get("bypass_cache").and_then(Value::as_bool).unwrap_or(false);
        let clear_existing = args.get("clear_existing").and_then(Value::as_bool).unwrap_or(false);
        let request = IndexRequest {
            root: root.into(),
            project_name,
            recursive,
            bypass_cache,
            clear_existing,
        };
        Ok(serde_json::to_value(self.engine.index_codebase(request).await?)?)
    }

    async fn get_file_dependencies(&self, args: Value) -> AnyResult<Value> {
        let project = require_str(&args, "project_name")?;
        let file = require_str(&args, "file")?;
        Ok(serde_json::to_value(self.engine.get_file_dependencies(project, file).await?)?)
    }

    async fn get_file_dependents(&self, args: Value) -> AnyResult<Value> {
        let project = require_str(&args, "project_name")?;
        let file = require_str(&args, "file")?;
        Ok(serde_json::to_value(self.engine.get_file_dependents(project, file).await?)?)
    }

    async fn find_dependency_path(&self, args: Value) -> AnyResult<Value> {
        let project = require_str(&args, "project_name")?;
        let source = require_str(&args, "source")?;
        let target = require_str(&args, "target")?;
        let max_depth = args.get("max_depth").and_then(Value::as_u64).unwrap_or(20) as usize;
        Ok(serde_json::to_value(self.engine.find_dependency_path(project, source, target, max_depth).await?)?)
    }

    async fn get_dependency_stats(&self, args: Value) -> AnyResult<Value> {
        let project = require_str(&args, "project_name")?;
        Ok(serde_json::to_value(self.engine.get_dependency_stats(project).await?)?)
    }

    async fn get_dependency_graph(&self, args: Value) -> AnyResult<Value> {
        let project = require_str(&args, "project_name")?;
        let format = match args.get("format").and_then(Value::as_str) {
            Some("dot") => GraphFormat::Dot,
            Some("mermaid") => GraphFormat::Mermaid,
            _ => GraphFormat::Json,
        };
        let filter = context_core::graph_export::ExportFilter {
            file_pattern: args.get("file_pattern").and_then(Value::as_str).map(str::to_string),
            max_depth: args.get("max_depth").and_then(Value::as_u64).map(|v| v as usize),
        };
        let graph = self.engine.get_dependency_graph(project, format, filter).await?;
        Ok(json!({ "graph": graph }))
    }

    fn start_conversation_session(&self, args: Value) -> AnyResult<Value> {
        let description = args.get("description").and_then(Value::as_str).map(str::to_string);
        Ok(json!({ "session_id": self.engine.start_conversation_session(description) }))
    }

    fn end_conversation_session(&self, args: Value) -> AnyResult<Value> {
        let id = require_uuid(&args, "session_id")?;
        Ok(json!({ "ended": self.engine.end_conversation_session(id) }))
    }

    async fn submit_search_feedback(&self, args: Value) -> AnyResult<Value> {
        let memory_id = require_uuid(&args, "memory_id")?;
        let query = require_str(&args, "query")?;
        let helpful = args.get("helpful").and_then(Value::as_bool).unwrap_or(false);
        self.engine.submit_search_feedback(memory_id, query, helpful).await?;
        Ok(json!({ "ok": true }))
    }

    async fn get_quality_metrics(&self, args: Value) -> AnyResult<Value> {
        let memory_id = optional_uuid(&args, "memory_id")?;
        Ok(serde_json::to_value(self.engine.get_quality_metrics(memory_id).await?)?)
    }

    async fn get_indexed_files(&self, args: Value) -> AnyResult<Value> {
        let project = require_str(&args, "project_name")?;
        Ok(serde_json::to_value(self.engine.get_indexed_files(project).await?)?)
    }

    async fn list_indexed_units(&self, args: Value) -> AnyResult<Value> {
        let project = require_str(&args, "project_name")?;
        Ok(serde_json::to_value(self.engine.list_indexed_units(project).await?)?)
    }

    async fn search_git_history(&self, args: Value) -> AnyResult<Value> {
        let query = require_str(&args, "query")?;
        let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(10) as usize;
        Ok(serde_json::to_value(self.engine.search_git_history(query, limit).await?)?)
    }

    async fn index_git_history(&self, args: Value) -> AnyResult<Value> {
        let commits = args.get("commits").cloned().unwrap_or_else(|| json!([]));
        let changes = args.get("changes").cloned().unwrap_or_else(|| json!([]));
        let commits = serde_json::from_value(commits).context("invalid `commits`")?;
        let changes = serde_json::from_value(changes).context("invalid `changes`")?;
        let (stored_commits, stored_changes) = self.engine.index_git_history(commits, changes).await?;
        Ok(json!({ "commits_stored": stored_commits, "changes_stored": stored_changes }))
    }

    async fn show_function_evolution(&self, args: Value) -> AnyResult<Value> {
        let file_path = require_str(&args, "file_path")?;
        let function_name = require_str(&args, "function_name")?;
        let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(20) as usize;
        Ok(serde_json::to_value(self.engine.show_function_evolution(file_path, function_name, limit).await?)?)
    }

    async fn get_change_frequency(&self, args: Value) -> AnyResult<Value> {
        let path = require_str(&args, "path")?;
        let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(20) as usize;
        Ok(serde_json::to_value(self.engine.get_change_frequency(path, limit).await?)?)
    }

    async fn get_churn_hotspots(&self, args: Value) -> AnyResult<Value> {
        let paths: Vec<String> = args
            .get("candidate_paths")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(20) as usize;
        Ok(serde_json::to_value(self.engine.get_churn_hotspots(&paths, limit).await?)?)
    }

    async fn get_recent_changes(&self, args: Value) -> AnyResult<Value> {
        let path = require_str(&args, "path")?;
        let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(20) as usize;
        Ok(serde_json::to_value(self.engine.get_recent_changes(path, limit).await?)?)
    }

    async fn blame_search(&self, args: Value) -> AnyResult<Value> {
        let path = require_str(&args, "path")?;
        let query = require_str(&args, "query")?;
        let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(20) as usize;
        Ok(serde_json::to_value(self.engine.blame_search(path, query, limit).await?)?)
    }

    async fn get_code_authors(&self, args: Value) -> AnyResult<Value> {
        let path = require_str(&args, "path")?;
        Ok(serde_json::to_value(self.engine.get_code_authors(path).await?)?)
    }
}

fn require_str<'a>(args: &'a Value, field: &str) -> AnyResult<&'a str> {
    args.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("missing required string field '{field}'"))
}

fn require_uuid(args: &Value, field: &str) -> AnyResult<Uuid> {
    Uuid::parse_str(require_str(args, field)?).with_context(|| format!("'{field}' is not a valid uuid"))
}

fn optional_uuid(args: &Value, field: &str) -> AnyResult<Option<Uuid>> {
    args.get(field)
        .and_then(Value::as_str)
        .map(Uuid::parse_str)
        .transpose()
        .with_context(|| format!("'{field}' is not a valid uuid"))
}

fn require_uuid_array(args: &Value, field: &str) -> AnyResult<Vec<Uuid>> {
    args.get(field)
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("missing required array field '{field}'"))?
        .iter()
        .map(|v| {
            v.as_str()
                .ok_or_else(|| anyhow!("'{field}' must contain strings"))
                .and_then(|s| Uuid::parse_str(s).map_err(|e| anyhow!("invalid uuid in '{field}': {e}")))
        })
        .collect()
}

fn parse_category(raw: &str) -> AnyResult<MemoryCategory> {
    match raw {
        "preference" => Ok(MemoryCategory::Preference),
        "fact" => Ok(MemoryCategory::Fact),
        "event" => Ok(MemoryCategory::Event),
        "workflow" => Ok(MemoryCategory::Workflow),
        "context" => Ok(MemoryCategory::Context),
        "code" => Ok(MemoryCategory::Code),
        other => Err(anyhow!("unknown category '{other}'")),
    }
}

fn parse_context_level(raw: &str) -> AnyResult<ContextLevel> {
    match raw {
        "user_preference" => Ok(ContextLevel::UserPreference),
        "project_context" => Ok(ContextLevel::ProjectContext),
        "session_state" => Ok(ContextLevel::SessionState),
        other => Err(anyhow!("unknown context_level '{other}'")),
    }
}

fn parse_search_mode(raw: Option<&str>) -> SearchMode {
    match raw {
        Some("semantic") => SearchMode::Semantic,
        Some("keyword") => SearchMode::Keyword,
        _ => SearchMode::Hybrid,
    }
}

fn build_filters(args: &Value) -> MemoryFilters {
    MemoryFilters {
        project_name: args.get("project_name").and_then(Value::as_str).map(str::to_string),
        category: args.get("category").and_then(Value::as_str).and_then(|s| parse_category(s).ok()),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_category_rejects_unknown_values() {
        assert!(parse_category("nonsense").is_err());
        assert!(parse_category("code").is_ok());
    }

    #[test]
    fn require_str_reports_missing_field() {
        let args = json!({});
        assert!(require_str(&args, "content").is_err());
    }

    #[test]
    fn require_uuid_array_rejects_non_string_entries() {
        let args = json!({ "ids": [1, 2] });
        assert!(require_uuid_array(&args, "ids").is_err());
    }

    #[test]
    fn build_filters_reads_project_and_category() {
        let args = json!({ "project_name": "demo", "category": "code" });
        let filters = build_filters(&args);
        assert_eq!(filters.project_name.as_deref(), Some("demo"));
        assert_eq!(filters.category, Some(MemoryCategory::Code));
    }
}
