//! `create_default_tools()`: the full tool surface (§6.1) exposed over
//! `tools/list`.

use crate::protocol::McpTool;
use serde_json::json;

#[must_use]
pub fn create_default_tools() -> Vec<McpTool> {
    vec![
        McpTool::new(
            "store_memory",
            "Store a new memory unit (preference, fact, event, workflow, or context note)",
            json!({
                "type": "object",
                "properties": {
                    "content": {"type": "string", "description": "The memory content"},
                    "category": {"type": "string", "enum": ["preference", "fact", "event", "workflow", "context", "code"]},
                    "scope": {"type": "string", "enum": ["global", "project"], "default": "global"},
                    "project_name": {"type": "string", "description": "Required when scope = project"},
                    "importance": {"type": "number", "default": 0.5, "minimum": 0.0, "maximum": 1.0},
                    "tags": {"type": "array", "items": {"type": "string"}, "default": []},
                    "context_level": {"type": "string", "enum": ["user_preference", "project_context", "session_state"]}
                },
                "required": ["content", "category"]
            }),
        ),
        McpTool::new(
            "retrieve_memories",
            "Retrieve memories ranked by semantic similarity, keyword match, or a hybrid of both",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "limit": {"type": "integer", "default": 10},
                    "project_name": {"type": "string"},
                    "category": {"type": "string", "enum": ["preference", "fact", "event", "workflow", "context", "code"]},
                    "session_id": {"type": "string", "description": "Conversation session id for recency dedup"},
                    "search_mode": {"type": "string", "enum": ["semantic", "keyword", "hybrid"], "default": "hybrid"}
                },
                "required": ["query"]
            }),
        ),
        McpTool::new(
            "delete_memory",
            "Delete a memory unit by id",
            json!({"type": "object", "properties": {"id": {"type": "string"}}, "required": ["id"]}),
        ),
        McpTool::new(
            "get_memory_by_id",
            "Fetch a single memory unit by id",
            json!({"type": "object", "properties": {"id": {"type": "string"}}, "required": ["id"]}),
        ),
        McpTool::new(
            "update_memory",
            "Partially update a memory's fields, optionally regenerating its embedding",
            json!({
                "type": "object",
                "properties": {
                    "id": {"type": "string"},
                    "fields": {"type": "object", "description": "Partial field updates"},
                    "new_content": {"type": "string"},
                    "regenerate_embedding": {"type": "boolean", "default": false}
                },
                "required": ["id", "fields"]
            }),
        ),
        McpTool::new(
            "list_memories",
            "Paginated listing of memories matching a filter",
            json!({
                "type": "object",
                "properties": {
                    "project_name": {"type": "string"},
                    "category": {"type": "string"},
                    "sort_by": {"type": "string", "enum": ["created_at", "updated_at", "importance"], "default": "created_at"},
                    "sort_order": {"type": "string", "enum": ["ascending", "descending"], "default": "descending"},
                    "limit": {"type": "integer", "default": 20},
                    "offset": {"type": "integer", "default": 0}
                }
            }),
        ),
        McpTool::new(
            "export_memories",
            "Export memories matching a filter as a MemoryUnit-only JSON array",
            json!({"type": "object", "properties": {"project_name": {"type": "string"}, "category": {"type": "string"}}}),
        ),
        McpTool::new(
            "import_memories",
            "Import a previously exported batch of memory units",
            json!({
                "type": "object",
                "properties": {
                    "units": {"type": "array", "items": {"type": "object"}},
                    "overwrite": {"type": "boolean", "default": false}
                },
                "required": ["units"]
            }),
        ),
        McpTool::new(
            "migrate_memory_scope",
            "Move a memory between global scope and a named project",
            json!({
                "type": "object",
                "properties": {"id": {"type": "string"}, "new_project": {"type": "string"}},
                "required": ["id"]
            }),
        ),
        McpTool::new(
            "bulk_reclassify",
            "Reassign the context level for every memory matching a filter",
            json!({
                "type": "object",
                "properties": {
                    "new_level": {"type": "string", "enum": ["user_preference", "project_context", "session_state"]},
                    "project_name": {"type": "string"},
                    "category": {"type": "string"}
                },
                "required": ["new_level"]
            }),
        ),
        McpTool::new(
            "find_duplicate_memories",
            "Group stored memories into clusters whose pairwise similarity exceeds a threshold",
            json!({
                "type": "object",
                "properties": {
                    "project_name": {"type": "string"},
                    "threshold": {"type": "number", "default": 0.95}
                }
            }),
        ),
        McpTool::new(
            "merge_memories",
            "Merge several memories into one, concatenating content and deleting the rest",
            json!({
                "type": "object",
                "properties": {
                    "ids": {"type": "array", "items": {"type": "string"}},
                    "keep_id": {"type": "string"}
                },
                "required": ["ids"]
            }),
        ),
        McpTool::new(
            "search_code",
            "Search indexed code units with optional file/language/quality narrowing",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "project_name": {"type": "string"},
                    "limit": {"type": "integer", "default": 10},
                    "search_mode": {"type": "string", "enum": ["semantic", "keyword", "hybrid"], "default": "hybrid"},
                    "file_pattern": {"type": "string"},
                    "language": {"type": "string"},
                    "include_quality": {"type": "boolean", "default": false},
                    "min_complexity": {"type": "integer"},
                    "max_complexity": {"type": "integer"},
                    "has_duplicates": {"type": "boolean"},
                    "long_functions_only": {"type": "boolean", "default": false},
                    "maintainability_min": {"type": "number"}
                },
                "required": ["query"]
            }),
        ),
        McpTool::new(
            "find_similar_code",
            "Find code units similar to a given snippet",
            json!({
                "type": "object",
                "properties": {
                    "snippet": {"type": "string"},
                    "project_name": {"type": "string"},
                    "limit": {"type": "integer", "default": 10}
                },
                "required": ["snippet"]
            }),
        ),
        McpTool::new(
            "search_all_projects",
            "Search code across every opted-in project",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "current_project": {"type": "string"},
                    "candidate_projects": {"type": "array", "items": {"type": "string"}, "default": []},
                    "limit": {"type": "integer", "default": 10},
                    "search_all": {"type": "boolean", "default": false}
                },
                "required": ["query", "current_project"]
            }),
        ),
        McpTool::new(
            "opt_in_cross_project",
            "Allow this project's code to be searched from other projects",
            json!({"type": "object", "properties": {"project_name": {"type": "string"}}, "required": ["project_name"]}),
        ),
        McpTool::new(
            "opt_out_cross_project",
            "Withdraw this project from cross-project code search",
            json!({"type": "object", "properties": {"project_name": {"type": "string"}}, "required": ["project_name"]}),
        ),
        McpTool::new("list_opted_in_projects", "List every project currently opted in to cross-project search", json!({"type": "object", "properties": {}})),
        McpTool::new(
            "index_codebase",
            "Run a full or incremental indexing pass over a project directory",
            json!({
                "type": "object",
                "properties": {
                    "root": {"type": "string"},
                    "project_name": {"type": "string"},
                    "recursive": {"type": "boolean", "default": true},
                    "bypass_cache": {"type": "boolean", "default": false},
                    "clear_existing": {"type": "boolean", "default": false}
                },
                "required": ["root", "project_name"]
            }),
        ),
        McpTool::new(
            "reindex_project",
            "Re-run indexing for an already-known project (same operation as index_codebase)",
            json!({
                "type": "object",
                "properties": {
                    "root": {"type": "string"},
                    "project_name": {"type": "string"},
                    "bypass_cache": {"type": "boolean", "default": false}
                },
                "required": ["root", "project_name"]
            }),
        ),
        McpTool::new(
            "get_file_dependencies",
            "List files a given file imports from (direct or transitive)",
            json!({
                "type": "object",
                "properties": {"project_name": {"type": "string"}, "file": {"type": "string"}},
                "required": ["project_name", "file"]
            }),
        ),
        McpTool::new(
            "get_file_dependents",
            "List files that import from a given file",
            json!({
                "type": "object",
                "properties": {"project_name": {"type": "string"}, "file": {"type": "string"}},
                "required": ["project_name", "file"]
            }),
        ),
        McpTool::new(
            "find_dependency_path",
            "Find an import path between two files in a project's dependency graph",
            json!({
                "type": "object",
                "properties": {
                    "project_name": {"type": "string"},
                    "source": {"type": "string"},
                    "target": {"type": "string"},
                    "max_depth": {"type": "integer", "default": 20}
                },
                "required": ["project_name", "source", "target"]
            }),
        ),
        McpTool::new(
            "get_dependency_stats",
            "File count, edge count, and circular-dependency group count for a project",
            json!({"type": "object", "properties": {"project_name": {"type": "string"}}, "required": ["project_name"]}),
        ),
        McpTool::new(
            "get_dependency_graph",
            "Export a project's dependency graph as DOT, JSON, or Mermaid",
            json!({
                "type": "object",
                "properties": {
                    "project_name": {"type": "string"},
                    "format": {"type": "string", "enum": ["dot", "json", "mermaid"], "default": "json"},
                    "file_pattern": {"type": "string"},
                    "max_depth": {"type": "integer"}
                },
                "required": ["project_name"]
            }),
        ),
        McpTool::new(
            "start_conversation_session",
            "Begin a conversation session for recency-aware query expansion and result dedup",
            json!({"type": "object", "properties": {"description": {"type": "string"}}}),
        ),
        McpTool::new(
            "end_conversation_session",
            "End a conversation session",
            json!({"type": "object", "properties": {"session_id": {"type": "string"}}, "required": ["session_id"]}),
        ),
        McpTool::new("list_conversation_sessions", "List active conversation sessions", json!({"type": "object", "properties": {}})),
        McpTool::new(
            "submit_search_feedback",
            "Record whether a retrieved memory was helpful, for quality tracking",
            json!({
                "type": "object",
                "properties": {
                    "memory_id": {"type": "string"},
                    "query": {"type": "string"},
                    "helpful": {"type": "boolean"}
                },
                "required": ["memory_id", "query", "helpful"]
            }),
        ),
        McpTool::new(
            "get_quality_metrics",
            "Aggregate or per-memory search-feedback quality metrics",
            json!({"type": "object", "properties": {"memory_id": {"type": "string"}}}),
        ),
        McpTool::new(
            "get_indexed_files",
            "List every indexed file path for a project",
            json!({"type": "object", "properties": {"project_name": {"type": "string"}}, "required": ["project_name"]}),
        ),
        McpTool::new(
            "list_indexed_units",
            "Metadata-only projection of every indexed code unit in a project",
            json!({"type": "object", "properties": {"project_name": {"type": "string"}}, "required": ["project_name"]}),
        ),
        McpTool::new("get_status", "Engine health and cache/session snapshot", json!({"type": "object", "properties": {}})),
        McpTool::new(
            "search_git_history",
            "Search stored commit messages for a query",
            json!({
                "type": "object",
                "properties": {"query": {"type": "string"}, "limit": {"type": "integer", "default": 10}},
                "required": ["query"]
            }),
        ),
        McpTool::new(
            "index_git_history",
            "Store a batch of pre-collected commits and file changes (does not shell out to git itself)",
            json!({
                "type": "object",
                "properties": {
                    "commits": {"type": "array", "items": {"type": "object"}, "default": []},
                    "changes": {"type": "array", "items": {"type": "object"}, "default": []}
                }
            }),
        ),
        McpTool::new(
            "show_function_evolution",
            "Commits that touched a named function in a file, most recent first",
            json!({
                "type": "object",
                "properties": {
                    "file_path": {"type": "string"},
                    "function_name": {"type": "string"},
                    "limit": {"type": "integer", "default": 20}
                },
                "required": ["file_path", "function_name"]
            }),
        ),
        McpTool::new(
            "get_change_frequency",
            "Files under a path ranked by how often they change",
            json!({
                "type": "object",
                "properties": {"path": {"type": "string"}, "limit": {"type": "integer", "default": 20}},
                "required": ["path"]
            }),
        ),
        McpTool::new(
            "get_churn_hotspots",
            "Candidate paths ranked by total lines changed",
            json!({
                "type": "object",
                "properties": {
                    "candidate_paths": {"type": "array", "items": {"type": "string"}},
                    "limit": {"type": "integer", "default": 20}
                },
                "required": ["candidate_paths"]
            }),
        ),
        McpTool::new(
            "get_recent_changes",
            "Most recent file changes under a path",
            json!({
                "type": "object",
                "properties": {"path": {"type": "string"}, "limit": {"type": "integer", "default": 20}},
                "required": ["path"]
            }),
        ),
        McpTool::new(
            "blame_search",
            "Commits touching a path whose message matches a query",
            json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "query": {"type": "string"},
                    "limit": {"type": "integer", "default": 20}
                },
                "required": ["path", "query"]
            }),
        ),
        McpTool::new(
            "get_code_authors",
            "Authors of a path ranked by change count",
            json!({"type": "object", "properties": {"path": {"type": "string"}}, "required": ["path"]}),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_tool_has_a_unique_name_and_object_schema() {
        let tools = create_default_tools();
        let mut names = std::collections::HashSet::new();
        for tool in &tools {
            assert!(names.insert(tool.name.clone()), "duplicate tool name {}", tool.name);
            assert_eq!(tool.input_schema["type"], "object");
        }
        assert!(tools.len() >= 30);
    }
}
