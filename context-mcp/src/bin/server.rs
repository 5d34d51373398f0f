//! Binary entry point: wires a `redb`-backed engine together and runs the
//! JSON-RPC/MCP message loop over stdio.

use anyhow::Context;
use chrono::Duration;
use context_core::config::EngineConfig;
use context_core::consent::ConsentRegistry;
use context_core::embeddings::{EmbeddingCache, HashEmbeddingProvider};
use context_core::feedback::FeedbackStore;
use context_core::git_history::CommitStore;
use context_core::indexing::Indexer;
use context_core::orchestrator::RetrievalOrchestrator;
use context_core::session::ConversationTracker;
use context_core::store::VectorStore;
use context_core::usage::{UsageBackingStore, UsageTracker, UsageWeights};
use context_index::{IncrementalIndexer, RegexSourceParser};
use context_mcp::jsonrpc::{read_next_message, write_response_with_length, write_response_line};
use context_mcp::protocol::{handle_initialize, handle_list_tools, handle_shutdown};
use context_mcp::{create_default_tools, ContextMcpServer};
use context_storage::RedbStore;
use serde_json::{json, Value};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    info!("starting context retrieval engine MCP server");

    let config_path = std::env::var("CONTEXT_CONFIG_PATH").ok().map(PathBuf::from);
    let config = EngineConfig::load(config_path.as_deref()).context("loading engine configuration")?;

    let data_dir = std::env::var("CONTEXT_DATA_DIR").unwrap_or_else(|_| "./data".to_string());
    std::fs::create_dir_all(&data_dir).context("creating data directory")?;
    let db_path = Path::new(&data_dir).join("context.redb");

    let store = RedbStore::open(&db_path).await.context("opening redb store")?;

    let vector_store: Arc<dyn VectorStore> = Arc::new(store.clone());
    let usage_backing_store: Arc<dyn UsageBackingStore> =
        Arc::new(context_storage::RedbUsageBackingStore::new(store.clone()));
    let consent_registry: Arc<dyn ConsentRegistry> =
        Arc::new(context_storage::RedbConsentRegistry::new(store.clone()));
    let feedback_store: Arc<dyn FeedbackStore> =
        Arc::new(context_storage::RedbFeedbackStore::new(store.clone()));
    let commit_store: Arc<dyn CommitStore> = Arc::new(context_storage::RedbCommitStore::new(store.clone()));
    let cache_persistence = Arc::new(context_storage::RedbCachePersistence::new(store.clone()));

    let embedding_cache =
        Arc::new(EmbeddingCache::new(10_000, Duration::hours(24)).with_persistence(cache_persistence));
    let embedding_provider = Arc::new(HashEmbeddingProvider::new(config.embedding_model.clone()));
    let usage_tracker = Arc::new(UsageTracker::new(
        config.usage_batch_size,
        UsageWeights {
            w_similarity: config.ranking_weight_similarity,
            w_recency: config.ranking_weight_recency,
            w_usage: config.ranking_weight_usage,
            halflife_hours: config.recency_decay_halflife_days * 24.0,
            ..UsageWeights::default()
        },
    ));
    let conversation_tracker = Arc::new(ConversationTracker::new(
        context_core::constants::DEFAULT_RECENT_QUERIES_CAP,
    ));

    let indexer: Option<Arc<dyn Indexer>> = Some(Arc::new(IncrementalIndexer::new(
        vector_store.clone(),
        embedding_cache.clone(),
        embedding_provider.clone(),
        Arc::new(RegexSourceParser::new()),
    )));

    let engine = Arc::new(RetrievalOrchestrator::new(
        config,
        vector_store,
        embedding_cache,
        embedding_provider,
        usage_tracker,
        usage_backing_store,
        conversation_tracker,
        consent_registry,
        feedback_store,
        Some(commit_store),
        indexer,
    ));

    info!("engine initialized, entering message loop");
    run_jsonrpc_server(ContextMcpServer::new(engine)).await
}

async fn run_jsonrpc_server(server: ContextMcpServer) -> anyhow::Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let tools = create_default_tools();

    loop {
        match read_next_message(&mut handle) {
            Ok(None) => {
                info!("received EOF, shutting down");
                break;
            }
            Ok(Some((line, is_lsp))) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<context_mcp::jsonrpc::JsonRpcRequest>(line) {
                    Ok(request) => {
                        if let Some(response) = dispatch(request, &server, &tools).await {
                            let body = serde_json::to_string(&response)?;
                            if is_lsp {
                                write_response_with_length(&mut stdout, &body)?;
                            } else {
                                write_response_line(&mut stdout, &body)?;
                            }
                        }
                    }
                    Err(e) => {
                        error!("failed to parse JSON-RPC request: {e}");
                        let error_response = context_mcp::jsonrpc::JsonRpcResponse::err(
                            None,
                            -32700,
                            "Parse error",
                            Some(json!({"details": e.to_string()})),
                        );
                        let body = serde_json::to_string(&error_response)?;
                        if is_lsp {
                            write_response_with_length(&mut stdout, &body)?;
                        } else {
                            write_response_line(&mut stdout, &body)?;
                        }
                    }
                }
            }
            Err(e) => {
                error!("I/O error reading request: {e}");
                break;
            }
        }
    }
    Ok(())
}

async fn dispatch(
    request: context_mcp::jsonrpc::JsonRpcRequest,
    server: &ContextMcpServer,
    tools: &[context_mcp::McpTool],
) -> Option<context_mcp::jsonrpc::JsonRpcResponse> {
    match request.method.as_str() {
        "initialize" => handle_initialize(request).await,
        "tools/list" => handle_list_tools(request, tools.to_vec()).await,
        "shutdown" | "exit" => handle_shutdown(request).await,
        "tools/call" => {
            let id = request.id.clone();
            let params = request.params.clone().unwrap_or_else(|| json!({}));
            let name = match params.get("name").and_then(Value::as_str) {
                Some(n) => n.to_string(),
                None => {
                    return Some(context_mcp::jsonrpc::JsonRpcResponse::err(
                        id,
                        -32602,
                        "missing tool name",
                        None,
                    ))
                }
            };
            let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
            match server.call_tool(&name, arguments).await {
                Ok(result) => {
                    let content = json!({
                        "content": [{"type": "text", "text": serde_json::to_string_pretty(&result).unwrap_or_default()}]
                    });
                    id.map(|id| context_mcp::jsonrpc::JsonRpcResponse::ok(Some(id), content))
                }
                Err(e) => {
                    error!("tool call '{name}' failed: {e}");
                    Some(context_mcp::jsonrpc::JsonRpcResponse::err(id, -32000, e.to_string(), None))
                }
            }
        }
        other => {
            request.id.clone().map(|id| {
                context_mcp::jsonrpc::JsonRpcResponse::err(
                    Some(id),
                    -32601,
                    format!("method not found: {other}"),
                    None,
                )
            })
        }
    }
}
