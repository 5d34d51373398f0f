//! JSON-RPC/MCP transport for the context retrieval engine: wire framing,
//! protocol handshake, the tool surface, and the dispatcher that binds tool
//! calls to [`context_core::orchestrator::RetrievalOrchestrator`].

pub mod jsonrpc;
pub mod protocol;
pub mod server;
pub mod tool_definitions;

pub use protocol::McpTool;
pub use server::ContextMcpServer;
pub use tool_definitions::create_default_tools;
