//! JSON-RPC 2.0 and Model Context Protocol message types.
//!
//! Pure data: no I/O lives here. The transports in `taller-mcp` and the tool
//! registry in `taller-core` both speak these types.

pub mod jsonrpc;
pub mod mcp;

pub use jsonrpc::{McpError, McpRequest, McpResponse, RequestId, JSONRPC_VERSION};
pub use mcp::{
    methods, ClientInfo, InitializeParams, InitializeResult, ServerCapabilities, ServerInfo,
    ToolAnnotations, ToolCallContent, ToolCallParams, ToolCallResult, ToolDefinition,
    ToolsCapability, ToolsListResult, MCP_VERSION, SUPPORTED_VERSIONS,
};
