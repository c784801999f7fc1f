//! MCP request processing
//!
//! Transport-independent handling of JSON-RPC messages. Each transport feeds
//! raw messages to [`McpServer::handle_message`] and writes back whatever
//! response it returns; notifications yield no response.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use taller_core::{ToolCall, ToolRegistry};
use taller_protocol::{
    methods, InitializeParams, InitializeResult, McpError, McpRequest, McpResponse, RequestId,
    ServerCapabilities, ServerInfo, ToolCallParams, ToolCallResult, ToolsCapability,
    ToolsListResult, JSONRPC_VERSION, MCP_VERSION, SUPPORTED_VERSIONS,
};
use tracing::{debug, info, warn};

const INSTRUCTIONS: &str = "Tools for web search, Gmail, Google Sheets and Google Calendar. \
The first Google tool call may wait until the operator authorizes access in a browser.";

struct McpServerState {
    registry: ToolRegistry,
    initialized: AtomicBool,
}

/// MCP server instance (cheaply cloneable)
#[derive(Clone)]
pub struct McpServer {
    state: Arc<McpServerState>,
}

impl McpServer {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            state: Arc::new(McpServerState {
                registry,
                initialized: AtomicBool::new(false),
            }),
        }
    }

    /// Process one raw JSON-RPC message.
    pub async fn handle_message(&self, input: &str) -> Option<McpResponse> {
        let value: Value = match serde_json::from_str(input) {
            Ok(value) => value,
            Err(e) => {
                return Some(McpResponse::error(
                    None,
                    McpError::parse_error(format!("Invalid JSON: {}", e)),
                ));
            }
        };

        let request: McpRequest = match serde_json::from_value(value.clone()) {
            Ok(request) => request,
            Err(e) => {
                let id = value
                    .get("id")
                    .and_then(|id| serde_json::from_value::<RequestId>(id.clone()).ok());
                return Some(McpResponse::error(
                    id,
                    McpError::invalid_request(format!("Invalid request: {}", e)),
                ));
            }
        };

        self.handle_request(request).await
    }

    /// Process one parsed request. Returns `None` for notifications.
    pub async fn handle_request(&self, request: McpRequest) -> Option<McpResponse> {
        if request.jsonrpc != JSONRPC_VERSION {
            return Some(McpResponse::error(
                request.id,
                McpError::invalid_request("Invalid JSON-RPC version, expected 2.0"),
            ));
        }

        if request.is_notification() {
            self.handle_notification(&request);
            return None;
        }

        let id = request.id;
        let response = match request.method.as_str() {
            methods::INITIALIZE => self.handle_initialize(id, request.params),
            methods::PING => McpResponse::success(id, json!({})),
            methods::TOOLS_LIST => self.handle_tools_list(id),
            methods::TOOLS_CALL => self.handle_tools_call(id, request.params).await,
            _ => {
                warn!(method = %request.method, "Unknown method");
                McpResponse::error(id, McpError::method_not_found(&request.method))
            }
        };

        Some(response)
    }

    fn handle_notification(&self, request: &McpRequest) {
        match request.method.as_str() {
            methods::INITIALIZED => {
                debug!("Client finished initialization");
                self.state.initialized.store(true, Ordering::SeqCst);
            }
            methods::CANCELLED => debug!(params = ?request.params, "Client cancelled a request"),
            other => debug!(method = %other, "Ignoring notification"),
        }
    }

    fn handle_initialize(&self, id: Option<RequestId>, params: Option<Value>) -> McpResponse {
        let requested = params
            .and_then(|p| match serde_json::from_value::<InitializeParams>(p) {
                Ok(init) => Some(init),
                Err(e) => {
                    warn!(error = %e, "Failed to parse initialize params, continuing anyway");
                    None
                }
            })
            .map(|init| {
                info!(
                    client_name = %init.client_info.name,
                    client_version = %init.client_info.version,
                    protocol_version = %init.protocol_version,
                    "Client initializing"
                );
                init.protocol_version
            });

        // Echo the client's version when we speak it, otherwise offer ours.
        let protocol_version = requested
            .filter(|v| SUPPORTED_VERSIONS.contains(&v.as_str()))
            .unwrap_or_else(|| MCP_VERSION.to_string());

        let result = InitializeResult {
            protocol_version,
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: Some(false),
                }),
            },
            server_info: ServerInfo {
                name: "taller".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            instructions: Some(INSTRUCTIONS.to_string()),
        };

        success(id, &result)
    }

    fn handle_tools_list(&self, id: Option<RequestId>) -> McpResponse {
        if !self.state.initialized.load(Ordering::SeqCst) {
            debug!("tools/list called before initialized notification");
        }

        let result = ToolsListResult {
            tools: self.state.registry.list(),
        };
        success(id, &result)
    }

    async fn handle_tools_call(&self, id: Option<RequestId>, params: Option<Value>) -> McpResponse {
        let Some(params) = params else {
            return McpResponse::error(id, McpError::invalid_params("Missing params"));
        };

        let params: ToolCallParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => {
                return McpResponse::error(
                    id,
                    McpError::invalid_params(format!("Invalid params: {}", e)),
                );
            }
        };

        // Schema failures are protocol errors; nothing reaches the network.
        let call = match ToolCall::parse(&params.name, params.arguments) {
            Ok(call) => call,
            Err(e) => {
                warn!(tool = %params.name, error = %e, "Rejected tool call");
                return McpResponse::error(id, McpError::new(e.code(), e.to_string()));
            }
        };

        let result = match self.state.registry.call(call).await {
            Ok(value) => ToolCallResult::json(&value),
            Err(e) => {
                warn!(tool = %params.name, kind = ?e.kind(), error = %e, "Tool call failed");
                ToolCallResult::error(e.to_payload().to_string())
            }
        };

        success(id, &result)
    }
}

fn success<T: Serialize>(id: Option<RequestId>, result: &T) -> McpResponse {
    match serde_json::to_value(result) {
        Ok(value) => McpResponse::success(id, value),
        Err(e) => McpResponse::error(
            id,
            McpError::internal_error(format!("Failed to serialize result: {}", e)),
        ),
    }
}

/// Transport-level failures.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindFailed(String),

    #[error("Failed to write response: {0}")]
    WriteFailed(String),

    #[error("Failed to read request: {0}")]
    ReadFailed(String),
}
