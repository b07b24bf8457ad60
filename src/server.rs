//! MCP server implementation.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::RwLock;

use crate::config::Settings;
use crate::error::{codes, Error, Result};
use crate::prompts;
use crate::protocol::{
    ClientCapabilities, GetPromptParams, InitializeParams, InitializeResult, JsonRpcId,
    JsonRpcRequest, JsonRpcResponse, ListPromptsResult, ListResourcesResult, ListToolsResult,
    McpMessage, PromptsCapability, ReadResourceParams, ResourcesCapability, ServerCapabilities,
    ServerInfo, ToolCallParams, ToolsCapability,
};
use crate::resources;
use crate::tools::{ToolContext, ToolRegistry};

/// MCP protocol version.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Server version.
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// MCP server state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Waiting for initialization.
    Uninitialized,
    /// Server is initialized and ready.
    Ready,
    /// Server is shutting down.
    ShuttingDown,
}

/// MCP server for iOS simulator automation.
pub struct McpServer {
    state: Arc<RwLock<ServerState>>,
    tools: Arc<ToolRegistry>,
    client_capabilities: Arc<RwLock<Option<ClientCapabilities>>>,
}

impl McpServer {
    /// Create a server around a tool registry.
    pub fn new(tools: ToolRegistry) -> Self {
        Self {
            state: Arc::new(RwLock::new(ServerState::Uninitialized)),
            tools: Arc::new(tools),
            client_capabilities: Arc::new(RwLock::new(None)),
        }
    }

    /// Create a server with the full tool catalog backed by real processes.
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let context = ToolContext::new(settings)?;
        Ok(Self::new(ToolRegistry::new(context)))
    }

    /// The tool registry.
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> ServerState {
        *self.state.read().await
    }

    /// Capabilities announced by the client during `initialize`.
    pub async fn client_capabilities(&self) -> Option<ClientCapabilities> {
        self.client_capabilities.read().await.clone()
    }

    fn server_name(&self) -> &str {
        &self.tools.context().settings.server_name
    }

    /// Run the server on stdio.
    pub async fn run_stdio(&self) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = tokio::io::stdout();

        tracing::info!("MCP server starting on stdio");

        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            tracing::debug!("Received: {}", line);

            if let Some(response) = self.handle_message(line).await {
                let json = serde_json::to_string(&response)?;
                tracing::debug!("Sending: {}", json);
                stdout.write_all(json.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
            }

            if self.state().await == ServerState::ShuttingDown {
                break;
            }
        }

        tracing::info!("MCP server shutting down");
        Ok(())
    }

    /// Handle an incoming message.
    pub async fn handle_message(&self, json: &str) -> Option<JsonRpcResponse> {
        match McpMessage::parse(json) {
            Ok(McpMessage::Request(request)) => Some(self.handle_request(request).await),
            Ok(McpMessage::Notification(notification)) => {
                self.handle_notification(notification).await;
                None
            }
            Ok(McpMessage::Response(_)) => None,
            Err(e) => {
                tracing::warn!("Rejected message: {}", e);
                Some(JsonRpcResponse::error(None, e.code(), e.to_string()))
            }
        }
    }

    /// Handle a JSON-RPC request.
    async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone();

        match request.method.as_str() {
            "initialize" => self.handle_initialize(id, request.params).await,
            "ping" => JsonRpcResponse::success(id, serde_json::json!({})),
            "shutdown" => {
                *self.state.write().await = ServerState::ShuttingDown;
                JsonRpcResponse::success(id, serde_json::json!({}))
            }
            "tools/list" | "tools/call" | "resources/list" | "resources/read"
            | "prompts/list" | "prompts/get" => {
                if self.state().await != ServerState::Ready {
                    return JsonRpcResponse::error(
                        id,
                        codes::INTERNAL_ERROR,
                        "server not initialized",
                    );
                }
                self.handle_ready(id, &request.method, request.params).await
            }
            _ => JsonRpcResponse::error(
                id,
                codes::METHOD_NOT_FOUND,
                format!("method not found: {}", request.method),
            ),
        }
    }

    async fn handle_ready(
        &self,
        id: Option<JsonRpcId>,
        method: &str,
        params: Option<Value>,
    ) -> JsonRpcResponse {
        let outcome = match method {
            "tools/list" => to_value(ListToolsResult {
                tools: self.tools.list_tools(),
            }),
            "tools/call" => match parse_params::<ToolCallParams>(params, "tool call") {
                Ok(params) => to_value(self.tools.dispatch(&params.name, params.arguments).await),
                Err(e) => Err(e),
            },
            "resources/list" => to_value(ListResourcesResult {
                resources: resources::list(),
            }),
            "resources/read" => match parse_params::<ReadResourceParams>(params, "resource") {
                Ok(params) => match resources::read(&params.uri, self.tools.context()).await {
                    Ok(result) => to_value(result),
                    Err(e) => Err(e),
                },
                Err(e) => Err(e),
            },
            "prompts/list" => to_value(ListPromptsResult {
                prompts: prompts::list(),
            }),
            "prompts/get" => parse_params::<GetPromptParams>(params, "prompt")
                .and_then(|params| prompts::get(&params.name, &params.arguments))
                .and_then(to_value),
            _ => Err(Error::JsonRpc {
                code: codes::METHOD_NOT_FOUND,
                message: format!("method not found: {}", method),
                data: None,
            }),
        };

        match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(e) => {
                tracing::warn!(method, "Request failed: {}", e);
                JsonRpcResponse::error(id, e.code(), e.to_string())
            }
        }
    }

    /// Handle a notification (no response expected).
    async fn handle_notification(&self, notification: JsonRpcRequest) {
        match notification.method.as_str() {
            "notifications/initialized" => {
                tracing::info!("Client initialized");
            }
            "notifications/cancelled" => {
                tracing::debug!("Request cancelled by client");
            }
            "exit" => {
                *self.state.write().await = ServerState::ShuttingDown;
            }
            _ => {
                tracing::debug!("Unknown notification: {}", notification.method);
            }
        }
    }

    /// Handle initialize request.
    async fn handle_initialize(
        &self,
        id: Option<JsonRpcId>,
        params: Option<Value>,
    ) -> JsonRpcResponse {
        let params: InitializeParams = match parse_params(params, "initialize") {
            Ok(params) => params,
            Err(e) => return JsonRpcResponse::error(id, e.code(), e.to_string()),
        };

        tracing::info!(
            client = %params.client_info.name,
            client_version = %params.client_info.version,
            protocol = %params.protocol_version,
            "Initializing session"
        );

        *self.client_capabilities.write().await = Some(params.capabilities);
        *self.state.write().await = ServerState::Ready;

        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.into(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: false,
                }),
                resources: Some(ResourcesCapability {
                    subscribe: false,
                    list_changed: false,
                }),
                prompts: Some(PromptsCapability {
                    list_changed: false,
                }),
                logging: None,
            },
            server_info: ServerInfo {
                name: self.server_name().into(),
                version: SERVER_VERSION.into(),
            },
        };

        JsonRpcResponse::success(id, result)
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>, what: &str) -> Result<T> {
    let params =
        params.ok_or_else(|| Error::InvalidParams(format!("{} params required", what)))?;
    serde_json::from_value(params)
        .map_err(|e| Error::InvalidParams(format!("invalid {} params: {}", what, e)))
}

fn to_value(result: impl serde::Serialize) -> Result<Value> {
    Ok(serde_json::to_value(result)?)
}
