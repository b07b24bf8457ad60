//! MCP server validation tests.
//!
//! Drives the built binary over stdio and checks JSON-RPC 2.0 compliance,
//! the tool catalog, and structured tool failures.

use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::timeout;

#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    jsonrpc: String,
    id: Option<u64>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

/// MCP test client speaking to the server binary.
struct McpTestClient {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
    _screenshots: tempfile::TempDir,
}

impl McpTestClient {
    async fn spawn() -> Self {
        let screenshots = tempfile::tempdir().unwrap();
        let mut child = Command::new(env!("CARGO_BIN_EXE_ios-simulator-mcp"))
            .env_remove("MCP_TRANSPORT")
            .env_remove("RAILWAY_ENVIRONMENT")
            .env_remove("HEROKU_APP_NAME")
            .env_remove("GOOGLE_CLOUD_PROJECT")
            // Nothing listens on the discard port, so Appium probes fail fast.
            .env("APPIUM_URL", "http://127.0.0.1:9")
            .env("SCREENSHOT_DIR", screenshots.path())
            .env("RUST_LOG", "warn")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .unwrap();

        let stdin = child.stdin.take().unwrap();
        let stdout = BufReader::new(child.stdout.take().unwrap()).lines();
        Self {
            child,
            stdin,
            stdout,
            next_id: 1,
            _screenshots: screenshots,
        }
    }

    async fn send(&mut self, request: &JsonRpcRequest) {
        let line = serde_json::to_string(request).unwrap();
        self.stdin.write_all(line.as_bytes()).await.unwrap();
        self.stdin.write_all(b"\n").await.unwrap();
        self.stdin.flush().await.unwrap();
    }

    async fn request(&mut self, method: &str, params: Option<Value>) -> JsonRpcResponse {
        let id = self.next_id;
        self.next_id += 1;
        self.send(&JsonRpcRequest {
            jsonrpc: "2.0",
            id: Some(id),
            method: method.into(),
            params,
        })
        .await;

        let line = timeout(Duration::from_secs(20), self.stdout.next_line())
            .await
            .expect("response timed out")
            .unwrap()
            .expect("server closed stdout");
        let response: JsonRpcResponse = serde_json::from_str(&line).unwrap();
        assert_eq!(response.jsonrpc, "2.0");
        assert_eq!(response.id, Some(id));
        response
    }

    async fn notify(&mut self, method: &str) {
        self.send(&JsonRpcRequest {
            jsonrpc: "2.0",
            id: None,
            method: method.into(),
            params: None,
        })
        .await;
    }

    async fn initialize(&mut self) -> Value {
        let response = self
            .request(
                "initialize",
                Some(json!({
                    "protocolVersion": "2024-11-05",
                    "capabilities": {},
                    "clientInfo": { "name": "test-client", "version": "0.1.0" }
                })),
            )
            .await;
        self.notify("notifications/initialized").await;
        response.result.expect("initialize result")
    }

    /// Call a tool and decode the JSON text payload.
    async fn call_tool(&mut self, name: &str, arguments: Value) -> (bool, Value) {
        let response = self
            .request("tools/call", Some(json!({ "name": name, "arguments": arguments })))
            .await;
        let result = response.result.expect("tools/call never fails at the RPC level");
        let is_error = result["isError"].as_bool().unwrap_or(false);
        let text = result["content"][0]["text"].as_str().unwrap();
        (is_error, serde_json::from_str(text).unwrap())
    }
}

// ============================================================================
// Protocol Compliance Tests
// ============================================================================

#[tokio::test]
async fn test_initialize_handshake() {
    let mut client = McpTestClient::spawn().await;
    let result = client.initialize().await;

    assert_eq!(result["protocolVersion"], "2024-11-05");
    assert_eq!(result["serverInfo"]["name"], "ios-automation-mcp");
    assert!(result["capabilities"]["tools"].is_object());
    assert!(result["capabilities"]["resources"].is_object());
    assert!(result["capabilities"]["prompts"].is_object());

    let pong = client.request("ping", None).await;
    assert!(pong.error.is_none());
}

#[tokio::test]
async fn test_method_not_found() {
    let mut client = McpTestClient::spawn().await;
    client.initialize().await;

    let response = client.request("tools/destroy", None).await;
    let error = response.error.expect("error expected");
    assert_eq!(error.code, -32601);
    assert!(error.message.contains("tools/destroy"));
}

#[tokio::test]
async fn test_list_tools() {
    let mut client = McpTestClient::spawn().await;
    client.initialize().await;

    let response = client.request("tools/list", None).await;
    let tools = response.result.unwrap()["tools"].as_array().unwrap().clone();
    let names: Vec<&str> = tools.iter().filter_map(|t| t["name"].as_str()).collect();

    assert_eq!(names.len(), 16, "{:?}", names);
    for expected in ["find_and_tap", "type_text", "take_screenshot", "get_server_status"] {
        assert!(names.contains(&expected), "missing {}", expected);
    }
    for tool in &tools {
        assert!(tool["description"].as_str().is_some_and(|d| !d.is_empty()));
        assert_eq!(tool["inputSchema"]["type"], "object");
    }
}

// ============================================================================
// Tool Execution Tests
// ============================================================================

#[tokio::test]
async fn test_unknown_tool_is_structured_result() {
    let mut client = McpTestClient::spawn().await;
    client.initialize().await;

    let (is_error, payload) = client.call_tool("launch_rocket", json!({})).await;
    assert!(is_error);
    assert_eq!(payload["success"], false);
    assert!(payload["error"].as_str().unwrap().contains("launch_rocket"));
    assert_eq!(payload["available_tools"].as_array().unwrap().len(), 16);
}

#[tokio::test]
async fn test_validation_failure_payload() {
    let mut client = McpTestClient::spawn().await;
    client.initialize().await;

    let (is_error, payload) = client.call_tool("type_text", json!({ "text": "" })).await;
    assert!(is_error);
    assert_eq!(payload["success"], false);
    assert_eq!(payload["tool_name"], "type_text");
    assert_eq!(payload["error_kind"], "validation");
    assert!(!payload["suggestions"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_server_status_reports_unreachable_appium() {
    let mut client = McpTestClient::spawn().await;
    client.initialize().await;

    let (is_error, payload) = client.call_tool("get_server_status", json!({})).await;
    assert!(!is_error);
    assert_eq!(payload["server"]["name"], "ios-automation-mcp");
    assert_eq!(payload["environment"]["appium"]["status"], "unreachable");
    assert_eq!(payload["tools"].as_array().unwrap().len(), 16);
}

// ============================================================================
// Resources and Prompts
// ============================================================================

#[tokio::test]
async fn test_prompts() {
    let mut client = McpTestClient::spawn().await;
    client.initialize().await;

    let listed = client.request("prompts/list", None).await.result.unwrap();
    assert_eq!(listed["prompts"].as_array().unwrap().len(), 2);

    let prompt = client
        .request(
            "prompts/get",
            Some(json!({
                "name": "ios-automation-debug",
                "arguments": { "error_description": "tap does nothing" }
            })),
        )
        .await
        .result
        .unwrap();
    assert_eq!(prompt["description"], "Debug iOS automation issue: tap does nothing");
    assert_eq!(prompt["messages"][0]["role"], "user");

    let missing = client
        .request("prompts/get", Some(json!({ "name": "ios-app-test" })))
        .await;
    assert_eq!(missing.error.unwrap().code, -32602);
}

#[tokio::test]
async fn test_resources() {
    let mut client = McpTestClient::spawn().await;
    client.initialize().await;

    let listed = client.request("resources/list", None).await.result.unwrap();
    let uris: Vec<&str> = listed["resources"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|r| r["uri"].as_str())
        .collect();
    assert_eq!(
        uris,
        vec!["simulator://current-state", "accessibility://hierarchy", "logs://simulator"]
    );

    // Appium is unreachable, so the body carries the failure.
    let read = client
        .request("resources/read", Some(json!({ "uri": "accessibility://hierarchy" })))
        .await
        .result
        .unwrap();
    let body: Value = serde_json::from_str(read["contents"][0]["text"].as_str().unwrap()).unwrap();
    assert_eq!(body["error"], "Failed to get accessibility tree");
}

#[tokio::test]
async fn test_shutdown_exits() {
    let mut client = McpTestClient::spawn().await;
    client.initialize().await;

    let response = client.request("shutdown", None).await;
    assert!(response.error.is_none());

    let status = timeout(Duration::from_secs(5), client.child.wait())
        .await
        .expect("server did not exit")
        .unwrap();
    assert!(status.success());
}
