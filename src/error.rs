//! Error types for the MCP server.
//!
//! Automation failures carry a free-form context map that is echoed back to
//! the calling assistant together with troubleshooting suggestions.

use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Free-form diagnostic context attached to automation errors.
pub type ErrorContext = Map<String, Value>;

/// MCP server errors.
#[derive(Error, Debug)]
pub enum Error {
    /// JSON-RPC protocol error.
    #[error("JSON-RPC error: {code} - {message}")]
    JsonRpc {
        /// Error code.
        code: i32,
        /// Error message.
        message: String,
        /// Additional data.
        data: Option<Value>,
    },

    /// Tool not found.
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// Invalid parameters.
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    /// Argument failed semantic validation.
    #[error("{message}")]
    Validation {
        /// Error message.
        message: String,
        /// Diagnostic context.
        context: ErrorContext,
    },

    /// Appium server unreachable or unhealthy.
    #[error("{message}")]
    Connection {
        /// Error message.
        message: String,
        /// Diagnostic context.
        context: ErrorContext,
    },

    /// Simulator operation failed.
    #[error("{message}")]
    Simulator {
        /// Error message.
        message: String,
        /// Diagnostic context.
        context: ErrorContext,
    },

    /// App launch or termination failed.
    #[error("{message}")]
    AppLaunch {
        /// Error message.
        message: String,
        /// Diagnostic context.
        context: ErrorContext,
    },

    /// UI automation failed (element lookup, tap, typing).
    #[error("{message}")]
    Automation {
        /// Error message.
        message: String,
        /// Diagnostic context.
        context: ErrorContext,
    },

    /// Screenshot capture failed.
    #[error("{message}")]
    Screenshot {
        /// Error message.
        message: String,
        /// Diagnostic context.
        context: ErrorContext,
    },

    /// External process could not be started.
    #[error("failed to execute command `{command}`: {source}")]
    CommandSpawn {
        /// Command line.
        command: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// External process exceeded its timeout and was killed.
    #[error("command timed out after {}s: {command}", timeout.as_secs_f64())]
    CommandTimeout {
        /// Command line.
        command: String,
        /// Timeout that elapsed.
        timeout: Duration,
    },

    /// Tool-level wrapper added at the dispatch boundary.
    #[error("tool {tool} failed: {source}")]
    ToolExecution {
        /// Tool name.
        tool: String,
        /// Underlying error.
        #[source]
        source: Box<Error>,
    },

    /// Invalid startup configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// HTTP transport error talking to Appium.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Validation failure.
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
            context: ErrorContext::new(),
        }
    }

    /// Appium connection failure.
    pub fn connection(message: impl Into<String>) -> Self {
        Error::Connection {
            message: message.into(),
            context: ErrorContext::new(),
        }
    }

    /// Simulator failure.
    pub fn simulator(message: impl Into<String>) -> Self {
        Error::Simulator {
            message: message.into(),
            context: ErrorContext::new(),
        }
    }

    /// App launch failure.
    pub fn app_launch(message: impl Into<String>) -> Self {
        Error::AppLaunch {
            message: message.into(),
            context: ErrorContext::new(),
        }
    }

    /// UI automation failure.
    pub fn automation(message: impl Into<String>) -> Self {
        Error::Automation {
            message: message.into(),
            context: ErrorContext::new(),
        }
    }

    /// Screenshot failure.
    pub fn screenshot(message: impl Into<String>) -> Self {
        Error::Screenshot {
            message: message.into(),
            context: ErrorContext::new(),
        }
    }

    /// Attach a context entry. No-op for variants without a context map.
    pub fn with_context(mut self, key: &str, value: impl Serialize) -> Self {
        if let Some(context) = self.context_mut() {
            let value = serde_json::to_value(value).unwrap_or(Value::Null);
            context.insert(key.to_string(), value);
        }
        self
    }

    /// Wrap this error with the name of the tool that produced it.
    pub fn in_tool(self, tool: impl Into<String>) -> Self {
        match self {
            wrapped @ Error::ToolExecution { .. } => wrapped,
            other => Error::ToolExecution {
                tool: tool.into(),
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, looking through tool wrappers.
    pub fn root(&self) -> &Error {
        match self {
            Error::ToolExecution { source, .. } => source.root(),
            other => other,
        }
    }

    /// Diagnostic context, if this error carries one.
    pub fn context(&self) -> Option<&ErrorContext> {
        match self.root() {
            Error::Validation { context, .. }
            | Error::Connection { context, .. }
            | Error::Simulator { context, .. }
            | Error::AppLaunch { context, .. }
            | Error::Automation { context, .. }
            | Error::Screenshot { context, .. } => Some(context),
            _ => None,
        }
    }

    fn context_mut(&mut self) -> Option<&mut ErrorContext> {
        match self {
            Error::ToolExecution { source, .. } => source.context_mut(),
            Error::Validation { context, .. }
            | Error::Connection { context, .. }
            | Error::Simulator { context, .. }
            | Error::AppLaunch { context, .. }
            | Error::Automation { context, .. }
            | Error::Screenshot { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Short machine-readable kind, echoed to the caller.
    pub fn kind(&self) -> &'static str {
        match self.root() {
            Error::JsonRpc { .. } => "json_rpc",
            Error::ToolNotFound(_) => "tool_not_found",
            Error::InvalidParams(_) => "invalid_params",
            Error::Validation { .. } => "validation",
            Error::Connection { .. } => "appium_connection",
            Error::Simulator { .. } => "simulator",
            Error::AppLaunch { .. } => "app_launch",
            Error::Automation { .. } => "automation",
            Error::Screenshot { .. } => "screenshot",
            Error::CommandSpawn { .. } => "command_spawn",
            Error::CommandTimeout { .. } => "command_timeout",
            Error::ToolExecution { .. } => "tool_execution",
            Error::Configuration(_) => "configuration",
            Error::Http(_) => "http",
            Error::Serialization(_) => "serialization",
            Error::Io(_) => "io",
            Error::Internal(_) => "internal",
        }
    }

    /// Get the JSON-RPC error code for this error.
    pub fn code(&self) -> i32 {
        match self.root() {
            Error::JsonRpc { code, .. } => *code,
            Error::ToolNotFound(_) => codes::METHOD_NOT_FOUND,
            Error::InvalidParams(_) | Error::Validation { .. } => codes::INVALID_PARAMS,
            Error::Connection { .. } => -32001,
            Error::Simulator { .. } | Error::AppLaunch { .. } => -32002,
            Error::Automation { .. } | Error::Screenshot { .. } => -32003,
            Error::CommandSpawn { .. } | Error::CommandTimeout { .. } => -32004,
            Error::Http(_) => -32005,
            Error::Io(_) => -32006,
            Error::Configuration(_) => -32007,
            Error::Serialization(_) => codes::PARSE_ERROR,
            Error::ToolExecution { .. } | Error::Internal(_) => codes::INTERNAL_ERROR,
        }
    }

    /// Troubleshooting suggestions for the caller.
    ///
    /// Explicit `suggestions`/`suggestion` context entries win; otherwise
    /// hints are derived from the error kind and message.
    pub fn suggestions(&self) -> Vec<String> {
        if let Some(context) = self.context() {
            if let Some(list) = context.get("suggestions").and_then(Value::as_array) {
                let explicit: Vec<String> = list
                    .iter()
                    .filter_map(|s| s.as_str().map(str::to_string))
                    .collect();
                if !explicit.is_empty() {
                    return explicit;
                }
            }
            if let Some(single) = context.get("suggestion").and_then(Value::as_str) {
                return vec![single.to_string()];
            }
        }

        let hints: &[&str] = match self.root() {
            Error::Connection { .. } | Error::Http(_) => &[
                "Ensure Appium server is running: appium server --port 4723",
                "Check that the configured Appium URL is reachable",
                "Restart Appium server if it is unresponsive",
            ],
            Error::Simulator { .. } => &[
                "Ensure Xcode and its command line tools are installed",
                "Check the simulator UDID with list_simulators",
                "Boot the simulator before interacting with it",
            ],
            Error::AppLaunch { .. } => &[
                "Check that the app is installed on the simulator (list_installed_apps)",
                "Verify the bundle ID is correct",
                "Ensure the simulator is booted",
            ],
            Error::Screenshot { .. } => &[
                "Check that the simulator is booted and accessible",
                "Verify the device ID is correct",
                "Ensure the save directory is writable",
            ],
            Error::Automation { message, .. } => return automation_hints(message),
            Error::Validation { .. } | Error::InvalidParams(_) => &[
                "Check the tool arguments against its input schema",
            ],
            Error::CommandSpawn { .. } => &[
                "Ensure xcrun and osascript are available on PATH (macOS with Xcode)",
            ],
            Error::CommandTimeout { .. } => &[
                "The simulator may be busy; retry the operation",
                "Check that the simulator is responsive",
            ],
            _ => &[
                "Check tool arguments are correct",
                "Verify required services are running (Appium, iOS Simulator)",
                "Review server logs for detailed error information",
            ],
        };
        hints.iter().map(|s| s.to_string()).collect()
    }

    /// Structured `success: false` payload returned by the dispatch boundary.
    pub fn failure_payload(&self, tool_name: &str) -> Value {
        json!({
            "success": false,
            "error": self.root().to_string(),
            "tool_name": tool_name,
            "error_kind": self.kind(),
            "context": self.context().cloned().unwrap_or_default(),
            "suggestions": self.suggestions(),
        })
    }

    /// Convert to JSON-RPC error response.
    pub fn to_json_rpc_error(&self) -> Value {
        json!({
            "code": self.code(),
            "message": self.to_string(),
        })
    }
}

fn automation_hints(message: &str) -> Vec<String> {
    let lower = message.to_lowercase();
    let hints: &[&str] = if lower.contains("connection") || lower.contains("refused") {
        &[
            "Ensure Appium server is running: appium server --port 4723",
            "Check if the Appium endpoint is accessible",
            "Restart Appium server if it's unresponsive",
        ]
    } else if lower.contains("text field") || lower.contains("element") {
        &[
            "Make sure the target app is open and visible",
            "Verify the element text or accessibility ID is correct",
            "Try partial_match=true for text searches or increase the timeout",
            "Take a screenshot to verify the current screen state",
        ]
    } else if lower.contains("bundle") || lower.contains("launch") {
        &[
            "Verify the bundle ID is correct",
            "Ensure the app is installed on the simulator",
            "Check if the simulator is booted and accessible",
        ]
    } else if lower.contains("simulator") || lower.contains("device") {
        &[
            "Ensure iOS Simulator is running",
            "Check simulator device settings match configuration",
            "Try restarting the iOS Simulator",
        ]
    } else {
        &[
            "Check Appium server logs for detailed error information",
            "Verify iOS Simulator is running and accessible",
            "Try restarting both Appium server and iOS Simulator",
        ]
    };
    hints.iter().map(|s| s.to_string()).collect()
}

/// Standard JSON-RPC error codes.
pub mod codes {
    /// Parse error.
    pub const PARSE_ERROR: i32 = -32700;
    /// Invalid request.
    pub const INVALID_REQUEST: i32 = -32600;
    /// Method not found.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid params.
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal error.
    pub const INTERNAL_ERROR: i32 = -32603;
}
