//! Server self-report.

use chrono::Local;
use serde_json::{json, Value};

use super::{success, Tool, ToolContext};
use crate::error::Result;
use crate::protocol::{ToolCallResult, ToolDefinition};
use crate::server::SERVER_VERSION;

/// Tool name.
pub const NAME: &str = "get_server_status";

/// Reports server configuration and probes its external dependencies.
pub struct ServerStatusTool {
    tool_names: Vec<String>,
}

impl ServerStatusTool {
    /// Create the tool with the catalog it reports.
    pub fn new(tool_names: Vec<String>) -> Self {
        Self { tool_names }
    }
}

#[async_trait::async_trait]
impl Tool for ServerStatusTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: NAME.into(),
            description: "Get server status, configuration and availability of Appium and Xcode tools".into(),
            input_schema: json!({ "type": "object", "properties": {} }),
        }
    }

    async fn execute(&self, _arguments: Value, context: &ToolContext) -> Result<ToolCallResult> {
        let settings = &context.settings;

        let appium = match context.appium.status().await {
            Ok(status) => json!({ "status": "running", "url": context.appium.url(), "details": status }),
            Err(e) => {
                tracing::debug!("Appium status probe failed: {}", e);
                json!({ "status": "unreachable", "url": context.appium.url(), "error": e.to_string() })
            }
        };
        let xcode = context.simulators.xcode_tools_version().await;

        Ok(success(
            NAME,
            json!({
                "server": {
                    "name": settings.server_name,
                    "version": SERVER_VERSION,
                    "status": "running",
                    "uptime_seconds": context.started_at.elapsed().as_secs(),
                    "timestamp": Local::now().to_rfc3339(),
                },
                "environment": {
                    "deployment": settings.deployment,
                    "transport": settings.transport,
                    "platform": std::env::consts::OS,
                    "arch": std::env::consts::ARCH,
                    "appium": appium,
                    "xcode_tools_available": xcode.is_some(),
                    "xcode_tools_version": xcode,
                    "screenshot_directory": context.screenshots.default_dir(),
                    "screenshot_retention": settings.screenshot_keep,
                },
                "tools": self.tool_names,
            }),
        ))
    }
}
