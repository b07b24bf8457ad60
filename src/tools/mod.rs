//! Tool definitions and registry for the MCP server.
//!
//! [`ToolRegistry::dispatch`] is the boundary between the protocol layer and
//! the automation backends: it never fails, turning every error into an
//! `isError` result the assistant can read.

mod appium;
mod screen;
mod simulator;
mod status;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::Instrument;
use uuid::Uuid;

use crate::appium::AppiumClient;
use crate::command::{CommandRunner, Executor};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::input::InputDriver;
use crate::protocol::{ToolCallResult, ToolDefinition};
use crate::screenshot::ScreenshotService;
use crate::simulator::{SimulatorManager, BOOTED};

pub use self::appium::{AccessibilityTreeTool, AppiumTapAndTypeTool, FindAndTapTool, TapElementTool};
pub use self::screen::{TakeScreenshotTool, TapCoordinateTool, TypeTextTool};
pub use self::simulator::{
    BootSimulatorTool, GetSimulatorStateTool, InstallAppTool, LaunchAppTool,
    ListInstalledAppsTool, ListSimulatorsTool, ShutdownSimulatorTool, TerminateAppTool,
};
pub use self::status::ServerStatusTool;

/// Tool trait for implementing MCP tools.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool definition.
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: Value, context: &ToolContext) -> Result<ToolCallResult>;
}

/// Backends shared by all tools.
pub struct ToolContext {
    /// Server settings.
    pub settings: Arc<Settings>,
    /// Process runner.
    pub runner: Arc<dyn Executor>,
    /// simctl wrapper.
    pub simulators: SimulatorManager,
    /// Screenshot capture and housekeeping.
    pub screenshots: ScreenshotService,
    /// AppleScript input.
    pub input: InputDriver,
    /// Appium client.
    pub appium: AppiumClient,
    /// Server start time.
    pub started_at: Instant,
}

impl ToolContext {
    /// Context backed by real processes.
    pub fn new(settings: Settings) -> Result<Self> {
        Self::with_executor(settings, Arc::new(CommandRunner::new()))
    }

    /// Context backed by a custom executor.
    pub fn with_executor(settings: Settings, runner: Arc<dyn Executor>) -> Result<Self> {
        let simulators = SimulatorManager::new(runner.clone());
        let screenshots = ScreenshotService::new(
            runner.clone(),
            settings.screenshot_dir.clone(),
            settings.screenshot_keep,
        );
        let input = InputDriver::new(runner.clone(), simulators.clone());
        let appium = AppiumClient::new(settings.appium.clone(), screenshots.clone())?;
        Ok(Self {
            settings: Arc::new(settings),
            runner,
            simulators,
            screenshots,
            input,
            appium,
            started_at: Instant::now(),
        })
    }
}

/// Registry of available tools.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    context: Arc<ToolContext>,
}

impl ToolRegistry {
    /// Registry with the full tool catalog.
    pub fn new(context: ToolContext) -> Self {
        let mut registry = Self::empty(context);

        registry.register(Arc::new(ListSimulatorsTool));
        registry.register(Arc::new(GetSimulatorStateTool));
        registry.register(Arc::new(BootSimulatorTool));
        registry.register(Arc::new(ShutdownSimulatorTool));
        registry.register(Arc::new(TakeScreenshotTool));
        registry.register(Arc::new(TapCoordinateTool));
        registry.register(Arc::new(TapElementTool));
        registry.register(Arc::new(TypeTextTool));
        registry.register(Arc::new(InstallAppTool));
        registry.register(Arc::new(LaunchAppTool));
        registry.register(Arc::new(TerminateAppTool));
        registry.register(Arc::new(AccessibilityTreeTool));
        registry.register(Arc::new(ListInstalledAppsTool));
        registry.register(Arc::new(FindAndTapTool));
        registry.register(Arc::new(AppiumTapAndTypeTool));

        let mut names = registry.tool_names();
        names.push(status::NAME.to_string());
        names.sort();
        registry.register(Arc::new(ServerStatusTool::new(names)));

        registry
    }

    /// Registry with no tools.
    pub fn empty(context: ToolContext) -> Self {
        Self {
            tools: HashMap::new(),
            context: Arc::new(context),
        }
    }

    /// Shared tool context.
    pub fn context(&self) -> &ToolContext {
        &self.context
    }

    /// Get tool definitions, sorted by name.
    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        let mut tools: Vec<_> = self.tools.values().map(|t| t.definition()).collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Registered tool names, sorted.
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Execute a tool by name.
    pub async fn execute(&self, name: &str, arguments: Value) -> Result<ToolCallResult> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| Error::ToolNotFound(name.to_string()))?;

        tool.execute(arguments, &self.context).await
    }

    /// Execute a tool, converting every failure into an `isError` result.
    pub async fn dispatch(&self, name: &str, arguments: Value) -> ToolCallResult {
        let call_id = Uuid::new_v4();
        let span = tracing::info_span!("tool_call", tool = %name, call_id = %call_id);

        async move {
            if !self.tools.contains_key(name) {
                tracing::warn!("Unknown tool requested");
                return ToolCallResult::json(
                    &json!({
                        "success": false,
                        "error": format!("tool '{}' not found", name),
                        "available_tools": self.tool_names(),
                    }),
                    true,
                );
            }

            tracing::info!("Executing tool");
            tracing::debug!(arguments = %arguments, "Tool arguments");
            let started = Instant::now();
            match self.execute(name, arguments).await {
                Ok(result) => {
                    tracing::info!(
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Tool completed"
                    );
                    result
                }
                Err(e) => {
                    let e = e.in_tool(name);
                    tracing::error!(kind = e.kind(), "Tool failed: {}", e);
                    ToolCallResult::json(&e.failure_payload(name), true)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Register a custom tool.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.definition().name.clone();
        self.tools.insert(name, tool);
    }
}

/// Parse tool arguments; a missing argument object counts as `{}`.
fn parse_args<T: DeserializeOwned>(arguments: Value) -> Result<T> {
    let arguments = if arguments.is_null() {
        json!({})
    } else {
        arguments
    };
    serde_json::from_value(arguments).map_err(|e| Error::InvalidParams(e.to_string()))
}

/// `{"success": true, "tool_name": ..}` merged with `body`.
fn success(tool_name: &str, body: Value) -> ToolCallResult {
    let mut payload = json!({ "success": true, "tool_name": tool_name });
    if let (Some(target), Value::Object(fields)) = (payload.as_object_mut(), body) {
        for (key, value) in fields {
            target.insert(key, value);
        }
    }
    ToolCallResult::json(&payload, false)
}

fn device_or_booted(device_id: Option<String>) -> String {
    device_id
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| BOOTED.to_string())
}
