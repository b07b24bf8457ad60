//! Simulator and app lifecycle tools.

use serde::Deserialize;
use serde_json::{json, Value};

use super::{device_or_booted, parse_args, success, Tool, ToolContext};
use crate::error::Result;
use crate::protocol::{ToolCallResult, ToolDefinition};

fn device_id_property() -> Value {
    json!({
        "type": "string",
        "description": "Simulator UDID (defaults to the booted simulator)",
        "default": "booted"
    })
}

#[derive(Debug, Deserialize)]
struct DeviceArgs {
    device_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RequiredDeviceArgs {
    device_id: String,
}

#[derive(Debug, Deserialize)]
struct BundleArgs {
    bundle_id: String,
    device_id: Option<String>,
}

/// Lists every simulator known to CoreSimulator.
pub struct ListSimulatorsTool;

#[async_trait::async_trait]
impl Tool for ListSimulatorsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "list_simulators".into(),
            description: "List all available iOS simulators with their state and runtime".into(),
            input_schema: json!({ "type": "object", "properties": {} }),
        }
    }

    async fn execute(&self, _arguments: Value, context: &ToolContext) -> Result<ToolCallResult> {
        let devices = context.simulators.list_simulators().await?;
        let booted = devices.iter().filter(|d| d.is_booted()).count();
        Ok(success(
            "list_simulators",
            json!({ "count": devices.len(), "booted_count": booted, "simulators": devices }),
        ))
    }
}

/// Reports the state of one simulator, or the booted ones.
pub struct GetSimulatorStateTool;

#[async_trait::async_trait]
impl Tool for GetSimulatorStateTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_simulator_state".into(),
            description: "Get the state of a simulator by UDID, or of all booted simulators".into(),
            input_schema: json!({
                "type": "object",
                "properties": { "device_id": device_id_property() }
            }),
        }
    }

    async fn execute(&self, arguments: Value, context: &ToolContext) -> Result<ToolCallResult> {
        let args: DeviceArgs = parse_args(arguments)?;
        let device_id = device_or_booted(args.device_id);
        let devices = context.simulators.simulator_state(Some(&device_id)).await?;
        Ok(success(
            "get_simulator_state",
            json!({ "device_id": device_id, "devices": devices }),
        ))
    }
}

/// Boots a simulator.
pub struct BootSimulatorTool;

#[async_trait::async_trait]
impl Tool for BootSimulatorTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "boot_simulator".into(),
            description: "Boot an iOS simulator by UDID".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "device_id": { "type": "string", "description": "Simulator UDID to boot" }
                },
                "required": ["device_id"]
            }),
        }
    }

    async fn execute(&self, arguments: Value, context: &ToolContext) -> Result<ToolCallResult> {
        let args: RequiredDeviceArgs = parse_args(arguments)?;
        let already_booted = context.simulators.boot(&args.device_id).await?;
        Ok(success(
            "boot_simulator",
            json!({ "device_id": args.device_id, "already_booted": already_booted }),
        ))
    }
}

/// Shuts a simulator down.
pub struct ShutdownSimulatorTool;

#[async_trait::async_trait]
impl Tool for ShutdownSimulatorTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "shutdown_simulator".into(),
            description: "Shutdown an iOS simulator by UDID".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "device_id": { "type": "string", "description": "Simulator UDID to shut down" }
                },
                "required": ["device_id"]
            }),
        }
    }

    async fn execute(&self, arguments: Value, context: &ToolContext) -> Result<ToolCallResult> {
        let args: RequiredDeviceArgs = parse_args(arguments)?;
        let already_shutdown = context.simulators.shutdown(&args.device_id).await?;
        Ok(success(
            "shutdown_simulator",
            json!({ "device_id": args.device_id, "already_shutdown": already_shutdown }),
        ))
    }
}

/// Installs an `.app` bundle.
pub struct InstallAppTool;

#[derive(Debug, Deserialize)]
struct InstallArgs {
    app_path: String,
    device_id: Option<String>,
}

#[async_trait::async_trait]
impl Tool for InstallAppTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "install_app".into(),
            description: "Install an .app bundle on a simulator".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "app_path": { "type": "string", "description": "Path to the .app bundle" },
                    "device_id": device_id_property()
                },
                "required": ["app_path"]
            }),
        }
    }

    async fn execute(&self, arguments: Value, context: &ToolContext) -> Result<ToolCallResult> {
        let args: InstallArgs = parse_args(arguments)?;
        let device_id = device_or_booted(args.device_id);
        context
            .simulators
            .install_app(&args.app_path, &device_id)
            .await?;
        Ok(success(
            "install_app",
            json!({ "app_path": args.app_path, "device_id": device_id }),
        ))
    }
}

/// Launches an installed app.
pub struct LaunchAppTool;

#[async_trait::async_trait]
impl Tool for LaunchAppTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "launch_app".into(),
            description: "Launch an installed app on a simulator by bundle ID".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "bundle_id": { "type": "string", "description": "App bundle identifier" },
                    "device_id": device_id_property()
                },
                "required": ["bundle_id"]
            }),
        }
    }

    async fn execute(&self, arguments: Value, context: &ToolContext) -> Result<ToolCallResult> {
        let args: BundleArgs = parse_args(arguments)?;
        let device_id = device_or_booted(args.device_id);
        let launched = context
            .simulators
            .launch_app(&args.bundle_id, &device_id)
            .await?;
        Ok(success("launch_app", serde_json::to_value(launched)?))
    }
}

/// Terminates a running app.
pub struct TerminateAppTool;

#[async_trait::async_trait]
impl Tool for TerminateAppTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "terminate_app".into(),
            description: "Terminate a running app on a simulator by bundle ID".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "bundle_id": { "type": "string", "description": "App bundle identifier" },
                    "device_id": device_id_property()
                },
                "required": ["bundle_id"]
            }),
        }
    }

    async fn execute(&self, arguments: Value, context: &ToolContext) -> Result<ToolCallResult> {
        let args: BundleArgs = parse_args(arguments)?;
        let device_id = device_or_booted(args.device_id);
        let was_running = context
            .simulators
            .terminate_app(&args.bundle_id, &device_id)
            .await?;
        Ok(success(
            "terminate_app",
            json!({
                "bundle_id": args.bundle_id,
                "device_id": device_id,
                "was_running": was_running
            }),
        ))
    }
}

/// Lists apps installed on a simulator.
pub struct ListInstalledAppsTool;

#[async_trait::async_trait]
impl Tool for ListInstalledAppsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "list_installed_apps".into(),
            description: "List apps installed on a simulator".into(),
            input_schema: json!({
                "type": "object",
                "properties": { "device_id": device_id_property() }
            }),
        }
    }

    async fn execute(&self, arguments: Value, context: &ToolContext) -> Result<ToolCallResult> {
        let args: DeviceArgs = parse_args(arguments)?;
        let device_id = device_or_booted(args.device_id);
        let apps = context.simulators.list_installed_apps(&device_id).await?;
        Ok(success(
            "list_installed_apps",
            json!({ "device_id": device_id, "count": apps.len(), "apps": apps }),
        ))
    }
}
