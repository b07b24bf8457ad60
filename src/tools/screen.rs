//! Screen capture and synthetic input tools.

use std::path::PathBuf;

use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{device_or_booted, parse_args, success, Tool, ToolContext};
use crate::error::{Error, Result};
use crate::protocol::{ContentItem, ToolCallResult, ToolDefinition};

/// Captures the simulator screen.
pub struct TakeScreenshotTool;

#[derive(Debug, Deserialize)]
struct ScreenshotArgs {
    filename: Option<String>,
    device_id: Option<String>,
    directory: Option<PathBuf>,
    #[serde(default)]
    include_image: bool,
}

#[async_trait::async_trait]
impl Tool for TakeScreenshotTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "take_screenshot".into(),
            description: "Take a screenshot of the iOS simulator and save it as PNG".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "filename": {
                        "type": "string",
                        "description": "File name (defaults to ios_screenshot_<timestamp>.png)"
                    },
                    "device_id": {
                        "type": "string",
                        "description": "Simulator UDID (defaults to the booted simulator)",
                        "default": "booted"
                    },
                    "directory": {
                        "type": "string",
                        "description": "Directory to save into (defaults to the server's screenshot directory)"
                    },
                    "include_image": {
                        "type": "boolean",
                        "description": "Also return the image inline as base64 PNG",
                        "default": false
                    }
                }
            }),
        }
    }

    async fn execute(&self, arguments: Value, context: &ToolContext) -> Result<ToolCallResult> {
        let args: ScreenshotArgs = parse_args(arguments)?;
        let device_id = device_or_booted(args.device_id);

        let (info, source) = if context.settings.is_cloud() {
            let info = context
                .appium
                .capture_screenshot(None, args.filename.as_deref(), args.directory.as_deref())
                .await?;
            (info, "appium")
        } else {
            let info = context
                .screenshots
                .take_screenshot(args.filename.as_deref(), &device_id, args.directory.as_deref())
                .await?;
            (info, "simctl")
        };

        let mut body = serde_json::to_value(&info)?;
        if let Some(obj) = body.as_object_mut() {
            obj.insert("capture_method".into(), json!(source));
        }
        let mut result = success("take_screenshot", body);

        if args.include_image {
            let bytes = tokio::fs::read(&info.path).await.map_err(|e| {
                Error::screenshot(format!("Failed to read screenshot: {}", e))
                    .with_context("path", &info.path)
            })?;
            let data = base64::engine::general_purpose::STANDARD.encode(bytes);
            result.content.push(ContentItem::image(data, "image/png"));
        }

        Ok(result)
    }
}

/// Clicks at screen coordinates over the Simulator window.
pub struct TapCoordinateTool;

#[derive(Debug, Deserialize)]
struct TapArgs {
    x: f64,
    y: f64,
    device_id: Option<String>,
}

#[async_trait::async_trait]
impl Tool for TapCoordinateTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "tap_coordinate".into(),
            description: "Tap at screen coordinates on the Simulator window (uses AppleScript; requires accessibility permission)".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "x": { "type": "number", "description": "X coordinate" },
                    "y": { "type": "number", "description": "Y coordinate" },
                    "device_id": {
                        "type": "string",
                        "description": "Simulator UDID (defaults to the booted simulator)",
                        "default": "booted"
                    }
                },
                "required": ["x", "y"]
            }),
        }
    }

    async fn execute(&self, arguments: Value, context: &ToolContext) -> Result<ToolCallResult> {
        let args: TapArgs = parse_args(arguments)?;
        let device_id = device_or_booted(args.device_id);
        let outcome = context
            .input
            .tap_coordinate(args.x, args.y, &device_id)
            .await?;
        Ok(success("tap_coordinate", serde_json::to_value(outcome)?))
    }
}

/// Types text into the focused field.
pub struct TypeTextTool;

#[derive(Debug, Deserialize)]
struct TypeArgs {
    text: String,
    device_id: Option<String>,
}

#[async_trait::async_trait]
impl Tool for TypeTextTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "type_text".into(),
            description: "Type text into the focused field of the simulator, falling back from direct keystrokes to pasteboard paste to per-character typing".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string", "description": "Text to type" },
                    "device_id": {
                        "type": "string",
                        "description": "Simulator UDID (defaults to the booted simulator)",
                        "default": "booted"
                    }
                },
                "required": ["text"]
            }),
        }
    }

    async fn execute(&self, arguments: Value, context: &ToolContext) -> Result<ToolCallResult> {
        let args: TypeArgs = parse_args(arguments)?;
        let device_id = device_or_booted(args.device_id);
        let outcome = context.input.type_text(&args.text, &device_id).await?;
        Ok(success(
            "type_text",
            json!({
                "text": args.text,
                "device_id": device_id,
                "method": outcome.method.as_str(),
                "failed_stages": outcome.failed_stages,
            }),
        ))
    }
}
