//! Tools backed by the Appium server.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};

use super::{parse_args, success, Tool, ToolContext};
use crate::appium::{ElementQuery, ElementType, FindAndTapRequest};
use crate::error::{Error, Result};
use crate::protocol::{ToolCallResult, ToolDefinition};

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MAX_ELEMENTS: usize = 50;

fn timeout_from(secs: Option<f64>) -> Result<Duration> {
    match secs {
        None => Ok(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
        Some(s) if s.is_finite() && s >= 0.0 => Ok(Duration::from_secs_f64(s)),
        Some(s) => Err(Error::validation(format!("timeout must be non-negative, got {}", s))),
    }
}

fn element_types() -> Vec<&'static str> {
    ElementType::ALL.iter().map(|t| t.as_str()).collect()
}

/// Taps an element by accessibility id or visible text.
pub struct TapElementTool;

#[derive(Debug, Deserialize)]
struct TapElementArgs {
    identifier: String,
    app_bundle_id: Option<String>,
    timeout: Option<f64>,
}

#[async_trait::async_trait]
impl Tool for TapElementTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "tap_element".into(),
            description: "Tap a UI element by accessibility identifier or exact visible text".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "identifier": {
                        "type": "string",
                        "description": "Accessibility identifier or visible text of the element"
                    },
                    "app_bundle_id": {
                        "type": "string",
                        "description": "Bundle ID of the app to attach to"
                    },
                    "timeout": {
                        "type": "number",
                        "description": "Seconds to wait for the element",
                        "default": DEFAULT_TIMEOUT_SECS
                    }
                },
                "required": ["identifier"]
            }),
        }
    }

    async fn execute(&self, arguments: Value, context: &ToolContext) -> Result<ToolCallResult> {
        let args: TapElementArgs = parse_args(arguments)?;
        let request = FindAndTapRequest {
            query: ElementQuery {
                accessibility_id: Some(args.identifier.clone()),
                text: Some(args.identifier.clone()),
                timeout: timeout_from(args.timeout)?,
                ..ElementQuery::default()
            },
            bundle_id: args.app_bundle_id,
            ..FindAndTapRequest::default()
        };
        let outcome = context.appium.find_and_tap(request).await?;
        let mut body = serde_json::to_value(outcome)?;
        if let Some(obj) = body.as_object_mut() {
            obj.insert("identifier".into(), json!(args.identifier));
        }
        Ok(success("tap_element", body))
    }
}

/// Locates an element through the ranked strategy chain and taps it.
pub struct FindAndTapTool;

#[derive(Debug, Deserialize)]
struct FindAndTapArgs {
    element_text: Option<String>,
    accessibility_id: Option<String>,
    xpath: Option<String>,
    element_type: Option<String>,
    #[serde(default)]
    partial_match: bool,
    timeout: Option<f64>,
    #[serde(default = "default_true")]
    take_screenshot: bool,
    app_bundle_id: Option<String>,
    #[serde(default)]
    dismiss_after_screenshot: bool,
    dismiss_button_text: Option<String>,
}

fn default_true() -> bool {
    true
}

#[async_trait::async_trait]
impl Tool for FindAndTapTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "find_and_tap".into(),
            description: "Find a UI element by text, accessibility ID, XPath or type and tap it. Strategies are tried in priority order: accessibility ID, exact text, partial text, type with text, XPath, type only. Optionally takes a screenshot and dismisses the resulting screen.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "element_text": {
                        "type": "string",
                        "description": "Visible text of the element"
                    },
                    "accessibility_id": {
                        "type": "string",
                        "description": "Accessibility identifier of the element"
                    },
                    "xpath": {
                        "type": "string",
                        "description": "XPath selector"
                    },
                    "element_type": {
                        "type": "string",
                        "enum": element_types(),
                        "default": "any",
                        "description": "Restrict the search to one XCUITest element type"
                    },
                    "partial_match": {
                        "type": "boolean",
                        "default": false,
                        "description": "Match element_text as a substring"
                    },
                    "timeout": {
                        "type": "number",
                        "default": DEFAULT_TIMEOUT_SECS,
                        "description": "Seconds to wait for the element"
                    },
                    "take_screenshot": {
                        "type": "boolean",
                        "default": true,
                        "description": "Capture the screen after tapping"
                    },
                    "app_bundle_id": {
                        "type": "string",
                        "description": "Bundle ID of the app to attach to"
                    },
                    "dismiss_after_screenshot": {
                        "type": "boolean",
                        "default": false,
                        "description": "Try to close the screen the tap opened"
                    },
                    "dismiss_button_text": {
                        "type": "string",
                        "description": "Text of the button used to dismiss (defaults to Done, Cancel, Close, Back, Dismiss, OK)"
                    }
                }
            }),
        }
    }

    async fn execute(&self, arguments: Value, context: &ToolContext) -> Result<ToolCallResult> {
        let args: FindAndTapArgs = parse_args(arguments)?;
        let element_type = match args.element_type.as_deref() {
            Some(t) if !t.is_empty() => t.parse()?,
            _ => ElementType::Any,
        };
        let query = ElementQuery {
            accessibility_id: args.accessibility_id,
            text: args.element_text,
            partial_match: args.partial_match,
            xpath: args.xpath,
            element_type,
            timeout: timeout_from(args.timeout)?,
        };
        query.validate()?;

        let outcome = context
            .appium
            .find_and_tap(FindAndTapRequest {
                query,
                bundle_id: args.app_bundle_id,
                take_screenshot: args.take_screenshot,
                dismiss_after_screenshot: args.dismiss_after_screenshot,
                dismiss_button_text: args.dismiss_button_text,
            })
            .await?;
        Ok(success("find_and_tap", serde_json::to_value(outcome)?))
    }
}

/// Taps the first text input and types into it through Appium.
pub struct AppiumTapAndTypeTool;

#[derive(Debug, Deserialize)]
struct TapTypeArgs {
    text: String,
    app_bundle_id: Option<String>,
    timeout: Option<f64>,
}

#[async_trait::async_trait]
impl Tool for AppiumTapAndTypeTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "appium_tap_and_type".into(),
            description: "Find the first text field in the app, tap it, clear it and type the given text using Appium".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string", "description": "Text to type" },
                    "app_bundle_id": {
                        "type": "string",
                        "description": "Bundle ID of the app to attach to"
                    },
                    "timeout": {
                        "type": "number",
                        "default": DEFAULT_TIMEOUT_SECS,
                        "description": "Seconds to wait for a text field"
                    }
                },
                "required": ["text"]
            }),
        }
    }

    async fn execute(&self, arguments: Value, context: &ToolContext) -> Result<ToolCallResult> {
        let args: TapTypeArgs = parse_args(arguments)?;
        let outcome = context
            .appium
            .tap_and_type(
                &args.text,
                args.app_bundle_id.as_deref(),
                timeout_from(args.timeout)?,
            )
            .await?;
        Ok(success("appium_tap_and_type", serde_json::to_value(outcome)?))
    }
}

/// Dumps the accessibility hierarchy of the current screen.
pub struct AccessibilityTreeTool;

#[derive(Debug, Deserialize)]
struct TreeArgs {
    app_bundle_id: Option<String>,
    #[serde(default = "default_format")]
    format: String,
    max_elements: Option<usize>,
}

fn default_format() -> String {
    "json".into()
}

#[async_trait::async_trait]
impl Tool for AccessibilityTreeTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_accessibility_tree".into(),
            description: "Get the accessibility hierarchy of the current screen, as a flat JSON element list or raw XML page source".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "app_bundle_id": {
                        "type": "string",
                        "description": "Bundle ID of the app to attach to (defaults to the foreground app)"
                    },
                    "format": {
                        "type": "string",
                        "enum": ["json", "xml"],
                        "default": "json"
                    },
                    "max_elements": {
                        "type": "integer",
                        "minimum": 1,
                        "default": DEFAULT_MAX_ELEMENTS,
                        "description": "Maximum elements returned in json format"
                    }
                }
            }),
        }
    }

    async fn execute(&self, arguments: Value, context: &ToolContext) -> Result<ToolCallResult> {
        let args: TreeArgs = parse_args(arguments)?;
        let bundle_id = args.app_bundle_id.as_deref().filter(|b| !b.is_empty());

        match args.format.as_str() {
            "xml" => {
                let source = context.appium.page_source(bundle_id).await?;
                Ok(success(
                    "get_accessibility_tree",
                    json!({ "format": "xml", "source": source }),
                ))
            }
            "json" => {
                let limit = args.max_elements.unwrap_or(DEFAULT_MAX_ELEMENTS).max(1);
                let elements = context
                    .appium
                    .accessibility_elements(bundle_id, limit)
                    .await?;
                Ok(success(
                    "get_accessibility_tree",
                    json!({ "format": "json", "count": elements.len(), "elements": elements }),
                ))
            }
            other => Err(Error::validation(format!(
                "Unsupported format '{}' (expected json or xml)",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts() {
        assert_eq!(timeout_from(None).unwrap(), Duration::from_secs(10));
        assert_eq!(timeout_from(Some(2.5)).unwrap(), Duration::from_millis(2500));
        assert!(timeout_from(Some(-1.0)).is_err());
    }

    #[test]
    fn find_and_tap_schema_lists_element_types() {
        let schema = FindAndTapTool.definition().input_schema;
        let types = schema["properties"]["element_type"]["enum"].as_array().unwrap();
        assert_eq!(types.len(), 24);
        assert!(types.iter().any(|t| t == "staticText"));
    }
}
