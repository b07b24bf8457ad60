//! Read-only MCP resources.

use serde_json::json;

use crate::error::{Error, Result};
use crate::protocol::{ReadResourceResult, Resource, ResourceContents};
use crate::simulator::BOOTED;
use crate::tools::ToolContext;

/// Live simulator list.
pub const SIMULATOR_STATE_URI: &str = "simulator://current-state";
/// Accessibility hierarchy of the foreground app.
pub const HIERARCHY_URI: &str = "accessibility://hierarchy";
/// Recent simulator logs.
pub const LOGS_URI: &str = "logs://simulator";

/// Largest log excerpt returned, in bytes.
pub const MAX_LOG_BYTES: usize = 64 * 1024;

const LOG_WINDOW: &str = "10m";

/// Resources this server exposes.
pub fn list() -> Vec<Resource> {
    vec![
        Resource {
            uri: SIMULATOR_STATE_URI.into(),
            name: "Current Simulator State".into(),
            description: Some("Live status of all iOS simulators".into()),
            mime_type: Some("application/json".into()),
        },
        Resource {
            uri: HIERARCHY_URI.into(),
            name: "Accessibility Tree".into(),
            description: Some(
                "Current app's accessibility hierarchy for UI automation (Appium page source)"
                    .into(),
            ),
            mime_type: Some("application/xml".into()),
        },
        Resource {
            uri: LOGS_URI.into(),
            name: "Simulator Logs".into(),
            description: Some("Last 10 minutes of logs from the booted iOS Simulator".into()),
            mime_type: Some("text/plain".into()),
        },
    ]
}

/// Read a resource. Backend failures are reported inside the body; only an
/// unknown URI is an error.
pub async fn read(uri: &str, context: &ToolContext) -> Result<ReadResourceResult> {
    tracing::info!(uri, "Reading resource");

    let (mime, body) = match uri {
        SIMULATOR_STATE_URI => (
            "application/json",
            context
                .simulators
                .device_list_json()
                .await
                .unwrap_or_else(|e| failure_body("Failed to get simulator state", &e)),
        ),
        HIERARCHY_URI => match context.appium.page_source(None).await {
            Ok(source) => ("application/xml", source),
            Err(e) => (
                "application/json",
                failure_body("Failed to get accessibility tree", &e),
            ),
        },
        LOGS_URI => match context.simulators.recent_logs(BOOTED, LOG_WINDOW).await {
            Ok(logs) => ("text/plain", tail(&logs, MAX_LOG_BYTES).to_string()),
            Err(e) => (
                "application/json",
                failure_body("Failed to get simulator logs", &e),
            ),
        },
        other => {
            return Err(Error::InvalidParams(format!("unknown resource: {}", other)));
        }
    };

    Ok(ReadResourceResult {
        contents: vec![ResourceContents {
            uri: uri.to_string(),
            mime_type: Some(mime.to_string()),
            text: body,
        }],
    })
}

fn failure_body(message: &str, error: &Error) -> String {
    tracing::warn!("{}: {}", message, error);
    json!({ "error": message, "details": error.to_string() }).to_string()
}

/// The last `max_bytes` of `text`, cut at a character boundary.
pub fn tail(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}
