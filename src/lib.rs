//! # ios-simulator-mcp
//!
//! MCP (Model Context Protocol) server for iOS Simulator automation.
//!
//! This crate exposes the iOS Simulator to AI assistants such as Claude
//! Desktop and GitHub Copilot as a set of MCP tools, resources and prompts.
//! It drives three backends:
//!
//! - `xcrun simctl` subprocesses for device lifecycle, apps and screenshots
//! - AppleScript (`osascript`) for synthetic clicks and keystrokes
//! - an Appium/XCUITest server over the W3C WebDriver protocol
//!
//! ## Available Tools
//!
//! - Simulator: `list_simulators`, `get_simulator_state`, `boot_simulator`,
//!   `shutdown_simulator`
//! - Apps: `install_app`, `launch_app`, `terminate_app`, `list_installed_apps`
//! - Screen: `take_screenshot`, `tap_coordinate`, `type_text`
//! - Appium: `tap_element`, `find_and_tap`, `appium_tap_and_type`,
//!   `get_accessibility_tree`
//! - `get_server_status`
//!
//! Tool failures never surface as JSON-RPC errors: they come back as
//! `isError` results carrying the error kind, context and troubleshooting
//! suggestions.
//!
//! ## Usage with VS Code
//!
//! Add to your `.vscode/mcp.json`:
//!
//! ```json
//! {
//!   "servers": {
//!     "ios-simulator": {
//!       "command": "ios-simulator-mcp",
//!       "env": { "APPIUM_URL": "http://localhost:4723" }
//!     }
//!   }
//! }
//! ```
//!
//! Build with `--features http` to serve JSON-RPC on `POST /mcp` instead.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod appium;
pub mod applescript;
pub mod command;
pub mod config;
pub mod error;
#[cfg(feature = "http")]
pub mod http;
pub mod input;
pub mod prompts;
pub mod protocol;
pub mod resources;
pub mod screenshot;
pub mod server;
pub mod simulator;
pub mod tools;

pub use command::{CommandOptions, CommandOutput, CommandRunner, Executor};
pub use config::Settings;
pub use error::{Error, Result};
pub use protocol::{JsonRpcRequest, JsonRpcResponse, McpMessage};
pub use server::McpServer;
pub use tools::{Tool, ToolContext, ToolRegistry};
