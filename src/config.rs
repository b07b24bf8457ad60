//! Environment-driven server settings.
//!
//! Every setting has a default and can be overridden through an environment
//! variable. Command-line flags in the binary take precedence over both.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::error::{Error, Result};

/// Default server name advertised during `initialize`.
pub const DEFAULT_SERVER_NAME: &str = "ios-automation-mcp";

/// Environment variables whose presence marks a cloud deployment.
const CLOUD_MARKERS: [&str; 3] = ["RAILWAY_ENVIRONMENT", "HEROKU_APP_NAME", "GOOGLE_CLOUD_PROJECT"];

/// Where the server is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Deployment {
    /// On the Mac hosting the simulator.
    Local,
    /// On a hosting platform, driving a remote Appium endpoint.
    Cloud,
}

/// Transport the MCP server listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Newline-delimited JSON-RPC on stdin/stdout.
    Stdio,
    /// JSON-RPC over HTTP POST.
    Http,
}

impl FromStr for Transport {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdio" => Ok(Transport::Stdio),
            "http" | "sse" | "streamable-http" => Ok(Transport::Http),
            other => Err(Error::Configuration(format!(
                "unknown transport '{}' (expected stdio or http)",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Stdio => write!(f, "stdio"),
            Transport::Http => write!(f, "http"),
        }
    }
}

/// Appium connection and session settings.
#[derive(Debug, Clone, Serialize)]
pub struct AppiumSettings {
    /// Base URL of the Appium server.
    pub url: String,
    /// HTTP request timeout.
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    /// iOS runtime version requested in capabilities.
    pub platform_version: String,
    /// Simulator device name requested in capabilities.
    pub device_name: String,
    /// Bundle used when a tool does not name one.
    pub default_bundle_id: String,
    /// Pause after a session launches the app.
    #[serde(with = "duration_secs")]
    pub launch_settle: Duration,
    /// Pause after a tap before capturing or dismissing.
    #[serde(with = "duration_secs")]
    pub action_settle: Duration,
}

/// Complete server configuration.
#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    /// Server name reported to clients.
    pub server_name: String,
    /// Default log filter directive.
    pub log_level: String,
    /// Local or cloud deployment.
    pub deployment: Deployment,
    /// Transport to serve on.
    pub transport: Transport,
    /// HTTP bind host.
    pub host: String,
    /// HTTP bind port.
    pub port: u16,
    /// Appium settings.
    pub appium: AppiumSettings,
    /// Directory screenshots are written to.
    pub screenshot_dir: PathBuf,
    /// Number of screenshots to retain after each capture, if set.
    pub screenshot_keep: Option<usize>,
}

impl Settings {
    /// Load settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let deployment = if CLOUD_MARKERS.iter().any(|key| var(key).is_some()) {
            Deployment::Cloud
        } else {
            Deployment::Local
        };

        let transport = match var("MCP_TRANSPORT") {
            Some(value) => value.parse()?,
            None => Transport::Stdio,
        };

        let port = match var("MCP_PORT").or_else(|| var("PORT")) {
            Some(value) => parse_number("MCP_PORT", &value)?,
            None => 8000,
        };

        let appium_url = match var("APPIUM_URL") {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => {
                let host = var("APPIUM_HOST").unwrap_or_else(|| "localhost".into());
                let appium_port: u16 = match var("APPIUM_PORT") {
                    Some(value) => parse_number("APPIUM_PORT", &value)?,
                    None => 4723,
                };
                format!("http://{}:{}", host, appium_port)
            }
        };

        let appium_timeout: u64 = match var("APPIUM_TIMEOUT") {
            Some(value) => parse_number("APPIUM_TIMEOUT", &value)?,
            None => 60,
        };
        let launch_settle: u64 = match var("APPIUM_LAUNCH_SETTLE_MS") {
            Some(value) => parse_number("APPIUM_LAUNCH_SETTLE_MS", &value)?,
            None => 2000,
        };
        let action_settle: u64 = match var("APPIUM_ACTION_SETTLE_MS") {
            Some(value) => parse_number("APPIUM_ACTION_SETTLE_MS", &value)?,
            None => 1000,
        };

        let screenshot_keep = match var("SCREENSHOT_KEEP") {
            Some(value) => Some(parse_number("SCREENSHOT_KEEP", &value)?),
            None => None,
        };

        let mut settings = Self {
            server_name: var("MCP_SERVER_NAME").unwrap_or_else(|| DEFAULT_SERVER_NAME.into()),
            log_level: var("LOG_LEVEL")
                .map(|l| l.to_lowercase())
                .unwrap_or_else(|| "info".into()),
            deployment,
            transport,
            host: var("MCP_HOST").unwrap_or_else(|| "127.0.0.1".into()),
            port,
            appium: AppiumSettings {
                url: appium_url,
                timeout: Duration::from_secs(appium_timeout),
                platform_version: var("IOS_PLATFORM_VERSION").unwrap_or_else(|| "18.2".into()),
                device_name: var("IOS_DEVICE_NAME").unwrap_or_else(|| "iPhone 16 Pro".into()),
                default_bundle_id: var("IOS_DEFAULT_BUNDLE_ID")
                    .unwrap_or_else(|| "com.apple.mobilesafari".into()),
                launch_settle: Duration::from_millis(launch_settle),
                action_settle: Duration::from_millis(action_settle),
            },
            screenshot_dir: var("SCREENSHOT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| std::env::temp_dir().join("ios-mcp-screenshots")),
            screenshot_keep,
        };
        settings.finalize()?;
        Ok(settings)
    }

    /// Re-check rules that overrides must not break: cloud hosts always
    /// serve HTTP, and retention keeps at least one screenshot.
    pub fn finalize(&mut self) -> Result<()> {
        if self.deployment == Deployment::Cloud && self.transport != Transport::Http {
            tracing::debug!("Cloud deployment detected, forcing HTTP transport");
            self.transport = Transport::Http;
        }
        if self.screenshot_keep == Some(0) {
            return Err(Error::Configuration(
                "SCREENSHOT_KEEP must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Whether the server runs on a cloud host.
    pub fn is_cloud(&self) -> bool {
        self.deployment == Deployment::Cloud
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_name: DEFAULT_SERVER_NAME.into(),
            log_level: "info".into(),
            deployment: Deployment::Local,
            transport: Transport::Stdio,
            host: "127.0.0.1".into(),
            port: 8000,
            appium: AppiumSettings {
                url: "http://localhost:4723".into(),
                timeout: Duration::from_secs(60),
                platform_version: "18.2".into(),
                device_name: "iPhone 16 Pro".into(),
                default_bundle_id: "com.apple.mobilesafari".into(),
                launch_settle: Duration::from_millis(2000),
                action_settle: Duration::from_millis(1000),
            },
            screenshot_dir: std::env::temp_dir().join("ios-mcp-screenshots"),
            screenshot_keep: None,
        }
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        Error::Configuration(format!("{} must be a non-negative integer, got '{}'", key, value))
    })
}

mod duration_secs {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }
}
