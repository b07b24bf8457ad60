//! Simulator and app lifecycle through `xcrun simctl`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::command::{CommandOptions, CommandOutput, Executor};
use crate::error::{Error, Result};

/// Device alias simctl resolves to the booted simulator.
pub const BOOTED: &str = "booted";

const LIST_TIMEOUT: Duration = Duration::from_secs(15);
const BOOT_TIMEOUT: Duration = Duration::from_secs(60);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);
const INSTALL_TIMEOUT: Duration = Duration::from_secs(60);
const LAUNCH_TIMEOUT: Duration = Duration::from_secs(30);
const TERMINATE_TIMEOUT: Duration = Duration::from_secs(15);
const PASTEBOARD_TIMEOUT: Duration = Duration::from_secs(10);
const LOG_TIMEOUT: Duration = Duration::from_secs(30);
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// A simulator known to CoreSimulator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulatorDevice {
    /// Device UDID.
    pub udid: String,
    /// Display name, e.g. "iPhone 16 Pro".
    pub name: String,
    /// "Booted", "Shutdown", ...
    pub state: String,
    /// Runtime identifier.
    pub runtime: String,
    /// Human-readable runtime, e.g. "iOS 18.2".
    pub runtime_name: String,
    /// Device type identifier.
    pub device_type: String,
    /// Whether the runtime is installed and usable.
    pub is_available: bool,
}

impl SimulatorDevice {
    /// Whether the device is currently booted.
    pub fn is_booted(&self) -> bool {
        self.state == "Booted"
    }
}

/// An app installed on a simulator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstalledApp {
    /// Bundle identifier.
    pub bundle_id: String,
    /// Display name, when the bundle declares one.
    pub display_name: Option<String>,
    /// "User" or "System".
    pub application_type: Option<String>,
}

/// Result of a successful launch.
#[derive(Debug, Clone, Serialize)]
pub struct LaunchedApp {
    /// Bundle identifier.
    pub bundle_id: String,
    /// Target device.
    pub device_id: String,
    /// Process id reported by simctl.
    pub pid: Option<u32>,
    /// Raw simctl output.
    pub output: String,
}

/// Thin wrapper over `xcrun simctl`.
#[derive(Clone)]
pub struct SimulatorManager {
    runner: Arc<dyn Executor>,
}

impl SimulatorManager {
    /// Create a manager that runs commands through `runner`.
    pub fn new(runner: Arc<dyn Executor>) -> Self {
        Self { runner }
    }

    /// Raw `simctl list devices --json` output.
    pub async fn device_list_json(&self) -> Result<String> {
        let output = self
            .runner
            .run(&["xcrun", "simctl", "list", "devices", "--json"], LIST_TIMEOUT)
            .await?;
        if !output.success {
            return Err(Error::simulator("Failed to list simulators")
                .with_context("command_output", output.output()));
        }
        Ok(output.stdout)
    }

    /// All simulators, grouped runtimes flattened.
    pub async fn list_simulators(&self) -> Result<Vec<SimulatorDevice>> {
        tracing::info!("Listing iOS simulators");
        let json = self.device_list_json().await?;
        let devices = parse_device_list(&json)?;
        tracing::debug!("Found {} simulators", devices.len());
        Ok(devices)
    }

    /// Devices matching `device_id`: all when `None`, booted ones for
    /// `"booted"`, otherwise the one with that UDID.
    pub async fn simulator_state(&self, device_id: Option<&str>) -> Result<Vec<SimulatorDevice>> {
        let devices = self.list_simulators().await?;
        match device_id {
            None => Ok(devices),
            Some(id) if id.eq_ignore_ascii_case(BOOTED) => {
                Ok(devices.into_iter().filter(|d| d.is_booted()).collect())
            }
            Some(id) => {
                let matching: Vec<_> = devices.into_iter().filter(|d| d.udid == id).collect();
                if matching.is_empty() {
                    return Err(Error::simulator(format!("Simulator {} not found", id))
                        .with_context("device_id", id)
                        .with_context(
                            "suggestion",
                            "Use list_simulators to see available device UDIDs",
                        ));
                }
                Ok(matching)
            }
        }
    }

    /// Boot a simulator. Returns `true` when it was already booted.
    pub async fn boot(&self, device_id: &str) -> Result<bool> {
        require("device_id", device_id)?;
        tracing::info!(device_id, "Booting simulator");
        let output = self
            .runner
            .run(&["xcrun", "simctl", "boot", device_id], BOOT_TIMEOUT)
            .await?;
        if output.success {
            return Ok(false);
        }
        if output.combined().contains("current state: Booted") {
            tracing::info!(device_id, "Simulator already booted");
            return Ok(true);
        }
        Err(
            Error::simulator(format!("Failed to boot simulator {}", device_id))
                .with_context("device_id", device_id)
                .with_context("command_output", output.output()),
        )
    }

    /// Shut down a simulator. Returns `true` when it was already shut down.
    pub async fn shutdown(&self, device_id: &str) -> Result<bool> {
        require("device_id", device_id)?;
        tracing::info!(device_id, "Shutting down simulator");
        let output = self
            .runner
            .run(&["xcrun", "simctl", "shutdown", device_id], SHUTDOWN_TIMEOUT)
            .await?;
        if output.success {
            return Ok(false);
        }
        if output.combined().contains("current state: Shutdown") {
            tracing::info!(device_id, "Simulator already shut down");
            return Ok(true);
        }
        Err(
            Error::simulator(format!("Failed to shutdown simulator {}", device_id))
                .with_context("device_id", device_id)
                .with_context("command_output", output.output()),
        )
    }

    /// Install an `.app` bundle.
    pub async fn install_app(&self, app_path: &str, device_id: &str) -> Result<()> {
        require("app_path", app_path)?;
        if !Path::new(app_path).exists() {
            return Err(Error::validation(format!("App path does not exist: {}", app_path))
                .with_context("app_path", app_path));
        }
        tracing::info!(app_path, device_id, "Installing app");
        let output = self
            .runner
            .run(&["xcrun", "simctl", "install", device_id, app_path], INSTALL_TIMEOUT)
            .await?;
        if !output.success {
            return Err(Error::app_launch(format!("Failed to install app {}", app_path))
                .with_context("app_path", app_path)
                .with_context("device_id", device_id)
                .with_context("command_output", output.output()));
        }
        Ok(())
    }

    /// Launch an installed app.
    pub async fn launch_app(&self, bundle_id: &str, device_id: &str) -> Result<LaunchedApp> {
        require("bundle_id", bundle_id)?;
        tracing::info!(bundle_id, device_id, "Launching app");
        let output = self
            .runner
            .run(&["xcrun", "simctl", "launch", device_id, bundle_id], LAUNCH_TIMEOUT)
            .await?;
        if !output.success {
            return Err(Error::app_launch(format!("Failed to launch app {}", bundle_id))
                .with_context("bundle_id", bundle_id)
                .with_context("device_id", device_id)
                .with_context("command_output", output.output())
                .with_context(
                    "suggestions",
                    [
                        "Check if app is installed on simulator",
                        "Verify bundle ID is correct",
                        "Ensure simulator is booted",
                    ],
                ));
        }
        Ok(LaunchedApp {
            bundle_id: bundle_id.to_string(),
            device_id: device_id.to_string(),
            pid: parse_launch_pid(&output.stdout),
            output: output.stdout.trim().to_string(),
        })
    }

    /// Terminate an app. Returns `false` when it was not running.
    pub async fn terminate_app(&self, bundle_id: &str, device_id: &str) -> Result<bool> {
        require("bundle_id", bundle_id)?;
        tracing::info!(bundle_id, device_id, "Terminating app");
        let output = self
            .runner
            .run(
                &["xcrun", "simctl", "terminate", device_id, bundle_id],
                TERMINATE_TIMEOUT,
            )
            .await?;
        if output.success {
            return Ok(true);
        }
        let text = output.combined().to_lowercase();
        if text.contains("not running") || text.contains("no such process") {
            tracing::info!(bundle_id, "App was not running");
            return Ok(false);
        }
        Err(Error::app_launch(format!("Failed to terminate app {}", bundle_id))
            .with_context("bundle_id", bundle_id)
            .with_context("device_id", device_id)
            .with_context("command_output", output.output()))
    }

    /// Installed apps, sorted by bundle id.
    pub async fn list_installed_apps(&self, device_id: &str) -> Result<Vec<InstalledApp>> {
        tracing::info!(device_id, "Listing installed apps");
        let output = self
            .runner
            .run(&["xcrun", "simctl", "listapps", device_id], LIST_TIMEOUT)
            .await?;
        if !output.success {
            return Err(Error::simulator(format!(
                "Failed to list installed apps on device {}",
                device_id
            ))
            .with_context("device_id", device_id)
            .with_context("command_output", output.output()));
        }
        let mut apps = parse_installed_apps(&output.stdout);
        apps.sort_by(|a, b| a.bundle_id.cmp(&b.bundle_id));
        Ok(apps)
    }

    /// Put `text` on the simulator pasteboard. The outcome is returned as-is
    /// so callers can fall back on failure.
    pub async fn copy_to_pasteboard(&self, device_id: &str, text: &str) -> Result<CommandOutput> {
        let options = CommandOptions::with_timeout(PASTEBOARD_TIMEOUT).stdin(text);
        self.runner
            .execute(&["xcrun", "simctl", "pbcopy", device_id], &options)
            .await
    }

    /// Recent unified log lines from the simulator.
    pub async fn recent_logs(&self, device_id: &str, window: &str) -> Result<String> {
        let output = self
            .runner
            .run(
                &[
                    "xcrun", "simctl", "spawn", device_id, "log", "show", "--last", window,
                    "--style", "compact",
                ],
                LOG_TIMEOUT,
            )
            .await?;
        if !output.success {
            return Err(Error::simulator("Failed to read simulator logs")
                .with_context("device_id", device_id)
                .with_context("command_output", output.output()));
        }
        Ok(output.stdout)
    }

    /// `xcrun --version`, if the Xcode tools respond.
    pub async fn xcode_tools_version(&self) -> Option<String> {
        match self.runner.run(&["xcrun", "--version"], PROBE_TIMEOUT).await {
            Ok(output) if output.success => Some(output.stdout.trim().to_string()),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!("xcrun probe failed: {}", e);
                None
            }
        }
    }
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::validation(format!("{} cannot be empty", field)));
    }
    Ok(())
}

/// Parse `simctl list devices --json`.
pub fn parse_device_list(json: &str) -> Result<Vec<SimulatorDevice>> {
    let data: Value = serde_json::from_str(json).map_err(|e| {
        let preview: String = json.chars().take(500).collect();
        Error::simulator(format!("Failed to parse simulator list: {}", e))
            .with_context("raw_output", preview)
    })?;

    let mut devices = Vec::new();
    let Some(by_runtime) = data.get("devices").and_then(Value::as_object) else {
        return Ok(devices);
    };

    for (runtime, entries) in by_runtime {
        let Some(entries) = entries.as_array() else {
            continue;
        };
        for device in entries {
            let Some(udid) = device.get("udid").and_then(Value::as_str) else {
                continue;
            };
            let field = |key: &str| {
                device
                    .get(key)
                    .and_then(Value::as_str)
                    .unwrap_or("Unknown")
                    .to_string()
            };
            devices.push(SimulatorDevice {
                udid: udid.to_string(),
                name: field("name"),
                state: field("state"),
                runtime: runtime.clone(),
                runtime_name: runtime_display_name(runtime),
                device_type: field("deviceTypeIdentifier"),
                is_available: device
                    .get("isAvailable")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            });
        }
    }

    Ok(devices)
}

/// "com.apple.CoreSimulator.SimRuntime.iOS-18-2" becomes "iOS 18.2".
pub fn runtime_display_name(runtime: &str) -> String {
    let tail = runtime.rsplit('.').next().unwrap_or(runtime);
    match tail.split_once('-') {
        Some((platform, version)) => format!("{} {}", platform, version.replace('-', ".")),
        None => tail.to_string(),
    }
}

/// Extract the pid from `simctl launch` output ("com.example.app: 4242").
pub fn parse_launch_pid(output: &str) -> Option<u32> {
    output
        .lines()
        .filter_map(|line| line.rsplit_once(':'))
        .find_map(|(_, pid)| pid.trim().parse().ok())
}

/// Parse the property-list text printed by `simctl listapps`.
pub fn parse_installed_apps(text: &str) -> Vec<InstalledApp> {
    let mut apps: Vec<InstalledApp> = Vec::new();
    let mut depth = 0usize;

    for raw in text.lines() {
        let line = raw.trim();

        if depth == 1 && line.ends_with('{') {
            if let Some((key, _)) = line.split_once('=') {
                apps.push(InstalledApp {
                    bundle_id: unquote(key),
                    display_name: None,
                    application_type: None,
                });
            }
        } else if depth == 2 {
            if let (Some(app), Some((key, value))) = (apps.last_mut(), line.split_once('=')) {
                let value = unquote(value.trim().trim_end_matches(';'));
                match key.trim() {
                    "CFBundleDisplayName" => app.display_name = Some(value),
                    "CFBundleName" if app.display_name.is_none() => {
                        app.display_name = Some(value)
                    }
                    "ApplicationType" => app.application_type = Some(value),
                    _ => {}
                }
            }
        }

        depth += line.matches('{').count();
        depth = depth.saturating_sub(line.matches('}').count());
    }

    apps
}

fn unquote(value: &str) -> String {
    let value = value.trim();
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
        .to_string()
}
