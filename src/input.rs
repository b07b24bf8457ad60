//! Keyboard and pointer input through AppleScript.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::applescript;
use crate::command::Executor;
use crate::error::{Error, Result};
use crate::simulator::SimulatorManager;

const SCRIPT_TIMEOUT: Duration = Duration::from_secs(30);
const PROBE_TIMEOUT: Duration = Duration::from_secs(15);

/// How text ended up in the focused field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TypingMethod {
    /// One `keystroke` command with the whole string.
    DirectKeystroke,
    /// `simctl pbcopy` followed by Cmd+V.
    Pasteboard,
    /// One `keystroke` per character.
    CharacterByCharacter,
}

impl TypingMethod {
    /// Stages in the order they are attempted.
    pub const CHAIN: [TypingMethod; 3] = [
        TypingMethod::DirectKeystroke,
        TypingMethod::Pasteboard,
        TypingMethod::CharacterByCharacter,
    ];

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            TypingMethod::DirectKeystroke => "direct_keystroke",
            TypingMethod::Pasteboard => "pasteboard",
            TypingMethod::CharacterByCharacter => "character_by_character",
        }
    }
}

/// One failed stage of the typing chain.
#[derive(Debug, Clone, Serialize)]
pub struct StageFailure {
    /// Stage that failed.
    pub method: TypingMethod,
    /// Diagnostic output.
    pub detail: String,
}

/// Successful typing result.
#[derive(Debug, Clone, Serialize)]
pub struct TypingOutcome {
    /// Stage that succeeded.
    pub method: TypingMethod,
    /// Stages that failed before it.
    pub failed_stages: Vec<StageFailure>,
}

/// Successful tap result.
#[derive(Debug, Clone, Serialize)]
pub struct TapOutcome {
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
    /// Target device.
    pub device_id: String,
    /// How the tap was delivered.
    pub method: &'static str,
}

/// Drives the Simulator window with synthetic input.
#[derive(Clone)]
pub struct InputDriver {
    runner: Arc<dyn Executor>,
    simulators: SimulatorManager,
}

impl InputDriver {
    /// Create a driver.
    pub fn new(runner: Arc<dyn Executor>, simulators: SimulatorManager) -> Self {
        Self { runner, simulators }
    }

    /// Type `text` into the focused field, falling back through
    /// [`TypingMethod::CHAIN`] until a stage reports its success marker.
    pub async fn type_text(&self, text: &str, device_id: &str) -> Result<TypingOutcome> {
        if text.is_empty() {
            return Err(Error::validation("text cannot be empty"));
        }
        tracing::info!(device_id, chars = text.chars().count(), "Typing text");

        let mut failed_stages = Vec::new();
        for method in TypingMethod::CHAIN {
            match self.attempt(method, text, device_id).await {
                Ok(()) => {
                    tracing::info!(method = method.as_str(), "Typed text");
                    return Ok(TypingOutcome {
                        method,
                        failed_stages,
                    });
                }
                Err(detail) => {
                    tracing::warn!(method = method.as_str(), "Typing stage failed: {}", detail);
                    failed_stages.push(StageFailure { method, detail });
                }
            }
        }

        let last = failed_stages
            .last()
            .map(|f| f.detail.clone())
            .unwrap_or_default();
        Err(Error::automation(format!("Failed to type text: {}", last))
            .with_context("device_id", device_id)
            .with_context("failed_stages", &failed_stages)
            .with_context(
                "suggestions",
                [
                    "Make sure the Simulator window is in the foreground",
                    "Tap the text field first so it has keyboard focus",
                    "Grant accessibility permission to the terminal running the server",
                ],
            ))
    }

    /// Run one stage; `Err` carries the diagnostic output.
    async fn attempt(
        &self,
        method: TypingMethod,
        text: &str,
        device_id: &str,
    ) -> std::result::Result<(), String> {
        let (script, marker) = match method {
            TypingMethod::DirectKeystroke => {
                (applescript::keystroke_script(text), applescript::KEYSTROKE_MARKER)
            }
            TypingMethod::Pasteboard => {
                let copied = self
                    .simulators
                    .copy_to_pasteboard(device_id, text)
                    .await
                    .map_err(|e| e.to_string())?;
                if !copied.success {
                    return Err(format!("pbcopy failed: {}", copied.output().trim()));
                }
                (applescript::paste_script(), applescript::PASTE_MARKER)
            }
            TypingMethod::CharacterByCharacter => {
                (applescript::char_by_char_script(text), applescript::CHARS_MARKER)
            }
        };
        self.run_script(&script, marker).await
    }

    async fn run_script(&self, script: &str, marker: &str) -> std::result::Result<(), String> {
        let output = self
            .runner
            .run(&["osascript", "-e", script], SCRIPT_TIMEOUT)
            .await
            .map_err(|e| e.to_string())?;
        if output.success && output.stdout.contains(marker) {
            Ok(())
        } else if output.success {
            Err(format!(
                "script exited without completing: {}",
                output.stdout.trim()
            ))
        } else {
            Err(output.output().trim().to_string())
        }
    }

    /// Click at absolute coordinates after checking the simulator responds.
    pub async fn tap_coordinate(&self, x: f64, y: f64, device_id: &str) -> Result<TapOutcome> {
        if !x.is_finite() || !y.is_finite() || x < 0.0 || y < 0.0 {
            return Err(Error::validation("coordinates must be non-negative numbers")
                .with_context("x", x)
                .with_context("y", y));
        }
        tracing::info!(x, y, device_id, "Tapping coordinate");

        let probe = std::env::temp_dir()
            .join(format!("ios_mcp_tap_probe_{}.png", Uuid::new_v4()));
        let probe_path = probe.to_string_lossy().into_owned();
        let probed = self
            .runner
            .run(
                &["xcrun", "simctl", "io", device_id, "screenshot", &probe_path],
                PROBE_TIMEOUT,
            )
            .await?;
        let _ = tokio::fs::remove_file(&probe).await;
        if !probed.success {
            return Err(Error::simulator(format!(
                "Simulator {} is not responding",
                device_id
            ))
            .with_context("device_id", device_id)
            .with_context("command_output", probed.output()));
        }

        self.run_script(&applescript::click_script(x, y), applescript::TAP_MARKER)
            .await
            .map_err(|detail| {
                Error::automation(format!("Failed to tap at ({}, {}): {}", x, y, detail))
                    .with_context("device_id", device_id)
            })?;

        Ok(TapOutcome {
            x,
            y,
            device_id: device_id.to_string(),
            method: "applescript",
        })
    }
}
