//! Prompt templates offered to the assistant.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::protocol::{ContentItem, GetPromptResult, Prompt, PromptArgument, PromptMessage};

/// Testing workflow prompt.
pub const APP_TEST: &str = "ios-app-test";
/// Debugging walkthrough prompt.
pub const AUTOMATION_DEBUG: &str = "ios-automation-debug";

/// Prompts this server exposes.
pub fn list() -> Vec<Prompt> {
    vec![
        Prompt {
            name: APP_TEST.into(),
            description: Some("Generate comprehensive iOS app testing workflow".into()),
            arguments: vec![
                argument("app_name", "Name of the iOS app to test", true),
                argument(
                    "test_scenarios",
                    "Comma-separated list of test scenarios",
                    false,
                ),
            ],
        },
        Prompt {
            name: AUTOMATION_DEBUG.into(),
            description: Some("Debug iOS automation issues step by step".into()),
            arguments: vec![argument(
                "error_description",
                "Description of the automation error encountered",
                true,
            )],
        },
    ]
}

fn argument(name: &str, description: &str, required: bool) -> PromptArgument {
    PromptArgument {
        name: name.into(),
        description: Some(description.into()),
        required,
    }
}

/// Render a prompt.
pub fn get(name: &str, arguments: &HashMap<String, String>) -> Result<GetPromptResult> {
    let required = |key: &str| {
        arguments
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                Error::InvalidParams(format!("prompt '{}' requires argument '{}'", name, key))
            })
    };

    let (description, text) = match name {
        APP_TEST => {
            let app = required("app_name")?;
            let scenarios = arguments
                .get("test_scenarios")
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .unwrap_or("basic functionality");
            (
                format!("iOS testing workflow for {}", app),
                app_test_text(app, scenarios),
            )
        }
        AUTOMATION_DEBUG => {
            let error = required("error_description")?;
            (
                format!("Debug iOS automation issue: {}", error),
                debug_text(error),
            )
        }
        other => return Err(Error::InvalidParams(format!("unknown prompt: {}", other))),
    };

    Ok(GetPromptResult {
        description: Some(description),
        messages: vec![PromptMessage {
            role: "user".into(),
            content: ContentItem::text(text),
        }],
    })
}

fn app_test_text(app: &str, scenarios: &str) -> String {
    format!(
        "# iOS App Testing Workflow for {app}

## Test Scenarios: {scenarios}

### 1. Environment Setup
- List simulators and boot an iPhone simulator (list_simulators, boot_simulator)
- Take an initial screenshot (take_screenshot)
- Verify the app is installed (list_installed_apps)

### 2. App Launch Testing
- Launch {app} (launch_app)
- Verify the app loads successfully
- Take a screenshot of the main screen

### 3. UI Testing
- Extract the accessibility tree (get_accessibility_tree)
- Exercise the major UI elements (find_and_tap, appium_tap_and_type)
- Verify navigation works

### 4. Functionality Testing
Based on scenarios: {scenarios}

### 5. Cleanup
- Take final screenshots
- Terminate the app (terminate_app)
- Summarize the results as a test report

Use the iOS automation tools to execute each step systematically."
    )
}

fn debug_text(error: &str) -> String {
    format!(
        "# iOS Automation Debug Assistant

## Error Description: {error}

### Debug Steps:

1. **Check Simulator State**
   - List all simulators (list_simulators)
   - Verify the simulator is booted (get_simulator_state)
   - Check simulator logs (logs://simulator resource)

2. **Verify App State**
   - List installed apps (list_installed_apps)
   - Check whether the target app is running
   - Take a screenshot to see the current state

3. **Test Basic Functionality**
   - Try a simple tap_coordinate
   - Test accessibility tree extraction (get_accessibility_tree)
   - Check server and Appium health (get_server_status)

4. **Common Solutions**
   - Restart the simulator if needed
   - Grant accessibility permission to the terminal running the server
   - Verify the app bundle ID
   - Start Appium with: appium server --port 4723

Let me help you debug this step by step using the iOS automation tools."
    )
}
