//! Tool dispatch through the registry with a scripted process layer.

mod common;

use serde_json::{json, Value};

use common::{fail, ok, ScriptedExecutor};
use ios_simulator_mcp::config::Settings;
use ios_simulator_mcp::protocol::ToolCallResult;
use ios_simulator_mcp::{ToolContext, ToolRegistry};

const DEVICES: &str = r#"{
  "devices": {
    "com.apple.CoreSimulator.SimRuntime.iOS-18-2": [
      { "udid": "AAAA-1111", "name": "iPhone 16 Pro", "state": "Booted", "isAvailable": true,
        "deviceTypeIdentifier": "com.apple.CoreSimulator.SimDeviceType.iPhone-16-Pro" },
      { "udid": "BBBB-2222", "name": "iPad Air", "state": "Shutdown", "isAvailable": true,
        "deviceTypeIdentifier": "com.apple.CoreSimulator.SimDeviceType.iPad-Air" }
    ]
  }
}"#;

fn registry(executor: std::sync::Arc<ScriptedExecutor>) -> ToolRegistry {
    let mut settings = Settings::default();
    // Nothing listens on the discard port.
    settings.appium.url = "http://127.0.0.1:9".into();
    ToolRegistry::new(ToolContext::with_executor(settings, executor).unwrap())
}

fn payload(result: &ToolCallResult) -> Value {
    serde_json::from_str(result.first_text().unwrap()).unwrap()
}

fn simctl() -> std::sync::Arc<ScriptedExecutor> {
    ScriptedExecutor::new(|argv, _| match argv {
        ["xcrun", "simctl", "list", "devices", "--json"] => ok(DEVICES),
        ["xcrun", "simctl", "boot", "AAAA-1111"] => {
            fail("Unable to boot device in current state: Booted")
        }
        ["xcrun", "simctl", "boot", _] => fail("Invalid device: nope"),
        ["xcrun", "simctl", "launch", _, "com.example.app"] => ok("com.example.app: 4242\n"),
        ["xcrun", "simctl", "launch", _, _] => {
            fail("The operation couldn't be completed. FBSOpenApplicationErrorDomain")
        }
        other => panic!("unexpected command {:?}", other),
    })
}

#[tokio::test]
async fn unknown_tool_is_a_structured_result() {
    let registry = registry(simctl());

    let result = registry.dispatch("reboot_iphone", json!({})).await;

    assert!(result.is_error);
    let body = payload(&result);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("reboot_iphone"));
    assert_eq!(body["available_tools"].as_array().unwrap().len(), 16);
}

#[tokio::test]
async fn list_simulators_parses_simctl_json() {
    let registry = registry(simctl());

    let result = registry.dispatch("list_simulators", Value::Null).await;

    assert!(!result.is_error);
    let body = payload(&result);
    assert_eq!(body["success"], true);
    assert_eq!(body["tool_name"], "list_simulators");
    assert_eq!(body["count"], 2);
    assert_eq!(body["booted_count"], 1);
    assert_eq!(body["simulators"][0]["runtime_name"], "iOS 18.2");
}

#[tokio::test]
async fn booted_filter_and_unknown_udid() {
    let registry = registry(simctl());

    let booted = payload(
        &registry
            .dispatch("get_simulator_state", json!({ "device_id": "booted" }))
            .await,
    );
    assert_eq!(booted["devices"].as_array().unwrap().len(), 1);
    assert_eq!(booted["devices"][0]["udid"], "AAAA-1111");

    let missing = registry
        .dispatch("get_simulator_state", json!({ "device_id": "ZZZZ" }))
        .await;
    assert!(missing.is_error);
    let body = payload(&missing);
    assert_eq!(body["error_kind"], "simulator");
    assert_eq!(
        body["suggestions"],
        json!(["Use list_simulators to see available device UDIDs"])
    );
}

#[tokio::test]
async fn booting_a_booted_simulator_succeeds() {
    let registry = registry(simctl());

    let result = registry
        .dispatch("boot_simulator", json!({ "device_id": "AAAA-1111" }))
        .await;

    assert!(!result.is_error);
    assert_eq!(payload(&result)["already_booted"], true);

    let failed = registry
        .dispatch("boot_simulator", json!({ "device_id": "nope" }))
        .await;
    assert!(failed.is_error);
    assert_eq!(payload(&failed)["context"]["command_output"], "Invalid device: nope");
}

#[tokio::test]
async fn launch_reports_pid_or_suggestions() {
    let registry = registry(simctl());

    let launched = payload(
        &registry
            .dispatch("launch_app", json!({ "bundle_id": "com.example.app" }))
            .await,
    );
    assert_eq!(launched["pid"], 4242);
    assert_eq!(launched["device_id"], "booted");

    let failed = registry
        .dispatch("launch_app", json!({ "bundle_id": "com.example.missing" }))
        .await;
    assert!(failed.is_error);
    let body = payload(&failed);
    assert_eq!(body["error_kind"], "app_launch");
    assert_eq!(body["tool_name"], "launch_app");
    assert_eq!(body["suggestions"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn malformed_arguments_never_reach_the_backend() {
    let executor = simctl();
    let registry = registry(executor.clone());

    let result = registry
        .dispatch("boot_simulator", json!({ "device": "AAAA-1111" }))
        .await;
    assert!(result.is_error);
    assert_eq!(payload(&result)["error_kind"], "invalid_params");

    let result = registry
        .dispatch("install_app", json!({ "app_path": "/definitely/not/here.app" }))
        .await;
    assert_eq!(payload(&result)["error_kind"], "validation");

    assert!(executor.calls().is_empty());
}

#[tokio::test]
async fn element_tools_report_unreachable_appium() {
    let registry = registry(simctl());

    let result = registry
        .dispatch("find_and_tap", json!({ "element_text": "Settings" }))
        .await;

    assert!(result.is_error);
    let body = payload(&result);
    assert_eq!(body["error_kind"], "appium_connection");
    assert_eq!(
        body["suggestions"],
        json!(["Start Appium: appium server --port 4723"])
    );
}

#[tokio::test]
async fn find_and_tap_requires_a_criterion() {
    let registry = registry(simctl());

    let result = registry
        .dispatch("find_and_tap", json!({ "element_type": "button" }))
        .await;
    assert_eq!(payload(&result)["error_kind"], "validation");

    let result = registry
        .dispatch("find_and_tap", json!({ "element_text": "x", "element_type": "widget" }))
        .await;
    let body = payload(&result);
    assert_eq!(body["error_kind"], "validation");
    assert!(body["context"]["supported_types"].is_array());
}
