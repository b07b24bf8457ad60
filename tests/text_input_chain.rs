//! Typing and tapping through AppleScript with a scripted process layer.

mod common;

use common::{fail, ok, ScriptedExecutor};
use ios_simulator_mcp::applescript::{CHARS_MARKER, KEYSTROKE_MARKER, PASTE_MARKER, TAP_MARKER};
use ios_simulator_mcp::input::{InputDriver, TypingMethod};
use ios_simulator_mcp::simulator::SimulatorManager;
use ios_simulator_mcp::Error;

fn driver(executor: &std::sync::Arc<ScriptedExecutor>) -> InputDriver {
    let simulators = SimulatorManager::new(executor.clone());
    InputDriver::new(executor.clone(), simulators)
}

fn stage_of(script: &str) -> TypingMethod {
    if script.contains(KEYSTROKE_MARKER) {
        TypingMethod::DirectKeystroke
    } else if script.contains(PASTE_MARKER) {
        TypingMethod::Pasteboard
    } else if script.contains(CHARS_MARKER) {
        TypingMethod::CharacterByCharacter
    } else {
        panic!("unexpected script: {}", script)
    }
}

#[tokio::test]
async fn direct_keystroke_success_stops_the_chain() {
    let executor = ScriptedExecutor::new(|_, _| ok(KEYSTROKE_MARKER));

    let outcome = driver(&executor).type_text("hello", "booted").await.unwrap();

    assert_eq!(outcome.method, TypingMethod::DirectKeystroke);
    assert!(outcome.failed_stages.is_empty());
    assert_eq!(executor.calls().len(), 1);
}

#[tokio::test]
async fn missing_marker_falls_through_to_pasteboard() {
    let executor = ScriptedExecutor::new(|argv, _| match argv {
        ["xcrun", "simctl", "pbcopy", ..] => ok(""),
        ["osascript", "-e", script] => match stage_of(script) {
            // Exit 0 without the marker still counts as a failure.
            TypingMethod::DirectKeystroke => ok(""),
            TypingMethod::Pasteboard => ok(PASTE_MARKER),
            TypingMethod::CharacterByCharacter => ok(CHARS_MARKER),
        },
        other => panic!("unexpected command {:?}", other),
    });

    let outcome = driver(&executor).type_text("héllo wörld", "ABC-123").await.unwrap();

    assert_eq!(outcome.method, TypingMethod::Pasteboard);
    assert_eq!(outcome.failed_stages.len(), 1);
    assert_eq!(outcome.failed_stages[0].method, TypingMethod::DirectKeystroke);

    let stages: Vec<_> = executor.scripts().iter().map(|s| stage_of(s)).collect();
    assert_eq!(stages, vec![TypingMethod::DirectKeystroke, TypingMethod::Pasteboard]);

    let pbcopy = executor
        .calls()
        .into_iter()
        .find(|c| c.argv.get(2).map(String::as_str) == Some("pbcopy"))
        .unwrap();
    assert_eq!(pbcopy.argv[3], "ABC-123");
    assert_eq!(pbcopy.stdin.as_deref(), Some("héllo wörld"));
}

#[tokio::test]
async fn pbcopy_failure_skips_paste_and_types_per_character() {
    let executor = ScriptedExecutor::new(|argv, _| match argv {
        ["xcrun", "simctl", "pbcopy", ..] => fail("Invalid device: booted"),
        ["osascript", "-e", script] => match stage_of(script) {
            TypingMethod::DirectKeystroke => fail("execution error: not allowed assistive access"),
            TypingMethod::Pasteboard => panic!("paste must not run after pbcopy failed"),
            TypingMethod::CharacterByCharacter => ok(CHARS_MARKER),
        },
        other => panic!("unexpected command {:?}", other),
    });

    let outcome = driver(&executor).type_text("a\tb", "booted").await.unwrap();

    assert_eq!(outcome.method, TypingMethod::CharacterByCharacter);
    let failed: Vec<_> = outcome.failed_stages.iter().map(|f| f.method).collect();
    assert_eq!(failed, vec![TypingMethod::DirectKeystroke, TypingMethod::Pasteboard]);
    assert!(outcome.failed_stages[1].detail.contains("pbcopy failed"));
}

#[tokio::test]
async fn all_stages_failing_is_an_automation_error() {
    let executor = ScriptedExecutor::new(|argv, _| match argv {
        ["xcrun", ..] => ok(""),
        _ => fail("System Events got an error"),
    });

    let err = driver(&executor).type_text("x", "booted").await.unwrap_err();

    assert!(matches!(err, Error::Automation { .. }));
    let context = err.context().unwrap();
    assert_eq!(context["failed_stages"].as_array().unwrap().len(), 3);
    assert_eq!(err.suggestions().len(), 3);
}

#[tokio::test]
async fn empty_text_runs_nothing() {
    let executor = ScriptedExecutor::new(|_, _| ok(""));
    let err = driver(&executor).type_text("", "booted").await.unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));
    assert!(executor.calls().is_empty());
}

#[tokio::test]
async fn tap_probes_the_simulator_before_clicking() {
    let executor = ScriptedExecutor::new(|argv, _| match argv {
        ["xcrun", "simctl", "io", ..] => ok(""),
        ["osascript", "-e", _] => ok(TAP_MARKER),
        other => panic!("unexpected command {:?}", other),
    });

    let outcome = driver(&executor).tap_coordinate(120.0, 640.5, "booted").await.unwrap();

    assert_eq!(outcome.method, "applescript");
    let calls = executor.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].argv[..5], ["xcrun", "simctl", "io", "booted", "screenshot"]);
    assert!(calls[1].script().unwrap().contains("click at {120, 641}"));
}

#[tokio::test]
async fn tap_on_unresponsive_simulator_never_clicks() {
    let executor = ScriptedExecutor::new(|_, _| fail("No devices are booted."));

    let err = driver(&executor).tap_coordinate(10.0, 10.0, "booted").await.unwrap_err();

    assert!(matches!(err, Error::Simulator { .. }));
    assert!(executor.scripts().is_empty());
}

#[tokio::test]
async fn negative_coordinates_are_rejected() {
    let executor = ScriptedExecutor::new(|_, _| ok(""));
    let err = driver(&executor).tap_coordinate(-1.0, 5.0, "booted").await.unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));
}

#[tokio::test]
async fn each_tap_checks_responsiveness_with_its_own_file() {
    let executor = ScriptedExecutor::new(|argv, _| match argv {
        ["xcrun", "simctl", "io", ..] => ok(""),
        ["osascript", "-e", _] => ok(TAP_MARKER),
        other => panic!("unexpected command {:?}", other),
    });
    let driver = driver(&executor);

    driver.tap_coordinate(1.0, 1.0, "booted").await.unwrap();
    driver.tap_coordinate(2.0, 2.0, "booted").await.unwrap();

    let targets: Vec<String> = executor
        .calls()
        .iter()
        .filter(|c| c.argv.get(4).map(String::as_str) == Some("screenshot"))
        .map(|c| c.argv[5].clone())
        .collect();
    assert_eq!(targets.len(), 2);
    assert_ne!(targets[0], targets[1]);
    assert!(targets.iter().all(|t| t.ends_with(".png")));
}
