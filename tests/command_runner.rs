//! Process execution against real POSIX tools.

#![cfg(unix)]

use std::collections::HashMap;
use std::time::{Duration, Instant};

use ios_simulator_mcp::{CommandOptions, CommandRunner, Error, Executor};
use tokio_test::{assert_err, assert_ok};

#[tokio::test]
async fn non_zero_exit_is_reported_not_raised() {
    let runner = CommandRunner::new();
    let output = assert_ok!(
        runner
            .run(
                &["sh", "-c", "echo partial; echo 'Unable to boot device' >&2; exit 3"],
                Duration::from_secs(10),
            )
            .await
    );

    assert!(!output.success);
    assert_eq!(output.exit_code, 3);
    assert_eq!(output.stdout.trim(), "partial");
    assert_eq!(output.stderr.trim(), "Unable to boot device");
    assert_eq!(output.output().trim(), "Unable to boot device");
}

#[tokio::test]
async fn success_captures_stdout() {
    let output = assert_ok!(
        CommandRunner::new()
            .run(&["echo", "hello", "world"], Duration::from_secs(10))
            .await
    );
    assert!(output.success);
    assert_eq!(output.stdout, "hello world\n");
    assert_eq!(output.command, "echo hello world");
}

#[tokio::test]
async fn stdin_and_env_reach_the_child() {
    let mut options = CommandOptions::with_timeout(Duration::from_secs(10)).stdin("piped text");
    options.env = HashMap::from([("IOS_MCP_TEST_VAR".to_string(), "42".to_string())]);

    let output = assert_ok!(
        CommandRunner::new()
            .execute(&["sh", "-c", "cat; printf ' %s' \"$IOS_MCP_TEST_VAR\""], &options)
            .await
    );
    assert_eq!(output.stdout, "piped text 42");
}

#[tokio::test]
async fn slow_command_times_out_and_is_terminated() {
    let started = Instant::now();
    let err = assert_err!(
        CommandRunner::new()
            .run(&["sleep", "30"], Duration::from_millis(300))
            .await
    );

    match err {
        Error::CommandTimeout { command, timeout } => {
            assert_eq!(command, "sleep 30");
            assert_eq!(timeout, Duration::from_millis(300));
        }
        other => panic!("expected timeout, got {:?}", other),
    }
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn empty_argv_is_rejected() {
    let err = assert_err!(CommandRunner::new().run(&[], Duration::from_secs(1)).await);
    assert!(matches!(err, Error::Internal(_)));
}

#[tokio::test]
async fn timeout_delivers_sigterm_before_killing() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("terminated");
    let mut options = CommandOptions::with_timeout(Duration::from_millis(300));
    options.env = HashMap::from([(
        "MARKER".to_string(),
        marker.to_string_lossy().into_owned(),
    )]);

    let started = Instant::now();
    let err = assert_err!(
        CommandRunner::new()
            .execute(
                &["sh", "-c", "trap 'echo term > \"$MARKER\"; exit 0' TERM; sleep 30 & wait"],
                &options,
            )
            .await
    );

    assert!(matches!(err, Error::CommandTimeout { .. }));
    assert_eq!(std::fs::read_to_string(&marker).unwrap().trim(), "term");
    assert!(started.elapsed() < Duration::from_secs(5));
}
