//! Screenshot capture and retention against a real directory.

mod common;

use std::fs::File;
use std::path::Path;
use std::time::{Duration, SystemTime};

use common::{fail, ok, ScriptedExecutor};
use ios_simulator_mcp::screenshot::ScreenshotService;
use ios_simulator_mcp::Error;

/// Write a PNG stub whose mtime is `age_secs` in the past.
fn aged_png(dir: &Path, name: &str, age_secs: u64) {
    let path = dir.join(name);
    std::fs::write(&path, b"\x89PNG fake").unwrap();
    let file = File::options().write(true).open(&path).unwrap();
    file.set_modified(SystemTime::now() - Duration::from_secs(age_secs))
        .unwrap();
}

fn names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Executor that behaves like `simctl io screenshot`, writing the target file.
fn capturing_executor() -> std::sync::Arc<ScriptedExecutor> {
    ScriptedExecutor::new(|argv, _| {
        std::fs::write(argv[5], b"\x89PNG captured").unwrap();
        ok("Wrote screenshot")
    })
}

#[tokio::test]
async fn cleanup_keeps_the_newest_files() {
    let dir = tempfile::tempdir().unwrap();
    aged_png(dir.path(), "oldest.png", 400);
    aged_png(dir.path(), "older.png", 300);
    aged_png(dir.path(), "newer.png", 200);
    aged_png(dir.path(), "newest.png", 100);
    std::fs::write(dir.path().join("notes.txt"), "not a screenshot").unwrap();

    let service = ScreenshotService::new(capturing_executor(), dir.path().to_path_buf(), None);
    let report = service.cleanup_old_screenshots(2, None).await.unwrap();

    assert_eq!(report.deleted, 2);
    assert_eq!(report.kept, 2);
    assert_eq!(report.deleted_size_bytes, 2 * 9);
    assert_eq!(names(dir.path()), vec!["newer.png", "newest.png", "notes.txt"]);
}

#[tokio::test]
async fn listing_is_newest_first() {
    let dir = tempfile::tempdir().unwrap();
    aged_png(dir.path(), "b.png", 50);
    aged_png(dir.path(), "a.png", 10);
    aged_png(dir.path(), "c.PNG", 90);

    let service = ScreenshotService::new(capturing_executor(), dir.path().to_path_buf(), None);
    let files = service.list_screenshots(None).await.unwrap();

    let order: Vec<_> = files.iter().map(|f| f.filename.as_str()).collect();
    assert_eq!(order, vec!["a.png", "b.png", "c.PNG"]);
}

#[tokio::test]
async fn cleanup_of_missing_directory_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("never-created");
    let service = ScreenshotService::new(capturing_executor(), missing.clone(), None);

    let report = service.cleanup_old_screenshots(1, None).await.unwrap();
    assert_eq!(report.deleted, 0);
    assert_eq!(report.directory, missing);
}

#[tokio::test]
async fn capture_applies_retention() {
    let dir = tempfile::tempdir().unwrap();
    aged_png(dir.path(), "stale_1.png", 600);
    aged_png(dir.path(), "stale_2.png", 500);

    let service = ScreenshotService::new(capturing_executor(), dir.path().to_path_buf(), Some(2));
    let info = service
        .take_screenshot(Some("fresh"), "booted", None)
        .await
        .unwrap();

    assert_eq!(info.filename, "fresh.png");
    assert_eq!(info.device_id, "booted");
    assert!(info.warning.is_none());
    assert_eq!(names(dir.path()), vec!["fresh.png", "stale_2.png"]);
}

#[tokio::test]
async fn reported_failure_with_file_on_disk_is_a_warning() {
    let dir = tempfile::tempdir().unwrap();
    let executor = ScriptedExecutor::new(|argv, _| {
        std::fs::write(argv[5], b"\x89PNG partial").unwrap();
        fail("simctl warning: display not ready")
    });
    let service = ScreenshotService::new(executor, dir.path().to_path_buf(), None);

    let info = service.take_screenshot(None, "booted", None).await.unwrap();
    assert!(info.filename.starts_with("ios_screenshot_"));
    assert!(info.warning.is_some());
}

#[tokio::test]
async fn failure_without_file_is_a_screenshot_error() {
    let dir = tempfile::tempdir().unwrap();
    let executor = ScriptedExecutor::new(|_, _| fail("Invalid device: XYZ"));
    let service = ScreenshotService::new(executor, dir.path().to_path_buf(), None);

    let err = service.take_screenshot(Some("x.png"), "XYZ", None).await.unwrap_err();
    assert!(matches!(err, Error::Screenshot { .. }));
    let context = err.context().unwrap();
    assert_eq!(context["file_exists"], false);
    assert_eq!(context["command_output"], "Invalid device: XYZ");
    assert_eq!(err.suggestions().len(), 3);
}

#[tokio::test]
async fn sequences_are_numbered() {
    let dir = tempfile::tempdir().unwrap();
    let executor = capturing_executor();
    let service = ScreenshotService::new(executor.clone(), dir.path().to_path_buf(), None);

    let shots = service
        .take_sequence(3, Duration::ZERO, "booted", None, "flow")
        .await
        .unwrap();

    let numbers: Vec<_> = shots.iter().map(|s| s.sequence_number).collect();
    assert_eq!(numbers, vec![Some(1), Some(2), Some(3)]);
    assert!(shots[2].filename.starts_with("flow_") && shots[2].filename.ends_with("_003.png"));
    assert_eq!(executor.calls().len(), 3);
}

#[tokio::test]
async fn retention_leaves_caller_directories_alone() {
    let managed = tempfile::tempdir().unwrap();
    let user_dir = tempfile::tempdir().unwrap();
    aged_png(user_dir.path(), "holiday_photo.png", 3600);
    aged_png(managed.path(), "ios_screenshot_old.png", 3600);

    let service = ScreenshotService::new(capturing_executor(), managed.path().to_path_buf(), Some(1));
    service
        .take_screenshot(Some("shot"), "booted", Some(user_dir.path()))
        .await
        .unwrap();
    service
        .save_png(b"\x89PNG appium", "remote", Some(user_dir.path()))
        .await
        .unwrap();

    assert_eq!(
        names(user_dir.path()),
        vec!["holiday_photo.png", "remote.png", "shot.png"]
    );
    assert_eq!(names(managed.path()), vec!["ios_screenshot_old.png"]);
}

#[tokio::test]
async fn zero_retention_keeps_the_fresh_capture() {
    let dir = tempfile::tempdir().unwrap();
    aged_png(dir.path(), "stale.png", 600);

    let service = ScreenshotService::new(capturing_executor(), dir.path().to_path_buf(), Some(0));
    let info = service
        .take_screenshot(Some("shot"), "booted", None)
        .await
        .unwrap();

    assert!(info.path.exists());
    assert_eq!(names(dir.path()), vec!["shot.png"]);
}
