//! Screenshot capture and screenshot directory housekeeping.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::command::Executor;
use crate::error::{Error, Result};

const CAPTURE_TIMEOUT: Duration = Duration::from_secs(30);

/// A captured screenshot.
#[derive(Debug, Clone, Serialize)]
pub struct ScreenshotInfo {
    /// File name.
    pub filename: String,
    /// Full path.
    pub path: PathBuf,
    /// File size.
    pub size_bytes: u64,
    /// Device captured from.
    pub device_id: String,
    /// Capture time (RFC 3339).
    pub timestamp: String,
    /// Set when simctl reported failure but still wrote the file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    /// 1-based position within a sequence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<usize>,
}

/// A PNG found in the screenshot directory.
#[derive(Debug, Clone, Serialize)]
pub struct ScreenshotFile {
    /// File name.
    pub filename: String,
    /// Full path.
    pub path: PathBuf,
    /// File size.
    pub size_bytes: u64,
    /// Last modification (RFC 3339).
    pub modified: String,
    #[serde(skip)]
    mtime: SystemTime,
}

/// Outcome of a retention pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    /// Files removed.
    pub deleted: usize,
    /// Files retained.
    pub kept: usize,
    /// Bytes freed.
    pub deleted_size_bytes: u64,
    /// Directory cleaned.
    pub directory: PathBuf,
}

/// Captures simulator screenshots into a managed directory.
#[derive(Clone)]
pub struct ScreenshotService {
    runner: Arc<dyn Executor>,
    default_dir: PathBuf,
    keep: Option<usize>,
}

impl ScreenshotService {
    /// Create a service writing to `default_dir`, optionally keeping only
    /// the `keep` newest files there after each capture.
    pub fn new(runner: Arc<dyn Executor>, default_dir: PathBuf, keep: Option<usize>) -> Self {
        Self {
            runner,
            default_dir,
            keep,
        }
    }

    /// Directory used when a call does not name one.
    pub fn default_dir(&self) -> &Path {
        &self.default_dir
    }

    fn resolve_dir(&self, directory: Option<&Path>) -> PathBuf {
        directory
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.default_dir.clone())
    }

    /// Capture the device screen with `simctl io screenshot`.
    pub async fn take_screenshot(
        &self,
        filename: Option<&str>,
        device_id: &str,
        directory: Option<&Path>,
    ) -> Result<ScreenshotInfo> {
        let dir = self.resolve_dir(directory);
        tokio::fs::create_dir_all(&dir).await?;

        let filename = png_name(filename, "ios_screenshot");
        let path = dir.join(&filename);
        let path_str = path.to_string_lossy().into_owned();
        tracing::info!(device_id, path = %path_str, "Taking screenshot");

        let output = match self
            .runner
            .run(
                &["xcrun", "simctl", "io", device_id, "screenshot", &path_str],
                CAPTURE_TIMEOUT,
            )
            .await
        {
            Ok(output) => output,
            Err(e) => {
                if tokio::fs::remove_file(&path).await.is_ok() {
                    tracing::debug!(path = %path_str, "Removed partial screenshot");
                }
                return Err(
                    Error::screenshot(format!("Unexpected error taking screenshot: {}", e))
                        .with_context("device_id", device_id)
                        .with_context("save_path", &path_str)
                        .with_context("error_type", e.kind()),
                );
            }
        };

        let size = file_size(&path).await;
        let info = match (output.success, size) {
            (true, Some(size)) => self.info(&filename, &path, size, device_id, None),
            (false, Some(size)) if size > 0 => {
                tracing::warn!(
                    "Screenshot saved but command reported failure: {}",
                    output.output()
                );
                self.info(
                    &filename,
                    &path,
                    size,
                    device_id,
                    Some("Command reported failure but file was created".into()),
                )
            }
            _ => {
                return Err(Error::screenshot(format!(
                    "Failed to take screenshot of device {}",
                    device_id
                ))
                .with_context("device_id", device_id)
                .with_context("save_path", &path_str)
                .with_context("command_output", output.output())
                .with_context("file_exists", size.is_some())
                .with_context(
                    "suggestions",
                    [
                        "Check if simulator is booted and accessible",
                        "Verify device ID is correct",
                        "Ensure write permissions to save directory",
                    ],
                ));
            }
        };

        tracing::info!(path = %path_str, size_bytes = info.size_bytes, "Screenshot saved");
        self.apply_retention(&dir).await;
        Ok(info)
    }

    /// Capture `count` screenshots `interval` apart.
    pub async fn take_sequence(
        &self,
        count: usize,
        interval: Duration,
        device_id: &str,
        directory: Option<&Path>,
        prefix: &str,
    ) -> Result<Vec<ScreenshotInfo>> {
        if count == 0 {
            return Err(Error::validation("Screenshot count must be positive"));
        }
        tracing::info!(count, interval_secs = interval.as_secs_f64(), "Taking screenshot sequence");

        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let mut shots = Vec::with_capacity(count);
        for i in 0..count {
            let name = format!("{}_{}_{:03}.png", prefix, stamp, i + 1);
            let mut info = self
                .take_screenshot(Some(&name), device_id, directory)
                .await
                .map_err(|e| e.with_context("completed", shots.len()).with_context("count", count))?;
            info.sequence_number = Some(i + 1);
            shots.push(info);
            if i + 1 < count && !interval.is_zero() {
                tokio::time::sleep(interval).await;
            }
        }
        Ok(shots)
    }

    /// Write PNG bytes captured elsewhere (e.g. over WebDriver).
    pub async fn save_png(
        &self,
        bytes: &[u8],
        filename: &str,
        directory: Option<&Path>,
    ) -> Result<ScreenshotInfo> {
        let dir = self.resolve_dir(directory);
        tokio::fs::create_dir_all(&dir).await?;
        let filename = png_name(Some(filename), "ios_screenshot");
        let path = dir.join(&filename);
        tokio::fs::write(&path, bytes).await.map_err(|e| {
            Error::screenshot(format!("Failed to write screenshot: {}", e))
                .with_context("save_path", path.to_string_lossy())
        })?;
        let info = self.info(&filename, &path, bytes.len() as u64, "appium", None);
        self.apply_retention(&dir).await;
        Ok(info)
    }

    /// PNG files in the directory, newest first.
    pub async fn list_screenshots(&self, directory: Option<&Path>) -> Result<Vec<ScreenshotFile>> {
        let dir = self.resolve_dir(directory);
        if !dir.exists() {
            tracing::warn!(directory = %dir.display(), "Screenshot directory does not exist");
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !is_png(&path) {
                continue;
            }
            let meta = match entry.metadata().await {
                Ok(meta) if meta.is_file() => meta,
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!("Error reading file info for {}: {}", path.display(), e);
                    continue;
                }
            };
            let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            files.push(ScreenshotFile {
                filename: entry.file_name().to_string_lossy().into_owned(),
                size_bytes: meta.len(),
                modified: DateTime::<Local>::from(mtime).to_rfc3339(),
                path,
                mtime,
            });
        }

        files.sort_by(|a, b| b.mtime.cmp(&a.mtime));
        Ok(files)
    }

    /// Delete all but the `keep` most recently modified PNGs.
    pub async fn cleanup_old_screenshots(
        &self,
        keep: usize,
        directory: Option<&Path>,
    ) -> Result<CleanupReport> {
        let dir = self.resolve_dir(directory);
        let mut report = CleanupReport {
            directory: dir.clone(),
            ..CleanupReport::default()
        };
        if !dir.exists() {
            return Ok(report);
        }

        let files = self.list_screenshots(Some(&dir)).await?;
        report.kept = files.len().min(keep);
        for file in files.into_iter().skip(keep) {
            match tokio::fs::remove_file(&file.path).await {
                Ok(()) => {
                    report.deleted += 1;
                    report.deleted_size_bytes += file.size_bytes;
                    tracing::debug!("Deleted {}", file.filename);
                }
                Err(e) => {
                    report.kept += 1;
                    tracing::warn!("Failed to delete {}: {}", file.path.display(), e);
                }
            }
        }

        if report.deleted > 0 {
            tracing::info!(
                deleted = report.deleted,
                bytes = report.deleted_size_bytes,
                "Screenshot cleanup complete"
            );
        }
        Ok(report)
    }

    /// Retention only touches the managed directory, and never removes the
    /// capture that triggered it.
    async fn apply_retention(&self, dir: &Path) {
        if dir != self.default_dir.as_path() {
            return;
        }
        if let Some(keep) = self.keep {
            if let Err(e) = self.cleanup_old_screenshots(keep.max(1), Some(dir)).await {
                tracing::warn!("Screenshot retention failed: {}", e);
            }
        }
    }

    fn info(
        &self,
        filename: &str,
        path: &Path,
        size_bytes: u64,
        device_id: &str,
        warning: Option<String>,
    ) -> ScreenshotInfo {
        ScreenshotInfo {
            filename: filename.to_string(),
            path: path.to_path_buf(),
            size_bytes,
            device_id: device_id.to_string(),
            timestamp: Local::now().to_rfc3339(),
            warning,
            sequence_number: None,
        }
    }
}

/// `<prefix>_<YYYYmmdd_HHMMSS>.png` when no name is given; `.png` appended
/// when missing.
pub fn png_name(filename: Option<&str>, prefix: &str) -> String {
    match filename.map(str::trim).filter(|f| !f.is_empty()) {
        Some(name) if name.to_ascii_lowercase().ends_with(".png") => name.to_string(),
        Some(name) => format!("{}.png", name),
        None => format!("{}_{}.png", prefix, Local::now().format("%Y%m%d_%H%M%S")),
    }
}

fn is_png(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("png"))
        .unwrap_or(false)
}

async fn file_size(path: &Path) -> Option<u64> {
    tokio::fs::metadata(path).await.ok().map(|m| m.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn png_names() {
        assert_eq!(png_name(Some("home"), "x"), "home.png");
        assert_eq!(png_name(Some("home.PNG"), "x"), "home.PNG");
        let generated = png_name(None, "ios_screenshot");
        assert!(generated.starts_with("ios_screenshot_"));
        assert!(generated.ends_with(".png"));
        assert_eq!(generated.len(), "ios_screenshot_20250101_120000.png".len());
    }

    #[test]
    fn png_detection() {
        assert!(is_png(Path::new("/tmp/a.png")));
        assert!(is_png(Path::new("/tmp/a.PNG")));
        assert!(!is_png(Path::new("/tmp/a.jpg")));
        assert!(!is_png(Path::new("/tmp/png")));
    }
}
