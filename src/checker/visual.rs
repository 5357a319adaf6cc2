//! Visual checker: headless-browser screenshots and pixel diffing.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use super::{CheckOutcome, Checker, Status};
use crate::error::{Result, VigilError};
use crate::store::Target;

const VISUAL_DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_THRESHOLD: f64 = 5.0;

/// Capability for capturing a rendered page as PNG bytes.
///
/// The process-backed implementation shells out to a headless browser; tests
/// substitute a fake that returns canned images.
#[async_trait]
pub trait ScreenCapture: Send + Sync {
    async fn capture(&self, url: &str, timeout: Duration) -> Result<Vec<u8>>;
}

const BROWSER_CANDIDATES: &[&str] = &[
    "chrome-headless-shell",
    "chromium-browser",
    "chromium",
    "google-chrome",
    "google-chrome-stable",
];

fn find_browser() -> Option<PathBuf> {
    BROWSER_CANDIDATES
        .iter()
        .find_map(|bin| which::which(bin).ok())
}

/// Screenshot capture via the first available headless browser binary.
pub struct HeadlessBrowser;

#[async_trait]
impl ScreenCapture for HeadlessBrowser {
    async fn capture(&self, url: &str, timeout: Duration) -> Result<Vec<u8>> {
        let binary = find_browser().ok_or_else(|| {
            VigilError::screenshot("no headless browser found (install chromium or chrome)")
        })?;

        let shot = tempfile::Builder::new()
            .prefix("vigil_shot_")
            .suffix(".png")
            .tempfile()?
            .into_temp_path();

        let mut child = tokio::process::Command::new(&binary)
            .args([
                "--headless",
                "--disable-gpu",
                "--no-sandbox",
                "--disable-dev-shm-usage",
            ])
            .arg(format!("--screenshot={}", shot.display()))
            .args(["--window-size=1920,1080", "--hide-scrollbars"])
            .arg(url)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(|e| VigilError::screenshot(format!("failed to start browser: {e}")))?;

        // Hard deadline: kill the renderer and discard partial output.
        let status = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                return Err(VigilError::screenshot(format!("browser wait failed: {e}")));
            }
            Err(_) => {
                let _ = child.kill().await;
                return Err(VigilError::screenshot(format!(
                    "screenshot timed out after {}s",
                    timeout.as_secs()
                )));
            }
        };
        if !status.success() {
            return Err(VigilError::screenshot(format!(
                "browser exited with {status}"
            )));
        }

        let bytes = fs::read(&shot)?;
        if bytes.is_empty() {
            return Err(VigilError::screenshot("screenshot file was not created"));
        }
        Ok(bytes)
    }
}

/// Per-pixel RGBA difference between two PNG files, as a percentage.
/// Differing dimensions count as completely different.
pub fn compare_images(a: &Path, b: &Path) -> Result<f64> {
    let img_a = image::open(a)
        .map_err(|e| VigilError::screenshot(e.to_string()))?
        .to_rgba8();
    let img_b = image::open(b)
        .map_err(|e| VigilError::screenshot(e.to_string()))?
        .to_rgba8();

    if img_a.dimensions() != img_b.dimensions() {
        return Ok(100.0);
    }

    let total = (img_a.width() * img_a.height()) as f64;
    let diff = img_a
        .pixels()
        .zip(img_b.pixels())
        .filter(|(pa, pb)| pa != pb)
        .count() as f64;

    Ok(diff * 100.0 / total)
}

impl Checker {
    pub(crate) async fn check_visual(&self, target: &Target) -> CheckOutcome {
        let start = Instant::now();

        let timeout = match target.timeout {
            0 => VISUAL_DEFAULT_TIMEOUT,
            secs => Duration::from_secs(secs),
        };
        let threshold = if target.threshold > 0.0 {
            target.threshold
        } else {
            DEFAULT_THRESHOLD
        };

        if let Err(e) = fs::create_dir_all(&self.screenshot_dir) {
            return CheckOutcome::failure(
                Status::Error,
                format!("failed to create screenshot directory: {e}"),
                start.elapsed(),
            );
        }

        let current = self.screenshot_dir.join(format!("{}_current.png", target.id));
        let previous = self
            .screenshot_dir
            .join(format!("{}_previous.png", target.id));

        // Rotate current -> previous before each new capture.
        if current.exists() {
            let _ = fs::rename(&current, &previous);
        }

        let bytes = match self.capture.capture(&target.url, timeout).await {
            Ok(b) => b,
            Err(e) => {
                return CheckOutcome::failure(
                    Status::Error,
                    format!("failed to take screenshot: {e}"),
                    start.elapsed(),
                );
            }
        };
        let elapsed = start.elapsed();

        if let Err(e) = fs::write(&current, &bytes) {
            return CheckOutcome::failure(
                Status::Error,
                format!("failed to write screenshot: {e}"),
                elapsed,
            );
        }

        let mut outcome = CheckOutcome::new(Status::Up);
        outcome.response_time = elapsed;
        outcome.content_hash = format!("{:x}", Sha256::digest(&bytes));

        if previous.exists() {
            let percent = match compare_images(&current, &previous) {
                Ok(p) => p,
                Err(e) => {
                    return CheckOutcome::failure(
                        Status::Error,
                        format!("failed to compare images: {e}"),
                        elapsed,
                    );
                }
            };
            outcome.diff_percent = Some(percent);
            // Strictly greater than: a diff exactly at the threshold is unchanged.
            if percent > threshold {
                outcome.status = Status::Changed;
                outcome.error = Some(format!(
                    "visual diff: {percent:.1}% (threshold: {threshold:.1}%)"
                ));
            } else {
                outcome.status = Status::Unchanged;
            }
        } else {
            outcome.status = Status::Up;
            outcome.diff_percent = Some(0.0);
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::RetryPolicy;
    use crate::store::{NewTarget, Store, TargetKind};
    use image::{Rgba, RgbaImage};

    fn write_png(path: &Path, width: u32, height: u32, changed_pixels: u32) {
        let mut img = RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 255]));
        for i in 0..changed_pixels {
            img.put_pixel(i % width, i / width, Rgba([200, 0, 0, 255]));
        }
        img.save(path).unwrap();
    }

    fn png_bytes(width: u32, height: u32, changed_pixels: u32) -> Vec<u8> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img.png");
        write_png(&path, width, height, changed_pixels);
        fs::read(&path).unwrap()
    }

    struct FakeCapture {
        frames: std::sync::Mutex<Vec<Vec<u8>>>,
    }

    impl FakeCapture {
        fn new(frames: Vec<Vec<u8>>) -> Self {
            Self {
                frames: std::sync::Mutex::new(frames),
            }
        }
    }

    #[async_trait]
    impl ScreenCapture for FakeCapture {
        async fn capture(&self, _url: &str, _timeout: Duration) -> Result<Vec<u8>> {
            let mut frames = self.frames.lock().unwrap();
            if frames.is_empty() {
                return Err(VigilError::screenshot("no more frames"));
            }
            Ok(frames.remove(0))
        }
    }

    fn visual_target(store: &Store, threshold: f64) -> crate::store::Target {
        store
            .add_target(NewTarget {
                url: "https://example.com".into(),
                kind: Some(TargetKind::Visual),
                threshold: Some(threshold),
                ..Default::default()
            })
            .unwrap()
    }

    #[test]
    fn identical_images_have_zero_diff() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.png");
        let b = dir.path().join("b.png");
        write_png(&a, 10, 10, 0);
        write_png(&b, 10, 10, 0);
        assert_eq!(compare_images(&a, &b).unwrap(), 0.0);
    }

    #[test]
    fn pixel_differences_are_proportional() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.png");
        let b = dir.path().join("b.png");
        write_png(&a, 10, 10, 0);
        write_png(&b, 10, 10, 7);
        let percent = compare_images(&a, &b).unwrap();
        assert!((percent - 7.0).abs() < f64::EPSILON);
    }

    #[test]
    fn dimension_mismatch_is_total_difference() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.png");
        let b = dir.path().join("b.png");
        write_png(&a, 10, 10, 0);
        write_png(&b, 20, 10, 0);
        assert_eq!(compare_images(&a, &b).unwrap(), 100.0);
    }

    #[tokio::test]
    async fn first_capture_is_up_then_unchanged_then_changed() {
        let store = Store::open_in_memory().unwrap();
        let target = visual_target(&store, 5.0);
        let dir = tempfile::tempdir().unwrap();

        let base = png_bytes(10, 10, 0);
        let shifted = png_bytes(10, 10, 10); // 10% of pixels differ
        let capture = FakeCapture::new(vec![base.clone(), base.clone(), shifted]);

        let checker = Checker::new(dir.path())
            .with_capture(Box::new(capture))
            .with_retry(RetryPolicy {
                delay: Duration::ZERO,
            });

        let first = checker.check(&store, &target).await;
        assert_eq!(first.status, Status::Up);
        assert_eq!(first.diff_percent, Some(0.0));

        let second = checker.check(&store, &target).await;
        assert_eq!(second.status, Status::Unchanged);

        let third = checker.check(&store, &target).await;
        assert_eq!(third.status, Status::Changed);
        assert!(third.error.unwrap().contains("visual diff"));
    }

    #[tokio::test]
    async fn diff_equal_to_threshold_is_unchanged() {
        let store = Store::open_in_memory().unwrap();
        // 100-pixel image, 5 changed pixels = exactly the 5.0 threshold
        let target = visual_target(&store, 5.0);
        let dir = tempfile::tempdir().unwrap();

        let capture = FakeCapture::new(vec![png_bytes(10, 10, 0), png_bytes(10, 10, 5)]);
        let checker = Checker::new(dir.path()).with_capture(Box::new(capture));

        let _ = checker.check(&store, &target).await;
        let second = checker.check(&store, &target).await;
        assert_eq!(second.status, Status::Unchanged);
        assert_eq!(second.diff_percent, Some(5.0));
    }

    #[tokio::test]
    async fn capture_failure_is_error_status() {
        let store = Store::open_in_memory().unwrap();
        let target = visual_target(&store, 5.0);
        let dir = tempfile::tempdir().unwrap();

        let capture = FakeCapture::new(vec![]);
        let checker = Checker::new(dir.path())
            .with_capture(Box::new(capture))
            .with_retry(RetryPolicy {
                delay: Duration::ZERO,
            });

        let outcome = checker.check(&store, &target).await;
        assert_eq!(outcome.status, Status::Error);
        assert!(outcome.error.unwrap().contains("failed to take screenshot"));
    }
}
