use base64::Engine as _;
use futures::future::{BoxFuture, FutureExt};
use std::path::Path;
use std::process::Command;
use std::time::Duration;

use crate::modules::error::{LockInError, Result};
use crate::modules::utils::now_millis;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub id: String,
    pub name: String,
}

/// A captured screen image, PNG encoded.
#[derive(Debug, Clone)]
pub struct Frame {
    pub png: Vec<u8>,
    pub captured_at: i64,
}

impl Frame {
    pub fn new(png: Vec<u8>) -> Self {
        Self {
            png,
            captured_at: now_millis(),
        }
    }

    pub fn data_url(&self) -> String {
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&self.png)
        )
    }
}

/// Screen capture provided by the platform.
pub trait CaptureSource: Send + Sync {
    /// Screens that can be captured. Empty means capture is unavailable.
    fn list_sources(&self) -> BoxFuture<'_, Result<Vec<Source>>>;

    fn grab_frame<'a>(&'a self, source: &'a Source) -> BoxFuture<'a, Result<Frame>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

/// Grabs the first available screen, retrying transient failures up to
/// `policy.attempts` times with a fixed pause in between.
pub async fn capture_frame(source: &dyn CaptureSource, policy: RetryPolicy) -> Result<Frame> {
    let attempts = policy.attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match capture_once(source).await {
            Ok(frame) => return Ok(frame),
            Err(e) if attempt < attempts => {
                log::warn!("Capture attempt {}/{} failed: {}", attempt, attempts, e);
                tokio::time::sleep(policy.backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn capture_once(source: &dyn CaptureSource) -> Result<Frame> {
    let sources = source.list_sources().await?;
    let main_screen = sources
        .first()
        .ok_or_else(|| LockInError::Capture("No screen sources found".to_string()))?;
    source.grab_frame(main_screen).await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaptureTool {
    /// macOS `screencapture`
    ScreenCapture,
    /// wlroots compositors
    Grim,
    GnomeScreenshot,
    /// ImageMagick on X11
    Import,
}

impl CaptureTool {
    fn program(self) -> &'static str {
        match self {
            CaptureTool::ScreenCapture => "screencapture",
            CaptureTool::Grim => "grim",
            CaptureTool::GnomeScreenshot => "gnome-screenshot",
            CaptureTool::Import => "import",
        }
    }

    fn command(self, out_path: &Path) -> Command {
        let mut cmd = Command::new(self.program());
        match self {
            CaptureTool::ScreenCapture => {
                cmd.arg("-x").arg("-t").arg("png").arg(out_path);
            }
            CaptureTool::Grim => {
                cmd.arg(out_path);
            }
            CaptureTool::GnomeScreenshot => {
                cmd.arg("-f").arg(out_path);
            }
            CaptureTool::Import => {
                cmd.arg("-window").arg("root").arg(out_path);
            }
        }
        cmd
    }

    fn candidates() -> &'static [CaptureTool] {
        if cfg!(target_os = "macos") {
            &[CaptureTool::ScreenCapture]
        } else if cfg!(target_os = "linux") {
            &[CaptureTool::Grim, CaptureTool::GnomeScreenshot, CaptureTool::Import]
        } else {
            &[]
        }
    }
}

/// Captures the primary screen by shelling out to the platform's
/// screenshot utility.
#[derive(Debug, Clone)]
pub struct ScreenCommandSource {
    tool: Option<CaptureTool>,
}

impl ScreenCommandSource {
    pub fn detect() -> Self {
        let tool = CaptureTool::candidates()
            .iter()
            .copied()
            .find(|tool| command_exists(tool.program()));
        match tool {
            Some(tool) => log::info!("Screen capture via {}", tool.program()),
            None => log::warn!("No screen capture tool found; capture cycles will be skipped"),
        }
        Self { tool }
    }

    pub fn is_available(&self) -> bool {
        self.tool.is_some()
    }
}

impl CaptureSource for ScreenCommandSource {
    fn list_sources(&self) -> BoxFuture<'_, Result<Vec<Source>>> {
        let sources = match self.tool {
            Some(_) => vec![Source {
                id: "screen:0".to_string(),
                name: "Entire Screen".to_string(),
            }],
            None => Vec::new(),
        };
        futures::future::ready(Ok(sources)).boxed()
    }

    fn grab_frame<'a>(&'a self, source: &'a Source) -> BoxFuture<'a, Result<Frame>> {
        let tool = self.tool;
        let source_id = source.id.clone();
        async move {
            let tool = tool.ok_or_else(|| LockInError::Capture("screen capture unavailable".to_string()))?;
            tokio::task::spawn_blocking(move || run_capture(tool, &source_id))
                .await
                .map_err(|e| LockInError::Capture(format!("capture task failed: {}", e)))?
        }
        .boxed()
    }
}

fn run_capture(tool: CaptureTool, source_id: &str) -> Result<Frame> {
    capture_into(&std::env::temp_dir(), tool.program(), source_id, |path| tool.command(path))
}

/// Runs `command` against a fresh file in `dir` and reads back the PNG it
/// wrote. The file is gone once this returns, whatever the outcome.
fn capture_into(
    dir: &Path,
    program: &str,
    source_id: &str,
    command: impl FnOnce(&Path) -> Command,
) -> Result<Frame> {
    let out = tempfile::Builder::new()
        .prefix("lockin-capture-")
        .suffix(".png")
        .tempfile_in(dir)
        .map_err(|e| LockInError::Capture(format!("failed to create capture file: {}", e)))?;

    let status = command(out.path())
        .status()
        .map_err(|e| LockInError::Capture(format!("failed to run {}: {}", program, e)))?;

    if !status.success() {
        return Err(LockInError::Capture(format!(
            "{} exited with {} for {}",
            program, status, source_id
        )));
    }

    let png = std::fs::read(out.path())
        .map_err(|e| LockInError::Capture(format!("failed to read capture: {}", e)))?;
    if png.is_empty() {
        return Err(LockInError::Capture("capture produced an empty image".to_string()));
    }
    Ok(Frame::new(png))
}

fn command_exists(name: &str) -> bool {
    Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {} >/dev/null 2>&1", name))
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
