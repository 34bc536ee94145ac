//! Runs one yt-dlp job at a time and classifies how it ended

use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use super::args::build_args;
use super::encoders::{HwEncoder, detect_hw_encoders, resolve_hw_encoder};
use super::parser::{ProgressParser, ProgressState};
use super::request::{HwAccel, JobRequest, MediaMode};
use crate::process;
use crate::tools::{BinaryLocator, Tool};
use crate::MediaError;

/// Output lines ending in one of these are taken as the produced file
const MEDIA_EXTENSIONS: &[&str] = &[
    ".mp4", ".mkv", ".webm", ".mp3", ".m4a", ".flac", ".wav", ".aac",
];

/// Raw lines kept for the failure message
const LOG_TAIL_LINES: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum JobEvent {
    /// One raw stdout or stderr line
    Log(String),
    Progress(ProgressState),
    /// Always the last event of a job
    Complete(JobResult),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub success: bool,
    pub cancelled: bool,
    pub message: String,
    pub title: Option<String>,
    pub output_path: Option<PathBuf>,
    pub file_size_bytes: Option<u64>,
    pub exit_code: Option<i32>,
}

impl JobResult {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    fn cancelled() -> Self {
        Self {
            cancelled: true,
            message: "Download cancelled".to_string(),
            ..Self::default()
        }
    }
}

/// Title and output file heuristics over stdout
#[derive(Debug, Default)]
pub(crate) struct OutputTracker {
    title: Option<String>,
    output_path: Option<String>,
}

impl OutputTracker {
    pub(crate) fn observe(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        // First plain line is the `--print title` output; never overwritten
        if self.title.is_none() && !line.contains('[') && !line.contains('%') {
            self.title = Some(line.to_string());
        }
        // Last match wins so `after_move:filepath` supersedes earlier guesses
        if MEDIA_EXTENSIONS.iter().any(|ext| line.ends_with(ext)) {
            self.output_path = Some(line.to_string());
        }
    }
}

#[derive(Debug)]
struct ActiveJob {
    id: u64,
    cancel: CancellationToken,
}

/// Owns the single running yt-dlp process
#[derive(Debug)]
pub struct JobRunner {
    locator: BinaryLocator,
    active: Mutex<Option<ActiveJob>>,
    next_id: AtomicU64,
}

/// Clears the active slot when a run ends, however it ends
struct ActiveGuard<'a> {
    runner: &'a JobRunner,
    id: u64,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        let mut active = match self.runner.active.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if active.as_ref().is_some_and(|a| a.id == self.id) {
            *active = None;
        }
    }
}

/// Forwards events while the receiver is alive; warns once when it is gone
struct EventSink {
    tx: Option<UnboundedSender<JobEvent>>,
    disabled: AtomicBool,
}

impl EventSink {
    fn send(&self, event: JobEvent) {
        let Some(tx) = &self.tx else { return };
        if self.disabled.load(Ordering::Relaxed) {
            return;
        }
        if tx.send(event).is_err() {
            warn!("Job event receiver dropped, continuing without updates");
            self.disabled.store(true, Ordering::Relaxed);
        }
    }
}

impl JobRunner {
    pub fn new(locator: BinaryLocator) -> Self {
        Self {
            locator,
            active: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.active.lock().map(|a| a.is_some()).unwrap_or(false)
    }

    /// Kill the running job. Returns whether one was running.
    pub fn cancel(&self) -> bool {
        let active = match self.active.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match active.as_ref() {
            Some(job) => {
                info!("Cancelling job #{}", job.id);
                job.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Run `request` to completion. `events` receives log lines, progress
    /// and finally `JobEvent::Complete` with the same result that is returned.
    pub async fn run(
        &self,
        request: &JobRequest,
        events: Option<UnboundedSender<JobEvent>>,
    ) -> JobResult {
        let sink = EventSink {
            tx: events,
            disabled: AtomicBool::new(false),
        };
        let result = match self.try_begin() {
            Some((guard, cancel)) => {
                let result = self.execute(request, &cancel, &sink).await;
                drop(guard);
                result
            }
            None => {
                warn!("Rejecting job for {}: another job is running", request.url);
                JobResult::failed(MediaError::Busy.to_string())
            }
        };
        sink.send(JobEvent::Complete(result.clone()));
        result
    }

    fn try_begin(&self) -> Option<(ActiveGuard<'_>, CancellationToken)> {
        let mut active = match self.active.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if active.is_some() {
            return None;
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        *active = Some(ActiveJob {
            id,
            cancel: cancel.clone(),
        });
        Some((ActiveGuard { runner: self, id }, cancel))
    }

    async fn execute(
        &self,
        request: &JobRequest,
        cancel: &CancellationToken,
        sink: &EventSink,
    ) -> JobResult {
        let Some(ytdlp) = self.locator.resolve(Tool::YtDlp).await else {
            let err = MediaError::NotFound {
                tool: Tool::YtDlp.to_string(),
            };
            error!("{err}");
            return JobResult::failed(err.to_string());
        };
        if let Err(e) = ensure_executable(&ytdlp.path).await {
            return JobResult::failed(format!(
                "yt-dlp at {} is not executable: {e}",
                ytdlp.path.display()
            ));
        }

        let ffmpeg = self.locator.resolve(Tool::Ffmpeg).await.map(|b| b.path);
        let hw_encoder = self.hw_encoder_for(request, ffmpeg.as_deref()).await;
        let args = build_args(request, ffmpeg.as_deref(), hw_encoder);

        info!("Starting yt-dlp for {}", request.url);
        debug!("{} {}", ytdlp.path.display(), args.join(" "));
        sink.send(JobEvent::Log(format!("yt-dlp: {}", ytdlp.path.display())));

        let mut command = process::command(&ytdlp.path);
        command
            .args(&args)
            .env("PYTHONIOENCODING", "utf-8")
            .env("PYTHONUTF8", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(path) = augmented_path() {
            command.env("PATH", path);
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(source) => {
                let err = MediaError::ProcessSpawn {
                    tool: Tool::YtDlp.to_string(),
                    path: ytdlp.path.clone(),
                    source,
                };
                error!("{err}");
                return JobResult::failed(err.to_string());
            }
        };

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            if let Err(e) = child.start_kill() {
                warn!("Failed to kill yt-dlp after losing its output pipes: {e}");
            }
            return JobResult::failed("failed to capture yt-dlp output");
        };
        // Split on raw bytes: yt-dlp may print file names that are not valid UTF-8
        let mut stdout = BufReader::new(stdout).split(b'\n');
        let mut stderr = BufReader::new(stderr).split(b'\n');
        let (mut stdout_open, mut stderr_open) = (true, true);

        let mut tracker = OutputTracker::default();
        let mut parser = ProgressParser::new();
        let mut tail: VecDeque<String> = VecDeque::with_capacity(LOG_TAIL_LINES);

        let mut handle = |raw: Vec<u8>, from_stdout: bool| {
            let raw = String::from_utf8_lossy(&raw);
            // Progress redraws arrive as `\r`-separated segments of one line
            for line in raw.split('\r').filter(|l| !l.trim().is_empty()) {
                if from_stdout {
                    tracker.observe(line);
                }
                if tail.len() == LOG_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line.to_string());
                sink.send(JobEvent::Log(line.to_string()));
                if let Some(state) = parser.feed(line) {
                    sink.send(JobEvent::Progress(state.clone()));
                }
            }
        };

        while stdout_open || stderr_open {
            tokio::select! {
                _ = cancel.cancelled() => {
                    if let Err(e) = child.start_kill() {
                        warn!("Failed to kill yt-dlp: {e}");
                    }
                    break;
                }
                line = stdout.next_segment(), if stdout_open => match line {
                    Ok(Some(line)) => handle(line, true),
                    Ok(None) => stdout_open = false,
                    Err(e) => {
                        warn!("Failed to read yt-dlp stdout: {e}");
                        stdout_open = false;
                    }
                },
                line = stderr.next_segment(), if stderr_open => match line {
                    Ok(Some(line)) => handle(line, false),
                    Ok(None) => stderr_open = false,
                    Err(e) => {
                        warn!("Failed to read yt-dlp stderr: {e}");
                        stderr_open = false;
                    }
                },
            }
        }
        drop(handle);

        // The pipes can close long before the process exits, so a cancel must
        // still be able to kill it here
        let status = if cancel.is_cancelled() {
            child.wait().await
        } else {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    if let Err(e) = child.start_kill() {
                        warn!("Failed to kill yt-dlp: {e}");
                    }
                    child.wait().await
                }
                status = child.wait() => status,
            }
        };
        let title = tracker.title;
        let output_path = tracker.output_path.map(PathBuf::from);

        // A requested cancel wins over whatever exit code the kill produced
        if cancel.is_cancelled() {
            info!("Job for {} cancelled", request.url);
            return JobResult {
                title,
                output_path,
                exit_code: status.ok().and_then(|s| s.code()),
                ..JobResult::cancelled()
            };
        }

        match status {
            Ok(status) if status.success() => {
                let file_size_bytes = match &output_path {
                    Some(path) => match tokio::fs::metadata(path).await {
                        Ok(meta) => meta.len(),
                        Err(e) => {
                            warn!("Could not stat output file {}: {}", path.display(), e);
                            0
                        }
                    },
                    None => 0,
                };
                info!("Job for {} completed ({} bytes)", request.url, file_size_bytes);
                JobResult {
                    success: true,
                    cancelled: false,
                    message: "Download complete".to_string(),
                    title,
                    output_path,
                    file_size_bytes: Some(file_size_bytes),
                    exit_code: status.code(),
                }
            }
            Ok(status) => {
                let err = MediaError::NonZeroExit {
                    code: status.code(),
                };
                error!("Job for {} failed: {err}", request.url);
                let mut message = err.to_string();
                for line in &tail {
                    message.push('\n');
                    message.push_str(line);
                }
                JobResult {
                    message,
                    title,
                    output_path,
                    exit_code: status.code(),
                    ..JobResult::default()
                }
            }
            Err(e) => {
                error!("Failed to wait for yt-dlp: {e}");
                JobResult::failed(MediaError::Io(e).to_string())
            }
        }
    }

    async fn hw_encoder_for(&self, request: &JobRequest, ffmpeg: Option<&Path>) -> Option<HwEncoder> {
        if request.mode != MediaMode::Video {
            return None;
        }
        let conversion = request.active_conversion()?;
        let available = match (conversion.hw_encoder, ffmpeg) {
            (HwAccel::Auto, Some(ffmpeg)) => detect_hw_encoders(ffmpeg).await,
            _ => Vec::new(),
        };
        resolve_hw_encoder(conversion.hw_encoder, &available)
    }
}

/// `PATH` with this executable's directory first, so yt-dlp finds a bundled runtime
fn augmented_path() -> Option<OsString> {
    let exe_dir = std::env::current_exe().ok()?.parent()?.to_path_buf();
    let existing = std::env::var_os("PATH").unwrap_or_default();
    let dirs = std::iter::once(exe_dir).chain(std::env::split_paths(&existing));
    std::env::join_paths(dirs).ok()
}

#[cfg(unix)]
async fn ensure_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mode = tokio::fs::metadata(path).await?.permissions().mode();
    if mode & 0o111 == 0o111 {
        return Ok(());
    }
    info!("Fixing permissions of {}", path.display());
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).await
}

#[cfg(not(unix))]
async fn ensure_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
