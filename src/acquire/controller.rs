//! Installs or upgrades the managed tools with weighted progress and cancellation

use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::try_join_all;
use log::{error, info, warn};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use super::progress::{
    AcquireTarget, AcquisitionEvent, AcquisitionPhase, EventSink, PhaseReporter,
    STATUS_CLEANING_UP, STATUS_DOWNLOADING_FFMPEG, STATUS_DOWNLOADING_YTDLP, STATUS_EXTRACTING,
    STATUS_FFMPEG_COMPLETE, STATUS_YTDLP_COMPLETE,
};
use crate::config::SourceOverrides;
use crate::download::{
    ArchiveInstaller, CombinedProgress, DownloadProgress, InstallStrategy, StreamingDownloader,
    map_percent, remove_partial,
};
use crate::tools::{BinaryLocator, Platform, Tool, ToolSpec};
use crate::{MediaError, Result};

/// ffmpeg tool-local percent milestones
const FFMPEG_DOWNLOAD_END: i32 = 80;
const FFMPEG_EXTRACTING: i32 = 85;
const FFMPEG_CLEANING_UP: i32 = 95;

/// Share of an install-all operation taken by yt-dlp
const ALL_YTDLP_SHARE: i32 = 20;

/// Final state of an acquisition. Errors never cross this boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "camelCase")]
pub enum AcquireOutcome {
    Installed,
    Cancelled,
    Failed(String),
}

/// The acquisition currently allowed to run
#[derive(Debug)]
struct ActiveAcquisition {
    id: u64,
    cancel: CancellationToken,
}

/// Single-flight installer for the managed tools.
///
/// Starting an acquisition while another one is tracked cancels the older one
/// first, so at most one ever writes to the managed directory.
#[derive(Debug)]
pub struct AcquisitionController {
    locator: BinaryLocator,
    downloader: StreamingDownloader,
    installer: ArchiveInstaller,
    platform: Platform,
    sources: SourceOverrides,
    active: Mutex<Option<ActiveAcquisition>>,
    next_id: AtomicU64,
}

impl AcquisitionController {
    pub fn new(
        locator: BinaryLocator,
        downloader: StreamingDownloader,
        platform: Platform,
        sources: SourceOverrides,
    ) -> Self {
        let installer = ArchiveInstaller::new(locator.managed_dir());
        Self {
            locator,
            downloader,
            installer,
            platform,
            sources,
            active: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Whether an acquisition is currently tracked
    pub fn is_active(&self) -> bool {
        self.active.lock().map(|a| a.is_some()).unwrap_or(false)
    }

    /// Cancel the tracked acquisition. Returns whether there was one.
    pub fn cancel(&self) -> bool {
        let taken = match self.active.lock() {
            Ok(mut active) => active.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match taken {
            Some(active) => {
                info!("Cancelling acquisition #{}", active.id);
                active.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Install `target`, streaming progress to `events`. `Cleared` is always the last event.
    pub async fn acquire(
        &self,
        target: AcquireTarget,
        events: Option<UnboundedSender<AcquisitionEvent>>,
    ) -> AcquireOutcome {
        let (id, cancel) = self.begin();
        let sink = EventSink::new(events);
        info!("Acquisition #{id} started for {target}");

        let result = self.run(target, &cancel, &sink).await;

        self.finish(id);
        sink.send(AcquisitionEvent::Cleared);

        match result {
            Ok(()) => {
                info!("Acquisition #{id} installed {target}");
                AcquireOutcome::Installed
            }
            Err(e) if e.is_cancelled() => {
                info!("Acquisition #{id} cancelled");
                AcquireOutcome::Cancelled
            }
            Err(e) => {
                error!("Acquisition #{id} of {target} failed: {e}");
                AcquireOutcome::Failed(e.to_string())
            }
        }
    }

    /// Track a new acquisition, cancelling any previous one
    fn begin(&self) -> (u64, CancellationToken) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let mut active = match self.active.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(previous) = active.replace(ActiveAcquisition {
            id,
            cancel: cancel.clone(),
        }) {
            info!(
                "Acquisition #{} supersedes #{}, cancelling the older one",
                id, previous.id
            );
            previous.cancel.cancel();
        }
        (id, cancel)
    }

    /// Stop tracking `id` unless a newer acquisition already replaced it
    fn finish(&self, id: u64) {
        let mut active = match self.active.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if active.as_ref().is_some_and(|a| a.id == id) {
            *active = None;
        }
    }

    async fn run(
        &self,
        target: AcquireTarget,
        cancel: &CancellationToken,
        sink: &EventSink,
    ) -> Result<()> {
        self.locator.ensure_managed_dir()?;

        match target {
            AcquireTarget::YtDlp => {
                let reporter = PhaseReporter::new(sink, target, 0, 100);
                self.acquire_ytdlp(&reporter, cancel).await
            }
            AcquireTarget::Ffmpeg => {
                let reporter = PhaseReporter::new(sink, target, 0, 100);
                self.acquire_ffmpeg(&reporter, cancel).await
            }
            AcquireTarget::All => {
                let ytdlp = PhaseReporter::new(sink, target, 0, ALL_YTDLP_SHARE);
                self.acquire_ytdlp(&ytdlp, cancel).await?;
                let ffmpeg = PhaseReporter::new(sink, target, ALL_YTDLP_SHARE, 100);
                self.acquire_ffmpeg(&ffmpeg, cancel).await
            }
        }
    }

    fn spec(&self, tool: Tool) -> ToolSpec {
        self.sources.apply(ToolSpec::for_platform(tool, self.platform))
    }

    async fn acquire_ytdlp(
        &self,
        reporter: &PhaseReporter<'_>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let spec = self.spec(Tool::YtDlp);
        let url = spec
            .urls
            .first()
            .ok_or_else(|| MediaError::Extract("no download source for yt-dlp".to_string()))?;
        let dest = self.locator.managed_path(Tool::YtDlp.primary_executable());
        let staging = staging_path(&dest);

        reporter.phase(AcquisitionPhase::Downloading, STATUS_DOWNLOADING_YTDLP, 0);
        self.downloader
            .download(url, &staging, cancel, |p| {
                reporter.download(STATUS_DOWNLOADING_YTDLP, p.percent, &p)
            })
            .await?;

        // A cancel that raced the last chunk still wins
        if cancel.is_cancelled() {
            remove_partial(&staging).await;
            return Err(MediaError::Cancelled);
        }
        if let Err(e) = tokio::fs::rename(&staging, &dest).await {
            remove_partial(&staging).await;
            return Err(e.into());
        }

        reporter.phase(AcquisitionPhase::Complete, STATUS_YTDLP_COMPLETE, 100);
        Ok(())
    }

    async fn acquire_ffmpeg(
        &self,
        reporter: &PhaseReporter<'_>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let spec = self.spec(Tool::Ffmpeg);
        let strategy = InstallStrategy::for_layout(spec.layout).ok_or_else(|| {
            MediaError::Extract(format!("{:?} is not an archive layout", spec.layout))
        })?;

        // Archives live next to the install target and vanish with this guard
        let scratch = tempfile::Builder::new()
            .prefix(".ffmpeg-download-")
            .tempdir_in(self.locator.managed_dir())?;
        let archives: Vec<PathBuf> = spec
            .urls
            .iter()
            .enumerate()
            .map(|(i, url)| scratch.path().join(archive_file_name(url, i)))
            .collect();

        reporter.phase(AcquisitionPhase::Downloading, STATUS_DOWNLOADING_FFMPEG, 0);
        if archives.len() == 1 {
            self.downloader
                .download(&spec.urls[0], &archives[0], cancel, |p| {
                    let inner = map_percent(p.percent, 0, FFMPEG_DOWNLOAD_END);
                    reporter.download(STATUS_DOWNLOADING_FFMPEG, inner, &p)
                })
                .await?;
        } else {
            self.download_concurrently(&spec.urls, &archives, reporter, cancel)
                .await?;
        }

        if cancel.is_cancelled() {
            return Err(MediaError::Cancelled);
        }

        reporter.phase(
            AcquisitionPhase::Extracting,
            STATUS_EXTRACTING,
            FFMPEG_EXTRACTING,
        );
        self.installer
            .install(strategy, &archives, &spec.executable_names())
            .await?;

        reporter.phase(
            AcquisitionPhase::CleaningUp,
            STATUS_CLEANING_UP,
            FFMPEG_CLEANING_UP,
        );
        let scratch_path = scratch.path().to_path_buf();
        if let Err(e) = scratch.close() {
            warn!(
                "Failed to remove download scratch {}: {}",
                scratch_path.display(),
                e
            );
        }

        reporter.phase(AcquisitionPhase::Complete, STATUS_FFMPEG_COMPLETE, 100);
        Ok(())
    }

    /// Download every archive at once, reporting the byte-summed progress
    async fn download_concurrently(
        &self,
        urls: &[String],
        archives: &[PathBuf],
        reporter: &PhaseReporter<'_>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let combined = Mutex::new(CombinedProgress::new(urls.len()));
        let streams = cancel.child_token();

        // `None` marks stream `index` as finished
        let report = |index: usize, sample: Option<DownloadProgress>| {
            let merged = {
                let mut combined = match combined.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                match sample {
                    Some(sample) => combined.update(index, sample),
                    None => combined.finish(index),
                }
            };
            let inner = map_percent(merged.percent, 0, FFMPEG_DOWNLOAD_END);
            reporter.download(STATUS_DOWNLOADING_FFMPEG, inner, &merged);
        };

        let downloads = urls.iter().zip(archives).enumerate().map(|(index, (url, dest))| {
            let streams = &streams;
            let report = &report;
            async move {
                self.downloader
                    .download(url, dest, streams, |p| report(index, Some(p)))
                    .await?;
                report(index, None);
                Ok::<_, MediaError>(())
            }
        });

        let result = try_join_all(downloads).await;
        if result.is_err() {
            // Stop sibling streams that are still running
            streams.cancel();
        }
        result.map(|_| ())
    }
}

/// Temporary sibling that a download lands in before it replaces `dest`
fn staging_path(dest: &std::path::Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest.with_file_name(format!(".{name}.download"))
}

/// Last path segment of `url`, or a positional name when it has none
fn archive_file_name(url: &str, index: usize) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|name| !name.is_empty())
        .map(|name| format!("{index}-{name}"))
        .unwrap_or_else(|| format!("archive-{index}"))
}
