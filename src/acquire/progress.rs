//! Acquisition progress events and percent weighting

use std::sync::atomic::{AtomicBool, Ordering};

use log::warn;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

use crate::download::{DownloadProgress, INDETERMINATE, format_progress_details, map_percent};
use crate::tools::Tool;

pub const STATUS_DOWNLOADING_YTDLP: &str = "statusDownloadingYtDlp";
pub const STATUS_DOWNLOADING_FFMPEG: &str = "statusDownloadingFfmpeg";
pub const STATUS_EXTRACTING: &str = "statusExtracting";
pub const STATUS_CLEANING_UP: &str = "statusCleaningUp";
pub const STATUS_YTDLP_COMPLETE: &str = "statusYtDlpDownloadComplete";
pub const STATUS_FFMPEG_COMPLETE: &str = "statusFfmpegDownloadComplete";

/// What an acquisition installs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcquireTarget {
    #[serde(rename = "ytdlp", alias = "yt-dlp")]
    YtDlp,
    Ffmpeg,
    All,
}

impl From<Tool> for AcquireTarget {
    fn from(tool: Tool) -> Self {
        match tool {
            Tool::YtDlp => AcquireTarget::YtDlp,
            Tool::Ffmpeg => AcquireTarget::Ffmpeg,
        }
    }
}

impl std::fmt::Display for AcquireTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AcquireTarget::YtDlp => f.write_str("yt-dlp"),
            AcquireTarget::Ffmpeg => f.write_str("ffmpeg"),
            AcquireTarget::All => f.write_str("all"),
        }
    }
}

impl std::str::FromStr for AcquireTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(AcquireTarget::All),
            other => other.parse::<Tool>().map(AcquireTarget::from),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AcquisitionPhase {
    Downloading,
    Extracting,
    CleaningUp,
    Complete,
}

/// One progress update of the running acquisition
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcquisitionProgress {
    pub target: AcquireTarget,
    pub phase: AcquisitionPhase,
    /// Overall percent (0-100), or -1 while the download size is unknown
    pub percent: i32,
    pub status_key: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloaded: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_per_second: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "progress", rename_all = "camelCase")]
pub enum AcquisitionEvent {
    Progress(AcquisitionProgress),
    /// Terminal event of every acquisition, whatever the outcome
    Cleared,
}

/// Best-effort event channel; a dropped receiver never fails the acquisition
#[derive(Debug)]
pub(crate) struct EventSink {
    tx: Option<UnboundedSender<AcquisitionEvent>>,
    disabled: AtomicBool,
}

impl EventSink {
    pub(crate) fn new(tx: Option<UnboundedSender<AcquisitionEvent>>) -> Self {
        Self {
            tx,
            disabled: AtomicBool::new(false),
        }
    }

    pub(crate) fn send(&self, event: AcquisitionEvent) {
        let Some(tx) = &self.tx else { return };
        if self.disabled.load(Ordering::Relaxed) {
            return;
        }
        if tx.send(event).is_err() {
            warn!("Acquisition event receiver dropped, continuing without updates");
            self.disabled.store(true, Ordering::Relaxed);
        }
    }
}

/// Reports one tool's progress inside the `[lo, hi]` slice of the overall operation
#[derive(Debug, Clone, Copy)]
pub(crate) struct PhaseReporter<'a> {
    sink: &'a EventSink,
    target: AcquireTarget,
    lo: i32,
    hi: i32,
}

impl<'a> PhaseReporter<'a> {
    pub(crate) fn new(sink: &'a EventSink, target: AcquireTarget, lo: i32, hi: i32) -> Self {
        Self {
            sink,
            target,
            lo,
            hi,
        }
    }

    /// Download sample; `inner_percent` is the tool-local percent (or -1)
    pub(crate) fn download(
        &self,
        status_key: &'static str,
        inner_percent: i32,
        progress: &DownloadProgress,
    ) {
        self.sink.send(AcquisitionEvent::Progress(AcquisitionProgress {
            target: self.target,
            phase: AcquisitionPhase::Downloading,
            percent: self.overall(inner_percent),
            status_key,
            downloaded: Some(progress.downloaded),
            total: (progress.total > 0).then_some(progress.total),
            bytes_per_second: Some(progress.bytes_per_second),
            details: Some(format_progress_details(progress)),
        }));
    }

    /// Phase transition at a fixed tool-local percent
    pub(crate) fn phase(
        &self,
        phase: AcquisitionPhase,
        status_key: &'static str,
        inner_percent: i32,
    ) {
        self.sink.send(AcquisitionEvent::Progress(AcquisitionProgress {
            target: self.target,
            phase,
            percent: self.overall(inner_percent),
            status_key,
            downloaded: None,
            total: None,
            bytes_per_second: None,
            details: None,
        }));
    }

    fn overall(&self, inner_percent: i32) -> i32 {
        if inner_percent == INDETERMINATE {
            return INDETERMINATE;
        }
        map_percent(inner_percent, self.lo, self.hi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn drain(rx: &mut mpsc::UnboundedReceiver<AcquisitionEvent>) -> Vec<i32> {
        let mut out = Vec::new();
        while let Ok(AcquisitionEvent::Progress(p)) = rx.try_recv() {
            out.push(p.percent);
        }
        out
    }

    #[test]
    fn install_all_weights_ytdlp_then_ffmpeg() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(Some(tx));
        let ytdlp = PhaseReporter::new(&sink, AcquireTarget::All, 0, 20);
        let ffmpeg = PhaseReporter::new(&sink, AcquireTarget::All, 20, 100);

        ytdlp.phase(AcquisitionPhase::Downloading, STATUS_DOWNLOADING_YTDLP, 50);
        ytdlp.phase(AcquisitionPhase::Complete, STATUS_YTDLP_COMPLETE, 100);
        ffmpeg.phase(AcquisitionPhase::Extracting, STATUS_EXTRACTING, 85);
        ffmpeg.phase(AcquisitionPhase::Complete, STATUS_FFMPEG_COMPLETE, 100);

        assert_eq!(drain(&mut rx), vec![10, 20, 88, 100]);
    }

    #[test]
    fn indeterminate_download_stays_indeterminate() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(Some(tx));
        let reporter = PhaseReporter::new(&sink, AcquireTarget::All, 20, 100);
        let sample = DownloadProgress {
            percent: INDETERMINATE,
            downloaded: 4096,
            total: 0,
            bytes_per_second: 1024.0,
        };
        reporter.download(STATUS_DOWNLOADING_FFMPEG, INDETERMINATE, &sample);

        match rx.try_recv().unwrap() {
            AcquisitionEvent::Progress(p) => {
                assert_eq!(p.percent, INDETERMINATE);
                assert_eq!(p.downloaded, Some(4096));
                assert_eq!(p.total, None);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn closed_receiver_is_tolerated() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let sink = EventSink::new(Some(tx));
        sink.send(AcquisitionEvent::Cleared);
        sink.send(AcquisitionEvent::Cleared);
        assert!(sink.disabled.load(Ordering::Relaxed));
    }

    #[test]
    fn targets_parse_from_cli_names() {
        assert_eq!("all".parse::<AcquireTarget>().unwrap(), AcquireTarget::All);
        assert_eq!("yt-dlp".parse::<AcquireTarget>().unwrap(), AcquireTarget::YtDlp);
        assert_eq!("FFmpeg".parse::<AcquireTarget>().unwrap(), AcquireTarget::Ffmpeg);
        assert!("ffprobe".parse::<AcquireTarget>().is_err());
    }
}
