//! Command surface for UI collaborators
//!
//! One `Engine` owns the locator, the acquisition controller and the job
//! runner. Each command maps to one collaborator request; progress flows back
//! through the event channels passed in.

use log::{debug, info, warn};
use tokio::sync::mpsc::UnboundedSender;

use crate::acquire::{AcquireOutcome, AcquireTarget, AcquisitionController, AcquisitionEvent};
use crate::config::Config;
use crate::download::StreamingDownloader;
use crate::job::{
    HwEncoder, JobEvent, JobRequest, JobResult, JobRunner, detect_hw_encoders, fetch_video_info,
};
use crate::tools::{
    BinaryLocator, BinaryStatus, BinaryVersions, LatestVersions, Platform, Tool, binary_versions,
    latest_versions,
};
use crate::{MediaError, Result};

pub struct Engine {
    config: Config,
    locator: BinaryLocator,
    downloader: StreamingDownloader,
    /// Unsupported hosts can still run jobs with tools found elsewhere
    acquisition: std::result::Result<AcquisitionController, MediaError>,
    jobs: JobRunner,
}

impl Engine {
    pub fn new(config: Config) -> Result<Self> {
        Self::build(config, Platform::detect())
    }

    /// Engine for an explicit platform, e.g. to stage another OS's layout
    pub fn with_platform(config: Config, platform: Platform) -> Result<Self> {
        Self::build(config, Ok(platform))
    }

    fn build(config: Config, platform: Result<Platform>) -> Result<Self> {
        let locator = BinaryLocator::new(config.managed_bin_dir(), config.fallback_paths.clone());
        let downloader = StreamingDownloader::new(&config.network)?;
        info!("Managed binary directory: {}", locator.managed_dir().display());

        let acquisition = platform.map(|platform| {
            AcquisitionController::new(
                locator.clone(),
                downloader.clone(),
                platform,
                config.sources.clone(),
            )
        });
        if let Err(e) = &acquisition {
            warn!("Tool acquisition disabled: {e}");
        }

        Ok(Self {
            jobs: JobRunner::new(locator.clone()),
            config,
            locator,
            downloader,
            acquisition,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn locator(&self) -> &BinaryLocator {
        &self.locator
    }

    pub async fn start_job(
        &self,
        request: &JobRequest,
        events: Option<UnboundedSender<JobEvent>>,
    ) -> JobResult {
        self.jobs.run(request, events).await
    }

    pub fn cancel_job(&self) -> bool {
        self.jobs.cancel()
    }

    /// yt-dlp's JSON metadata for `url`, playlists flattened
    pub async fn video_info(&self, url: &str) -> Result<serde_json::Value> {
        fetch_video_info(&self.locator, url).await
    }

    pub async fn acquire(
        &self,
        target: AcquireTarget,
        events: Option<UnboundedSender<AcquisitionEvent>>,
    ) -> AcquireOutcome {
        match &self.acquisition {
            Ok(controller) => controller.acquire(target, events).await,
            Err(e) => {
                if let Some(tx) = events
                    && tx.send(AcquisitionEvent::Cleared).is_err()
                {
                    debug!("Acquisition event receiver already dropped");
                }
                AcquireOutcome::Failed(e.to_string())
            }
        }
    }

    pub fn cancel_acquisition(&self) -> bool {
        self.acquisition
            .as_ref()
            .map(|controller| controller.cancel())
            .unwrap_or(false)
    }

    pub async fn binary_status(&self) -> BinaryStatus {
        self.locator.status().await
    }

    pub async fn binary_versions(&self) -> BinaryVersions {
        binary_versions(&self.locator).await
    }

    pub async fn latest_versions(&self) -> LatestVersions {
        latest_versions(self.downloader.client()).await
    }

    /// Hardware encoder families of the resolved ffmpeg; empty without one
    pub async fn detect_hw_encoders(&self) -> Vec<HwEncoder> {
        match self.locator.resolve(Tool::Ffmpeg).await {
            Some(ffmpeg) => detect_hw_encoders(&ffmpeg.path).await,
            None => Vec::new(),
        }
    }
}
