//! Streaming HTTP download with redirect following, throttled progress and cancellation

use std::path::Path;
use std::time::{Duration, Instant};

use futures::StreamExt;
use log::{debug, warn};
use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::progress::{DownloadProgress, ProgressThrottle};
use crate::config::NetworkConfig;
use crate::{MediaError, Result};

/// Outcome of a single HTTP attempt
enum Attempt {
    Complete,
    Redirect(Url),
}

/// Fetches URLs to files. Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct StreamingDownloader {
    client: reqwest::Client,
    max_redirects: usize,
    inactivity_timeout: Duration,
}

impl StreamingDownloader {
    pub fn new(network: &NetworkConfig) -> Result<Self> {
        // Redirects are followed by hand so every hop gets a fresh session and the hop count is capped
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .connect_timeout(network.connect_timeout())
            .user_agent(network.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            max_redirects: network.max_redirects,
            inactivity_timeout: network.inactivity_timeout(),
        })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Download `url` to `destination`.
    ///
    /// `on_progress` receives at most ~10 samples per second plus one final
    /// sample. On error or cancellation the destination file is removed
    /// before this returns.
    pub async fn download<F>(
        &self,
        url: &str,
        destination: &Path,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> Result<()>
    where
        F: FnMut(DownloadProgress),
    {
        let mut current = Url::parse(url)?;

        for hop in 0..=self.max_redirects {
            if cancel.is_cancelled() {
                remove_partial(destination).await;
                return Err(MediaError::Cancelled);
            }

            match self
                .attempt(&current, destination, cancel, &mut on_progress)
                .await
            {
                Ok(Attempt::Complete) => {
                    set_executable_best_effort(destination).await;
                    return Ok(());
                }
                Ok(Attempt::Redirect(next)) => {
                    debug!("Redirect hop {} : {} -> {}", hop + 1, current, next);
                    current = next;
                }
                Err(e) => {
                    remove_partial(destination).await;
                    return Err(e);
                }
            }
        }

        remove_partial(destination).await;
        Err(MediaError::TooManyRedirects {
            limit: self.max_redirects,
        })
    }

    async fn attempt<F>(
        &self,
        url: &Url,
        destination: &Path,
        cancel: &CancellationToken,
        on_progress: &mut F,
    ) -> Result<Attempt>
    where
        F: FnMut(DownloadProgress),
    {
        debug!("GET {} -> {}", url, destination.display());
        let mut file = tokio::fs::File::create(destination).await?;

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(MediaError::Cancelled),
            response = self.client.get(url.clone()).send() => response?,
        };

        let status = response.status();
        if status.is_redirection() {
            drop(file);
            remove_partial(destination).await;
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .ok_or_else(|| MediaError::Http {
                    status: status.as_u16(),
                    url: url.to_string(),
                })?;
            return Ok(Attempt::Redirect(resolve_redirect(url, location)?));
        }
        if !status.is_success() {
            return Err(MediaError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let total = response.content_length().unwrap_or(0);
        let started = Instant::now();
        let mut throttle = ProgressThrottle::default();
        let mut downloaded: u64 = 0;
        let mut last_reported: Option<u64> = None;
        let mut stream = response.bytes_stream();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(MediaError::Cancelled),
                next = timeout(self.inactivity_timeout, stream.next()) => next,
            };

            let chunk = match next {
                Ok(Some(Ok(chunk))) => chunk,
                Ok(Some(Err(e))) => return Err(e.into()),
                Ok(None) => break, // Stream ended normally
                Err(_) => {
                    return Err(MediaError::Io(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        format!(
                            "no data received for {} seconds from {} ({} bytes so far)",
                            self.inactivity_timeout.as_secs(),
                            url,
                            downloaded
                        ),
                    )));
                }
            };

            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;

            if throttle.ready(Instant::now()) || downloaded == total {
                on_progress(DownloadProgress::sample(downloaded, total, started.elapsed()));
                last_reported = Some(downloaded);
            }
        }

        file.flush().await?;
        drop(file);

        if last_reported != Some(downloaded) {
            on_progress(DownloadProgress::sample(downloaded, total, started.elapsed()));
        }
        Ok(Attempt::Complete)
    }
}

/// Resolve a `Location` header (absolute, host-relative or path-relative) against the current URL
pub fn resolve_redirect(current: &Url, location: &str) -> Result<Url> {
    Ok(current.join(location)?)
}

/// Delete a partially written file; a missing file is not an error
pub(crate) async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed partial download {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove partial download {}: {}", path.display(), e),
    }
}

#[cfg(unix)]
pub(crate) async fn set_executable_best_effort(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let perms = std::fs::Permissions::from_mode(0o755);
    if let Err(e) = tokio::fs::set_permissions(path, perms).await {
        debug!("Could not mark {} executable: {}", path.display(), e);
    }
}

#[cfg(not(unix))]
pub(crate) async fn set_executable_best_effort(_path: &Path) {}
