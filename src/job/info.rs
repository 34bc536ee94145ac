//! One-shot metadata lookup ahead of a job

use std::path::Path;
use std::process::Stdio;

use log::{debug, info};

use crate::process;
use crate::tools::{BinaryLocator, Tool};
use crate::{MediaError, Result};

/// Arguments that make yt-dlp dump metadata as one JSON document without downloading
pub fn info_args(url: &str) -> Vec<String> {
    ["-J", "--flat-playlist", "--no-warnings", url]
        .map(String::from)
        .to_vec()
}

/// Metadata of `url` (title, formats, playlist entries, ...) as reported by yt-dlp
pub async fn fetch_video_info(locator: &BinaryLocator, url: &str) -> Result<serde_json::Value> {
    let ytdlp = locator
        .resolve(Tool::YtDlp)
        .await
        .ok_or_else(|| MediaError::NotFound {
            tool: Tool::YtDlp.to_string(),
        })?;
    run_info(&ytdlp.path, url).await
}

async fn run_info(ytdlp: &Path, url: &str) -> Result<serde_json::Value> {
    info!("Fetching media info for {url}");
    let output = process::command(ytdlp)
        .args(info_args(url))
        .env("PYTHONIOENCODING", "utf-8")
        .env("PYTHONUTF8", "1")
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|source| MediaError::ProcessSpawn {
            tool: Tool::YtDlp.to_string(),
            path: ytdlp.to_path_buf(),
            source,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        debug!("yt-dlp info failed with {}: {}", output.status, stderr);
        return Err(MediaError::ToolFailed {
            tool: Tool::YtDlp.to_string(),
            message: stderr,
        });
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(serde_json::from_str(&stdout)?)
}
