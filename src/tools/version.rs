//! Installed tool version probing

use std::path::Path;
use std::process::Stdio;

use log::debug;
use serde::Serialize;

use super::locator::BinaryLocator;
use super::spec::Tool;
use crate::process;

pub const NOT_DETECTED: &str = "not detected";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BinaryVersions {
    pub yt_dlp: String,
    pub ffmpeg: String,
}

/// Version of every resolvable tool, `"not detected"` for the rest
pub async fn binary_versions(locator: &BinaryLocator) -> BinaryVersions {
    let (ytdlp, ffmpeg) = tokio::join!(
        tool_version(locator, Tool::YtDlp),
        tool_version(locator, Tool::Ffmpeg)
    );
    BinaryVersions {
        yt_dlp: ytdlp.unwrap_or_else(|| NOT_DETECTED.to_string()),
        ffmpeg: ffmpeg.unwrap_or_else(|| NOT_DETECTED.to_string()),
    }
}

pub async fn tool_version(locator: &BinaryLocator, tool: Tool) -> Option<String> {
    let binary = locator.resolve(tool).await?;
    let first_line = version_first_line(&binary.path, tool.version_arg()).await?;
    Some(clean_version(tool, &first_line))
}

async fn version_first_line(program: &Path, arg: &str) -> Option<String> {
    let output = process::command(program)
        .arg(arg)
        .stdin(Stdio::null())
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        debug!(
            "Version command failed for {}: {}",
            program.display(),
            output.status
        );
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout.lines().next().map(|line| line.trim().to_string())
}

/// `ffmpeg version 6.1-tessus https://...` → `6.1-tessus`; yt-dlp prints the bare version
pub fn clean_version(tool: Tool, first_line: &str) -> String {
    match tool {
        Tool::Ffmpeg => first_line
            .strip_prefix("ffmpeg version ")
            .and_then(|rest| rest.split_whitespace().next())
            .unwrap_or(first_line)
            .to_string(),
        Tool::YtDlp => first_line.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ffmpeg_banner_is_reduced_to_version_token() {
        assert_eq!(
            clean_version(
                Tool::Ffmpeg,
                "ffmpeg version 6.1-tessus  https://evermeet.cx/ffmpeg/ Copyright (c) 2000-2023"
            ),
            "6.1-tessus"
        );
        assert_eq!(clean_version(Tool::Ffmpeg, "something else"), "something else");
        assert_eq!(clean_version(Tool::YtDlp, "2024.08.06"), "2024.08.06");
    }
}
