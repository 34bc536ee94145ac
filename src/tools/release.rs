//! Latest upstream release lookup

use serde::{Deserialize, Serialize};

use crate::{MediaError, Result};

pub const UNKNOWN: &str = "unknown";

const YTDLP_LATEST_RELEASE: &str = "https://api.github.com/repos/yt-dlp/yt-dlp/releases/latest";
const FFBINARIES_LATEST: &str = "https://ffbinaries.com/api/v1/version/latest";

/// GitHub release metadata from API
#[derive(Deserialize, Debug)]
pub struct GitHubRelease {
    pub tag_name: String,
}

#[derive(Deserialize, Debug)]
struct FfbinariesVersion {
    version: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestVersions {
    pub yt_dlp: String,
    pub ffmpeg: String,
}

/// Latest published versions; lookups that fail report `"unknown"`
pub async fn latest_versions(client: &reqwest::Client) -> LatestVersions {
    let (ytdlp, ffmpeg) = tokio::join!(
        latest_release(client, YTDLP_LATEST_RELEASE),
        latest_ffbinaries(client, FFBINARIES_LATEST)
    );
    LatestVersions {
        yt_dlp: ytdlp.map(|r| r.tag_name).unwrap_or_else(|e| {
            log::warn!("Failed to fetch yt-dlp latest version: {e}");
            UNKNOWN.to_string()
        }),
        ffmpeg: ffmpeg.unwrap_or_else(|e| {
            log::warn!("Failed to fetch ffmpeg latest version: {e}");
            UNKNOWN.to_string()
        }),
    }
}

/// Fetch the latest release from a GitHub `releases/latest` endpoint
pub async fn latest_release(client: &reqwest::Client, url: &str) -> Result<GitHubRelease> {
    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        return Err(MediaError::Http {
            status: response.status().as_u16(),
            url: url.to_string(),
        });
    }
    Ok(response.json().await?)
}

async fn latest_ffbinaries(client: &reqwest::Client, url: &str) -> Result<String> {
    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        return Err(MediaError::Http {
            status: response.status().as_u16(),
            url: url.to_string(),
        });
    }
    let body: FfbinariesVersion = response.json().await?;
    Ok(body.version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn reads_tag_name_from_release_payload() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/repos/yt-dlp/yt-dlp/releases/latest");
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(serde_json::json!({ "tag_name": "2025.01.15", "assets": [] }));
            })
            .await;

        let client = reqwest::Client::new();
        let release = latest_release(&client, &server.url("/repos/yt-dlp/yt-dlp/releases/latest"))
            .await
            .unwrap();
        assert_eq!(release.tag_name, "2025.01.15");
    }

    #[tokio::test]
    async fn non_success_status_is_an_http_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/latest");
                then.status(403);
            })
            .await;

        let client = reqwest::Client::new();
        let err = latest_release(&client, &server.url("/latest")).await.unwrap_err();
        assert!(matches!(err, MediaError::Http { status: 403, .. }));
    }
}
