//! Error taxonomy shared by acquisition and job execution

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("external tool is missing: {tool}")]
    NotFound { tool: String },

    #[error("HTTP error {status} for {url}")]
    Http { status: u16, url: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// User-initiated abort. Callers branch on this to skip failure reporting.
    #[error("Download cancelled")]
    Cancelled,

    #[error("too many redirects (limit {limit})")]
    TooManyRedirects { limit: usize },

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("extraction failed: {0}")]
    Extract(String),

    #[error("unsupported platform: {os} {arch}")]
    UnsupportedPlatform { os: String, arch: String },

    #[error("failed to start {tool} at {path}: {source}")]
    ProcessSpawn {
        tool: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("process exited with code {code:?}")]
    NonZeroExit { code: Option<i32> },

    #[error("{tool} failed: {message}")]
    ToolFailed { tool: String, message: String },

    #[error("invalid JSON from tool: {0}")]
    Json(#[from] serde_json::Error),

    #[error("another operation is already running")]
    Busy,

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl MediaError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, MediaError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, MediaError>;
