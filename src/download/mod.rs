//! Artifact download and installation
//!
//! ## Module Organization
//!
//! - `core` - Streaming HTTP downloader with manual redirects and cancellation
//! - `progress` - Progress sampling, throttling and multi-stream aggregation
//! - `extract` - Platform install strategies for archived executables

mod core;
mod extract;
mod progress;

pub use self::core::{StreamingDownloader, resolve_redirect};
pub(crate) use self::core::{remove_partial, set_executable_best_effort};
pub use extract::{ArchiveInstaller, InstallStrategy};
pub use progress::{
    CombinedProgress, DownloadProgress, INDETERMINATE, PROGRESS_INTERVAL, ProgressThrottle,
    format_progress_details, map_percent,
};
