//! Binary resolution: managed directory, then vendored fallback, then PATH
//!
//! Results are never cached. Every query re-resolves so that a manual
//! install or a PATH change made while the application runs is observed.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use log::{debug, warn};
use serde::Serialize;

use super::platform::host_executable_name;
use super::spec::Tool;
use crate::config::FallbackPaths;
use crate::process;

/// Where a binary was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ResolvedFrom {
    ManagedDir,
    Fallback,
    SystemPath,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledBinary {
    pub tool: Tool,
    pub path: PathBuf,
    pub resolved_from: ResolvedFrom,
}

/// Snapshot of both tools' resolution (the `resolve-binary-status` command)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BinaryStatus {
    pub ytdlp: Option<InstalledBinary>,
    pub ffmpeg: Option<InstalledBinary>,
    pub managed_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct BinaryLocator {
    managed_dir: PathBuf,
    fallbacks: FallbackPaths,
}

impl BinaryLocator {
    pub fn new(managed_dir: PathBuf, fallbacks: FallbackPaths) -> Self {
        Self {
            managed_dir,
            fallbacks,
        }
    }

    pub fn managed_dir(&self) -> &Path {
        &self.managed_dir
    }

    /// Create the managed directory if it is missing
    pub fn ensure_managed_dir(&self) -> std::io::Result<&Path> {
        if !self.managed_dir.exists() {
            std::fs::create_dir_all(&self.managed_dir)?;
        }
        Ok(&self.managed_dir)
    }

    /// Fixed install location of an executable (by stem) in the managed directory
    pub fn managed_path(&self, stem: &str) -> PathBuf {
        self.managed_dir.join(host_executable_name(stem))
    }

    /// Resolve a tool to an executable path, or `None` when it is not available anywhere
    pub async fn resolve(&self, tool: Tool) -> Option<InstalledBinary> {
        if let Err(e) = self.ensure_managed_dir() {
            warn!(
                "Failed to create managed binary directory {}: {}",
                self.managed_dir.display(),
                e
            );
        }

        let found = |path: PathBuf, resolved_from: ResolvedFrom| {
            debug!("Resolved {} at {} ({:?})", tool, path.display(), resolved_from);
            Some(InstalledBinary {
                tool,
                path,
                resolved_from,
            })
        };

        let managed = self.managed_path(tool.primary_executable());
        if managed.is_file() {
            return found(managed, ResolvedFrom::ManagedDir);
        }

        if let Some(fallback) = self.fallbacks.get(tool)
            && fallback.exists()
        {
            return found(fallback.to_path_buf(), ResolvedFrom::Fallback);
        }

        let system = which::which(tool.primary_executable()).ok()?;
        if probe_runs(&system, tool.version_arg()).await {
            return found(system, ResolvedFrom::SystemPath);
        }
        None
    }

    pub async fn status(&self) -> BinaryStatus {
        let (ytdlp, ffmpeg) = tokio::join!(self.resolve(Tool::YtDlp), self.resolve(Tool::Ffmpeg));
        BinaryStatus {
            ytdlp,
            ffmpeg,
            managed_dir: self.managed_dir.clone(),
        }
    }
}

/// Run `<program> <arg>` and report whether it exits successfully
async fn probe_runs(program: &Path, arg: &str) -> bool {
    match process::command(program)
        .arg(arg)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
    {
        Ok(status) => status.success(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            // Unexpected: permission denied, broken shim, etc.
            warn!("Failed to probe {}: {}", program.display(), e);
            false
        }
    }
}
