use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::tools::{Tool, ToolSpec};
use crate::{MediaError, Result};

/// Environment variable overriding the managed binary directory
pub const BIN_DIR_ENV: &str = "MEDIAGRAB_BIN_DIR";

/// Top‑level configuration, stored as TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Managed directory that acquired executables are installed into
    pub bin_dir: Option<PathBuf>,
    /// Default destination directory for download jobs
    pub download_dir: Option<PathBuf>,
    #[serde(default)]
    pub fallback_paths: FallbackPaths,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub sources: SourceOverrides,
}

/// Vendored executables shipped next to the application, checked after the managed directory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FallbackPaths {
    pub ytdlp: Option<PathBuf>,
    pub ffmpeg: Option<PathBuf>,
}

impl FallbackPaths {
    pub fn get(&self, tool: Tool) -> Option<&Path> {
        match tool {
            Tool::YtDlp => self.ytdlp.as_deref(),
            Tool::Ffmpeg => self.ffmpeg.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Abort a transfer when no bytes arrive for this long
    #[serde(default = "default_inactivity_timeout")]
    pub inactivity_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_max_redirects() -> usize {
    10
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_inactivity_timeout() -> u64 {
    300
}

fn default_user_agent() -> String {
    format!("mediagrab/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            max_redirects: default_max_redirects(),
            connect_timeout_secs: default_connect_timeout(),
            inactivity_timeout_secs: default_inactivity_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl NetworkConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }
}

/// Download URL overrides. Empty lists keep the built-in sources.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceOverrides {
    #[serde(default)]
    pub ytdlp: Vec<String>,
    #[serde(default)]
    pub ffmpeg: Vec<String>,
}

impl SourceOverrides {
    pub fn apply(&self, spec: ToolSpec) -> ToolSpec {
        let urls = match spec.tool {
            Tool::YtDlp => &self.ytdlp,
            Tool::Ffmpeg => &self.ffmpeg,
        };
        spec.with_urls(urls.clone())
    }
}

impl Config {
    /// Default config location: `<config dir>/mediagrab/mediagrab.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("mediagrab").join("mediagrab.toml"))
    }

    /// Load the config at `path`, writing a default one first if it does not exist
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!(
                "Config not found at {}, creating default configuration",
                path.display()
            );
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let default_toml = toml::to_string_pretty(&Config::default()).map_err(|e| {
                MediaError::Io(std::io::Error::other(format!(
                    "failed to serialize default config: {e}"
                )))
            })?;
            fs::write(path, default_toml)?;
        }

        let raw = fs::read_to_string(path)?;
        Self::parse(&raw).map_err(|e| {
            MediaError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("failed to parse config at {}: {e}", path.display()),
            ))
        })
    }

    pub fn parse(raw: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Managed binary directory: env override, then config, then the
    /// platform's local data directory.
    pub fn managed_bin_dir(&self) -> PathBuf {
        if let Some(dir) = std::env::var_os(BIN_DIR_ENV).filter(|v| !v.is_empty()) {
            return PathBuf::from(dir);
        }
        if let Some(dir) = &self.bin_dir {
            return dir.clone();
        }
        dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("mediagrab")
            .join("bin")
    }

    /// Destination for jobs that don't name one explicitly
    pub fn effective_download_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .or_else(dirs::download_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}
