//! Canonical registry of the managed external tools
//!
//! Two tools are managed: the extraction tool (yt-dlp) and the transcoder
//! (ffmpeg, which ships together with its companion ffprobe). Everything the
//! installer needs to know about a tool on a given platform lives here.

use serde::{Deserialize, Serialize};

use super::platform::{Arch, Platform};

/// Logical tool managed by the acquisition pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    #[serde(rename = "ytdlp", alias = "yt-dlp")]
    YtDlp,
    Ffmpeg,
}

/// Every managed tool, in install order
pub const TOOLS: &[Tool] = &[Tool::YtDlp, Tool::Ffmpeg];

impl Tool {
    pub fn name(&self) -> &'static str {
        match self {
            Tool::YtDlp => "yt-dlp",
            Tool::Ffmpeg => "ffmpeg",
        }
    }

    /// Executable stems installed for this tool. The first entry is the primary one.
    pub fn executables(&self) -> &'static [&'static str] {
        match self {
            Tool::YtDlp => &["yt-dlp"],
            Tool::Ffmpeg => &["ffmpeg", "ffprobe"],
        }
    }

    pub fn primary_executable(&self) -> &'static str {
        self.executables()[0]
    }

    /// Argument that makes the tool print its version and exit
    pub fn version_arg(&self) -> &'static str {
        match self {
            Tool::YtDlp => "--version",
            Tool::Ffmpeg => "-version",
        }
    }
}

impl std::fmt::Display for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Tool {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ytdlp" | "yt-dlp" => Ok(Tool::YtDlp),
            "ffmpeg" => Ok(Tool::Ffmpeg),
            other => Err(format!("unknown tool: {other}")),
        }
    }
}

/// How the downloaded artifact(s) must be turned into executables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveLayout {
    /// The URL serves the executable itself
    RawExecutable,
    /// One zip per executable, downloaded side by side (macOS ffbinaries)
    ZipPerExecutable,
    /// A single zip with an unknown internal directory layout
    BundledZip,
    /// A single `.tar.xz` with a versioned top-level directory containing `bin/`
    BundledTarXz,
}

/// Static description of how to obtain a tool on one platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSpec {
    pub tool: Tool,
    pub platform: Platform,
    /// One URL per artifact. `ZipPerExecutable` pairs each URL with the
    /// executable at the same index in `Tool::executables`.
    pub urls: Vec<String>,
    pub layout: ArchiveLayout,
}

const YTDLP_RELEASE_BASE: &str = "https://github.com/yt-dlp/yt-dlp/releases/latest/download";
const FFBINARIES_VERSION: &str = "6.1";
const FFMPEG_BUILDS_BASE: &str =
    "https://github.com/yt-dlp/FFmpeg-Builds/releases/download/latest";

impl ToolSpec {
    /// Default download sources for `tool` on `platform`
    pub fn for_platform(tool: Tool, platform: Platform) -> Self {
        let (urls, layout) = match tool {
            Tool::YtDlp => {
                let asset = match platform {
                    Platform::Windows(Arch::X86_64) => "yt-dlp.exe",
                    Platform::Windows(Arch::Aarch64) => "yt-dlp_arm64.exe",
                    Platform::MacOs(_) => "yt-dlp_macos",
                    Platform::Linux(Arch::X86_64) => "yt-dlp",
                    Platform::Linux(Arch::Aarch64) => "yt-dlp_linux_aarch64",
                };
                (
                    vec![format!("{YTDLP_RELEASE_BASE}/{asset}")],
                    ArchiveLayout::RawExecutable,
                )
            }
            Tool::Ffmpeg => match platform {
                // x64 builds also run on Apple Silicon through Rosetta 2
                Platform::MacOs(_) => (
                    tool.executables()
                        .iter()
                        .map(|exe| {
                            format!(
                                "https://github.com/ffbinaries/ffbinaries-prebuilt/releases/download/v{v}/{exe}-{v}-macos-64.zip",
                                v = FFBINARIES_VERSION
                            )
                        })
                        .collect(),
                    ArchiveLayout::ZipPerExecutable,
                ),
                Platform::Windows(arch) => {
                    let flavor = match arch {
                        Arch::X86_64 => "win64",
                        Arch::Aarch64 => "winarm64",
                    };
                    (
                        vec![format!("{FFMPEG_BUILDS_BASE}/ffmpeg-master-latest-{flavor}-gpl.zip")],
                        ArchiveLayout::BundledZip,
                    )
                }
                Platform::Linux(arch) => {
                    let flavor = match arch {
                        Arch::X86_64 => "linux64",
                        Arch::Aarch64 => "linuxarm64",
                    };
                    (
                        vec![format!(
                            "{FFMPEG_BUILDS_BASE}/ffmpeg-master-latest-{flavor}-gpl.tar.xz"
                        )],
                        ArchiveLayout::BundledTarXz,
                    )
                }
            },
        };

        Self {
            tool,
            platform,
            urls,
            layout,
        }
    }

    /// Replace the default URLs, keeping the layout
    pub fn with_urls(mut self, urls: Vec<String>) -> Self {
        if !urls.is_empty() {
            self.urls = urls;
        }
        self
    }

    /// Executable file names on this spec's platform
    pub fn executable_names(&self) -> Vec<String> {
        self.tool
            .executables()
            .iter()
            .map(|stem| self.platform.executable_name(stem))
            .collect()
    }
}
