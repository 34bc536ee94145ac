use std::path::PathBuf;

use clap::{Parser, Subcommand};
use mediagrab::acquire::AcquireTarget;

#[derive(Parser, Debug)]
#[command(version, about = "Acquire yt-dlp/ffmpeg and download media")]
pub struct Args {
    /// Path to configuration file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub sub: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Show where yt-dlp and ffmpeg resolve from
    Status,
    /// Show installed tool versions
    Versions,
    /// Show latest published tool versions
    Latest,
    /// List hardware video encoders supported by the resolved ffmpeg
    Encoders,
    /// Download and install tools into the managed directory
    Install {
        /// ytdlp, ffmpeg or all
        #[arg(default_value = "all")]
        target: AcquireTarget,
    },
    /// Print metadata for a URL without downloading
    Info { url: String },
    /// Download media from a URL
    Download(DownloadArgs),
}

#[derive(clap::Args, Debug)]
pub struct DownloadArgs {
    pub url: String,

    /// Extract audio only
    #[arg(long)]
    pub audio: bool,

    /// Audio format in audio mode (mp3, m4a, flac, wav, ...)
    #[arg(long, default_value = "mp3")]
    pub format: String,

    /// Audio quality / bitrate in audio mode
    #[arg(long, default_value = "320k")]
    pub bitrate: String,

    /// PCM bit depth for wav output
    #[arg(long, default_value = "16")]
    pub bit_depth: String,

    /// Height ceiling such as 720p, or best
    #[arg(long, default_value = "best")]
    pub resolution: String,

    /// Merge container in video mode
    #[arg(long, default_value = "mp4")]
    pub container: String,

    /// Download the whole playlist
    #[arg(long, conflicts_with = "no_playlist")]
    pub playlist: bool,

    /// Download only the single item even if the URL is a playlist
    #[arg(long)]
    pub no_playlist: bool,

    /// Browser to read cookies from
    #[arg(long)]
    pub cookies: Option<String>,

    /// Only download the section between START and END
    #[arg(long, num_args = 2, value_names = ["START", "END"])]
    pub section: Option<Vec<String>>,

    #[arg(long)]
    pub embed_thumbnail: bool,

    #[arg(long)]
    pub add_metadata: bool,

    #[arg(long)]
    pub embed_subs: bool,

    /// Output directory (defaults to the configured download directory)
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Output file template
    #[arg(long)]
    pub template: Option<String>,

    /// Extra arguments passed to yt-dlp verbatim
    #[arg(last = true)]
    pub extra: Vec<String>,
}
