//! Structured description of one extraction/conversion job
//!
//! Field names serialize in camelCase so a UI collaborator can hand a request
//! over as JSON. Every field except `url` and `destination` has a default.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const DEFAULT_OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaMode {
    #[default]
    Video,
    Audio,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FormatOptions {
    pub video_container: String,
    /// `best`, or a height ceiling such as `720p`
    pub video_resolution: String,
    pub audio_format: String,
    pub audio_bitrate: String,
    pub audio_sample_rate: String,
    /// Only used for `wav` output
    pub audio_bit_depth: String,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            video_container: "mp4".to_string(),
            video_resolution: "best".to_string(),
            audio_format: "mp3".to_string(),
            audio_bitrate: "320k".to_string(),
            audio_sample_rate: "48000".to_string(),
            audio_bit_depth: "16".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaylistMode {
    /// Leave playlist handling to the tool
    #[default]
    Default,
    Single,
    #[serde(alias = "all")]
    Playlist,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimeRange {
    pub enabled: bool,
    pub start: String,
    pub end: String,
}

impl TimeRange {
    /// `*start-end` when the range is enabled and both ends are filled in
    pub fn section(&self) -> Option<String> {
        let (start, end) = (self.start.trim(), self.end.trim());
        (self.enabled && !start.is_empty() && !end.is_empty()).then(|| format!("*{start}-{end}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdvancedOptions {
    pub embed_thumbnail: bool,
    pub add_metadata: bool,
    pub embed_subs: bool,
    pub write_auto_sub: bool,
    pub split_chapters: bool,
    pub playlist: PlaylistMode,
    /// Browser to read cookies from, `none` to disable
    #[serde(alias = "cookiesBrowser")]
    pub cookie_browser: String,
    pub time_range: Option<TimeRange>,
}

impl Default for AdvancedOptions {
    fn default() -> Self {
        Self {
            embed_thumbnail: false,
            add_metadata: false,
            embed_subs: false,
            write_auto_sub: false,
            split_chapters: false,
            playlist: PlaylistMode::Default,
            cookie_browser: "none".to_string(),
            time_range: None,
        }
    }
}

impl AdvancedOptions {
    pub fn cookie_browser(&self) -> Option<&str> {
        let browser = self.cookie_browser.trim();
        (!browser.is_empty() && !browser.eq_ignore_ascii_case("none")).then_some(browser)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    #[default]
    H264,
    H265,
    Vp9,
    Av1,
    Copy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    #[default]
    Aac,
    Mp3,
    Opus,
    Copy,
}

/// Hardware encoder preference of a conversion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HwAccel {
    /// First encoder family the local ffmpeg supports
    #[default]
    Auto,
    /// Software encoders only
    None,
    Nvenc,
    Qsv,
    Videotoolbox,
    Amf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VideoConversion {
    pub enabled: bool,
    pub video_codec: VideoCodec,
    pub video_bitrate: String,
    pub audio_codec: AudioCodec,
    pub audio_bitrate: String,
    pub hw_encoder: HwAccel,
}

impl Default for VideoConversion {
    fn default() -> Self {
        Self {
            enabled: false,
            video_codec: VideoCodec::H264,
            video_bitrate: String::new(),
            audio_codec: AudioCodec::Aac,
            audio_bitrate: "320k".to_string(),
            hw_encoder: HwAccel::Auto,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    pub url: String,
    #[serde(default, alias = "format")]
    pub mode: MediaMode,
    #[serde(alias = "location")]
    pub destination: PathBuf,
    #[serde(default)]
    pub options: FormatOptions,
    #[serde(default)]
    pub advanced_options: AdvancedOptions,
    #[serde(default)]
    pub video_conversion: Option<VideoConversion>,
    /// Output file template; empty means `%(title)s.%(ext)s`
    #[serde(default)]
    pub output_template: String,
    /// Appended verbatim after every generated argument
    #[serde(default, alias = "args")]
    pub extra_args: Vec<String>,
}

impl JobRequest {
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            mode: MediaMode::Video,
            destination: destination.into(),
            options: FormatOptions::default(),
            advanced_options: AdvancedOptions::default(),
            video_conversion: None,
            output_template: String::new(),
            extra_args: Vec::new(),
        }
    }

    pub fn output_template(&self) -> &str {
        match self.output_template.trim() {
            "" => DEFAULT_OUTPUT_TEMPLATE,
            template => template,
        }
    }

    /// The conversion block, only when it is switched on
    pub fn active_conversion(&self) -> Option<&VideoConversion> {
        self.video_conversion.as_ref().filter(|c| c.enabled)
    }
}
