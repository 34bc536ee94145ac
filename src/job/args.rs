//! yt-dlp command line synthesis
//!
//! Sections are emitted in a fixed order: yt-dlp lets later flags override
//! earlier ones, so reordering changes behavior.

use std::path::Path;

use super::encoders::{HwEncoder, video_encoder};
use super::request::{AudioCodec, JobRequest, MediaMode, PlaylistMode, VideoConversion};

/// Arguments for one job. Pure: `ffmpeg` is only inspected by path shape and
/// the hardware encoder family must already be resolved.
pub fn build_args(
    request: &JobRequest,
    ffmpeg: Option<&Path>,
    hw_encoder: Option<HwEncoder>,
) -> Vec<String> {
    let mut args = Vec::with_capacity(32);
    let output = request.destination.join(request.output_template());

    args.push(request.url.clone());
    args.push("-o".into());
    args.push(output.to_string_lossy().into_owned());
    args.push("--no-mtime".into());
    args.extend(["--print", "after_move:filepath", "--print", "title"].map(String::from));
    args.extend(["--extractor-args", "youtube:player_client=default"].map(String::from));
    args.extend(["--encoding", "utf-8"].map(String::from));

    if let Some(ffmpeg) = ffmpeg {
        args.push("--ffmpeg-location".into());
        args.push(ffmpeg_location(ffmpeg));
    }

    let advanced = &request.advanced_options;
    if advanced.embed_thumbnail {
        args.push("--embed-thumbnail".into());
    }
    if advanced.add_metadata {
        args.push("--add-metadata".into());
    }
    // Subtitles and chapters have no meaning for an audio-only result
    if request.mode == MediaMode::Video {
        if advanced.embed_subs {
            args.push("--embed-subs".into());
        }
        if advanced.write_auto_sub {
            args.push("--write-auto-sub".into());
        }
        if advanced.split_chapters {
            args.push("--split-chapters".into());
        }
    }

    if let Some(browser) = advanced.cookie_browser() {
        args.push("--cookies-from-browser".into());
        args.push(browser.to_string());
    }

    match advanced.playlist {
        PlaylistMode::Single => args.push("--no-playlist".into()),
        PlaylistMode::Playlist => args.push("--yes-playlist".into()),
        PlaylistMode::Default => {}
    }

    if let Some(section) = advanced.time_range.as_ref().and_then(|r| r.section()) {
        args.push("--download-sections".into());
        args.push(section);
        args.push("--force-keyframes-at-cuts".into());
    }

    match request.mode {
        MediaMode::Audio => push_audio_args(&mut args, request),
        MediaMode::Video => push_video_args(&mut args, request, hw_encoder),
    }

    args.extend(request.extra_args.iter().cloned());
    args
}

/// yt-dlp wants the directory holding ffmpeg and ffprobe
fn ffmpeg_location(ffmpeg: &Path) -> String {
    let dir = if ffmpeg.is_dir() {
        ffmpeg
    } else {
        match ffmpeg.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => ffmpeg,
        }
    };
    dir.to_string_lossy().into_owned()
}

fn push_audio_args(args: &mut Vec<String>, request: &JobRequest) {
    let options = &request.options;
    args.push("-x".into());
    args.push("--audio-format".into());
    args.push(options.audio_format.clone());

    if options.audio_format.eq_ignore_ascii_case("wav") {
        // PCM has no quality knob; the bit depth picks the sample codec
        let depth = match options.audio_bit_depth.trim() {
            "" => "16",
            depth => depth,
        };
        args.push("--postprocessor-args".into());
        args.push(format!("ffmpeg:-acodec pcm_s{depth}le"));
    } else {
        args.push("--audio-quality".into());
        args.push(options.audio_bitrate.clone());
    }
}

fn push_video_args(args: &mut Vec<String>, request: &JobRequest, hw_encoder: Option<HwEncoder>) {
    let options = &request.options;
    let selector = match options.video_resolution.trim() {
        "" | "best" => "bestvideo+bestaudio/best".to_string(),
        resolution => {
            let height = resolution.trim_end_matches(['p', 'P']);
            format!("bestvideo[height<={height}]+bestaudio/best")
        }
    };
    args.push("-f".into());
    args.push(selector);
    args.push("--merge-output-format".into());
    args.push(options.video_container.clone());

    if let Some(conversion) = request.active_conversion()
        && let Some(pp) = conversion_args(conversion, hw_encoder)
    {
        args.push("--postprocessor-args".into());
        args.push(format!("ffmpeg:{pp}"));
    }
}

/// `-c:v X -b:v R -c:a Y -b:a R`, skipping copied streams and empty bitrates
fn conversion_args(conversion: &VideoConversion, hw_encoder: Option<HwEncoder>) -> Option<String> {
    let mut parts = Vec::new();

    if let Some(encoder) = video_encoder(conversion.video_codec, hw_encoder) {
        parts.push(format!("-c:v {encoder}"));
        if !conversion.video_bitrate.trim().is_empty() {
            parts.push(format!("-b:v {}", conversion.video_bitrate.trim()));
        }
    }

    let audio_encoder = match conversion.audio_codec {
        AudioCodec::Aac => Some("aac"),
        AudioCodec::Mp3 => Some("libmp3lame"),
        AudioCodec::Opus => Some("libopus"),
        AudioCodec::Copy => None,
    };
    if let Some(encoder) = audio_encoder {
        parts.push(format!("-c:a {encoder}"));
        if !conversion.audio_bitrate.trim().is_empty() {
            parts.push(format!("-b:a {}", conversion.audio_bitrate.trim()));
        }
    }

    (!parts.is_empty()).then(|| parts.join(" "))
}
