use mediagrab::job::{HwAccel, HwEncoder, JobRequest, MediaMode, VideoCodec, VideoConversion, build_args};

fn has(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn request_with_extras(mode: MediaMode) -> JobRequest {
    let mut request = JobRequest::new("https://example.com/watch?v=1", "/downloads");
    request.mode = mode;
    request.advanced_options.embed_subs = true;
    request.advanced_options.write_auto_sub = true;
    request.advanced_options.split_chapters = true;
    request
}

#[test]
fn audio_mode_drops_subtitle_and_chapter_flags() {
    let args = build_args(&request_with_extras(MediaMode::Audio), None, None);
    assert!(!has(&args, "--embed-subs"));
    assert!(!has(&args, "--write-auto-sub"));
    assert!(!has(&args, "--split-chapters"));
    assert!(has(&args, "-x"));
}

#[test]
fn video_mode_keeps_subtitle_and_chapter_flags() {
    let args = build_args(&request_with_extras(MediaMode::Video), None, None);
    assert!(has(&args, "--embed-subs"));
    assert!(has(&args, "--write-auto-sub"));
    assert!(has(&args, "--split-chapters"));
}

#[test]
fn resolution_caps_video_height() {
    let mut request = JobRequest::new("https://example.com/v", "/downloads");
    request.options.video_resolution = "720p".into();
    let args = build_args(&request, None, None);
    let f = args.iter().position(|a| a == "-f").unwrap();
    assert_eq!(args[f + 1], "bestvideo[height<=720]+bestaudio/best");
}

#[test]
fn identical_requests_build_identical_args() {
    let request: JobRequest = serde_json::from_value(serde_json::json!({
        "url": "https://example.com/watch?v=2",
        "format": "video",
        "location": "/downloads",
        "advancedOptions": {
            "embedThumbnail": true,
            "timeRange": { "enabled": true, "start": "10", "end": "20" }
        },
        "videoConversion": { "enabled": true, "videoCodec": "h264", "videoBitrate": "4M" },
        "args": ["--limit-rate", "2M"]
    }))
    .unwrap();

    let first = build_args(&request, None, Some(HwEncoder::Nvenc));
    let second = build_args(&request.clone(), None, Some(HwEncoder::Nvenc));
    assert_eq!(first, second);
    assert_eq!(&first[first.len() - 2..], &["--limit-rate", "2M"]);
    assert!(first.contains(&"ffmpeg:-c:v h264_nvenc -b:v 4M -c:a aac -b:a 320k".to_string()));
}

#[test]
fn disabled_conversion_adds_no_postprocessor_args() {
    let mut request = JobRequest::new("https://example.com/v", "/downloads");
    request.video_conversion = Some(VideoConversion {
        enabled: false,
        video_codec: VideoCodec::H265,
        hw_encoder: HwAccel::Qsv,
        ..VideoConversion::default()
    });
    let args = build_args(&request, None, Some(HwEncoder::Qsv));
    assert!(!has(&args, "--postprocessor-args"));
}
