mod cli;

use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use log::{debug, error, info};
use serde::Serialize;
use tokio::sync::mpsc;

use mediagrab::Engine;
use mediagrab::acquire::{AcquireOutcome, AcquireTarget, AcquisitionEvent};
use mediagrab::config::Config;
use mediagrab::download::INDETERMINATE;
use mediagrab::job::{JobEvent, JobRequest, MediaMode, PlaylistMode, TimeRange};

fn main() {
    // Timestamped `[ts level file:line]` lines; RUST_LOG overrides the Info default
    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "[{} {} {}:{}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("FATAL: Failed to create Tokio runtime: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = rt.block_on(real_main()) {
        error!("{e:#}");
        std::process::exit(1);
    }
}

async fn real_main() -> Result<()> {
    let args = cli::Args::parse();

    let cfg_path = match args.config {
        Some(path) => path,
        None => Config::default_path()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?,
    };
    let config = Config::load_or_create(&cfg_path)
        .with_context(|| format!("Failed to load config from {}", cfg_path.display()))?;
    let engine = Arc::new(Engine::new(config).context("Failed to initialise engine")?);

    match args.sub {
        cli::Cmd::Status => {
            let status = engine.binary_status().await;
            if args.json {
                return print_json(&status);
            }
            println!("managed dir: {}", status.managed_dir.display());
            for (name, binary) in [("yt-dlp", &status.ytdlp), ("ffmpeg", &status.ffmpeg)] {
                match binary {
                    Some(b) => println!("{name}: {} ({:?})", b.path.display(), b.resolved_from),
                    None => println!("{name}: not found"),
                }
            }
            Ok(())
        }
        cli::Cmd::Versions => {
            let versions = engine.binary_versions().await;
            if args.json {
                return print_json(&versions);
            }
            println!("yt-dlp: {}", versions.yt_dlp);
            println!("ffmpeg: {}", versions.ffmpeg);
            Ok(())
        }
        cli::Cmd::Latest => {
            let latest = engine.latest_versions().await;
            if args.json {
                return print_json(&latest);
            }
            println!("yt-dlp: {}", latest.yt_dlp);
            println!("ffmpeg: {}", latest.ffmpeg);
            Ok(())
        }
        cli::Cmd::Encoders => {
            let encoders = engine.detect_hw_encoders().await;
            if args.json {
                return print_json(&encoders);
            }
            if encoders.is_empty() {
                println!("no hardware encoders detected");
            }
            for encoder in encoders {
                println!("{}", encoder.name());
            }
            Ok(())
        }
        cli::Cmd::Info { url } => {
            let info = engine
                .video_info(&url)
                .await
                .with_context(|| format!("Failed to fetch info for {url}"))?;
            if args.json {
                return print_json(&info);
            }
            let field = |key: &str| info.get(key).and_then(|v| v.as_str()).unwrap_or("-");
            println!("title: {}", field("title"));
            println!("uploader: {}", field("uploader"));
            if let Some(duration) = info.get("duration").and_then(|v| v.as_f64()) {
                println!("duration: {duration:.0}s");
            }
            if let Some(entries) = info.get("entries").and_then(|v| v.as_array()) {
                println!("entries: {}", entries.len());
            }
            Ok(())
        }
        cli::Cmd::Install { target } => handle_install(engine, target, args.json).await,
        cli::Cmd::Download(download) => handle_download(engine, download, args.json).await,
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn handle_install(engine: Arc<Engine>, target: AcquireTarget, json: bool) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut task = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.acquire(target, Some(tx)).await })
    };
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                AcquisitionEvent::Progress(p) if p.percent == INDETERMINATE => {
                    eprintln!("{} {}", p.status_key, p.details.unwrap_or_default());
                }
                AcquisitionEvent::Progress(p) => {
                    eprintln!("{} {:>3}% {}", p.status_key, p.percent, p.details.unwrap_or_default());
                }
                AcquisitionEvent::Cleared => debug!("Acquisition progress cleared"),
            }
        }
    });

    let outcome = tokio::select! {
        outcome = &mut task => outcome?,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, cancelling acquisition");
            engine.cancel_acquisition();
            task.await?
        }
    };
    printer.await?;

    if json {
        print_json(&outcome)?;
    }
    match outcome {
        AcquireOutcome::Installed => {
            info!("{target} installed into {}", engine.locator().managed_dir().display());
            Ok(())
        }
        AcquireOutcome::Cancelled => {
            info!("Installation of {target} cancelled");
            Ok(())
        }
        AcquireOutcome::Failed(message) => bail!("Failed to install {target}: {message}"),
    }
}

fn job_request(engine: &Engine, args: cli::DownloadArgs) -> JobRequest {
    let destination = args
        .output
        .unwrap_or_else(|| engine.config().effective_download_dir());
    let mut request = JobRequest::new(args.url, destination);

    request.mode = if args.audio {
        MediaMode::Audio
    } else {
        MediaMode::Video
    };
    request.options.audio_format = args.format;
    request.options.audio_bitrate = args.bitrate;
    request.options.audio_bit_depth = args.bit_depth;
    request.options.video_resolution = args.resolution;
    request.options.video_container = args.container;

    let advanced = &mut request.advanced_options;
    advanced.embed_thumbnail = args.embed_thumbnail;
    advanced.add_metadata = args.add_metadata;
    advanced.embed_subs = args.embed_subs;
    advanced.playlist = match (args.playlist, args.no_playlist) {
        (true, _) => PlaylistMode::Playlist,
        (_, true) => PlaylistMode::Single,
        _ => PlaylistMode::Default,
    };
    if let Some(browser) = args.cookies {
        advanced.cookie_browser = browser;
    }
    if let Some([start, end]) = args.section.as_deref() {
        advanced.time_range = Some(TimeRange {
            enabled: true,
            start: start.clone(),
            end: end.clone(),
        });
    }

    request.output_template = args.template.unwrap_or_default();
    request.extra_args = args.extra;
    request
}

async fn handle_download(engine: Arc<Engine>, args: cli::DownloadArgs, json: bool) -> Result<()> {
    let request = job_request(&engine, args);
    tokio::fs::create_dir_all(&request.destination)
        .await
        .with_context(|| format!("Failed to create {}", request.destination.display()))?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut task = {
        let engine = Arc::clone(&engine);
        let request = request.clone();
        tokio::spawn(async move { engine.start_job(&request, Some(tx)).await })
    };
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                JobEvent::Log(line) => eprintln!("{line}"),
                JobEvent::Progress(state) => debug!("{:.1}% {:?}", state.percent, state.phase),
                JobEvent::Complete(_) => {}
            }
        }
    });

    let result = tokio::select! {
        result = &mut task => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, cancelling download");
            engine.cancel_job();
            task.await?
        }
    };
    printer.await?;

    if json {
        print_json(&result)?;
    } else if let Some(path) = &result.output_path {
        println!("{}", path.display());
    }

    if result.success || result.cancelled {
        info!("{}", result.message);
        Ok(())
    } else {
        bail!("{}", result.message)
    }
}
