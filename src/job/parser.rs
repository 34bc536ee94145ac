//! yt-dlp / ffmpeg console output to structured progress

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Percent added per ffmpeg `time=` marker while converting
pub const CONVERSION_NUDGE: f64 = 0.1;
/// Conversion nudges never reach completion
pub const CONVERSION_CEILING: f64 = 99.0;

static FULL_DOWNLOAD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\[download\]\s+(\d+\.?\d*)%\s+of\s+~?\s*(\d+\.?\d*)(\w+)\s+at\s+(\S+/s)\s+ETA\s+(\S+)",
    )
    .expect("download progress regex")
});

static SIMPLE_DOWNLOAD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\[download\]\s+(\d+\.?\d*)%\s+of\s+~?\s*(\d+\.?\d*\w+)")
        .expect("download progress regex")
});

static FFMPEG_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"time=(\d{2}):(\d{2}):(\d{2})")
        .expect("ffmpeg time regex")
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPhase {
    #[default]
    Downloading,
    Converting,
}

/// Best-effort progress of the running job. Percent may move backwards
/// (e.g. when yt-dlp starts the audio stream after the video stream).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressState {
    pub percent: f64,
    pub total_size: Option<String>,
    pub downloaded_size: Option<String>,
    pub speed: Option<String>,
    pub eta: Option<String>,
    pub phase: JobPhase,
}

/// What a single output line says, if anything
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedLine {
    Download {
        percent: f64,
        total_size: String,
        downloaded_size: String,
        speed: String,
        eta: String,
    },
    DownloadSimple {
        percent: f64,
        total_size: String,
    },
    /// Post-processing started (`[ExtractAudio]`, `[Merger]`, `Destination:`)
    Converting,
    /// ffmpeg reported a `time=` position
    ConversionTick,
}

/// Classify one line; the first matching rule wins
pub fn parse_line(line: &str) -> Option<ParsedLine> {
    if let Some(caps) = FULL_DOWNLOAD.captures(line) {
        let percent: f64 = caps[1].parse().ok()?;
        let total_number: f64 = caps[2].parse().ok()?;
        let unit = &caps[3];
        return Some(ParsedLine::Download {
            percent,
            total_size: format!("{}{}", &caps[2], unit),
            downloaded_size: format!("{:.1}{}", percent / 100.0 * total_number, unit),
            speed: caps[4].to_string(),
            eta: caps[5].to_string(),
        });
    }

    if let Some(caps) = SIMPLE_DOWNLOAD.captures(line) {
        return Some(ParsedLine::DownloadSimple {
            percent: caps[1].parse().ok()?,
            total_size: caps[2].to_string(),
        });
    }

    if line.contains("[ExtractAudio]") || line.contains("[Merger]") || line.contains("Destination:")
    {
        return Some(ParsedLine::Converting);
    }

    if FFMPEG_TIME.is_match(line) {
        return Some(ParsedLine::ConversionTick);
    }

    None
}

/// Folds parsed lines into a running `ProgressState`
#[derive(Debug, Default)]
pub struct ProgressParser {
    state: ProgressState,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ProgressState {
        &self.state
    }

    /// Apply one line; returns the new state when the line carried progress
    pub fn feed(&mut self, line: &str) -> Option<&ProgressState> {
        match parse_line(line)? {
            ParsedLine::Download {
                percent,
                total_size,
                downloaded_size,
                speed,
                eta,
            } => {
                self.state.percent = percent;
                self.state.total_size = Some(total_size);
                self.state.downloaded_size = Some(downloaded_size);
                self.state.speed = Some(speed);
                self.state.eta = Some(eta);
                self.state.phase = JobPhase::Downloading;
            }
            ParsedLine::DownloadSimple {
                percent,
                total_size,
            } => {
                self.state.percent = percent;
                self.state.total_size = Some(total_size);
                self.state.phase = JobPhase::Downloading;
            }
            ParsedLine::Converting => {
                self.state.phase = JobPhase::Converting;
            }
            ParsedLine::ConversionTick => {
                self.state.phase = JobPhase::Converting;
                self.state.percent = (self.state.percent + CONVERSION_NUDGE).min(CONVERSION_CEILING);
            }
        }
        Some(&self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_download_line_yields_every_label() {
        let parsed = parse_line("[download]  45.2% of ~100.00MiB at 5.00MiB/s ETA 00:10");
        assert_eq!(
            parsed,
            Some(ParsedLine::Download {
                percent: 45.2,
                total_size: "100.00MiB".into(),
                downloaded_size: "45.2MiB".into(),
                speed: "5.00MiB/s".into(),
                eta: "00:10".into(),
            })
        );
    }

    #[test]
    fn line_without_speed_falls_back_to_simple_match() {
        assert_eq!(
            parse_line("[download] 100% of 12.34MiB in 00:00:03"),
            Some(ParsedLine::DownloadSimple {
                percent: 100.0,
                total_size: "12.34MiB".into(),
            })
        );
    }

    #[test]
    fn unknown_speed_falls_back_to_simple_match() {
        let parsed = parse_line("[download]   0.0% of   50.00MiB at  Unknown B/s ETA Unknown");
        assert!(matches!(parsed, Some(ParsedLine::DownloadSimple { .. })));
    }

    #[test]
    fn conversion_markers_switch_phase() {
        assert_eq!(
            parse_line("[ExtractAudio] Destination: song.mp3"),
            Some(ParsedLine::Converting)
        );
        assert_eq!(
            parse_line("[Merger] Merging formats into \"clip.mp4\""),
            Some(ParsedLine::Converting)
        );
        assert_eq!(
            parse_line("frame=  120 fps=30 size=1024kB time=00:00:04.00 bitrate=2000kbits/s"),
            Some(ParsedLine::ConversionTick)
        );
        assert_eq!(parse_line("[youtube] abc: Downloading webpage"), None);
    }

    #[test]
    fn conversion_ticks_are_capped_below_completion() {
        let mut parser = ProgressParser::new();
        parser.feed("[download]  98.95% of 10.00MiB at 1.00MiB/s ETA 00:00");
        for _ in 0..50 {
            parser.feed("time=00:00:01");
        }
        assert_eq!(parser.state().phase, JobPhase::Converting);
        assert_eq!(parser.state().percent, CONVERSION_CEILING);
    }

    #[test]
    fn plain_lines_do_not_touch_state() {
        let mut parser = ProgressParser::new();
        assert!(parser.feed("Some Video Title").is_none());
        assert_eq!(parser.state(), &ProgressState::default());
    }
}
