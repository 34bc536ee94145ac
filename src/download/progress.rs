//! Download progress sampling and aggregation

use std::time::{Duration, Instant};

use serde::Serialize;

/// Minimum spacing between two progress samples of one download (~10 Hz)
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Percent value meaning "bytes are flowing but the total is unknown"
pub const INDETERMINATE: i32 = -1;

/// One progress sample of a download
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadProgress {
    /// 0-100, or `INDETERMINATE` when the server sent no content length
    pub percent: i32,
    pub downloaded: u64,
    /// 0 when unknown
    pub total: u64,
    /// Cumulative average since the attempt started, not an instantaneous rate
    pub bytes_per_second: f64,
}

impl DownloadProgress {
    pub fn sample(downloaded: u64, total: u64, elapsed: Duration) -> Self {
        let secs = elapsed.as_secs_f64();
        Self {
            percent: percent_of(downloaded, total),
            downloaded,
            total,
            bytes_per_second: if secs > 0.0 {
                downloaded as f64 / secs
            } else {
                0.0
            },
        }
    }
}

fn percent_of(downloaded: u64, total: u64) -> i32 {
    if total == 0 {
        return INDETERMINATE;
    }
    let pct = (downloaded as f64 / total as f64 * 100.0).round();
    pct.clamp(0.0, 100.0) as i32
}

/// Map a 0-100 percent into the `[lo, hi]` slice of an overall operation.
/// Indeterminate input stays indeterminate.
pub fn map_percent(percent: i32, lo: i32, hi: i32) -> i32 {
    if percent < 0 {
        return INDETERMINATE;
    }
    let span = (hi - lo) as f64;
    lo + (percent.min(100) as f64 * span / 100.0).round() as i32
}

/// Time gate for progress emission
#[derive(Debug)]
pub struct ProgressThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl ProgressThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Returns true (and arms the gate) when enough time has passed since the last emission
    pub fn ready(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

impl Default for ProgressThrottle {
    fn default() -> Self {
        Self::new(PROGRESS_INTERVAL)
    }
}

/// Merges several concurrently running downloads into one progress figure.
///
/// Bytes, totals and speeds are summed across the latest snapshot of every
/// stream. The percent stays indeterminate until every stream has reported
/// its total, so a stream that finishes early cannot inflate it, and it never
/// moves backwards afterwards.
#[derive(Debug)]
pub struct CombinedProgress {
    streams: Vec<DownloadProgress>,
    finished: Vec<bool>,
    high_water: i32,
}

impl CombinedProgress {
    pub fn new(streams: usize) -> Self {
        Self {
            streams: vec![DownloadProgress::default(); streams],
            finished: vec![false; streams],
            high_water: 0,
        }
    }

    /// Record a snapshot for stream `index` and return the combined figure
    pub fn update(&mut self, index: usize, progress: DownloadProgress) -> DownloadProgress {
        if let Some(slot) = self.streams.get_mut(index) {
            *slot = progress;
        }
        self.combined()
    }

    /// Mark a stream done: its bytes keep counting, its speed no longer does
    pub fn finish(&mut self, index: usize) -> DownloadProgress {
        if let Some(done) = self.finished.get_mut(index) {
            *done = true;
        }
        self.combined()
    }

    pub fn combined(&mut self) -> DownloadProgress {
        let downloaded = self.streams.iter().map(|s| s.downloaded).sum();
        let total = self.streams.iter().map(|s| s.total).sum();
        let bytes_per_second = self
            .streams
            .iter()
            .zip(&self.finished)
            .filter(|(_, done)| !**done)
            .map(|(s, _)| s.bytes_per_second)
            .sum();

        let all_totals_known = self.streams.iter().all(|s| s.total > 0);
        let percent = match percent_of(downloaded, total) {
            INDETERMINATE => INDETERMINATE,
            _ if !all_totals_known => INDETERMINATE,
            pct => {
                self.high_water = self.high_water.max(pct);
                self.high_water
            }
        };

        DownloadProgress {
            percent,
            downloaded,
            total,
            bytes_per_second,
        }
    }
}

/// Human-readable `12.3MB / 45.6MB (1.2 MB/s)` detail line
pub fn format_progress_details(progress: &DownloadProgress) -> String {
    const MB: f64 = 1024.0 * 1024.0;
    let downloaded = progress.downloaded as f64 / MB;
    let speed = progress.bytes_per_second / MB;
    if progress.total > 0 {
        format!(
            "{:.1}MB / {:.1}MB ({:.1} MB/s)",
            downloaded,
            progress.total as f64 / MB,
            speed
        )
    } else {
        format!("{downloaded:.1}MB ({speed:.1} MB/s)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_total_is_indeterminate_but_keeps_bytes_and_speed() {
        let p = DownloadProgress::sample(2048, 0, Duration::from_secs(2));
        assert_eq!(p.percent, INDETERMINATE);
        assert_eq!(p.downloaded, 2048);
        assert_eq!(p.bytes_per_second, 1024.0);
    }

    #[test]
    fn speed_is_cumulative_average() {
        let p = DownloadProgress::sample(500, 1000, Duration::from_millis(250));
        assert_eq!(p.percent, 50);
        assert_eq!(p.bytes_per_second, 2000.0);
    }

    #[test]
    fn percent_is_clamped_when_server_over_delivers() {
        assert_eq!(DownloadProgress::sample(1200, 1000, Duration::from_secs(1)).percent, 100);
    }

    #[test]
    fn throttle_gates_by_time() {
        let mut throttle = ProgressThrottle::new(Duration::from_millis(100));
        let t0 = Instant::now();
        assert!(throttle.ready(t0));
        assert!(!throttle.ready(t0 + Duration::from_millis(50)));
        assert!(throttle.ready(t0 + Duration::from_millis(120)));
    }

    #[test]
    fn map_percent_slices_ranges() {
        assert_eq!(map_percent(50, 0, 20), 10);
        assert_eq!(map_percent(100, 20, 100), 100);
        assert_eq!(map_percent(0, 20, 100), 20);
        assert_eq!(map_percent(INDETERMINATE, 20, 100), INDETERMINATE);
    }

    #[test]
    fn combined_progress_sums_streams() {
        let mut combined = CombinedProgress::new(2);
        combined.update(0, DownloadProgress { percent: 50, downloaded: 50, total: 100, bytes_per_second: 10.0 });
        let p = combined.update(1, DownloadProgress { percent: 10, downloaded: 30, total: 300, bytes_per_second: 5.0 });
        assert_eq!(p.downloaded, 80);
        assert_eq!(p.total, 400);
        assert_eq!(p.percent, 20);
        assert_eq!(p.bytes_per_second, 15.0);
    }

    #[test]
    fn early_finishing_stream_does_not_regress_combined_percent() {
        let mut combined = CombinedProgress::new(2);
        // Small stream reports first and completes before the large one has a total
        let first = combined.update(0, DownloadProgress { percent: 100, downloaded: 10, total: 10, bytes_per_second: 8.0 });
        assert_eq!(first.percent, INDETERMINATE);
        assert_eq!(first.downloaded, 10);
        combined.finish(0);

        let mut last = 0;
        for done in [1u64, 200, 500, 990] {
            let p = combined.update(1, DownloadProgress { percent: 0, downloaded: done, total: 990, bytes_per_second: 2.0 });
            assert!(p.percent >= last, "combined percent regressed: {} < {}", p.percent, last);
            last = p.percent;
            assert_eq!(p.bytes_per_second, 2.0);
            assert_eq!(p.total, 1000);
        }
        assert_eq!(last, 100);
    }

    #[test]
    fn details_mention_total_only_when_known() {
        let known = DownloadProgress { percent: 50, downloaded: 1024 * 1024, total: 2 * 1024 * 1024, bytes_per_second: 1024.0 * 1024.0 };
        assert_eq!(format_progress_details(&known), "1.0MB / 2.0MB (1.0 MB/s)");
        let unknown = DownloadProgress { total: 0, percent: INDETERMINATE, ..known };
        assert_eq!(format_progress_details(&unknown), "1.0MB (1.0 MB/s)");
    }
}
