//! Progress tracking for downloads

use std::time::{Duration, Instant};

/// Snapshot reported to the presentation layer after every chunk
#[derive(Debug, Clone)]
pub struct Progress {
    /// Total size of the file in bytes
    pub total_size: u64,
    /// Bytes on disk, including the resumed prefix
    pub downloaded_size: u64,
    /// Completion percentage, rounded down to one decimal
    pub percent: f64,
    /// Throughput of the current fragment in bytes per second
    pub speed: Option<f64>,
}

impl Progress {
    pub fn new(total_size: u64) -> Self {
        Self {
            total_size,
            downloaded_size: 0,
            percent: 0.0,
            speed: None,
        }
    }

    /// Update progress with new downloaded size
    pub fn update(&mut self, downloaded_size: u64) {
        self.downloaded_size = downloaded_size.min(self.total_size);
        self.percent = percent_of(self.downloaded_size, self.total_size);
    }

    pub fn is_complete(&self) -> bool {
        self.total_size > 0 && self.downloaded_size >= self.total_size
    }

    pub fn speed_string(&self) -> String {
        self.speed
            .map(format_speed)
            .unwrap_or_else(|| "Unknown".to_string())
    }
}

/// Throughput within one fragment, measured from the fragment's start
#[derive(Debug, Clone)]
pub struct FragmentTimer {
    started: Instant,
    bytes: u64,
}

impl FragmentTimer {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            bytes: 0,
        }
    }

    pub fn record(&mut self, bytes: u64) {
        self.bytes += bytes;
    }

    pub fn speed(&self) -> Option<f64> {
        speed_of(self.bytes, self.started.elapsed())
    }
}

/// Percentage rounded down to one decimal place
pub fn percent_of(done: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (done.min(total) as f64 / total as f64 * 1000.0).floor() / 10.0
}

pub fn speed_of(bytes: u64, elapsed: Duration) -> Option<f64> {
    let secs = elapsed.as_secs_f64();
    (secs > 0.0).then(|| bytes as f64 / secs)
}

/// Format a throughput as B/s, KB/s or MB/s
pub fn format_speed(bytes_per_second: f64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = 1024.0 * 1024.0;

    if bytes_per_second < KB {
        format!("{:.2}B/s", bytes_per_second)
    } else if bytes_per_second < MB {
        format!("{:.2}KB/s", bytes_per_second / KB)
    } else {
        format!("{:.2}MB/s", bytes_per_second / MB)
    }
}

/// Format a byte count in MB with two decimals
pub fn format_megabytes(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
}
