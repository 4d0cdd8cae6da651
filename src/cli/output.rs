//! Output formatting and progress display

use crate::cli::args::VerbosityLevel;
use crate::core::downloader::ItemOutcome;
use crate::core::progress::{format_megabytes, Progress};
use crate::core::video::VideoDescriptor;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

const BAR_TEMPLATE: &str = "|{bar:60.green}| {msg}";

/// Output formatter for vidl
pub struct OutputFormatter {
    verbosity: VerbosityLevel,
    show_progress: bool,
    progress_bar: Mutex<Option<ProgressBar>>,
}

impl OutputFormatter {
    /// Create a new output formatter
    pub fn new(verbosity: VerbosityLevel, show_progress: bool) -> Self {
        Self {
            verbosity,
            show_progress: show_progress && verbosity != VerbosityLevel::Quiet,
            progress_bar: Mutex::new(None),
        }
    }

    fn bar(&self) -> MutexGuard<'_, Option<ProgressBar>> {
        self.progress_bar
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn quiet(&self) -> bool {
        self.verbosity == VerbosityLevel::Quiet
    }

    /// Print the `[i/n]` status line and video details before an item
    pub fn begin_item(&self, index: usize, total: usize, video: &VideoDescriptor) {
        self.finish_progress();
        if self.quiet() {
            return;
        }

        println!("Downloading: {}", format!("[{}/{}]", index, total).cyan());
        println!("Video ID   : {}", video.id.cyan());
        println!("Video Name : {}", video.title.yellow());
        if let Some(collection) = &video.collection {
            println!("Collection : {}", collection);
        }
    }

    /// Update progress bar, creating it on the first report of an item
    pub fn update_progress(&self, progress: &Progress) {
        if !self.show_progress {
            return;
        }

        let mut bar = self.bar();
        let bar = bar.get_or_insert_with(|| {
            let style = ProgressStyle::default_bar()
                .template(BAR_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█ ");
            let bar = ProgressBar::new(progress.total_size);
            bar.set_style(style);
            bar
        });

        bar.set_length(progress.total_size);
        bar.set_position(progress.downloaded_size);
        bar.set_message(progress_message(progress));
    }

    /// Finish progress bar
    pub fn finish_progress(&self) {
        if let Some(bar) = self.bar().take() {
            bar.finish();
        }
    }

    /// Report how an item ended
    pub fn finish_item(&self, outcome: &ItemOutcome) {
        self.finish_progress();
        if self.quiet() {
            return;
        }

        match outcome {
            ItemOutcome::Skipped { path, size } => println!(
                "Destination: {} ({}, already complete)",
                path.display(),
                format_megabytes(*size)
            ),
            ItemOutcome::Downloaded { path, bytes } => println!(
                "Destination: {} ({} fetched)",
                path.display(),
                format_megabytes(*bytes)
            ),
            ItemOutcome::Remuxed { path, size } => println!(
                "Destination: {} ({}, remuxed)",
                path.display(),
                format_megabytes(*size)
            ),
            ItemOutcome::NotFound => println!("{}", "Not found, skipped".yellow()),
        }
        println!();
    }

    /// Print info message
    pub fn info(&self, message: &str) {
        if !self.quiet() {
            println!("{}", message);
        }
    }

    /// Print success message
    pub fn success(&self, message: &str) {
        if !self.quiet() {
            println!("{}", message.green());
        }
    }

    /// Print warning message
    pub fn warning(&self, message: &str) {
        if !self.quiet() {
            eprintln!("{}", message.yellow());
        }
    }

    /// Print error message
    pub fn error(&self, message: &str) {
        self.finish_progress();
        eprintln!("{}", message.red());
    }
}

/// Create a progress callback for the downloader
pub fn create_progress_callback(
    formatter: Arc<OutputFormatter>,
) -> impl Fn(Progress) + Send + Sync + 'static {
    move |progress: Progress| {
        formatter.update_progress(&progress);
    }
}

/// `  42.1% 1.50MB/s`
pub fn progress_message(progress: &Progress) -> String {
    match progress.speed {
        Some(_) => format!("{:5.1}% {}", progress.percent, progress.speed_string()),
        None => format!("{:5.1}%", progress.percent),
    }
}

/// Format duration as human-readable string
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    if total_seconds < 60 {
        format!("{}s", total_seconds)
    } else if total_seconds < 3600 {
        let minutes = total_seconds / 60;
        let seconds = total_seconds % 60;
        if seconds == 0 {
            format!("{}m", minutes)
        } else {
            format!("{}m {}s", minutes, seconds)
        }
    } else {
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        if minutes == 0 {
            format!("{}h", hours)
        } else {
            format!("{}h {}m", hours, minutes)
        }
    }
}
