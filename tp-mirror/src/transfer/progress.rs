//! File-count progress tracking for mirror downloads.
//!
//! Progress moves only when a worker reports completed files, never on a timer.

use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

/// Running count of completed files
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileProgress {
    /// Total number of files
    pub total: usize,

    /// Number of files completed so far
    pub completed: usize,
}

impl FileProgress {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: 0,
        }
    }

    /// Record completed files
    pub fn record(&mut self, count: usize) {
        self.completed += count;
    }

    /// Percentage complete (0-100)
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.completed as f64 / self.total as f64 * 100.0).min(100.0)
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completed >= self.total
    }
}

/// Receiver of aggregated download progress
pub trait ProgressSink: Send {
    fn start(&mut self, total: usize);
    fn advance(&mut self, count: usize);
    fn finish(&mut self);
    fn abandon(&mut self);
}

/// Discards all progress
#[derive(Debug, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn start(&mut self, _total: usize) {}
    fn advance(&mut self, _count: usize) {}
    fn finish(&mut self) {}
    fn abandon(&mut self) {}
}

/// Terminal progress bar
#[derive(Default)]
pub struct ConsoleProgress {
    bar: Option<ProgressBar>,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressSink for ConsoleProgress {
    fn start(&mut self, total: usize) {
        let bar = ProgressBar::new(total as u64);
        let style = ProgressStyle::with_template(
            "{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} files ({percent}%)",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
        bar.set_style(style);
        self.bar = Some(bar);
    }

    fn advance(&mut self, count: usize) {
        if let Some(bar) = &self.bar {
            bar.inc(count as u64);
        }
    }

    fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish();
        }
    }

    fn abandon(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.abandon();
        }
    }
}

/// Logs progress every ten percent
#[derive(Debug, Default)]
pub struct LogProgress {
    progress: FileProgress,
    last_decile: u8,
}

impl LogProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn progress(&self) -> &FileProgress {
        &self.progress
    }
}

impl ProgressSink for LogProgress {
    fn start(&mut self, total: usize) {
        self.progress = FileProgress::new(total);
        self.last_decile = 0;
    }

    fn advance(&mut self, count: usize) {
        self.progress.record(count);
        let decile = (self.progress.percent() / 10.0) as u8;
        if decile > self.last_decile {
            self.last_decile = decile;
            info!(
                "Downloaded {}/{} files ({:.0}%)",
                self.progress.completed,
                self.progress.total,
                self.progress.percent()
            );
        }
    }

    fn finish(&mut self) {}

    fn abandon(&mut self) {
        info!(
            "Download abandoned after {}/{} files",
            self.progress.completed, self.progress.total
        );
    }
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}
