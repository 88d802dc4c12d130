//! Progress reporting for downloads.

pub mod progress;

pub use progress::{ConsoleProgress, FileProgress, LogProgress, NoProgress, ProgressSink};
