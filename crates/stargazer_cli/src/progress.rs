//! Progress reporting for collection runs.
//!
//! This module provides two modes of progress reporting:
//! - Interactive mode (TTY): Spinners and a profile bar using indicatif
//! - Logging mode (non-TTY): Structured logging using tracing

mod interactive;
mod logging;

use std::sync::Arc;
use std::time::Duration;

use console::Term;
use stargazer::{CollectProgress, ProgressCallback};

pub use interactive::InteractiveReporter;
pub use logging::LoggingReporter;

/// Progress reporter that handles both interactive and logging modes.
pub enum ProgressReporter {
    /// Interactive progress bars for TTY.
    Interactive(InteractiveReporter),
    /// Structured logging for non-TTY (CI, pipes).
    Logging(LoggingReporter),
}

impl ProgressReporter {
    /// Create a new progress reporter, auto-detecting TTY mode.
    pub fn new() -> Self {
        if Term::stdout().is_term() {
            Self::Interactive(InteractiveReporter::new())
        } else {
            Self::Logging(LoggingReporter::new())
        }
    }

    /// Handle a progress event.
    pub fn handle(&self, event: CollectProgress) {
        match self {
            Self::Interactive(r) => r.handle(event),
            Self::Logging(r) => r.handle(event),
        }
    }

    /// Convert to a ProgressCallback for the library.
    pub fn as_callback(self: &Arc<Self>) -> Arc<ProgressCallback> {
        let reporter = Arc::clone(self);
        Arc::new(Box::new(move |event| {
            reporter.handle(event);
        }))
    }

    /// Finish all progress bars (interactive mode only).
    pub fn finish(&self) {
        if let Self::Interactive(r) = self {
            r.finish();
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a wait in a human-readable way.
pub(crate) fn format_wait(wait_ms: u64) -> String {
    let total_secs = Duration::from_millis(wait_ms).as_secs();
    if total_secs < 60 {
        format!("{}s", total_secs)
    } else if total_secs < 3600 {
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        if secs > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}m", mins)
        }
    } else {
        let hours = total_secs / 3600;
        let mins = (total_secs % 3600) / 60;
        if mins > 0 {
            format!("{}h {}m", hours, mins)
        } else {
            format!("{}h", hours)
        }
    }
}

/// The "already processed" / "will fetch" lines shown before a run.
pub(crate) fn resume_summary(
    known_count: usize,
    watermark: Option<chrono::DateTime<chrono::Utc>>,
    cap: Option<usize>,
) -> Vec<String> {
    let mut lines = Vec::new();
    if known_count > 0 {
        let until = watermark
            .map(|w| stargazer::record::format_timestamp(&w))
            .unwrap_or_else(|| "unknown".to_string());
        lines.push(format!(
            "Already processed {known_count} stargazers (until {until})"
        ));
    }
    match cap {
        Some(cap) => lines.push(format!("Fetching the next {cap} stargazers")),
        None => lines.push("Fetching the remaining stargazers".to_string()),
    }
    lines
}
