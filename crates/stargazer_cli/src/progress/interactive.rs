use std::sync::Mutex;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use stargazer::CollectProgress;

use super::{format_wait, resume_summary};

/// Consolidated progress state to avoid multiple mutex locks.
#[derive(Default)]
struct ProgressState {
    /// Spinner for the stargazer list pages.
    fetch_bar: Option<ProgressBar>,
    /// Counter (or bar, when capped) for profile lookups.
    enrich_bar: Option<ProgressBar>,
    /// Stargazers skipped as already processed.
    skipped: usize,
    /// Stargazers dropped after a failed profile lookup.
    failed: usize,
}

/// Interactive progress reporter using indicatif.
pub struct InteractiveReporter {
    multi: MultiProgress,
    state: Mutex<ProgressState>,
}

impl InteractiveReporter {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            state: Mutex::new(ProgressState::default()),
        }
    }

    /// The bar that should show a wait, preferring the profile bar.
    fn active_bar(state: &ProgressState) -> Option<&ProgressBar> {
        state
            .enrich_bar
            .as_ref()
            .filter(|pb| !pb.is_finished())
            .or_else(|| state.fetch_bar.as_ref().filter(|pb| !pb.is_finished()))
    }

    pub fn handle(&self, event: CollectProgress) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        match event {
            CollectProgress::Resuming {
                known_count,
                watermark,
                cap,
            } => {
                for line in resume_summary(known_count, watermark, cap) {
                    self.multi.println(line).ok();
                }

                let fetch = self.multi.add(ProgressBar::new_spinner());
                fetch.set_style(Self::spinner_style());
                fetch.set_prefix(format!("{:10}", "pages"));
                fetch.enable_steady_tick(Duration::from_millis(100));
                fetch.set_message("Fetching stargazers...");

                let enrich = match cap {
                    Some(cap) => {
                        let bar = self.multi.add(ProgressBar::new(cap as u64));
                        bar.set_style(Self::bar_style());
                        bar
                    }
                    None => {
                        let bar = self.multi.add(ProgressBar::new_spinner());
                        bar.set_style(Self::counter_style());
                        bar.enable_steady_tick(Duration::from_millis(100));
                        bar
                    }
                };
                enrich.set_prefix(format!("{:10}", "profiles"));
                enrich.set_message("Waiting for new stargazers...");

                state.fetch_bar = Some(fetch);
                state.enrich_bar = Some(enrich);
                state.skipped = 0;
                state.failed = 0;
            }

            CollectProgress::FetchingPage { page } => {
                if let Some(ref pb) = state.fetch_bar {
                    pb.set_message(format!("Fetching page {}...", page));
                }
            }

            CollectProgress::FetchedPage {
                page, total_so_far, ..
            } => {
                if let Some(ref pb) = state.fetch_bar {
                    pb.set_message(format!("page {} ({} stargazers)", page, total_so_far));
                }
            }

            CollectProgress::FetchExhausted { page } => {
                if let Some(ref pb) = state.fetch_bar {
                    let pages = page.saturating_sub(1);
                    pb.finish_with_message(format!("✓ all pages read ({} pages)", pages));
                }
            }

            CollectProgress::FetchAborted {
                page,
                status,
                message,
            } => {
                if let Some(ref pb) = state.fetch_bar {
                    let reason = match status {
                        Some(code) => format!("HTTP {}", code),
                        None => message.clone(),
                    };
                    pb.abandon_with_message(format!("✗ stopped at page {}: {}", page, reason));
                }
                if status.is_some() && !message.is_empty() {
                    self.multi.println(format!("  {}", message)).ok();
                }
            }

            CollectProgress::QuotaLow { remaining, wait_ms } => {
                if let Some(pb) = Self::active_bar(&state) {
                    pb.set_message(format!(
                        "⏳ {} requests left, waiting {}",
                        remaining,
                        format_wait(wait_ms)
                    ));
                }
            }

            CollectProgress::RateLimited {
                status,
                wait_ms,
                attempt,
            } => {
                if let Some(pb) = Self::active_bar(&state) {
                    pb.set_message(format!(
                        "⏳ rate limited (HTTP {}, attempt {}), waiting {}",
                        status,
                        attempt,
                        format_wait(wait_ms)
                    ));
                }
            }

            CollectProgress::NetworkRetry {
                error,
                wait_ms,
                attempt,
            } => {
                if let Some(pb) = Self::active_bar(&state) {
                    pb.set_message(format!(
                        "⚠ network error (attempt {}), retrying in {}: {}",
                        attempt,
                        format_wait(wait_ms),
                        error
                    ));
                }
            }

            CollectProgress::AlreadyProcessed { .. } => {
                state.skipped += 1;
            }

            CollectProgress::ProcessingStargazer { ordinal, username } => {
                if let Some(ref pb) = state.enrich_bar {
                    pb.set_message(format!("#{} {}", ordinal, username));
                }
            }

            CollectProgress::StargazerAccepted { new_so_far, .. } => {
                if let Some(ref pb) = state.enrich_bar {
                    pb.set_position(new_so_far as u64);
                }
            }

            CollectProgress::DetailFailed {
                username, message, ..
            } => {
                state.failed += 1;
                self.multi
                    .println(format!("  ✗ skipped {}: {}", username, message))
                    .ok();
            }

            CollectProgress::CapReached { cap } => {
                if let Some(ref pb) = state.enrich_bar {
                    pb.finish_with_message(format!("✓ reached the limit of {}", cap));
                }
                if let Some(ref pb) = state.fetch_bar
                    && !pb.is_finished()
                {
                    pb.finish_with_message("✓ stopped paging");
                }
            }

            CollectProgress::Interrupted { new_so_far } => {
                if let Some(ref pb) = state.enrich_bar {
                    pb.abandon_with_message(format!("⚠ interrupted after {} new", new_so_far));
                }
                if let Some(ref pb) = state.fetch_bar
                    && !pb.is_finished()
                {
                    pb.abandon_with_message("⚠ interrupted");
                }
            }

            CollectProgress::SnapshotWritten {
                path,
                appended,
                total,
            } => {
                if let Some(ref pb) = state.enrich_bar
                    && !pb.is_finished()
                {
                    pb.finish_with_message(format!("✓ {} new stargazers", appended));
                }
                if state.skipped > 0 || state.failed > 0 {
                    self.multi
                        .println(format!(
                            "  {} already processed, {} skipped after errors",
                            state.skipped, state.failed
                        ))
                        .ok();
                }
                tracing::debug!(path = %path.display(), total, "Snapshot written");
            }

            _ => {}
        }
    }

    pub fn finish(&self) {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(ref pb) = state.fetch_bar
            && !pb.is_finished()
        {
            pb.finish();
        }
        if let Some(ref pb) = state.enrich_bar
            && !pb.is_finished()
        {
            pb.finish();
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{prefix:.bold.cyan} {spinner:.green} {msg}")
            .expect("Invalid template")
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
    }

    fn counter_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{prefix:.bold.cyan} {spinner:.green} {pos:>4} {msg}")
            .expect("Invalid template")
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{prefix:.bold.cyan} [{bar:40.cyan/blue}] {pos:>3}/{len:3} {msg}")
            .expect("Invalid template")
            .progress_chars("█▓░")
    }
}

impl Default for InteractiveReporter {
    fn default() -> Self {
        Self::new()
    }
}
