use stargazer::CollectProgress;

use super::{format_wait, resume_summary};

/// Logging reporter using tracing for structured output.
pub struct LoggingReporter;

impl LoggingReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, event: CollectProgress) {
        match event {
            CollectProgress::Resuming {
                known_count,
                watermark,
                cap,
            } => {
                for line in resume_summary(known_count, watermark, cap) {
                    tracing::info!("{}", line);
                }
            }

            CollectProgress::FetchingPage { page } => {
                tracing::debug!(page, "Fetching page");
            }

            CollectProgress::FetchedPage {
                page,
                count,
                total_so_far,
            } => {
                tracing::info!(page, count, total_so_far, "Fetched page");
            }

            CollectProgress::FetchExhausted { page } => {
                tracing::debug!(page, "No more stargazers");
            }

            CollectProgress::FetchAborted {
                page,
                status,
                message,
            } => {
                tracing::warn!(
                    page,
                    status = ?status,
                    message = %message,
                    "Stopped fetching pages"
                );
            }

            CollectProgress::QuotaLow { remaining, wait_ms } => {
                tracing::info!(
                    remaining,
                    wait = %format_wait(wait_ms),
                    "Rate limit nearly exceeded, waiting"
                );
            }

            CollectProgress::RateLimited {
                status,
                wait_ms,
                attempt,
            } => {
                tracing::warn!(
                    status,
                    attempt,
                    wait = %format_wait(wait_ms),
                    "Rate limited, waiting for reset"
                );
            }

            CollectProgress::NetworkRetry {
                error,
                wait_ms,
                attempt,
            } => {
                tracing::warn!(
                    error = %error,
                    attempt,
                    wait = %format_wait(wait_ms),
                    "Network error, retrying"
                );
            }

            CollectProgress::AlreadyProcessed { username } => {
                tracing::debug!(username = %username, "Already processed stargazer");
            }

            CollectProgress::ProcessingStargazer { ordinal, username } => {
                tracing::info!(ordinal, username = %username, "Processing stargazer");
            }

            CollectProgress::StargazerAccepted {
                username,
                new_so_far,
            } => {
                tracing::debug!(username = %username, new_so_far, "Stargazer added");
            }

            CollectProgress::DetailFailed {
                username,
                status,
                message,
            } => {
                tracing::warn!(
                    username = %username,
                    status = ?status,
                    message = %message,
                    "Skipped stargazer"
                );
            }

            CollectProgress::CapReached { cap } => {
                tracing::info!(cap, "Reached the limit of new stargazers");
            }

            CollectProgress::Interrupted { new_so_far } => {
                tracing::warn!(new_so_far, "Interrupted, saving what was collected");
            }

            CollectProgress::SnapshotWritten {
                path,
                appended,
                total,
            } => {
                tracing::info!(path = %path.display(), appended, total, "Data saved");
            }

            _ => {}
        }
    }
}

impl Default for LoggingReporter {
    fn default() -> Self {
        Self::new()
    }
}
