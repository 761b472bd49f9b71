//! One collection run for a repository.
//!
//! Pages flow from the [`PageCursor`] into the [`Enricher`] one at a time.
//! When the enricher has accepted as many stargazers as the cap allows, no
//! further page is requested. The snapshot is written once, at the end.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::enrich::{EnrichStep, Enricher, RunState};
use crate::fetch::{PageCursor, PageOutcome};
use crate::github::GitHubClient;
use crate::progress::{CollectProgress, ProgressCallback, emit};
use crate::quota::QuotaState;
use crate::snapshot::{SnapshotError, SnapshotStore, merge};

/// What to collect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectOptions {
    pub owner: String,
    pub repo: String,
    /// Maximum new stargazers to accept this run.
    pub cap: Option<usize>,
}

impl CollectOptions {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            cap: None,
        }
    }

    #[must_use]
    pub fn with_cap(mut self, cap: Option<usize>) -> Self {
        self.cap = cap;
        self
    }
}

/// Why a run stopped reading the stargazer list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectStop {
    /// Every page was read.
    Exhausted,
    /// The cap on new stargazers was met.
    CapReached,
    /// A page failed; what was accepted before it is kept.
    Aborted {
        status: Option<u16>,
        message: String,
    },
    /// A stop was requested.
    Interrupted,
}

/// Summary of a finished run.
#[derive(Debug, Clone)]
pub struct CollectReport {
    /// Artifact written by this run.
    pub path: PathBuf,
    /// Artifact the run resumed from.
    pub prior_path: Option<PathBuf>,
    /// Rows in the prior artifact.
    pub prior_count: usize,
    /// Rows added by this run.
    pub new_count: usize,
    /// Rows in the written artifact.
    pub total: usize,
    /// Watermark of the written artifact.
    pub watermark: Option<DateTime<Utc>>,
    pub stop: CollectStop,
    /// Quota reported with the last request.
    pub quota: Option<QuotaState>,
}

/// Errors that abort a run.
///
/// Network and status failures never appear here; they are retried or
/// reflected in [`CollectStop`].
#[derive(Debug, Error)]
pub enum CollectError {
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error("Invalid options: {0}")]
    InvalidOptions(String),
}

fn validate(options: &CollectOptions) -> Result<(), CollectError> {
    for (what, value) in [("owner", &options.owner), ("repo", &options.repo)] {
        if value.trim().is_empty() {
            return Err(CollectError::InvalidOptions(format!("{what} must not be empty")));
        }
        if value.contains('/') {
            return Err(CollectError::InvalidOptions(format!(
                "{what} must not contain '/': {value}"
            )));
        }
    }
    Ok(())
}

fn is_set(flag: Option<&Arc<AtomicBool>>) -> bool {
    flag.is_some_and(|f| f.load(Ordering::SeqCst))
}

/// Run one incremental collection for `options.owner/options.repo`.
///
/// Resumes from the latest artifact in `store` and always writes a new one,
/// even when nothing new was found. Setting `shutdown_flag` makes the run stop
/// before its next request and save what it has.
pub async fn collect_stargazers(
    client: &GitHubClient,
    store: &SnapshotStore,
    options: &CollectOptions,
    shutdown_flag: Option<Arc<AtomicBool>>,
    on_progress: Option<&ProgressCallback>,
) -> Result<CollectReport, CollectError> {
    validate(options)?;

    let prior = store.load_latest()?;
    let (prior_path, prior_snapshot) = match prior {
        Some((path, snapshot)) => (Some(path), Some(snapshot)),
        None => (None, None),
    };
    let known_count = prior_snapshot.as_ref().map_or(0, |s| s.count());
    let watermark = prior_snapshot.as_ref().and_then(|s| s.watermark());

    tracing::info!(
        owner = %options.owner,
        repo = %options.repo,
        known_count,
        watermark = ?watermark,
        cap = ?options.cap,
        "Starting stargazer collection"
    );
    emit(
        on_progress,
        CollectProgress::Resuming {
            known_count,
            watermark,
            cap: options.cap,
        },
    );

    let mut cursor = PageCursor::new(client, &options.owner, &options.repo, known_count)
        .with_progress(on_progress);
    let mut enricher = Enricher::new(client, RunState::new(watermark, known_count, options.cap))
        .with_shutdown_flag(shutdown_flag.clone())
        .with_progress(on_progress);

    let stop = loop {
        if enricher.state().cap_reached() {
            break CollectStop::CapReached;
        }
        if is_set(shutdown_flag.as_ref()) {
            emit(
                on_progress,
                CollectProgress::Interrupted {
                    new_so_far: enricher.state().new_count,
                },
            );
            break CollectStop::Interrupted;
        }

        match cursor.next_page().await {
            PageOutcome::Page(page) => match enricher.process_page(&page).await {
                EnrichStep::Continue => {}
                EnrichStep::CapReached => break CollectStop::CapReached,
                EnrichStep::Interrupted => break CollectStop::Interrupted,
            },
            PageOutcome::Exhausted => break CollectStop::Exhausted,
            // A page wait cut short by shutdown surfaces as an abort.
            PageOutcome::Aborted { .. } if is_set(shutdown_flag.as_ref()) => {
                emit(
                    on_progress,
                    CollectProgress::Interrupted {
                        new_so_far: enricher.state().new_count,
                    },
                );
                break CollectStop::Interrupted;
            }
            PageOutcome::Aborted { status, message } => {
                break CollectStop::Aborted { status, message };
            }
        }
    };

    let page_quota = cursor.last_quota();
    let outcome = enricher.finish();
    let quota = outcome.state.quota.or(page_quota);

    let path = store.write_next(prior_path.as_deref(), &outcome.records)?;
    let merged = merge(prior_snapshot.as_ref(), &outcome.records);

    tracing::info!(
        path = %path.display(),
        appended = outcome.new_count,
        total = merged.count(),
        stop = ?stop,
        "Saved stargazer snapshot"
    );
    emit(
        on_progress,
        CollectProgress::SnapshotWritten {
            path: path.clone(),
            appended: outcome.new_count,
            total: merged.count(),
        },
    );

    Ok(CollectReport {
        path,
        prior_path,
        prior_count: known_count,
        new_count: outcome.new_count,
        total: merged.count(),
        watermark: merged.watermark(),
        stop,
        quota,
    })
}
