//! Incremental filtering and profile enrichment.
//!
//! A stargazer is new when it starred strictly after the watermark of the
//! previous snapshot. Only new stargazers cost a profile request, and at most
//! `cap` of them are accepted per run.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};

use crate::executor::ExecuteError;
use crate::github::{GitHubClient, GitHubError, StarRecord, short_error_message};
use crate::progress::{CollectProgress, ProgressCallback, emit};
use crate::quota::QuotaState;
use crate::record::EnrichedRecord;

/// Transient state of one collection run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunState {
    /// Latest starred-at time already persisted.
    pub watermark: Option<DateTime<Utc>>,
    /// Rows already persisted.
    pub known_count: usize,
    /// Maximum stargazers to accept this run.
    pub cap: Option<usize>,
    /// Stargazers accepted so far.
    pub new_count: usize,
    /// Quota reported with the latest profile request.
    pub quota: Option<QuotaState>,
}

impl RunState {
    pub fn new(watermark: Option<DateTime<Utc>>, known_count: usize, cap: Option<usize>) -> Self {
        Self {
            watermark,
            known_count,
            cap,
            new_count: 0,
            quota: None,
        }
    }

    /// Whether the cap has been met.
    pub fn cap_reached(&self) -> bool {
        self.cap.is_some_and(|cap| self.new_count >= cap)
    }
}

/// What to do with one list entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Starred at or before the watermark.
    AlreadySeen,
    /// New, but the cap is already met; stop processing.
    Stop,
    /// New; fetch its profile.
    Fetch,
}

/// Classify a list entry against the watermark and the cap.
///
/// Equal timestamps count as already seen.
pub fn classify(
    record: &StarRecord,
    watermark: Option<DateTime<Utc>>,
    new_count: usize,
    cap: Option<usize>,
) -> Decision {
    if watermark.is_some_and(|mark| record.starred_at <= mark) {
        return Decision::AlreadySeen;
    }
    if cap.is_some_and(|cap| new_count >= cap) {
        return Decision::Stop;
    }
    Decision::Fetch
}

/// Outcome of feeding one page to the [`Enricher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichStep {
    /// More pages may be fed.
    Continue,
    /// The cap is met; no further pages are needed.
    CapReached,
    /// A stop was requested; no further requests should be issued.
    Interrupted,
}

/// Accepted records and how many there were.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichOutcome {
    /// Accepted records, in list order.
    pub records: Vec<EnrichedRecord>,
    pub new_count: usize,
    /// State at the end of enrichment.
    pub state: RunState,
}

/// Filters list entries and fetches profiles for the new ones.
pub struct Enricher<'a> {
    client: &'a GitHubClient,
    state: RunState,
    records: Vec<EnrichedRecord>,
    shutdown_flag: Option<Arc<AtomicBool>>,
    on_progress: Option<&'a ProgressCallback>,
}

impl<'a> Enricher<'a> {
    pub fn new(client: &'a GitHubClient, state: RunState) -> Self {
        Self {
            client,
            state,
            records: Vec::new(),
            shutdown_flag: None,
            on_progress: None,
        }
    }

    /// Stop before the next profile request once `flag` is set.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Option<Arc<AtomicBool>>) -> Self {
        self.shutdown_flag = flag;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, on_progress: Option<&'a ProgressCallback>) -> Self {
        self.on_progress = on_progress;
        self
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Process one page of list entries in order.
    pub async fn process_page(&mut self, page: &[StarRecord]) -> EnrichStep {
        for record in page {
            match classify(
                record,
                self.state.watermark,
                self.state.new_count,
                self.state.cap,
            ) {
                Decision::AlreadySeen => {
                    tracing::debug!(username = record.username(), "Already processed");
                    emit(
                        self.on_progress,
                        CollectProgress::AlreadyProcessed {
                            username: record.username().to_string(),
                        },
                    );
                }
                Decision::Stop => return self.cap_reached(),
                Decision::Fetch => {
                    if self.is_shutdown_requested() {
                        return self.interrupted();
                    }

                    if self.fetch_profile(record).await == EnrichStep::Interrupted {
                        return self.interrupted();
                    }

                    if self.state.cap_reached() {
                        return self.cap_reached();
                    }
                }
            }
        }

        EnrichStep::Continue
    }

    fn cap_reached(&self) -> EnrichStep {
        if let Some(cap) = self.state.cap {
            tracing::info!(cap, "Reached limit of new stargazers");
            emit(self.on_progress, CollectProgress::CapReached { cap });
        }
        EnrichStep::CapReached
    }

    fn interrupted(&self) -> EnrichStep {
        tracing::info!(
            new = self.state.new_count,
            "Stop requested, skipping remaining stargazers"
        );
        emit(
            self.on_progress,
            CollectProgress::Interrupted {
                new_so_far: self.state.new_count,
            },
        );
        EnrichStep::Interrupted
    }

    /// Fetch one profile, keeping the record on success and dropping it on
    /// failure. A wait cut short by shutdown leaves the record for a later run.
    async fn fetch_profile(&mut self, record: &StarRecord) -> EnrichStep {
        let username = record.username();
        let ordinal = self.state.known_count + self.state.new_count;
        tracing::info!(ordinal, username, "Processing stargazer");
        emit(
            self.on_progress,
            CollectProgress::ProcessingStargazer {
                ordinal,
                username: username.to_string(),
            },
        );

        match self.client.get_profile(username).await {
            Ok(fetched) => {
                self.state.quota = Some(fetched.quota);
                self.records
                    .push(EnrichedRecord::from_profile(fetched.data, record.starred_at));
                self.state.new_count += 1;
                emit(
                    self.on_progress,
                    CollectProgress::StargazerAccepted {
                        username: username.to_string(),
                        new_so_far: self.state.new_count,
                    },
                );
                EnrichStep::Continue
            }
            Err(GitHubError::Execute(ExecuteError::Interrupted)) => {
                tracing::debug!(username, "Profile lookup interrupted");
                EnrichStep::Interrupted
            }
            Err(err) => {
                if let GitHubError::Execute(ref e) = err
                    && let Some(quota) = e.quota()
                {
                    self.state.quota = Some(quota);
                }
                tracing::warn!(
                    username,
                    status = ?err.status(),
                    error = %err,
                    "Dropping stargazer after failed profile lookup"
                );
                emit(
                    self.on_progress,
                    CollectProgress::DetailFailed {
                        username: username.to_string(),
                        status: err.status(),
                        message: short_error_message(&err),
                    },
                );
                EnrichStep::Continue
            }
        }
    }

    /// Consume the enricher, returning what was accepted.
    pub fn finish(self) -> EnrichOutcome {
        EnrichOutcome {
            new_count: self.state.new_count,
            records: self.records,
            state: self.state,
        }
    }
}

/// Enrich an already fetched list of entries.
pub async fn enrich(
    client: &GitHubClient,
    records: &[StarRecord],
    watermark: Option<DateTime<Utc>>,
    known_count: usize,
    cap: Option<usize>,
    on_progress: Option<&ProgressCallback>,
) -> EnrichOutcome {
    let mut enricher = Enricher::new(client, RunState::new(watermark, known_count, cap))
        .with_progress(on_progress);
    enricher.process_page(records).await;
    enricher.finish()
}
