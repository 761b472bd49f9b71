//! Paginated fetching of a repository's stargazer list.
//!
//! The list endpoint returns stargazers oldest first, [`PAGE_SIZE`] per page.
//! A run that already knows `n` stargazers resumes at the page containing the
//! `n`-th one instead of starting over; records on that page that were
//! already persisted are filtered out later by the enricher's watermark.

use crate::github::{GitHubClient, GitHubError, PAGE_SIZE, StarRecord};
use crate::progress::{CollectProgress, ProgressCallback, emit};
use crate::quota::QuotaState;

/// First page to request given the number of stargazers already persisted.
pub fn start_page(known_count: usize) -> u32 {
    u32::try_from(known_count / PAGE_SIZE)
        .unwrap_or(u32::MAX - 1)
        .saturating_add(1)
}

/// Result of asking the cursor for the next page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    /// A non-empty page of records, in list order.
    Page(Vec<StarRecord>),
    /// The list has no more records.
    Exhausted,
    /// The page could not be fetched; the list should not be read further.
    Aborted {
        status: Option<u16>,
        message: String,
    },
}

/// Walks the stargazer list one page at a time.
///
/// Once the cursor has returned [`PageOutcome::Exhausted`] or
/// [`PageOutcome::Aborted`] it is finished and keeps returning `Exhausted`
/// without issuing further requests.
pub struct PageCursor<'a> {
    client: &'a GitHubClient,
    owner: &'a str,
    repo: &'a str,
    page: u32,
    fetched: usize,
    finished: bool,
    last_quota: Option<QuotaState>,
    on_progress: Option<&'a ProgressCallback>,
}

impl<'a> PageCursor<'a> {
    /// Cursor positioned at the resume page for `known_count`.
    pub fn new(
        client: &'a GitHubClient,
        owner: &'a str,
        repo: &'a str,
        known_count: usize,
    ) -> Self {
        Self {
            client,
            owner,
            repo,
            page: start_page(known_count),
            fetched: 0,
            finished: false,
            last_quota: None,
            on_progress: None,
        }
    }

    #[must_use]
    pub fn with_progress(mut self, on_progress: Option<&'a ProgressCallback>) -> Self {
        self.on_progress = on_progress;
        self
    }

    /// Page the next call to [`next_page`](Self::next_page) will request.
    pub fn page(&self) -> u32 {
        self.page
    }

    /// Records returned so far.
    pub fn fetched(&self) -> usize {
        self.fetched
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Quota reported with the most recent page, if any page succeeded.
    pub fn last_quota(&self) -> Option<QuotaState> {
        self.last_quota
    }

    /// Fetch the next page.
    pub async fn next_page(&mut self) -> PageOutcome {
        if self.finished {
            return PageOutcome::Exhausted;
        }

        let page = self.page;
        emit(self.on_progress, CollectProgress::FetchingPage { page });
        tracing::debug!(owner = self.owner, repo = self.repo, page, "Fetching stargazer page");

        match self.client.list_stargazers(self.owner, self.repo, page).await {
            Ok(fetched) => {
                self.last_quota = Some(fetched.quota);
                let records = fetched.data;

                if records.is_empty() {
                    self.finished = true;
                    tracing::debug!(page, total = self.fetched, "Stargazer list exhausted");
                    emit(self.on_progress, CollectProgress::FetchExhausted { page });
                    return PageOutcome::Exhausted;
                }

                self.fetched += records.len();
                self.page += 1;
                emit(
                    self.on_progress,
                    CollectProgress::FetchedPage {
                        page,
                        count: records.len(),
                        total_so_far: self.fetched,
                    },
                );
                PageOutcome::Page(records)
            }
            Err(err) => {
                self.finished = true;
                let (status, message) = abort_details(&err);
                tracing::warn!(page, ?status, error = %message, "Stopping stargazer fetch");
                emit(
                    self.on_progress,
                    CollectProgress::FetchAborted {
                        page,
                        status,
                        message: message.clone(),
                    },
                );
                PageOutcome::Aborted { status, message }
            }
        }
    }
}

/// Status and diagnostic text for a failed page.
fn abort_details(err: &GitHubError) -> (Option<u16>, String) {
    use crate::executor::ExecuteError;

    match err {
        GitHubError::Execute(ExecuteError::Status { status, body, .. }) => {
            (Some(*status), body.clone())
        }
        other => (other.status(), other.to_string()),
    }
}

/// Why [`fetch_all`] stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchEnd {
    /// An empty page was returned.
    Exhausted,
    /// The accumulated record count reached the cap.
    CapReached,
    /// A page failed; the records before it are kept.
    Aborted {
        status: Option<u16>,
        message: String,
    },
}

/// Records accumulated by [`fetch_all`].
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub records: Vec<StarRecord>,
    pub end: FetchEnd,
    /// Quota reported with the last successful page.
    pub quota: Option<QuotaState>,
}

/// Fetch stargazer pages until the list is exhausted, `cap` fetched records
/// have accumulated, or a page fails.
///
/// The cap counts fetched records, so the last page may push the total past
/// it; records are not truncated.
pub async fn fetch_all(
    client: &GitHubClient,
    owner: &str,
    repo: &str,
    known_count: usize,
    cap: Option<usize>,
    on_progress: Option<&ProgressCallback>,
) -> FetchOutcome {
    let mut cursor =
        PageCursor::new(client, owner, repo, known_count).with_progress(on_progress);
    let mut records = Vec::new();

    let end = loop {
        match cursor.next_page().await {
            PageOutcome::Page(page) => {
                records.extend(page);
                if cap.is_some_and(|cap| records.len() >= cap) {
                    break FetchEnd::CapReached;
                }
            }
            PageOutcome::Exhausted => break FetchEnd::Exhausted,
            PageOutcome::Aborted { status, message } => {
                break FetchEnd::Aborted { status, message };
            }
        }
    };

    FetchOutcome {
        records,
        end,
        quota: cursor.last_quota(),
    }
}
