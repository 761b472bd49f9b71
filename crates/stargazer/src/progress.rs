//! Progress reporting for collection runs.
//!
//! The library never prints. It emits [`CollectProgress`] events through an
//! optional callback and leaves presentation to the caller.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

/// Progress events emitted while collecting stargazers.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum CollectProgress {
    /// A run is starting from a prior snapshot (or none).
    Resuming {
        /// Rows already persisted.
        known_count: usize,
        /// Latest persisted starred-at time, if any.
        watermark: Option<DateTime<Utc>>,
        /// Per-run cap on new stargazers.
        cap: Option<usize>,
    },

    /// Requesting a page of the stargazer list.
    FetchingPage {
        /// Page number (1-indexed).
        page: u32,
    },

    /// A page of the stargazer list arrived.
    FetchedPage {
        /// Page number (1-indexed).
        page: u32,
        /// Records on this page.
        count: usize,
        /// Records fetched so far this run.
        total_so_far: usize,
    },

    /// The list endpoint returned an empty page.
    FetchExhausted {
        /// The empty page.
        page: u32,
    },

    /// The page loop stopped on an unexpected response.
    FetchAborted {
        /// The page that failed.
        page: u32,
        /// Status code, when the failure was a status.
        status: Option<u16>,
        /// Diagnostic message or response body.
        message: String,
    },

    /// Remaining quota is low; waiting before the next request.
    QuotaLow {
        /// Requests left in the window.
        remaining: u64,
        /// Time to wait (ms).
        wait_ms: u64,
    },

    /// The platform refused the request for quota reasons; waiting to retry.
    RateLimited {
        /// Status code returned.
        status: u16,
        /// Time to wait before retry (ms).
        wait_ms: u64,
        /// Current attempt number.
        attempt: u32,
    },

    /// The transport failed; waiting to retry the same request.
    NetworkRetry {
        /// Transport error message.
        error: String,
        /// Time to wait before retry (ms).
        wait_ms: u64,
        /// Current attempt number.
        attempt: u32,
    },

    /// A stargazer at or below the watermark was skipped.
    AlreadyProcessed {
        /// Username skipped.
        username: String,
    },

    /// Fetching profile detail for a new stargazer.
    ProcessingStargazer {
        /// Position of this stargazer in the overall dataset.
        ordinal: usize,
        /// Username being processed.
        username: String,
    },

    /// A new stargazer was enriched and accepted.
    StargazerAccepted {
        /// Username accepted.
        username: String,
        /// New stargazers accepted this run.
        new_so_far: usize,
    },

    /// A profile lookup failed; the stargazer is dropped from this run.
    DetailFailed {
        /// Username dropped.
        username: String,
        /// Status code, when the failure was a status.
        status: Option<u16>,
        /// Diagnostic message.
        message: String,
    },

    /// The per-run cap was reached; no further stargazers are processed.
    CapReached {
        /// The cap.
        cap: usize,
    },

    /// A graceful stop was requested; accepted rows will still be saved.
    Interrupted {
        /// New stargazers accepted before stopping.
        new_so_far: usize,
    },

    /// The next snapshot was written.
    SnapshotWritten {
        /// Path of the new artifact.
        path: PathBuf,
        /// Rows appended this run.
        appended: usize,
        /// Total rows in the artifact.
        total: usize,
    },
}

/// Callback for progress updates during a collection run.
pub type ProgressCallback = Box<dyn Fn(CollectProgress) + Send + Sync>;

/// Emit a progress event if a callback is provided.
#[inline]
pub fn emit(on_progress: Option<&ProgressCallback>, event: CollectProgress) {
    if let Some(cb) = on_progress {
        cb(event);
    }
}

/// Convert a duration to whole milliseconds for progress events.
#[inline]
pub(crate) fn as_millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
