//! Stargazer - incremental collection of a repository's stargazers.
//!
//! Each run resumes from the latest CSV snapshot of a repository, fetches
//! only the stargazers who starred after it, enriches them with profile data
//! and writes a new snapshot made of the old rows plus the new ones.
//!
//! # Example
//!
//! ```ignore
//! use stargazer::{CollectOptions, GitHubClient, SnapshotStore, collect_stargazers};
//!
//! let client = GitHubClient::new(&token, stargazer::GITHUB_API_URL)?;
//! let store = SnapshotStore::for_repo(".", "rust-lang", "rust");
//! let options = CollectOptions::new("rust-lang", "rust").with_cap(Some(100));
//!
//! let report = collect_stargazers(&client, &store, &options, None, None).await?;
//! println!("{} new, {} total", report.new_count, report.total);
//! ```

pub mod collect;
pub mod enrich;
pub mod executor;
pub mod fetch;
pub mod github;
pub mod http;
pub mod progress;
pub mod quota;
pub mod rate_limit;
pub mod record;
pub mod retry;
pub mod snapshot;

pub use collect::{CollectError, CollectOptions, CollectReport, CollectStop, collect_stargazers};
pub use enrich::{Decision, EnrichOutcome, EnrichStep, Enricher, RunState, classify, enrich};
pub use executor::{ExecuteError, Executed, RequestExecutor};
pub use fetch::{FetchEnd, FetchOutcome, PageCursor, PageOutcome, fetch_all, start_page};
pub use github::{GITHUB_API_URL, GitHubClient, GitHubError, ProfileDetail, StarRecord};
pub use http::{HttpError, HttpRequest, HttpResponse, HttpTransport};
pub use progress::{CollectProgress, ProgressCallback, emit};
pub use quota::QuotaState;
pub use rate_limit::ApiRateLimiter;
pub use record::EnrichedRecord;
pub use retry::{Clock, RetryPolicy, SystemClock, Throttle};
pub use snapshot::{Snapshot, SnapshotError, SnapshotStore, merge};
