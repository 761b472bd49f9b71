use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use clap::Args;

use stargazer::http::reqwest_transport::ReqwestTransport;
use stargazer::record::format_timestamp;
use stargazer::{
    ApiRateLimiter, CollectOptions, CollectReport, CollectStop, EnrichedRecord, GitHubClient,
    RequestExecutor, Snapshot, SnapshotStore, collect_stargazers,
};

use crate::config::Config;
use crate::progress::ProgressReporter;

/// Per-request timeout for the GitHub API.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Options for a collection run. Unset values fall back to the config file.
#[derive(Debug, Args)]
pub(crate) struct CollectArgs {
    /// Repository owner (user or organization)
    #[arg(short, long)]
    pub owner: String,

    /// Repository name
    #[arg(short, long)]
    pub repo: String,

    /// GitHub token (overrides config and GITHUB_TOKEN)
    #[arg(short, long)]
    pub token: Option<String>,

    /// Maximum number of new stargazers to collect this run (0 means no limit)
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Directory holding one {owner}_{repo} folder per repository
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Client-side request pacing (requests per second)
    #[arg(long)]
    pub rps: Option<u32>,

    /// Print the saved snapshot as a table when done
    #[arg(long)]
    pub show: bool,
}

/// Cap for this run: the flag wins over the config, and zero means no cap.
pub(crate) fn effective_cap(flag: Option<usize>, config: &Config) -> Option<usize> {
    flag.or(config.collect.limit).filter(|&n| n > 0)
}

/// Resolve the token from the command line, then the configuration.
pub(crate) fn resolve_token(
    flag: Option<&str>,
    config: &Config,
) -> Result<String, Box<dyn std::error::Error>> {
    flag.map(str::to_string)
        .filter(|t| !t.is_empty())
        .or_else(|| config.github_token())
        .ok_or_else(|| {
            "No GitHub token found. Pass --token, set GITHUB_TOKEN or STARGAZER_GITHUB__TOKEN, \
             or add token to the [github] section of the config file."
                .into()
        })
}

/// Build an API client sharing the configured retry policy and pacing.
pub(crate) fn build_client(
    token: &str,
    config: &Config,
    requests_per_second: Option<u32>,
    reporter: Option<&Arc<ProgressReporter>>,
    shutdown_flag: Option<Arc<AtomicBool>>,
) -> Result<GitHubClient, Box<dyn std::error::Error>> {
    let transport = ReqwestTransport::with_timeout(REQUEST_TIMEOUT)?;
    let executor = RequestExecutor::new(Arc::new(transport))
        .with_policy(config.retry.policy())
        .with_rate_limiter(requests_per_second.map(ApiRateLimiter::new))
        .with_progress(reporter.map(ProgressReporter::as_callback))
        .with_shutdown_flag(shutdown_flag);
    Ok(GitHubClient::with_executor(
        executor,
        token,
        &config.github.api_url,
    ))
}

/// Handle the collect command.
pub(crate) async fn handle_collect(
    args: CollectArgs,
    config: &Config,
    shutdown_flag: Arc<AtomicBool>,
) -> Result<(), Box<dyn std::error::Error>> {
    let token = resolve_token(args.token.as_deref(), config)?;
    let output_dir = args
        .output_dir
        .unwrap_or_else(|| config.collect.output_dir.clone());
    let cap = effective_cap(args.limit, config);
    let rps = args.rps.or(config.collect.requests_per_second);

    let reporter = Arc::new(ProgressReporter::new());
    let callback = reporter.as_callback();
    let client = build_client(
        &token,
        config,
        rps,
        Some(&reporter),
        Some(Arc::clone(&shutdown_flag)),
    )?;

    let store = SnapshotStore::for_repo(&output_dir, &args.owner, &args.repo);
    let options = CollectOptions::new(args.owner, args.repo).with_cap(cap);

    let result = collect_stargazers(
        &client,
        &store,
        &options,
        Some(shutdown_flag),
        Some(callback.as_ref()),
    )
    .await;
    reporter.finish();

    let report = result?;
    if args.show {
        let snapshot = store.load(&report.path)?;
        println!("{}", render_snapshot(&snapshot));
    }
    for line in summary_lines(&report) {
        println!("{}", line);
    }

    Ok(())
}

/// One snapshot row, formatted for display.
#[derive(Debug, Clone, tabled::Tabled)]
struct SnapshotRow {
    #[tabled(rename = "Username")]
    username: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Location")]
    location: String,
    #[tabled(rename = "Company")]
    company: String,
    #[tabled(rename = "Email")]
    email: String,
    #[tabled(rename = "Twitter")]
    twitter: String,
    #[tabled(rename = "Followers")]
    followers: String,
    #[tabled(rename = "Starred at")]
    starred_at: String,
    #[tabled(rename = "Bio")]
    bio: String,
}

impl From<&EnrichedRecord> for SnapshotRow {
    fn from(record: &EnrichedRecord) -> Self {
        let text = |value: &Option<String>| value.clone().unwrap_or_default();
        Self {
            username: record.username.clone(),
            name: text(&record.name),
            location: text(&record.location),
            company: text(&record.company),
            email: text(&record.email),
            twitter: text(&record.twitter),
            followers: record.followers.map(|n| n.to_string()).unwrap_or_default(),
            starred_at: format_timestamp(&record.starred_at),
            bio: text(&record.bio),
        }
    }
}

/// Render every row of a snapshot, in file order.
pub(crate) fn render_snapshot(snapshot: &Snapshot) -> String {
    let rows: Vec<SnapshotRow> = snapshot.rows.iter().map(SnapshotRow::from).collect();
    let mut table = tabled::Table::new(rows);
    table.with(tabled::settings::Style::rounded());
    table.to_string()
}

/// Lines printed once a run has saved its snapshot.
pub(crate) fn summary_lines(report: &CollectReport) -> Vec<String> {
    let mut lines = vec![format!("Data saved to {}", report.path.display())];
    lines.push(format!(
        "{} new stargazers, {} in total",
        report.new_count, report.total
    ));

    match &report.stop {
        CollectStop::Exhausted | CollectStop::CapReached => {}
        CollectStop::Aborted { status, message } => {
            let reason = match status {
                Some(code) => format!("HTTP {}", code),
                None => message.clone(),
            };
            lines.push(format!(
                "Stopped early ({}); run again to continue from here.",
                reason
            ));
        }
        CollectStop::Interrupted => {
            lines.push("Interrupted; run again to continue from here.".to_string());
        }
    }

    if let Some(quota) = &report.quota {
        lines.push(format!(
            "{} requests left until {}",
            quota.remaining,
            format_timestamp(&quota.reset_at)
        ));
    }

    lines
}
