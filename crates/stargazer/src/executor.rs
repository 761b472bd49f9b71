//! Rate-limit aware request execution.
//!
//! [`RequestExecutor::execute`] sends one logical request and keeps
//! re-sending it until it gets an answer worth returning:
//!
//! - transport errors are retried after the policy's network delay,
//! - `403`/`429` responses that carry a spent quota or a `Retry-After`
//!   wait for the window to reset and retry,
//! - any response that leaves the quota below the threshold is followed by a
//!   proactive wait, chosen by the call's [`Throttle`],
//! - other non-2xx statuses are returned as [`ExecuteError::Status`].
//!
//! Every wait is cut short once the shutdown flag is raised.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;

use crate::http::{HttpError, HttpRequest, HttpResponse, HttpTransport, header_get};
use crate::progress::{CollectProgress, ProgressCallback, as_millis, emit};
use crate::quota::QuotaState;
use crate::rate_limit::ApiRateLimiter;
use crate::retry::{Clock, RetryPolicy, SystemClock, Throttle};

/// A successful (2xx) response and the quota it reported.
#[derive(Debug, Clone)]
pub struct Executed {
    pub response: HttpResponse,
    pub quota: QuotaState,
    /// Sends it took to get this response.
    pub attempts: u32,
}

/// Errors returned by [`RequestExecutor::execute`].
#[derive(Debug, Error)]
pub enum ExecuteError {
    /// The platform answered with a non-success status.
    #[error("HTTP {status}: {}", truncate(.body, 120))]
    Status {
        status: u16,
        body: String,
        quota: QuotaState,
    },

    /// The transport kept failing until the retry policy gave up.
    #[error("transport failed after {attempts} attempt(s): {source}")]
    Transport {
        #[source]
        source: HttpError,
        attempts: u32,
    },

    /// Shutdown was requested while waiting to retry.
    #[error("interrupted while waiting to retry")]
    Interrupted,
}

impl ExecuteError {
    /// Status code, when the platform answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport { .. } | Self::Interrupted => None,
        }
    }

    /// Quota reported alongside a status failure.
    pub fn quota(&self) -> Option<QuotaState> {
        match self {
            Self::Status { quota, .. } => Some(*quota),
            Self::Transport { .. } | Self::Interrupted => None,
        }
    }
}

/// Header the platform sends with secondary rate limits, in seconds.
pub const RETRY_AFTER_HEADER: &str = "retry-after";

/// How often a pending wait checks the shutdown flag.
const SHUTDOWN_POLL: Duration = Duration::from_millis(250);

/// Whether a status is one the platform uses for quota refusals.
#[inline]
pub fn is_rate_limit_status(status: u16) -> bool {
    status == 403 || status == 429
}

/// Whether a response is a quota refusal that is worth waiting out.
///
/// A `403` is also what the platform answers for SSO-protected or blocked
/// resources, so it only counts when the quota is spent or the response
/// asks for a `Retry-After` pause.
pub fn is_rate_limited(response: &HttpResponse, quota: &QuotaState) -> bool {
    is_rate_limit_status(response.status)
        && (quota.remaining == 0 || header_get(&response.headers, RETRY_AFTER_HEADER).is_some())
}

/// `Retry-After` as a delay, when given in seconds.
fn retry_after(response: &HttpResponse) -> Option<Duration> {
    header_get(&response.headers, RETRY_AFTER_HEADER)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

async fn shutdown_requested(flag: &AtomicBool) {
    while !flag.load(Ordering::SeqCst) {
        tokio::time::sleep(SHUTDOWN_POLL).await;
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

/// Sends requests through a transport while honouring the platform quota.
#[derive(Clone)]
pub struct RequestExecutor {
    transport: Arc<dyn HttpTransport>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    rate_limiter: Option<ApiRateLimiter>,
    on_progress: Option<Arc<ProgressCallback>>,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl RequestExecutor {
    /// Executor with the default policy and the system clock.
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            clock: Arc::new(SystemClock),
            policy: RetryPolicy::default(),
            rate_limiter: None,
            on_progress: None,
            shutdown_flag: None,
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Option<ApiRateLimiter>) -> Self {
        self.rate_limiter = limiter;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, on_progress: Option<Arc<ProgressCallback>>) -> Self {
        self.on_progress = on_progress;
        self
    }

    /// Abort pending waits once `flag` is set.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Option<Arc<AtomicBool>>) -> Self {
        self.shutdown_flag = flag;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn progress(&self) -> Option<&ProgressCallback> {
        self.on_progress.as_deref()
    }

    /// Wait for the client-side limiter if one is configured.
    async fn pace(&self) {
        if let Some(ref limiter) = self.rate_limiter {
            limiter.wait().await;
        }
    }

    /// Sleep for `duration` unless shutdown is requested first.
    ///
    /// Returns `false` when the wait was interrupted.
    async fn wait(&self, duration: Duration) -> bool {
        let Some(flag) = self.shutdown_flag.as_deref() else {
            self.clock.sleep(duration).await;
            return true;
        };
        tokio::select! {
            biased;
            () = shutdown_requested(flag) => false,
            () = self.clock.sleep(duration) => true,
        }
    }

    /// Send `request` until it yields a final answer.
    ///
    /// Returns the 2xx response with its quota, or the first non-success,
    /// non-quota status. Quota refusals and transport errors are retried for
    /// as long as the policy allows.
    pub async fn execute(
        &self,
        request: &HttpRequest,
        throttle: Throttle,
    ) -> Result<Executed, ExecuteError> {
        let mut network_backoff = self.policy.network_backoff();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            self.pace().await;

            let response = match self.transport.send(request.clone()).await {
                Ok(response) => response,
                Err(err) => {
                    let Some(delay) = network_backoff.next() else {
                        tracing::warn!(
                            url = %request.url,
                            attempt,
                            error = %err,
                            "Giving up after transport errors"
                        );
                        return Err(ExecuteError::Transport {
                            source: err,
                            attempts: attempt,
                        });
                    };
                    tracing::debug!(
                        url = %request.url,
                        attempt,
                        ?delay,
                        error = %err,
                        "Transport error, retrying"
                    );
                    emit(
                        self.progress(),
                        CollectProgress::NetworkRetry {
                            error: err.to_string(),
                            wait_ms: as_millis(delay),
                            attempt,
                        },
                    );
                    if !self.wait(delay).await {
                        return Err(ExecuteError::Interrupted);
                    }
                    continue;
                }
            };

            let now = self.clock.now();
            let quota = QuotaState::from_headers(&response.headers, now);

            if is_rate_limited(&response, &quota) {
                if !self.policy.allows_retry(attempt) {
                    return Err(ExecuteError::Status {
                        status: response.status,
                        body: response.body_text(),
                        quota,
                    });
                }
                let wait = retry_after(&response)
                    .map(|delay| delay + self.policy.reset_padding)
                    .unwrap_or_else(|| quota.wait_until_reset(now, self.policy.reset_padding));
                tracing::warn!(
                    url = %request.url,
                    status = response.status,
                    wait_secs = wait.as_secs(),
                    attempt,
                    "Rate limit exceeded, waiting for reset"
                );
                emit(
                    self.progress(),
                    CollectProgress::RateLimited {
                        status: response.status,
                        wait_ms: as_millis(wait),
                        attempt,
                    },
                );
                if !self.wait(wait).await {
                    return Err(ExecuteError::Interrupted);
                }
                continue;
            }

            if quota.is_low(self.policy.low_quota_threshold) {
                let wait = match throttle {
                    Throttle::UntilReset => quota.wait_until_reset(now, self.policy.reset_padding),
                    Throttle::Fixed => self.policy.detail_throttle,
                };
                tracing::info!(
                    remaining = quota.remaining,
                    wait_secs = wait.as_secs(),
                    "Rate limit nearly exceeded, pausing"
                );
                emit(
                    self.progress(),
                    CollectProgress::QuotaLow {
                        remaining: quota.remaining,
                        wait_ms: as_millis(wait),
                    },
                );
                if !self.wait(wait).await {
                    tracing::debug!("Quota pause interrupted by shutdown");
                }
            }

            if !response.is_success() {
                let body = response.body_text();
                tracing::warn!(
                    url = %request.url,
                    status = response.status,
                    body = %body,
                    "Unexpected response status"
                );
                return Err(ExecuteError::Status {
                    status: response.status,
                    body,
                    quota,
                });
            }

            return Ok(Executed {
                response,
                quota,
                attempts: attempt,
            });
        }
    }
}
