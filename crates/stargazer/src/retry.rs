//! Retry policy and time source for rate-limit aware requests.
//!
//! Every wait the collector performs goes through a [`Clock`], so the retry
//! behaviour can be exercised in tests without real sleeps.

use std::time::Duration;

use async_trait::async_trait;
use backon::{BackoffBuilder, ConstantBackoff, ConstantBuilder};
use chrono::{DateTime, Utc};

/// Delay before re-issuing a request that failed at the transport level.
pub const DEFAULT_NETWORK_DELAY: Duration = Duration::from_secs(5);

/// Padding added on top of the time remaining until the quota window resets.
pub const DEFAULT_RESET_PADDING: Duration = Duration::from_secs(10);

/// Remaining quota below which requests are throttled.
pub const DEFAULT_LOW_QUOTA_THRESHOLD: u64 = 10;

/// Fixed pause applied after a profile lookup when quota runs low.
pub const DEFAULT_DETAIL_THROTTLE: Duration = Duration::from_secs(60);

/// Retry configuration for the request executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay between retries after a transport error.
    pub network_delay: Duration,
    /// Padding added to every reset-based wait.
    pub reset_padding: Duration,
    /// Remaining quota below which the proactive throttle kicks in.
    pub low_quota_threshold: u64,
    /// Wait applied by [`Throttle::Fixed`] calls.
    pub detail_throttle: Duration,
    /// Maximum attempts per request. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            network_delay: DEFAULT_NETWORK_DELAY,
            reset_padding: DEFAULT_RESET_PADDING,
            low_quota_threshold: DEFAULT_LOW_QUOTA_THRESHOLD,
            detail_throttle: DEFAULT_DETAIL_THROTTLE,
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    /// Cap the number of attempts per request.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts.max(1));
        self
    }

    /// Whether another attempt may follow attempt number `attempt` (1-based).
    #[must_use]
    pub fn allows_retry(&self, attempt: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempt < max)
    }

    /// Delay schedule for transport-error retries.
    ///
    /// The schedule yields `network_delay` until `max_attempts - 1` retries
    /// have been handed out, or forever when unbounded.
    #[must_use]
    pub fn network_backoff(&self) -> ConstantBackoff {
        let retries = self
            .max_attempts
            .map_or(usize::MAX, |max| max.saturating_sub(1) as usize);

        ConstantBuilder::default()
            .with_delay(self.network_delay)
            .with_max_times(retries)
            .build()
    }
}

/// How the executor paces itself after a response that leaves little quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Throttle {
    /// Wait until the quota window resets, plus padding.
    UntilReset,
    /// Wait the policy's fixed `detail_throttle`.
    Fixed,
}

/// Source of time for the executor.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;

    /// Suspend the calling task for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// The real clock: `Utc::now` and `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
pub(crate) use fake::FakeClock;

#[cfg(test)]
mod fake {
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Clock that never sleeps; it records each requested sleep and moves
    /// its own time forward by that amount.
    #[derive(Clone)]
    pub(crate) struct FakeClock {
        inner: Arc<Mutex<FakeClockInner>>,
    }

    struct FakeClockInner {
        now: DateTime<Utc>,
        sleeps: Vec<Duration>,
    }

    impl FakeClock {
        pub(crate) fn at(now: DateTime<Utc>) -> Self {
            Self {
                inner: Arc::new(Mutex::new(FakeClockInner {
                    now,
                    sleeps: Vec::new(),
                })),
            }
        }

        pub(crate) fn at_epoch(epoch: i64) -> Self {
            Self::at(DateTime::from_timestamp(epoch, 0).expect("valid epoch"))
        }

        pub(crate) fn sleeps(&self) -> Vec<Duration> {
            self.inner
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .sleeps
                .clone()
        }
    }

    #[async_trait]
    impl Clock for FakeClock {
        fn now(&self) -> DateTime<Utc> {
            self.inner.lock().unwrap_or_else(|e| e.into_inner()).now
        }

        async fn sleep(&self, duration: Duration) {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.sleeps.push(duration);
            let step = chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::zero());
            inner.now += step;
        }
    }
}
