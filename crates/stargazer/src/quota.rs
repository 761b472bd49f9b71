//! Request quota tracking from response headers.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::http::{HttpHeaders, header_get};

/// Header carrying the number of requests left in the current window.
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// Header carrying the window reset time as epoch seconds.
pub const RESET_HEADER: &str = "x-ratelimit-reset";

/// Quota snapshot taken from the most recent response.
///
/// A fresh value is produced for every executed request and handed back to the
/// caller; nothing here is shared between requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaState {
    /// Requests remaining in the current window.
    pub remaining: u64,
    /// When the window resets.
    pub reset_at: DateTime<Utc>,
}

impl QuotaState {
    /// Read quota headers from a response.
    ///
    /// A missing or unparseable remaining count reads as zero, and a missing
    /// or out-of-range reset time reads as `now`.
    #[must_use]
    pub fn from_headers(headers: &HttpHeaders, now: DateTime<Utc>) -> Self {
        let remaining = header_get(headers, REMAINING_HEADER)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(0);
        let reset_at = header_get(headers, RESET_HEADER)
            .and_then(|v| v.trim().parse::<i64>().ok())
            .and_then(|epoch| DateTime::from_timestamp(epoch, 0))
            .unwrap_or(now);

        Self {
            remaining,
            reset_at,
        }
    }

    /// Whether the remaining quota is below `threshold`.
    #[inline]
    #[must_use]
    pub fn is_low(&self, threshold: u64) -> bool {
        self.remaining < threshold
    }

    /// Time to wait for the window to reset, plus `padding`.
    ///
    /// A reset time already in the past contributes zero.
    #[must_use]
    pub fn wait_until_reset(&self, now: DateTime<Utc>, padding: Duration) -> Duration {
        let until_reset = self
            .reset_at
            .signed_duration_since(now)
            .to_std()
            .unwrap_or(Duration::ZERO);
        until_reset + padding
    }
}
