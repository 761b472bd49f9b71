//! GitHub API data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of stargazers the list endpoint returns per page.
pub const PAGE_SIZE: usize = 30;

/// Media type that makes the stargazer list include `starred_at`.
pub const STAR_MEDIA_TYPE: &str = "application/vnd.github.v3.star+json";

/// Media type for every other endpoint.
pub const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";

/// Reference to the user behind a star.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StarUser {
    /// Username.
    pub login: String,
    /// Platform user ID.
    #[serde(default)]
    pub id: Option<u64>,
}

/// One entry of the stargazer list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StarRecord {
    /// Who starred.
    pub user: StarUser,
    /// When they starred.
    pub starred_at: DateTime<Utc>,
}

impl StarRecord {
    /// The stargazer's username.
    pub fn username(&self) -> &str {
        &self.user.login
    }
}

/// Public profile of a user.
///
/// The platform returns `null` for unset fields; only `login` is guaranteed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileDetail {
    pub login: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub twitter_username: Option<String>,
    #[serde(default)]
    pub followers: Option<u64>,
    #[serde(default)]
    pub bio: Option<String>,
}

/// A single rate limit resource entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitResource {
    /// Maximum requests allowed per period.
    pub limit: u64,
    /// Requests used in current period.
    pub used: u64,
    /// Remaining requests in current period.
    pub remaining: u64,
    /// Unix timestamp when the rate limit resets.
    pub reset: i64,
}

impl RateLimitResource {
    /// Get the reset time as a DateTime.
    pub fn reset_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.reset, 0).unwrap_or_else(Utc::now)
    }
}

/// Rate limit resources relevant to the collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitResources {
    /// Core REST API limit, which covers both endpoints the collector uses.
    pub core: RateLimitResource,
}

/// Response of the `/rate_limit` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitResponse {
    pub resources: RateLimitResources,
}
