//! GitHub API access for the collector.
//!
//! # Module Structure
//!
//! - [`error`] - Error types for GitHub API operations
//! - [`types`] - Wire types for stargazers, profiles and rate limits
//! - [`client`] - Request building and decoding on top of the executor

mod client;
mod error;
mod types;

pub use error::{GitHubError, short_error_message};

pub use types::{
    JSON_MEDIA_TYPE, PAGE_SIZE, ProfileDetail, RateLimitResource, RateLimitResources,
    RateLimitResponse, STAR_MEDIA_TYPE, StarRecord, StarUser,
};

pub use client::{Fetched, GITHUB_API_URL, GitHubClient};

#[cfg(test)]
pub(crate) use client::test_support;
