//! GitHub API client for the stargazer, profile and rate limit endpoints.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use serde::de::DeserializeOwned;

use super::error::GitHubError;
use super::types::{
    JSON_MEDIA_TYPE, ProfileDetail, RateLimitResource, RateLimitResponse, STAR_MEDIA_TYPE,
    StarRecord,
};
use crate::executor::{Executed, RequestExecutor};
use crate::http::HttpRequest;
use crate::http::reqwest_transport::ReqwestTransport;
use crate::quota::QuotaState;
use crate::retry::Throttle;

/// Default GitHub REST API base URL.
pub const GITHUB_API_URL: &str = "https://api.github.com";

/// Request timeout used by [`GitHubClient::new`].
const REQUEST_TIMEOUT: StdDuration = StdDuration::from_secs(30);

/// Decoded response data and the quota reported with it.
#[derive(Debug, Clone)]
pub struct Fetched<T> {
    pub data: T,
    pub quota: QuotaState,
}

/// GitHub API client.
///
/// Every call goes through the [`RequestExecutor`], so rate-limit waits and
/// transport retries apply uniformly. The token is sent on every request.
#[derive(Clone)]
pub struct GitHubClient {
    executor: RequestExecutor,
    api_url: String,
    token: String,
}

impl GitHubClient {
    /// Create a client backed by reqwest, using the default retry policy.
    pub fn new(token: &str, api_url: &str) -> Result<Self, GitHubError> {
        let transport = ReqwestTransport::with_timeout(REQUEST_TIMEOUT)?;
        let executor = RequestExecutor::new(Arc::new(transport));
        Ok(Self::with_executor(executor, token, api_url))
    }

    /// Create a client around an existing executor.
    pub fn with_executor(executor: RequestExecutor, token: &str, api_url: &str) -> Self {
        Self {
            executor,
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    /// Get the API base URL.
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    /// URL of one page of a repository's stargazer list.
    pub fn stargazers_url(&self, owner: &str, repo: &str, page: u32) -> String {
        format!(
            "{}/repos/{}/{}/stargazers?page={}",
            self.api_url, owner, repo, page
        )
    }

    /// URL of a user's public profile.
    pub fn user_url(&self, login: &str) -> String {
        format!("{}/users/{}", self.api_url, login)
    }

    fn request(&self, url: String, accept: &str) -> HttpRequest {
        HttpRequest::get(url)
            .with_header("Accept", accept)
            .with_header("User-Agent", "stargazer")
            .with_header("Authorization", format!("token {}", self.token))
    }

    fn decode<T: DeserializeOwned>(
        executed: Executed,
        what: impl FnOnce() -> String,
    ) -> Result<Fetched<T>, GitHubError> {
        let data = serde_json::from_slice(&executed.response.body)
            .map_err(|source| GitHubError::Decode {
                what: what(),
                source,
            })?;
        Ok(Fetched {
            data,
            quota: executed.quota,
        })
    }

    /// Fetch one page of stargazers, oldest first.
    ///
    /// An empty page means the list is exhausted.
    pub async fn list_stargazers(
        &self,
        owner: &str,
        repo: &str,
        page: u32,
    ) -> Result<Fetched<Vec<StarRecord>>, GitHubError> {
        let request = self.request(self.stargazers_url(owner, repo, page), STAR_MEDIA_TYPE);
        let executed = self.executor.execute(&request, Throttle::UntilReset).await?;
        Self::decode(executed, || format!("stargazer page {page}"))
    }

    /// Fetch a user's profile.
    ///
    /// Low quota after this call triggers the fixed detail throttle rather
    /// than a wait for the window reset.
    pub async fn get_profile(&self, login: &str) -> Result<Fetched<ProfileDetail>, GitHubError> {
        let request = self.request(self.user_url(login), JSON_MEDIA_TYPE);
        let executed = self.executor.execute(&request, Throttle::Fixed).await?;
        Self::decode(executed, || format!("profile of {login}"))
    }

    /// Get current core rate limit status.
    pub async fn get_rate_limit(&self) -> Result<RateLimitResource, GitHubError> {
        let request = self.request(format!("{}/rate_limit", self.api_url), JSON_MEDIA_TYPE);
        let executed = self.executor.execute(&request, Throttle::Fixed).await?;
        let fetched: Fetched<RateLimitResponse> =
            Self::decode(executed, || "rate limit response".to_string())?;
        Ok(fetched.data.resources.core)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::http::MockTransport;
    use crate::retry::FakeClock;

    #[test]
    fn urls_are_built_from_trimmed_base() {
        let executor = RequestExecutor::new(Arc::new(MockTransport::new()));
        let client = GitHubClient::with_executor(executor, "t", "https://api.github.com//");

        assert_eq!(client.api_url(), "https://api.github.com");
        assert_eq!(
            client.stargazers_url("rust-lang", "rust", 4),
            "https://api.github.com/repos/rust-lang/rust/stargazers?page=4"
        );
        assert_eq!(
            client.user_url("octocat"),
            "https://api.github.com/users/octocat"
        );
    }

    #[tokio::test]
    async fn list_stargazers_sends_star_media_type_and_token() {
        let transport = MockTransport::new();
        let clock = FakeClock::at_epoch(NOW);
        let client = client(&transport, &clock);
        let url = client.stargazers_url("o", "r", 1);
        transport.push_response(
            &url,
            json_response(200, 4000, serde_json::json!([star("a", "2023-01-01T00:00:00Z")])),
        );

        let page = client.list_stargazers("o", "r", 1).await.expect("page");
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].username(), "a");
        assert_eq!(page.quota.remaining, 4000);

        let sent = &transport.requests()[0];
        assert_eq!(sent.header("accept"), Some(STAR_MEDIA_TYPE));
        assert_eq!(sent.header("authorization"), Some("token secret"));
        assert_eq!(sent.header("user-agent"), Some("stargazer"));
    }

    #[tokio::test]
    async fn malformed_page_is_a_decode_error() {
        let transport = MockTransport::new();
        let clock = FakeClock::at_epoch(NOW);
        let client = client(&transport, &clock);
        transport.push_response(
            client.stargazers_url("o", "r", 2),
            json_response(200, 4000, serde_json::json!({"unexpected": true})),
        );

        let err = client
            .list_stargazers("o", "r", 2)
            .await
            .expect_err("object is not a page");
        assert!(matches!(err, GitHubError::Decode { ref what, .. } if what == "stargazer page 2"));
    }

    #[tokio::test]
    async fn get_profile_decodes_detail() {
        let transport = MockTransport::new();
        let clock = FakeClock::at_epoch(NOW);
        let client = client(&transport, &clock);
        transport.push_response(client.user_url("ann"), json_response(200, 4000, profile("ann")));

        let fetched = client.get_profile("ann").await.expect("profile");
        assert_eq!(fetched.data.login, "ann");
        assert_eq!(fetched.data.company.as_deref(), Some("Acme"));
        assert_eq!(fetched.data.followers, Some(7));
    }

    #[tokio::test]
    async fn get_profile_failure_carries_status() {
        let transport = MockTransport::new();
        let clock = FakeClock::at_epoch(NOW);
        let client = client(&transport, &clock);
        transport.push_response(
            client.user_url("gone"),
            json_response(404, 4000, serde_json::json!({"message": "Not Found"})),
        );

        let err = client.get_profile("gone").await.expect_err("404");
        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn get_rate_limit_reads_core_resource() {
        let transport = MockTransport::new();
        let clock = FakeClock::at_epoch(NOW);
        let client = client(&transport, &clock);
        transport.push_response(
            format!("{API}/rate_limit"),
            json_response(
                200,
                4999,
                serde_json::json!({
                    "resources": {
                        "core": { "limit": 5000, "used": 1, "remaining": 4999, "reset": NOW + 3600 }
                    }
                }),
            ),
        );

        let core = client.get_rate_limit().await.expect("rate limit");
        assert_eq!(core.limit, 5000);
        assert_eq!(core.remaining, 4999);
    }
}
