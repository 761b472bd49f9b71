//! Configuration file support for stargazer.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (prefixed with `STARGAZER_`, e.g., `STARGAZER_GITHUB__TOKEN`)
//! 3. Config file (./stargazer.toml, then ~/.config/stargazer/config.toml)
//! 4. Built-in defaults
//!
//! Nested keys are separated by a double underscore in environment variables,
//! so `STARGAZER_COLLECT__OUTPUT_DIR` sets `collect.output_dir`. The plain
//! `GITHUB_TOKEN` variable is used when no token is configured.
//!
//! Example config file:
//! ```toml
//! [github]
//! token = "ghp_..."  # or use STARGAZER_GITHUB__TOKEN / GITHUB_TOKEN
//! api_url = "https://api.github.com"
//!
//! [collect]
//! output_dir = "."
//! limit = 500
//! requests_per_second = 5
//!
//! [retry]
//! network_delay_secs = 5
//! reset_padding_secs = 10
//! low_quota_threshold = 10
//! detail_throttle_secs = 60
//! max_attempts = 20
//! ```

use std::path::PathBuf;
use std::time::Duration;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use directories::ProjectDirs;
use serde::Deserialize;

use stargazer::{GITHUB_API_URL, RetryPolicy};

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// GitHub configuration.
    pub github: GitHubConfig,
    /// Default collection options.
    pub collect: CollectConfig,
    /// Retry and throttling behaviour.
    pub retry: RetryConfig,
}

/// GitHub configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// GitHub API token.
    pub token: Option<String>,
    /// REST API base URL (GitHub Enterprise uses `https://host/api/v3`).
    pub api_url: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: GITHUB_API_URL.to_string(),
        }
    }
}

/// Default collection options.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CollectConfig {
    /// Directory holding one `{owner}_{repo}` folder per repository.
    pub output_dir: PathBuf,
    /// Maximum new stargazers per run.
    pub limit: Option<usize>,
    /// Client-side pacing, on top of the platform's own quota.
    pub requests_per_second: Option<u32>,
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            limit: None,
            requests_per_second: None,
        }
    }
}

/// Retry and throttling behaviour.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub network_delay_secs: u64,
    pub reset_padding_secs: u64,
    pub low_quota_threshold: u64,
    pub detail_throttle_secs: u64,
    /// Attempts per request before giving up; unset retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            network_delay_secs: policy.network_delay.as_secs(),
            reset_padding_secs: policy.reset_padding.as_secs(),
            low_quota_threshold: policy.low_quota_threshold,
            detail_throttle_secs: policy.detail_throttle.as_secs(),
            max_attempts: policy.max_attempts,
        }
    }
}

impl RetryConfig {
    /// The executor policy these settings describe.
    pub fn policy(&self) -> RetryPolicy {
        let policy = RetryPolicy {
            network_delay: Duration::from_secs(self.network_delay_secs),
            reset_padding: Duration::from_secs(self.reset_padding_secs),
            low_quota_threshold: self.low_quota_threshold,
            detail_throttle: Duration::from_secs(self.detail_throttle_secs),
            max_attempts: None,
        };
        match self.max_attempts {
            Some(max) => policy.with_max_attempts(max),
            None => policy,
        }
    }
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    ///
    /// Sources are loaded in order (later sources override earlier):
    /// 1. Built-in defaults
    /// 2. XDG config file (~/.config/stargazer/config.toml)
    /// 3. Local config file (./stargazer.toml)
    /// 4. Environment variables with STARGAZER_ prefix
    pub fn load() -> Self {
        let mut builder = ConfigBuilder::builder();

        if let Some(xdg_config) = Self::default_config_path()
            && xdg_config.exists()
        {
            tracing::debug!("Loading config from {:?}", xdg_config);
            builder = builder.add_source(
                File::from(xdg_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        let local_config = PathBuf::from("stargazer.toml");
        if local_config.exists() {
            tracing::debug!("Loading config from ./stargazer.toml");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        // e.g., STARGAZER_COLLECT__OUTPUT_DIR -> collect.output_dir
        builder = builder.add_source(
            Environment::with_prefix("STARGAZER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut config = match builder.build() {
            Ok(settings) => match settings.try_deserialize::<Config>() {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to deserialize config: {}", e);
                    Config::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to build config: {}", e);
                Config::default()
            }
        };

        if config.github.token.is_none() {
            config.github.token = std::env::var("GITHUB_TOKEN")
                .ok()
                .filter(|t| !t.is_empty());
        }

        config
    }

    /// Get the GitHub token.
    pub fn github_token(&self) -> Option<String> {
        self.github.token.clone()
    }

    /// Get the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "stargazer").map(|dirs| dirs.config_dir().join("config.toml"))
    }
}
