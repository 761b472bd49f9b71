use clap::ValueEnum;

use stargazer::GitHubClient;
use stargazer::github::RateLimitResource;

use crate::progress::format_wait;

/// Output format for rate limit display.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub(crate) enum OutputFormat {
    /// Display as a formatted table (default)
    #[default]
    Table,
    /// Display as JSON
    Json,
}

/// Show the core quota the collector draws from.
pub(crate) async fn handle_limits(
    client: &GitHubClient,
    output: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let core = client.get_rate_limit().await?;
    let display = RateLimitDisplay::from_resource("core", &core, chrono::Utc::now());
    display.print(output)?;
    Ok(())
}

/// The core quota, formatted for display.
#[derive(Debug, Clone, serde::Serialize, tabled::Tabled)]
pub(crate) struct RateLimitDisplay {
    #[tabled(rename = "Resource")]
    pub resource: String,
    #[tabled(rename = "Limit")]
    pub limit: String,
    #[tabled(rename = "Used")]
    pub used: String,
    #[tabled(rename = "Remaining")]
    pub remaining: String,
    #[tabled(rename = "Usage %")]
    pub usage_percent: String,
    #[tabled(rename = "Resets At")]
    pub reset_at: String,
    #[tabled(rename = "Resets In")]
    pub reset_in: String,
}

impl RateLimitDisplay {
    pub(crate) fn from_resource(
        name: &str,
        resource: &RateLimitResource,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        let usage_percent = if resource.limit > 0 {
            (resource.used as f64 / resource.limit as f64) * 100.0
        } else {
            0.0
        };
        let reset_at = resource.reset_at();
        let reset_duration = reset_at.signed_duration_since(now);
        let reset_in = if reset_duration.num_seconds() > 0 {
            format_wait(reset_duration.num_milliseconds().unsigned_abs())
        } else {
            "now".to_string()
        };

        Self {
            resource: name.to_string(),
            limit: resource.limit.to_string(),
            used: resource.used.to_string(),
            remaining: resource.remaining.to_string(),
            usage_percent: format!("{:.1}%", usage_percent),
            reset_at: reset_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            reset_in,
        }
    }

    pub(crate) fn render(&self, format: OutputFormat) -> Result<String, serde_json::Error> {
        match format {
            OutputFormat::Table => {
                let mut table = tabled::Table::new([self.clone()]);
                table.with(tabled::settings::Style::rounded());
                Ok(table.to_string())
            }
            OutputFormat::Json => serde_json::to_string_pretty(self),
        }
    }

    pub(crate) fn print(&self, format: OutputFormat) -> Result<(), serde_json::Error> {
        println!("{}", self.render(format)?);
        Ok(())
    }
}
