//! Stargazer CLI - incremental collection of a repository's stargazers.

mod commands;
mod config;
mod progress;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::Term;
use tracing_subscriber::EnvFilter;

use crate::commands::collect::CollectArgs;
use crate::commands::limits::OutputFormat;

#[derive(Parser)]
#[command(name = "stargazer")]
#[command(version)]
#[command(about = "Incrementally collect the stargazers of a GitHub repository")]
#[command(
    long_about = "Stargazer collects the users who starred a GitHub repository, together with \
their public profile details, into CSV snapshots. Each run resumes from the latest snapshot, \
fetches only stargazers newer than it and writes a new snapshot containing the old rows \
followed by the new ones. Rate limits are respected by waiting for the quota to reset."
)]
#[command(after_long_help = r#"EXAMPLES
    Collect every stargazer of a repository:
        $ stargazer collect --owner rust-lang --repo rust

    Collect at most 500 new stargazers this run:
        $ stargazer collect -o rust-lang -r rust --limit 500

    Write snapshots under a data directory:
        $ stargazer collect -o rust-lang -r rust --output-dir ./data

    Check the remaining API quota:
        $ stargazer limits

OUTPUT
    Snapshots are written to {output-dir}/{owner}_{repo}/stargazer_info_{YYYYMMDD_HHMMSS}.csv.
    Older snapshots are never modified. Do not run two collections against the
    same directory at the same time.

CONFIGURATION
    Stargazer reads configuration from:
      1. ~/.config/stargazer/config.toml (or $XDG_CONFIG_HOME/stargazer/config.toml)
      2. ./stargazer.toml
      3. Environment variables (STARGAZER_* prefix, nested keys joined by __)
      4. .env file in current directory

ENVIRONMENT VARIABLES
    GITHUB_TOKEN                      GitHub personal access token
    STARGAZER_GITHUB__TOKEN           GitHub personal access token (takes precedence)
    STARGAZER_GITHUB__API_URL         REST API base URL (default: https://api.github.com)
    STARGAZER_COLLECT__OUTPUT_DIR     Root directory for snapshots (default: .)
    STARGAZER_COLLECT__LIMIT          Default cap on new stargazers per run
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect new stargazers and write the next snapshot
    Collect(CollectArgs),
    /// Show current rate limit status
    Limits {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,

        /// GitHub token (overrides config and GITHUB_TOKEN)
        #[arg(short, long)]
        token: Option<String>,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate man pages
    Man {
        /// Directory to write man pages into (prints the main page to stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Structured logging only when not attached to a terminal
    if !Term::stdout().is_term() {
        let env_filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::new("stargazer=info,stargazer_cli=info"),
        };

        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    let config = config::Config::load();

    let cli = Cli::parse();

    match cli.command {
        Commands::Collect(args) => {
            let shutdown_flag = shutdown::setup_shutdown_handler();
            commands::collect::handle_collect(args, &config, shutdown_flag).await?;
        }
        Commands::Limits { output, token } => {
            let token = commands::collect::resolve_token(token.as_deref(), &config)?;
            let client = commands::collect::build_client(&token, &config, None, None, None)?;
            commands::limits::handle_limits(&client, output).await?;
        }
        Commands::Completions { shell } => {
            commands::meta::handle_completions(shell)?;
        }
        Commands::Man { output } => {
            commands::meta::handle_man(output)?;
        }
    }

    Ok(())
}
