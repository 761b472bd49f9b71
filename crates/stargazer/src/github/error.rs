//! GitHub API error types.

use thiserror::Error;

use crate::executor::ExecuteError;
use crate::http::HttpError;

/// Errors that can occur when interacting with the GitHub API.
#[derive(Debug, Error)]
pub enum GitHubError {
    #[error(transparent)]
    Execute(#[from] ExecuteError),

    #[error("could not decode {what}: {source}")]
    Decode {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(#[from] HttpError),
}

impl GitHubError {
    /// Status code, when the platform answered with a failure.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Execute(e) => e.status(),
            _ => None,
        }
    }
}

/// Get a short error message suitable for display.
pub fn short_error_message(err: &GitHubError) -> String {
    match err {
        GitHubError::Execute(ExecuteError::Status { status, .. }) => format!("HTTP {status}"),
        GitHubError::Execute(ExecuteError::Transport { .. }) => "Network error".to_string(),
        GitHubError::Execute(ExecuteError::Interrupted) => "Interrupted".to_string(),
        GitHubError::Decode { what, .. } => format!("Malformed {what}"),
        GitHubError::Config(_) => "Configuration error".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quota::QuotaState;

    fn status_error(status: u16) -> GitHubError {
        GitHubError::Execute(ExecuteError::Status {
            status,
            body: "{\"message\":\"Not Found\"}".to_string(),
            quota: QuotaState {
                remaining: 10,
                reset_at: chrono::Utc::now(),
            },
        })
    }

    #[test]
    fn test_status_is_exposed() {
        assert_eq!(status_error(404).status(), Some(404));

        let transport = GitHubError::Execute(ExecuteError::Transport {
            source: HttpError::Transport("reset".to_string()),
            attempts: 3,
        });
        assert_eq!(transport.status(), None);
    }

    #[test]
    fn test_short_error_message() {
        assert_eq!(short_error_message(&status_error(500)), "HTTP 500");

        let decode = GitHubError::Decode {
            what: "stargazer page 3".to_string(),
            source: serde_json::from_str::<u32>("nope").unwrap_err(),
        };
        assert_eq!(short_error_message(&decode), "Malformed stargazer page 3");

        let interrupted = GitHubError::Execute(ExecuteError::Interrupted);
        assert_eq!(short_error_message(&interrupted), "Interrupted");
        assert_eq!(interrupted.status(), None);
    }
}
