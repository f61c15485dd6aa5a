//! Application configuration and environment variable parsing.
//!
//! This module handles loading configuration settings from the environment (e.g., .env file).
//! It defines the `AppConfig` struct which governs the OAuth application credentials,
//! the listen port, upstream GitHub endpoints and session lifetimes.

use serde::Deserialize;
use std::time::Duration as StdDuration;

/// Application configuration loaded from environment variables.
#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    /// Client id of the GitHub OAuth application.
    pub github_client_id: String,

    /// Client secret of the GitHub OAuth application.
    pub github_client_secret: String,

    /// URL GitHub redirects back to after the user authorizes the application.
    /// Must point at `/auth/github/callback` on this service.
    pub callback_url: String,

    /// Port the HTTP server listens on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Where the dashboard UI lives. Used as the post-login redirect and the only CORS origin.
    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,

    /// Base URI of the GitHub REST API.
    #[serde(default = "default_github_api_url")]
    pub github_api_url: String,

    /// Host serving the GitHub OAuth authorize and token endpoints.
    #[serde(default = "default_github_oauth_url")]
    pub github_oauth_url: String,

    /// Lifetime of an authenticated session in seconds.
    #[serde(default = "default_session_ttl_seconds")]
    pub session_ttl_seconds: u64,

    /// Maximum number of live sessions kept in memory.
    #[serde(default = "default_session_max_capacity")]
    pub session_max_capacity: u64,

    /// Hard limit on the number of pull request pages (100 per page) fetched per repository.
    #[serde(default = "default_max_github_api_pages")]
    pub max_github_api_pages: u32,

    /// Emit log lines as JSON instead of human readable text.
    #[serde(default)]
    pub log_json: bool,
}

fn default_port() -> u16 {
    5000
}

fn default_frontend_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_github_oauth_url() -> String {
    "https://github.com".to_string()
}

fn default_session_ttl_seconds() -> u64 {
    24 * 60 * 60
}

fn default_session_max_capacity() -> u64 {
    10_000
}

fn default_max_github_api_pages() -> u32 {
    1
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::from_env()
    }

    pub fn session_ttl(&self) -> StdDuration {
        StdDuration::from_secs(self.session_ttl_seconds)
    }

    /// Builds a configuration with every optional setting at its default.
    pub fn with_credentials(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        callback_url: impl Into<String>,
    ) -> Self {
        Self {
            github_client_id: client_id.into(),
            github_client_secret: client_secret.into(),
            callback_url: callback_url.into(),
            port: default_port(),
            frontend_url: default_frontend_url(),
            github_api_url: default_github_api_url(),
            github_oauth_url: default_github_oauth_url(),
            session_ttl_seconds: default_session_ttl_seconds(),
            session_max_capacity: default_session_max_capacity(),
            max_github_api_pages: default_max_github_api_pages(),
            log_json: false,
        }
    }
}
