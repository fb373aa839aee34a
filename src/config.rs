use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::time::Duration;
use url::Url;

use crate::models::ProgressTermination;
use crate::services::webdav::common::build_user_agent;

/// Connection settings for a single WebDAV server
#[derive(Clone, Serialize, Deserialize)]
pub struct WebDAVConfig {
    pub server_url: String,
    pub username: String,
    pub password: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub progress_termination: ProgressTermination,
}

fn default_timeout_seconds() -> u64 {
    30
}

impl WebDAVConfig {
    pub fn new(
        server_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            server_url: server_url.into(),
            username: username.into(),
            password: password.into(),
            timeout_seconds: default_timeout_seconds(),
            user_agent: None,
            progress_termination: ProgressTermination::default(),
        }
    }

    /// Loads the configuration from `WEBDAV_*` environment variables.
    ///
    /// A `.env` file in the working directory is read first when present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let server_url = env::var("WEBDAV_SERVER_URL")
            .map_err(|_| anyhow!("WEBDAV_SERVER_URL must be set"))?;
        let username = env::var("WEBDAV_USERNAME").unwrap_or_default();
        let password = env::var("WEBDAV_PASSWORD").unwrap_or_default();

        let mut config = Self::new(server_url, username, password);

        if let Ok(timeout) = env::var("WEBDAV_TIMEOUT_SECONDS") {
            config.timeout_seconds = timeout
                .parse()
                .map_err(|e| anyhow!("Invalid WEBDAV_TIMEOUT_SECONDS '{}': {}", timeout, e))?;
        }

        if let Ok(user_agent) = env::var("WEBDAV_USER_AGENT") {
            config.user_agent = Some(user_agent);
        }

        if let Ok(termination) = env::var("WEBDAV_PROGRESS_TERMINATION") {
            config.progress_termination = match termination.as_str() {
                "download_complete" => ProgressTermination::DownloadComplete,
                "complete_or_error" => ProgressTermination::CompleteOrError,
                other => {
                    return Err(anyhow!(
                        "Invalid WEBDAV_PROGRESS_TERMINATION '{}': expected 'download_complete' or 'complete_or_error'",
                        other
                    ))
                }
            };
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.server_url)
            .map_err(|e| anyhow!("Invalid server URL '{}': {}", self.server_url, e))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(anyhow!(
                "Server URL must use http or https, got '{}'",
                url.scheme()
            ));
        }

        if self.timeout_seconds == 0 {
            return Err(anyhow!("Timeout must be greater than zero"));
        }

        Ok(())
    }

    /// The server URL with a guaranteed trailing `/`.
    ///
    /// Relative addresses are resolved against this, so without the slash the
    /// last path segment would be replaced instead of extended.
    pub fn base_url(&self) -> std::result::Result<Url, url::ParseError> {
        if self.server_url.ends_with('/') {
            Url::parse(&self.server_url)
        } else {
            Url::parse(&format!("{}/", self.server_url))
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn user_agent(&self) -> String {
        self.user_agent.clone().unwrap_or_else(build_user_agent)
    }

    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_progress_termination(mut self, termination: ProgressTermination) -> Self {
        self.progress_termination = termination;
        self
    }
}

impl fmt::Debug for WebDAVConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebDAVConfig")
            .field("server_url", &self.server_url)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("timeout_seconds", &self.timeout_seconds)
            .field("user_agent", &self.user_agent)
            .field("progress_termination", &self.progress_termination)
            .finish()
    }
}
