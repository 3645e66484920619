//! GitHub token discovery: config, then `GITHUB_TOKEN`, then the gh CLI

use crate::config::schema::GithubConfig;
use crate::error::{RepoCacheError, RepoCacheResult};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Environment variable checked after the config file
pub const TOKEN_ENV: &str = "GITHUB_TOKEN";

/// GitHub credential provider
pub struct GithubCredentials;

impl GithubCredentials {
    /// Resolve a token, or `None` to run unauthenticated.
    pub async fn resolve(config: &GithubConfig) -> RepoCacheResult<Option<String>> {
        if let Some(token) = config.token.as_deref().filter(|t| !t.trim().is_empty()) {
            debug!("Using GitHub token from config");
            return Ok(Some(token.trim().to_string()));
        }

        if let Some(token) = std::env::var(TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty())
        {
            debug!("Using GitHub token from {}", TOKEN_ENV);
            return Ok(Some(token.trim().to_string()));
        }

        match Self::get_token(config).await {
            Ok(token) => Ok(Some(token)),
            Err(RepoCacheError::GithubNotAuthenticated) => Ok(None),
            Err(e) => {
                debug!("gh CLI token lookup failed: {}", e);
                Ok(None)
            }
        }
    }

    /// Get GitHub token from gh CLI
    pub async fn get_token(config: &GithubConfig) -> RepoCacheResult<String> {
        debug!("Getting GitHub token from gh CLI...");

        let mut cmd = Command::new("gh");
        cmd.args(["auth", "token"]);

        if let Some(host) = config.host().filter(|h| *h != "github.com") {
            cmd.args(["--hostname", host]);
        }

        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        let output = cmd
            .output()
            .await
            .map_err(|e| RepoCacheError::io("running gh auth token", e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("not logged in") || stderr.contains("gh auth login") {
                return Err(RepoCacheError::GithubNotAuthenticated);
            }
            return Err(RepoCacheError::User(format!(
                "gh auth token failed: {}",
                stderr.trim()
            )));
        }

        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if token.is_empty() {
            return Err(RepoCacheError::GithubNotAuthenticated);
        }

        Ok(token)
    }
}
