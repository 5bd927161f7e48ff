//! Provider facade: GitHub REST as the Log Collector and the comment surface.
//!
//! Only GitHub hosts the action, so there is a single concrete client; it is
//! still built from a generic [`ProviderConfig`] so tests can point it at a
//! mock server.

pub mod types;
pub use types::*;

pub mod github;
pub use github::GitHubClient;

use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};

use crate::errors::{ConfigError, RescueResult};

/// Default GitHub REST base.
pub const DEFAULT_GITHUB_API: &str = "https://api.github.com";

/// Runtime configuration for the provider client.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// API base, e.g. "https://api.github.com" (GHES: "https://host/api/v3").
    pub base_api: String,
    /// Access token (workflow `GITHUB_TOKEN` or a PAT).
    pub token: String,
    /// "owner/repo".
    pub repository: String,
}

/// Shared HTTP client with conservative timeouts.
pub(crate) fn build_http_client(token: &str) -> RescueResult<reqwest::Client> {
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(30))
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .default_headers(build_github_headers(token)?)
        .build()?;
    Ok(client)
}

fn build_github_headers(token: &str) -> RescueResult<HeaderMap> {
    let mut h = HeaderMap::new();
    h.insert(USER_AGENT, HeaderValue::from_static("ci-rescue/0.1"));
    h.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
    h.insert("X-GitHub-Api-Version", HeaderValue::from_static("2022-11-28"));
    let mut auth = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|e| {
        ConfigError::InvalidValue {
            var: "INPUT_GITHUB_TOKEN",
            reason: format!("not a valid header value: {e}"),
        }
    })?;
    auth.set_sensitive(true);
    h.insert(AUTHORIZATION, auth);
    Ok(h)
}
