use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::Deserialize;
use std::env;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::GitHubConfig;

/// Repository as returned by the GitHub listing endpoints
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RemoteRepository {
    pub name: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub default_branch: Option<String>,
    #[serde(default)]
    pub fork: Option<bool>,
}

/// GitHub authentication strategies
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStrategy {
    /// Token read from the configured token file
    TokenFile,
    /// Use environment variable token
    EnvironmentToken,
    /// Unauthenticated requests
    Anonymous,
}

/// GitHub client wrapper with authentication management
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    per_page: u32,
}

impl GitHubClient {
    /// Create a new GitHub client, authenticating if a token is available
    pub fn new(config: &GitHubConfig) -> Result<Self> {
        let (auth_strategy, token) = Self::detect_authentication(config)?;

        info!("Using authentication strategy: {:?}", auth_strategy);

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        if let Some(token) = token {
            let mut value = HeaderValue::from_str(&format!("token {}", token))
                .context("GitHub token contains invalid header characters")?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .user_agent(concat!("roomservice/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .context("Failed to create GitHub client")?;

        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            per_page: config.per_page,
        })
    }

    /// Token file first, then `GITHUB_TOKEN`, otherwise anonymous
    fn detect_authentication(config: &GitHubConfig) -> Result<(AuthStrategy, Option<String>)> {
        if let Some(token) = Self::try_token_file(Path::new(&config.token_file))? {
            return Ok((AuthStrategy::TokenFile, Some(token)));
        }
        if let Some(token) = Self::try_environment_token() {
            return Ok((AuthStrategy::EnvironmentToken, Some(token)));
        }
        Ok((AuthStrategy::Anonymous, None))
    }

    /// Read the first line of the token file, if it exists
    fn try_token_file(path: &Path) -> Result<Option<String>> {
        if !path.is_file() {
            debug!("No token file at {}", path.display());
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read token file: {:?}", path))?;
        let token = content.lines().next().unwrap_or("").trim().to_string();

        if token.is_empty() {
            warn!("Token file {} is empty, ignoring it", path.display());
            return Ok(None);
        }

        debug!("Using token from {}", path.display());
        Ok(Some(token))
    }

    fn try_environment_token() -> Option<String> {
        env::var("GITHUB_TOKEN")
            .ok()
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
    }

    /// List every repository of `account`, page by page until an empty page
    pub async fn list_account_repositories(&self, account: &str) -> Result<Vec<RemoteRepository>> {
        debug!("Fetching repositories for account: {}", account);

        let url = format!("{}/users/{}/repos", self.api_url, account);
        let mut repositories = Vec::new();
        let mut page = 1u32;

        loop {
            let items: Vec<RemoteRepository> = self
                .http
                .get(&url)
                .query(&[("page", page), ("per_page", self.per_page)])
                .send()
                .await
                .with_context(|| format!("Failed to fetch repositories of {} page {}", account, page))?
                .error_for_status()
                .with_context(|| format!("GitHub refused repository listing of {} page {}", account, page))?
                .json()
                .await
                .with_context(|| format!("Invalid repository listing of {} page {}", account, page))?;

            if items.is_empty() {
                break;
            }

            repositories.extend(items);
            page += 1;
        }

        info!("Found {} repositories for {}", repositories.len(), account);
        Ok(repositories)
    }
}
