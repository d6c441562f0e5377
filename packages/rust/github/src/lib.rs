//! GitHub transport for SeedHub.
//!
//! Raw manifest fetches, default-branch lookups and topic search against the
//! GitHub REST API. Every call is a single attempt with the configured
//! timeout; nothing here decides what a failure means for the run.

mod tree_url;

use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use seedhub_shared::{GitHubConfig, HubError, ManifestSource, RepoRef, Result};
use tracing::{debug, info, instrument};
use url::Url;

pub use tree_url::TreeUrl;

/// User-Agent string for all requests.
const USER_AGENT: &str = concat!("SeedHub/", env!("CARGO_PKG_VERSION"));

/// Page size for repository search (the API maximum).
const SEARCH_PAGE_SIZE: usize = 100;

/// The search API stops returning results after 1000 hits.
const MAX_SEARCH_PAGES: usize = 10;

// ---------------------------------------------------------------------------
// API response shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RepoInfo {
    default_branch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    name: String,
    owner: SearchOwner,
    #[serde(default)]
    default_branch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchOwner {
    login: String,
}

impl From<SearchItem> for RepoRef {
    fn from(item: SearchItem) -> Self {
        Self {
            owner: item.owner.login,
            repo: item.name,
            default_branch: item.default_branch.filter(|b| !b.is_empty()),
        }
    }
}

// ---------------------------------------------------------------------------
// GitHubClient
// ---------------------------------------------------------------------------

/// Authenticated (optionally) client for the REST API and raw-content host.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: Client,
    api_base: Url,
    raw_base: Url,
}

impl GitHubClient {
    /// Build a client from config. `token`, when present, is sent as a bearer token.
    pub fn new(config: &GitHubConfig, token: Option<&str>) -> Result<Self> {
        let api_base = parse_base(&config.api_base)?;
        let raw_base = parse_base(&config.raw_base)?;

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        if let Some(token) = token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| HubError::config("GitHub token contains invalid characters"))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| HubError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base,
            raw_base,
        })
    }

    /// `{raw}/{owner}/{repo}/{branch}/{path}` with each segment percent-encoded.
    fn raw_file_url(&self, repo: &RepoRef, branch: &str, path: &str) -> Result<Url> {
        let mut url = self.raw_base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| HubError::config(format!("raw base cannot be a base: {}", self.raw_base)))?;
            segments
                .pop_if_empty()
                .push(&repo.owner)
                .push(&repo.repo)
                .extend(branch.split('/'))
                .extend(path.split('/').filter(|s| !s.is_empty()));
        }
        Ok(url)
    }

    fn api_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.api_base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| HubError::config(format!("API base cannot be a base: {}", self.api_base)))?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    /// Issue a GET and map transport failures and non-success statuses.
    async fn get(&self, url: Url) -> Result<Response> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| HubError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(HubError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(HubError::Network(format!("{url}: HTTP {status}")));
        }

        Ok(response)
    }
}

impl ManifestSource for GitHubClient {
    #[instrument(skip_all, fields(repo = %repo, branch = %branch, path = %path))]
    async fn fetch_manifest(&self, repo: &RepoRef, branch: &str, path: &str) -> Result<String> {
        let url = self.raw_file_url(repo, branch, path)?;
        debug!(%url, "fetching manifest");

        let response = self.get(url.clone()).await?;
        response
            .text()
            .await
            .map_err(|e| HubError::Network(format!("{url}: failed to read body: {e}")))
    }

    #[instrument(skip_all, fields(repo = %repo))]
    async fn default_branch(&self, repo: &RepoRef) -> Result<String> {
        let url = self.api_url(&["repos", &repo.owner, &repo.repo])?;
        let response = self.get(url.clone()).await?;

        let info: RepoInfo = response
            .json()
            .await
            .map_err(|e| HubError::parse(format!("{url}: {e}")))?;

        info.default_branch
            .filter(|b| !b.is_empty())
            .ok_or_else(|| HubError::validation(format!("{url}: no default_branch in response")))
    }

    #[instrument(skip_all, fields(topic = %topic))]
    async fn search_by_topic(&self, topic: &str, owner: Option<&str>) -> Result<Vec<RepoRef>> {
        let query = match owner {
            Some(owner) => format!("topic:{topic} user:{owner}"),
            None => format!("topic:{topic}"),
        };

        let mut repos = Vec::new();
        for page in 1..=MAX_SEARCH_PAGES {
            let mut url = self.api_url(&["search", "repositories"])?;
            url.query_pairs_mut()
                .append_pair("q", &query)
                .append_pair("per_page", &SEARCH_PAGE_SIZE.to_string())
                .append_pair("page", &page.to_string());

            let response = self.get(url.clone()).await?;
            let body: SearchPage = response
                .json()
                .await
                .map_err(|e| HubError::parse(format!("{url}: {e}")))?;

            let count = body.items.len();
            debug!(page, count, "search page received");
            repos.extend(body.items.into_iter().map(RepoRef::from));

            if count < SEARCH_PAGE_SIZE {
                break;
            }
        }

        info!(%query, found = repos.len(), "topic discovery complete");
        Ok(repos)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_base(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| HubError::config(format!("invalid base URL '{raw}': {e}")))
}
