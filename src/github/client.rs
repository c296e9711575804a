use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use git2::Repository;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{
    Issue, IssueTracker, NO_DESCRIPTION, PullRequestCreator, PullRequestDraft, parse_owner_repo,
};

const GITHUB_API_URL: &str = "https://api.github.com";
const USER_AGENT: &str = "relay-bot";

/// GitHub REST client for issue lookup and PR creation.
///
/// The target repository is taken from the checkout's `remote.origin.url`.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    token: Option<String>,
    api_url: String,
}

/// Labels arrive either as bare strings or as label objects.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LabelField {
    Name(String),
    Object { name: String },
}

#[derive(Debug, Deserialize)]
struct IssueResponse {
    number: u64,
    title: String,
    body: Option<String>,
    #[serde(default)]
    labels: Vec<LabelField>,
}

#[derive(Debug, Serialize)]
struct CreatePullRequest<'a> {
    title: &'a str,
    head: &'a str,
    base: &'a str,
    body: &'a str,
}

#[derive(Debug, Deserialize)]
struct PullRequestResponse {
    html_url: String,
}

impl From<IssueResponse> for Issue {
    fn from(resp: IssueResponse) -> Self {
        Issue {
            number: resp.number,
            title: resp.title,
            body: resp
                .body
                .filter(|b| !b.trim().is_empty())
                .unwrap_or_else(|| NO_DESCRIPTION.to_string()),
            labels: resp
                .labels
                .into_iter()
                .map(|l| match l {
                    LabelField::Name(name) | LabelField::Object { name } => name,
                })
                .collect(),
        }
    }
}

impl GitHubClient {
    pub fn new(token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            token,
            api_url: GITHUB_API_URL.to_string(),
        }
    }

    /// Point the client at a different API root (GitHub Enterprise).
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut req = self
            .http
            .request(method, format!("{}{}", self.api_url, path))
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", USER_AGENT);
        if let Some(token) = &self.token {
            req = req.header("Authorization", format!("Bearer {}", token));
        }
        req
    }

    async fn fetch_issue(&self, repo: &Path, number: u64) -> Result<Issue> {
        let (owner, name) = repo_slug(repo).await?;
        let resp: IssueResponse = self
            .request(
                reqwest::Method::GET,
                &format!("/repos/{}/{}/issues/{}", owner, name, number),
            )
            .send()
            .await
            .context("Failed to send issue request to GitHub")?
            .error_for_status()
            .context("GitHub issue API returned error status")?
            .json()
            .await
            .context("Failed to parse issue response from GitHub")?;
        Ok(resp.into())
    }

    async fn open_pull_request(
        &self,
        repo: &Path,
        branch: &str,
        draft: &PullRequestDraft,
    ) -> Result<String> {
        let (owner, name) = repo_slug(repo).await?;
        let payload = CreatePullRequest {
            title: &draft.title,
            head: branch,
            base: &draft.base,
            body: &draft.body,
        };
        let resp: PullRequestResponse = self
            .request(
                reqwest::Method::POST,
                &format!("/repos/{}/{}/pulls", owner, name),
            )
            .json(&payload)
            .send()
            .await
            .context("Failed to send pull request to GitHub")?
            .error_for_status()
            .context("GitHub pulls API returned error status")?
            .json()
            .await
            .context("Failed to parse pull request response from GitHub")?;
        Ok(resp.html_url)
    }
}

/// Read `remote.origin.url` from the checkout and parse `(owner, repo)`.
async fn repo_slug(repo: &Path) -> Result<(String, String)> {
    let path: PathBuf = repo.to_path_buf();
    let url = tokio::task::spawn_blocking(move || -> Result<String> {
        let repo = Repository::open(&path)
            .with_context(|| format!("Failed to open repository at {}", path.display()))?;
        let remote = repo.find_remote("origin").context("No 'origin' remote")?;
        remote
            .url()
            .map(str::to_string)
            .context("Remote 'origin' has no URL")
    })
    .await
    .context("Remote lookup task panicked")??;

    parse_owner_repo(&url)
        .with_context(|| format!("Could not parse GitHub repo from remote URL: {}", url))
}

#[async_trait]
impl IssueTracker for GitHubClient {
    async fn get_issue(&self, repo: &Path, number: u64) -> Option<Issue> {
        match self.fetch_issue(repo, number).await {
            Ok(issue) => Some(issue),
            Err(e) => {
                warn!(issue = number, error = %format!("{:#}", e), "failed to fetch issue");
                None
            }
        }
    }
}

#[async_trait]
impl PullRequestCreator for GitHubClient {
    async fn create_pull_request(
        &self,
        repo: &Path,
        branch: &str,
        draft: &PullRequestDraft,
    ) -> Option<String> {
        match self.open_pull_request(repo, branch, draft).await {
            Ok(url) => {
                info!(branch, url = %url, "pull request created");
                Some(url)
            }
            Err(e) => {
                warn!(branch, error = %format!("{:#}", e), "failed to create pull request");
                None
            }
        }
    }
}
