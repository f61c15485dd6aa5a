//! Thin, typed access to the GitHub REST API on behalf of a signed-in user.
//!
//! Responses are decoded into the small schemas below instead of octocrab's full models,
//! so only the fields the dashboard reads have to be present.

use crate::types::{RepoDescriptor, RepoId, UserProfile};
use chrono::{DateTime, Utc};
use octocrab::{Octocrab, Page};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const PER_PAGE: u8 = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubUser {
    pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubPR {
    pub number: u64,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub merged_at: Option<DateTime<Utc>>,
    pub user: Option<GitHubUser>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubBranch {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubCommit {
    pub commit: GitHubCommitDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubCommitDetail {
    pub author: Option<GitHubSignature>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubSignature {
    pub date: Option<DateTime<Utc>>,
}

impl GitHubCommit {
    pub fn authored_at(&self) -> Option<DateTime<Utc>> {
        self.commit.author.as_ref().and_then(|author| author.date)
    }
}

#[derive(Debug, Serialize)]
struct ListQuery<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
    per_page: u8,
}

impl Default for ListQuery<'_> {
    fn default() -> Self {
        Self {
            state: None,
            sha: None,
            per_page: PER_PAGE,
        }
    }
}

#[derive(Clone)]
pub struct GitHubClient {
    octocrab: Octocrab,
    max_pages: u32,
}

impl GitHubClient {
    /// Builds the shared, unauthenticated client. Built once at startup; per-user clients
    /// are derived from it with [`GitHubClient::for_user`].
    pub fn new(base_uri: &str, max_pages: u32) -> anyhow::Result<Self> {
        let octocrab = Octocrab::builder().base_uri(base_uri)?.build()?;

        Ok(Self {
            octocrab,
            max_pages: max_pages.max(1),
        })
    }

    /// A client that authenticates every call with the user's OAuth access token.
    ///
    /// Shares the underlying HTTP client, and with it the connection pool, with `self`.
    pub fn for_user(&self, access_token: &str) -> octocrab::Result<Self> {
        Ok(Self {
            octocrab: self.octocrab.user_access_token(access_token.to_string())?,
            max_pages: self.max_pages,
        })
    }

    pub async fn current_user(&self) -> octocrab::Result<UserProfile> {
        self.octocrab.get("/user", None::<&()>).await
    }

    pub async fn user_repos(&self) -> octocrab::Result<Vec<RepoDescriptor>> {
        let query = ListQuery::default();
        self.octocrab.get("/user/repos", Some(&query)).await
    }

    /// Lists pull requests in every state, newest first, following at most `max_pages` pages.
    pub async fn pull_requests(&self, repo_id: &RepoId) -> octocrab::Result<Vec<GitHubPR>> {
        let route = format!("/repos/{}/{}/pulls", repo_id.owner, repo_id.repo);
        let query = ListQuery {
            state: Some("all"),
            ..ListQuery::default()
        };
        self.get_pages(&route, &query, repo_id).await
    }

    pub async fn branches(&self, repo_id: &RepoId) -> octocrab::Result<Vec<GitHubBranch>> {
        let route = format!("/repos/{}/{}/branches", repo_id.owner, repo_id.repo);
        self.octocrab.get(route, Some(&ListQuery::default())).await
    }

    /// Most recent commits reachable from `branch`.
    pub async fn branch_commits(
        &self,
        repo_id: &RepoId,
        branch: &str,
    ) -> octocrab::Result<Vec<GitHubCommit>> {
        let route = format!("/repos/{}/{}/commits", repo_id.owner, repo_id.repo);
        let query = ListQuery {
            sha: Some(branch),
            ..ListQuery::default()
        };
        self.octocrab.get(route, Some(&query)).await
    }

    async fn get_pages<T: DeserializeOwned>(
        &self,
        route: &str,
        query: &ListQuery<'_>,
        repo_id: &RepoId,
    ) -> octocrab::Result<Vec<T>> {
        let mut current_page: Page<T> = self.octocrab.get(route, Some(query)).await?;
        let mut items = std::mem::take(&mut current_page.items);
        let mut page_count = 1;

        while page_count < self.max_pages {
            match self.octocrab.get_page::<T>(&current_page.next).await? {
                Some(mut next_page) => {
                    items.append(&mut next_page.items);
                    current_page = next_page;
                    page_count += 1;
                }
                None => return Ok(items),
            }
        }

        if current_page.next.is_some() {
            tracing::warn!(
                "Hit max_github_api_pages ({}) for repo {}. Data may be incomplete.",
                self.max_pages,
                repo_id
            );
        }

        Ok(items)
    }
}
