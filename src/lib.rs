pub mod auth;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod github;
pub mod metrics;
pub mod session;
pub mod types;

use auth::GitHubOAuth;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderValue, Method},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use config::AppConfig;
use error::ApiError;
use github::GitHubClient;
use metrics::{MetricsPayload, PullRequestActivity, TimeBucketSeries, TimeRange};
use serde::{Deserialize, Serialize};
use session::{Identity, SessionStore};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use types::{RepoDescriptor, RepoId};

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

/// Shared application state accessible to all request handlers.
pub struct AppState {
    /// Application configuration loaded from environment variables.
    pub config: AppConfig,
    /// Live sessions and pending logins.
    pub sessions: SessionStore,
    /// OAuth client for the GitHub login flow.
    pub oauth: GitHubOAuth,
    /// Shared GitHub client; per-user clients are derived from it.
    pub github: GitHubClient,
}

impl AppState {
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        let sessions = SessionStore::new(&config);
        let oauth = GitHubOAuth::new(&config)?;
        let github = GitHubClient::new(&config.github_api_url, config.max_github_api_pages)?;
        Ok(Self {
            config,
            sessions,
            oauth,
            github,
        })
    }

    /// A GitHub client acting on behalf of `identity`.
    pub fn github_client(&self, identity: &Identity) -> Result<GitHubClient, ApiError> {
        Ok(self.github.for_user(&identity.access_token)?)
    }
}

/// Rejects path parameters that are empty once made safe for an upstream route.
fn checked_repo_id(repo_id: RepoId) -> Result<RepoId, ApiError> {
    repo_id
        .sanitized()
        .ok_or_else(|| ApiError::BadRequest(format!("invalid repository {repo_id}")))
}

pub fn create_app(state: Arc<AppState>) -> anyhow::Result<Router> {
    let cors = CorsLayer::new()
        .allow_origin(state.config.frontend_url.parse::<HeaderValue>()?)
        .allow_methods([Method::GET])
        .allow_credentials(true);

    Ok(Router::new()
        .route("/api/health", get(health_check))
        .route("/auth/github", get(auth::begin_login))
        .route("/auth/github/callback", get(auth::login_callback))
        .route("/auth/user", get(auth::current_user))
        .route("/api/repos", get(get_user_repos))
        .route("/api/repos/{owner}/{repo}/metrics", get(get_repo_metrics))
        .route("/api/repos/{owner}/{repo}/charts", get(get_repo_charts))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "pr-dashboard",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn get_user_repos(
    identity: Identity,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<RepoDescriptor>>, ApiError> {
    let client = state.github_client(&identity)?;
    let repos = fetcher::fetch_user_repos(&client).await?;
    Ok(Json(repos))
}

pub async fn get_repo_metrics(
    identity: Identity,
    Path(repo_id): Path<RepoId>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<MetricsPayload>, ApiError> {
    tracing::info!(repo_id = %repo_id, login = %identity.profile.login, "Handling metrics request");

    let repo_id = checked_repo_id(repo_id)?;
    let client = state.github_client(&identity)?;
    let metrics = fetcher::fetch_repo_metrics(&client, &repo_id).await?;
    Ok(Json(metrics))
}

#[derive(Debug, Deserialize)]
pub struct ChartsQuery {
    /// Lookback in months, 3 or 6. Defaults to 3.
    pub months: Option<u32>,
    /// Author login whose merged pull requests are overlaid on the team series.
    pub contributor: Option<String>,
}

/// Weekly series for every dashboard chart of one repository.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartsResponse {
    pub range: TimeRange,
    pub merged_pull_requests: TimeBucketSeries<u32>,
    pub contributors: BTreeMap<String, u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contributor_merged: Option<TimeBucketSeries<u32>>,
    pub merge_time: TimeBucketSeries<f64>,
    pub branch_activity: TimeBucketSeries<u32>,
}

impl ChartsResponse {
    pub fn build(
        payload: &MetricsPayload,
        range: TimeRange,
        contributor: Option<&str>,
        now: DateTime<Utc>,
    ) -> Self {
        let PullRequestActivity {
            merged,
            contributors,
        } = metrics::aggregate_pull_requests(&payload.pull_requests, range, now);

        let contributor_merged = contributor.map(|author| {
            metrics::aggregate_contributor(
                &payload.pull_requests,
                author,
                range,
                now,
                merged.labels(),
            )
        });

        Self {
            range,
            contributor_merged,
            merge_time: metrics::aggregate_merge_time(&payload.pull_requests, range, now),
            branch_activity: metrics::aggregate_branch_activity(&payload.branches, range, now),
            merged_pull_requests: merged,
            contributors,
        }
    }
}

pub async fn get_repo_charts(
    identity: Identity,
    Path(repo_id): Path<RepoId>,
    Query(query): Query<ChartsQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<ChartsResponse>, ApiError> {
    let range = match query.months {
        None => TimeRange::default(),
        Some(months) => TimeRange::from_months(months).ok_or_else(|| {
            ApiError::BadRequest(format!("unsupported range of {months} months, use 3 or 6"))
        })?,
    };

    let repo_id = checked_repo_id(repo_id)?;
    let client = state.github_client(&identity)?;
    let payload = fetcher::fetch_repo_metrics(&client, &repo_id).await?;

    tracing::debug!(repo_id = %repo_id, months = range.months(), "Returning chart series");
    Ok(Json(ChartsResponse::build(
        &payload,
        range,
        query.contributor.as_deref(),
        Utc::now(),
    )))
}
