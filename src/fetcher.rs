use crate::github::{GitHubBranch, GitHubClient, GitHubCommit, GitHubPR};
use crate::metrics::{BranchSummary, MetricsPayload, PullRequestRecord};
use crate::types::{RepoDescriptor, RepoId};
use futures::future::try_join_all;

/// Login reported for pull requests whose author account no longer exists.
const GHOST_LOGIN: &str = "ghost";

pub async fn fetch_user_repos(client: &GitHubClient) -> octocrab::Result<Vec<RepoDescriptor>> {
    let repos = client.user_repos().await?;
    tracing::debug!(count = repos.len(), "Fetched user repositories");
    Ok(repos)
}

/// Fetches pull requests, branches and per-branch commits and assembles the metrics payload.
///
/// Pull requests and branches are requested together, then the commit history of every
/// branch is requested concurrently. The first upstream failure fails the whole call.
/// `repo_id` is spliced into API routes as is; callers pass a [`RepoId::sanitized`] one.
pub async fn fetch_repo_metrics(
    client: &GitHubClient,
    repo_id: &RepoId,
) -> octocrab::Result<MetricsPayload> {
    let (prs, branches) = tokio::try_join!(
        client.pull_requests(repo_id),
        client.branches(repo_id)
    )?;

    // try_join_all yields results in input order, so commits line up with `branches` by index.
    let branch_commits = try_join_all(
        branches
            .iter()
            .map(|branch| client.branch_commits(repo_id, &branch.name)),
    )
    .await?;

    let pull_requests: Vec<PullRequestRecord> = prs.into_iter().map(to_record).collect();
    let branches: Vec<BranchSummary> = branches
        .into_iter()
        .zip(branch_commits)
        .map(|(branch, commits)| summarize_branch(branch, &commits))
        .collect();

    tracing::info!(
        repo_id = %repo_id,
        prs = pull_requests.len(),
        merged = pull_requests.iter().filter(|pr| pr.is_merged()).count(),
        branches = branches.len(),
        "Assembled repository metrics"
    );

    Ok(MetricsPayload::new(pull_requests, branches))
}

fn to_record(pr: GitHubPR) -> PullRequestRecord {
    let author = pr
        .user
        .map(|user| user.login)
        .unwrap_or_else(|| GHOST_LOGIN.to_string());

    PullRequestRecord::new(
        pr.number,
        pr.title.unwrap_or_default(),
        pr.created_at,
        pr.merged_at,
        author,
    )
}

fn summarize_branch(branch: GitHubBranch, commits: &[GitHubCommit]) -> BranchSummary {
    BranchSummary::from_commits(
        branch.name,
        commits.len(),
        commits.iter().filter_map(GitHubCommit::authored_at),
    )
}
