use pr_dashboard::error::ApiError;
use pr_dashboard::fetcher;
use pr_dashboard::github::GitHubClient;
use pr_dashboard::types::RepoId;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn repo_id() -> RepoId {
    RepoId {
        owner: "octo".to_string(),
        repo: "dash".to_string(),
    }
}

fn client(server: &MockServer, max_pages: u32) -> GitHubClient {
    GitHubClient::new(&server.uri(), max_pages)
        .unwrap()
        .for_user("gho_test")
        .unwrap()
}

fn pr(number: u64, login: &str) -> serde_json::Value {
    json!({
        "number": number,
        "title": format!("PR {number}"),
        "created_at": "2024-05-01T10:00:00Z",
        "merged_at": "2024-05-01T16:00:00Z",
        "user": { "login": login }
    })
}

async fn mount_paged_pulls(server: &MockServer) {
    let next = format!(
        "<{}/repos/octo/dash/pulls?state=all&per_page=100&page=2>; rel=\"next\"",
        server.uri()
    );

    Mock::given(method("GET"))
        .and(path("/repos/octo/dash/pulls"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([pr(1, "bob")])))
        .with_priority(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/repos/octo/dash/pulls"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Link", next.as_str())
                .set_body_json(json!([pr(3, "alice"), pr(2, "alice")])),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_pull_requests_stop_at_page_limit() {
    let server = MockServer::start().await;
    mount_paged_pulls(&server).await;

    let client = client(&server, 1);
    let prs = client.pull_requests(&repo_id()).await.unwrap();

    assert_eq!(prs.len(), 2);
    assert_eq!(prs[0].number, 3);
}

#[tokio::test]
async fn test_pull_requests_follow_next_page() {
    let server = MockServer::start().await;
    mount_paged_pulls(&server).await;

    let client = client(&server, 5);
    let prs = client.pull_requests(&repo_id()).await.unwrap();

    let numbers: Vec<u64> = prs.iter().map(|pr| pr.number).collect();
    assert_eq!(numbers, vec![3, 2, 1]);
}

#[tokio::test]
async fn test_fetch_repo_metrics_joins_branches_by_index() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/octo/dash/pulls"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([pr(1, "alice")])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/octo/dash/branches"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "name": "slow" },
            { "name": "fast" }
        ])))
        .mount(&server)
        .await;
    // The first branch answers last; results must still line up with the branch list.
    Mock::given(method("GET"))
        .and(path("/repos/octo/dash/commits"))
        .and(query_param("sha", "slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(std::time::Duration::from_millis(200))
                .set_body_json(json!([
                    { "commit": { "author": { "date": "2024-04-01T00:00:00Z" } } },
                    { "commit": { "author": { "date": "2024-04-02T00:00:00Z" } } }
                ])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/octo/dash/commits"))
        .and(query_param("sha", "fast"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "commit": { "author": { "date": "2024-05-01T00:00:00Z" } } }
        ])))
        .mount(&server)
        .await;

    let client = client(&server, 1);
    let payload = fetcher::fetch_repo_metrics(&client, &repo_id())
        .await
        .unwrap();

    assert_eq!(payload.total_branch_count, 2);
    assert_eq!(payload.branches[0].name, "slow");
    assert_eq!(payload.branches[0].commit_count, 2);
    assert_eq!(payload.branches[1].name, "fast");
    assert_eq!(payload.branches[1].commit_count, 1);
    assert_eq!(payload.pull_requests[0].merge_time_hours(), Some(6.0));
    assert_eq!(payload.average_merge_time_hours, 6.0);
}

#[tokio::test]
async fn test_fetch_repo_metrics_fails_on_pull_request_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/octo/dash/pulls"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "message": "Not Found" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/octo/dash/branches"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let client = client(&server, 1);
    let err = fetcher::fetch_repo_metrics(&client, &repo_id())
        .await
        .unwrap_err();

    let message = ApiError::from(err).to_string();
    assert!(message.contains("Not Found"), "{message}");
    assert!(message.contains("404"), "{message}");
}

#[tokio::test]
async fn test_user_client_sends_access_token() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/user"))
        .and(header("authorization", "Bearer gho_test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 1,
            "login": "octocat"
        })))
        .mount(&server)
        .await;

    let profile = client(&server, 1).current_user().await.unwrap();
    assert_eq!(profile.login, "octocat");
}
