//! Client for the courseqa server's run history.

use courseqa_core::RunWithScore;
use reqwest::{Client, Url};
use serde::Deserialize;

use crate::CliResult;

/// Body of `GET /api/projects/{id}/scan-runs`.
#[derive(Debug, Deserialize)]
pub(crate) struct ScanRunsResponse {
    pub(crate) runs: Vec<RunWithScore>,
    pub(crate) total: usize,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Build the HTTP client used against the server.
pub(crate) fn build_client() -> CliResult<Client> {
    Ok(Client::builder().user_agent("courseqa-cli").build()?)
}

fn scan_runs_url(server_url: &str, project_id: &str) -> CliResult<Url> {
    let mut url = Url::parse(server_url)?;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|()| format!("invalid server URL: {server_url}"))?;
        segments
            .pop_if_empty()
            .extend(["api", "projects", project_id, "scan-runs"]);
    }
    Ok(url)
}

/// Fetch every run of a project, newest first.
pub(crate) async fn fetch_scan_runs(
    client: &Client,
    server_url: &str,
    project_id: &str,
) -> CliResult<ScanRunsResponse> {
    let url = scan_runs_url(server_url, project_id)?;
    log::debug!("fetching {url}");
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|parsed| parsed.error)
            .unwrap_or(body);
        return Err(format!("server returned {status}: {message}").into());
    }
    Ok(response.json::<ScanRunsResponse>().await?)
}

#[cfg(test)]
mod tests {
    use super::{build_client, fetch_scan_runs, scan_runs_url};
    use courseqa_core::{RunWithScore, ScanRun};
    use httpmock::prelude::*;
    use serde_json::json;

    fn sample_run(id: &str) -> RunWithScore {
        let run: ScanRun = serde_json::from_value(json!({
            "id": id,
            "projectId": "p1",
            "status": "completed",
            "startedAt": "2026-01-01T10:00:00Z",
            "finishedAt": "2026-01-01T10:00:05Z",
            "errorText": null,
            "createdAt": "2026-01-01T10:00:00Z"
        }))
        .expect("run");
        RunWithScore { run, score: None }
    }

    #[test]
    fn builds_scan_runs_urls() {
        let url = scan_runs_url("http://localhost:8080/", "p 1").expect("url");
        assert_eq!(url.as_str(), "http://localhost:8080/api/projects/p%201/scan-runs");

        let url = scan_runs_url("http://localhost:8080/qa", "p1").expect("url");
        assert_eq!(url.as_str(), "http://localhost:8080/qa/api/projects/p1/scan-runs");

        assert!(scan_runs_url("not a url", "p1").is_err());
    }

    #[tokio::test]
    async fn fetches_runs() {
        let server = MockServer::start_async().await;
        let runs = vec![sample_run("r2"), sample_run("r1")];
        let body = json!({ "runs": runs, "total": 2 });
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/api/projects/p1/scan-runs");
                then.status(200).json_body(body);
            })
            .await;

        let client = build_client().expect("client");
        let response = fetch_scan_runs(&client, &server.base_url(), "p1")
            .await
            .expect("runs");
        mock.assert_async().await;
        assert_eq!(response.total, 2);
        assert_eq!(response.runs[0].run.id, "r2");
        assert!(response.runs[1].score.is_none());
    }

    #[tokio::test]
    async fn surfaces_server_errors() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/projects/missing/scan-runs");
                then.status(404)
                    .json_body(json!({ "error": "Project not found" }));
            })
            .await;

        let client = build_client().expect("client");
        let error = fetch_scan_runs(&client, &server.base_url(), "missing")
            .await
            .expect_err("not found");
        assert_eq!(
            error.to_string(),
            "server returned 404 Not Found: Project not found"
        );
    }
}
