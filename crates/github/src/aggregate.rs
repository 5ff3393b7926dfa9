use std::collections::HashMap;

use anyhow::{Context, Result};
use buildboard_core::{
    models::{
        Artifact, ArtifactKind, CommitInfo, DEFAULT_DESCRIPTION, Plugin, ReleaseInfo,
        WorkflowRunInfo, sort_artifacts,
    },
    util::{download_path, filename_from_url},
};
use futures_util::future::{join, join_all};
use time::OffsetDateTime;

use crate::{
    FetchError, GitHub, fan_out,
    filter::relevant_repositories,
    schema::{ArtifactResponse, ReleaseResponse},
};

const UNKNOWN: &str = "unknown";

/// Build the plugin for one repository.
///
/// Returns `None` when the repository does not exist or any required fetch fails;
/// callers omit the repository in that case.
pub async fn build_plugin(github: &GitHub, repo: &str) -> Option<Plugin> {
    match try_build_plugin(github, repo).await {
        Ok(Some(plugin)) => Some(plugin),
        Ok(None) => {
            tracing::debug!("Repository {} not found, skipping", repo);
            None
        }
        Err(e) => {
            tracing::error!("Failed to build plugin for {}: {:?}", repo, e);
            None
        }
    }
}

async fn try_build_plugin(github: &GitHub, repo: &str) -> Result<Option<Plugin>> {
    let repository = match github.get_repository(repo).await {
        Ok(repository) => repository,
        Err(FetchError::NotFound) => return Ok(None),
        Err(e) => return Err(e).context("Failed to fetch repository"),
    };

    let (artifacts, releases) = join(github.list_artifacts(repo), github.list_releases(repo)).await;
    let artifacts = artifacts.context("Failed to fetch artifacts")?;
    let releases = releases.context("Failed to fetch releases")?;

    let mut result = artifacts
        .into_iter()
        .filter_map(|artifact| normalize_artifact(repo, artifact))
        .chain(releases.into_iter().flat_map(normalize_release))
        .filter(Artifact::is_retained)
        .collect::<Vec<_>>();

    let commits = resolve_commits(github, repo, &result).await;
    for artifact in &mut result {
        artifact.commit_info = commits.get(&artifact.workflow_run.head_sha).cloned();
    }
    sort_artifacts(&mut result);

    Ok(Some(Plugin {
        name: repository.name,
        repo_name: repo.to_string(),
        description: repository
            .description
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
        artifacts: result,
    }))
}

/// Fetch commit info once per distinct SHA. Misses are left out of the map.
async fn resolve_commits(
    github: &GitHub,
    repo: &str,
    artifacts: &[Artifact],
) -> HashMap<String, CommitInfo> {
    let mut shas = artifacts
        .iter()
        .map(|a| a.workflow_run.head_sha.as_str())
        .filter(|sha| !sha.is_empty() && *sha != UNKNOWN)
        .collect::<Vec<_>>();
    shas.sort_unstable();
    shas.dedup();
    let results = join_all(shas.into_iter().map(|sha| async move {
        github.get_commit(repo, sha).await.map(|info| (sha.to_string(), info))
    }))
    .await;
    results.into_iter().flatten().collect()
}

/// Workflow artifacts that expired or have no archive URL are dropped.
pub fn normalize_artifact(repo: &str, artifact: ArtifactResponse) -> Option<Artifact> {
    if artifact.expired {
        return None;
    }
    let Some(archive_url) = artifact.archive_download_url else {
        tracing::warn!("Artifact {} in {} has no download URL", artifact.name, repo);
        return None;
    };
    let created_at = artifact.created_at.unwrap_or(OffsetDateTime::UNIX_EPOCH);
    let run = artifact.workflow_run.unwrap_or_default();
    Some(Artifact {
        download_url: download_path(&archive_url, &artifact.name),
        name: artifact.name,
        created_at,
        size: artifact.size_in_bytes,
        expires_at: artifact.expires_at,
        workflow_run: WorkflowRunInfo {
            head_sha: run.head_sha.unwrap_or_else(|| UNKNOWN.to_string()),
            head_branch: run.head_branch.unwrap_or_else(|| UNKNOWN.to_string()),
            conclusion: run.conclusion,
            created_at,
        },
        commit_info: None,
        kind: ArtifactKind::Workflow,
        release_info: None,
    })
}

/// One artifact per release asset. Drafts produce nothing.
pub fn normalize_release(release: ReleaseResponse) -> Vec<Artifact> {
    if release.draft {
        return vec![];
    }
    let released_at = release.published_at.or(release.created_at);
    let head_sha = release.target_commitish.clone().unwrap_or_else(|| UNKNOWN.to_string());
    let info = ReleaseInfo {
        tag_name: release.tag_name.clone(),
        name: release.name.clone(),
        body: release.body.clone(),
        html_url: release.html_url.clone(),
        prerelease: release.prerelease,
    };
    release
        .assets
        .into_iter()
        .map(|asset| {
            let name = asset
                .name
                .filter(|n| !n.is_empty())
                .or_else(|| filename_from_url(&asset.browser_download_url))
                .unwrap_or_else(|| release.tag_name.clone());
            let created_at =
                asset.created_at.or(released_at).unwrap_or(OffsetDateTime::UNIX_EPOCH);
            Artifact {
                download_url: download_path(&asset.browser_download_url, &name),
                name,
                created_at,
                size: asset.size,
                expires_at: None,
                workflow_run: WorkflowRunInfo {
                    head_sha: head_sha.clone(),
                    head_branch: release.tag_name.clone(),
                    conclusion: None,
                    created_at,
                },
                commit_info: None,
                kind: ArtifactKind::Release,
                release_info: Some(info.clone()),
            }
        })
        .collect()
}

/// Aggregate every repository concurrently. Results keep input order; failed
/// repositories are omitted.
pub async fn build_plugins(
    github: &GitHub,
    names: impl IntoIterator<Item = String>,
) -> Vec<Plugin> {
    let plugins =
        fan_out(github.concurrency(), names, |name| async move { build_plugin(github, &name).await })
            .await;
    plugins.into_iter().flatten().collect()
}

/// Full pass: list, filter, aggregate. Only the repository listing can fail it.
pub async fn collect_plugins(github: &GitHub) -> Result<Vec<Plugin>, FetchError> {
    let repos = relevant_repositories(github).await?;
    let plugins = build_plugins(github, repos).await;
    tracing::debug!("Aggregated {} plugins", plugins.len());
    Ok(plugins)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use time::macros::datetime;
    use wiremock::{MockServer, ResponseTemplate};

    use super::*;
    use crate::test_util::{client, mount_json, mount_status, not_found};

    async fn mount_repository(server: &MockServer, repo: &str, description: Option<&str>) {
        mount_json(
            server,
            &format!("/repos/acme/{repo}"),
            json!({ "name": repo, "description": description }),
        )
        .await;
    }

    fn commit_body(sha: &str, message: &str) -> serde_json::Value {
        json!({
            "sha": sha,
            "commit": { "message": message },
            "stats": { "additions": 2, "deletions": 0, "total": 2 },
            "files": [{ "filename": "README.md", "additions": 2, "deletions": 0, "status": "added" }]
        })
    }

    #[tokio::test]
    async fn failed_run_artifacts_are_dropped() {
        let server = MockServer::start().await;
        mount_repository(&server, "app", Some("An app")).await;
        mount_json(
            &server,
            "/repos/acme/app/actions/artifacts",
            json!({
                "total_count": 1,
                "artifacts": [{ "name": "build-1", "workflow_run": { "conclusion": "failure", "head_sha": "abc123" } }]
            }),
        )
        .await;
        mount_json(&server, "/repos/acme/app/releases", json!([])).await;

        let plugin = build_plugin(&client(&server), "app").await.unwrap();
        assert_eq!(plugin.description, "An app");
        assert!(plugin.artifacts.is_empty());
    }

    #[tokio::test]
    async fn release_becomes_single_artifact() {
        let server = MockServer::start().await;
        mount_repository(&server, "app", None).await;
        mount_json(
            &server,
            "/repos/acme/app/actions/artifacts",
            json!({ "total_count": 0, "artifacts": [] }),
        )
        .await;
        mount_json(
            &server,
            "/repos/acme/app/releases",
            json!([{
                "tag_name": "v1.0",
                "target_commitish": "def456",
                "assets": [{ "browser_download_url": "http://x/y.jar", "size": 100 }]
            }]),
        )
        .await;
        mount_json(&server, "/repos/acme/app/commits/def456", commit_body("def456", "Release 1.0"))
            .await;

        let plugin = build_plugin(&client(&server), "app").await.unwrap();
        assert_eq!(plugin.description, DEFAULT_DESCRIPTION);
        assert_eq!(plugin.artifacts.len(), 1);
        let artifact = &plugin.artifacts[0];
        assert_eq!(artifact.kind, ArtifactKind::Release);
        assert_eq!(artifact.expires_at, None);
        assert_eq!(artifact.name, "y.jar");
        assert_eq!(artifact.size, 100);
        assert_eq!(artifact.download_url, "/api/download?url=http%3A%2F%2Fx%2Fy.jar&name=y.jar");
        assert_eq!(artifact.release_info.as_ref().unwrap().tag_name, "v1.0");
        assert_eq!(artifact.commit_info.as_ref().unwrap().message, "Release 1.0");
    }

    #[tokio::test]
    async fn missing_repository_yields_none() {
        let server = MockServer::start().await;
        mount_status(&server, "/repos/acme/favicon.ico", not_found()).await;
        assert!(build_plugin(&client(&server), "favicon.ico").await.is_none());
        // No listing requests after the 404.
        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
    }

    #[tokio::test]
    async fn listing_failure_yields_none() {
        let server = MockServer::start().await;
        mount_repository(&server, "app", None).await;
        mount_status(
            &server,
            "/repos/acme/app/actions/artifacts",
            ResponseTemplate::new(500).set_body_json(json!({ "message": "Server Error" })),
        )
        .await;
        mount_json(&server, "/repos/acme/app/releases", json!([])).await;
        assert!(build_plugin(&client(&server), "app").await.is_none());
    }

    #[tokio::test]
    async fn commit_failure_only_affects_its_artifact() {
        let server = MockServer::start().await;
        mount_repository(&server, "app", None).await;
        mount_json(
            &server,
            "/repos/acme/app/actions/artifacts",
            json!({
                "total_count": 2,
                "artifacts": [
                    {
                        "id": 1, "name": "app-old", "size_in_bytes": 2048,
                        "archive_download_url": "https://api.github.com/repos/acme/app/actions/artifacts/1/zip",
                        "created_at": "2024-01-01T00:00:00Z", "expires_at": "2024-04-01T00:00:00Z",
                        "workflow_run": { "id": 10, "head_sha": "aaa111", "head_branch": "main" }
                    },
                    {
                        "id": 2, "name": "app-new", "size_in_bytes": 4096,
                        "archive_download_url": "https://api.github.com/repos/acme/app/actions/artifacts/2/zip",
                        "created_at": "2024-02-01T00:00:00Z", "expires_at": "2024-05-01T00:00:00Z",
                        "workflow_run": { "id": 11, "head_sha": "bbb222", "head_branch": "main" }
                    }
                ]
            }),
        )
        .await;
        mount_json(&server, "/repos/acme/app/releases", json!([])).await;
        mount_json(&server, "/repos/acme/app/commits/aaa111", commit_body("aaa111", "Old")).await;
        mount_status(
            &server,
            "/repos/acme/app/commits/bbb222",
            ResponseTemplate::new(500).set_body_json(json!({ "message": "Server Error" })),
        )
        .await;

        let plugin = build_plugin(&client(&server), "app").await.unwrap();
        let names = plugin.artifacts.iter().map(|a| a.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, ["app-new", "app-old"]);
        assert!(plugin.artifacts[0].commit_info.is_none());
        assert_eq!(plugin.artifacts[1].commit_info.as_ref().unwrap().message, "Old");
        assert_eq!(plugin.artifacts[1].size, 2048);
        assert_eq!(plugin.artifacts[1].expires_at, Some(datetime!(2024-04-01 0:00 UTC)));
    }

    #[tokio::test]
    async fn mixed_sources_sorted_newest_first() {
        let server = MockServer::start().await;
        mount_repository(&server, "app", None).await;
        mount_json(
            &server,
            "/repos/acme/app/actions/artifacts",
            json!({
                "artifacts": [{
                    "name": "nightly",
                    "archive_download_url": "https://api.github.com/repos/acme/app/actions/artifacts/3/zip",
                    "created_at": "2024-03-10T00:00:00Z",
                    "workflow_run": { "head_sha": "ccc333", "conclusion": "success" }
                }, {
                    "name": "stale", "expired": true,
                    "archive_download_url": "https://api.github.com/repos/acme/app/actions/artifacts/4/zip",
                    "created_at": "2024-03-11T00:00:00Z"
                }]
            }),
        )
        .await;
        mount_json(
            &server,
            "/repos/acme/app/releases",
            json!([
                {
                    "tag_name": "v2.0", "target_commitish": "main",
                    "published_at": "2024-03-20T00:00:00Z",
                    "assets": [
                        { "name": "app-2.0.jar", "browser_download_url": "https://github.com/acme/app/releases/download/v2.0/app-2.0.jar", "size": 10 },
                        { "name": "app-2.0-sources.jar", "browser_download_url": "https://github.com/acme/app/releases/download/v2.0/app-2.0-sources.jar", "size": 5 }
                    ]
                },
                { "tag_name": "v3.0-draft", "draft": true, "assets": [{ "browser_download_url": "https://x/z.jar" }] },
                {
                    "tag_name": "v1.0", "published_at": "2024-01-05T00:00:00Z",
                    "assets": [{ "name": "app-1.0.jar", "browser_download_url": "https://github.com/acme/app/releases/download/v1.0/app-1.0.jar", "created_at": "2024-01-04T00:00:00Z" }]
                }
            ]),
        )
        .await;
        // Commit lookups are not mounted and fail.

        let plugin = build_plugin(&client(&server), "app").await.unwrap();
        let names = plugin.artifacts.iter().map(|a| a.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, ["app-2.0.jar", "app-2.0-sources.jar", "nightly", "app-1.0.jar"]);
        assert!(plugin.artifacts.windows(2).all(|w| w[0].created_at >= w[1].created_at));
        assert!(plugin.artifacts.iter().all(|a| {
            a.kind == ArtifactKind::Release
                || matches!(a.workflow_run.conclusion.as_deref(), None | Some("success"))
        }));
        assert_eq!(plugin.artifacts[3].created_at, datetime!(2024-01-04 0:00 UTC));
    }

    #[tokio::test]
    async fn build_plugins_keeps_input_order() {
        let server = MockServer::start().await;
        for repo in ["one", "two", "three"] {
            mount_repository(&server, repo, None).await;
            mount_json(
                &server,
                &format!("/repos/acme/{repo}/actions/artifacts"),
                json!({ "artifacts": [] }),
            )
            .await;
            mount_json(&server, &format!("/repos/acme/{repo}/releases"), json!([])).await;
        }
        mount_status(&server, "/repos/acme/gone", not_found()).await;

        let names = ["three", "gone", "one", "two"].map(String::from);
        let plugins = build_plugins(&client(&server), names).await;
        let names = plugins.iter().map(|p| p.repo_name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, ["three", "one", "two"]);
    }

    #[test]
    fn artifact_without_run_defaults() {
        let artifact: ArtifactResponse = serde_json::from_value(json!({
            "name": "build",
            "archive_download_url": "https://api.github.com/a/zip"
        }))
        .unwrap();
        let artifact = normalize_artifact("app", artifact).unwrap();
        assert_eq!(artifact.workflow_run.head_sha, "unknown");
        assert_eq!(artifact.workflow_run.conclusion, None);
        assert!(artifact.is_retained());
    }
}
